use serde::{Deserialize, Serialize};

pub mod streaming;

// Re-export streaming types
pub use streaming::{
    ChangeNotifications, StateChangeBatch, StateEntry, StateSubscribers,
};

/// Reserved shared-state key prefix for fork announcements.
///
/// Any state entry whose name is `fork_<id>` announces the existence of the
/// fork `<id>` to every connected client. The id itself is opaque.
pub const FORK_KEY_PREFIX: &str = "fork_";

/// Build the announcement key for a fork id.
pub fn fork_state_key(fork_id: &str) -> String {
    format!("{FORK_KEY_PREFIX}{fork_id}")
}

/// Extract the fork id from an announcement key.
///
/// Returns `None` when the name is outside the reserved namespace or the id
/// part is empty. Validation against the root room id happens at the watcher,
/// which knows it.
pub fn parse_fork_key(name: &str) -> Option<&str> {
    match name.strip_prefix(FORK_KEY_PREFIX) {
        Some(id) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Value stored in a shared-state entry.
///
/// Announcement values are opaque to the protocol core; this enum exists so
/// handles can round-trip whatever a peer wrote without interpreting it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    // DateTime variant: stored as RFC3339 string
    // Use as_datetime() to get the parsed chrono::DateTime
    DateTime(String),
    // Json variant: stored as String
    // Use as_json_value() to get the parsed serde_json::Value
    Json(String),
    Null,
}

impl Value {
    /// Get the serde_json::Value if this is a Json variant
    pub fn as_json_value(&self) -> Option<serde_json::Value> {
        match self {
            Value::Json(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    /// Create a Value from a serde_json::Value
    pub fn from_json_value(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Json(
                        serde_json::to_string(&serde_json::Value::Number(n)).unwrap_or_default(),
                    )
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Json(serde_json::to_string(&other).unwrap_or_default()),
        }
    }

    /// Get string value, returning None if not a string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get datetime value as parsed chrono::DateTime
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Value::DateTime(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            _ => None,
        }
    }

    /// Create a Value from a chrono::DateTime
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Value::DateTime(dt.to_rfc3339())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Errors surfaced by document handles and the protocol engine.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("Fork creation failed: {message}")]
    ForkFailed { message: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_key_round_trip() {
        let key = fork_state_key("a1b2");
        assert_eq!(key, "fork_a1b2");
        assert_eq!(parse_fork_key(&key), Some("a1b2"));
    }

    #[test]
    fn test_parse_fork_key_rejects_foreign_names() {
        assert_eq!(parse_fork_key("cursor_a1b2"), None);
        assert_eq!(parse_fork_key("fork"), None);
        assert_eq!(parse_fork_key(""), None);
    }

    #[test]
    fn test_parse_fork_key_rejects_empty_id() {
        assert_eq!(parse_fork_key("fork_"), None);
    }

    #[test]
    fn test_parse_fork_key_keeps_separators_inside_id() {
        // Ids are opaque; only the leading prefix is split off.
        assert_eq!(parse_fork_key("fork_local://3"), Some("local://3"));
        assert_eq!(parse_fork_key("fork_a_b"), Some("a_b"));
    }

    #[test]
    fn test_value_json_round_trip() {
        let v = Value::Json(r#"{"created_at":"2024-01-01T00:00:00Z"}"#.to_string());
        let parsed = v.as_json_value().unwrap();
        assert_eq!(parsed["created_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_value_datetime_round_trip() {
        let now = chrono::Utc::now();
        let v = Value::from_datetime(now);
        assert_eq!(v.as_datetime().unwrap().timestamp(), now.timestamp());
    }

    #[test]
    fn test_value_from_json_value() {
        assert_eq!(
            Value::from_json_value(serde_json::json!("x")),
            Value::String("x".to_string())
        );
        assert_eq!(Value::from_json_value(serde_json::json!(3)), Value::Integer(3));
        assert!(Value::from_json_value(serde_json::Value::Null).is_null());
    }
}
