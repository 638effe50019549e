//! WebSocket message types.
//!
//! Every message in either direction is a `{"type": ..., "data": ...}` envelope.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "connected", "log", "pong")
    #[serde(rename = "type")]
    pub msg_type: String,
    pub data: serde_json::Value,
}

impl ServerMessage {
    /// Create a new server message with the given type and data.
    pub fn new(msg_type: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a server message with null data.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: serde_json::Value::Null,
        }
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Connection-level messages.
pub mod system {
    use crate::activity_log::ObserverId;
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        pub observer_id: ObserverId,
        pub server_version: String,
    }

    /// Sent when a client message cannot be handled.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// An activity log entry (server -> client).
    pub const LOG: &str = "log";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// Set the log filter and resume delivery (client -> server).
    pub const SUBSCRIBE: &str = "subscribe";
    /// Stop log delivery, keeping the connection open (client -> server).
    pub const UNSUBSCRIBE: &str = "unsubscribe";
}
