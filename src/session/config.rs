use crate::socket::SocketConfig;

/// Configuration for a memo session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-6f1c…"), used in logs
    pub session_id: String,

    /// Server endpoint, reconnect policy and keepalive interval
    pub socket: SocketConfig,
}

impl SessionConfig {
    pub fn new(socket: SocketConfig) -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            socket,
        }
    }
}
