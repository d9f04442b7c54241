//! Error taxonomy for the bridge.
//!
//! Only [`TransportError`] and the connection-level [`AdapterError`]s end a
//! session. Everything else is reported and the tick carries on.

use std::io;

/// Failures of the length-prefixed controller channel. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to controller at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("frame too large: {len} bytes (limit {limit})")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("decode failure: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("encode failure: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("transport timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Failures reported by a simulation adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// The entity vanished between enumeration and access.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A mutator or creation call was rejected for a valid target.
    #[error("{operation} failed for '{target}': {message}")]
    CommandFailed {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// The connection to the simulation is gone.
    #[error("simulation connection error: {0}")]
    Connection(String),
}

impl AdapterError {
    pub fn vehicle_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "vehicle",
            id: id.to_string(),
        }
    }

    pub fn command_failed(operation: &'static str, target: &str, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation,
            target: target.to_string(),
            message: message.into(),
        }
    }

    /// True for errors that should terminate the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Failures loading or validating [`crate::config::BridgeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal session error surfaced by the tick driver and the binaries.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(AdapterError::Connection("closed".into()).is_fatal());
        assert!(!AdapterError::vehicle_not_found("v1").is_fatal());
        assert!(!AdapterError::command_failed("set_speed", "v1", "rejected").is_fatal());
    }

    #[test]
    fn truncated_message_display() {
        let err = TransportError::Truncated {
            expected: 10,
            received: 4,
        };
        assert_eq!(
            err.to_string(),
            "truncated message: expected 10 bytes, received 4"
        );
    }
}
