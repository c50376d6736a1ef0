//! Error types for router transports and queries.
//!
//! Only failures the caller must act on are represented here. Command
//! timeouts and exhausted channel retries are absorbed by the transports and
//! surface as an empty output instead, so periodic pollers stay alive.

use thiserror::Error;

use crate::config::Protocol;

/// Errors that can occur while talking to a DD-WRT router.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The router could not be reached or refused the session.
    ///
    /// Covers DNS resolution, TCP connect, SSH handshake and authentication,
    /// and Telnet login failures. Returned so callers can tell "no devices" apart from
    /// "router unreachable".
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A bounded wait expired while the session was being set up.
    #[error("timeout: {0}")]
    Timeout(String),

    /// An SSH failure on an established session that a reconnect cannot cure.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Socket error outside the retried broken-pipe class.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request to the router web UI failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A byte counter read returned something that is not an unsigned integer.
    #[error("invalid byte counter output: {0:?}")]
    CounterParse(String),

    /// The operation is not available on the configured transport.
    #[error("{operation} is not supported over {protocol}")]
    Unsupported {
        protocol: Protocol,
        operation: &'static str,
    },

    /// A replay fixture could not be loaded.
    #[error("invalid replay fixture: {0}")]
    Fixture(String),
}

impl RouterError {
    /// Returns true for failures raised before any command could be issued.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            RouterError::ConnectFailed(_) | RouterError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RouterError;
    use crate::config::Protocol;

    #[test]
    fn unsupported_message_names_protocol_and_operation() {
        let err = RouterError::Unsupported {
            protocol: Protocol::Http,
            operation: "run_command",
        };
        assert_eq!(err.to_string(), "run_command is not supported over http");
        assert!(!err.is_connect_failure());
    }

    #[test]
    fn connect_failures_are_classified() {
        assert!(RouterError::ConnectFailed("dns".to_string()).is_connect_failure());
        assert!(!RouterError::CounterParse("abc".to_string()).is_connect_failure());
        let session = RouterError::from(async_ssh2_tokio::Error::CommandDidntExit);
        assert!(!session.is_connect_failure());
    }
}
