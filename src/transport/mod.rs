//! Router transports: SSH, Telnet and HTTP behind one dispatch type.
//!
//! Shell transports answer [`Transport::run_command`] with the output lines
//! of one command; the HTTP transport answers [`Transport::get_page`] with the
//! raw body of a status page. Each variant owns its socket or session and
//! tracks a `connected` flag that flips to false on any unrecoverable I/O
//! failure.
//!
//! # Main Components
//!
//! - [`Transport`] - Closed set of transports, picked once from the config
//! - [`SshConnection`] - Persistent SSH session with one reconnect retry
//! - [`TelnetConnection`] - Login-per-command Telnet session
//! - [`HttpConnection`] - Basic-auth page fetcher
//! - [`ReplayTransport`] - Canned outputs for tests and offline fixtures

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_ssh2_tokio::ServerCheckMethod;
use async_ssh2_tokio::client::{AuthMethod, Client};
use log::{debug, error, trace, warn};
use russh::Preferred;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{self, Protocol, RouterConfig};
use crate::error::RouterError;

pub use http::HttpConnection;
pub use replay::{ReplayEntry, ReplayRequest, ReplayTransport};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use ssh::SshConnection;
pub use telnet::TelnetConnection;

/// Bound for establishing a TCP or SSH session.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(9);

/// Progress of an operation allowed one automatic retry.
///
/// `Attempt -> RetryOnce -> Fail`; `Fail` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempt,
    RetryOnce,
    Fail,
}

impl RetryState {
    /// State after a transient failure.
    pub fn next(self) -> Self {
        match self {
            RetryState::Attempt => RetryState::RetryOnce,
            RetryState::RetryOnce | RetryState::Fail => RetryState::Fail,
        }
    }

    pub fn is_exhausted(self) -> bool {
        self == RetryState::Fail
    }
}

/// A connection to one router.
pub enum Transport {
    Ssh(SshConnection),
    Telnet(TelnetConnection),
    Http(HttpConnection),
    Replay(ReplayTransport),
}

impl Transport {
    /// Builds the transport selected by `config.protocol`.
    ///
    /// `http_client` is only used by the HTTP transport; when given, the
    /// caller keeps ownership of its connection pool.
    pub fn from_config(config: &RouterConfig, http_client: Option<reqwest::Client>) -> Self {
        match config.protocol {
            Protocol::Ssh => Transport::Ssh(SshConnection::from_config(config)),
            Protocol::Telnet => Transport::Telnet(TelnetConnection::from_config(config)),
            Protocol::Http => {
                let connection = HttpConnection::from_config(config);
                Transport::Http(match http_client {
                    Some(client) => connection.with_client(client),
                    None => connection,
                })
            }
        }
    }

    /// Protocol whose output formats this transport produces.
    pub fn protocol(&self) -> Protocol {
        match self {
            Transport::Ssh(_) => Protocol::Ssh,
            Transport::Telnet(_) => Protocol::Telnet,
            Transport::Http(_) => Protocol::Http,
            Transport::Replay(replay) => replay.protocol(),
        }
    }

    /// Runs a shell command and returns its output lines.
    ///
    /// An empty result means the command timed out or the connection was
    /// lost after the retry; `Err` means the router could not be reached.
    pub async fn run_command(&self, command: &str) -> Result<Vec<String>, RouterError> {
        match self {
            Transport::Ssh(ssh) => ssh.run_command(command).await,
            Transport::Telnet(telnet) => telnet.run_command(command).await,
            Transport::Http(_) => Err(RouterError::Unsupported {
                protocol: Protocol::Http,
                operation: "run_command",
            }),
            Transport::Replay(replay) => replay.run_command(command),
        }
    }

    /// Fetches `http://{host}/{page}` and returns the body whatever the status.
    pub async fn get_page(&self, page: &str) -> Result<String, RouterError> {
        match self {
            Transport::Http(http) => http.get_page(page).await,
            Transport::Replay(replay) => replay.get_page(page),
            other => Err(RouterError::Unsupported {
                protocol: other.protocol(),
                operation: "get_page",
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Transport::Ssh(ssh) => ssh.is_connected(),
            Transport::Telnet(telnet) => telnet.is_connected(),
            Transport::Http(http) => http.is_connected(),
            Transport::Replay(replay) => replay.is_connected(),
        }
    }

    /// Releases the underlying socket or session.
    pub async fn close(&self) {
        match self {
            Transport::Ssh(ssh) => ssh.close().await,
            Transport::Telnet(telnet) => telnet.close().await,
            Transport::Http(http) => http.close().await,
            Transport::Replay(replay) => replay.close(),
        }
    }
}

/// Splits raw command output on `\n`, dropping the `\r` of CRLF endings.
///
/// A trailing newline yields a final empty line, which parsers skip.
pub(crate) fn split_output(output: &str) -> Vec<String> {
    output
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

mod http;
mod replay;
mod security;
mod ssh;
mod telnet;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_state_allows_exactly_one_retry() {
        let first = RetryState::Attempt;
        let second = first.next();
        assert_eq!(second, RetryState::RetryOnce);
        assert!(!second.is_exhausted());
        let third = second.next();
        assert!(third.is_exhausted());
        assert_eq!(third.next(), RetryState::Fail);
    }

    #[test]
    fn split_output_keeps_trailing_empty_line() {
        assert_eq!(
            split_output("2703926881\r\n"),
            vec!["2703926881".to_string(), String::new()]
        );
    }

    #[test]
    fn transport_follows_configured_protocol() {
        let config = RouterConfig::new("192.168.1.1").protocol(Protocol::Telnet);
        let transport = Transport::from_config(&config, None);
        assert_eq!(transport.protocol(), Protocol::Telnet);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn http_transport_rejects_shell_commands() {
        let config = RouterConfig::new("192.168.1.1").protocol(Protocol::Http);
        let transport = Transport::from_config(&config, None);
        let err = transport
            .run_command("arp -n")
            .await
            .expect_err("http cannot run commands");
        assert!(matches!(
            err,
            RouterError::Unsupported {
                protocol: Protocol::Http,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn shell_transport_rejects_pages() {
        let transport = Transport::from_config(&RouterConfig::new("192.168.1.1"), None);
        let err = transport
            .get_page("Status_Lan.live.asp")
            .await
            .expect_err("ssh cannot fetch pages");
        assert!(matches!(
            err,
            RouterError::Unsupported {
                protocol: Protocol::Ssh,
                ..
            }
        ));
    }
}
