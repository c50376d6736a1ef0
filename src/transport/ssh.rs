use super::*;

/// Credentials for the SSH session. A key file wins over a password.
#[derive(Clone)]
enum SshAuth {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl SshAuth {
    fn from_config(config: &RouterConfig) -> Self {
        match config.key_file.as_ref() {
            Some(path) => SshAuth::KeyFile {
                path: path.clone(),
                passphrase: config.key_passphrase.clone(),
            },
            None => SshAuth::Password(config.password.clone().unwrap_or_default()),
        }
    }

    fn method(&self) -> AuthMethod {
        match self {
            SshAuth::Password(password) => AuthMethod::with_password(password),
            SshAuth::KeyFile { path, passphrase } => {
                AuthMethod::with_key_file(path, passphrase.as_deref())
            }
        }
    }
}

/// A persistent SSH session to the router, opened on first use.
pub struct SshConnection {
    host: String,
    port: u16,
    username: String,
    auth: SshAuth,
    security_options: ConnectionSecurityOptions,
    command_timeout: Duration,
    client: Mutex<Option<Client>>,
    connected: AtomicBool,
}

impl SshConnection {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.effective_port().unwrap_or(config::DEFAULT_SSH_PORT),
            username: config.username.clone().unwrap_or_default(),
            auth: SshAuth::from_config(config),
            security_options: ConnectionSecurityOptions::for_level(config.security),
            command_timeout: config.command_timeout_duration(),
            client: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn device_addr(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    async fn connect(&self) -> Result<Client, RouterError> {
        let device_addr = self.device_addr();
        debug!("Connecting to {}", device_addr);

        let config = async_ssh2_tokio::Config {
            preferred: self.security_options.preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let connect = Client::connect_with_config(
            (self.host.clone(), self.port),
            &self.username,
            self.auth.method(),
            self.security_options.server_check.clone(),
            config,
        );
        let client = match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(err)) => {
                debug!("{} SSH connect failed: {}", device_addr, err);
                return Err(RouterError::ConnectFailed(format!("{device_addr}: {err}")));
            }
            Err(_) => {
                return Err(RouterError::Timeout(format!(
                    "ssh connect to {device_addr}"
                )));
            }
        };
        debug!("{} SSH connection successful", device_addr);
        Ok(client)
    }

    /// Runs `command` over the session, reconnecting first if needed.
    ///
    /// A lost session (failed channel open, reset, closed channel) forces one
    /// reconnect and a second try. A second loss or a timeout drops the
    /// session and yields no lines.
    pub async fn run_command(&self, command: &str) -> Result<Vec<String>, RouterError> {
        let mut guard = self.client.lock().await;
        let mut retry = RetryState::Attempt;

        loop {
            if guard.as_ref().is_none_or(Client::is_closed) || !self.is_connected() {
                match self.connect().await {
                    Ok(client) => *guard = Some(client),
                    Err(err) => {
                        *guard = None;
                        self.connected.store(false, Ordering::SeqCst);
                        return Err(err);
                    }
                }
                self.connected.store(true, Ordering::SeqCst);
            }
            let Some(client) = guard.as_ref() else {
                continue;
            };

            debug!("Running {:?} at {}", command, self.host);
            let outcome = tokio::time::timeout(self.command_timeout, client.execute(command)).await;

            match outcome {
                Ok(Ok(result)) => {
                    debug!(
                        "Command {:?} returned {:?} at {}",
                        command, result.stdout, self.host
                    );
                    return Ok(split_output(&result.stdout));
                }
                Ok(Err(err)) if is_transient(&err) => {
                    *guard = None;
                    self.connected.store(false, Ordering::SeqCst);
                    retry = retry.next();
                    if retry.is_exhausted() {
                        error!("No connection to host {}: {}", self.host, err);
                        return Ok(Vec::new());
                    }
                    warn!("Session to {} lost, reconnecting: {}", self.host, err);
                }
                Ok(Err(err)) => {
                    *guard = None;
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(err.into());
                }
                Err(_) => {
                    *guard = None;
                    self.connected.store(false, Ordering::SeqCst);
                    error!("Host {} timeout running {:?}", self.host, command);
                    return Ok(Vec::new());
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Disconnects the session if one is open.
    pub async fn close(&self) {
        let client = self.client.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(client) = client {
            match client.disconnect().await {
                Ok(()) => debug!("{} SSH connection closed", self.device_addr()),
                Err(err) => debug!("Error closing {}: {}", self.device_addr(), err),
            }
        }
    }
}

/// Failures a fresh session can cure: the established session or its
/// channel went away underneath the command.
fn is_transient(err: &async_ssh2_tokio::Error) -> bool {
    match err {
        async_ssh2_tokio::Error::SshError(err) => matches!(
            err,
            russh::Error::ChannelOpenFailure(_)
                | russh::Error::Disconnect
                | russh::Error::HUP
                | russh::Error::IO(_)
                | russh::Error::SendError
                | russh::Error::KeepaliveTimeout
                | russh::Error::InactivityTimeout
        ),
        async_ssh2_tokio::Error::CommandDidntExit => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_takes_precedence_over_password() {
        let config = RouterConfig::new("r")
            .password("secret")
            .key_file("/root/.ssh/id_ed25519");
        assert!(matches!(
            SshAuth::from_config(&config),
            SshAuth::KeyFile { .. }
        ));
    }

    #[test]
    fn password_auth_without_key() {
        let config = RouterConfig::new("r").username("root").password("secret");
        let connection = SshConnection::from_config(&config);
        assert!(matches!(connection.auth, SshAuth::Password(ref p) if p == "secret"));
        assert_eq!(connection.device_addr(), "root@r:22");
        assert!(!connection.is_connected());
    }

    #[test]
    fn lost_session_errors_are_transient() {
        use std::io::{Error as IoError, ErrorKind};

        let reset = async_ssh2_tokio::Error::SshError(russh::Error::IO(IoError::from(
            ErrorKind::ConnectionReset,
        )));
        assert!(is_transient(&reset));
        assert!(is_transient(&async_ssh2_tokio::Error::SshError(
            russh::Error::SendError
        )));
        assert!(is_transient(&async_ssh2_tokio::Error::SshError(
            russh::Error::Disconnect
        )));
        assert!(is_transient(&async_ssh2_tokio::Error::SshError(
            russh::Error::HUP
        )));
        assert!(is_transient(&async_ssh2_tokio::Error::CommandDidntExit));
    }

    #[test]
    fn auth_errors_are_not_transient() {
        assert!(!is_transient(&async_ssh2_tokio::Error::PasswordWrong));
        assert!(!is_transient(&async_ssh2_tokio::Error::KeyAuthFailed));
        assert!(!is_transient(&async_ssh2_tokio::Error::SshError(
            russh::Error::NotAuthenticated
        )));
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_connect_error() {
        let config = RouterConfig::new("ddwrt.invalid")
            .username("root")
            .password("secret");
        let connection = SshConnection::from_config(&config);
        let err = connection
            .run_command("arp -n")
            .await
            .expect_err("dns failure must surface");
        assert!(matches!(err, RouterError::ConnectFailed(_)));
        assert!(err.is_connect_failure());
        assert!(!connection.is_connected());
    }
}
