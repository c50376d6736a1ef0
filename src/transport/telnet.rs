use super::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const LOGIN_PROMPT: &[u8] = b"login: ";
const PASSWORD_PROMPT: &[u8] = b"Password: ";
const SHELL_PROMPT_END: &[u8] = b"#";

/// Most bytes buffered while looking for a delimiter.
const READ_LIMIT: usize = 64 * 1024;

/// Why a read on the Telnet stream stopped short.
#[derive(Debug)]
enum ReadError {
    /// The router closed the stream.
    Closed,
    /// The delimiter did not show up within [`READ_LIMIT`] bytes.
    Overrun,
    Io(std::io::Error),
}

impl ReadError {
    /// Lost-connection conditions that are worth one full retry.
    fn is_retryable(&self) -> bool {
        match self {
            ReadError::Closed | ReadError::Overrun => true,
            ReadError::Io(err) => is_broken_pipe(err),
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Closed => f.write_str("stream closed"),
            ReadError::Overrun => write!(f, "no delimiter within {READ_LIMIT} bytes"),
            ReadError::Io(err) => write!(f, "{err}"),
        }
    }
}

fn is_broken_pipe(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

/// Buffered byte stream with delimiter reads.
struct TelnetStream {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TelnetStream {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Reads up to and including `delimiter`, keeping any surplus buffered.
    async fn read_until(&mut self, delimiter: &[u8]) -> Result<Vec<u8>, ReadError> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(pos) = find(&self.buffer, delimiter) {
                let rest = self.buffer.split_off(pos + delimiter.len());
                return Ok(std::mem::replace(&mut self.buffer, rest));
            }
            if self.buffer.len() > READ_LIMIT {
                return Err(ReadError::Overrun);
            }
            let n = self.stream.read(&mut chunk).await.map_err(ReadError::Io)?;
            if n == 0 {
                return Err(ReadError::Closed);
            }
            trace!("telnet read {:?}", String::from_utf8_lossy(&chunk[..n]));
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ReadError> {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(ReadError::Io)
    }

    async fn shutdown(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            trace!("telnet shutdown: {}", err);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Drops the echoed command (first line) and the trailing prompt (last line).
fn command_output(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 2 {
        return Vec::new();
    }
    lines[1..lines.len() - 1]
        .iter()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// A Telnet session to the router.
///
/// Every command opens a new connection, logs in, runs and closes again, so
/// the router's telnetd never holds an idle shell. All of it runs under one
/// lock because the stream cannot interleave two conversations.
pub struct TelnetConnection {
    host: String,
    port: u16,
    username: String,
    password: String,
    command_timeout: Duration,
    /// Held for a whole connect, login and command round trip.
    io_lock: Mutex<()>,
    connected: AtomicBool,
}

impl TelnetConnection {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.effective_port().unwrap_or(config::DEFAULT_TELNET_PORT),
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            command_timeout: config.command_timeout_duration(),
            io_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
        }
    }

    fn device_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Opens the socket and walks the login handshake.
    ///
    /// Returns the stream and the shell prompt: everything after the last
    /// newline up to and including `#`.
    async fn connect(&self) -> Result<(TelnetStream, Vec<u8>), RouterError> {
        let device_addr = self.device_addr();
        let stream = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                return Err(RouterError::ConnectFailed(format!("{device_addr}: {err}")));
            }
            Err(_) => return Err(RouterError::Timeout(format!("telnet connect to {device_addr}"))),
        };
        debug!("{} TCP connection successful", device_addr);

        let mut stream = TelnetStream::new(stream);
        let login = async {
            stream.read_until(LOGIN_PROMPT).await?;
            stream.write_line(&self.username).await?;
            stream.read_until(PASSWORD_PROMPT).await?;
            stream.write_line(&self.password).await?;
            stream.read_until(SHELL_PROMPT_END).await
        };
        let banner = match tokio::time::timeout(self.command_timeout, login).await {
            Ok(Ok(banner)) => banner,
            Ok(Err(err)) => {
                return Err(RouterError::ConnectFailed(format!(
                    "unable to log in to {device_addr}: {err}"
                )));
            }
            Err(_) => {
                return Err(RouterError::ConnectFailed(format!(
                    "timed out logging in to {device_addr}"
                )));
            }
        };

        let prompt = match banner.iter().rposition(|b| *b == b'\n') {
            Some(pos) => banner[pos + 1..].to_vec(),
            None => banner,
        };
        debug!(
            "{} logged in, prompt {:?}",
            device_addr,
            String::from_utf8_lossy(&prompt)
        );
        Ok((stream, prompt))
    }

    async fn exchange(
        &self,
        stream: &mut TelnetStream,
        command: &str,
        prompt: &[u8],
    ) -> Result<Vec<String>, Option<ReadError>> {
        let round_trip = async {
            stream.write_line(command).await?;
            stream.read_until(prompt).await
        };
        match tokio::time::timeout(self.command_timeout, round_trip).await {
            Ok(Ok(data)) => Ok(command_output(&data)),
            Ok(Err(err)) => Err(Some(err)),
            Err(_) => Err(None),
        }
    }

    /// Logs in, runs `command` and returns its output lines.
    ///
    /// A broken pipe or overrun restarts the whole exchange once. A timeout
    /// gives up immediately with no lines.
    pub async fn run_command(&self, command: &str) -> Result<Vec<String>, RouterError> {
        let _io = self.io_lock.lock().await;
        let mut retry = RetryState::Attempt;

        loop {
            let (mut stream, prompt) = match self.connect().await {
                Ok(session) => session,
                Err(err) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            };
            self.connected.store(true, Ordering::SeqCst);

            debug!("Running {:?} at {}", command, self.host);
            let outcome = self.exchange(&mut stream, command, &prompt).await;
            stream.shutdown().await;

            match outcome {
                Ok(lines) => {
                    debug!("Command {:?} returned {:?} at {}", command, lines, self.host);
                    return Ok(lines);
                }
                Err(None) => {
                    self.connected.store(false, Ordering::SeqCst);
                    error!("Host {} timeout running {:?}", self.host, command);
                    return Ok(Vec::new());
                }
                Err(Some(err)) if err.is_retryable() => {
                    retry = retry.next();
                    if retry.is_exhausted() {
                        self.connected.store(false, Ordering::SeqCst);
                        warn!("Connection to {} lost: {}", self.host, err);
                        return Ok(Vec::new());
                    }
                    debug!("Connection to {} lost ({}), retrying", self.host, err);
                }
                Err(Some(ReadError::Io(err))) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(err.into());
                }
                Err(Some(err)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(RouterError::ConnectFailed(err.to_string()));
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Streams are closed after every command; this waits out a running one
    /// and resets the state.
    pub async fn close(&self) {
        let _io = self.io_lock.lock().await;
        self.connected.store(false, Ordering::SeqCst);
    }
}
