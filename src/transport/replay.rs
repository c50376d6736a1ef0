use super::*;

/// One canned router response in a replay fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEntry {
    /// Output lines of a shell command.
    Command { command: String, lines: Vec<String> },
    /// Body of a web UI page.
    Page { page: String, body: String },
}

/// A request served by a [`ReplayTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayRequest {
    Command(String),
    Page(String),
}

/// Answers commands and pages from recorded outputs instead of a router.
///
/// Clones share the request log, so a test can keep one handle while the
/// client owns another.
#[derive(Debug, Clone, Default)]
pub struct ReplayTransport {
    protocol: Protocol,
    commands: HashMap<String, Vec<String>>,
    pages: HashMap<String, String>,
    requests: Arc<std::sync::Mutex<Vec<ReplayRequest>>>,
    connected: Arc<AtomicBool>,
}

impl ReplayTransport {
    /// An empty shell-style replay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"kind":"command",...}` / `{"kind":"page",...}` JSON lines.
    ///
    /// The protocol is HTTP if the fixture only holds pages, SSH otherwise.
    pub fn from_jsonl(content: &str) -> Result<Self, RouterError> {
        let mut replay = Self::new();
        let mut saw_command = false;
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: ReplayEntry = serde_json::from_str(line)
                .map_err(|err| RouterError::Fixture(format!("line {}: {}", idx + 1, err)))?;
            match entry {
                ReplayEntry::Command { command, lines } => {
                    saw_command = true;
                    replay.commands.insert(command, lines);
                }
                ReplayEntry::Page { page, body } => {
                    replay.pages.insert(page, body);
                }
            }
        }
        if !saw_command && !replay.pages.is_empty() {
            replay.protocol = Protocol::Http;
        }
        Ok(replay)
    }

    /// Sets which protocol's output formats this replay stands in for.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_command<S: Into<String>>(
        mut self,
        command: impl Into<String>,
        lines: impl IntoIterator<Item = S>,
    ) -> Self {
        self.commands
            .insert(command.into(), lines.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_page(mut self, page: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(page.into(), body.into());
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Every request served so far, oldest first.
    pub fn requests(&self) -> Vec<ReplayRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `command` was run.
    pub fn command_count(&self, command: &str) -> usize {
        self.requests()
            .iter()
            .filter(|req| matches!(req, ReplayRequest::Command(c) if c == command))
            .count()
    }

    fn record(&self, request: ReplayRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    pub(super) fn run_command(&self, command: &str) -> Result<Vec<String>, RouterError> {
        self.record(ReplayRequest::Command(command.to_string()));
        let lines = self
            .commands
            .get(command)
            .cloned()
            .ok_or_else(|| RouterError::Fixture(format!("no recorded output for {command:?}")))?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(lines)
    }

    pub(super) fn get_page(&self, page: &str) -> Result<String, RouterError> {
        self.record(ReplayRequest::Page(page.to_string()));
        let body = self
            .pages
            .get(page)
            .cloned()
            .ok_or_else(|| RouterError::Fixture(format!("no recorded page {page:?}")))?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(body)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(super) fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_jsonl_loads_commands_and_pages() {
        let fixture = r#"{"kind":"command","command":"arp -n","lines":["a","b"]}

{"kind":"page","page":"Status_Lan.live.asp","body":"{lan_ip::10.0.0.1}"}
"#;
        let replay = ReplayTransport::from_jsonl(fixture).expect("load fixture");
        assert_eq!(replay.protocol(), Protocol::Ssh);
        assert_eq!(
            replay.run_command("arp -n").expect("recorded"),
            vec!["a", "b"]
        );
        assert_eq!(
            replay.get_page("Status_Lan.live.asp").expect("recorded"),
            "{lan_ip::10.0.0.1}"
        );
        assert!(replay.is_connected());
    }

    #[test]
    fn page_only_fixture_is_http() {
        let fixture = r#"{"kind":"page","page":"Status_Wireless.live.asp","body":""}"#;
        let replay = ReplayTransport::from_jsonl(fixture).expect("load fixture");
        assert_eq!(replay.protocol(), Protocol::Http);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = ReplayTransport::from_jsonl("{\"kind\":\"command\"}\n").expect_err("bad fixture");
        assert!(matches!(err, RouterError::Fixture(ref msg) if msg.starts_with("line 1")));
    }

    #[test]
    fn clones_share_request_log() {
        let replay = ReplayTransport::new().with_command("arp -n", ["x"]);
        let handle = replay.clone();
        replay.run_command("arp -n").expect("recorded");
        assert!(replay.run_command("uptime").is_err());
        assert_eq!(
            handle.requests(),
            vec![
                ReplayRequest::Command("arp -n".to_string()),
                ReplayRequest::Command("uptime".to_string()),
            ]
        );
        assert_eq!(handle.command_count("arp -n"), 1);
    }
}
