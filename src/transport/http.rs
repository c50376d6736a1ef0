use super::*;

/// Fetches status pages from the router web UI with HTTP Basic auth.
pub struct HttpConnection {
    host: String,
    username: String,
    password: Option<String>,
    client: Mutex<Option<reqwest::Client>>,
    /// True when the caller supplied the client and owns its pool.
    external: bool,
    connected: AtomicBool,
}

impl HttpConnection {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            host: config.host.clone(),
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone(),
            client: Mutex::new(None),
            external: false,
            connected: AtomicBool::new(false),
        }
    }

    /// Uses a caller-owned client instead of creating one.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Mutex::new(Some(client));
        self.external = true;
        self
    }

    async fn session(&self) -> Result<reqwest::Client, RouterError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        debug!("Creating HTTP session for {} as {}", self.host, self.username);
        let client = reqwest::Client::builder().build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// GETs `http://{host}/{page}` and returns the body.
    ///
    /// Non-2xx statuses are not treated specially; the body is returned as is.
    pub async fn get_page(&self, page: &str) -> Result<String, RouterError> {
        let client = self.session().await?;
        let url = format!("http://{}/{}", self.host, page);
        debug!("Getting {}", url);

        let response = match client
            .get(&url)
            .basic_auth(&self.username, self.password.as_deref())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        debug!("Status {} for {}", response.status(), url);

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        trace!("Response for {}: {}", url, body);
        self.connected.store(true, Ordering::SeqCst);
        Ok(body)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Drops an owned client. A caller-supplied client is left to the caller.
    pub async fn close(&self) {
        if !self.external {
            self.client.lock().await.take();
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}
