use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode, Url};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::util::resolve_host_to_ip;

const DEFAULT_USER_AGENT: &str = concat!("reach-probe/", env!("CARGO_PKG_VERSION"));

/// Retry policy for one client. Immutable once the client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// One logical HTTP request. A `Host` header is special: its value overrides
/// the TLS server name and the wire Host header instead of being sent
/// literally, which lets a service be probed by bare IP while presenting the
/// expected hostname.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Option<String>,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub timeout_secs: Option<u64>,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn host_override(&self) -> Option<String> {
        self.headers
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("request failed with status {status}: {source:?}")]
    Exhausted {
        /// Last HTTP status observed, 500 when no response was ever received.
        status: u16,
        source: Option<reqwest::Error>,
    },
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Exhausted { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// HTTP prober with linear-backoff retries and one-shot recovery from
/// anti-bot challenge responses on the probed service's own domain. All
/// requests issued through one `HttpClient` share a cookie store; challenge
/// recovery depends on the interstitial's cookie being replayed.
pub struct HttpClient {
    config: RequestConfig,
    service_domain: String,
    jar: Arc<Jar>,
    client: Client,
}

impl HttpClient {
    pub fn new(config: RequestConfig, service_domain: &str) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            config,
            service_domain: service_domain.trim().to_ascii_lowercase(),
            jar,
            client,
        })
    }

    /// Issues the request described by `desc`, retrying transport errors and
    /// 5xx responses up to `max_retries` times with `attempt * retry_delay`
    /// backoff. Returns the first response with status < 500.
    pub async fn request(
        &self,
        desc: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Response, RequestError> {
        let url = Url::parse(desc.url.trim())
            .map_err(|e| RequestError::Invalid(format!("bad url {:?}: {e}", desc.url)))?;
        let target_host = url.host_str().unwrap_or_default().to_string();

        // With a Host override the request goes out to the original target's
        // address but carries the override as SNI and Host header, so the URL
        // host is swapped and the override name pinned to the target's IP.
        let (effective_url, client) = match desc.host_override() {
            Some(name) => {
                let port = url.port_or_known_default().unwrap_or(443);
                let ip = resolve_host_to_ip(&target_host)
                    .await
                    .map_err(|e| RequestError::Invalid(format!("cannot resolve {target_host}: {e}")))?;
                let mut rewritten = url.clone();
                rewritten
                    .set_host(Some(&name))
                    .map_err(|e| RequestError::Invalid(format!("bad host override {name:?}: {e}")))?;
                let client = Client::builder()
                    .timeout(self.config.timeout)
                    .connect_timeout(self.config.timeout)
                    .cookie_provider(Arc::clone(&self.jar))
                    .resolve(&name, SocketAddr::new(ip, port))
                    .build()
                    .map_err(|e| RequestError::Invalid(e.to_string()))?;
                (rewritten, client)
            }
            None => (url, self.client.clone()),
        };

        let method = match &desc.method {
            Some(m) if !m.trim().is_empty() => {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| RequestError::Invalid(format!("bad method {m:?}")))?
            }
            _ => Method::GET,
        };
        let timeout_override = desc.timeout_secs.map(Duration::from_secs);

        let mut challenge_retried = false;
        let mut last_status: Option<StatusCode> = None;
        let mut last_err: Option<reqwest::Error> = None;

        let mut attempt: u32 = 0;
        while attempt <= self.config.max_retries {
            if cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }

            let mut req = client.request(method.clone(), effective_url.clone());
            if let Some(limit) = timeout_override {
                req = req.timeout(limit);
            }
            if let Some(body) = &desc.body {
                if !body.is_empty() {
                    req = req.body(body.clone());
                }
            }
            if desc.headers.is_empty() {
                req = req
                    .header(USER_AGENT, DEFAULT_USER_AGENT)
                    .header(ACCEPT, "application/json");
            } else {
                for (name, value) in &desc.headers {
                    // Host is handled through the SNI pinning above and must
                    // not be sent as a literal header.
                    if name.trim().eq_ignore_ascii_case("host") {
                        continue;
                    }
                    req = req.header(name.trim(), value.trim());
                }
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    last_status = Some(status);
                    last_err = None;

                    if self.should_retry_for_challenge(&resp, &target_host, challenge_retried) {
                        warn!(
                            "challenge response {} from {}, retrying with updated cookies",
                            status, target_host
                        );
                        challenge_retried = true;
                        // Drain so the interstitial body never leaks into
                        // results, then replay the same attempt index.
                        let _ = resp.bytes().await;
                        continue;
                    }

                    if status.as_u16() < 500 {
                        return Ok(resp);
                    }
                    debug!("attempt {} against {} got {}", attempt, target_host, status);
                }
                Err(err) => {
                    debug!("attempt {} against {} failed: {}", attempt, target_host, err);
                    last_err = Some(err);
                }
            }

            attempt += 1;
        }

        Err(RequestError::Exhausted {
            status: last_status
                .map(|s| s.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_u16()),
            source: last_err,
        })
    }

    fn should_retry_for_challenge(
        &self,
        resp: &Response,
        host: &str,
        already_retried: bool,
    ) -> bool {
        if already_retried {
            return false;
        }
        let host = host
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !self.is_service_host(&host) {
            return false;
        }
        match resp.status().as_u16() {
            403 | 503 | 429 => {}
            _ => return false,
        }
        resp.headers().get_all(SET_COOKIE).iter().next().is_some()
    }

    fn is_service_host(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        host == self.service_domain || host.ends_with(&format!(".{}", self.service_domain))
    }
}
