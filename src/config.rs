use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::client::RequestConfig;
use crate::scheduler::DEFAULT_SWEEP_CONCURRENCY;

/// Diagnostic plan of the probed service; selects which DNS-server list is
/// fetched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Plan {
    Free,
    #[default]
    Pro,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Free => write!(f, "Free"),
            Plan::Pro => write!(f, "Pro"),
        }
    }
}

/// Run configuration, loaded from a local JSON file named by `CONFIG_FILE`
/// (default `diagnostic.json`). A missing file falls back to defaults so the
/// binary runs out of the box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default = "default_service_domain")]
    pub service_domain: String,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_domain() -> String {
    "shecan.ir".to_string()
}

fn default_sweep_concurrency() -> usize {
    DEFAULT_SWEEP_CONCURRENCY
}

fn default_ping_count() -> u32 {
    4
}

fn default_ping_timeout_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            service_domain: default_service_domain(),
            plan: Plan::default(),
            sweep_concurrency: default_sweep_concurrency(),
            ping_count: default_ping_count(),
            ping_timeout_secs: default_ping_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

impl RunConfig {
    pub async fn load() -> Result<Self> {
        let path =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "diagnostic.json".to_string());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path))?;
        Ok(config)
    }

    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!(
                "Invalid log level: {}. Valid levels are: trace, debug, info, warn, error",
                self.log_level
            )),
        }
    }

    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            timeout: std::time::Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: std::time::Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Newline-separated DNS-server list for the configured plan.
    pub fn dns_list_url(&self) -> String {
        format!(
            "https://{}/dns/{}.txt",
            self.service_domain,
            self.plan.to_string().to_lowercase()
        )
    }

    /// Newline-separated list of the service's IPs.
    pub fn ip_list_url(&self) -> String {
        format!("https://{}/ip-list.php", self.check_host())
    }

    pub fn check_host(&self) -> String {
        format!("check.{}", self.service_domain)
    }

    pub fn fail_host(&self) -> String {
        format!("fail.{}", self.service_domain)
    }

    /// Domains queried via nslookup: the service apex plus the check and
    /// fail hosts. The fail host is expected not to resolve under the
    /// service's own resolvers.
    pub fn lookup_domains(&self) -> Vec<String> {
        vec![
            self.service_domain.clone(),
            self.check_host(),
            self.fail_host(),
        ]
    }
}
