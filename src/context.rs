use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Outcome of one HTTPS-over-IP check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub code: u16,
    pub result: String,
    pub error: String,
}

/// Append-only set of hosts, keyed by trimmed target string.
#[derive(Debug, Default)]
pub struct HostSet(Mutex<HashSet<String>>);

impl HostSet {
    pub fn mark(&self, host: &str) {
        let host = host.trim();
        if host.is_empty() {
            return;
        }
        self.0.lock().unwrap().insert(host.to_string());
    }

    pub fn contains(&self, host: &str) -> bool {
        let host = host.trim();
        if host.is_empty() {
            return false;
        }
        self.0.lock().unwrap().contains(host)
    }
}

/// Aggregated probe results for one run. Each map carries its own lock so a
/// slow ping sweep never blocks concurrent HTTP sweeps; last writer wins per
/// key.
#[derive(Debug, Default)]
pub struct ResultStore {
    ping: Mutex<HashMap<String, String>>,
    responses: Mutex<HashMap<String, String>>,
    checks: Mutex<HashMap<String, CheckResult>>,
}

impl ResultStore {
    pub fn record_ping(&self, target: &str, rtt: f64) {
        self.ping
            .lock()
            .unwrap()
            .insert(target.to_string(), format!("{:.2} ms", rtt));
    }

    pub fn record_response(&self, domain: &str, value: String) {
        self.responses
            .lock()
            .unwrap()
            .insert(domain.to_string(), value);
    }

    pub fn record_check(&self, ip: &str, entry: CheckResult) {
        self.checks.lock().unwrap().insert(ip.to_string(), entry);
    }

    pub fn response(&self, domain: &str) -> Option<String> {
        self.responses.lock().unwrap().get(domain).cloned()
    }

    pub fn ping_snapshot(&self) -> HashMap<String, String> {
        self.ping.lock().unwrap().clone()
    }

    pub fn response_snapshot(&self) -> HashMap<String, String> {
        self.responses.lock().unwrap().clone()
    }

    pub fn check_snapshot(&self) -> HashMap<String, CheckResult> {
        self.checks.lock().unwrap().clone()
    }
}

/// Shared state for one diagnostic run: the result store plus the two probe
/// caches. Constructed fresh per run so runs can coexist in tests.
#[derive(Debug, Default)]
pub struct RunContext {
    pub store: ResultStore,
    /// Hosts already confirmed reachable over HTTP.
    pub reachable: HostSet,
    /// Hosts already ping-probed this run.
    pub pinged: HostSet,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}
