use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::command::run_command;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A single DNS query result as reported by the platform `nslookup` utility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    pub domain: String,
    pub resolver: String,
    pub address: String,
    pub value: String,
    #[serde(rename = "resolved_at")]
    pub resolved: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl DnsRecord {
    fn failed(domain: &str, error: String) -> Self {
        Self {
            domain: domain.to_string(),
            resolver: String::new(),
            address: String::new(),
            value: String::new(),
            resolved: Local::now().to_rfc3339(),
            error,
        }
    }
}

/// Parses `nslookup` text output. The last `Server:` line names the
/// resolver; every other `Address:` line contributes a candidate value. When
/// no resolver line is present the first candidate is reassigned as the
/// resolver. At most one record is emitted.
pub fn parse_nslookup_output(output: &str, domain: &str) -> Result<Vec<DnsRecord>> {
    let mut resolver = String::new();
    let mut values: Vec<String> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("Server:") {
            if let Some(token) = line.split_whitespace().nth(1) {
                resolver = token.to_string();
            }
        }
        if line.contains("Address:") && !line.starts_with("Server:") {
            if let Some(token) = line.split_whitespace().nth(1) {
                values.push(token.to_string());
            }
        }
    }

    if values.is_empty() {
        return Err(anyhow!("failed to parse nslookup output: {}", output));
    }

    if resolver.is_empty() {
        resolver = values.remove(0);
    } else if let Some(first) = values.first() {
        // The resolver's own address line is a candidate too; drop it so
        // the first real answer wins.
        if *first == resolver || first.starts_with(&format!("{}#", resolver)) {
            values.remove(0);
        }
    }

    let value = if values.is_empty() {
        String::new()
    } else {
        values.remove(0)
    };

    Ok(vec![DnsRecord {
        domain: domain.to_string(),
        address: format!("{}#53", resolver),
        resolver,
        value,
        resolved: Local::now().to_rfc3339(),
        error: String::new(),
    }])
}

/// Looks up one domain via the platform `nslookup` utility with a fixed
/// timeout. Process or parse failures degrade to a single error record
/// stamped with the call time.
pub async fn ns_lookup(domain: &str) -> Vec<DnsRecord> {
    info!("querying dns for {}", domain);

    let output = match run_command(LOOKUP_TIMEOUT, "nslookup", &[domain]).await {
        Ok(output) => output,
        Err(err) => {
            error!("nslookup failed for {}: {:#}", domain, err);
            return vec![DnsRecord::failed(domain, err.to_string())];
        }
    };

    match parse_nslookup_output(&output, domain) {
        Ok(records) => records,
        Err(err) => {
            error!("parsing nslookup output failed for {}: {:#}", domain, err);
            vec![DnsRecord::failed(domain, err.to_string())]
        }
    }
}
