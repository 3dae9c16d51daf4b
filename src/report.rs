use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RunConfig;
use crate::context::{CheckResult, RunContext};
use crate::prober::nslookup::DnsRecord;

/// Aggregate diagnostic report built from one run's result store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub plan: String,
    pub local_time: String,
    pub dns_servers: Vec<String>,
    pub ping_reports: HashMap<String, String>,
    pub request_result: HashMap<String, String>,
    pub ns_lookup: HashMap<String, Vec<DnsRecord>>,
    pub check_result: HashMap<String, CheckResult>,
}

impl Report {
    pub fn from_run(
        config: &RunConfig,
        dns_servers: Vec<String>,
        ns_lookup: HashMap<String, Vec<DnsRecord>>,
        ctx: &RunContext,
    ) -> Self {
        Self {
            plan: config.plan.to_string(),
            local_time: Local::now().to_rfc3339(),
            dns_servers,
            ping_reports: ctx.store.ping_snapshot(),
            request_result: ctx.store.response_snapshot(),
            ns_lookup,
            check_result: ctx.store.check_snapshot(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}

/// POSTs the report to the endpoint named by `REPORT_SERVER_URL`. With the
/// variable unset the report is only printed.
pub async fn send_report(report: &Report) -> Result<()> {
    let json = report.to_json()?;
    println!("{}", json);

    let Ok(endpoint) = std::env::var("REPORT_SERVER_URL") else {
        info!("REPORT_SERVER_URL not set, skipping report upload");
        return Ok(());
    };

    let client = reqwest::Client::new();
    let response = client
        .post(&endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(json)
        .send()
        .await
        .context("failed to send report")?;

    let ack = response.text().await.unwrap_or_default();
    info!("report saved: {}", ack.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reflects_the_result_store() {
        let ctx = RunContext::new();
        ctx.store.record_ping("178.22.122.100", 27.5);
        ctx.store
            .record_response("check.shecan.ir", "your dns is shecan".into());
        ctx.store.record_check(
            "178.22.122.100",
            CheckResult {
                code: 200,
                result: "ok".into(),
                error: String::new(),
            },
        );

        let report = Report::from_run(
            &RunConfig::default(),
            vec!["178.22.122.100".into()],
            HashMap::new(),
            &ctx,
        );
        assert_eq!(report.plan, "Pro");
        assert_eq!(
            report.ping_reports.get("178.22.122.100").unwrap(),
            "27.50 ms"
        );
        assert_eq!(report.check_result.get("178.22.122.100").unwrap().code, 200);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"ping_reports\""));
        assert!(json.contains("your dns is shecan"));
    }
}
