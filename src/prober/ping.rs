use std::time::Duration;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::command::run_command;
use crate::context::RunContext;

/// RTT at or above this is reported as unhealthy. Display only, the stored
/// value is unaffected.
const UNHEALTHY_RTT_MS: f64 = 600.0;

static WINDOWS_AVG: Lazy<Regex> = Lazy::new(|| Regex::new(r"Average = (\d+)ms").unwrap());
static UNIX_AVG: Lazy<Regex> = Lazy::new(|| {
    // Handles 'nan' in the stddev slot, seen on single-packet runs.
    Regex::new(r"min/avg/max/stddev = [\d.]+/([\d.]+)/[\d.]+/(?:[\d.]+|nan) ms").unwrap()
});

/// Extracts the average round-trip time from ping output, trying the Windows
/// summary line first and the Unix one second.
pub fn extract_avg_rtt(output: &str) -> Result<f64> {
    for pattern in [&*WINDOWS_AVG, &*UNIX_AVG] {
        if let Some(caps) = pattern.captures(output) {
            if let Ok(rtt) = caps[1].trim().parse::<f64>() {
                return Ok(rtt);
            }
        }
    }
    Err(anyhow!("could not parse ping output"))
}

async fn ping_server(target: &str, count: u32, timeout_secs: u64) -> Result<f64> {
    let count_arg = count.to_string();
    // The utility bounds itself via count * per-packet timeout; the process
    // deadline only guards against a wedged binary.
    let deadline = Duration::from_secs(timeout_secs.saturating_mul(count as u64).saturating_add(5));

    #[cfg(target_os = "windows")]
    let output = {
        let wait_ms = timeout_secs.saturating_mul(1000).to_string();
        run_command(deadline, "ping", &["-n", &count_arg, "-w", &wait_ms, target]).await?
    };

    #[cfg(not(target_os = "windows"))]
    let output = {
        let wait_secs = timeout_secs.to_string();
        run_command(deadline, "ping", &["-c", &count_arg, "-W", &wait_secs, target]).await?
    };

    extract_avg_rtt(&output)
}

/// Pings one target and records the outcome. Failures record the `-1`
/// sentinel so the target is still visible in the report and never
/// re-probed, and the target is always marked in the dedup cache.
pub async fn ping_host(ctx: &RunContext, target: &str, count: u32, timeout_secs: u64) -> f64 {
    info!("pinging {}", target);
    let rtt = match ping_server(target, count, timeout_secs).await {
        Ok(rtt) => rtt,
        Err(err) => {
            error!("ping {} failed: {:#}", target, err);
            -1.0
        }
    };

    if rtt >= UNHEALTHY_RTT_MS || rtt == -1.0 {
        warn!("{}: avg rtt {:.2} ms (unhealthy)", target, rtt);
    } else {
        info!("{}: avg rtt {:.2} ms", target, rtt);
    }

    ctx.store.record_ping(target, rtt);
    ctx.pinged.mark(target);
    rtt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_summary() {
        let output = "round-trip min/avg/max/stddev = 10.0/15.2/20.0/2.1 ms";
        assert_eq!(extract_avg_rtt(output).unwrap(), 15.2);
    }

    #[test]
    fn parses_unix_summary_with_nan_stddev() {
        let output = "round-trip min/avg/max/stddev = 12.1/12.1/12.1/nan ms";
        assert_eq!(extract_avg_rtt(output).unwrap(), 12.1);
    }

    #[test]
    fn parses_windows_summary() {
        let output = "Minimum = 40ms, Maximum = 44ms, Average = 42ms";
        assert_eq!(extract_avg_rtt(output).unwrap(), 42.0);
    }

    #[test]
    fn windows_pattern_wins_when_both_present() {
        let output = "Average = 42ms\nround-trip min/avg/max/stddev = 10.0/15.2/20.0/2.1 ms";
        assert_eq!(extract_avg_rtt(output).unwrap(), 42.0);
    }

    #[test]
    fn unparseable_output_is_an_error() {
        assert!(extract_avg_rtt("Request timeout for icmp_seq 0").is_err());
    }

    #[test]
    fn parses_full_macos_transcript() {
        let output = "\
PING 1.1.1.1 (1.1.1.1): 56 data bytes
64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=11.835 ms
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.278 ms

--- 1.1.1.1 ping statistics ---
2 packets transmitted, 2 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 11.835/12.056/12.278/0.222 ms
";
        assert_eq!(extract_avg_rtt(output).unwrap(), 12.056);
    }
}
