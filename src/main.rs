use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reach_probe::client::{HttpClient, RequestDescriptor};
use reach_probe::config::RunConfig;
use reach_probe::context::RunContext;
use reach_probe::prober::nslookup;
use reach_probe::report::{self, Report};
use reach_probe::scheduler::Sweeps;
use reach_probe::util::unique;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let config = RunConfig::load().await?;
    let log_level = config.get_tracing_level()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            format!("reach_probe={}", log_level.as_str().to_lowercase()).parse()?,
        ))
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, aborting in-flight requests");
                cancel.cancel();
            }
        });
    }

    let ctx = Arc::new(RunContext::new());
    let client = Arc::new(HttpClient::new(
        config.request_config(),
        &config.service_domain,
    )?);
    let sweeps = Sweeps::new(
        Arc::clone(&ctx),
        Arc::clone(&client),
        cancel.clone(),
        config.sweep_concurrency,
    );

    // DNS servers for the configured plan, then a latency sweep over them.
    info!("fetching dns servers for the {} plan", config.plan);
    let dns_servers = fetch_list(&client, &cancel, &config.dns_list_url())
        .await
        .context("can't fetch the dns server list")?;
    if dns_servers.is_empty() {
        bail!("no dns servers returned for the {} plan", config.plan);
    }
    sweeps
        .ping_sweep(&dns_servers, config.ping_count, config.ping_timeout_secs)
        .await;

    // nslookup over the service domains; the fail host is expected to fail
    // when the service's resolvers are in use.
    let lookup_domains = config.lookup_domains();
    let mut ns_results = HashMap::new();
    for domain in &lookup_domains {
        ns_results.insert(domain.clone(), nslookup::ns_lookup(domain).await);
    }

    info!("checking service domains");
    sweeps.domain_sweep(&lookup_domains[1..]).await;

    let check_host = config.check_host();
    match ctx.store.response(&check_host) {
        Some(body) if !body.is_empty() && !body.contains("Error") => {}
        _ => bail!("can't reach {}", check_host),
    }

    let fail_host = config.fail_host();
    if let Some(body) = ctx.store.response(&fail_host) {
        if !body.is_empty() && !body.contains("Error") {
            bail!(
                "{} resolved: another dns server, vpn or forced dns is in use",
                fail_host
            );
        }
    }

    // The service's own IPs: HTTPS with Host override first, then ping
    // whatever was not already confirmed reachable.
    let ips = fetch_list(&client, &cancel, &config.ip_list_url())
        .await
        .context("can't fetch the service ip list")?;
    info!("checking the service over {} ips", ips.len());
    sweeps.ip_check_sweep(&ips, &check_host).await;
    sweeps.ping_sweep(&ips, 2, 2).await;

    let report = Report::from_run(&config, dns_servers, ns_results, &ctx);
    report::send_report(&report).await?;
    info!("diagnostic run complete");
    Ok(())
}

/// Fetches a newline-separated list, trimming entries and dropping
/// duplicates and blanks.
async fn fetch_list(
    client: &HttpClient,
    cancel: &CancellationToken,
    url: &str,
) -> Result<Vec<String>> {
    let response = client.request(&RequestDescriptor::get(url), cancel).await?;
    let body = response.text().await?;
    Ok(unique(body.lines()))
}
