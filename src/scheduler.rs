use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::HttpClient;
use crate::context::RunContext;
use crate::prober::{http, ping};

pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

/// Fans `probe` out over `targets` with at most `limit` probes in flight,
/// and only returns once every spawned worker has finished. Results are the
/// probe's own side effects; nothing is returned per target.
pub async fn run_bounded<F, Fut>(targets: Vec<String>, limit: usize, probe: F)
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers = JoinSet::new();

    for target in targets {
        let permits = Arc::clone(&permits);
        let probe = probe.clone();
        workers.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            probe(target).await;
        });
    }

    while workers.join_next().await.is_some() {}
}

/// Targets eligible for a ping sweep: trimmed, non-empty, not already pinged,
/// and not already confirmed reachable over HTTP (pinging those is
/// redundant).
pub fn ping_candidates(ctx: &RunContext, targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !ctx.pinged.contains(t) && !ctx.reachable.contains(t))
        .collect()
}

/// Targets eligible for an HTTPS-over-IP sweep: trimmed, non-empty, and not
/// already confirmed reachable.
pub fn check_candidates(ctx: &RunContext, targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !ctx.reachable.contains(t))
        .collect()
}

/// Targets eligible for a domain sweep: trimmed and non-empty.
pub fn domain_candidates(targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Bounded probe sweeps over one run's shared context.
pub struct Sweeps {
    ctx: Arc<RunContext>,
    client: Arc<HttpClient>,
    cancel: CancellationToken,
    concurrency: usize,
}

impl Sweeps {
    pub fn new(
        ctx: Arc<RunContext>,
        client: Arc<HttpClient>,
        cancel: CancellationToken,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx,
            client,
            cancel,
            concurrency,
        }
    }

    pub async fn ping_sweep(&self, targets: &[String], count: u32, timeout_secs: u64) {
        let pending = ping_candidates(&self.ctx, targets);
        let ctx = Arc::clone(&self.ctx);
        run_bounded(pending, self.concurrency, move |target| {
            let ctx = Arc::clone(&ctx);
            async move {
                ping::ping_host(&ctx, &target, count, timeout_secs).await;
            }
        })
        .await;
    }

    pub async fn domain_sweep(&self, domains: &[String]) {
        let pending = domain_candidates(domains);
        let ctx = Arc::clone(&self.ctx);
        let client = Arc::clone(&self.client);
        let cancel = self.cancel.clone();
        run_bounded(pending, self.concurrency, move |domain| {
            let ctx = Arc::clone(&ctx);
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            async move {
                http::check_domain(&ctx, &client, &cancel, &domain).await;
            }
        })
        .await;
    }

    pub async fn ip_check_sweep(&self, ips: &[String], host_header: &str) {
        let pending = check_candidates(&self.ctx, ips);
        let ctx = Arc::clone(&self.ctx);
        let client = Arc::clone(&self.client);
        let cancel = self.cancel.clone();
        let host_header = host_header.to_string();
        run_bounded(pending, self.concurrency, move |ip| {
            let ctx = Arc::clone(&ctx);
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            let host_header = host_header.clone();
            async move {
                http::check_over_ip(&ctx, &client, &cancel, &host_header, &ip).await;
            }
        })
        .await;
    }
}
