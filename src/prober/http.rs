use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::{HttpClient, RequestDescriptor};
use crate::context::{CheckResult, RunContext};

/// GETs `https://<domain>` and records the response body, or the error, under
/// the domain. Errors degrade to recorded strings so the report can always be
/// produced.
pub async fn check_domain(
    ctx: &RunContext,
    client: &HttpClient,
    cancel: &CancellationToken,
    domain: &str,
) {
    let desc = RequestDescriptor::get(format!("https://{}", domain)).with_timeout_secs(2);

    let response = match client.request(&desc, cancel).await {
        Ok(response) => response,
        Err(err) => {
            error!("can't get {}: {}", domain, err);
            ctx.store
                .record_response(domain, format!("Error: {}", err));
            return;
        }
    };

    match response.text().await {
        Ok(body) => {
            info!("{} responded: {}", domain, body.trim());
            ctx.store.record_response(domain, body);
        }
        Err(err) => {
            error!("can't read {} body: {}", domain, err);
            ctx.store
                .record_response(domain, format!("Error reading body: {}", err));
        }
    }
}

/// GETs `https://<ip>` carrying the service hostname as SNI/Host override and
/// records a structured check result under the IP. A successful response also
/// marks the IP HTTP-reachable so later sweeps skip it.
pub async fn check_over_ip(
    ctx: &RunContext,
    client: &HttpClient,
    cancel: &CancellationToken,
    host_header: &str,
    ip: &str,
) {
    info!("checking {} over ip {}", host_header, ip);
    let desc = RequestDescriptor::get(format!("https://{}", ip)).with_header("Host", host_header);

    let response = match client.request(&desc, cancel).await {
        Ok(response) => response,
        Err(err) => {
            error!("check over {} failed: {}", ip, err);
            ctx.store.record_check(
                ip,
                CheckResult {
                    error: format!("Error: {}", err),
                    ..CheckResult::default()
                },
            );
            return;
        }
    };

    ctx.reachable.mark(ip);
    let code = response.status().as_u16();
    match response.text().await {
        Ok(body) => {
            info!("check over {} returned {}: {}", ip, code, body.trim());
            ctx.store.record_check(
                ip,
                CheckResult {
                    code,
                    result: body,
                    error: String::new(),
                },
            );
        }
        Err(err) => {
            error!("can't read check body from {}: {}", ip, err);
            ctx.store.record_check(
                ip,
                CheckResult {
                    code,
                    result: String::new(),
                    error: format!("Error reading body: {}", err),
                },
            );
        }
    }
}
