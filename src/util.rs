use std::collections::HashSet;
use std::net::IpAddr;

use anyhow::Result;

pub async fn resolve_host_to_ip(host: &str) -> Result<IpAddr> {
    // First try to parse as IP address
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    // If parsing fails, resolve via DNS
    let addr = format!("{}:0", host);
    let mut addrs = tokio::net::lookup_host(&addr).await?;
    Ok(addrs
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not resolve hostname: {}", host))?
        .ip())
}

/// Trims every entry, drops empties, and keeps the first occurrence of each.
pub fn unique<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_string()) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_trims_and_dedupes() {
        let items = vec!["1.2.3.4", " 1.2.3.4 ", "", "  ", "5.6.7.8", "1.2.3.4"];
        assert_eq!(unique(items), vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[tokio::test]
    async fn resolve_accepts_ip_literals() {
        let ip = resolve_host_to_ip("127.0.0.1").await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
