use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

/// Turns the target host into candidate nameserver addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Addresses in the order they should be tried. Duplicates are kept.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String>;
}

/// Uses the operating system resolver via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        // Literal addresses need no lookup
        if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| e.to_string())?
            .map(|addr| addr.ip())
            .collect::<Vec<_>>();

        debug!("Resolved {} to {} address(es): {:?}", host, addrs.len(), addrs);
        Ok(addrs)
    }
}
