use async_trait::async_trait;
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::{system_conf, TokioAsyncResolver};

/// PTR lookups for filling in a missing hostname.
#[derive(Clone)]
pub struct ReverseResolver {
    inner: Arc<TokioAsyncResolver>,
}

impl ReverseResolver {
    /// Uses the system resolver configuration, falling back to the library
    /// defaults when it cannot be read.
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = system_conf::read_system_conf().unwrap_or_else(|e| {
            debug!("system resolver config unavailable ({e}), using defaults");
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            inner: Arc::new(TokioAsyncResolver::tokio(config, opts)),
        }
    }

    /// Names associated with `ip`; empty when the lookup fails or finds nothing.
    pub async fn names(&self, ip: IpAddr) -> Vec<String> {
        match self.inner.reverse_lookup(ip).await {
            Ok(lookup) => lookup.iter().map(|ptr| trim_root(&ptr.to_string())).collect(),
            Err(e) => {
                debug!("reverse lookup for {ip} failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Source of PTR names for an address.
#[async_trait]
pub trait ReverseLookup: Send + Sync + 'static {
    async fn names(&self, ip: IpAddr) -> Vec<String>;
}

#[async_trait]
impl ReverseLookup for ReverseResolver {
    async fn names(&self, ip: IpAddr) -> Vec<String> {
        ReverseResolver::names(self, ip).await
    }
}

fn trim_root(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}

/// Join names the way they are displayed, or `None` for an empty list.
pub fn join_names(names: &[String]) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}
