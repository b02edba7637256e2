use crate::resolver::{self, ReverseResolver};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Descriptive record for one address as returned by ipinfo.io.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IpInfo {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    /// `"lat,lon"`
    #[serde(rename = "loc")]
    pub location: String,
    pub org: String,
    pub timezone: String,
    pub postal: String,
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup returned {0}")]
    Status(reqwest::StatusCode),
}

/// Source of host metadata for a validated address.
#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    async fn lookup(&self, ip: IpAddr) -> Result<IpInfo, LookupError>;
}

pub struct IpInfoClient {
    http: reqwest::Client,
    base_url: String,
    resolver: Option<ReverseResolver>,
}

impl IpInfoClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LookupError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver: None,
        }
    }

    /// Fill empty hostnames with PTR names from `resolver`.
    pub fn with_resolver(mut self, resolver: ReverseResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    fn url_for(&self, ip: IpAddr) -> String {
        format!("{}/{}/json", self.base_url, ip)
    }
}

#[async_trait]
impl MetadataSource for IpInfoClient {
    async fn lookup(&self, ip: IpAddr) -> Result<IpInfo, LookupError> {
        let url = self.url_for(ip);
        debug!("GET {url}");
        let response = self.http.get(&url).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(LookupError::Status(response.status()));
        }

        let mut info: IpInfo = response.json().await?;

        if info.hostname.is_empty() {
            let names = match &self.resolver {
                Some(r) => r.names(ip).await,
                None => Vec::new(),
            };
            info.hostname = resolver::join_names(&names).unwrap_or_else(|| "Unknown".to_string());
        }

        Ok(info)
    }
}
