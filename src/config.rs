use std::path::PathBuf;
use std::time::Duration;

use crate::services::ServiceTable;
use crate::types::PortRange;

pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_BANNER_SIZE: usize = 1024;
pub const DEFAULT_IPINFO_URL: &str = "https://ipinfo.io";

/// Tunables for the scan engine.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum simultaneous probes.
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
    /// Read buffer size for the banner grab.
    pub banner_size: usize,
    /// Range used by host sessions.
    pub port_range: PortRange,
    pub services: ServiceTable,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            banner_size: DEFAULT_BANNER_SIZE,
            port_range: PortRange::default(),
            services: ServiceTable::default(),
        }
    }
}

/// Where batch records and exports go.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub log_dir: PathBuf,
    pub json: Option<PathBuf>,
    pub show_closed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            json: None,
            show_closed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.concurrency, 20);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(2));
        assert_eq!(cfg.banner_timeout, Duration::from_secs(2));
        assert_eq!(cfg.banner_size, 1024);
        assert_eq!(cfg.port_range, PortRange::new(1, 1024));

        let out = OutputConfig::default();
        assert_eq!(out.log_dir, PathBuf::from("logs"));
        assert!(out.json.is_none());
    }
}
