use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Inclusive TCP port range. Bounds are checked by [`PortRange::validate`],
/// which the scanner runs before any network I/O.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start == 0 || self.end == 0 || self.start > self.end {
            return Err(ScanError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of ports covered, zero for an invalid range.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(1, 1024)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One host and the ports to scan on it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: IpAddr,
    pub range: PortRange,
}

impl ScanTarget {
    pub fn new(host: IpAddr, range: PortRange) -> Self {
        Self { host, range }
    }
}

/// Why a single port did not come back open.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeError {
    /// No answer within the connect deadline.
    Timeout,
    Refused,
    Unreachable,
    Cancelled,
    Other(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout => f.write_str("connect timed out"),
            ProbeError::Refused => f.write_str("connection refused"),
            ProbeError::Unreachable => f.write_str("host unreachable"),
            ProbeError::Cancelled => f.write_str("cancelled"),
            ProbeError::Other(msg) => f.write_str(msg),
        }
    }
}

/// Result of probing one port. Either `open` is true or `error` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortOutcome {
    pub port: u16,
    pub open: bool,
    pub service: Option<String>,
    pub banner: Option<String>,
    pub error: Option<ProbeError>,
    pub latency_ms: u64,
}

impl PortOutcome {
    pub fn open(port: u16, service: impl Into<String>, banner: Option<String>, latency_ms: u64) -> Self {
        Self {
            port,
            open: true,
            service: Some(service.into()),
            banner,
            error: None,
            latency_ms,
        }
    }

    pub fn failed(port: u16, error: ProbeError, latency_ms: u64) -> Self {
        Self {
            port,
            open: false,
            service: None,
            banner: None,
            error: Some(error),
            latency_ms,
        }
    }
}

/// Completed scan of one target: one outcome per requested port, sorted by port.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanResult {
    pub host: IpAddr,
    pub range: PortRange,
    pub outcomes: Vec<PortOutcome>,
    pub elapsed_ms: u64,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortOutcome> {
        self.outcomes.iter().filter(|o| o.open)
    }

    pub fn open_count(&self) -> usize {
        self.open_ports().count()
    }

    pub fn outcome(&self, port: u16) -> Option<&PortOutcome> {
        self.outcomes
            .binary_search_by_key(&port, |o| o.port)
            .ok()
            .map(|idx| &self.outcomes[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_len_is_inclusive() {
        assert_eq!(PortRange::new(1, 10).len(), 10);
        assert_eq!(PortRange::new(443, 443).len(), 1);
        assert_eq!(PortRange::new(1, 65535).len(), 65535);
        assert_eq!(PortRange::new(500, 100).len(), 0);
    }

    #[test]
    fn reversed_or_zero_bounds_are_invalid() {
        assert!(matches!(
            PortRange::new(500, 100).validate(),
            Err(ScanError::InvalidRange { start: 500, end: 100 })
        ));
        assert!(PortRange::new(0, 10).validate().is_err());
        assert!(PortRange::new(1, 1024).validate().is_ok());
    }

    #[test]
    fn outcome_constructors_set_exactly_one_side() {
        let o = PortOutcome::open(22, "SSH", None, 3);
        assert!(o.open && o.error.is_none());
        let f = PortOutcome::failed(23, ProbeError::Refused, 1);
        assert!(!f.open && f.error == Some(ProbeError::Refused) && f.service.is_none());
    }
}
