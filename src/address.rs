use std::net::IpAddr;

use crate::error::{Result, ScanError};

/// True if `token` is a complete IPv4 or IPv6 address. Hostnames are rejected.
pub fn validate(token: &str) -> bool {
    token.parse::<IpAddr>().is_ok()
}

pub fn parse_address(token: &str) -> Result<IpAddr> {
    token
        .parse::<IpAddr>()
        .map_err(|_| ScanError::InvalidAddress(token.to_string()))
}

/// Split a comma-separated input line into trimmed, non-empty tokens.
pub fn split_batch(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
