use std::collections::HashMap;
use std::path::Path;

use crate::ports;

pub const UNKNOWN_SERVICE: &str = "Unknown";

const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (443, "HTTPS"),
    (445, "Microsoft-DS"),
    (3306, "MySQL"),
    (3389, "RDP"),
];

/// Name of the well-known service on `port`, or `"Unknown"`.
pub fn classify(port: u16) -> &'static str {
    WELL_KNOWN
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_SERVICE)
}

/// Built-in table plus user-supplied entries, which take precedence.
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    extra: HashMap<u16, String>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut table = Self::new();
        table.extend(ports::load_services_from_path(path)?);
        Ok(table)
    }

    pub fn insert(&mut self, port: u16, name: impl Into<String>) {
        self.extra.insert(port, name.into());
    }

    pub fn lookup(&self, port: u16) -> &str {
        self.extra
            .get(&port)
            .map(String::as_str)
            .unwrap_or_else(|| classify(port))
    }
}

impl Extend<(u16, String)> for ServiceTable {
    fn extend<T: IntoIterator<Item = (u16, String)>>(&mut self, iter: T) {
        self.extra.extend(iter);
    }
}
