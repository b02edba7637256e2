use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::types::PortRange;

/// Parse a port range argument: `start-end` (inclusive) or a single port.
pub fn parse_range(s: &str) -> Result<PortRange> {
    let s = s.trim();
    let (start, end) = match s.split_once('-') {
        Some((a, b)) => (
            parse_port_str(a.trim()).with_context(|| format!("invalid start in range: {a}"))?,
            parse_port_str(b.trim()).with_context(|| format!("invalid end in range: {b}"))?,
        ),
        None => {
            let p = parse_port_str(s).with_context(|| format!("invalid port value: {s}"))?;
            (p, p)
        }
    };
    let range = PortRange::new(start, end);
    range.validate()?;
    Ok(range)
}

/// Parse services file content into `(port, name)` pairs.
///
/// Supported formats per line:
/// - `<port> <name>`, e.g. `8080 HTTP-Alt`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// A later line for the same port replaces the earlier one.
pub fn parse_services_str(s: &str) -> Result<Vec<(u16, String)>> {
    let mut out: Vec<(u16, String)> = Vec::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(port), Some(name)) = (parts.next(), parts.next()) else {
            bail!("line {line_no}: expected `<port> <name>`: {line}");
        };
        if parts.next().is_some() {
            bail!("line {line_no}: trailing text after service name: {line}");
        }
        let port = parse_port_str(port)
            .with_context(|| format!("line {line_no}: invalid port value: {port}"))?;

        if let Some(slot) = out.iter_mut().find(|(p, _)| *p == port) {
            slot.1 = name.to_string();
        } else {
            out.push((port, name.to_string()));
        }
    }

    Ok(out)
}

/// Load service entries from a file path. Errors if the file cannot be read or parsed.
pub fn load_services_from_path(path: impl AsRef<Path>) -> Result<Vec<(u16, String)>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read services file: {}", path.as_ref().display()))?;
    parse_services_str(&content)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
