use crate::error::Result;
use crate::session::SessionReport;
use ::time::{format_description, format_description::well_known, OffsetDateTime};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const LOG_FILE: &str = "scan_results.log";

/// Append a timestamped record of a finished batch to `<dir>/scan_results.log`,
/// creating the directory if needed. Returns the log file path.
pub fn append(dir: &Path, reports: &[SessionReport]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_record(&timestamp_now(), reports).as_bytes())?;
    writer.flush()?;
    Ok(path)
}

/// One batch record: header line, one `- <input>` line per address, blank line.
pub fn format_record(timestamp: &str, reports: &[SessionReport]) -> String {
    let mut out = format!("Scan results at {timestamp}:\n");
    for report in reports {
        out.push_str("- ");
        out.push_str(&report.input);
        match &report.outcome {
            Ok(host) => {
                let open: Vec<String> = host
                    .scan
                    .open_ports()
                    .map(|o| format!("{}/{}", o.port, o.service.as_deref().unwrap_or("Unknown")))
                    .collect();
                if open.is_empty() {
                    out.push_str(" [no open ports]");
                } else {
                    out.push_str(&format!(" [{}]", open.join(", ")));
                }
            }
            Err(e) => out.push_str(&format!(" ({e})")),
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

fn timestamp_now() -> String {
    let now = OffsetDateTime::now_utc();
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second] UTC")
        .ok()
        .and_then(|fmt| now.format(&fmt).ok())
        .or_else(|| now.format(&well_known::Rfc3339).ok())
        .unwrap_or_else(|| String::from("1970-01-01 00:00:00 UTC"))
}
