use crate::config::OutputConfig;
use crate::error::ScanError;
use crate::ipinfo::{IpInfo, MetadataSource};
use crate::scanlog;
use crate::scanner::{Dialer, SharedProgress};
use crate::session::{HostReport, Session, SessionReport};
use crate::types::PortRange;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::fmt::Write as _;
use std::fs::File;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ASCII_ART: &str = r#"
   ___ ____  ___        __         ____
  |_ _|  _ \|_ _|_ __  / _| ___   / ___|  ___ __ _ _ __
   | || |_) || || '_ \| |_ / _ \  \___ \ / __/ _` | '_ \
   | ||  __/ | || | | |  _| (_) |  ___) | (_| (_| | | | |
  |___|_|   |___|_| |_|_|  \___/  |____/ \___\__,_|_| |_|
"#;

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Clear,
    Help,
    Empty,
    Scan(Vec<String>),
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => Command::Empty,
        "exit" | "quit" => Command::Exit,
        "clear" => Command::Clear,
        "help" => Command::Help,
        _ => {
            let inputs = crate::address::split_batch(trimmed);
            if inputs.is_empty() {
                Command::Empty
            } else {
                Command::Scan(inputs)
            }
        }
    }
}

pub fn print_welcome() {
    println!("{}", ASCII_ART.green());
    println!("{}", "Welcome to ipinfo-scan!".cyan());
    println!("{}", "Type 'help' for a list of commands.".cyan());
    println!(
        "{}",
        "Enter IP addresses (comma-separated for multiple IPs) or type a command:".cyan()
    );
}

pub fn print_help() {
    println!("{}", "Commands available:".cyan());
    println!("{}", "  clear  - Clears the screen".cyan());
    println!("{}", "  exit   - Exits the tool".cyan());
    println!("{}", "  help   - Displays this help message".cyan());
    println!("{}", "Usage:".cyan());
    println!(
        "{}",
        "  Enter one or multiple IP addresses separated by commas to scan them.".cyan()
    );
    println!("{}", "  Example: 192.168.1.1,8.8.8.8".cyan());
}

pub fn clear_screen() {
    print!("\x1b[H\x1b[2J");
    println!(
        "{}",
        "Screen cleared. Enter new IP addresses or type a command:".cyan()
    );
}

/// Render one finished session for the console.
pub fn format_report(report: &SessionReport, show_closed: bool) -> String {
    let mut out = String::new();
    match &report.outcome {
        Ok(host) => format_host(&mut out, host, show_closed),
        Err(e @ ScanError::InvalidAddress(_)) => {
            let _ = writeln!(out, "{}", e.to_string().red());
        }
        Err(e) => {
            let _ = writeln!(out, "{}", format!("Error scanning {}: {e}", report.input).red());
        }
    }
    out
}

fn format_host(out: &mut String, host: &HostReport, show_closed: bool) {
    let ip = host.address;
    match (&host.metadata, &host.metadata_error) {
        (Some(info), _) => format_metadata(out, info),
        (None, Some(err)) => {
            let _ = writeln!(out, "{}", format!("Error fetching IP info for {ip}: {err}").red());
        }
        (None, None) => {}
    }
    let _ = writeln!(
        out,
        "{}",
        format!("Reverse DNS: {}", host.reverse_dns.as_deref().unwrap_or("N/A")).magenta()
    );

    let _ = writeln!(out, "{}", format!("Port scan for {ip} ({}):", host.scan.range).blue());
    for o in &host.scan.outcomes {
        if o.open {
            let _ = writeln!(
                out,
                "{}",
                format!(
                    "Port {} open on {ip} - Service: {} ({} ms)",
                    o.port,
                    o.service.as_deref().unwrap_or("Unknown"),
                    o.latency_ms
                )
                .green()
            );
            if let Some(banner) = &o.banner {
                let _ = writeln!(out, "{}", format!("  Banner: {banner}").magenta());
            }
        } else if show_closed {
            let reason = o.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
            let _ = writeln!(out, "{}", format!("Port {} on {ip} - {reason}", o.port).red());
        }
    }
    let _ = writeln!(
        out,
        "{}",
        format!(
            "Port scan completed for {ip}: {} open of {} scanned in {} ms",
            host.scan.open_count(),
            host.scan.len(),
            host.scan.elapsed_ms
        )
        .green()
    );
}

fn format_metadata(out: &mut String, info: &IpInfo) {
    let _ = writeln!(out, "{}", format!("IP: {}", info.ip).cyan());
    let _ = writeln!(out, "{}", format!("Hostname: {}", info.hostname).green());
    let _ = writeln!(
        out,
        "{}",
        format!("Location: {}, {}, {}", info.city, info.region, info.country).yellow()
    );
    if !info.location.is_empty() {
        let _ = writeln!(out, "{}", format!("Coordinates: {}", info.location).yellow());
    }
    if !info.postal.is_empty() {
        let _ = writeln!(out, "{}", format!("Postal: {}", info.postal).yellow());
    }
    let _ = writeln!(out, "{}", format!("Timezone: {}", info.timezone).red());
    let _ = writeln!(out, "{}", format!("Organization: {}", info.org).cyan());
}

/// Ports the batch will actually probe; invalid tokens never reach the scanner.
fn batch_port_total(inputs: &[String], range: PortRange) -> u64 {
    let valid = inputs.iter().filter(|t| crate::address::validate(t)).count();
    valid as u64 * range.len() as u64
}

/// What a Ctrl-C during a batch does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    CancelBatch,
    ForceExit,
}

fn on_interrupt(cancelled: bool) -> Interrupt {
    if cancelled {
        Interrupt::ForceExit
    } else {
        Interrupt::CancelBatch
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run one batch with a live spinner, printing each address as it finishes.
/// Ctrl-C cancels the batch. The finished batch is appended to the scan log
/// and optionally exported as JSON.
pub async fn run_batch<M: MetadataSource, D: Dialer>(
    session: &Session<M, D>,
    inputs: Vec<String>,
    output: &OutputConfig,
) -> Result<Vec<SessionReport>> {
    let total_ports = batch_port_total(&inputs, session.scanner().config().port_range);
    let cancel = CancellationToken::new();
    let progress = SharedProgress::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let batch = {
        let session = session.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            session
                .run_batch_with_progress(inputs, cancel, tx, progress)
                .await
        })
    };

    let spinner = create_spinner("Scanning...");
    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut ctrl_c_armed = true;
    let mut reports = Vec::new();

    loop {
        tokio::select! {
            report = rx.recv() => match report {
                Some(report) => {
                    spinner.suspend(|| print!("{}", format_report(&report, output.show_closed)));
                    reports.push(report);
                }
                None => break,
            },
            _ = ticker.tick() => {
                spinner.set_message(format!(
                    "Scanning... {}/{} ports, {} open",
                    progress.scanned(),
                    total_ports,
                    progress.open()
                ));
            }
            res = tokio::signal::ctrl_c(), if ctrl_c_armed => match res {
                Ok(()) => match on_interrupt(cancel.is_cancelled()) {
                    Interrupt::CancelBatch => {
                        spinner.suspend(|| {
                            println!("{}", "Cancelling scan... (Ctrl-C again to quit)".yellow())
                        });
                        cancel.cancel();
                    }
                    Interrupt::ForceExit => {
                        spinner.finish_and_clear();
                        println!("{}", "Aborted.".yellow());
                        std::process::exit(130);
                    }
                },
                Err(e) => {
                    ctrl_c_armed = false;
                    warn!("cannot listen for Ctrl-C: {e}");
                }
            },
        }
    }

    if let Err(e) = batch.await {
        warn!("batch task failed: {e}");
    }
    spinner.finish_and_clear();
    println!("{}", "Scanning completed.".green());

    reports.sort_by_key(|r| r.index);
    match scanlog::append(&output.log_dir, &reports) {
        Ok(path) => log::info!("appended batch to {}", path.display()),
        Err(e) => println!("{}", format!("Error writing scan log: {e}").red()),
    }
    if let Some(path) = output.json.as_deref() {
        match write_results_json(path, &reports) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => println!("{}", format!("Failed to write JSON to {}: {e}", path.display()).red()),
        }
    }

    Ok(reports)
}

/// Line-oriented command loop on stdin. Returns on `exit` or end of input.
pub async fn run_interactive<M: MetadataSource, D: Dialer>(
    session: &Session<M, D>,
    output: &OutputConfig,
) -> Result<()> {
    print_welcome();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        match next_command(&mut lines, tokio::signal::ctrl_c()).await? {
            Command::Exit => {
                println!("{}", "Exiting the tool. Goodbye!".yellow());
                break;
            }
            Command::Clear => clear_screen(),
            Command::Help => print_help(),
            Command::Empty => {}
            Command::Scan(inputs) => {
                run_batch(session, inputs, output).await?;
            }
        }
    }
    Ok(())
}

/// Read the next prompt command. End of input and an interrupt at the
/// prompt both mean `Exit`.
async fn next_command<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Command>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => match line.context("failed to read stdin")? {
            Some(line) => Ok(parse_command(&line)),
            None => Ok(Command::Exit),
        },
        res = interrupt => {
            res.context("failed to listen for Ctrl-C")?;
            println!();
            Ok(Command::Exit)
        }
    }
}

/// Pretty JSON of every scanned host in the batch.
pub fn write_results_json(path: &Path, reports: &[SessionReport]) -> Result<()> {
    let hosts: Vec<&HostReport> = reports.iter().filter_map(|r| r.outcome.as_ref().ok()).collect();
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &hosts)?;
    Ok(())
}
