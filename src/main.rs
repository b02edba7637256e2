use std::path::PathBuf;
use std::time::Duration;

use ipinfo_scan::config::{OutputConfig, ScanConfig, DEFAULT_BANNER_SIZE, DEFAULT_IPINFO_URL};
use ipinfo_scan::ipinfo::IpInfoClient;
use ipinfo_scan::resolver::ReverseResolver;
use ipinfo_scan::scanner::Scanner;
use ipinfo_scan::services::ServiceTable;
use ipinfo_scan::session::Session;
use ipinfo_scan::{address, console, ports};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

/// ipinfo-scan: look up IP metadata and scan TCP ports with banner capture.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ipinfo-scan",
    version,
    about = "Look up IP metadata and run a bounded-concurrency TCP connect scan with banner capture.",
    long_about = None
)]
struct Cli {
    /// Comma-separated IP addresses to scan once and exit. Without it, start the interactive prompt.
    #[arg(long)]
    ips: Option<String>,

    /// Port range to scan per address, `start-end` inclusive.
    #[arg(long, default_value = "1-1024")]
    ports: String,

    /// Max concurrent TCP connect attempts per address.
    #[arg(long, default_value_t = 20)]
    concurrency: usize,

    /// Socket connect timeout in milliseconds.
    #[arg(long = "connect-timeout-ms", default_value_t = 2000)]
    connect_timeout_ms: u64,

    /// Banner read timeout in milliseconds.
    #[arg(long = "banner-timeout-ms", default_value_t = 2000)]
    banner_timeout_ms: u64,

    /// Extra well-known ports, one `<port> <name>` per line.
    #[arg(long)]
    services: Option<PathBuf>,

    /// Directory for scan_results.log.
    #[arg(long = "log-dir", default_value = "logs")]
    log_dir: PathBuf,

    /// Write each batch's results as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also print closed, filtered and timed-out ports.
    #[arg(long = "show-closed", default_value_t = false)]
    show_closed: bool,

    /// Base URL of the IP metadata service.
    #[arg(long = "ipinfo-url", default_value = DEFAULT_IPINFO_URL)]
    ipinfo_url: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    let services = match cli.services.as_deref() {
        Some(path) => ServiceTable::from_file(path)?,
        None => ServiceTable::default(),
    };
    let config = ScanConfig {
        concurrency: cli.concurrency.max(1),
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        banner_timeout: Duration::from_millis(cli.banner_timeout_ms),
        banner_size: DEFAULT_BANNER_SIZE,
        port_range: ports::parse_range(&cli.ports)
            .with_context(|| format!("invalid --ports value: {}", cli.ports))?,
        services,
    };
    let output = OutputConfig {
        log_dir: cli.log_dir.clone(),
        json: cli.output.clone(),
        show_closed: cli.show_closed,
    };

    if !cli.quiet {
        println!("ipinfo-scan configuration:");
        println!("  ports             : {}", config.port_range);
        println!("  concurrency       : {}", config.concurrency);
        println!("  connect_timeout_ms: {}", cli.connect_timeout_ms);
        println!("  banner_timeout_ms : {}", cli.banner_timeout_ms);
        println!("  log_dir           : {}", output.log_dir.display());
        println!(
            "  output            : {}",
            output
                .json
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".to_string())
        );
    }

    let reverse = ReverseResolver::new(Duration::from_secs(4));
    let metadata = IpInfoClient::new(cli.ipinfo_url.as_str())
        .context("failed to build HTTP client")?
        .with_resolver(reverse.clone());
    let session = Session::new(Scanner::new(config), metadata).with_reverse_lookup(reverse);

    match cli.ips.as_deref() {
        Some(line) => {
            let inputs = address::split_batch(line);
            if inputs.is_empty() {
                anyhow::bail!("--ips contained no addresses");
            }
            console::run_batch(&session, inputs, &output).await?;
        }
        None => console::run_interactive(&session, &output).await?,
    }

    Ok(())
}
