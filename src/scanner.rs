use crate::config::ScanConfig;
use crate::error::Result;
use crate::types::{PortOutcome, PortRange, ProbeError, ScanResult, ScanTarget};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Opens the connection for a probe. [`TcpDialer`] is the real network;
/// tests substitute their own to count or script connection attempts.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Conn: AsyncRead + Unpin + Send + 'static;

    async fn dial(&self, addr: SocketAddr) -> io::Result<Self::Conn>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Live counters for a running scan, readable from other tasks.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    pub scanned_done: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &PortOutcome) {
        if outcome.open {
            self.open_count.fetch_add(1, Ordering::Relaxed);
        }
        self.scanned_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scanned(&self) -> u64 {
        self.scanned_done.load(Ordering::Relaxed)
    }

    pub fn open(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}

/// Bounded-concurrency TCP connect scanner.
///
/// - Limits concurrent probes using a `Semaphore` of `concurrency` permits.
/// - Uses `tokio::time::timeout` to bound each connect and each banner read.
/// - Returns one [`PortOutcome`] per requested port, sorted by port.
pub struct Scanner<D = TcpDialer> {
    dialer: Arc<D>,
    config: Arc<ScanConfig>,
}

impl<D> Clone for Scanner<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: self.dialer.clone(),
            config: self.config.clone(),
        }
    }
}

impl Scanner<TcpDialer> {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_dialer(config, TcpDialer)
    }
}

impl<D: Dialer> Scanner<D> {
    pub fn with_dialer(config: ScanConfig, dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub async fn scan(&self, target: &ScanTarget) -> Result<ScanResult> {
        self.scan_internal(target, None, None).await
    }

    /// Variant that accepts a `CancellationToken`. Cancelling aborts in-flight
    /// dials and reads; unfinished ports are reported as `Cancelled`.
    pub async fn scan_with_cancel(
        &self,
        target: &ScanTarget,
        cancel: CancellationToken,
    ) -> Result<ScanResult> {
        self.scan_internal(target, Some(cancel), None).await
    }

    pub async fn scan_with_progress(
        &self,
        target: &ScanTarget,
        cancel: CancellationToken,
        progress: SharedProgress,
    ) -> Result<ScanResult> {
        self.scan_internal(target, Some(cancel), Some(progress)).await
    }

    async fn scan_internal(
        &self,
        target: &ScanTarget,
        cancel_opt: Option<CancellationToken>,
        progress_opt: Option<SharedProgress>,
    ) -> Result<ScanResult> {
        target.range.validate()?;

        let started = Instant::now();
        let cancel = cancel_opt.unwrap_or_default();
        let progress = progress_opt.unwrap_or_default();
        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();
        let mut outcomes = Vec::with_capacity(target.range.len());
        let mut launched = 0usize;

        debug!(
            "scanning {} ports {} with concurrency {}",
            target.host, target.range, self.config.concurrency
        );

        for port in target.range.iter() {
            // Backpressure: no task is spawned until a permit is free.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let dialer = self.dialer.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let addr = SocketAddr::new(target.host, port);

            set.spawn(async move {
                let _permit = permit; // held until the probe returns
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => PortOutcome::failed(port, ProbeError::Cancelled, 0),
                    outcome = probe(&*dialer, addr, &config) => outcome,
                };
                progress.record(&outcome);
                outcome
            });
            launched += 1;

            while let Some(res) = set.try_join_next() {
                collect(&mut outcomes, res);
            }
        }

        while let Some(res) = set.join_next().await {
            collect(&mut outcomes, res);
        }

        fill_missing(&mut outcomes, target.range, launched);
        outcomes.sort_by_key(|o| o.port);

        let result = ScanResult {
            host: target.host,
            range: target.range,
            outcomes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Port scan completed for {}: {} open of {} ({} ms)",
            result.host,
            result.open_count(),
            result.len(),
            result.elapsed_ms
        );
        Ok(result)
    }
}

fn collect(outcomes: &mut Vec<PortOutcome>, res: std::result::Result<PortOutcome, tokio::task::JoinError>) {
    match res {
        Ok(outcome) => outcomes.push(outcome),
        Err(e) => warn!("probe task failed: {e}"),
    }
}

/// Give every port without an outcome one: `Cancelled` if it was never
/// launched, `Other` if its task died.
fn fill_missing(outcomes: &mut Vec<PortOutcome>, range: PortRange, launched: usize) {
    if outcomes.len() == range.len() {
        return;
    }
    let mut seen = vec![false; range.len()];
    for o in outcomes.iter() {
        seen[usize::from(o.port - range.start)] = true;
    }
    for (idx, port) in range.iter().enumerate() {
        if seen[idx] {
            continue;
        }
        let error = if idx >= launched {
            ProbeError::Cancelled
        } else {
            ProbeError::Other("probe task failed".to_string())
        };
        outcomes.push(PortOutcome::failed(port, error, 0));
    }
}

/// Probe a single `addr`: one connect under `connect_timeout`, then on success
/// one banner read under `banner_timeout`. The connection is closed on return.
pub async fn probe<D: Dialer + ?Sized>(dialer: &D, addr: SocketAddr, config: &ScanConfig) -> PortOutcome {
    let port = addr.port();
    let start = Instant::now();
    match time::timeout(config.connect_timeout, dialer.dial(addr)).await {
        Ok(Ok(mut conn)) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            let service = config.services.lookup(port).to_string();
            let banner = read_banner(&mut conn, config.banner_size, config.banner_timeout).await;
            debug!("{addr} open ({service}), banner: {}", banner.as_deref().unwrap_or("-"));
            PortOutcome::open(port, service, banner, latency_ms)
        }
        Ok(Err(e)) => {
            debug!("{addr}: {e}");
            PortOutcome::failed(port, classify_io_error(&e), start.elapsed().as_millis() as u64)
        }
        Err(_) => {
            debug!("{addr}: connect timed out");
            PortOutcome::failed(port, ProbeError::Timeout, start.elapsed().as_millis() as u64)
        }
    }
}

fn classify_io_error(e: &io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ProbeError::Refused,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => ProbeError::Unreachable,
        io::ErrorKind::TimedOut => ProbeError::Timeout,
        _ => ProbeError::Other(e.to_string()),
    }
}

/// Try a single read of up to `size` bytes before `deadline`. Timeouts, errors
/// and empty reads all yield `None`.
async fn read_banner<R: AsyncRead + Unpin>(conn: &mut R, size: usize, deadline: Duration) -> Option<String> {
    let mut buf = vec![0u8; size.max(1)];
    match time::timeout(deadline, conn.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => clean_banner(&buf[..n]),
        _ => None,
    }
}

/// Lossy UTF-8 decode with surrounding whitespace and control characters removed.
pub fn clean_banner(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncWriteExt, DuplexStream};

    /// Every dial succeeds with an in-memory stream preloaded with `banner`.
    struct ScriptedDialer {
        banner: &'static [u8],
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Conn = DuplexStream;

        async fn dial(&self, _addr: SocketAddr) -> io::Result<DuplexStream> {
            let (client, mut server) = tokio::io::duplex(4096);
            if !self.banner.is_empty() {
                server.write_all(self.banner).await?;
            }
            // Keep the server half open so an empty banner ends in a read timeout.
            tokio::spawn(async move {
                time::sleep(Duration::from_secs(5)).await;
                drop(server);
            });
            Ok(client)
        }
    }

    fn local(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            connect_timeout: Duration::from_millis(200),
            banner_timeout: Duration::from_millis(100),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn banner_is_trimmed() {
        assert_eq!(clean_banner(b"SSH-2.0-OpenSSH_9.6\r\n").as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
        assert_eq!(clean_banner(b"\x00\t 220 ready \x07\n").as_deref(), Some("220 ready"));
        assert_eq!(clean_banner(b" \r\n\x00"), None);
    }

    #[test]
    fn io_errors_map_to_probe_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io_error(&refused), ProbeError::Refused);
        let unreachable = io::Error::from(io::ErrorKind::HostUnreachable);
        assert_eq!(classify_io_error(&unreachable), ProbeError::Unreachable);
        let other = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(classify_io_error(&other), ProbeError::Other("boom".to_string()));
    }

    #[tokio::test]
    async fn probe_captures_banner_and_service() {
        let dialer = ScriptedDialer { banner: b"SSH-2.0-test\r\n" };
        let outcome = probe(&dialer, local(22), &fast_config()).await;
        assert!(outcome.open);
        assert_eq!(outcome.service.as_deref(), Some("SSH"));
        assert_eq!(outcome.banner.as_deref(), Some("SSH-2.0-test"));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn silent_service_is_open_without_banner() {
        let dialer = ScriptedDialer { banner: b"" };
        let outcome = probe(&dialer, local(8081), &fast_config()).await;
        assert!(outcome.open);
        assert_eq!(outcome.service.as_deref(), Some("Unknown"));
        assert!(outcome.banner.is_none());
    }

    #[test]
    fn fill_missing_restores_cardinality() {
        let range = PortRange::new(10, 14);
        let mut outcomes = vec![
            PortOutcome::failed(10, ProbeError::Refused, 0),
            PortOutcome::failed(12, ProbeError::Refused, 0),
        ];
        fill_missing(&mut outcomes, range, 3);
        outcomes.sort_by_key(|o| o.port);
        let errors: Vec<_> = outcomes.iter().map(|o| o.error.clone().unwrap()).collect();
        assert_eq!(
            errors,
            vec![
                ProbeError::Refused,
                ProbeError::Other("probe task failed".to_string()),
                ProbeError::Refused,
                ProbeError::Cancelled,
                ProbeError::Cancelled,
            ]
        );
    }
}
