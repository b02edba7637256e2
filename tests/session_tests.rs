use async_trait::async_trait;
use ipinfo_scan::config::ScanConfig;
use ipinfo_scan::ipinfo::{IpInfo, LookupError, MetadataSource};
use ipinfo_scan::resolver::ReverseLookup;
use ipinfo_scan::scanner::{Dialer, Scanner};
use ipinfo_scan::session::Session;
use ipinfo_scan::types::PortRange;
use ipinfo_scan::ScanError;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct StubMetadata {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl MetadataSource for StubMetadata {
    async fn lookup(&self, ip: IpAddr) -> Result<IpInfo, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LookupError::Status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        }
        Ok(IpInfo {
            ip: ip.to_string(),
            hostname: "fixture.local".to_string(),
            ..IpInfo::default()
        })
    }
}

/// Answers PTR queries for 10.0.0.0/8 only.
struct StubReverse {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ReverseLookup for StubReverse {
    async fn names(&self, ip: IpAddr) -> Vec<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match ip {
            IpAddr::V4(v4) if v4.octets()[0] == 10 => {
                vec!["gw.fixture.local".to_string(), "router.fixture.local".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Refuses every dial and counts them.
struct RefuseDialer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Dialer for RefuseDialer {
    type Conn = TcpStream;

    async fn dial(&self, _addr: SocketAddr) -> io::Result<TcpStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

struct Fixture {
    session: Session<StubMetadata, RefuseDialer>,
    lookups: Arc<AtomicUsize>,
    dials: Arc<AtomicUsize>,
}

fn fixture(fail_metadata: bool) -> Fixture {
    let lookups = Arc::new(AtomicUsize::new(0));
    let dials = Arc::new(AtomicUsize::new(0));
    let config = ScanConfig {
        port_range: PortRange::new(1, 10),
        connect_timeout: Duration::from_millis(500),
        banner_timeout: Duration::from_millis(100),
        ..ScanConfig::default()
    };
    let scanner = Scanner::with_dialer(config, RefuseDialer { calls: dials.clone() });
    let metadata = StubMetadata {
        calls: lookups.clone(),
        fail: fail_metadata,
    };
    Fixture {
        session: Session::new(scanner, metadata),
        lookups,
        dials,
    }
}

#[tokio::test]
async fn invalid_address_does_not_affect_its_sibling() {
    let f = fixture(false);
    let reports = f
        .session
        .collect_batch(
            vec!["not-an-ip".to_string(), "127.0.0.1".to_string()],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0].input, "not-an-ip");
    assert!(matches!(
        &reports[0].outcome,
        Err(ScanError::InvalidAddress(t)) if t == "not-an-ip"
    ));

    let host = reports[1].outcome.as_ref().unwrap();
    assert_eq!(host.address.to_string(), "127.0.0.1");
    assert_eq!(host.metadata.as_ref().unwrap().hostname, "fixture.local");
    assert_eq!(host.scan.len(), 10);

    // Only the valid address touched the network.
    assert_eq!(f.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(f.dials.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn invalid_only_batch_makes_no_network_calls() {
    let f = fixture(false);
    let reports = f
        .session
        .collect_batch(vec!["example.com".to_string(), "".to_string()], CancellationToken::new())
        .await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| matches!(r.outcome, Err(ScanError::InvalidAddress(_)))));
    assert_eq!(f.lookups.load(Ordering::SeqCst), 0);
    assert_eq!(f.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn metadata_failure_still_scans() {
    let f = fixture(true);
    let report = f.session.run_one(0, "10.0.0.9", CancellationToken::new()).await;

    let host = report.outcome.unwrap();
    assert!(host.metadata.is_none());
    let err = host.metadata_error.unwrap();
    assert!(err.starts_with("Metadata lookup failed"), "{err}");
    assert_eq!(host.scan.len(), 10);
    assert_eq!(f.dials.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn batch_streams_one_report_per_input() {
    let f = fixture(false);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let inputs: Vec<String> = ["127.0.0.1", "::1", "bad", "10.0.0.1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    f.session.run_batch(inputs, CancellationToken::new(), tx).await;

    let mut seen = Vec::new();
    while let Some(report) = rx.recv().await {
        seen.push(report.index);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert_eq!(f.lookups.load(Ordering::SeqCst), 3);
    assert_eq!(f.dials.load(Ordering::SeqCst), 30);
}

#[tokio::test]
async fn reverse_names_are_reported_per_host() {
    let f = fixture(false);
    let reverse_calls = Arc::new(AtomicUsize::new(0));
    let session = f.session.with_reverse_lookup(StubReverse {
        calls: reverse_calls.clone(),
    });

    let reports = session
        .collect_batch(
            vec!["10.0.0.1".to_string(), "bogus".to_string(), "127.0.0.1".to_string()],
            CancellationToken::new(),
        )
        .await;

    let named = reports[0].outcome.as_ref().unwrap();
    assert_eq!(
        named.reverse_dns.as_deref(),
        Some("gw.fixture.local, router.fixture.local")
    );
    assert!(reports[1].outcome.is_err());
    let unnamed = reports[2].outcome.as_ref().unwrap();
    assert_eq!(unnamed.reverse_dns, None);

    // The invalid token never reaches the resolver.
    assert_eq!(reverse_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_resolver_means_no_reverse_names() {
    let f = fixture(false);
    let host = f
        .session
        .run_one(0, "10.0.0.1", CancellationToken::new())
        .await
        .outcome
        .unwrap();
    assert_eq!(host.reverse_dns, None);
}
