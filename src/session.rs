use crate::address;
use crate::error::ScanError;
use crate::ipinfo::{IpInfo, MetadataSource};
use crate::resolver::{self, ReverseLookup};
use crate::scanner::{Dialer, Scanner, SharedProgress, TcpDialer};
use crate::types::{ScanResult, ScanTarget};
use log::{info, warn};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything learned about one valid address.
#[derive(Serialize, Debug)]
pub struct HostReport {
    pub address: IpAddr,
    pub metadata: Option<IpInfo>,
    pub metadata_error: Option<String>,
    /// PTR names joined by `", "`; `None` when nothing was found.
    pub reverse_dns: Option<String>,
    pub scan: ScanResult,
}

/// Terminal state of one input token.
#[derive(Debug)]
pub struct SessionReport {
    /// Position of the token in its batch.
    pub index: usize,
    pub input: String,
    pub outcome: Result<HostReport, ScanError>,
}

/// Runs validate → metadata lookup → port scan for each input address.
pub struct Session<M, D = TcpDialer> {
    scanner: Scanner<D>,
    metadata: Arc<M>,
    reverse: Option<Arc<dyn ReverseLookup>>,
}

impl<M, D> Clone for Session<M, D> {
    fn clone(&self) -> Self {
        Self {
            scanner: self.scanner.clone(),
            metadata: self.metadata.clone(),
            reverse: self.reverse.clone(),
        }
    }
}

impl<M: MetadataSource, D: Dialer> Session<M, D> {
    pub fn new(scanner: Scanner<D>, metadata: M) -> Self {
        Self {
            scanner,
            metadata: Arc::new(metadata),
            reverse: None,
        }
    }

    /// Look up PTR names for every scanned host alongside its metadata.
    pub fn with_reverse_lookup(mut self, reverse: impl ReverseLookup) -> Self {
        self.reverse = Some(Arc::new(reverse));
        self
    }

    pub fn scanner(&self) -> &Scanner<D> {
        &self.scanner
    }

    pub async fn run_one(&self, index: usize, input: &str, cancel: CancellationToken) -> SessionReport {
        self.run_one_with_progress(index, input, cancel, SharedProgress::new()).await
    }

    pub async fn run_one_with_progress(
        &self,
        index: usize,
        input: &str,
        cancel: CancellationToken,
        progress: SharedProgress,
    ) -> SessionReport {
        let outcome = self.host_report(input, cancel, progress).await;
        if let Err(e) = &outcome {
            warn!("{input}: {e}");
        }
        SessionReport {
            index,
            input: input.to_string(),
            outcome,
        }
    }

    async fn host_report(
        &self,
        input: &str,
        cancel: CancellationToken,
        progress: SharedProgress,
    ) -> Result<HostReport, ScanError> {
        let address = address::parse_address(input)?;

        let (lookup, reverse_dns) =
            tokio::join!(self.metadata.lookup(address), self.reverse_names(address));

        // A failed lookup only costs the metadata; the scan still runs.
        let (metadata, metadata_error) = match lookup {
            Ok(info) => (Some(info), None),
            Err(e) => {
                let err = ScanError::MetadataLookupFailed(e.to_string());
                warn!("{address}: {err}");
                (None, Some(err.to_string()))
            }
        };

        info!("Scanning ports for {address}...");
        let target = ScanTarget::new(address, self.scanner.config().port_range);
        let scan = self.scanner.scan_with_progress(&target, cancel, progress).await?;

        Ok(HostReport {
            address,
            metadata,
            metadata_error,
            reverse_dns,
            scan,
        })
    }

    async fn reverse_names(&self, address: IpAddr) -> Option<String> {
        match &self.reverse {
            Some(reverse) => resolver::join_names(&reverse.names(address).await),
            None => None,
        }
    }

    /// Run one session per input concurrently. Each report is sent on `events`
    /// as soon as its session finishes; returns once every session has finished.
    pub async fn run_batch(
        &self,
        inputs: Vec<String>,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<SessionReport>,
    ) {
        self.run_batch_with_progress(inputs, cancel, events, SharedProgress::new())
            .await
    }

    /// Like [`Session::run_batch`], with every scan of the batch feeding `progress`.
    pub async fn run_batch_with_progress(
        &self,
        inputs: Vec<String>,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<SessionReport>,
        progress: SharedProgress,
    ) {
        let mut set = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let session = self.clone();
            let cancel = cancel.clone();
            let events = events.clone();
            let progress = progress.clone();
            set.spawn(async move {
                let report = session
                    .run_one_with_progress(index, &input, cancel, progress)
                    .await;
                // Receiver gone means nobody is rendering; the work is still done.
                let _ = events.send(report);
            });
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!("session task failed: {e}");
            }
        }
    }

    /// [`Session::run_batch`] collecting the reports, ordered as the inputs were.
    pub async fn collect_batch(&self, inputs: Vec<String>, cancel: CancellationToken) -> Vec<SessionReport> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run_batch(inputs, cancel, tx).await;
        let mut reports = Vec::new();
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        reports.sort_by_key(|r| r.index);
        reports
    }
}
