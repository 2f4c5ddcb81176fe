//! Jenkins crawler: per-build polling orchestration.
//!
//! Each `start` call wires three tasks chained by capacity-1 channels —
//! dispatch/poll loop, extraction, state update — plus a detached timer task
//! for the delayed re-dispatch after a non-terminal cycle. The channel set is
//! scoped to the crawl; nothing is shared across crawls except the storage
//! port.

pub mod extract;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

use buildtrace_shared::{AppConfig, BuildRecord, BuildtraceError, LogLine, Result};
use buildtrace_storage::StoragePort;

use self::extract::GraphExtractor;
use crate::logparse::LogSplitter;
use crate::sink::LogSink;
use crate::{Crawler, http_client};

/// Crawls Jenkins builds through the workflow API, polling until the build
/// reaches a terminal status.
#[derive(Clone)]
pub struct JenkinsCrawler {
    client: reqwest::Client,
    storage: Arc<dyn StoragePort>,
    sink: Arc<dyn LogSink>,
    splitter: LogSplitter,
    poll_delay: Duration,
    max_poll_attempts: u32,
}

impl JenkinsCrawler {
    /// Create a crawler from configuration. Fails on an invalid log pattern.
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn StoragePort>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let splitter = LogSplitter::new(&config.crawler.jenkins_log_pattern)?;
        Ok(Self {
            client: http_client()?,
            storage,
            sink,
            splitter,
            poll_delay: Duration::from_secs(config.crawler.poll_delay_secs),
            max_poll_attempts: config.crawler.max_poll_attempts,
        })
    }

    /// Shorten the re-poll delay (tests only).
    #[cfg(test)]
    fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Poll loop: each dispatched build ID triggers one extraction whose
    /// result goes to the state task. Exits when all dispatchers are gone.
    async fn run_extraction(
        self,
        mut dispatch_rx: mpsc::Receiver<String>,
        state_tx: mpsc::Sender<BuildRecord>,
        job_uri: Url,
    ) {
        let extractor = GraphExtractor::new(self.client.clone(), self.splitter.clone());
        while let Some(build_id) = dispatch_rx.recv().await {
            info!(uri = %job_uri, %build_id, "crawling jenkins api");
            let record = extractor.extract(&job_uri, &build_id).await;
            debug!("extracted build data");
            if state_tx.send(record).await.is_err() {
                return; // state task finished, crawl is over
            }
        }
    }

    /// State task: persists every cycle and decides re-poll vs terminal.
    ///
    /// Holding `_cancel_tx` ties the re-dispatch timers to the crawl's
    /// lifetime; a future shutdown path can flip it to interrupt a pending
    /// delay.
    async fn run_state_updates(
        self,
        mut state_rx: mpsc::Receiver<BuildRecord>,
        log_tx: mpsc::Sender<Vec<LogLine>>,
        dispatch_tx: mpsc::Sender<String>,
        _cancel_tx: watch::Sender<bool>,
        cancel_rx: watch::Receiver<bool>,
        build_id: String,
    ) {
        let mut attempts: u32 = 0;
        while let Some(record) = state_rx.recv().await {
            debug!("got request to update the state");
            if let Err(e) = self.storage.put(&record, &build_id).await {
                // Snapshot writes are best-effort; the next cycle carries
                // the data again.
                error!(%build_id, error = %e, "unable to write build record");
            } else {
                info!(%build_id, "build record updated");
            }

            if !record.is_terminal() {
                attempts += 1;
                if self.max_poll_attempts > 0 && attempts >= self.max_poll_attempts {
                    warn!(%build_id, attempts, "poll attempt cap reached, abandoning crawl");
                    return;
                }
                self.spawn_redispatch(dispatch_tx.clone(), build_id.clone(), cancel_rx.clone());
                continue;
            }

            let lines = record.leaf_logs();
            info!(%build_id, lines = lines.len(), "extracted build logs");
            let _ = log_tx.send(lines).await;
            info!(%build_id, status = %record.status, "build finished");
            return;
        }
    }

    /// Detached re-dispatch timer, so the state task never blocks on the
    /// wait. The sleep races the cancel signal.
    fn spawn_redispatch(
        &self,
        dispatch_tx: mpsc::Sender<String>,
        build_id: String,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let delay = self.poll_delay;
        tokio::spawn(async move {
            debug!(delay_ms = delay.as_millis() as u64, "sleeping before requerying");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = dispatch_tx.send(build_id).await;
                }
                _ = async { let _ = cancel_rx.wait_for(|cancelled| *cancelled).await; } => {
                    debug!("re-dispatch cancelled");
                }
            }
        });
    }

    /// Emits every flattened log line of the finished build, then exits when
    /// the state task hangs up.
    async fn run_log_emission(self, mut log_rx: mpsc::Receiver<Vec<LogLine>>, build_id: String) {
        while let Some(lines) = log_rx.recv().await {
            debug!("got request to emit the build logs");
            for line in &lines {
                self.sink.emit(&build_id, line);
            }
        }
    }
}

#[async_trait]
impl Crawler for JenkinsCrawler {
    fn name(&self) -> &'static str {
        "jenkins"
    }

    async fn start(&self, build_uri: &str, build_id: &str) -> Result<()> {
        let job_uri = job_api_url(build_uri)?;

        // Channel set scoped to this crawl: capacity 1, one producer each.
        let (dispatch_tx, dispatch_rx) = mpsc::channel::<String>(1);
        let (state_tx, state_rx) = mpsc::channel::<BuildRecord>(1);
        let (log_tx, log_rx) = mpsc::channel::<Vec<LogLine>>(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(self.clone().run_state_updates(
            state_rx,
            log_tx,
            dispatch_tx.clone(),
            cancel_tx,
            cancel_rx,
            build_id.to_string(),
        ));
        tokio::spawn(self.clone().run_extraction(dispatch_rx, state_tx, job_uri));
        tokio::spawn(self.clone().run_log_emission(log_rx, build_id.to_string()));

        dispatch_tx
            .send(build_id.to_string())
            .await
            .map_err(|_| BuildtraceError::validation("crawl tasks exited before dispatch"))?;
        Ok(())
    }
}

/// Convert a Jenkins job URL to its workflow-API describe endpoint.
fn job_api_url(build_uri: &str) -> Result<Url> {
    let joined = format!("{}/wfapi/describe", build_uri.trim_end_matches('/'));
    Url::parse(&joined)
        .map_err(|e| BuildtraceError::validation(format!("invalid build URI '{build_uri}': {e}")))
}
