//! Upstream fetch collaborator
//!
//! A fetcher performs exactly one streaming download per resource and
//! pushes an ordered event sequence to its owner: metadata once, zero or
//! more chunks in arrival order, then exactly one terminal event. The
//! orchestrator consumes the sequence as a single-threaded state machine.

use crate::{types::CacheConfig, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};
use url::Url;

/// Events produced by a fetch, delivered strictly in order
#[derive(Debug)]
pub enum FetchEvent {
    /// Response headers arrived; emitted exactly once, before any chunk
    Metadata {
        total_size: Option<u64>,
        content_type: Option<String>,
        supports_range_access: bool,
    },
    /// The next portion of the byte stream, in arrival order
    Chunk(Bytes),
    /// The stream ended normally; nothing follows
    Completed,
    /// The stream ended with an error; nothing follows
    Failed(Error),
}

/// Upstream streaming source
///
/// Implementations push events into `events` and return when the stream
/// ends or the receiver is dropped (the owner cancelled the resource).
/// A dropped receiver aborts the underlying stream without emitting
/// `Completed`.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, locator: Url, events: mpsc::Sender<FetchEvent>);
}

/// Owns the single upstream fetch task for one resource
///
/// Created lazily on the first range request and never restarted once
/// started.
pub(crate) struct FetchDriver {
    fetcher: Arc<dyn Fetcher>,
    task: Option<JoinHandle<()>>,
}

impl FetchDriver {
    pub(crate) fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            task: None,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the streaming download, returning its ordered event channel
    pub(crate) fn start(
        &mut self,
        locator: Url,
        capacity: usize,
    ) -> Result<mpsc::Receiver<FetchEvent>> {
        if self.task.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(capacity);
        let fetcher = Arc::clone(&self.fetcher);
        debug!(locator = %locator, "starting fetch");
        self.task = Some(tokio::spawn(async move {
            fetcher.fetch(locator, tx).await;
        }));
        Ok(rx)
    }

    /// Abort the underlying stream; no further events are emitted
    pub(crate) fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FetchDriver {
    fn drop(&mut self) {
        self.abort();
    }
}

/// HTTP fetcher backed by reqwest
///
/// Requests bypass transport-level caches: the resource is assumed
/// mutable and of unknown length at request time, so every fetch pulls
/// fresh bytes.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    async fn run(&self, locator: Url, events: &mpsc::Sender<FetchEvent>) -> Result<()> {
        let response = self
            .client
            .get(locator)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?
            .error_for_status()?;

        let total_size = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let supports_range_access = response
            .headers()
            .get(ACCEPT_RANGES)
            .map(|v| v.as_bytes().eq_ignore_ascii_case(b"bytes"))
            .unwrap_or(false);

        if events
            .send(FetchEvent::Metadata {
                total_size,
                content_type,
                supports_range_access,
            })
            .await
            .is_err()
        {
            // Owner went away before headers were consumed
            return Ok(());
        }

        let mut response = response;
        while let Some(chunk) = response.chunk().await? {
            trace!(bytes = chunk.len(), "chunk received");
            if events.send(FetchEvent::Chunk(chunk)).await.is_err() {
                return Ok(());
            }
        }

        let _ = events.send(FetchEvent::Completed).await;
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, events), fields(locator = %locator))]
    async fn fetch(&self, locator: Url, events: mpsc::Sender<FetchEvent>) {
        if let Err(err) = self.run(locator, &events).await {
            let _ = events.send(FetchEvent::Failed(err)).await;
        }
    }
}
