//! Multi-resource cache front end
//!
//! Maps resource keys to their orchestrator actors. Resources are
//! created lazily on the first range request against a never-seen key
//! and are independent of each other; cancelling one tears down only its
//! actor and fetch.

use crate::{
    fetch::{Fetcher, HttpFetcher},
    request::RangeHandle,
    resource::{ResourceActor, ResourceCommand},
    types::{CacheConfig, CacheEvent, FetchState, RequestId, ResourceKey, ResourceMetadata, ResourceStatus},
    Error, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

const COMMAND_QUEUE_CAPACITY: usize = 32;

struct ResourceEntry {
    commands: mpsc::Sender<ResourceCommand>,
    task: JoinHandle<()>,
}

/// Progressive-download range-request cache
///
/// Callers submit byte-range reads against a resource locator; the cache
/// streams the resource once, serves each range as soon as its bytes are
/// buffered, and broadcasts progress and terminal events to observers.
pub struct ResourceCache {
    config: CacheConfig,
    fetcher: Arc<dyn Fetcher>,
    resources: Mutex<HashMap<ResourceKey, ResourceEntry>>,
    events: broadcast::Sender<CacheEvent>,
}

impl ResourceCache {
    /// Create a cache backed by the HTTP fetcher
    pub fn new(config: CacheConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(&config));
        Self::with_fetcher(config, fetcher)
    }

    /// Create a cache with a custom upstream fetch collaborator
    pub fn with_fetcher(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            config,
            fetcher,
            resources: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to progress, completion and failure events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Register a range request, lazily starting the resource's fetch
    ///
    /// Returns immediately; bytes arrive asynchronously on the handle.
    /// Reads beyond currently available bytes keep the request pending
    /// with no timeout imposed by the cache.
    pub async fn submit_range_request(
        &self,
        key: &ResourceKey,
        offset: u64,
        length: u64,
    ) -> Result<RangeHandle> {
        let commands = self.resource_commands(key).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(ResourceCommand::Submit {
                offset,
                length,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ResourceUnavailable {
                state: FetchState::Cancelled,
            })?;
        reply_rx.await.map_err(|_| Error::Cancelled)?
    }

    /// Remove a pending range request without invoking its completion
    /// path; a no-op if already resolved
    pub async fn cancel_range_request(&self, key: &ResourceKey, id: RequestId) {
        let commands = {
            let resources = self.resources.lock().await;
            resources.get(key).map(|entry| entry.commands.clone())
        };
        if let Some(commands) = commands {
            let _ = commands.send(ResourceCommand::Cancel { id }).await;
        }
    }

    /// Snapshot one resource's state, `None` for a never-seen key
    pub async fn resource_status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        let commands = {
            let resources = self.resources.lock().await;
            resources.get(key).map(|entry| entry.commands.clone())
        };
        let commands = commands?;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(ResourceCommand::Status { reply: reply_tx })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Metadata learned for a resource, `None` for a never-seen key
    pub async fn resource_metadata(&self, key: &ResourceKey) -> Option<ResourceMetadata> {
        self.resource_status(key).await.map(|status| status.metadata)
    }

    /// Silently tear down one resource: abort its fetch and drop its
    /// pending requests with no observer events
    ///
    /// Returns false for a never-seen key. A fresh request against the
    /// same locator afterwards creates a new resource instance.
    pub async fn cancel_resource(&self, key: &ResourceKey) -> bool {
        let entry = self.resources.lock().await.remove(key);
        match entry {
            Some(entry) => {
                info!(key = %key, "resource cancelled");
                let _ = entry.commands.send(ResourceCommand::Shutdown).await;
                let _ = entry.task.await;
                true
            }
            None => false,
        }
    }

    /// Tear down every resource
    pub async fn shutdown(&self) {
        let entries: Vec<_> = {
            let mut resources = self.resources.lock().await;
            resources.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            let _ = entry.commands.send(ResourceCommand::Shutdown).await;
            let _ = entry.task.await;
        }
    }

    async fn resource_commands(&self, key: &ResourceKey) -> mpsc::Sender<ResourceCommand> {
        let mut resources = self.resources.lock().await;
        if let Some(entry) = resources.get(key) {
            return entry.commands.clone();
        }

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let actor = ResourceActor::new(
            key.clone(),
            self.config.clone(),
            Arc::clone(&self.fetcher),
            self.events.clone(),
            rx,
        );
        let task = tokio::spawn(actor.run());
        info!(key = %key, "resource created");
        resources.insert(
            key.clone(),
            ResourceEntry {
                commands: tx.clone(),
                task,
            },
        );
        tx
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchEvent;
    use async_trait::async_trait;
    use url::Url;

    struct SilentFetcher;

    #[async_trait]
    impl Fetcher for SilentFetcher {
        async fn fetch(&self, _locator: Url, _events: mpsc::Sender<FetchEvent>) {
            std::future::pending::<()>().await;
        }
    }

    fn test_cache() -> ResourceCache {
        ResourceCache::with_fetcher(CacheConfig::default(), Arc::new(SilentFetcher))
    }

    fn test_key() -> ResourceKey {
        ResourceKey(Url::parse("https://example.com/video.mp4").unwrap())
    }

    #[tokio::test]
    async fn test_zero_length_request_rejected() {
        let cache = test_cache();
        match cache.submit_range_request(&test_key(), 5, 0).await {
            Err(Error::InvalidRequest { offset, length }) => {
                assert_eq!(offset, 5);
                assert_eq!(length, 0);
            }
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_resource_has_no_metadata() {
        let cache = test_cache();
        assert!(cache.resource_metadata(&test_key()).await.is_none());
        assert!(!cache.cancel_resource(&test_key()).await);
    }

    #[tokio::test]
    async fn test_submission_creates_resource_lazily() {
        let cache = test_cache();
        let key = test_key();

        let _handle = cache.submit_range_request(&key, 0, 10).await.unwrap();
        let status = cache.resource_status(&key).await.unwrap();
        assert_eq!(status.state, FetchState::Connecting);
        assert_eq!(status.downloaded, 0);
        assert!(status.metadata.total_size.is_none());
    }

    #[tokio::test]
    async fn test_cancel_resource_resolves_pending_silently() {
        let cache = test_cache();
        let key = test_key();
        let mut events = cache.subscribe();

        let handle = cache.submit_range_request(&key, 0, 10).await.unwrap();
        assert!(cache.cancel_resource(&key).await);

        match handle.collect().await {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
        // Silent teardown: no failure event reaches observers
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
