//! Per-resource orchestrator
//!
//! One actor task per resource owns the byte buffer and the pending
//! request set outright, so every mutation is serialized: commands from
//! callers and events from the fetch driver are consumed from ordered
//! channels by a single loop. Distinct resources run fully concurrently.

use crate::{
    buffer::MediaBuffer,
    fetch::{FetchDriver, FetchEvent, Fetcher},
    request::{PendingRequests, RangeHandle, RangeRequest},
    types::{CacheConfig, CacheEvent, FetchState, RequestId, ResourceKey, ResourceMetadata, ResourceStatus},
    Error, Result,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Commands accepted by a resource actor
#[derive(Debug)]
pub(crate) enum ResourceCommand {
    Submit {
        offset: u64,
        length: u64,
        reply: oneshot::Sender<Result<RangeHandle>>,
    },
    Cancel {
        id: RequestId,
    },
    Status {
        reply: oneshot::Sender<ResourceStatus>,
    },
    /// Silent teardown: abort the fetch, drop pending requests, emit no
    /// observer events
    Shutdown,
}

pub(crate) struct ResourceActor {
    key: ResourceKey,
    config: CacheConfig,
    state: FetchState,
    buffer: MediaBuffer,
    pending: PendingRequests,
    driver: FetchDriver,
    content_type: Option<String>,
    supports_range_access: bool,
    commands: mpsc::Receiver<ResourceCommand>,
    fetch_rx: Option<mpsc::Receiver<FetchEvent>>,
    events: broadcast::Sender<CacheEvent>,
    last_progress: Option<Instant>,
    ready_announced: bool,
}

impl ResourceActor {
    pub(crate) fn new(
        key: ResourceKey,
        config: CacheConfig,
        fetcher: Arc<dyn Fetcher>,
        events: broadcast::Sender<CacheEvent>,
        commands: mpsc::Receiver<ResourceCommand>,
    ) -> Self {
        Self {
            key,
            config,
            state: FetchState::Idle,
            buffer: MediaBuffer::new(),
            pending: PendingRequests::default(),
            driver: FetchDriver::new(fetcher),
            content_type: None,
            supports_range_access: false,
            commands,
            fetch_rx: None,
            events,
            last_progress: None,
            ready_announced: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(ResourceCommand::Shutdown) | None => {
                        self.teardown();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                event = Self::next_fetch_event(&mut self.fetch_rx) => match event {
                    Some(event) => self.handle_fetch_event(event),
                    None => self.on_stream_vanished(),
                },
            }
        }
        debug!(key = %self.key, state = %self.state, "resource actor stopped");
    }

    /// Pends forever while no fetch is running so the select stays on
    /// commands only
    async fn next_fetch_event(rx: &mut Option<mpsc::Receiver<FetchEvent>>) -> Option<FetchEvent> {
        match rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    fn handle_command(&mut self, cmd: ResourceCommand) {
        match cmd {
            ResourceCommand::Submit {
                offset,
                length,
                reply,
            } => {
                let _ = reply.send(self.submit(offset, length));
            }
            ResourceCommand::Cancel { id } => {
                if self.pending.cancel(id) {
                    debug!(key = %self.key, id = %id, "range request cancelled");
                }
            }
            ResourceCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ResourceCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }

    fn submit(&mut self, offset: u64, length: u64) -> Result<RangeHandle> {
        let Some(end) = offset.checked_add(length) else {
            return Err(Error::InvalidRequest { offset, length });
        };
        if length == 0 {
            return Err(Error::InvalidRequest { offset, length });
        }
        if matches!(self.state, FetchState::Failed | FetchState::Cancelled) {
            return Err(Error::ResourceUnavailable { state: self.state });
        }

        // Once the real size is known a span past it can never complete.
        // A completed stream's actual length wins over the declared one.
        let known_size = match self.state {
            FetchState::Completed => Some(self.buffer.available()),
            _ => self.buffer.total_size(),
        };
        if let Some(total_size) = known_size {
            if end > total_size {
                return Err(Error::RangeUnsatisfiable {
                    offset,
                    length,
                    total_size,
                });
            }
        }

        if !self.driver.is_started() {
            let rx = self
                .driver
                .start(self.key.url().clone(), self.config.fetch_queue_capacity)?;
            self.fetch_rx = Some(rx);
            self.set_state(FetchState::Connecting);
        }

        let (request, handle) = RangeRequest::new(self.key.clone(), offset, length);
        debug!(key = %self.key, id = %request.id(), offset, length, "range request submitted");
        self.pending.insert(request);

        // Immediate attempt: earlier requests may already have pulled in
        // the bytes this span needs
        self.pending.scan(&self.buffer);

        Ok(handle)
    }

    fn handle_fetch_event(&mut self, event: FetchEvent) {
        match event {
            FetchEvent::Metadata {
                total_size,
                content_type,
                supports_range_access,
            } => self.on_metadata(total_size, content_type, supports_range_access),
            FetchEvent::Chunk(bytes) => self.on_chunk(bytes),
            FetchEvent::Completed => self.on_completed(),
            FetchEvent::Failed(err) => self.on_failed(err),
        }
    }

    fn on_metadata(
        &mut self,
        total_size: Option<u64>,
        content_type: Option<String>,
        supports_range_access: bool,
    ) {
        self.set_state(FetchState::Streaming);
        self.content_type = self
            .config
            .content_type_override
            .clone()
            .or(content_type);
        self.supports_range_access = supports_range_access;

        if let Some(total) = total_size {
            if let Err(err) = self.buffer.set_total_size(total) {
                self.fail_resource(err);
                return;
            }
            self.pending.fail_unsatisfiable(total);
        }

        info!(
            key = %self.key,
            total_size = ?total_size,
            content_type = ?self.content_type,
            supports_range_access,
            "metadata loaded"
        );
        let _ = self.events.send(CacheEvent::MetadataLoaded {
            key: self.key.clone(),
            total_size: self.buffer.total_size(),
            content_type: self.content_type.clone(),
        });
    }

    fn on_chunk(&mut self, bytes: Bytes) {
        self.set_state(FetchState::Streaming);
        self.buffer.append(&bytes);
        self.last_progress = Some(Instant::now());

        // Re-evaluate every pending request after each buffer mutation
        self.pending.scan(&self.buffer);

        let downloaded = self.buffer.available();
        let _ = self.events.send(CacheEvent::Progress {
            key: self.key.clone(),
            downloaded,
            expected: self.buffer.total_size(),
        });
        if !self.ready_announced && downloaded >= self.config.ready_after_bytes {
            self.announce_ready();
        }
    }

    fn on_completed(&mut self) {
        // Final fulfillment scan runs before any terminal bookkeeping, so
        // already-satisfiable spans are fulfilled rather than failed
        self.pending.scan(&self.buffer);

        let total_bytes = self.buffer.available();
        match self.buffer.total_size() {
            Some(declared) if declared != total_bytes => {
                warn!(
                    key = %self.key,
                    declared,
                    actual = total_bytes,
                    "stream ended at a different length than declared"
                );
            }
            None => {
                // Completion fixes the size for resources that never
                // reported one
                let _ = self.buffer.set_total_size(total_bytes);
            }
            _ => {}
        }
        self.pending.fail_unsatisfiable(total_bytes);

        self.set_state(FetchState::Completed);
        self.fetch_rx = None;
        if !self.ready_announced {
            self.announce_ready();
        }

        info!(key = %self.key, total_bytes, "download complete");
        let _ = self.events.send(CacheEvent::Complete {
            key: self.key.clone(),
            total_bytes,
        });
    }

    fn on_failed(&mut self, err: Error) {
        // Already-satisfiable spans get their bytes before the failure
        // fans out
        self.pending.scan(&self.buffer);
        self.fail_resource(err);
    }

    /// Fetch event channel closed without a terminal event
    fn on_stream_vanished(&mut self) {
        self.fetch_rx = None;
        if !self.state.is_terminal() {
            self.fail_resource(Error::upstream("fetch ended without a terminal event"));
        }
    }

    fn fail_resource(&mut self, err: Error) {
        error!(
            key = %self.key,
            error = %err,
            code = err.error_code(),
            pending = self.pending.len(),
            "resource failed"
        );
        self.pending.fail_all(&err);
        self.driver.abort();
        self.fetch_rx = None;
        self.set_state(FetchState::Failed);
        let _ = self.events.send(CacheEvent::Failed {
            key: self.key.clone(),
            error: err.to_string(),
        });
    }

    fn teardown(&mut self) {
        if !self.state.is_terminal() {
            self.set_state(FetchState::Cancelled);
        }
        self.driver.abort();
        self.fetch_rx = None;
        if !self.pending.is_empty() {
            debug!(key = %self.key, pending = self.pending.len(), "dropping pending requests");
        }
        // Dropping the requests closes their channels; handles resolve to
        // Cancelled without any completion callback or observer event
        self.pending.clear();
    }

    fn announce_ready(&mut self) {
        self.ready_announced = true;
        let _ = self.events.send(CacheEvent::ReadyToPlay {
            key: self.key.clone(),
        });
    }

    fn status(&self) -> ResourceStatus {
        ResourceStatus {
            state: self.state,
            metadata: ResourceMetadata {
                total_size: self.buffer.total_size(),
                content_type: self.content_type.clone(),
                supports_range_access: self.supports_range_access,
            },
            downloaded: self.buffer.available(),
            since_last_progress: self.last_progress.map(|t| t.elapsed()),
        }
    }

    fn set_state(&mut self, next: FetchState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            debug_assert!(false, "invalid state transition {} -> {}", self.state, next);
            error!(key = %self.key, from = %self.state, to = %next, "invalid state transition");
            return;
        }
        info!(key = %self.key, from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}
