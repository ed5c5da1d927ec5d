//! Range requests and the pending set
//!
//! A range request describes a desired read (offset + length) and carries
//! the channel its bytes are delivered on. Requests wait in the pending
//! set until the buffer holds their full span; intermediate bytes are
//! delivered as they arrive.

use crate::{
    buffer::MediaBuffer,
    types::{RequestId, ResourceKey},
    Error, Result,
};
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Message delivered to a [`RangeHandle`]
#[derive(Debug)]
pub enum RangeDelivery {
    /// A contiguous slice of the requested span, in order
    Bytes(Bytes),
    /// The full requested span has been delivered
    Fulfilled,
    /// The request will never complete
    Failed(Error),
}

/// Caller-facing side of a range request
///
/// Receives zero or more partial [`RangeDelivery::Bytes`] messages
/// followed by exactly one terminal message. If the owning resource is
/// torn down the channel simply closes and [`RangeHandle::collect`]
/// resolves to [`Error::Cancelled`].
#[derive(Debug)]
pub struct RangeHandle {
    id: RequestId,
    key: ResourceKey,
    offset: u64,
    length: u64,
    rx: mpsc::UnboundedReceiver<RangeDelivery>,
}

impl RangeHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Receive the next delivery, `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<RangeDelivery> {
        self.rx.recv().await
    }

    /// Await full fulfillment, concatenating partial deliveries into the
    /// complete requested span
    pub async fn collect(mut self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.length as usize);
        while let Some(delivery) = self.rx.recv().await {
            match delivery {
                RangeDelivery::Bytes(bytes) => out.extend_from_slice(&bytes),
                RangeDelivery::Fulfilled => return Ok(out.freeze()),
                RangeDelivery::Failed(err) => return Err(err),
            }
        }
        Err(Error::Cancelled)
    }
}

/// One outstanding range request, owned by the pending set until resolved
#[derive(Debug)]
pub(crate) struct RangeRequest {
    id: RequestId,
    offset: u64,
    length: u64,
    /// Absolute offset of the next byte to deliver
    cursor: u64,
    tx: mpsc::UnboundedSender<RangeDelivery>,
}

impl RangeRequest {
    pub(crate) fn new(key: ResourceKey, offset: u64, length: u64) -> (Self, RangeHandle) {
        let id = RequestId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let request = Self {
            id,
            offset,
            length,
            cursor: offset,
            tx,
        };
        let handle = RangeHandle {
            id,
            key,
            offset,
            length,
            rx,
        };
        (request, handle)
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Whether the span extends past a now-known final size
    fn exceeds(&self, total_size: u64) -> bool {
        self.end() > total_size
    }

    /// Deliver any newly available bytes of the span
    ///
    /// Returns `true` when the whole span `[offset, offset+length)` has
    /// been delivered and the request can leave the pending set.
    fn advance(&mut self, buffer: &MediaBuffer) -> Result<bool> {
        let available = buffer.available();
        if available <= self.cursor {
            return Ok(false);
        }
        let want = self.end() - self.cursor;
        let bytes = buffer.read(self.cursor, want.min(available - self.cursor))?;
        self.cursor += bytes.len() as u64;
        let _ = self.tx.send(RangeDelivery::Bytes(bytes));
        if self.cursor == self.end() {
            let _ = self.tx.send(RangeDelivery::Fulfilled);
            return Ok(true);
        }
        Ok(false)
    }

    fn fail(&self, err: Error) {
        let _ = self.tx.send(RangeDelivery::Failed(err));
    }
}

/// Outstanding range requests for one resource, in arrival order
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    requests: Vec<RangeRequest>,
}

impl PendingRequests {
    pub(crate) fn insert(&mut self, request: RangeRequest) {
        self.requests.push(request);
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove a request without invoking its completion path
    ///
    /// No-op when the id is unknown (already resolved or cancelled).
    pub(crate) fn cancel(&mut self, id: RequestId) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| r.id() != id);
        before != self.requests.len()
    }

    /// Re-evaluate every pending request against the current buffer state
    ///
    /// Requests whose full span is now available are fulfilled and
    /// removed; the rest receive any newly available bytes and stay.
    /// Returns the number of requests fulfilled.
    pub(crate) fn scan(&mut self, buffer: &MediaBuffer) -> usize {
        let mut fulfilled = 0;
        self.requests.retain_mut(|request| {
            match request.advance(buffer) {
                Ok(true) => {
                    debug!(id = %request.id(), "range request fulfilled");
                    fulfilled += 1;
                    false
                }
                Ok(false) => true,
                Err(err) => {
                    // Fulfillment scan bug, fail fast rather than recover
                    error!(id = %request.id(), error = %err, "fulfillment invariant violated");
                    request.fail(err);
                    false
                }
            }
        });
        fulfilled
    }

    /// Fail every still-pending request with clones of `err`
    pub(crate) fn fail_all(&mut self, err: &Error) {
        for request in self.requests.drain(..) {
            request.fail(err.clone());
        }
    }

    /// Drop every request without any completion path, closing their
    /// delivery channels (silent teardown)
    pub(crate) fn clear(&mut self) {
        self.requests.clear();
    }

    /// Fail requests whose span can never be satisfied by a resource of
    /// the given final size
    pub(crate) fn fail_unsatisfiable(&mut self, total_size: u64) {
        self.requests.retain(|request| {
            if request.exceeds(total_size) {
                request.fail(Error::RangeUnsatisfiable {
                    offset: request.offset,
                    length: request.length,
                    total_size,
                });
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn test_key() -> ResourceKey {
        ResourceKey(Url::parse("https://example.com/a.mp4").unwrap())
    }

    #[tokio::test]
    async fn test_partial_then_full_delivery() {
        let mut buffer = MediaBuffer::new();
        let mut pending = PendingRequests::default();

        let (request, handle) = RangeRequest::new(test_key(), 0, 5);
        pending.insert(request);

        buffer.append(b"abc");
        assert_eq!(pending.scan(&buffer), 0);
        assert_eq!(pending.len(), 1);

        buffer.append(b"defg");
        assert_eq!(pending.scan(&buffer), 1);
        assert!(pending.is_empty());

        let bytes = handle.collect().await.unwrap();
        assert_eq!(&bytes[..], b"abcde");
    }

    #[tokio::test]
    async fn test_scan_fulfills_in_arrival_order() {
        let mut buffer = MediaBuffer::new();
        let mut pending = PendingRequests::default();

        let (first, first_handle) = RangeRequest::new(test_key(), 0, 2);
        let (second, second_handle) = RangeRequest::new(test_key(), 1, 3);
        pending.insert(first);
        pending.insert(second);

        buffer.append(b"wxyz");
        assert_eq!(pending.scan(&buffer), 2);

        assert_eq!(&first_handle.collect().await.unwrap()[..], b"wx");
        assert_eq!(&second_handle.collect().await.unwrap()[..], b"xyz");
    }

    #[tokio::test]
    async fn test_cancel_closes_without_completion() {
        let mut pending = PendingRequests::default();
        let (request, handle) = RangeRequest::new(test_key(), 0, 10);
        let id = request.id();
        pending.insert(request);

        assert!(pending.cancel(id));
        assert!(!pending.cancel(id));

        match handle.collect().await {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_all_propagates_clone() {
        let mut pending = PendingRequests::default();
        let (a, a_handle) = RangeRequest::new(test_key(), 0, 10);
        let (b, b_handle) = RangeRequest::new(test_key(), 5, 10);
        pending.insert(a);
        pending.insert(b);

        pending.fail_all(&Error::upstream("connection reset"));
        assert!(pending.is_empty());

        for handle in [a_handle, b_handle] {
            match handle.collect().await {
                Err(Error::Upstream { message }) => assert_eq!(message, "connection reset"),
                other => panic!("expected Upstream, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_fail_unsatisfiable_keeps_satisfiable() {
        let mut pending = PendingRequests::default();
        let (within, within_handle) = RangeRequest::new(test_key(), 0, 100);
        let (beyond, beyond_handle) = RangeRequest::new(test_key(), 900, 200);
        pending.insert(within);
        pending.insert(beyond);

        pending.fail_unsatisfiable(1000);
        assert_eq!(pending.len(), 1);
        drop(pending);

        match beyond_handle.collect().await {
            Err(Error::RangeUnsatisfiable { total_size, .. }) => assert_eq!(total_size, 1000),
            other => panic!("expected RangeUnsatisfiable, got {other:?}"),
        }
        // The satisfiable request is merely dropped with the set here
        match within_handle.collect().await {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
