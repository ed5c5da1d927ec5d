//! Brook Core - Progressive-Download Range-Request Cache
//!
//! This crate lets a media consumer read arbitrary byte ranges from a
//! resource while that resource is still being fetched incrementally,
//! without blocking on the full download and without re-fetching bytes:
//! - Append-only byte buffering per resource
//! - Pending range requests resolved as soon as their span is buffered
//! - Partial delivery of intermediate bytes while a request pends
//! - Size/metadata reporting as soon as headers arrive
//! - Progress, ready-to-play, completion and failure observer events
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     ResourceCache                      │
//! ├────────────────────────────────────────────────────────┤
//! │   per resource (one serialized actor task each):       │
//! │                                                        │
//! │  ┌─────────────┐   chunks   ┌─────────────┐            │
//! │  │ FetchDriver ├───────────►│ MediaBuffer │            │
//! │  └─────────────┘            └──────┬──────┘            │
//! │                                    │ scan after every  │
//! │                                    ▼ mutation          │
//! │  range requests ──────► ┌─────────────────┐            │
//! │                         │ PendingRequests ├──► handles │
//! │                         └─────────────────┘            │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers submit a range request; the cache lazily starts the
//! resource's single streaming fetch, appends arriving chunks and
//! re-evaluates every pending request after each one. A request is
//! fulfilled once its whole span is buffered; terminal fetch outcomes
//! propagate to every still-pending request and to observers.

pub mod buffer;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod request;
pub mod types;

mod resource;

pub use buffer::MediaBuffer;
pub use cache::ResourceCache;
pub use error::{Error, Result};
pub use fetch::{FetchEvent, Fetcher, HttpFetcher};
pub use request::{RangeDelivery, RangeHandle};
pub use types::{
    CacheConfig, CacheEvent, FetchState, RequestId, ResourceKey, ResourceMetadata, ResourceStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
