//! Core types for Brook

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Stable identity of a cached resource: its source locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey(pub Url);

impl From<Url> for ResourceKey {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl ResourceKey {
    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a range request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fetch lifecycle for one resource
///
/// `Completed`, `Failed` and `Cancelled` are terminal. A failed fetch is
/// never restarted for the same resource instance; callers retry by
/// constructing a fresh resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl FetchState {
    /// Returns true once no further fetch events can arrive
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchState::Completed | FetchState::Failed | FetchState::Cancelled
        )
    }

    /// Validates a state machine transition
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Streaming) => true,
            // A zero-byte body or an error can terminate before any chunk
            (Connecting, Completed) | (Connecting, Failed) => true,
            (Streaming, Completed) | (Streaming, Failed) => true,
            // Silent teardown is allowed from any non-terminal state
            (Idle | Connecting | Streaming, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FetchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchState::Idle => write!(f, "idle"),
            FetchState::Connecting => write!(f, "connecting"),
            FetchState::Streaming => write!(f, "streaming"),
            FetchState::Completed => write!(f, "completed"),
            FetchState::Failed => write!(f, "failed"),
            FetchState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Metadata learned from the upstream response headers
///
/// `total_size` is `None` until the first metadata event arrives and is
/// fixed for the resource lifetime afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Expected total size in bytes, if the upstream reported one
    pub total_size: Option<u64>,
    /// MIME type reported by the upstream (or configured override)
    pub content_type: Option<String>,
    /// Whether the upstream advertises byte-range access
    pub supports_range_access: bool,
}

/// Snapshot of one resource's cache state
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub state: FetchState,
    pub metadata: ResourceMetadata,
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Elapsed time since the last byte arrived, for caller stall policies
    pub since_last_progress: Option<Duration>,
}

/// Events broadcast to cache observers
///
/// Silent teardown (cancellation) emits nothing.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// Upstream response headers arrived
    MetadataLoaded {
        key: ResourceKey,
        total_size: Option<u64>,
        content_type: Option<String>,
    },
    /// Emitted after every chunk
    Progress {
        key: ResourceKey,
        downloaded: u64,
        expected: Option<u64>,
    },
    /// Initial prebuffering threshold crossed, emitted at most once
    ReadyToPlay { key: ResourceKey },
    /// The full resource is buffered
    Complete { key: ResourceKey, total_bytes: u64 },
    /// The fetch terminated with an error
    Failed { key: ResourceKey, error: String },
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// HTTP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Downloaded-byte threshold for the one-shot `ReadyToPlay` event
    pub ready_after_bytes: u64,
    /// Overrides the upstream `Content-Type` header when set
    pub content_type_override: Option<String>,
    /// Capacity of the observer broadcast channel
    pub event_capacity: usize,
    /// Capacity of the per-resource fetch event channel
    pub fetch_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ready_after_bytes: 256 * 1024,
            content_type_override: None,
            event_capacity: 64,
            fetch_queue_capacity: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_state_transitions() {
        // Valid transitions
        assert!(FetchState::Idle.can_transition_to(FetchState::Connecting));
        assert!(FetchState::Connecting.can_transition_to(FetchState::Streaming));
        assert!(FetchState::Streaming.can_transition_to(FetchState::Completed));
        assert!(FetchState::Streaming.can_transition_to(FetchState::Failed));
        assert!(FetchState::Connecting.can_transition_to(FetchState::Failed));
        assert!(FetchState::Idle.can_transition_to(FetchState::Cancelled));

        // Invalid transitions
        assert!(!FetchState::Idle.can_transition_to(FetchState::Streaming));
        assert!(!FetchState::Completed.can_transition_to(FetchState::Connecting));
        assert!(!FetchState::Failed.can_transition_to(FetchState::Streaming));
        assert!(!FetchState::Cancelled.can_transition_to(FetchState::Idle));
        assert!(!FetchState::Completed.can_transition_to(FetchState::Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(FetchState::Completed.is_terminal());
        assert!(FetchState::Failed.is_terminal());
        assert!(FetchState::Cancelled.is_terminal());
        assert!(!FetchState::Idle.is_terminal());
        assert!(!FetchState::Connecting.is_terminal());
        assert!(!FetchState::Streaming.is_terminal());
    }

    #[test]
    fn test_resource_key_display() {
        let key = ResourceKey(Url::parse("https://example.com/video.mp4").unwrap());
        assert_eq!(key.to_string(), "https://example.com/video.mp4");
    }

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.ready_after_bytes, 256 * 1024);
        assert!(config.content_type_override.is_none());
    }
}
