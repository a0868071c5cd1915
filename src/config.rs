//! Worker configuration, per spec §6.3.

use std::fmt;
use std::time::Duration;

/// The fixed client-id string sent on the wire with every request.
pub const DEFAULT_CLIENT_ID: &str = "kafka_ex";

/// Streaming defaults used by [`crate::worker::stream`].
pub const STREAM_WAIT_TIME_MS: i32 = 900;
pub const STREAM_MIN_BYTES: i32 = 1;
pub const STREAM_MAX_BYTES: i32 = 1_000_000;

/// The sentinel consumer-group value, as a type rather than a bare string so
/// the "no group configured" case is a compile-time-checked fact inside
/// handler code, while still rendering as the spec's `"no group"` sentinel
/// for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConsumerGroup {
    #[default]
    None,
    Named(String),
}

impl ConsumerGroup {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConsumerGroup::None => None,
            ConsumerGroup::Named(name) => Some(name.as_str()),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, ConsumerGroup::Named(_))
    }
}

impl fmt::Display for ConsumerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerGroup::None => write!(f, "no group"),
            ConsumerGroup::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<Option<String>> for ConsumerGroup {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => ConsumerGroup::Named(name),
            None => ConsumerGroup::None,
        }
    }
}

/// Configuration recognized at worker init, per spec §6.3.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Seed broker list the worker opens sockets to at startup.
    pub uris: Vec<(String, u16)>,

    /// Interval between periodic metadata refreshes.
    pub metadata_update_interval: Duration,

    /// Interval between periodic coordinator refreshes. Only armed when
    /// `consumer_group` is [`ConsumerGroup::Named`].
    pub consumer_group_update_interval: Duration,

    /// Timeout applied to every synchronous broker exchange.
    pub sync_timeout: Duration,

    /// The worker's consumer group, or [`ConsumerGroup::None`].
    pub consumer_group: ConsumerGroup,

    /// The worker's own external name, used only for diagnostics
    /// (log fields); never sent on the wire.
    pub name: String,
}

impl WorkerConfig {
    pub fn new(uris: Vec<(String, u16)>) -> Self {
        Self {
            uris,
            ..Default::default()
        }
    }

    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = ConsumerGroup::Named(group.into());
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            uris: Vec::new(),
            metadata_update_interval: Duration::from_millis(30_000),
            consumer_group_update_interval: Duration::from_millis(30_000),
            sync_timeout: Duration::from_millis(1_000),
            consumer_group: ConsumerGroup::None,
            name: "kafka_worker".to_string(),
        }
    }
}
