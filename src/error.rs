//! Error types surfaced by the worker and by the protocol error-code table.

use thiserror::Error;

use crate::network::NetworkError;

/// Numeric error codes reported by the broker cluster, as embedded in parsed
/// responses.
///
/// Only the codes this worker's operations actually observe are named; every
/// other wire value round-trips through [`KafkaCode::Unknown`]. See
/// <http://kafka.apache.org/protocol.html#protocol_error_codes>.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum KafkaCode {
    NoError,
    OffsetOutOfRange,
    UnknownTopicOrPartition,
    LeaderNotAvailable,
    NotLeaderForPartition,
    RequestTimedOut,
    GroupLoadInProgress,
    GroupCoordinatorNotAvailable,
    NotCoordinatorForGroup,
    IllegalGeneration,
    InconsistentGroupProtocol,
    InvalidGroupId,
    UnknownMemberId,
    InvalidSessionTimeout,
    RebalanceInProgress,
    Unknown(i16),
}

impl KafkaCode {
    pub fn is_no_error(self) -> bool {
        matches!(self, KafkaCode::NoError)
    }

    pub fn is_leader_not_available(self) -> bool {
        matches!(self, KafkaCode::LeaderNotAvailable)
    }
}

impl From<i16> for KafkaCode {
    fn from(code: i16) -> Self {
        match code {
            0 => Self::NoError,
            1 => Self::OffsetOutOfRange,
            3 => Self::UnknownTopicOrPartition,
            5 => Self::LeaderNotAvailable,
            6 => Self::NotLeaderForPartition,
            7 => Self::RequestTimedOut,
            14 => Self::GroupLoadInProgress,
            15 => Self::GroupCoordinatorNotAvailable,
            16 => Self::NotCoordinatorForGroup,
            22 => Self::IllegalGeneration,
            23 => Self::InconsistentGroupProtocol,
            24 => Self::InvalidGroupId,
            25 => Self::UnknownMemberId,
            26 => Self::InvalidSessionTimeout,
            27 => Self::RebalanceInProgress,
            other => Self::Unknown(other),
        }
    }
}

impl From<KafkaCode> for i16 {
    fn from(code: KafkaCode) -> Self {
        match code {
            KafkaCode::NoError => 0,
            KafkaCode::OffsetOutOfRange => 1,
            KafkaCode::UnknownTopicOrPartition => 3,
            KafkaCode::LeaderNotAvailable => 5,
            KafkaCode::NotLeaderForPartition => 6,
            KafkaCode::RequestTimedOut => 7,
            KafkaCode::GroupLoadInProgress => 14,
            KafkaCode::GroupCoordinatorNotAvailable => 15,
            KafkaCode::NotCoordinatorForGroup => 16,
            KafkaCode::IllegalGeneration => 22,
            KafkaCode::InconsistentGroupProtocol => 23,
            KafkaCode::InvalidGroupId => 24,
            KafkaCode::UnknownMemberId => 25,
            KafkaCode::InvalidSessionTimeout => 26,
            KafkaCode::RebalanceInProgress => 27,
            KafkaCode::Unknown(code) => code,
        }
    }
}

/// Errors surfaced to callers of a [`crate::worker::WorkerHandle`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The router could not resolve a partition leader, even after a
    /// metadata refresh.
    #[error("leader not available for {topic}/{partition}")]
    LeaderNotAvailable { topic: String, partition: i32 },

    /// The router resolved no partitions at all for a named topic.
    #[error("topic not found: {topic}")]
    TopicNotFound { topic: String },

    /// The router could not resolve a coordinator broker for a consumer
    /// group, even after a coordinator refresh (and, where applicable, the
    /// first-broker fallback).
    #[error("coordinator not available for group {group}")]
    CoordinatorNotAvailable { group: String },

    /// Every known broker failed to answer a metadata request. This is
    /// fatal: the worker's event loop exits after returning this to the
    /// caller that triggered the refresh, and the mailbox closes.
    #[error("unable to fetch metadata from any known broker")]
    NoMetadataAvailable,

    /// A broker rejected a request with a non-zero error code.
    #[error("server returned error {code:?} for {request}")]
    ServerError { code: KafkaCode, request: String },

    /// A synchronous exchange did not receive a reply within `sync_timeout`.
    #[error("request timed out")]
    RequestTimedOut,

    /// An operation that requires a consumer group was invoked on a worker
    /// configured with [`crate::config::ConsumerGroup::None`]. This is a
    /// caller contract violation: the worker asserts it rather than
    /// degrading gracefully.
    #[error("operation requires a consumer group, but this worker has none configured")]
    NoConsumerGroupConfigured,

    /// `create_stream` was called while a live sink was already attached;
    /// the existing sink is left untouched rather than replaced.
    #[error("a stream is already attached to this worker")]
    SinkAlreadyAttached,

    /// The worker's event loop has exited (most likely after a prior
    /// [`WorkerError::NoMetadataAvailable`]) and the mailbox is closed.
    #[error("worker mailbox is closed")]
    MailboxClosed,

    /// A lower-level socket error bubbled up from the [`crate::network::NetworkClient`].
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
}

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;
