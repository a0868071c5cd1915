//! A stateful, single-threaded client worker for a Kafka-style message
//! broker cluster.
//!
//! A [`worker::WorkerHandle`] is a cheap, `Clone`-able front for a single
//! actor task that owns one broker connection pool, one metadata cache, and
//! (if configured) one consumer-group coordinator cache. Callers never touch
//! that state directly -- every public operation sends a tagged command
//! across a mailbox and awaits a reply, so the worker's internals stay
//! single-threaded even though many callers can hold a handle concurrently.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kafka_worker::config::WorkerConfig;
//! use kafka_worker::network::TokioNetworkClient;
//! use kafka_worker::protocol::KafkaProtocol;
//! use kafka_worker::worker;
//!
//! # async fn run() -> kafka_worker::error::Result<()> {
//! let config = WorkerConfig::new(vec![("localhost".into(), 9092)]);
//! let handle = worker::spawn(config, Arc::new(TokioNetworkClient::new()), Arc::new(KafkaProtocol::new())).await?;
//! let metadata = handle.metadata(None).await?;
//! handle.shutdown().await;
//! # let _ = metadata;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod broker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metadata;
pub mod network;
pub mod protocol;
pub mod router;
pub mod refresh;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use worker::{spawn, StreamHandle, WorkerHandle};
