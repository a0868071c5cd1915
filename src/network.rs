//! The `NetworkClient` collaborator (spec §6.5): TCP socket I/O. Out of
//! scope for the worker's own logic, specified here only as a trait
//! boundary, with one real implementation (plain TCP, grounded on the
//! teacher's `connection::transport::Transport`) and one in-memory mock used
//! throughout the test suite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connecting to broker timed out")]
    ConnectTimeout,
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;

/// A live connection to one broker. `send_sync` returns `Ok(None)` on
/// timeout or a broken connection, matching spec §6.5's "nil on timeout".
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    async fn send_sync(&self, bytes: Vec<u8>, timeout: Duration) -> Result<Option<Vec<u8>>>;

    async fn send_async(&self, bytes: Vec<u8>) -> Result<()>;

    async fn connected(&self) -> bool;

    async fn close(&self);
}

/// Opens and tears down connections. `create_socket`/`close_socket` in
/// spec §6.5 map to `connect`/`Connection::close`.
#[async_trait]
pub trait NetworkClient: Send + Sync + std::fmt::Debug {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Connection>>;
}

/// Plain-TCP implementation. Frames are length-prefixed (4-byte big-endian
/// length followed by payload), the same framing the real Kafka wire
/// protocol uses for its request/response envelope.
#[derive(Debug, Default)]
pub struct TokioNetworkClient;

impl TokioNetworkClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkClient for TokioNetworkClient {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Connection>> {
        let stream = tokio::time::timeout(
            Duration::from_millis(10_000),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| NetworkError::ConnectTimeout)??;

        Ok(Arc::new(TcpConnection {
            stream: Mutex::new(Some(stream)),
        }))
    }
}

#[derive(Debug)]
struct TcpConnection {
    stream: Mutex<Option<TcpStream>>,
}

/// In-memory test double for [`NetworkClient`]/[`Connection`], used
/// throughout the worker's test suite instead of a live broker.
#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    pub struct MockNetworkClient {
        down: SyncMutex<HashSet<(String, u16)>>,
        fail_connect: SyncMutex<HashSet<(String, u16)>>,
    }

    impl MockNetworkClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks a broker address as reachable for `connect`, but with a
        /// connection that reports disconnected / returns no replies.
        pub fn set_down(&self, host: &str, port: u16) {
            self.down.lock().insert((host.to_string(), port));
        }

        /// Makes `connect` itself fail for this address (e.g. to simulate a
        /// seed broker that never comes up).
        pub fn set_fail_connect(&self, host: &str, port: u16) {
            self.fail_connect.lock().insert((host.to_string(), port));
        }
    }

    #[async_trait]
    impl NetworkClient for MockNetworkClient {
        async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Connection>> {
            if self.fail_connect.lock().contains(&(host.to_string(), port)) {
                return Err(NetworkError::ConnectTimeout);
            }
            let up = !self.down.lock().contains(&(host.to_string(), port));
            Ok(Arc::new(MockConnection { up: AtomicBool::new(up) }))
        }
    }

    #[derive(Debug)]
    struct MockConnection {
        up: AtomicBool,
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn send_sync(&self, _bytes: Vec<u8>, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            if self.up.load(Ordering::SeqCst) {
                Ok(Some(vec![1]))
            } else {
                Ok(None)
            }
        }

        async fn send_async(&self, _bytes: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn connected(&self) -> bool {
            self.up.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.up.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send_sync(&self, bytes: Vec<u8>, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(None);
        };

        let fut = async {
            stream.write_u32(bytes.len() as u32).await?;
            stream.write_all(&bytes).await?;

            let len = stream.read_u32().await? as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(buf)) => Ok(Some(buf)),
            Ok(Err(_)) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn send_async(&self, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(());
        };

        stream.write_u32(bytes.len() as u32).await?;
        stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn close(&self) {
        if let Some(stream) = self.stream.lock().await.take() {
            let _ = stream.into_std().map(|s| s.set_nonblocking(true));
        }
    }
}
