//! Component I: the worker event loop (spec §4.I), plus [`WorkerState`]
//! (spec §3) and the public [`WorkerHandle`].
//!
//! The worker is a single-threaded cooperative actor: one `tokio::spawn`ed
//! task owns [`WorkerState`] exclusively and drains a `tokio::sync::mpsc`
//! mailbox one [`Command`] at a time via `tokio::select!`, replacing the
//! original GenServer mailbox with a channel and a task.

mod handlers;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, instrument};

use crate::broker::BrokerRegistry;
use crate::config::{ConsumerGroup, WorkerConfig, DEFAULT_CLIENT_ID};
use crate::coordinator::CoordinatorSnapshot;
use crate::error::{Result, WorkerError};
use crate::metadata::MetadataSnapshot;
use crate::network::NetworkClient;
use crate::protocol::messages::{
    FetchRequest, FetchResponse, HeartbeatRequest, HeartbeatResponse, JoinGroupRequest,
    JoinGroupResponse, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, OffsetRequest, OffsetResponse, ProduceOutcome, ProduceRequest,
    SyncGroupRequest, SyncGroupResponse,
};
use crate::protocol::Protocol;
use crate::refresh;

pub use stream::StreamHandle;
use stream::StreamSink;

/// Spec §3 "Worker state": owned solely by the event-loop task.
pub struct WorkerState {
    pub registry: BrokerRegistry,
    pub metadata: MetadataSnapshot,
    pub coordinator: Option<CoordinatorSnapshot>,
    pub correlation_id: u32,
    pub consumer_group: ConsumerGroup,
    pub sync_timeout: Duration,
    pub metadata_update_interval: Duration,
    pub consumer_group_update_interval: Duration,
    pub sink: Option<StreamSink>,
    pub name: String,
}

/// Tagged request variants, per Design Note 9.2. Every caller-facing
/// operation in spec §6.1 carries a `oneshot::Sender` reply channel; `Tick*`
/// and the self-rescheduling streaming messages are internal, never
/// constructed outside this module.
enum Command {
    ConsumerGroup { reply: oneshot::Sender<ConsumerGroup> },
    Produce { request: ProduceRequest, reply: oneshot::Sender<Result<ProduceOutcome>> },
    Fetch { request: FetchRequest, auto_commit: bool, reply: oneshot::Sender<Result<FetchResponse>> },
    Offset { request: OffsetRequest, reply: oneshot::Sender<Result<OffsetResponse>> },
    OffsetFetch { request: OffsetFetchRequest, reply: oneshot::Sender<Result<OffsetFetchResponse>> },
    OffsetCommit { request: OffsetCommitRequest, reply: oneshot::Sender<Result<OffsetCommitResponse>> },
    ConsumerGroupMetadata { reply: oneshot::Sender<Result<Option<CoordinatorSnapshot>>> },
    Metadata { topic: Option<String>, reply: oneshot::Sender<Result<MetadataSnapshot>> },
    JoinGroup { request: JoinGroupRequest, reply: oneshot::Sender<Result<JoinGroupResponse>> },
    SyncGroup { request: SyncGroupRequest, reply: oneshot::Sender<Result<SyncGroupResponse>> },
    Heartbeat { request: HeartbeatRequest, reply: oneshot::Sender<Result<HeartbeatResponse>> },
    CreateStream {
        topic: String,
        partition: i32,
        offset: i64,
        auto_commit: bool,
        poll_interval: Duration,
        reply: oneshot::Sender<Result<StreamHandle>>,
    },
    /// Spec §6.2 `start_streaming`: re-posted by the streaming loop itself.
    StartStreaming { topic: String, partition: i32, offset: i64, auto_commit: bool, poll_interval: Duration },
    /// Spec §6.2 `stop_streaming`.
    StopStreaming,
    /// Spec §6.2 `refresh-metadata` tick.
    RefreshMetadata,
    /// Spec §6.2 `refresh-coordinator` tick.
    RefreshCoordinator,
    Shutdown,
}

/// The `Clone`-able, `Send + Sync` public handle callers hold. Never touches
/// [`WorkerState`] directly; every method sends a tagged [`Command`] and
/// awaits its `oneshot` reply.
#[derive(Clone)]
pub struct WorkerHandle {
    mailbox: mpsc::Sender<Command>,
}

async fn call<T>(mailbox: &mpsc::Sender<Command>, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    mailbox.send(build(tx)).await.map_err(|_| WorkerError::MailboxClosed)?;
    rx.await.map_err(|_| WorkerError::MailboxClosed)?
}

/// Delivers a handler's result to its caller and, separately, tells
/// `dispatch` whether the loop must end. `NoMetadataAvailable` is fatal no
/// matter which command's handler produced it (every handler eventually
/// routes through a metadata or coordinator refresh), so it is reported to
/// the caller via `reply` and then re-raised here to unwind `dispatch`.
fn finish<T>(reply: oneshot::Sender<Result<T>>, result: Result<T>) -> Result<()> {
    let fatal = matches!(&result, Err(WorkerError::NoMetadataAvailable));
    let _ = reply.send(result);
    if fatal {
        Err(WorkerError::NoMetadataAvailable)
    } else {
        Ok(())
    }
}

impl WorkerHandle {
    pub async fn consumer_group(&self) -> Result<ConsumerGroup> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(Command::ConsumerGroup { reply: tx })
            .await
            .map_err(|_| WorkerError::MailboxClosed)?;
        rx.await.map_err(|_| WorkerError::MailboxClosed)
    }

    pub async fn produce(&self, request: ProduceRequest) -> Result<ProduceOutcome> {
        call(&self.mailbox, |reply| Command::Produce { request, reply }).await
    }

    pub async fn fetch(&self, request: FetchRequest, auto_commit: bool) -> Result<FetchResponse> {
        call(&self.mailbox, |reply| Command::Fetch { request, auto_commit, reply }).await
    }

    pub async fn offset(&self, request: OffsetRequest) -> Result<OffsetResponse> {
        call(&self.mailbox, |reply| Command::Offset { request, reply }).await
    }

    pub async fn offset_fetch(&self, request: OffsetFetchRequest) -> Result<OffsetFetchResponse> {
        call(&self.mailbox, |reply| Command::OffsetFetch { request, reply }).await
    }

    pub async fn offset_commit(&self, request: OffsetCommitRequest) -> Result<OffsetCommitResponse> {
        call(&self.mailbox, |reply| Command::OffsetCommit { request, reply }).await
    }

    pub async fn consumer_group_metadata(&self) -> Result<Option<CoordinatorSnapshot>> {
        call(&self.mailbox, |reply| Command::ConsumerGroupMetadata { reply }).await
    }

    pub async fn metadata(&self, topic: Option<String>) -> Result<MetadataSnapshot> {
        call(&self.mailbox, |reply| Command::Metadata { topic, reply }).await
    }

    pub async fn join_group(&self, request: JoinGroupRequest) -> Result<JoinGroupResponse> {
        call(&self.mailbox, |reply| Command::JoinGroup { request, reply }).await
    }

    pub async fn sync_group(&self, request: SyncGroupRequest) -> Result<SyncGroupResponse> {
        call(&self.mailbox, |reply| Command::SyncGroup { request, reply }).await
    }

    pub async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        call(&self.mailbox, |reply| Command::Heartbeat { request, reply }).await
    }

    pub async fn create_stream(
        &self,
        topic: String,
        partition: i32,
        offset: i64,
        auto_commit: bool,
        poll_interval: Duration,
    ) -> Result<StreamHandle> {
        call(&self.mailbox, |reply| Command::CreateStream {
            topic,
            partition,
            offset,
            auto_commit,
            poll_interval,
            reply,
        })
        .await
    }

    /// Stops the event loop after its current command finishes. Idempotent:
    /// sending to an already-closed mailbox is simply ignored.
    pub async fn shutdown(&self) {
        let _ = self.mailbox.send(Command::Shutdown).await;
    }
}

/// The actor itself: owns [`WorkerState`] plus the two out-of-scope
/// collaborators (spec §6.4, §6.5) behind trait objects.
struct Worker {
    state: WorkerState,
    network: Arc<dyn NetworkClient>,
    protocol: Arc<dyn Protocol>,
    client_id: String,
    mailbox_tx: mpsc::Sender<Command>,
    mailbox_rx: mpsc::Receiver<Command>,
}

/// Spawns the worker's event-loop task and runs its startup sequence (spec
/// §4.I): open seed sockets, retrieve initial metadata at correlation id 0,
/// then arm the periodic tickers.
pub async fn spawn(
    config: WorkerConfig,
    network: Arc<dyn NetworkClient>,
    protocol: Arc<dyn Protocol>,
) -> Result<WorkerHandle> {
    let registry = BrokerRegistry::seed(network.as_ref(), &config.uris).await;

    let (mailbox_tx, mailbox_rx) = mpsc::channel(256);

    let mut state = WorkerState {
        registry,
        metadata: MetadataSnapshot::default(),
        coordinator: None,
        correlation_id: 0,
        consumer_group: config.consumer_group,
        sync_timeout: config.sync_timeout,
        metadata_update_interval: config.metadata_update_interval,
        consumer_group_update_interval: config.consumer_group_update_interval,
        sink: None,
        name: config.name,
    };

    let (cid, result) = refresh::update_metadata(
        protocol.as_ref(),
        DEFAULT_CLIENT_ID,
        &mut state.registry,
        network.as_ref(),
        None,
        state.correlation_id,
        state.sync_timeout,
    )
    .await;
    state.correlation_id = cid;
    state.metadata = result?;

    let worker = Worker {
        state,
        network,
        protocol,
        client_id: DEFAULT_CLIENT_ID.to_string(),
        mailbox_tx: mailbox_tx.clone(),
        mailbox_rx,
    };

    tokio::spawn(worker.run());

    Ok(WorkerHandle { mailbox: mailbox_tx })
}

impl Worker {
    #[instrument(skip_all, fields(worker = %self.state.name))]
    async fn run(mut self) {
        let mut metadata_ticker = tokio::time::interval(self.state.metadata_update_interval);
        metadata_ticker.tick().await; // interval's first tick fires immediately; consume it

        let mut coordinator_ticker = tokio::time::interval(self.state.consumer_group_update_interval);
        coordinator_ticker.tick().await;

        loop {
            let cmd = tokio::select! {
                biased;

                maybe_cmd = self.mailbox_rx.recv() => match maybe_cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
                _ = metadata_ticker.tick() => Command::RefreshMetadata,
                _ = coordinator_ticker.tick(), if self.state.consumer_group.is_configured() => Command::RefreshCoordinator,
            };

            if matches!(cmd, Command::Shutdown) {
                break;
            }

            if let Err(fatal) = self.dispatch(cmd).await {
                error!(%fatal, "worker event loop exiting after a fatal error");
                break;
            }
        }

        self.shutdown().await;
    }

    /// Dispatches one command to completion. Returns `Err` only for the one
    /// fatal condition, `WorkerError::NoMetadataAvailable`: every known
    /// broker failed to answer a metadata request, regardless of which
    /// command triggered the refresh. All other handler errors are
    /// delivered to the caller via its reply channel without ending the
    /// loop.
    async fn dispatch(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::ConsumerGroup { reply } => {
                let _ = reply.send(self.state.consumer_group.clone());
            }
            Command::Produce { request, reply } => {
                let result = self.handle_produce(request).await;
                finish(reply, result)?;
            }
            Command::Fetch { request, auto_commit, reply } => {
                let result = self.handle_fetch(request, auto_commit).await;
                finish(reply, result)?;
            }
            Command::Offset { request, reply } => {
                let result = self.handle_offset(request).await;
                finish(reply, result)?;
            }
            Command::OffsetFetch { request, reply } => {
                let result = self.handle_offset_fetch(request).await;
                finish(reply, result)?;
            }
            Command::OffsetCommit { request, reply } => {
                let result = self.handle_offset_commit(request).await;
                finish(reply, result)?;
            }
            Command::ConsumerGroupMetadata { reply } => {
                let result = self.handle_consumer_group_metadata().await;
                finish(reply, result)?;
            }
            Command::Metadata { topic, reply } => {
                let result = self.handle_metadata(topic).await;
                finish(reply, result)?;
            }
            Command::JoinGroup { request, reply } => {
                let result = self.handle_join_group(request).await;
                finish(reply, result)?;
            }
            Command::SyncGroup { request, reply } => {
                let result = self.handle_sync_group(request).await;
                finish(reply, result)?;
            }
            Command::Heartbeat { request, reply } => {
                let result = self.handle_heartbeat(request).await;
                finish(reply, result)?;
            }
            Command::CreateStream { topic, partition, offset, auto_commit, poll_interval, reply } => {
                let result = self.handle_create_stream(topic, partition, offset, auto_commit, poll_interval);
                finish(reply, result)?;
            }
            Command::StartStreaming { topic, partition, offset, auto_commit, poll_interval } => {
                self.handle_start_streaming(topic, partition, offset, auto_commit, poll_interval).await;
            }
            Command::StopStreaming => {
                self.state.sink = None;
            }
            Command::RefreshMetadata => {
                let (cid, result) = refresh::update_metadata(
                    self.protocol.as_ref(),
                    &self.client_id,
                    &mut self.state.registry,
                    self.network.as_ref(),
                    None,
                    self.state.correlation_id,
                    self.state.sync_timeout,
                )
                .await;
                self.state.correlation_id = cid;
                self.state.metadata = result?;
            }
            Command::RefreshCoordinator => {
                if let Some(group) = self.state.consumer_group.as_str() {
                    let (cid, result) = refresh::update_coordinator(
                        self.protocol.as_ref(),
                        &self.client_id,
                        &self.state.registry,
                        group,
                        self.state.correlation_id,
                        self.state.sync_timeout,
                    )
                    .await;
                    self.state.correlation_id = cid;
                    if let Ok(snapshot) = result {
                        self.state.coordinator = Some(snapshot);
                    }
                    // On exhaustion, do not install -- spec §4.E step 5.
                }
            }
            Command::Shutdown => unreachable!("handled by the caller before dispatch"),
        }
        Ok(())
    }

    /// Spec §3 / §4.I teardown: stop the sink if any, close every broker
    /// socket.
    async fn shutdown(&mut self) {
        self.state.sink = None;
        self.state.registry.close_all().await;
        info!(worker = %self.state.name, "worker shut down");
    }

    /// Posts `Command::StartStreaming` after `delay`, spec §4.H. Spawned
    /// rather than awaited so the main loop is never blocked waiting out the
    /// poll interval. `delay` is `Duration::ZERO` for the initial kickoff
    /// from `create_stream` and `poll_interval` for every subsequent
    /// self-reschedule.
    fn reschedule_streaming(&self, topic: String, partition: i32, offset: i64, auto_commit: bool, poll_interval: Duration, delay: Duration) {
        let mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = mailbox
                .send(Command::StartStreaming { topic, partition, offset, auto_commit, poll_interval })
                .await;
        });
    }
}

/// Test-only harness for building a [`Worker`] by hand, bypassing `spawn`'s
/// network round trip. Shared by `handlers`' and `stream`'s own test modules
/// (both are descendants of this module, so they can reach this private
/// item through `super::support`).
#[cfg(test)]
mod support {
    use super::*;
    use crate::broker::BrokerRegistry;

    pub fn worker(
        network: Arc<dyn NetworkClient>,
        protocol: Arc<dyn Protocol>,
        registry: BrokerRegistry,
        metadata: MetadataSnapshot,
        consumer_group: ConsumerGroup,
    ) -> Worker {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(8);
        Worker {
            state: WorkerState {
                registry,
                metadata,
                coordinator: None,
                correlation_id: 0,
                consumer_group,
                sync_timeout: Duration::from_millis(200),
                metadata_update_interval: Duration::from_secs(30),
                consumer_group_update_interval: Duration::from_secs(30),
                sink: None,
                name: "test".into(),
            },
            network,
            protocol,
            client_id: "kafka_ex".into(),
            mailbox_tx,
            mailbox_rx,
        }
    }
}
