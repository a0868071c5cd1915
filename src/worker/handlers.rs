//! Component G: operation handlers (spec §4.G). Every handler shares a
//! skeleton: resolve a target broker via the router, send a request built
//! with the current correlation id, parse the reply, advance state.

use tracing::warn;

use crate::broker::Broker;
use crate::coordinator::CoordinatorSnapshot;
use crate::error::{Result, WorkerError};
use crate::metadata::{self, MetadataSnapshot};
use crate::protocol::messages::{
    FetchRequest, FetchResponse, HeartbeatRequest, HeartbeatResponse, JoinGroupRequest,
    JoinGroupResponse, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, OffsetRequest, OffsetResponse, ProduceOutcome, ProduceRequest,
    SyncGroupRequest, SyncGroupResponse,
};
use crate::router;

use super::Worker;
use super::stream::auto_commit_request;

impl Worker {
    /// Resolves a partition's leader, refreshing metadata on a miss.
    /// `topic_scoped_first` is produce's extra twist (spec §4.F): try a
    /// topic-scoped refresh before the full `update_metadata`.
    async fn route_leader(&mut self, topic: &str, partition: i32, topic_scoped_first: bool) -> Result<Option<Broker>> {
        let (cid, refreshed) = router::route(
            self.protocol.as_ref(),
            &self.client_id,
            &mut self.state.registry,
            self.network.as_ref(),
            &self.state.metadata,
            topic,
            partition,
            self.state.correlation_id,
            self.state.sync_timeout,
            topic_scoped_first,
        )
        .await;
        self.state.correlation_id = cid;

        if let Some(snapshot) = refreshed? {
            self.state.metadata = snapshot;
        }

        Ok(metadata::leader_for(&self.state.metadata, &self.state.registry, topic, partition).cloned())
    }

    /// Resolves the coordinator broker, refreshing the coordinator cache on
    /// a miss. `use_first_as_default` is offset-commit's fallback to the
    /// registry head (spec §4.F step 3).
    async fn route_coordinator_broker(&mut self, use_first_as_default: bool) -> Result<Option<Broker>> {
        let (cid, snapshot, choice) = router::route_coordinator(
            self.protocol.as_ref(),
            &self.client_id,
            &self.state.registry,
            &self.state.coordinator,
            &self.state.consumer_group,
            self.state.correlation_id,
            self.state.sync_timeout,
            use_first_as_default,
        )
        .await;
        self.state.correlation_id = cid;
        if let Some(snapshot) = snapshot {
            self.state.coordinator = Some(snapshot);
        }
        Ok(choice.resolve(&self.state.registry).cloned())
    }

    /// Sends `bytes` synchronously to `broker`, bumps the correlation id by
    /// one, and returns the raw reply. Every non-produce handler bumps by
    /// exactly one; produce's own `+1`/`+2` split is handled inline in
    /// `handle_produce` instead of going through this helper.
    async fn exchange(&mut self, broker: &Broker, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let conn = broker.connection().ok_or(WorkerError::RequestTimedOut)?.clone();
        let reply = conn.send_sync(bytes, self.state.sync_timeout).await?;
        self.state.correlation_id = self.state.correlation_id.wrapping_add(1);
        reply.ok_or(WorkerError::RequestTimedOut)
    }

    /// **produce** (spec §4.G): `required_acks == 0` dispatches
    /// asynchronously (fire-and-forget) and bumps the correlation id by one;
    /// otherwise the request is sent synchronously and the id is bumped by
    /// two (one for the build, one for the post-dispatch bump) to keep id
    /// sequencing consistent with server logs.
    pub(super) async fn handle_produce(&mut self, request: ProduceRequest) -> Result<ProduceOutcome> {
        let broker = self.route_leader(&request.topic, request.partition, true).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::LeaderNotAvailable { topic: request.topic, partition: request.partition });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_produce_request(cid, &self.client_id, &request);
        let conn = broker.connection().ok_or(WorkerError::RequestTimedOut)?.clone();

        if request.required_acks == 0 {
            conn.send_async(bytes).await?;
            self.state.correlation_id = cid.wrapping_add(1);
            Ok(ProduceOutcome::Dispatched)
        } else {
            let reply = conn.send_sync(bytes, self.state.sync_timeout).await?;
            self.state.correlation_id = cid.wrapping_add(2);
            match reply {
                Some(bytes) => Ok(ProduceOutcome::Response(self.protocol.decode_produce_response(&bytes))),
                None => Err(WorkerError::RequestTimedOut),
            }
        }
    }

    /// **fetch** (spec §4.G): if `auto_commit` and the reply names a
    /// non-nil `last_offset` for the fetched partition, synthesize and
    /// dispatch an offset-commit for that position using the worker's
    /// consumer group.
    pub(super) async fn handle_fetch(&mut self, request: FetchRequest, auto_commit: bool) -> Result<FetchResponse> {
        if auto_commit {
            debug_assert!(
                self.state.consumer_group.is_configured(),
                "fetch with auto_commit requires a configured consumer group"
            );
        }

        let broker = self.route_leader(&request.topic, request.partition, false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::TopicNotFound { topic: request.topic });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_fetch_request(cid, &self.client_id, &request);
        let reply_bytes = self.exchange(&broker, bytes).await?;
        let response = self.protocol.decode_fetch_response(&reply_bytes);

        if auto_commit {
            if let Some(last_offset) = response.last_offset {
                let commit = auto_commit_request(
                    response.topic.clone(),
                    response.partition,
                    last_offset,
                    self.state.consumer_group.clone(),
                );
                if let Err(err) = self.handle_offset_commit(commit).await {
                    warn!(%err, topic = %response.topic, partition = response.partition, "auto-commit failed after fetch");
                }
            }
        }

        Ok(response)
    }

    /// **offset** (list offsets, spec §4.G): time-indexed offset lookup,
    /// partition-scoped routing.
    pub(super) async fn handle_offset(&mut self, request: OffsetRequest) -> Result<OffsetResponse> {
        let broker = self.route_leader(&request.topic, request.partition, false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::TopicNotFound { topic: request.topic });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_list_offsets_request(cid, &self.client_id, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_list_offsets_response(&reply))
    }

    /// **offset_fetch** (spec §4.G): coordinator-scoped; substitutes the
    /// worker's configured consumer group when the caller's request carries
    /// `ConsumerGroup::None`.
    pub(super) async fn handle_offset_fetch(&mut self, mut request: OffsetFetchRequest) -> Result<OffsetFetchResponse> {
        if !request.consumer_group.is_configured() {
            request.consumer_group = self.state.consumer_group.clone();
        }
        debug_assert!(
            request.consumer_group.is_configured(),
            "offset_fetch requires a consumer group, from the caller or the worker's own configuration"
        );

        let broker = self.route_coordinator_broker(false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::CoordinatorNotAvailable { group: request.consumer_group.to_string() });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_offset_fetch_request(cid, &self.client_id, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_offset_fetch_response(&reply))
    }

    /// **offset_commit** (spec §4.G): coordinator-scoped with
    /// `use_first_as_default = true`, preserving the prior behavior that an
    /// uncoordinated offset-commit falls back to the registry head. Same
    /// consumer-group substitution rule as `offset_fetch`.
    pub(super) async fn handle_offset_commit(&mut self, mut request: OffsetCommitRequest) -> Result<OffsetCommitResponse> {
        if !request.consumer_group.is_configured() {
            request.consumer_group = self.state.consumer_group.clone();
        }
        debug_assert!(
            request.consumer_group.is_configured(),
            "offset_commit requires a consumer group, from the caller or the worker's own configuration"
        );

        let broker = self.route_coordinator_broker(true).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::CoordinatorNotAvailable { group: request.consumer_group.to_string() });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_offset_commit_request(cid, &self.client_id, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_offset_commit_response(&reply))
    }

    /// **consumer_group_metadata** (spec §4.G): returns the current
    /// coordinator snapshot, refreshing first.
    pub(super) async fn handle_consumer_group_metadata(&mut self) -> Result<Option<CoordinatorSnapshot>> {
        let _ = self.route_coordinator_broker(false).await?;
        Ok(self.state.coordinator.clone())
    }

    /// **metadata(topic)** (spec §4.G): forces a targeted refresh and
    /// returns the fresh snapshot.
    pub(super) async fn handle_metadata(&mut self, topic: Option<String>) -> Result<MetadataSnapshot> {
        let (cid, result) = crate::refresh::update_metadata(
            self.protocol.as_ref(),
            &self.client_id,
            &mut self.state.registry,
            self.network.as_ref(),
            topic.as_deref(),
            self.state.correlation_id,
            self.state.sync_timeout,
        )
        .await;
        self.state.correlation_id = cid;
        let snapshot = result?;
        self.state.metadata = snapshot.clone();
        Ok(snapshot)
    }

    /// **join_group / sync_group / heartbeat** (spec §4.G): coordinator-scoped
    /// thin pass-throughs preserving `member_id`, `generation_id`, and
    /// `assignments` untouched.
    pub(super) async fn handle_join_group(&mut self, request: JoinGroupRequest) -> Result<JoinGroupResponse> {
        debug_assert!(
            self.state.consumer_group.is_configured(),
            "join_group requires a configured consumer group"
        );
        let group = self.state.consumer_group.to_string();
        let broker = self.route_coordinator_broker(false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::CoordinatorNotAvailable { group });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_join_group_request(cid, &self.client_id, &group, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_join_group_response(&reply))
    }

    pub(super) async fn handle_sync_group(&mut self, request: SyncGroupRequest) -> Result<SyncGroupResponse> {
        debug_assert!(
            self.state.consumer_group.is_configured(),
            "sync_group requires a configured consumer group"
        );
        let group = self.state.consumer_group.to_string();
        let broker = self.route_coordinator_broker(false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::CoordinatorNotAvailable { group });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_sync_group_request(cid, &self.client_id, &group, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_sync_group_response(&reply))
    }

    pub(super) async fn handle_heartbeat(&mut self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        debug_assert!(
            self.state.consumer_group.is_configured(),
            "heartbeat requires a configured consumer group"
        );
        let group = self.state.consumer_group.to_string();
        let broker = self.route_coordinator_broker(false).await?;
        let Some(broker) = broker else {
            return Err(WorkerError::CoordinatorNotAvailable { group });
        };

        let cid = self.state.correlation_id;
        let bytes = self.protocol.encode_heartbeat_request(cid, &self.client_id, &group, &request);
        let reply = self.exchange(&broker, bytes).await?;
        Ok(self.protocol.decode_heartbeat_response(&reply))
    }
}
