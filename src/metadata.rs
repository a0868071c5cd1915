//! Component B: the metadata cache (spec §4.B).

use crate::broker::{Broker, BrokerRegistry};
pub use crate::protocol::messages::MetadataSnapshot;

/// Spec §4.B: resolve a partition's leader through the registry. Returns
/// `None` if the topic or partition is absent, its error code indicates
/// `leader_not_available`, or the referenced broker is not currently in the
/// registry. A pure function over `(snapshot, registry)`, per Design Note
/// 9.3, so it is reusable by both the router and tests without any I/O.
pub fn leader_for<'a>(
    snapshot: &MetadataSnapshot,
    registry: &'a BrokerRegistry,
    topic: &str,
    partition: i32,
) -> Option<&'a Broker> {
    let topic_meta = snapshot.topics.iter().find(|t| t.name == topic)?;
    let partition_meta = topic_meta.partitions.iter().find(|p| p.partition_index == partition)?;

    if partition_meta.error.is_leader_not_available() {
        return None;
    }

    registry.find_by_node(partition_meta.leader_id)
}
