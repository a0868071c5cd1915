//! Component C: the consumer-coordinator cache (spec §4.C).

use crate::broker::{Broker, BrokerRegistry};
pub use crate::protocol::messages::CoordinatorSnapshot;

/// Spec §4.C: resolve the coordinator's (host, port) through the registry.
/// Pure function over `(snapshot, registry)`, per Design Note 9.3.
pub fn coordinator_broker<'a>(
    snapshot: &CoordinatorSnapshot,
    registry: &'a BrokerRegistry,
) -> Option<&'a Broker> {
    registry.find(&snapshot.host, snapshot.port)
}
