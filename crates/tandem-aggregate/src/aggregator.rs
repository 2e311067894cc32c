use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_dispatch::{DispatcherFactory, StandardDispatcherFactory};
use tandem_redundancy::build_policy;
use tandem_types::{AccessMode, AccessResult, RedundancyMode};

use crate::filter::filter_accessors;

/// One resolved group: the accessor application code talks to, plus how it
/// was assembled.
#[derive(Clone)]
pub struct Aggregate {
    group: String,
    partition: String,
    mode: RedundancyMode,
    members: Vec<AccessorDescriptor>,
    accessor: Arc<dyn Accessor>,
}

impl Aggregate {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The policy applied. [`RedundancyMode::None`] when a single member
    /// was passed through.
    pub fn mode(&self) -> RedundancyMode {
        self.mode
    }

    /// Participating members in registration order.
    pub fn members(&self) -> &[AccessorDescriptor] {
        &self.members
    }

    pub fn is_bypass(&self) -> bool {
        self.members.len() == 1
    }

    pub fn accessor(&self) -> &Arc<dyn Accessor> {
        &self.accessor
    }

    pub fn into_accessor(self) -> Arc<dyn Accessor> {
        self.accessor
    }
}

impl fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<&str> = self.members.iter().map(|m| m.name()).collect();
        f.debug_struct("Aggregate")
            .field("group", &self.group)
            .field("partition", &self.partition)
            .field("mode", &self.mode)
            .field("members", &members)
            .field("accessor", &self.accessor.name())
            .finish()
    }
}

/// Turns resolved descriptors into the accessors application code uses.
///
/// - no candidates: `None`, logged as a configuration warning
/// - one candidate: that accessor, unfiltered and unwrapped
/// - several: filtered by access mode, then wrapped in the redundancy
///   policy of the highest-priority survivor (or passed through if only one
///   survives)
#[derive(Clone)]
pub struct Aggregator {
    factory: Arc<dyn DispatcherFactory>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Arc::new(StandardDispatcherFactory))
    }
}

impl Aggregator {
    pub fn new(factory: Arc<dyn DispatcherFactory>) -> Self {
        Self { factory }
    }

    /// Aggregate one group of candidates for `requested` access.
    pub fn aggregate(
        &self,
        candidates: &[AccessorDescriptor],
        requested: AccessMode,
    ) -> AccessResult<Option<Aggregate>> {
        let Some(first) = candidates.first() else {
            warn!(requested = %requested, "no accessors resolved");
            return Ok(None);
        };
        let (group, partition) = (first.group().to_string(), first.partition().to_string());
        if candidates.len() == 1 {
            return Ok(Some(Aggregate {
                group,
                partition,
                mode: RedundancyMode::None,
                members: candidates.to_vec(),
                accessor: Arc::clone(first.accessor()),
            }));
        }

        let members = filter_accessors(candidates, requested);
        let Some(lead) = members
            .iter()
            .min_by(|a, b| a.priority().total_cmp(&b.priority()))
        else {
            warn!(
                group = %group,
                requested = %requested,
                candidates = candidates.len(),
                "no accessor admits the requested access mode"
            );
            return Ok(None);
        };
        let mode = if members.len() == 1 {
            RedundancyMode::None
        } else {
            lead.dispatch_mode()
        };
        debug!(
            group = %group,
            partition = %partition,
            policy = %mode,
            members = members.len(),
            "aggregating group"
        );
        let accessor = build_policy(mode, members.clone(), self.factory.as_ref())?;
        Ok(Some(Aggregate {
            group,
            partition,
            mode,
            members,
            accessor,
        }))
    }

    /// Group `descriptors` by (group, partition) in first-appearance order
    /// and aggregate each group. Groups that resolve to nothing are skipped.
    pub fn aggregate_groups(
        &self,
        descriptors: &[AccessorDescriptor],
        requested: AccessMode,
    ) -> AccessResult<Vec<Aggregate>> {
        let mut aggregates = Vec::new();
        for members in group_by_partition(descriptors) {
            if let Some(aggregate) = self.aggregate(&members, requested)? {
                aggregates.push(aggregate);
            }
        }
        Ok(aggregates)
    }
}

/// Descriptors split by (group, partition), groups in first-appearance
/// order and members in registration order.
pub fn group_by_partition(descriptors: &[AccessorDescriptor]) -> Vec<Vec<AccessorDescriptor>> {
    let mut groups: Vec<Vec<AccessorDescriptor>> = Vec::new();
    for descriptor in descriptors {
        let slot = groups.iter_mut().find(|g| {
            g[0].group() == descriptor.group() && g[0].partition() == descriptor.partition()
        });
        match slot {
            Some(group) => group.push(descriptor.clone()),
            None => groups.push(vec![descriptor.clone()]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_accessor::InMemoryAccessor;
    use tandem_types::{AccessError, Key, Record};

    fn described(
        name: &str,
        group: &str,
        mode: AccessMode,
        redundancy: RedundancyMode,
        priority: f64,
    ) -> (Arc<InMemoryAccessor>, AccessorDescriptor) {
        let store = Arc::new(InMemoryAccessor::new(name));
        let d = AccessorDescriptor::new(name, store.clone())
            .with_group(group)
            .with_access_mode(mode)
            .with_dispatch_mode(redundancy)
            .with_priority(priority);
        (store, d)
    }

    #[test]
    fn nothing_resolves_to_none() {
        let agg = Aggregator::default();
        assert!(agg.aggregate(&[], AccessMode::READ).unwrap().is_none());
    }

    #[test]
    fn single_candidate_bypasses_filtering() {
        let (_s, d) = described("w", "g", AccessMode::WRITE, RedundancyMode::Mirroring, 1.0);
        let agg = Aggregator::default()
            .aggregate(&[d], AccessMode::READ)
            .unwrap()
            .unwrap();
        assert!(agg.is_bypass());
        assert_eq!(agg.mode(), RedundancyMode::None);
        assert_eq!(agg.accessor().name(), "w");
    }

    #[test]
    fn several_candidates_are_filtered_then_wrapped() {
        let (_r, dr) = described("r", "g", AccessMode::READ, RedundancyMode::Mirroring, 1.0);
        let (_w, dw) = described("w", "g", AccessMode::WRITE, RedundancyMode::Mirroring, 2.0);
        let (_b, db) = described("b", "g", AccessMode::READ_WRITE, RedundancyMode::Mirroring, 3.0);

        let agg = Aggregator::default()
            .aggregate(&[dr, dw, db], AccessMode::READ)
            .unwrap()
            .unwrap();
        assert_eq!(agg.mode(), RedundancyMode::Mirroring);
        let names: Vec<&str> = agg.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["r", "b"]);
        assert_eq!(agg.accessor().name(), "mirroring[r,b]");
    }

    #[test]
    fn filter_down_to_one_passes_through() {
        let (_r, dr) = described("r", "g", AccessMode::READ, RedundancyMode::Striping, 1.0);
        let (_w, dw) = described("w", "g", AccessMode::WRITE, RedundancyMode::Striping, 2.0);
        let agg = Aggregator::default()
            .aggregate(&[dr, dw], AccessMode::WRITE)
            .unwrap()
            .unwrap();
        assert_eq!(agg.mode(), RedundancyMode::None);
        assert_eq!(agg.accessor().name(), "w");
    }

    #[test]
    fn filter_down_to_none_is_absent() {
        let (_r, dr) = described("r", "g", AccessMode::READ, RedundancyMode::Mirroring, 1.0);
        let (_s, ds) = described("s", "g", AccessMode::READ, RedundancyMode::Mirroring, 2.0);
        let agg = Aggregator::default().aggregate(&[dr, ds], AccessMode::WRITE).unwrap();
        assert!(agg.is_none());
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let (_a, da) = described("a", "orders", AccessMode::READ_WRITE, RedundancyMode::Mirroring, 1.0);
        let (_x, dx) = described("x", "billing", AccessMode::READ_WRITE, RedundancyMode::None, 1.0);
        let (_b, db) = described("b", "orders", AccessMode::READ_WRITE, RedundancyMode::Mirroring, 2.0);

        let aggregates = Aggregator::default()
            .aggregate_groups(&[da, dx, db], AccessMode::READ_WRITE)
            .unwrap();
        let groups: Vec<&str> = aggregates.iter().map(|a| a.group()).collect();
        assert_eq!(groups, vec!["orders", "billing"]);
        assert_eq!(aggregates[0].members().len(), 2);
        assert!(aggregates[1].is_bypass());
    }

    #[test]
    fn partitions_split_a_group() {
        let (_a, da) = described("a", "orders", AccessMode::READ_WRITE, RedundancyMode::None, 1.0);
        let (_b, db) = described("b", "orders", AccessMode::READ_WRITE, RedundancyMode::None, 1.0);
        let groups = group_by_partition(&[da, db.with_partition("eu")]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn aggregated_mirror_replicates_writes() {
        let (a, da) = described("a", "g", AccessMode::READ_WRITE, RedundancyMode::Mirroring, 1.0);
        let (b, db) = described("b", "g", AccessMode::READ_WRITE, RedundancyMode::Mirroring, 2.0);
        let accessor = Aggregator::default()
            .aggregate(&[da, db], AccessMode::READ_WRITE)
            .unwrap()
            .unwrap()
            .into_accessor();
        accessor.add(&Record::new("order", 1)).unwrap();
        accessor.save_changes().unwrap();
        assert!(a.durable("order", &Key::from(1)).is_some());
        assert!(b.durable("order", &Key::from(1)).is_some());

        let err = accessor.change_connection("memory://x").unwrap_err();
        assert!(matches!(err, AccessError::Unsupported { .. }));
    }
}
