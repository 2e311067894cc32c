use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use tandem_accessor::AccessorDescriptor;
use tandem_types::{AccessMode, AccessResult};

use crate::aggregator::{Aggregate, Aggregator};

/// Runtime parameters a slice predicate routes on (tenant, region, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceContext {
    params: BTreeMap<String, String>,
}

impl SliceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

pub type SlicePredicate = Arc<dyn Fn(&AccessorDescriptor, &SliceContext) -> bool + Send + Sync>;

/// Route on each descriptor's declared sharding values: a descriptor with a
/// sharding attribute is selected when the context carries one of its
/// values for that attribute. Descriptors without an attribute always pass.
pub fn sharding_predicate() -> SlicePredicate {
    Arc::new(|descriptor: &AccessorDescriptor, ctx: &SliceContext| {
        match descriptor.sharding_attribute() {
            None => true,
            Some(attribute) => ctx
                .get(attribute)
                .is_some_and(|value| descriptor.sharding_values().iter().any(|v| v == value)),
        }
    })
}

/// Aggregation with manual, parameter-driven shard selection.
///
/// Without a predicate a slicer behaves exactly like its [`Aggregator`].
/// With one, the predicate picks the candidates first and the aggregator's
/// usual rules apply to whatever it selected.
#[derive(Clone, Default)]
pub struct Slicer {
    aggregator: Aggregator,
    predicate: Option<SlicePredicate>,
}

impl Slicer {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            predicate: None,
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AccessorDescriptor, &SliceContext) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_shared_predicate(mut self, predicate: SlicePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn slice(
        &self,
        candidates: &[AccessorDescriptor],
        requested: AccessMode,
        ctx: &SliceContext,
    ) -> AccessResult<Option<Aggregate>> {
        let Some(predicate) = &self.predicate else {
            return self.aggregator.aggregate(candidates, requested);
        };
        let selected: Vec<AccessorDescriptor> = candidates
            .iter()
            .filter(|&d| predicate(d, ctx))
            .cloned()
            .collect();
        debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            "slice predicate applied"
        );
        self.aggregator.aggregate(&selected, requested)
    }
}

impl fmt::Debug for Slicer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slicer")
            .field("has_predicate", &self.has_predicate())
            .finish()
    }
}
