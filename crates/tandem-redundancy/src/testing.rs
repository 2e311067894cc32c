use std::sync::Arc;

use tandem_accessor::{AccessorDescriptor, InMemoryAccessor};
use tandem_types::Record;

pub(crate) fn order(id: i64, region: &str, amount: i64) -> Record {
    Record::new("order", id)
        .with_field("region", region)
        .with_field("amount", amount)
}

/// A seeded in-memory member and its descriptor.
pub(crate) fn store(
    name: &str,
    priority: f64,
    rows: Vec<Record>,
) -> (Arc<InMemoryAccessor>, AccessorDescriptor) {
    let accessor = Arc::new(InMemoryAccessor::new(name).seeded(rows));
    let descriptor = AccessorDescriptor::new(name, accessor.clone()).with_priority(priority);
    (accessor, descriptor)
}
