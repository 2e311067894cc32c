use std::sync::RwLock;

use tracing::debug;

use tandem_accessor::AccessorDescriptor;
use tandem_types::{AccessError, AccessResult};

/// Supplies the ordered accessor registrations. Connections are created by
/// the resolver, never by the dispatch layer.
pub trait Resolver: Send + Sync {
    /// Every registered descriptor, in registration order.
    fn resolve(&self) -> Vec<AccessorDescriptor>;

    /// Registered descriptors of one group, in registration order.
    fn resolve_group(&self, group: &str) -> Vec<AccessorDescriptor> {
        self.resolve()
            .into_iter()
            .filter(|d| d.group() == group)
            .collect()
    }
}

/// Registry populated up front, for tests, embedding and the CLI.
#[derive(Default)]
pub struct StaticResolver {
    descriptors: RwLock<Vec<AccessorDescriptor>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor`. Service types must be unique.
    pub fn register(&self, descriptor: AccessorDescriptor) -> AccessResult<()> {
        let mut descriptors = self.descriptors.write().expect("lock poisoned");
        if descriptors.contains(&descriptor) {
            return Err(AccessError::Configuration(format!(
                "service type {} registered twice",
                descriptor.service_type()
            )));
        }
        debug!(
            service_type = descriptor.service_type(),
            group = descriptor.group(),
            "accessor registered"
        );
        descriptors.push(descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self) -> Vec<AccessorDescriptor> {
        self.descriptors.read().expect("lock poisoned").clone()
    }
}
