use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tandem_types::{AccessMode, RedundancyMode, ShardingDescriptor};

use crate::traits::Accessor;

/// Registration record pairing one accessor with its routing metadata.
///
/// Built once when the resolver registers an accessor, then shared. Equality
/// and hashing consider only `service_type`.
#[derive(Clone)]
pub struct AccessorDescriptor {
    accessor: Arc<dyn Accessor>,
    service_type: String,
    name: String,
    group: String,
    partition: String,
    access_mode: AccessMode,
    dispatch_mode: RedundancyMode,
    priority: f64,
    sharding_attribute: Option<String>,
    sharding_values: Vec<String>,
    sharding: Option<ShardingDescriptor>,
    loader_host: Option<String>,
}

impl AccessorDescriptor {
    /// Describe `accessor` under `service_type` with default metadata:
    /// group `"default"`, empty partition, `READ_WRITE`, priority `0.0`.
    pub fn new(service_type: impl Into<String>, accessor: Arc<dyn Accessor>) -> Self {
        let name = accessor.name().to_string();
        Self {
            accessor,
            service_type: service_type.into(),
            name,
            group: "default".into(),
            partition: String::new(),
            access_mode: AccessMode::READ_WRITE,
            dispatch_mode: RedundancyMode::None,
            priority: 0.0,
            sharding_attribute: None,
            sharding_values: Vec::new(),
            sharding: None,
            loader_host: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    pub fn with_dispatch_mode(mut self, mode: RedundancyMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Lower values take precedence.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_sharding(
        mut self,
        attribute: impl Into<String>,
        values: Vec<String>,
        target: Option<ShardingDescriptor>,
    ) -> Self {
        self.sharding_attribute = Some(attribute.into());
        self.sharding_values = values;
        self.sharding = target;
        self
    }

    pub fn with_loader_host(mut self, host: impl Into<String>) -> Self {
        self.loader_host = Some(host.into());
        self
    }

    /// The described accessor.
    pub fn accessor(&self) -> &Arc<dyn Accessor> {
        &self.accessor
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Redundancy mode declared for this accessor's group.
    pub fn dispatch_mode(&self) -> RedundancyMode {
        self.dispatch_mode
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn sharding_attribute(&self) -> Option<&str> {
        self.sharding_attribute.as_deref()
    }

    pub fn sharding_values(&self) -> &[String] {
        &self.sharding_values
    }

    pub fn sharding(&self) -> Option<&ShardingDescriptor> {
        self.sharding.as_ref()
    }

    pub fn loader_host(&self) -> Option<&str> {
        self.loader_host.as_deref()
    }
}

impl PartialEq for AccessorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.service_type == other.service_type
    }
}

impl Eq for AccessorDescriptor {}

impl Hash for AccessorDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_type.hash(state);
    }
}

impl fmt::Debug for AccessorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorDescriptor")
            .field("service_type", &self.service_type)
            .field("name", &self.name)
            .field("group", &self.group)
            .field("partition", &self.partition)
            .field("access_mode", &self.access_mode)
            .field("dispatch_mode", &self.dispatch_mode)
            .field("priority", &self.priority)
            .finish()
    }
}
