use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_types::{AccessMode, RedundancyMode, ShardingDescriptor};

use crate::error::{ConfigError, ConfigResult};

/// Declarative description of an accessor topology.
///
/// ```toml
/// requested_mode = "read|write"
///
/// [[accessors]]
/// name = "orders-primary"
/// group = "orders"
/// mode = "read_write"
/// redundancy = "mirroring"
/// priority = 1.0
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Access mode requested when aggregating every group.
    pub requested_mode: AccessMode,
    /// Accessors in registration order.
    pub accessors: Vec<AccessorConfig>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            requested_mode: AccessMode::READ_WRITE,
            accessors: Vec::new(),
        }
    }
}

/// One registered accessor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessorConfig {
    pub name: String,
    /// Registry key; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default = "default_mode")]
    pub mode: AccessMode,
    #[serde(default)]
    pub redundancy: RedundancyMode,
    #[serde(default)]
    pub priority: f64,
    /// Start the simulated store offline (used by `tandem check`).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding: Option<ShardingConfig>,
}

/// Values this accessor serves for one sharding attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ShardingDescriptor>,
}

fn default_group() -> String {
    "default".into()
}

fn default_mode() -> AccessMode {
    AccessMode::READ_WRITE
}

impl AccessorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: None,
            group: default_group(),
            partition: String::new(),
            mode: default_mode(),
            redundancy: RedundancyMode::None,
            priority: 0.0,
            offline: false,
            sharding: None,
        }
    }

    pub fn service_type(&self) -> &str {
        self.service_type.as_deref().unwrap_or(&self.name)
    }

    /// Describe `accessor` with this entry's metadata.
    pub fn describe(&self, accessor: Arc<dyn Accessor>) -> AccessorDescriptor {
        let descriptor = AccessorDescriptor::new(self.service_type(), accessor)
            .with_name(&self.name)
            .with_group(&self.group)
            .with_partition(&self.partition)
            .with_access_mode(self.mode)
            .with_dispatch_mode(self.redundancy)
            .with_priority(self.priority);
        match &self.sharding {
            Some(sharding) => descriptor.with_sharding(
                &sharding.attribute,
                sharding.values.clone(),
                sharding.target.clone(),
            ),
            None => descriptor,
        }
    }
}

impl TopologyConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Names must be non-empty, and names and service types unique.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        let mut service_types = HashSet::new();
        for accessor in &self.accessors {
            if accessor.name.trim().is_empty() {
                return Err(ConfigError::Invalid("accessor with an empty name".into()));
            }
            if !names.insert(accessor.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "accessor {} declared twice",
                    accessor.name
                )));
            }
            if !service_types.insert(accessor.service_type()) {
                return Err(ConfigError::Invalid(format!(
                    "service type {} declared twice",
                    accessor.service_type()
                )));
            }
            if !accessor.priority.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "accessor {} has a non-finite priority",
                    accessor.name
                )));
            }
        }
        Ok(())
    }

    /// Pair every entry with the accessor `connect` opens for it.
    pub fn describe_all<F>(&self, mut connect: F) -> Vec<AccessorDescriptor>
    where
        F: FnMut(&AccessorConfig) -> Arc<dyn Accessor>,
    {
        self.accessors
            .iter()
            .map(|entry| entry.describe(connect(entry)))
            .collect()
    }
}
