use thiserror::Error;

/// Errors loading or validating a topology.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid topology file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize topology: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid topology: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
