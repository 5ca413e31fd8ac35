//! Per-topic configuration.
//!
//! A [`TopicConfig`] is shared by every partition of a topic. It can be built
//! in code with the `with_*` setters or loaded from TOML:
//!
//! ```ignore
//! use folio_core::TopicConfig;
//!
//! let config = TopicConfig::from_toml(r#"
//!     name = "orders"
//!     page_capacity = 2
//!     capacity_unit = "elements"
//! "#)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::limits::Limits;

/// Unit in which page capacity is accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityUnit {
    /// Capacity counts elements.
    Elements,
    /// Capacity counts serialized payload bytes.
    #[default]
    Bytes,
}

/// Configuration of a paged topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Topic name.
    pub name: String,
    /// Capacity of one page, in `capacity_unit`.
    pub page_capacity: u32,
    /// Unit used for `page_capacity`.
    pub capacity_unit: CapacityUnit,
    /// Maximum stored element bytes per partition, 0 for unlimited.
    pub server_capacity: u64,
    /// Keep pages after every subscriber has consumed them.
    pub retain_consumed: bool,
    /// Maximum size of a single element payload.
    pub max_element_bytes: u32,
    /// Maximum payload bytes returned by one poll.
    pub max_poll_bytes: u64,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: "topic".to_string(),
            page_capacity: 1024 * 1024, // 1MB pages
            capacity_unit: CapacityUnit::Bytes,
            server_capacity: 0,
            retain_consumed: false,
            max_element_bytes: 1024 * 1024,
            max_poll_bytes: 8 * 1024 * 1024,
        }
    }
}

impl TopicConfig {
    /// Creates a configuration with defaults for the named topic.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the page capacity and its unit.
    #[must_use]
    pub const fn with_page_capacity(mut self, capacity: u32, unit: CapacityUnit) -> Self {
        self.page_capacity = capacity;
        self.capacity_unit = unit;
        self
    }

    /// Sets the per-partition storage capacity in bytes (0 = unlimited).
    #[must_use]
    pub const fn with_server_capacity(mut self, bytes: u64) -> Self {
        self.server_capacity = bytes;
        self
    }

    /// Sets whether consumed pages are retained.
    #[must_use]
    pub const fn with_retain_consumed(mut self, retain: bool) -> Self {
        self.retain_consumed = retain;
        self
    }

    /// Sets the maximum element size.
    #[must_use]
    pub const fn with_max_element_bytes(mut self, bytes: u32) -> Self {
        self.max_element_bytes = bytes;
        self
    }

    /// Sets the poll byte limit.
    #[must_use]
    pub const fn with_max_poll_bytes(mut self, bytes: u64) -> Self {
        self.max_poll_bytes = bytes;
        self
    }

    /// Returns the size of an element in the configured capacity unit.
    #[must_use]
    pub const fn units_of(&self, element_len: usize) -> u64 {
        match self.capacity_unit {
            CapacityUnit::Elements => 1,
            CapacityUnit::Bytes => element_len as u64,
        }
    }

    /// Validates the configuration against system limits.
    ///
    /// # Errors
    /// Returns an error if a value is zero or exceeds `limits`.
    pub fn validate(&self, limits: &Limits) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::InvalidArgument {
                name: "name",
                reason: "must not be empty",
            });
        }

        if self.page_capacity == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "page_capacity",
                reason: "must be positive",
            });
        }

        if self.page_capacity > limits.max_page_capacity {
            return Err(crate::Error::LimitExceeded {
                limit: "page_capacity",
                max: u64::from(limits.max_page_capacity),
                actual: u64::from(self.page_capacity),
            });
        }

        if self.max_element_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_element_bytes",
                reason: "must be positive",
            });
        }

        if self.max_element_bytes > limits.max_element_bytes {
            return Err(crate::Error::LimitExceeded {
                limit: "max_element_bytes",
                max: u64::from(limits.max_element_bytes),
                actual: u64::from(self.max_element_bytes),
            });
        }

        if self.max_poll_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_poll_bytes",
                reason: "must be positive",
            });
        }

        Ok(())
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses a configuration from a TOML string and validates it against
    /// the default limits.
    ///
    /// # Errors
    /// Returns an error if the TOML cannot be parsed or the configuration
    /// is invalid.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate(&Limits::new())?;
        Ok(config)
    }

    /// Serializes the configuration to a TOML string.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be serialized.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read topic config from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Parse error in TOML.
    #[error("failed to parse topic config: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
    /// The configuration could not be written as TOML.
    #[error("failed to serialize topic config: {message}")]
    Serialize {
        /// Error message.
        message: String,
    },
    /// The configuration parsed but violates a constraint.
    #[error("invalid topic config: {0}")]
    Invalid(#[from] crate::Error),
}
