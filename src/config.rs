//! Service configuration
//!
//! Loaded from TOML. Every key is optional:
//!
//! ```toml
//! store_path = "/var/lib/smbios/smbios2"
//! debounce_ms = 2000
//! inventory_path = "/xyz/openbmc_project/inventory/system"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use validator::{Validate, ValidationError};

pub const DEFAULT_STORE_PATH: &str = "/var/lib/smbios/smbios2";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const DEFAULT_INVENTORY_PATH: &str = "/xyz/openbmc_project/inventory/system";

const MAX_DEBOUNCE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MdrConfig {
    /// File the host agent writes table images to
    pub store_path: PathBuf,

    /// Quiet period between the last reload and the decode pass
    #[serde(rename = "debounce_ms", with = "serde_duration")]
    #[validate(custom(function = "validate_debounce"))]
    pub debounce: Duration,

    /// Inventory root reported alongside the summary
    #[validate(length(min = 1))]
    pub inventory_path: String,
}

impl Default for MdrConfig {
    fn default() -> Self {
        MdrConfig {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            debounce: DEFAULT_DEBOUNCE,
            inventory_path: DEFAULT_INVENTORY_PATH.to_string(),
        }
    }
}

impl MdrConfig {
    /// Read and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let content = read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: MdrConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn validate_debounce(debounce: &Duration) -> Result<(), ValidationError> {
    if debounce.is_zero() || *debounce > MAX_DEBOUNCE {
        return Err(ValidationError::new("debounce_range"));
    }
    Ok(())
}

mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
