use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings shared by every mailbox of one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Depth of each mailbox.
    pub capacity: usize,
    /// How long a submission waits for space in a full mailbox.
    #[serde(rename = "submit_timeout_ms", with = "duration_ms")]
    pub submit_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(capacity: usize, submit_timeout: Duration) -> Self {
        Self {
            capacity,
            submit_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAILBOX_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
