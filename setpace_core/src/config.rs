//! Configuration file support for Setpace.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/setpace/config.toml`.

use crate::{BlockType, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fastest allowed clock poll (4 Hz)
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join("results.jsonl")
    }

    pub fn adjustments_path(&self) -> PathBuf {
        self.data_dir.join("adjustments.json")
    }

    pub fn sets_csv_path(&self) -> PathBuf {
        self.data_dir.join("sets.csv")
    }
}

/// Who is training
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

/// Execution engine parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Set value used when neither input nor configuration provides one
    #[serde(default = "default_fallback_set_value")]
    pub fallback_set_value: u32,

    /// Rest after a grouped round when the block sets none
    #[serde(default = "default_round_rest_seconds")]
    pub round_rest_seconds: u32,

    /// TIME countdown length when the block sets no cap
    #[serde(default = "default_time_cap_seconds")]
    pub time_cap_seconds: u32,

    #[serde(default)]
    pub reps_time_caps: RepsTimeCaps,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fallback_set_value: default_fallback_set_value(),
            round_rest_seconds: default_round_rest_seconds(),
            time_cap_seconds: default_time_cap_seconds(),
            reps_time_caps: RepsTimeCaps::default(),
        }
    }
}

impl EngineConfig {
    /// Poll interval, never faster than 4 Hz
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// REPS time ceilings by block type, in seconds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepsTimeCaps {
    #[serde(default = "default_warmup_cap")]
    pub warmup: u32,

    #[serde(default = "default_accessory_cap")]
    pub accessory: u32,

    #[serde(default = "default_conditioning_cap")]
    pub conditioning: u32,

    #[serde(default = "default_accessory_cap")]
    pub default: u32,
}

impl Default for RepsTimeCaps {
    fn default() -> Self {
        Self {
            warmup: default_warmup_cap(),
            accessory: default_accessory_cap(),
            conditioning: default_conditioning_cap(),
            default: default_accessory_cap(),
        }
    }
}

impl RepsTimeCaps {
    pub fn for_block_type(&self, block_type: &BlockType) -> u32 {
        match block_type {
            BlockType::Warmup => self.warmup,
            BlockType::Accessory => self.accessory,
            BlockType::Conditioning => self.conditioning,
            BlockType::Strength | BlockType::Other(_) => self.default,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("setpace")
}

fn default_user_id() -> String {
    "default".into()
}

fn default_poll_interval_ms() -> u64 {
    MIN_POLL_INTERVAL_MS
}

fn default_fallback_set_value() -> u32 {
    10
}

fn default_round_rest_seconds() -> u32 {
    60
}

fn default_time_cap_seconds() -> u32 {
    300
}

fn default_warmup_cap() -> u32 {
    300
}

fn default_accessory_cap() -> u32 {
    360
}

fn default_conditioning_cap() -> u32 {
    420
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("setpace").join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.user.id.trim().is_empty() {
            return Err(Error::Config("user.id must not be empty".into()));
        }
        if self.engine.time_cap_seconds == 0 {
            return Err(Error::Config("engine.time_cap_seconds must be positive".into()));
        }
        Ok(())
    }
}
