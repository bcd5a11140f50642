use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use backscroll_client::RetryPolicy;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const CONFIG_DIRECTORY_NAME: &str = "backscroll";
pub const CONFIG_FILE_NAME: &str = "engine.json";

/// Pointer class the host runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerClass {
    Mouse,
    Touch,
}

/// Rough link quality class, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    Fast,
    Slow,
}

/// Rough memory budget class, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryClass {
    Normal,
    Constrained,
}

/// Device capability snapshot computed once at startup.
///
/// The engine never re-queries ambient device state; every device-dependent
/// decision flows through `tune` before the engine is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub pointer: PointerClass,
    pub connection: ConnectionClass,
    pub memory: MemoryClass,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::desktop()
    }
}

impl DeviceProfile {
    pub const fn desktop() -> Self {
        Self {
            pointer: PointerClass::Mouse,
            connection: ConnectionClass::Fast,
            memory: MemoryClass::Normal,
        }
    }

    /// Applies device-class adjustments to a base configuration.
    pub fn tune(&self, mut config: EngineConfig) -> EngineConfig {
        if self.pointer == PointerClass::Touch {
            // Touch scrolling keeps emitting momentum signals well after the
            // finger lifts; a longer quiet period avoids misreading them.
            config.quiet_period_ms = config.quiet_period_ms.max(500);
        }

        if self.connection == ConnectionClass::Slow {
            config.batch_size = config.batch_size.min(15);
            config.retry_base_delay_ms = config.retry_base_delay_ms.max(800);
        }

        if self.memory == MemoryClass::Constrained {
            config.max_cache_size = config.max_cache_size.min(200);
            config.eviction_buffer = config.eviction_buffer.min(20);
            config.edge_threshold = config.edge_threshold.min(160.0);
        }

        config.normalized()
    }
}

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_cap_delay_ms")]
    pub retry_cap_delay_ms: u64,
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_trigger_throttle_ms")]
    pub trigger_throttle_ms: u64,
    #[serde(default = "default_eviction_buffer")]
    pub eviction_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            edge_threshold: default_edge_threshold(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_cap_delay_ms: default_retry_cap_delay_ms(),
            max_cache_size: default_max_cache_size(),
            quiet_period_ms: default_quiet_period_ms(),
            trigger_throttle_ms: default_trigger_throttle_ms(),
            eviction_buffer: default_eviction_buffer(),
        }
    }
}

impl EngineConfig {
    /// Clamps loaded values into workable ranges.
    ///
    /// The cache must hold at least one full batch or every load would evict
    /// the page it just fetched.
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(1, 200);
        self.edge_threshold = self.edge_threshold.clamp(0.0, 4_000.0);
        self.max_retries = self.max_retries.min(10);
        self.retry_base_delay_ms = self.retry_base_delay_ms.max(1);
        self.retry_cap_delay_ms = self.retry_cap_delay_ms.max(self.retry_base_delay_ms);
        self.max_cache_size = self.max_cache_size.max(self.batch_size as usize);
        self.quiet_period_ms = self.quiet_period_ms.max(50);
        self.trigger_throttle_ms = self.trigger_throttle_ms.min(10_000);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_cap_delay_ms),
        )
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn trigger_throttle(&self) -> Duration {
        Duration::from_millis(self.trigger_throttle_ms)
    }
}

fn default_batch_size() -> u32 {
    30
}

fn default_edge_threshold() -> f32 {
    240.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_cap_delay_ms() -> u64 {
    8_000
}

fn default_max_cache_size() -> usize {
    400
}

fn default_quiet_period_ms() -> u64 {
    300
}

fn default_trigger_throttle_ms() -> u64 {
    250
}

fn default_eviction_buffer() -> usize {
    40
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to create config directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize engine config on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write config file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace config file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Disk-backed engine configuration with hot snapshots.
pub struct ConfigStore {
    config: Arc<ArcSwap<EngineConfig>>,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".backscroll"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let config = Self::load_from_disk(&config_path);
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    pub fn update(&self, config: EngineConfig) -> Result<(), ConfigError> {
        let normalized = config.normalized();
        self.persist(&normalized)?;
        self.config.store(Arc::new(normalized));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> EngineConfig {
        if !path.exists() {
            tracing::info!("engine config not found at {:?}, using defaults", path);
            return EngineConfig::default();
        }

        let figment =
            Figment::from(Serialized::defaults(EngineConfig::default())).merge(Json::file(path));

        match figment.extract::<EngineConfig>() {
            Ok(config) => config.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse engine config from {:?}: {}. using defaults",
                    path,
                    error
                );
                EngineConfig::default()
            }
        }
    }

    fn persist(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-config-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(config).context(SerializeConfigSnafu {
            stage: "serialize-engine-config",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-config-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-config-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved engine config to {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.quiet_period_ms, 300);
    }

    #[test]
    fn normalization_clamps_degenerate_values() {
        let config = EngineConfig {
            batch_size: 0,
            max_cache_size: 0,
            retry_base_delay_ms: 0,
            retry_cap_delay_ms: 0,
            quiet_period_ms: 0,
            ..EngineConfig::default()
        }
        .normalized();

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_cache_size, 1);
        assert!(config.retry_cap_delay_ms >= config.retry_base_delay_ms);
        assert_eq!(config.quiet_period_ms, 50);
    }

    #[test]
    fn cache_always_fits_one_batch() {
        let config = EngineConfig {
            batch_size: 50,
            max_cache_size: 10,
            ..EngineConfig::default()
        }
        .normalized();

        assert_eq!(config.max_cache_size, 50);
    }

    #[test]
    fn constrained_profiles_never_grow_budgets() {
        let base = EngineConfig::default();
        let profile = DeviceProfile {
            pointer: PointerClass::Touch,
            connection: ConnectionClass::Slow,
            memory: MemoryClass::Constrained,
        };
        let tuned = profile.tune(base.clone());

        assert!(tuned.batch_size <= base.batch_size);
        assert!(tuned.max_cache_size <= base.max_cache_size);
        assert!(tuned.edge_threshold <= base.edge_threshold);
        assert!(tuned.quiet_period_ms >= base.quiet_period_ms);
    }

    #[test]
    fn desktop_profile_is_the_identity() {
        let base = EngineConfig::default();
        assert_eq!(DeviceProfile::desktop().tune(base.clone()), base);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("backscroll-missing-config/engine.json");
        let store = ConfigStore::new(path);
        assert_eq!(*store.config(), EngineConfig::default());
    }

    #[test]
    fn retry_policy_mirrors_the_config() {
        let config = EngineConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.cap_delay, Duration::from_millis(8_000));
    }
}
