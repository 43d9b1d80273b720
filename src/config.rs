//! Configuration file format and loading
//!
//! Every field has a default, so a partial (or missing) file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use perceiver_hub::{AuditSettings, CacheSettings, HubSettings};
use perceiver_layout::LayoutOptions;
use perceiver_structural::TreeOptions;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub logging: LoggingConfig,
    pub settle: SettleConfig,
    pub model: ModelConfig,
    pub cache: CacheConfig,
    pub layout: LayoutOptions,
    pub accessibility: TreeOptions,
    pub observe: ObserveConfig,
    pub audit: AuditConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub timeout_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Extra attempts after a failed or malformed model response
    pub retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { retries: 2 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveConfig {
    pub use_accessibility_tree: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/soulbrowser/perception-audit.jsonl`
    pub path: Option<PathBuf>,
    pub capacity: usize,
    pub flush_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            capacity: 256,
            flush_interval_ms: 1000,
        }
    }
}

impl AuditConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("soulbrowser");
        path.push("perception-audit.jsonl");
        path
    }
}

impl PerceptionConfig {
    /// Settings for [`perceiver_hub::PerceptionPage`]
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            settle_timeout: Duration::from_millis(self.settle.timeout_ms),
            model_retries: self.model.retries,
            cache: CacheSettings {
                enabled: self.cache.enabled,
                ttl: Duration::from_secs(self.cache.ttl_secs),
            },
            layout: self.layout.clone(),
            tree: self.accessibility.clone(),
            observe_with_accessibility_tree: self.observe.use_accessibility_tree,
            audit: AuditSettings {
                enabled: self.audit.enabled,
                path: self.audit.resolved_path(),
                capacity: self.audit.capacity,
                flush_interval: Duration::from_millis(self.audit.flush_interval_ms),
            },
        }
    }
}

pub struct LoadedConfig {
    pub config: PerceptionConfig,
    pub path: PathBuf,
}

/// Load the configuration file.
///
/// Priority: explicit path > ./config/perception.yaml > <config dir>/soulbrowser/perception.yaml.
/// A missing file yields defaults.
pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => {
            let local_config = PathBuf::from("config/perception.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("soulbrowser");
                path.push("perception.yaml");
                path
            }
        }
    };

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: PerceptionConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;

        info!("Loaded perception configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: config_path,
        })
    } else {
        warn!(
            "Perception config not found, using defaults: {}",
            config_path.display()
        );
        Ok(LoadedConfig {
            config: PerceptionConfig::default(),
            path: config_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_keep_defaults() {
        let config: PerceptionConfig = serde_yaml::from_str(
            "cache:\n  ttl_secs: 60\nlayout:\n  line_threshold: 12.0\n",
        )
        .unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.layout.line_threshold, 12.0);
        assert_eq!(config.layout.dedup_distance, 15.0);
        assert_eq!(config.model.retries, 2);
        assert!(config.accessibility.decorate_scrollables);
    }

    #[test]
    fn hub_settings_carry_every_section() {
        let mut config = PerceptionConfig::default();
        config.settle.timeout_ms = 500;
        config.observe.use_accessibility_tree = true;
        config.audit.path = Some(PathBuf::from("/tmp/audit.jsonl"));
        let settings = config.hub_settings();
        assert_eq!(settings.settle_timeout, Duration::from_millis(500));
        assert_eq!(settings.model_retries, 2);
        assert_eq!(settings.cache.ttl, Duration::from_secs(3600));
        assert!(settings.observe_with_accessibility_tree);
        assert_eq!(settings.audit.path, PathBuf::from("/tmp/audit.jsonl"));
        assert_eq!(settings.layout.border_width, 80);
    }
}
