use std::path::PathBuf;
use std::time::Duration;

use perceiver_layout::LayoutOptions;
use perceiver_structural::TreeOptions;

/// Knobs for one [`crate::PerceptionPage`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Upper bound on every settle wait
    pub settle_timeout: Duration,

    /// Extra attempts after a failed model call
    pub model_retries: u32,

    pub cache: CacheSettings,

    pub layout: LayoutOptions,

    pub tree: TreeOptions,

    /// Observe over the accessibility tree unless a call says otherwise
    pub observe_with_accessibility_tree: bool,

    pub audit: AuditSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_millis(30_000),
            model_retries: 2,
            cache: CacheSettings::default(),
            layout: LayoutOptions::default(),
            tree: TreeOptions::default(),
            observe_with_accessibility_tree: false,
            audit: AuditSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Spawn the flush task when the page opens
    pub enabled: bool,

    /// JSON-lines file the flush task appends to
    pub path: PathBuf,

    /// Records kept in memory before the oldest are dropped
    pub capacity: usize,

    pub flush_interval: Duration,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("perception-audit.jsonl"),
            capacity: 256,
            flush_interval: Duration::from_millis(1000),
        }
    }
}
