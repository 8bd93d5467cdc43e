// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Every tunable of the trends service lives here: store location, listener
// address, analysis windows, ranking, continuity threshold and the response
// cache. All fields carry a serde default so that an older or partial JSON
// file still loads.
//
// Persistence uses an atomic tmp + rename pattern.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analytics::{AnalysisParams, GapWindows, SmoothingParams};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_db_path() -> String {
    "subnet_data.db".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_short_window_minutes() -> f64 {
    5.0
}

fn default_long_window_minutes() -> f64 {
    60.0
}

fn default_total_ema_window_minutes() -> f64 {
    240.0
}

fn default_acceleration_timeframes() -> Vec<u32> {
    vec![5, 10, 15, 60, 240]
}

fn default_rolling_window_samples() -> usize {
    5
}

fn default_smoothing_window() -> usize {
    5
}

fn default_smoothing_polyorder() -> usize {
    2
}

fn default_top_k() -> usize {
    10
}

fn default_max_sample_gap_secs() -> f64 {
    65.0
}

fn default_cache_ttl_secs() -> u64 {
    10
}

fn default_cache_max_entries() -> usize {
    4096
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

fn default_report_interval_secs() -> u64 {
    60
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Service ------------------------------------------------------------

    /// SQLite database written by the snapshot poller.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // --- Analysis windows ---------------------------------------------------

    #[serde(default = "default_short_window_minutes")]
    pub short_window_minutes: f64,

    #[serde(default = "default_long_window_minutes")]
    pub long_window_minutes: f64,

    /// Window of the EMA over the aggregate price series.
    #[serde(default = "default_total_ema_window_minutes")]
    pub total_ema_window_minutes: f64,

    /// Nominal timeframes (minutes) reported by the acceleration engine.
    #[serde(default = "default_acceleration_timeframes")]
    pub acceleration_timeframes: Vec<u32>,

    #[serde(default = "default_rolling_window_samples")]
    pub rolling_window_samples: usize,

    /// Savitzky–Golay window; must be odd.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    #[serde(default = "default_smoothing_polyorder")]
    pub smoothing_polyorder: usize,

    // --- Ranking & diagnostics ----------------------------------------------

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Spacing above which consecutive samples are reported as a gap.
    #[serde(default = "default_max_sample_gap_secs")]
    pub max_sample_gap_secs: f64,

    /// Legacy: count the root subnet (netuid 0) in totals and ranking.
    #[serde(default)]
    pub include_root_entity: bool,

    // --- Response cache -----------------------------------------------------

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,

    // --- Operator report ----------------------------------------------------

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            short_window_minutes: default_short_window_minutes(),
            long_window_minutes: default_long_window_minutes(),
            total_ema_window_minutes: default_total_ema_window_minutes(),
            acceleration_timeframes: default_acceleration_timeframes(),
            rolling_window_samples: default_rolling_window_samples(),
            smoothing_window: default_smoothing_window(),
            smoothing_polyorder: default_smoothing_polyorder(),
            top_k: default_top_k(),
            max_sample_gap_secs: default_max_sample_gap_secs(),
            include_root_entity: false,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error; the caller falls back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            db_path = %config.db_path,
            top_k = config.top_k,
            include_root_entity = config.include_root_entity,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` via a `.tmp` sibling and rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `SUBNET_TRENDS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("SUBNET_TRENDS_DB_PATH") {
            if !db.trim().is_empty() {
                self.db_path = db.trim().to_string();
            }
        }
        if let Ok(addr) = std::env::var("SUBNET_TRENDS_BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr.trim().to_string();
            }
        }
    }

    /// Settings that load fine but silently disable part of the analysis.
    pub fn validation_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for (name, value) in [
            ("short_window_minutes", self.short_window_minutes),
            ("long_window_minutes", self.long_window_minutes),
            ("total_ema_window_minutes", self.total_ema_window_minutes),
        ] {
            if !value.is_finite() || value <= 0.0 {
                issues.push(format!("{name} must be positive, got {value}"));
            }
        }
        if self.short_window_minutes > self.long_window_minutes {
            issues.push(format!(
                "short_window_minutes ({}) exceeds long_window_minutes ({})",
                self.short_window_minutes, self.long_window_minutes
            ));
        }
        if self.smoothing_window % 2 == 0 {
            issues.push(format!(
                "smoothing_window must be odd, got {}; smoothing is disabled",
                self.smoothing_window
            ));
        }
        if self.smoothing_polyorder >= self.smoothing_window {
            issues.push(format!(
                "smoothing_polyorder ({}) must be below smoothing_window ({})",
                self.smoothing_polyorder, self.smoothing_window
            ));
        }
        if self.rolling_window_samples < 2 {
            issues.push(format!(
                "rolling_window_samples must be at least 2, got {}",
                self.rolling_window_samples
            ));
        }
        if self.acceleration_timeframes.contains(&0) {
            issues.push("acceleration_timeframes contains 0".to_string());
        }
        if self.top_k == 0 {
            issues.push("top_k is 0; no subnet will be ranked".to_string());
        }

        issues
    }

    /// Log a warning for every entry of [`Self::validation_issues`].
    pub fn warn_on_issues(&self) -> usize {
        let issues = self.validation_issues();
        for issue in &issues {
            warn!(issue = %issue, "suspicious runtime config value");
        }
        issues.len()
    }

    /// The analytics engine's view of this config.
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            windows: GapWindows {
                short_minutes: self.short_window_minutes,
                long_minutes: self.long_window_minutes,
            },
            total_ema_window_minutes: self.total_ema_window_minutes,
            acceleration_timeframes: self.acceleration_timeframes.clone(),
            smoothing: SmoothingParams {
                rolling_window: self.rolling_window_samples,
                smoothing_window: self.smoothing_window,
                polyorder: self.smoothing_polyorder,
            },
            top_k: self.top_k,
            max_sample_gap_secs: self.max_sample_gap_secs,
            include_root_entity: self.include_root_entity,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.db_path, "subnet_data.db");
        assert_eq!(cfg.acceleration_timeframes, vec![5, 10, 15, 60, 240]);
        assert_eq!(cfg.top_k, 10);
        assert_eq!(cfg.cache_ttl_secs, 10);
        assert_eq!(cfg.cache_max_entries, 4096);
        assert!(!cfg.include_root_entity);
        assert!((cfg.max_sample_gap_secs - 65.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "top_k": 3,
            "include_root_entity": true,
            "acceleration_timeframes": [15]
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.top_k, 3);
        assert!(cfg.include_root_entity);
        assert_eq!(cfg.acceleration_timeframes, vec![15]);
        assert_eq!(cfg.smoothing_window, 5);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn default_config_has_no_issues() {
        assert!(RuntimeConfig::default().validation_issues().is_empty());
        assert_eq!(RuntimeConfig::default().warn_on_issues(), 0);
    }

    #[test]
    fn disabling_values_are_reported() {
        let cfg = RuntimeConfig {
            smoothing_window: 4,
            short_window_minutes: 90.0,
            total_ema_window_minutes: 0.0,
            ..Default::default()
        };
        let issues = cfg.validation_issues();
        assert_eq!(issues.len(), 3, "{issues:?}");
        assert!(issues.iter().any(|i| i.contains("smoothing_window must be odd")));
        assert!(issues.iter().any(|i| i.contains("exceeds long_window_minutes")));
        assert!(issues.iter().any(|i| i.starts_with("total_ema_window_minutes")));
        assert_eq!(cfg.warn_on_issues(), 3);
    }

    #[test]
    fn non_positive_window_is_reported() {
        let cfg = RuntimeConfig {
            long_window_minutes: -5.0,
            short_window_minutes: -10.0,
            ..Default::default()
        };
        let issues = cfg.validation_issues();
        assert_eq!(issues.len(), 2, "{issues:?}");
    }

    #[test]
    fn analysis_params_match_engine_defaults() {
        assert_eq!(RuntimeConfig::default().analysis_params(), AnalysisParams::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subnet_trends.json");

        let cfg = RuntimeConfig {
            top_k: 4,
            short_window_minutes: 3.0,
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.analysis_params().windows.short_minutes, 3.0);
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuntimeConfig::load(dir.path().join("absent.json")).is_err());
    }
}
