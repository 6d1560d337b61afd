//! Configuration for the replication pipeline.
//!
//! Defaults carry the pipeline's built-in constants; a TOML file can
//! override any section and CLI flags take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::retry::RetryPolicy;
use crate::viewport::Viewport;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub viewport: Viewport,
    pub timeouts: Timeouts,
    pub retry: RetryConfig,
    pub budget: BudgetConfig,
    pub workers: WorkerConfig,
    /// Run one visual-feedback refinement pass at the end of the initial
    /// clone.
    pub refine_on_clone: bool,
    /// Directory for downloaded assets (one subdirectory per session).
    pub asset_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Timeouts {
    /// Page navigation timeout for render/screenshot calls.
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    /// Whole-process timeout for the render helper.
    #[serde(with = "humantime_serde")]
    pub process: Duration,
    /// Request timeout for generative-provider calls.
    #[serde(with = "humantime_serde")]
    pub provider: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            process: Duration::from_secs(60),
            provider: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            jitter: policy.jitter,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.base_delay,
            max_delay: cfg.max_delay,
            jitter: cfg.jitter,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BudgetConfig {
    /// Model context window, in tokens.
    pub context_budget: usize,
    /// Tokens reserved for the model's response.
    pub response_reserve: usize,
    /// Cap on response tokens per generation call.
    pub max_output_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_budget: 200_000,
            response_reserve: 20_000,
            max_output_tokens: 8_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Simultaneous asset downloads.
    pub asset_pool: usize,
    /// Simultaneous render helper processes.
    pub render_pool: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            asset_pool: 4,
            render_pool: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeouts: Timeouts::default(),
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            workers: WorkerConfig::default(),
            refine_on_clone: true,
            asset_dir: std::env::temp_dir().join("siteclone-assets"),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or return defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CloneError::Config(format!("Failed to read config {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| CloneError::Config(format!("Invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.budget.response_reserve >= self.budget.context_budget {
            return Err(CloneError::Config(
                "budget.response-reserve must be smaller than budget.context-budget".into(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(CloneError::Config(
                "retry.base-delay must not exceed retry.max-delay".into(),
            ));
        }
        if self.workers.asset_pool == 0 || self.workers.render_pool == 0 {
            return Err(CloneError::Config("worker pools must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.viewport.width, 1920);
        assert_eq!(cfg.budget.context_budget, 200_000);
        assert_eq!(cfg.budget.response_reserve, 20_000);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.workers.asset_pool, 4);
        assert!(cfg.refine_on_clone);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_overrides_sections() {
        let raw = r#"
            refine-on-clone = false

            [budget]
            context-budget = 100000
            response-reserve = 10000

            [retry]
            max-retries = 5
            base-delay = "1s"
            max-delay = "10s"
            jitter = "100ms"

            [timeouts]
            navigation = "20s"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert!(!cfg.refine_on_clone);
        assert_eq!(cfg.budget.context_budget, 100_000);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(1));
        assert_eq!(cfg.timeouts.navigation, Duration::from_secs(20));
        // Untouched sections keep defaults.
        assert_eq!(cfg.workers.asset_pool, 4);
    }

    #[test]
    fn reserve_must_fit_inside_budget() {
        let mut cfg = Config::default();
        cfg.budget.response_reserve = cfg.budget.context_budget;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let mut cfg = Config::default();
        cfg.workers.asset_pool = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.budget.max_output_tokens, 8_000);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/definitely/missing.toml"))).unwrap_err();
        assert!(matches!(err, CloneError::Config(_)));
    }
}
