//! Runtime Configuration
//!
//! The engine has very few knobs. The flush iteration cap is the important
//! one: it bounds how many times the scheduler re-drains its queue in a
//! single flush before declaring a runaway loop.
//!
//! Configuration can be built in code, parsed from JSON, or read from the
//! environment:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::default().with_max_flush_iterations(50);
//! let config = RuntimeConfig::from_json(r#"{ "max_flush_iterations": 50 }"#)?;
//! let config = RuntimeConfig::from_env()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default cap on scheduler flush passes.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 100;

/// Default number of proxy cache entries before dead ones are swept.
pub const DEFAULT_PROXY_CACHE_PRUNE_THRESHOLD: usize = 256;

const ENV_MAX_FLUSH_ITERATIONS: &str = "RIPPLE_MAX_FLUSH_ITERATIONS";
const ENV_PROXY_CACHE_PRUNE_THRESHOLD: &str = "RIPPLE_PROXY_CACHE_PRUNE_THRESHOLD";

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of passes a single flush may make over the effect
    /// queue. Exceeding it aborts the flush with
    /// [`ReactiveError::InfiniteLoop`].
    pub max_flush_iterations: usize,

    /// Size of the reactive proxy identity cache at which entries whose
    /// proxies have been dropped are swept out.
    pub proxy_cache_prune_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
            proxy_cache_prune_threshold: DEFAULT_PROXY_CACHE_PRUNE_THRESHOLD,
        }
    }
}

impl RuntimeConfig {
    /// Set the flush iteration cap.
    pub fn with_max_flush_iterations(mut self, iterations: usize) -> Self {
        self.max_flush_iterations = iterations;
        self
    }

    /// Set the proxy cache sweep threshold.
    pub fn with_proxy_cache_prune_threshold(mut self, threshold: usize) -> Self {
        self.proxy_cache_prune_threshold = threshold;
        self
    }

    /// Parse a configuration from a JSON document. Missing fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `RIPPLE_*` environment variables, falling
    /// back to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = read_env_usize(ENV_MAX_FLUSH_ITERATIONS)? {
            config.max_flush_iterations = value;
        }
        if let Some(value) = read_env_usize(ENV_PROXY_CACHE_PRUNE_THRESHOLD)? {
            config.proxy_cache_prune_threshold = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_flush_iterations == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_flush_iterations must be at least 1".to_string(),
            ));
        }
        if self.proxy_cache_prune_threshold == 0 {
            return Err(ReactiveError::InvalidConfig(
                "proxy_cache_prune_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ReactiveError::InvalidConfig(format!("{key}={raw:?} is not a count"))),
        Err(_) => Ok(None),
    }
}
