//! Runtime Configuration
//!
//! Each thread's runtime reads its scheduling behavior from a
//! [`RuntimeConfig`]. Configs can be built in code or deserialized from any
//! serde format; every field has a default.

use serde::{Deserialize, Serialize};

use crate::reactive::Runtime;

/// When queued effects are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Writes outside a batch flush immediately; a batch flushes when its
    /// outermost level exits.
    #[default]
    Sync,

    /// Writes only enqueue effects. Callers run [`flush`](crate::flush).
    Manual,
}

/// Scheduler settings for the current thread's runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When queued effects run.
    pub flush_mode: FlushMode,

    /// Maximum number of effect runs in one flush before it is treated as a
    /// runaway update loop.
    pub max_flush_iterations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Sync,
            max_flush_iterations: 100_000,
        }
    }
}

impl RuntimeConfig {
    /// A config that never flushes on its own.
    pub fn manual() -> Self {
        Self {
            flush_mode: FlushMode::Manual,
            ..Self::default()
        }
    }
}

/// Installs `config` on the current thread's runtime.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(?config, "configuring reactive runtime");
    Runtime::with(|rt| *rt.config.borrow_mut() = config);
}

/// The current thread's runtime config.
pub fn config() -> RuntimeConfig {
    Runtime::with(|rt| rt.config.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sync() {
        let config = RuntimeConfig::default();
        assert_eq!(config.flush_mode, FlushMode::Sync);
        assert_eq!(config.max_flush_iterations, 100_000);
    }

    #[test]
    fn configure_is_per_thread() {
        configure(RuntimeConfig::manual());
        assert_eq!(config().flush_mode, FlushMode::Manual);

        let other = std::thread::spawn(|| config().flush_mode)
            .join()
            .unwrap();
        assert_eq!(other, FlushMode::Sync);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "flush_mode": "manual" }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Manual);
        assert_eq!(config.max_flush_iterations, 100_000);
    }
}
