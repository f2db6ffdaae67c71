//! Process-wide configuration surface.
//!
//! A small struct loaded from a settings file, read once and passed
//! around, adapted to a library setting: the engine never reads global
//! state implicitly, so callers load an `EngineConfig` explicitly and
//! thread it through the operations that need it (worker counts, default
//! casting policy).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Casting policy applied when a value must be coerced to a raster's dtype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastingPolicy {
    No,
    Equiv,
    Safe,
    SameKind,
    Unsafe,
}

impl Default for CastingPolicy {
    fn default() -> Self {
        CastingPolicy::Safe
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on worker threads/processes spawned by parallel paths.
    /// 0 means "use all available CPUs".
    pub max_procs: usize,
    /// Whether phase-boundary logging should be emitted at `info` level
    /// (as opposed to only `debug`/`trace`).
    pub verbose_logging: bool,
    /// Default casting policy used when a caller does not specify one.
    pub default_casting: CastingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_procs: 0,
            verbose_logging: false,
            default_casting: CastingPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a `config.toml`-formatted file, falling
    /// back to defaults for any field left unset. `STREAMNET_MAX_PROCS`
    /// and `STREAMNET_VERBOSE_LOGGING` environment variables, if present,
    /// override the corresponding fields after the file is read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<EngineConfig> {
        let text = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&text)
            .map_err(|e| crate::error::Error::InternalInvariant(format!("invalid config.toml: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STREAMNET_MAX_PROCS") {
            if let Ok(n) = val.parse() {
                self.max_procs = n;
            }
        }
        if let Ok(val) = std::env::var("STREAMNET_VERBOSE_LOGGING") {
            self.verbose_logging = val == "1" || val.eq_ignore_ascii_case("true");
        }
    }

    /// Resolves the actual number of worker threads to use for a parallel
    /// operation, bounded by both this config and the machine's CPU count.
    /// `max_procs == 0` (the default) means CPU-count minus one, not every
    /// core.
    pub fn worker_count(&self) -> usize {
        let cpus = num_cpus::get();
        if self.max_procs == 0 {
            cpus.saturating_sub(1).max(1)
        } else {
            self.max_procs.min(cpus)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_safe_casting_and_cpus_minus_one() {
        let config = EngineConfig::default();
        assert_eq!(config.default_casting, CastingPolicy::Safe);
        assert_eq!(config.max_procs, 0);
        assert_eq!(config.worker_count(), num_cpus::get().saturating_sub(1).max(1));
    }

    #[test]
    fn worker_count_is_bounded_by_max_procs() {
        let config = EngineConfig {
            max_procs: 1,
            ..EngineConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn from_file_reads_toml_and_fills_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("streamnet_engine_test_config_{}.toml", std::process::id()));
        std::fs::write(&path, "max_procs = 2\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.max_procs, 2);
        assert_eq!(config.verbose_logging, false);
    }
}
