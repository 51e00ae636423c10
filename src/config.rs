//! Pool configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then `SLABPOOL_*` environment variables.

use crate::error::{Error, Result};
use crate::pool::MIN_ARENA_MB;
use serde::{Deserialize, Serialize};
use std::path::Path;

const MIB: usize = 1024 * 1024;

/// Configuration for a [`SlabPool`](crate::SlabPool)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Arena size in MB when preallocating (floored at 15); page budget
    /// otherwise, 0 meaning unbounded
    pub memory_limit_mb: u32,
    /// Multiplier between consecutive size classes
    pub growth_factor: f64,
    /// Reserve one contiguous arena up front
    pub preallocate: bool,
    /// Carve one page per size class during initialization
    pub prealloc_pages: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 64,
            growth_factor: 1.2,
            preallocate: true,
            prealloc_pages: true,
        }
    }
}

impl PoolConfig {
    /// Default configuration with the given memory limit
    pub fn new(memory_limit_mb: u32) -> Self {
        Self {
            memory_limit_mb,
            ..Self::default()
        }
    }

    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    pub fn with_preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    pub fn with_prealloc_pages(mut self, prealloc_pages: bool) -> Self {
        self.prealloc_pages = prealloc_pages;
        self
    }

    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = ::config::Config::builder()
            .set_default("memory_limit_mb", i64::from(defaults.memory_limit_mb))?
            .set_default("growth_factor", defaults.growth_factor)?
            .set_default("preallocate", defaults.preallocate)?
            .set_default("prealloc_pages", defaults.prealloc_pages)?;

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix("SLABPOOL").try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings describe a usable pool
    pub fn validate(&self) -> Result<()> {
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "growth_factor must be greater than 1.0, got {}",
                self.growth_factor
            )));
        }
        Ok(())
    }

    /// Memory limit after applying the arena floor
    pub fn effective_limit_mb(&self) -> u32 {
        if self.preallocate {
            self.memory_limit_mb.max(MIN_ARENA_MB)
        } else {
            self.memory_limit_mb
        }
    }

    /// Arena size in bytes, when preallocation is enabled
    pub fn arena_bytes(&self) -> Option<usize> {
        self.preallocate
            .then(|| (self.effective_limit_mb() as usize).saturating_mul(MIB))
    }

    /// Byte budget for heap-backed pages; `None` means unbounded
    pub fn heap_budget(&self) -> Option<usize> {
        let limit = self.effective_limit_mb();
        (limit > 0).then(|| (limit as usize).saturating_mul(MIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.memory_limit_mb, 64);
        assert_eq!(config.growth_factor, 1.2);
        assert!(config.preallocate);
        assert!(config.prealloc_pages);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_arena_floor() {
        let config = PoolConfig::new(4);
        assert_eq!(config.effective_limit_mb(), MIN_ARENA_MB);
        assert_eq!(config.arena_bytes(), Some(15 * MIB));

        let config = PoolConfig::new(4).with_preallocate(false);
        assert_eq!(config.arena_bytes(), None);
        assert_eq!(config.heap_budget(), Some(4 * MIB));

        let config = PoolConfig::new(0).with_preallocate(false);
        assert_eq!(config.heap_budget(), None);
    }

    #[test]
    fn test_validate_growth_factor() {
        assert!(PoolConfig::default().with_growth_factor(1.0).validate().is_err());
        assert!(PoolConfig::default().with_growth_factor(0.5).validate().is_err());
        assert!(PoolConfig::default().with_growth_factor(f64::NAN).validate().is_err());
        assert!(PoolConfig::default().with_growth_factor(1.05).validate().is_ok());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("slabpool_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pool.toml");
        std::fs::write(&path, "memory_limit_mb = 32\ngrowth_factor = 1.5\nprealloc_pages = false\n")
            .unwrap();

        let config = PoolConfig::load(Some(&path))?;
        assert_eq!(config.memory_limit_mb, 32);
        assert_eq!(config.growth_factor, 1.5);
        assert!(config.preallocate);
        assert!(!config.prealloc_pages);

        // Cleanup
        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }

    #[test]
    fn test_load_rejects_bad_factor() {
        let dir = std::env::temp_dir().join(format!("slabpool_config_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pool.toml");
        std::fs::write(&path, "growth_factor = 0.9\n").unwrap();

        let err = PoolConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        // Cleanup
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("slabpool_definitely_missing.toml");
        assert!(matches!(PoolConfig::load(Some(&path)), Err(Error::Config(_))));
    }
}
