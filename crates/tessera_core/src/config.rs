//! # World Configuration
//!
//! Sizing knobs for a [`World`](crate::World), loaded once at startup from
//! TOML. Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! chunk_bytes = 16384
//! entity_capacity = 100000
//! archetype_capacity = 64
//! worker_threads = 0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Default chunk budget in bytes.
///
/// 16 KiB keeps a chunk's hot columns within L1/L2 while spreading the fixed
/// per-chunk bookkeeping over hundreds of rows for typical component sizes.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Smallest accepted chunk budget.
pub const MIN_CHUNK_BYTES: usize = 64;

/// Sizing configuration of a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Byte budget of one archetype chunk. Chunk row capacity is
    /// `chunk_bytes / row_stride` (at least one row).
    pub chunk_bytes: usize,
    /// Initial slot count of the entity index.
    pub entity_capacity: usize,
    /// Initial slot count of the signature-to-archetype map.
    pub archetype_capacity: usize,
    /// Worker threads for parallel queries (0 = available parallelism).
    pub worker_threads: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            entity_capacity: 1024,
            archetype_capacity: 64,
            worker_threads: 0,
        }
    }
}

impl WorldConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConfigParse`] for malformed TOML or unknown keys and
    /// [`EcsError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConfigIo`] if the file cannot be read, otherwise as
    /// [`WorldConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), ?config, "loaded world config");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if `chunk_bytes < MIN_CHUNK_BYTES`.
    pub fn validate(&self) -> EcsResult<()> {
        if self.chunk_bytes < MIN_CHUNK_BYTES {
            return Err(EcsError::InvalidConfig(format!(
                "chunk_bytes must be at least {MIN_CHUNK_BYTES}, got {}",
                self.chunk_bytes
            )));
        }
        Ok(())
    }

    /// Worker count for parallel iteration, resolving 0 to the machine's
    /// available parallelism.
    #[must_use]
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}
