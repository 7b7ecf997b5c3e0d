//! Engine configuration: streaming thresholds, generation and LOD settings.
//!
//! Configuration is plain serde data and is stored as JSON. Every section
//! falls back to its defaults for missing fields, so a config file only needs
//! to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::generation::GeneratorConfig;
use crate::spatial::SplitPolicy;
use crate::streaming::lod::LodConfig;

/// Default edge length of a grid cell in world units
pub const DEFAULT_GRID_SIZE: f32 = 1000.0;

/// Streaming thresholds and scheduling limits.
///
/// Distances are planar (XZ) distances from the observer to a cell center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Edge length of a grid cell
    pub grid_size: f32,
    /// Bottom of the column covered by a cell's bounding box
    pub column_bottom: f32,
    /// Top of the column covered by a cell's bounding box
    pub column_top: f32,
    /// Cells closer than this are loaded
    pub load_distance: f32,
    /// Loaded cells farther than this are evicted
    pub unload_distance: f32,
    /// Cells closer than this carry satellites and moons
    pub detail_distance: f32,
    /// Cells farther than this drop satellites and moons but stay loaded
    pub unload_detail_distance: f32,
    /// Minimum time between scheduling passes
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,
    /// Cells dispatched to the loader per scheduling pass
    pub batch_size: usize,
    /// Loader batches allowed in flight at once
    pub max_concurrent_batches: usize,
    /// Cell count at or below which the BVH uses the SAH split
    pub sah_threshold: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            column_bottom: -1000.0,
            column_top: 1000.0,
            load_distance: 10_000.0,
            unload_distance: 12_000.0,
            detail_distance: 3_000.0,
            unload_detail_distance: 4_000.0,
            tick_interval: Duration::from_millis(100),
            batch_size: 10,
            max_concurrent_batches: 4,
            sah_threshold: 256,
        }
    }
}

impl StreamConfig {
    /// Check the threshold ordering that keeps load/unload from oscillating.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err(Error::Config(format!(
                "grid_size must be positive and finite, got {}",
                self.grid_size
            )));
        }
        if self.column_bottom > self.column_top {
            return Err(Error::Config(format!(
                "column_bottom ({}) is above column_top ({})",
                self.column_bottom, self.column_top
            )));
        }
        let distances = [
            ("load_distance", self.load_distance),
            ("unload_distance", self.unload_distance),
            ("detail_distance", self.detail_distance),
            ("unload_detail_distance", self.unload_detail_distance),
        ];
        for (name, value) in distances {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::Config(format!(
                    "{name} must be non-negative and finite, got {value}"
                )));
            }
        }
        if self.unload_distance < self.load_distance {
            return Err(Error::Config(format!(
                "unload_distance ({}) must be >= load_distance ({})",
                self.unload_distance, self.load_distance
            )));
        }
        if self.detail_distance > self.load_distance {
            return Err(Error::Config(format!(
                "detail_distance ({}) must be <= load_distance ({})",
                self.detail_distance, self.load_distance
            )));
        }
        if self.unload_detail_distance < self.detail_distance
            || self.unload_detail_distance > self.unload_distance
        {
            return Err(Error::Config(format!(
                "unload_detail_distance ({}) must lie between detail_distance ({}) and unload_distance ({})",
                self.unload_detail_distance, self.detail_distance, self.unload_distance
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(Error::Config(
                "max_concurrent_batches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// BVH split policy derived from `sah_threshold`.
    pub fn split_policy(&self) -> SplitPolicy {
        SplitPolicy::Auto {
            sah_threshold: self.sah_threshold,
        }
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    pub generator: GeneratorConfig,
    pub lod: LodConfig,
}

impl EngineConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        self.generator.validate()?;
        // The LOD fine radius is the streaming detail distance
        if self.stream.detail_distance > self.lod.coarse_distance {
            return Err(Error::Config(format!(
                "stream.detail_distance ({}) must be <= lod.coarse_distance ({})",
                self.stream.detail_distance, self.lod.coarse_distance
            )));
        }
        Ok(())
    }
}

/// Serialize a `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.stream.unload_distance >= config.stream.load_distance);
        assert!(config.stream.detail_distance <= config.stream.load_distance);
    }

    #[test]
    fn test_unload_below_load_rejected() {
        let config = StreamConfig {
            load_distance: 500.0,
            unload_distance: 400.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_detail_beyond_load_rejected() {
        let config = StreamConfig {
            load_distance: 500.0,
            unload_distance: 600.0,
            detail_distance: 550.0,
            unload_detail_distance: 580.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_coarse_inside_detail_rejected() {
        let mut config = EngineConfig::default();
        config.lod.coarse_distance = config.stream.detail_distance - 1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        // A stale lod.detail_distance key is ignored; only the stream value counts
        let config = EngineConfig::from_json_str(
            r#"{ "stream": { "detail_distance": 1000.0, "unload_detail_distance": 1500.0 },
                 "lod": { "detail_distance": 9000.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.stream.detail_distance, 1000.0);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = StreamConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "stream": { "batch_size": 3, "tick_interval": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.stream.batch_size, 3);
        assert_eq!(config.stream.tick_interval, Duration::from_millis(250));
        assert_eq!(config.stream.grid_size, DEFAULT_GRID_SIZE);
    }

    #[test]
    fn test_invalid_json_config_rejected() {
        let result = EngineConfig::from_json_str(
            r#"{ "stream": { "load_distance": 100.0, "unload_distance": 50.0 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orrery.json");

        let mut config = EngineConfig::default();
        config.stream.batch_size = 7;
        config.generator.seed = 99;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.stream, config.stream);
        assert_eq!(loaded.generator.seed, 99);
    }
}
