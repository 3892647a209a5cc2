//! Configuration management for dimc-probe.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`DIMC_CORES`, `DIMC_VLEN`, etc.)
//! 2. Project-local config file (`./dimc-probe.toml`)
//! 3. User config file (`~/.config/dimc-probe/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # dimc-probe.toml
//!
//! # Cores in the simulated cluster
//! cores = 8
//!
//! # Vector register width in bits
//! vlen = 512
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::harness::HarnessConfig;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// dimc-probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Cores in the cluster.
    pub cores: Option<u8>,

    /// Vector register width in bits.
    /// Must be a power of two.
    pub vlen: Option<usize>,

    /// Scratchpad size in bytes.
    pub scratchpad_bytes: Option<usize>,

    /// Byte written into fresh scratchpad memory.
    pub scratchpad_fill: Option<u8>,

    /// DMA bandwidth in bytes per cycle.
    pub dma_bytes_per_cycle: Option<usize>,

    /// Cycle limit per case.
    pub max_cycles: Option<u64>,

    /// Cycles each DIMC op stays in flight in the loopback port.
    pub accel_latency: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `dimc-probe.toml`
    /// 3. User config `~/.config/dimc-probe/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Cluster core count, defaulting to 8.
    pub fn cores(&self) -> u8 {
        self.cores.unwrap_or(HarnessConfig::default().cores)
    }

    /// VLEN in bits, defaulting to 512.
    pub fn vlen(&self) -> usize {
        self.vlen.unwrap_or(HarnessConfig::default().vlen)
    }

    /// Scratchpad size, defaulting to 128 KiB.
    pub fn scratchpad_bytes(&self) -> usize {
        self.scratchpad_bytes
            .unwrap_or(HarnessConfig::default().scratchpad_bytes)
    }

    /// Scratchpad poison byte, defaulting to 0xA5.
    pub fn scratchpad_fill(&self) -> u8 {
        self.scratchpad_fill
            .unwrap_or(HarnessConfig::default().scratchpad_fill)
    }

    /// DMA bandwidth, defaulting to 64 bytes per cycle.
    pub fn dma_bytes_per_cycle(&self) -> usize {
        self.dma_bytes_per_cycle
            .unwrap_or(HarnessConfig::default().dma_bytes_per_cycle)
    }

    /// Cycle limit, defaulting to 100000.
    pub fn max_cycles(&self) -> u64 {
        self.max_cycles.unwrap_or(HarnessConfig::default().max_cycles)
    }

    /// Accelerator latency, defaulting to 0.
    pub fn accel_latency(&self) -> u64 {
        self.accel_latency
            .unwrap_or(HarnessConfig::default().accel_latency)
    }

    /// Resolve into the engine's settings.
    pub fn harness(&self) -> HarnessConfig {
        HarnessConfig {
            cores: self.cores(),
            vlen: self.vlen(),
            scratchpad_bytes: self.scratchpad_bytes(),
            scratchpad_fill: self.scratchpad_fill(),
            dma_bytes_per_cycle: self.dma_bytes_per_cycle(),
            max_cycles: self.max_cycles(),
            accel_latency: self.accel_latency(),
        }
    }

    /// Load user configuration from ~/.config/dimc-probe/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./dimc-probe.toml
    fn load_local_config() -> Option<Self> {
        // Try current directory
        let local_path = Path::new("dimc-probe.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try the crate root when run through cargo
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("dimc-probe.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    pub fn merge(&mut self, other: Self) {
        if other.cores.is_some() {
            self.cores = other.cores;
        }
        if other.vlen.is_some() {
            self.vlen = other.vlen;
        }
        if other.scratchpad_bytes.is_some() {
            self.scratchpad_bytes = other.scratchpad_bytes;
        }
        if other.scratchpad_fill.is_some() {
            self.scratchpad_fill = other.scratchpad_fill;
        }
        if other.dma_bytes_per_cycle.is_some() {
            self.dma_bytes_per_cycle = other.dma_bytes_per_cycle;
        }
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
        if other.accel_latency.is_some() {
            self.accel_latency = other.accel_latency;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a `DIMC_*` variable lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_from(&lookup, "DIMC_CORES", &mut self.cores);
        override_from(&lookup, "DIMC_VLEN", &mut self.vlen);
        override_from(&lookup, "DIMC_SCRATCHPAD_BYTES", &mut self.scratchpad_bytes);
        override_from(&lookup, "DIMC_DMA_BYTES_PER_CYCLE", &mut self.dma_bytes_per_cycle);
        override_from(&lookup, "DIMC_MAX_CYCLES", &mut self.max_cycles);
        override_from(&lookup, "DIMC_ACCEL_LATENCY", &mut self.accel_latency);
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dimc-probe").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# dimc-probe configuration
# Place this file at ~/.config/dimc-probe/config.toml or ./dimc-probe.toml

# Cores in the simulated cluster (1-32)
cores = 8

# Vector register width in bits (power of two)
vlen = 512

# Scratchpad size in bytes
# scratchpad_bytes = 131072

# Byte written into fresh scratchpad memory
# scratchpad_fill = 165

# DMA bandwidth in bytes per cycle
# dma_bytes_per_cycle = 64

# Cycle limit per case
# max_cycles = 100000

# Cycles each DIMC op stays in flight (0 = completes at issue)
# accel_latency = 0
"#
        .to_string()
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut Option<T>) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => {
            log::info!("Using {} from environment: {}", key, raw);
            *slot = Some(value);
        }
        Err(_) => log::warn!("Ignoring {}={:?}: not a valid number", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.cores(), 8);
        assert_eq!(config.vlen(), 512);
        assert_eq!(config.scratchpad_fill(), 0xA5);
        assert_eq!(config.dma_bytes_per_cycle(), 64);
        assert_eq!(config.harness(), HarnessConfig::default());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            cores: Some(4),
            vlen: None,
            max_cycles: Some(500),
            ..Config::default()
        };

        let overlay = Config {
            cores: None,
            vlen: Some(256),
            max_cycles: Some(900),
            ..Config::default()
        };

        base.merge(overlay);

        // cores unchanged (overlay was None)
        assert_eq!(base.cores, Some(4));
        // vlen set from overlay
        assert_eq!(base.vlen, Some(256));
        // max_cycles overridden by overlay
        assert_eq!(base.max_cycles, Some(900));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            cores: Some(2),
            vlen: Some(256),
            ..Config::default()
        };
        config.apply_overrides(|key| match key {
            "DIMC_CORES" => Some("4".to_string()),
            "DIMC_ACCEL_LATENCY" => Some(" 12 ".to_string()),
            "DIMC_VLEN" => Some("wide".to_string()),
            _ => None,
        });

        assert_eq!(config.cores, Some(4));
        assert_eq!(config.accel_latency, Some(12));
        // Bad value leaves the file setting alone
        assert_eq!(config.vlen, Some(256));
    }

    #[test]
    fn test_user_config_path() {
        if let Some(path) = Config::user_config_path() {
            assert!(path.ends_with("dimc-probe/config.toml"));
        }
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.cores, Some(8));
        assert_eq!(config.vlen, Some(512));
        assert!(config.harness().validate().is_ok());
    }
}
