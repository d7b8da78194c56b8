//! Configuration management for soc-fabric.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (SOC_FABRIC_VARIANT, etc.)
//! 2. Project-local config file (`./soc-fabric.toml`)
//! 3. User config file (`~/.config/soc-fabric/config.toml`)
//! 4. Built-in defaults
//!
//! String fields are resolved once into a [`SocConfig`] by
//! [`Config::resolve`]; nothing downstream re-parses them.
//!
//! # Config File Format
//!
//! ```toml
//! # soc-fabric.toml
//!
//! # Board variant: "z7-10" or "z7-20"
//! variant = "z7-20"
//!
//! # CPU: "vexriscv" (soft CPU) or "zynq7000" (PS cores)
//! cpu_type = "vexriscv"
//!
//! # Attach the PS as a slave of the soft CPU (z7-20 only)
//! with_ps7 = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::soc::{BoardVariant, CpuKind, Ps7SlaveMap, SocConfig};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// soc-fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Board variant ("z7-10" or "z7-20").
    pub variant: Option<String>,

    /// CPU type ("vexriscv" or "zynq7000").
    pub cpu_type: Option<String>,

    /// System clock frequency in Hz.
    pub sys_clk_freq: Option<f64>,

    /// Attach the PS as a slave of the soft CPU.
    pub with_ps7: Option<bool>,

    /// Placement of the PS slave windows.
    /// Unset fields keep the board defaults.
    pub ps7: Ps7Overrides,
}

/// Optional overrides for [`Ps7SlaveMap`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Ps7Overrides {
    pub ddr_base: Option<u64>,
    pub ddr_dest: Option<u64>,
    pub io_base: Option<u64>,
    pub io_dest: Option<u64>,
    pub window_size: Option<u64>,
}

impl Ps7Overrides {
    fn merge(&mut self, other: Self) {
        self.ddr_base = other.ddr_base.or(self.ddr_base);
        self.ddr_dest = other.ddr_dest.or(self.ddr_dest);
        self.io_base = other.io_base.or(self.io_base);
        self.io_dest = other.io_dest.or(self.io_dest);
        self.window_size = other.window_size.or(self.window_size);
    }

    fn apply(&self, map: &mut Ps7SlaveMap) {
        map.ddr_base = self.ddr_base.unwrap_or(map.ddr_base);
        map.ddr_dest = self.ddr_dest.unwrap_or(map.ddr_dest);
        map.io_base = self.io_base.unwrap_or(map.io_base);
        map.io_dest = self.io_dest.unwrap_or(map.io_dest);
        map.window_size = self.window_size.unwrap_or(map.window_size);
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `soc-fabric.toml`
    /// 3. User config `~/.config/soc-fabric/config.toml`
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

    /// Resolve into board parameters, validating every string field.
    pub fn resolve(&self) -> Result<SocConfig> {
        let mut soc = SocConfig::default();
        if let Some(variant) = &self.variant {
            soc.variant = variant
                .parse::<BoardVariant>()
                .with_context(|| format!("invalid variant in configuration: {}", variant))?;
        }
        if let Some(cpu) = &self.cpu_type {
            soc.cpu = cpu
                .parse::<CpuKind>()
                .with_context(|| format!("invalid cpu_type in configuration: {}", cpu))?;
        }
        if let Some(freq) = self.sys_clk_freq {
            if !freq.is_finite() || freq < 1.0 || freq > u64::MAX as f64 {
                anyhow::bail!("sys_clk_freq must be a positive frequency in Hz, got {}", freq);
            }
            soc.sys_clk_freq = freq.round() as u64;
        }
        soc.with_ps7 = self.with_ps7.unwrap_or(false);
        self.ps7.apply(&mut soc.ps7);
        Ok(soc)
    }

    /// Load user configuration from ~/.config/soc-fabric/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./soc-fabric.toml
    fn load_local_config() -> Option<Self> {
        // Try current directory
        let local_path = Path::new("soc-fabric.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try the project root when run through cargo
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("soc-fabric.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
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
    fn merge(&mut self, other: Self) {
        if other.variant.is_some() {
            self.variant = other.variant;
        }
        if other.cpu_type.is_some() {
            self.cpu_type = other.cpu_type;
        }
        if other.sys_clk_freq.is_some() {
            self.sys_clk_freq = other.sys_clk_freq;
        }
        if other.with_ps7.is_some() {
            self.with_ps7 = other.with_ps7;
        }
        self.ps7.merge(other.ps7);
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(variant) = var("SOC_FABRIC_VARIANT") {
            log::info!("Using SOC_FABRIC_VARIANT from environment: {}", variant);
            self.variant = Some(variant);
        }
        if let Some(cpu) = var("SOC_FABRIC_CPU") {
            log::info!("Using SOC_FABRIC_CPU from environment: {}", cpu);
            self.cpu_type = Some(cpu);
        }
        if let Some(freq) = var("SOC_FABRIC_SYS_CLK_FREQ") {
            match freq.parse::<f64>() {
                Ok(freq) => {
                    log::info!("Using SOC_FABRIC_SYS_CLK_FREQ from environment: {}", freq);
                    self.sys_clk_freq = Some(freq);
                }
                Err(e) => log::warn!("Ignoring SOC_FABRIC_SYS_CLK_FREQ={}: {}", freq, e),
            }
        }
        if let Some(flag) = var("SOC_FABRIC_WITH_PS7") {
            match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.with_ps7 = Some(true),
                "0" | "false" | "no" | "off" => self.with_ps7 = Some(false),
                _ => log::warn!("Ignoring SOC_FABRIC_WITH_PS7={}", flag),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("soc-fabric").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# soc-fabric configuration
# Place this file at ~/.config/soc-fabric/config.toml or ./soc-fabric.toml

# Board variant: "z7-10" or "z7-20"
variant = "z7-20"

# CPU: "vexriscv" (soft CPU in the PL) or "zynq7000" (PS cores through GP0)
cpu_type = "vexriscv"

# System clock in Hz (soft CPU only)
sys_clk_freq = 125e6

# Attach the PS as a slave of the soft CPU (z7-20 only)
with_ps7 = true

# Placement of the PS slave windows (optional)
[ps7]
# ddr_base = 0x4000_0000
# ddr_dest = 0x0008_0000
# io_base = 0x8000_0000
# io_dest = 0xE000_0000
# window_size = 0x2000_0000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_resolves_to_board_defaults() {
        let soc = Config::default().resolve().unwrap();
        assert_eq!(soc, SocConfig::default());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            variant: Some("z7-10".to_string()),
            cpu_type: Some("vexriscv".to_string()),
            sys_clk_freq: Some(100e6),
            with_ps7: None,
            ps7: Ps7Overrides { ddr_dest: Some(0x10_0000), ..Default::default() },
        };

        let overlay = Config {
            variant: Some("z7-20".to_string()),
            cpu_type: None,
            sys_clk_freq: None,
            with_ps7: Some(true),
            ps7: Ps7Overrides { io_dest: Some(0xE000_1000), ..Default::default() },
        };

        base.merge(overlay);

        // variant overridden by overlay
        assert_eq!(base.variant, Some("z7-20".to_string()));
        // cpu_type unchanged (overlay was None)
        assert_eq!(base.cpu_type, Some("vexriscv".to_string()));
        assert_eq!(base.sys_clk_freq, Some(100e6));
        assert_eq!(base.with_ps7, Some(true));
        // nested overrides merge field by field
        assert_eq!(base.ps7.ddr_dest, Some(0x10_0000));
        assert_eq!(base.ps7.io_dest, Some(0xE000_1000));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        let soc = config.resolve().unwrap();
        assert_eq!(soc.variant, BoardVariant::Z7_20);
        assert_eq!(soc.cpu, CpuKind::Soft);
        assert_eq!(soc.sys_clk_freq, 125_000_000);
        assert!(soc.with_ps7);
    }

    #[test]
    fn test_resolve_rejects_unknown_values() {
        let config = Config { variant: Some("z7-30".to_string()), ..Default::default() };
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("z7-30"));

        let config = Config { cpu_type: Some("pentium".to_string()), ..Default::default() };
        assert!(config.resolve().is_err());

        let config = Config { sys_clk_freq: Some(-1.0), ..Default::default() };
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "variant = \"z7-20\"").unwrap();
        writeln!(file, "cpu_type = \"zynq7000\"").unwrap();
        writeln!(file, "[ps7]").unwrap();
        writeln!(file, "ddr_dest = 0x0010_0000").unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        let soc = config.resolve().unwrap();
        assert_eq!(soc.cpu, CpuKind::Zynq7000);
        assert_eq!(soc.ps7.ddr_dest, 0x0010_0000);
        assert_eq!(soc.ps7.io_dest, crate::soc::PS7_IO_DEST_BASE);
    }

    #[test]
    fn test_load_from_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soc-fabric.toml");
        std::fs::write(&path, "variant = [").unwrap();
        assert!(Config::load_from_file(&path).is_none());
        assert!(Config::load_from_file(&dir.path().join("missing.toml")).is_none());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SOC_FABRIC_VARIANT", "z7-20"),
            ("SOC_FABRIC_SYS_CLK_FREQ", "100e6"),
            ("SOC_FABRIC_WITH_PS7", "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = Config { cpu_type: Some("zynq7000".to_string()), ..Default::default() };
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.variant, Some("z7-20".to_string()));
        assert_eq!(config.cpu_type, Some("zynq7000".to_string()));
        assert_eq!(config.sys_clk_freq, Some(100e6));
        assert_eq!(config.with_ps7, Some(true));
    }
}
