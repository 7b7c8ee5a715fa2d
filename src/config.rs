//! Configuration management for aie-kernel-tests.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (AIE_XCLBIN, AIE_INSTR, AIE_KERNEL, AIE_TRACE_FILE)
//! 3. Project-local config file (`./aie-kernel-tests.toml`)
//! 4. User config file (`~/.config/aie-kernel-tests/config.toml`)
//! 5. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # aie-kernel-tests.toml
//!
//! xclbin = "build/final.xclbin"
//! instr = "build/insts.bin"
//! kernel = "MLIR_AIE"
//! trace_file = "trace.txt"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::harness::{DEFAULT_KERNEL, DEFAULT_TRACE_FILE};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

const APP_DIR: &str = "aie-kernel-tests";
const LOCAL_FILE: &str = "aie-kernel-tests.toml";

/// aie-kernel-tests configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Default xclbin container.
    pub xclbin: Option<String>,

    /// Default instruction stream (binary, or `.txt` with one hex word per line).
    pub instr: Option<String>,

    /// Kernel name prefix looked up in the xclbin.
    pub kernel: Option<String>,

    /// Where the trace dump goes when a trace size is set.
    pub trace_file: Option<String>,
}

impl Config {
    /// Load configuration from files and environment.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

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

    pub fn xclbin(&self) -> Option<PathBuf> {
        self.xclbin.as_ref().map(PathBuf::from)
    }

    pub fn instr(&self) -> Option<PathBuf> {
        self.instr.as_ref().map(PathBuf::from)
    }

    /// Kernel name, falling back to `MLIR_AIE`.
    pub fn kernel(&self) -> String {
        self.kernel.clone().unwrap_or_else(|| DEFAULT_KERNEL.to_string())
    }

    /// Trace output path, falling back to `trace.txt`.
    pub fn trace_file(&self) -> PathBuf {
        PathBuf::from(self.trace_file.as_deref().unwrap_or(DEFAULT_TRACE_FILE))
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new(LOCAL_FILE))
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
    fn merge(&mut self, other: Self) {
        if other.xclbin.is_some() {
            self.xclbin = other.xclbin;
        }
        if other.instr.is_some() {
            self.instr = other.instr;
        }
        if other.kernel.is_some() {
            self.kernel = other.kernel;
        }
        if other.trace_file.is_some() {
            self.trace_file = other.trace_file;
        }
    }

    /// Apply environment variable overrides, reading through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut Option<String>); 4] = [
            ("AIE_XCLBIN", &mut self.xclbin),
            ("AIE_INSTR", &mut self.instr),
            ("AIE_KERNEL", &mut self.kernel),
            ("AIE_TRACE_FILE", &mut self.trace_file),
        ];
        for (key, field) in fields {
            if let Some(value) = var(key) {
                log::info!("Using {} from environment: {}", key, value);
                *field = Some(value);
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# aie-kernel-tests configuration
# Place this file at ~/.config/aie-kernel-tests/config.toml or ./aie-kernel-tests.toml
# Command-line flags and AIE_* environment variables take precedence.

# xclbin container holding the kernel (optional; without it the design runs directly)
# xclbin = "build/final.xclbin"

# NPU instruction stream; .txt files hold one hex word per line
# instr = "build/insts.bin"

# Kernel name prefix to look up in the xclbin
kernel = "MLIR_AIE"

# Trace dump location, written when --trace_sz is non-zero
trace_file = "trace.txt"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.kernel(), "MLIR_AIE");
        assert_eq!(config.trace_file(), PathBuf::from("trace.txt"));
        assert_eq!(config.xclbin(), None);
        assert_eq!(config.instr(), None);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            xclbin: Some("/base/final.xclbin".to_string()),
            instr: None,
            kernel: Some("BASE".to_string()),
            trace_file: None,
        };

        let overlay = Config {
            xclbin: None,
            instr: Some("/overlay/insts.txt".to_string()),
            kernel: Some("OVERLAY".to_string()),
            trace_file: None,
        };

        base.merge(overlay);

        assert_eq!(base.xclbin.as_deref(), Some("/base/final.xclbin"));
        assert_eq!(base.instr.as_deref(), Some("/overlay/insts.txt"));
        assert_eq!(base.kernel(), "OVERLAY");
        assert_eq!(base.trace_file, None);
    }

    #[test]
    fn test_env_overrides_files() {
        let env: HashMap<&str, &str> = [("AIE_KERNEL", "FROM_ENV"), ("AIE_TRACE_FILE", "/tmp/t.txt")]
            .into_iter()
            .collect();
        let mut config = Config { kernel: Some("FROM_FILE".to_string()), ..Default::default() };

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.kernel(), "FROM_ENV");
        assert_eq!(config.trace_file(), PathBuf::from("/tmp/t.txt"));
        assert_eq!(config.xclbin, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_FILE);
        std::fs::write(&path, "kernel = \"MLIR_AIE_1\"\ninstr = \"insts.txt\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.kernel(), "MLIR_AIE_1");
        assert_eq!(config.instr(), Some(PathBuf::from("insts.txt")));
    }

    #[test]
    fn test_bad_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_FILE);
        std::fs::write(&path, "kernel = [").unwrap();
        assert!(Config::load_from_file(&path).is_none());
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.kernel(), "MLIR_AIE");
    }
}
