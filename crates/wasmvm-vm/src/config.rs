//! VM configuration.
//!
//! Loaded from a TOML file or built in code; converted into the cache
//! options when the VM starts.

use crate::cache::CacheOptions;
use crate::engine::static_analysis::capabilities_from_csv;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use wasmvm_types::Size;

/// Largest instance memory a contract may grow to (4 GiB of wasm32 pages)
const MAX_INSTANCE_MEMORY_MIB: usize = 4096;

/// VM configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Directory holding the code store
    pub data_dir: PathBuf,
    /// Comma separated host capabilities contracts may require
    pub supported_capabilities: String,
    /// Byte budget of the regular module cache tier (MiB)
    pub memory_cache_size: usize,
    /// Max linear memory of one contract instance (MiB)
    pub instance_memory_limit: usize,
    /// Forward contract debug messages to the log
    pub print_debug: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            supported_capabilities: "iterator,staking".to_string(),
            memory_cache_size: 100,
            instance_memory_limit: 32,
            print_debug: false,
        }
    }
}

impl VmConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: VmConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("Data directory cannot be empty");
        }
        if self.instance_memory_limit == 0 {
            anyhow::bail!("Instance memory limit cannot be 0");
        }
        if self.instance_memory_limit > MAX_INSTANCE_MEMORY_MIB {
            anyhow::bail!(
                "Instance memory limit {} MiB exceeds {} MiB",
                self.instance_memory_limit,
                MAX_INSTANCE_MEMORY_MIB
            );
        }
        for capability in self.capabilities() {
            if !capability
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                anyhow::bail!("Invalid capability name: {:?}", capability);
            }
        }
        Ok(())
    }

    pub fn capabilities(&self) -> HashSet<String> {
        capabilities_from_csv(&self.supported_capabilities)
    }

    pub fn instance_memory_limit(&self) -> Size {
        Size::mebi(self.instance_memory_limit)
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            data_dir: self.data_dir.clone(),
            available_capabilities: self.capabilities(),
            memory_cache_size: Size::mebi(self.memory_cache_size),
        }
    }
}
