//! Configuration file parsing for shark.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use shark_vm_core::VmConfig;
use shark_vm_core::config::DEFAULT_MAX_CALL_DEPTH;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Interpreter settings
    #[serde(default)]
    pub vm: VmSection,

    /// Logging settings
    #[serde(default)]
    pub log: LogSection,
}

/// `[vm]` table.
#[derive(Debug, Deserialize)]
pub struct VmSection {
    /// Deepest call chain before "stack overflow"
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Extra directories searched for dependency archives
    #[serde(default)]
    pub import_paths: Vec<PathBuf>,
}

impl Default for VmSection {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            import_paths: Vec::new(),
        }
    }
}

/// `[log]` table.
#[derive(Debug, Default, Deserialize)]
pub struct LogSection {
    /// Default filter directive, e.g. `warn` or `shark_vm_core=debug`
    pub level: Option<String>,
}

fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}

impl Config {
    /// VM settings from the file; relative import paths are taken relative
    /// to `base` (the directory holding the config file).
    pub fn vm_config(&self, base: Option<&Path>) -> VmConfig {
        let mut config = VmConfig::default().with_max_call_depth(self.vm.max_call_depth);
        for path in &self.vm.import_paths {
            let path = match base {
                Some(base) if path.is_relative() => base.join(path),
                _ => path.clone(),
            };
            config = config.with_import_path(path);
        }
        config
    }
}

/// Configuration plus the file it came from
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Directory of the config file, if one was read
    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

/// Load configuration from a file or search for a default config file.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LoadedConfig> {
    let config_path = match path {
        Some(path) if !path.exists() => {
            anyhow::bail!("config file {} does not exist", path.display())
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        None => Ok(LoadedConfig {
            config: Config::default(),
            path: None,
        }),
    }
}

/// Search for shark.toml in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join("shark.toml"))
        .find(|path| path.is_file())
}
