//! Layered configuration, grounded in the teacher's `src/config.rs`
//! figment-based `Settings`: compiled-in defaults, overridden by an
//! optional TOML file, overridden by environment variables.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

const ENV_PREFIX: &str = "CXINDEX_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File extensions considered source/header candidates (spec §4.3).
    pub extensions: Vec<String>,
    /// Directory name fragments skipped during the scan (build outputs,
    /// vendor trees, VCS metadata).
    pub excludes: Vec<String>,
    /// Path to `compile_commands.json`, relative to the source root unless
    /// absolute. Missing file is non-fatal (spec §4.4).
    pub compile_commands: PathBuf,
    /// Default parser arguments used when no compile-commands entry
    /// covers a file.
    pub default_args: Vec<String>,
    /// Worker pool size; `0` means "CPU count - 1, minimum 1" (spec §5).
    pub worker_threads: usize,
    /// Bulk updates between opportunistic `PRAGMA incremental_vacuum` runs.
    pub vacuum_every_n_updates: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "c", "cc", "cpp", "cxx", "h", "hpp", "hxx", "hh",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            excludes: [
                ".git", ".hg", ".svn", "build", "out", "cmake-build-debug",
                "cmake-build-release", "third_party", "vendor", "node_modules",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            compile_commands: PathBuf::from("compile_commands.json"),
            default_args: vec!["-std=c++17".to_string()],
            worker_threads: 0,
            vacuum_every_n_updates: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub http_bind: String,
    pub http_port: u16,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1".to_string(),
            http_port: 8787,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` if set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    /// Base directory under which `<basename>_<hash16>` cache directories
    /// are created (spec §3 "Project identity").
    pub cache_root: PathBuf,
    pub indexing: IndexingConfig,
    pub mcp: McpConfig,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            cache_root: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cxindex"),
            indexing: IndexingConfig::default(),
            mcp: McpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub const CONFIG_FILE_NAME: &'static str = "cxindex.toml";

    /// Load settings from defaults, optionally merging a TOML file found
    /// by walking upward from `start_dir`, then environment overrides.
    pub fn load(start_dir: &Path) -> IndexResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(config_path) = Self::find_workspace_config(start_dir) {
            figment = figment.merge(Toml::file(config_path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment.extract().map_err(|e| IndexError::InvalidProjectPath {
            path: start_dir.to_path_buf(),
            reason: format!("failed to load configuration: {e}"),
        })
    }

    pub fn load_from(config_path: &Path) -> IndexResult<Self> {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment.extract().map_err(|e| IndexError::InvalidProjectPath {
            path: config_path.to_path_buf(),
            reason: format!("failed to load configuration: {e}"),
        })
    }

    /// Walk upward from `start_dir` looking for `cxindex.toml`, mirroring
    /// the teacher's `find_workspace_config`.
    pub fn find_workspace_config(start_dir: &Path) -> Option<PathBuf> {
        let mut dir = Some(start_dir.to_path_buf());
        while let Some(current) = dir {
            let candidate = current.join(Self::CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        None
    }

    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let body = toml::to_string_pretty(self).map_err(|e| IndexError::InvalidProjectPath {
            path: path.to_path_buf(),
            reason: format!("failed to serialize configuration: {e}"),
        })?;
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn worker_pool_size(&self) -> usize {
        if self.indexing.worker_threads > 0 {
            self.indexing.worker_threads
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_include_c_and_cpp_extensions() {
        let settings = Settings::default();
        assert!(settings.indexing.extensions.contains(&"cpp".to_string()));
        assert!(settings.indexing.extensions.contains(&"h".to_string()));
    }

    #[test]
    fn worker_pool_size_falls_back_to_cpu_count_minus_one() {
        let mut settings = Settings::default();
        settings.indexing.worker_threads = 0;
        assert!(settings.worker_pool_size() >= 1);
    }

    #[test]
    fn find_workspace_config_walks_up_to_parent_directories() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join(Settings::CONFIG_FILE_NAME), "version = 1\n").unwrap();

        let found = Settings::find_workspace_config(&nested).unwrap();
        assert_eq!(found, root.path().join(Settings::CONFIG_FILE_NAME));
    }

    #[test]
    fn load_merges_file_over_defaults() {
        let root = tempdir().unwrap();
        std::fs::write(
            root.path().join(Settings::CONFIG_FILE_NAME),
            "[mcp]\nhttp_port = 9999\nhttp_bind = \"127.0.0.1\"\n",
        )
        .unwrap();
        let settings = Settings::load(root.path()).unwrap();
        assert_eq!(settings.mcp.http_port, 9999);
    }
}
