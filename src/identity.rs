//! Project identity and cache-directory naming (C1, spec §3 / §4.1).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub source_root: PathBuf,
    pub config_path: Option<PathBuf>,
    /// First 16 hex chars of SHA-256(`source_root|config_path`).
    pub hash16: String,
}

impl ProjectIdentity {
    /// Resolves `source_root` (and `config_path`, if given) to canonical
    /// absolute paths and computes the identity hash. Fails with
    /// `INVALID_PROJECT_PATH` if the root is missing or not a directory.
    pub fn resolve(source_root: &Path, config_path: Option<&Path>) -> IndexResult<Self> {
        let canonical_root =
            std::fs::canonicalize(source_root).map_err(|e| IndexError::InvalidProjectPath {
                path: source_root.to_path_buf(),
                reason: format!("cannot canonicalize: {e}"),
            })?;
        if !canonical_root.is_dir() {
            return Err(IndexError::InvalidProjectPath {
                path: canonical_root,
                reason: "not a directory".to_string(),
            });
        }

        let canonical_config = match config_path {
            Some(p) => Some(std::fs::canonicalize(p).map_err(|e| IndexError::InvalidProjectPath {
                path: p.to_path_buf(),
                reason: format!("cannot canonicalize config path: {e}"),
            })?),
            None => None,
        };

        let hash16 = Self::compute_hash16(&canonical_root, canonical_config.as_deref());

        Ok(Self {
            source_root: canonical_root,
            config_path: canonical_config,
            hash16,
        })
    }

    fn compute_hash16(source_root: &Path, config_path: Option<&Path>) -> String {
        let config_component = config_path
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let root_component = source_root.to_string_lossy().replace('\\', "/");
        let payload = format!("{root_component}|{config_component}");

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }

    /// `<basename(source_root)>_<hash16>`, the on-disk cache directory name.
    pub fn cache_dir_name(&self) -> String {
        let basename = self
            .source_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        format!("{basename}_{}", self.hash16)
    }

    pub fn cache_dir(&self, cache_root: &Path) -> PathBuf {
        cache_root.join(self.cache_dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identity_is_deterministic_for_the_same_canonical_pair() {
        let root = tempdir().unwrap();
        let a = ProjectIdentity::resolve(root.path(), None).unwrap();
        let b = ProjectIdentity::resolve(root.path(), None).unwrap();
        assert_eq!(a.hash16, b.hash16);
        assert_eq!(a.cache_dir_name(), b.cache_dir_name());
    }

    #[test]
    fn different_config_paths_produce_disjoint_identities() {
        let root = tempdir().unwrap();
        let config_a = root.path().join("a.toml");
        let config_b = root.path().join("b.toml");
        std::fs::write(&config_a, "").unwrap();
        std::fs::write(&config_b, "").unwrap();

        let a = ProjectIdentity::resolve(root.path(), Some(&config_a)).unwrap();
        let b = ProjectIdentity::resolve(root.path(), Some(&config_b)).unwrap();
        assert_ne!(a.hash16, b.hash16);
    }

    #[test]
    fn missing_root_is_invalid_project_path() {
        let missing = PathBuf::from("/nonexistent/does/not/exist/anywhere");
        let result = ProjectIdentity::resolve(&missing, None);
        assert!(matches!(result, Err(IndexError::InvalidProjectPath { .. })));
    }

    #[test]
    fn file_instead_of_directory_is_rejected() {
        let root = tempdir().unwrap();
        let file_path = root.path().join("not_a_dir");
        std::fs::write(&file_path, "x").unwrap();
        let result = ProjectIdentity::resolve(&file_path, None);
        assert!(matches!(result, Err(IndexError::InvalidProjectPath { .. })));
    }
}
