//! Compilation-Command Store (C4, spec §4.4): loads the standard
//! `(directory, file, arguments[])` compilation database and exposes
//! lookup, diffing, and per-file args hashing.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: String,
    file: String,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileCommands {
    entries: HashMap<PathBuf, Vec<String>>,
}

impl CompileCommands {
    /// Loads `path`. Missing or unparsable files are non-fatal per spec
    /// §4.4: callers fall back to default-args parsing, so this returns
    /// an empty store rather than an error.
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        let Ok(raw_entries) = serde_json::from_str::<Vec<RawEntry>>(&contents) else {
            return Self::default();
        };

        let mut entries = HashMap::new();
        for entry in raw_entries {
            let file_path = Path::new(&entry.file);
            let absolute = if file_path.is_absolute() {
                file_path.to_path_buf()
            } else {
                Path::new(&entry.directory).join(file_path)
            };
            let args = entry
                .arguments
                .unwrap_or_else(|| split_command_line(entry.command.as_deref().unwrap_or("")));
            entries.insert(absolute, args);
        }

        Self { entries }
    }

    pub fn args_for(&self, file: &Path) -> Option<&[String]> {
        self.entries.get(file).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Element-wise vector comparison (order significant), per spec §4.4.
    pub fn diff(old: &CompileCommands, new: &CompileCommands) -> Diff {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();

        for (file, new_args) in &new.entries {
            match old.entries.get(file) {
                None => added.push(file.clone()),
                Some(old_args) if old_args != new_args => changed.push(file.clone()),
                Some(_) => {}
            }
        }
        for file in old.entries.keys() {
            if !new.entries.contains_key(file) {
                removed.push(file.clone());
            }
        }

        Diff {
            added,
            removed,
            changed,
        }
    }

    pub fn hash(args: &[String]) -> String {
        let mut hasher = Sha256::new();
        for arg in args {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Hash of the whole database file's bytes, used to detect a global
    /// `compile_commands` change (spec §4.8, §4.9 step 1).
    pub fn file_hash(path: &Path) -> Option<String> {
        let bytes = std::fs::read(path).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        Some(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

fn split_command_line(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_is_stable_for_equal_argument_vectors() {
        let a = vec!["-std=c++17".to_string(), "-Iinc".to_string()];
        let b = vec!["-std=c++17".to_string(), "-Iinc".to_string()];
        assert_eq!(CompileCommands::hash(&a), CompileCommands::hash(&b));
    }

    #[test]
    fn hash_differs_when_order_differs() {
        let a = vec!["-Iinc".to_string(), "-std=c++17".to_string()];
        let b = vec!["-std=c++17".to_string(), "-Iinc".to_string()];
        assert_ne!(CompileCommands::hash(&a), CompileCommands::hash(&b));
    }

    #[test]
    fn diff_classifies_added_removed_and_changed() {
        let dir = tempdir().unwrap();
        let old_path = dir.path().join("old.json");
        let new_path = dir.path().join("new.json");
        std::fs::write(
            &old_path,
            r#"[
                {"directory": "/p", "file": "/p/a.cpp", "arguments": ["-std=c++17"]},
                {"directory": "/p", "file": "/p/b.cpp", "arguments": ["-std=c++17"]}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            &new_path,
            r#"[
                {"directory": "/p", "file": "/p/a.cpp", "arguments": ["-std=c++20"]},
                {"directory": "/p", "file": "/p/c.cpp", "arguments": ["-std=c++17"]}
            ]"#,
        )
        .unwrap();

        let old = CompileCommands::load(&old_path);
        let new = CompileCommands::load(&new_path);
        let diff = CompileCommands::diff(&old, &new);

        assert_eq!(diff.added, vec![PathBuf::from("/p/c.cpp")]);
        assert_eq!(diff.removed, vec![PathBuf::from("/p/b.cpp")]);
        assert_eq!(diff.changed, vec![PathBuf::from("/p/a.cpp")]);
    }

    #[test]
    fn missing_database_is_non_fatal() {
        let missing = PathBuf::from("/does/not/exist/compile_commands.json");
        let commands = CompileCommands::load(&missing);
        assert!(commands.is_empty());
    }
}
