use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::StorageError;

/// File operations scoped to one root directory (an IL working copy).
///
/// Every path handed to a mutating method must resolve inside the root.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` to `path`, creating parent directories.
    pub fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        self.ensure_within_root(path)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }
        std::fs::write(path, content).map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Serializes `value` as YAML into `directory/file_name`.
    pub fn save_yaml<T: Serialize>(
        &self,
        directory: &Path,
        file_name: &str,
        value: &T,
    ) -> Result<PathBuf, StorageError> {
        let path = directory.join(file_name);
        let yaml = serde_yaml::to_string(value).map_err(|e| StorageError::SerializeYaml {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.write_file(&path, yaml.as_bytes())?;
        Ok(path)
    }

    /// Removes a file or directory tree. Missing paths are not an error.
    pub fn remove_all(&self, path: &Path) -> Result<(), StorageError> {
        self.ensure_within_root(path)?;
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::Remove {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let result = if metadata.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        result.map_err(|e| StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Copies a file, or every file of a directory tree, into `destination`.
    ///
    /// A file lands at `destination/<file name>`; a directory's contents keep
    /// their relative layout. `.git` directories are skipped. Existing files
    /// are overwritten. Returns the written paths in sorted order.
    pub fn copy_into(&self, source: &Path, destination: &Path) -> Result<Vec<PathBuf>, StorageError> {
        if source.is_file() {
            let file_name = source.file_name().ok_or_else(|| StorageError::Copy {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            })?;
            let target = destination.join(file_name);
            self.copy_file(source, &target)?;
            return Ok(vec![target]);
        }

        let mut written = Vec::new();
        let walker = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| StorageError::Walk {
                path: source.to_path_buf(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // strip_prefix cannot fail for entries yielded under `source`
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = destination.join(relative);
            self.copy_file(entry.path(), &target)?;
            written.push(target);
        }

        Ok(written)
    }

    /// Lists the entry names of a directory, sorted. Missing directories are empty.
    pub fn list_entries(&self, directory: &Path) -> Result<Vec<String>, StorageError> {
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFile {
                    path: directory.to_path_buf(),
                    source: e,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::ReadFile {
                path: directory.to_path_buf(),
                source: e,
            })?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        self.ensure_within_root(to)?;
        if let Some(parent) = to.parent() {
            self.ensure_directory(parent)?;
        }
        std::fs::copy(from, to).map_err(|e| StorageError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    fn ensure_within_root(&self, path: &Path) -> Result<(), StorageError> {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(StorageError::WriteFile {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("path is outside of '{}'", self.root.display()),
                ),
            });
        }
        Ok(())
    }
}
