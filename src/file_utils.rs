use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::InputError;

// @module: File and directory utilities

/// A local file and the name it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Basename; directory structure is flattened
    pub object_name: String,
}

/// Result of the extension filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub accepted: Vec<PathBuf>,
    pub discarded: Vec<PathBuf>,
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    /// Split files into those whose extension is allowed and the rest.
    ///
    /// Matching is case-insensitive; allowed extensions may be given with or
    /// without the leading dot. Input order is kept in both lists.
    pub fn filter_by_extension(files: &[PathBuf], extensions: &HashSet<String>) -> FilterOutcome {
        let allowed: HashSet<String> = extensions.iter().map(|e| normalize_extension(e)).collect();

        let (accepted, discarded): (Vec<PathBuf>, Vec<PathBuf>) = files.iter().cloned().partition(|path| {
            path.extension()
                .map(|ext| allowed.contains(&format!(".{}", ext.to_string_lossy().to_lowercase())))
                .unwrap_or(false)
        });
        FilterOutcome { accepted, discarded }
    }

    // @returns: Storage object name (basename) of a path
    pub fn object_name<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    /// Expand run inputs: a single directory becomes the regular files
    /// directly inside it, sorted by name; anything else is returned as given.
    pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, InputError> {
        match inputs {
            [dir] if dir.is_dir() => {
                let mut files = Vec::new();
                for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
                    let entry = entry.map_err(|e| InputError::Io(format!("{:?}: {}", dir, e)))?;
                    if entry.file_type().is_file() {
                        files.push(entry.into_path());
                    }
                }
                Ok(files)
            }
            _ => Ok(inputs.to_vec()),
        }
    }

    /// Pair every file with its object name, refusing duplicate names
    pub fn file_records(files: &[PathBuf]) -> Result<Vec<FileRecord>, InputError> {
        let mut seen: HashMap<String, &PathBuf> = HashMap::new();
        let mut records = Vec::with_capacity(files.len());

        for path in files {
            let object_name = Self::object_name(path)
                .ok_or_else(|| InputError::Io(format!("{:?} has no file name", path)))?;
            if let Some(first) = seen.get(&object_name) {
                return Err(InputError::NameCollision {
                    name: object_name,
                    first: (*first).clone(),
                    second: path.clone(),
                });
            }
            seen.insert(object_name.clone(), path);
            records.push(FileRecord {
                path: path.clone(),
                object_name,
            });
        }
        Ok(records)
    }

    /// Default output directory: the source directory with `.{language}` appended
    pub fn output_dir_for<P: AsRef<Path>>(first_file: P, target_language: &str) -> Result<PathBuf> {
        let parent = match first_file.as_ref().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        let mut name = parent.as_os_str().to_os_string();
        name.push(".");
        name.push(target_language);
        Ok(PathBuf::from(name))
    }

    // @reads: Whole file into memory
    pub async fn read_bytes<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.trim().to_lowercase();
    if lower.starts_with('.') { lower } else { format!(".{}", lower) }
}
