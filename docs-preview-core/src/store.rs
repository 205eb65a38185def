//! Preview stores: the preview branch seen as a map from path keys to directory trees.
//!
//! [`FsPreviewStore`] works on a checked-out working tree. [`MemoryPreviewStore`]
//! keeps everything in memory and is what the reconciler tests run against.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::contract::{PreviewStore, PreviewTree};
use crate::error::StoreError;

/// Store rooted at a directory on disk, usually the preview branch worktree.
pub struct FsPreviewStore {
    root: PathBuf,
}

impl FsPreviewStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(validate_key(key)?))
    }
}

impl PreviewStore for FsPreviewStore {
    fn exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.exists()).unwrap_or(false)
    }

    fn get(&self, key: &str) -> Result<Option<PreviewTree>, StoreError> {
        let path = self.resolve(key)?;
        if !path.is_dir() {
            return Ok(None);
        }
        Ok(Some(read_tree(&path)?))
    }

    fn put(&self, key: &str, source: &Path) -> Result<(), StoreError> {
        let target = self.resolve(key)?;
        if target.exists() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        if !source.is_dir() {
            return Err(StoreError::MissingSource(source.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::rename(source, &target) {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    target = %target.display(),
                    "Renamed artifact into store"
                );
            }
            Err(e) => {
                // Renames fail across filesystems, e.g. a tmpfs artifact dir.
                warn!(error = ?e, source = %source.display(), "Rename failed, copying instead");
                if let Err(copy_err) = copy_dir_all(source, &target) {
                    error!(
                        error = ?copy_err,
                        target = %target.display(),
                        "Failed to copy artifact into store"
                    );
                    let _ = fs::remove_dir_all(&target);
                    return Err(copy_err.into());
                }
                fs::remove_dir_all(source)?;
            }
        }
        info!(key, root = %self.root.display(), "Stored preview");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;
        if !path.exists() {
            return Ok(false);
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        info!(key, root = %self.root.display(), "Deleted preview");
        Ok(true)
    }
}

/// In-memory fake. `put` still consumes the source directory on disk so that
/// it behaves like a move.
#[derive(Default)]
pub struct MemoryPreviewStore {
    entries: Mutex<BTreeMap<String, PreviewTree>>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry directly, bypassing the move semantics of `put`.
    pub fn insert(&self, key: &str, tree: PreviewTree) {
        self.lock().insert(key.to_string(), tree);
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PreviewTree>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn exists(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<PreviewTree>, StoreError> {
        validate_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, source: &Path) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.exists(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        if !source.is_dir() {
            return Err(StoreError::MissingSource(source.to_path_buf()));
        }
        let tree = read_tree(source)?;
        fs::remove_dir_all(source)?;
        self.lock().insert(key.to_string(), tree);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.lock().remove(key).is_some())
    }
}

/// Keys are relative, slash-separated and may not climb out of the root.
fn validate_key(key: &str) -> Result<&Path, StoreError> {
    let path = Path::new(key);
    let well_formed = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if well_formed {
        Ok(path)
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Reads every file under `dir` keyed by its path relative to `dir`.
pub fn read_tree(dir: &Path) -> std::io::Result<PreviewTree> {
    fn visit(dir: &Path, base: &Path, tree: &mut PreviewTree) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit(&path, base, tree)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                tree.insert(rel.to_path_buf(), fs::read(&path)?);
            }
        }
        Ok(())
    }
    let mut tree = BTreeMap::new();
    visit(dir, dir, &mut tree)?;
    Ok(tree)
}

fn copy_dir_all(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}
