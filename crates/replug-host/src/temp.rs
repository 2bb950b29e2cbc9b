use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const SUFFIX_LEN: usize = 8;

/// Errors produced while creating an isolated module copy.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("module source missing at {0}")]
    MissingSource(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One isolated copy of a module, exclusively owned by whoever loaded it.
///
/// The copy lives in its own uniquely named directory so that deleting it can
/// never race a newer generation's copy of the same module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempCopy {
    dir: PathBuf,
    module_path: PathBuf,
}

impl TempCopy {
    /// Directory holding this copy; removed as a whole on cleanup.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the copied module inside [`TempCopy::dir`].
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }
}

/// Creates and disposes of isolated module copies under one temp root.
#[derive(Debug, Clone)]
pub struct TempCopyManager {
    root: PathBuf,
}

impl Default for TempCopyManager {
    fn default() -> Self {
        Self::new(default_temp_root())
    }
}

pub fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("replug")
}

impl TempCopyManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `source` (a file or a bundle directory) into a fresh, uniquely
    /// named subdirectory of the temp root.
    ///
    /// Cleanup of the returned copy is the caller's responsibility; see
    /// [`TempCopyManager::remove`].
    pub fn copy_to_temp(&self, source: &Path) -> Result<TempCopy, CopyError> {
        if !source.exists() {
            return Err(CopyError::MissingSource(source.to_path_buf()));
        }
        fs::create_dir_all(&self.root)?;

        let stem = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("module");
        let file_name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("module"));

        let dir = self.claim_unique_dir(stem)?;
        let module_path = dir.join(file_name);
        let result = if source.is_dir() {
            copy_tree(source, &module_path)
        } else {
            fs::copy(source, &module_path).map(|_| ())
        };
        if let Err(err) = result {
            let _ = fs::remove_dir_all(&dir);
            return Err(err.into());
        }

        debug!(
            source = %source.display(),
            copy = %module_path.display(),
            "copied module to isolated temp location"
        );
        Ok(TempCopy { dir, module_path })
    }

    /// Delete a copy's directory. Callers must only do this once the instance
    /// backed by the copy has been fully torn down.
    pub fn remove(&self, copy: &TempCopy) -> io::Result<()> {
        fs::remove_dir_all(&copy.dir)
    }

    /// Delete every copy directory under the root whose newest content is
    /// older than `max_age`. Returns the number of directories removed.
    pub fn sweep_older_than(&self, max_age: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let newest = newest_modification(&path);
            let stale = newest.map(|time| time <= cutoff).unwrap_or(false);
            if stale && fs::remove_dir_all(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn claim_unique_dir(&self, stem: &str) -> io::Result<PathBuf> {
        loop {
            let dir = self.root.join(format!("{stem}-{}", random_suffix()));
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn newest_modification(path: &Path) -> Option<SystemTime> {
    let mut newest = fs::metadata(path).ok()?.modified().ok()?;
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) {
            if modified > newest {
                newest = modified;
            }
        }
    }
    Some(newest)
}
