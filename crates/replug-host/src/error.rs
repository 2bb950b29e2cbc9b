use std::path::PathBuf;

use thiserror::Error;

use crate::temp::CopyError;

/// Errors that can occur while loading or managing a wrapped module.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no loadable module at {0}")]
    ModuleNotFound(PathBuf),
    #[error("failed to copy module: {0}")]
    Copy(#[from] CopyError),
    #[error("module instantiation failed: {0}")]
    Instantiation(String),
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
