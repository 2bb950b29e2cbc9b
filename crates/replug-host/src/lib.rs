//! Replug hosting core.
//!
//! This crate implements the hot-reloading wrapper around a single Replug
//! module: an isolated temp copy is made of the module, an instance is built
//! from the copy, and a background watcher monitors the original path so a
//! rebuilt binary is swapped in transparently while the embedding host keeps
//! running. The [`HostWrapper`] owns that whole lifecycle and itself
//! implements the SDK's plugin contract, so the assembly can be exposed to an
//! outer host as just another plugin.

pub mod editor;
pub mod error;
pub mod host;
pub mod loader;
pub mod runtime;
pub mod shell;
pub mod temp;
pub mod watcher;

pub use editor::{EditorEmbedder, EditorMount, NullEmbedder};
pub use error::HostError;
pub use host::{
    wrapper_descriptor, HostWrapper, LoadStatus, ProcessHandle, WrapperOptions, MODULE_EXTENSION,
};
pub use loader::{DylibLoader, LoadedModule, ModuleDescription, ModuleLoader};
pub use runtime::{RuntimeContext, RuntimeGuard};
pub use shell::{EditorShell, FileDropTarget, STATUS_DISPLAY_DURATION};
pub use temp::{CopyError, TempCopy, TempCopyManager};
pub use watcher::{ChangeWatcher, WatcherEvent};
