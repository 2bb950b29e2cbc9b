use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::temp::TempCopyManager;

/// Copies older than this are considered abandoned by a crashed session.
const ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct ContextInner {
    active: AtomicUsize,
    temp: TempCopyManager,
}

/// Process-wide bookkeeping of live wrapper instances.
///
/// Every wrapper holds a [`RuntimeGuard`] for its lifetime. When the last
/// guard is released, the context sweeps the temp root for module copies that
/// earlier sessions left behind.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    inner: Arc<ContextInner>,
}

impl RuntimeContext {
    pub fn new(temp: TempCopyManager) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                active: AtomicUsize::new(0),
                temp,
            }),
        }
    }

    /// The context shared by all wrappers in this process.
    pub fn global() -> &'static RuntimeContext {
        static GLOBAL: OnceLock<RuntimeContext> = OnceLock::new();
        GLOBAL.get_or_init(|| RuntimeContext::new(TempCopyManager::default()))
    }

    pub fn acquire(&self) -> RuntimeGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        RuntimeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }
}

/// Liveness token held by one wrapper instance.
#[derive(Debug)]
pub struct RuntimeGuard {
    inner: Arc<ContextInner>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            let swept = self.inner.temp.sweep_older_than(ORPHAN_MAX_AGE);
            if swept > 0 {
                debug!(swept, "removed orphaned module copies");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn guards_track_the_active_count() {
        let dir = tempdir().unwrap();
        let context = RuntimeContext::new(TempCopyManager::new(dir.path().join("copies")));

        assert_eq!(context.active(), 0);
        let first = context.acquire();
        let second = context.acquire();
        assert_eq!(context.active(), 2);

        drop(first);
        assert_eq!(context.active(), 1);
        drop(second);
        assert_eq!(context.active(), 0);
    }

    #[test]
    fn fresh_copies_survive_the_last_release() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("copies");
        let context = RuntimeContext::new(TempCopyManager::new(root.clone()));

        // A just-written copy is too young to be an orphan.
        fs::create_dir_all(root.join("synth-live1234")).unwrap();
        drop(context.acquire());

        assert!(root.join("synth-live1234").exists());
        // Manual sweep with a zero cutoff still removes it, which is what the
        // context would do once the copy ages out.
        let manager = TempCopyManager::new(root.clone());
        assert_eq!(manager.sweep_older_than(Duration::ZERO), 1);
    }
}
