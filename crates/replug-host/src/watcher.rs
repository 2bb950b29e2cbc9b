use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::Sender;
use tracing::debug;
use walkdir::WalkDir;

/// How often the watcher rescans the watched subtree.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long writes must stay quiet before a change is reported.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
/// How long [`ChangeWatcher::stop`] waits for the poll loop to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Notification posted by a watcher thread once a burst of changes settles.
///
/// The generation is a liveness token: receivers drop events whose generation
/// no longer matches the plugin generation they are tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEvent {
    ModuleChanged { generation: u64 },
}

/// Background poller that reports modifications of a module file or bundle.
///
/// The watcher never calls back synchronously; it posts [`WatcherEvent`]s
/// into the channel it was given and leaves all real work to whoever drains
/// that channel on its own thread. Monitoring is continuous: after a
/// notification the loop keeps polling until it is stopped.
pub struct ChangeWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl ChangeWatcher {
    pub fn spawn(path: PathBuf, generation: u64, events: Sender<WatcherEvent>) -> Self {
        Self::spawn_with_timing(path, generation, events, POLL_INTERVAL, DEBOUNCE_WINDOW)
    }

    pub fn spawn_with_timing(
        path: PathBuf,
        generation: u64,
        events: Sender<WatcherEvent>,
        poll_interval: Duration,
        debounce_window: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let path = path.clone();
            thread::Builder::new()
                .name("replug-watch".into())
                .spawn(move || {
                    poll_loop(&path, generation, &events, &stop, poll_interval, debounce_window);
                })
                .ok()
        };
        Self {
            stop,
            thread,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Signal the poll loop to exit and wait for it to do so.
    ///
    /// Returns `true` once the thread is gone, which makes it safe for the
    /// caller to delete the watched resource. `false` means the loop was
    /// still running when the timeout lapsed.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return true;
        };
        thread.thread().unpark();

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        thread.join().is_ok()
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
        }
    }
}

fn poll_loop(
    path: &Path,
    generation: u64,
    events: &Sender<WatcherEvent>,
    stop: &AtomicBool,
    poll_interval: Duration,
    debounce_window: Duration,
) {
    let mut last_seen = latest_modification(path);
    let mut armed_at: Option<Instant> = None;

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        // Scan errors count as "no change this tick".
        match latest_modification(path) {
            Some(current) => match last_seen {
                Some(previous) if current > previous => {
                    last_seen = Some(current);
                    armed_at = Some(Instant::now());
                    debug!(
                        path = %path.display(),
                        "module change detected, waiting for writes to settle"
                    );
                }
                None => last_seen = Some(current),
                _ => {}
            },
            None => {}
        }

        if let Some(t0) = armed_at {
            if t0.elapsed() >= debounce_window {
                debug!(path = %path.display(), "module change settled");
                if events
                    .send(WatcherEvent::ModuleChanged { generation })
                    .is_err()
                {
                    return;
                }
                armed_at = None;
            }
        }

        if stop.load(Ordering::SeqCst) {
            return;
        }
        thread::park_timeout(poll_interval);
    }
}

/// Newest modification time across the path itself and all of its
/// descendants.
fn latest_modification(path: &Path) -> Option<SystemTime> {
    let mut latest = fs::metadata(path).ok()?.modified().ok()?;
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) {
            if modified > latest {
                latest = modified;
            }
        }
    }
    Some(latest)
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;

    use crossbeam_channel::unbounded;
    use tempfile::tempdir;

    use super::*;

    const TEST_POLL: Duration = Duration::from_millis(20);
    const TEST_DEBOUNCE: Duration = Duration::from_millis(80);

    fn touch(path: &Path, contents: &str) {
        let mut file = File::create(path).unwrap();
        write!(file, "{contents}").unwrap();
    }

    #[test]
    fn reports_a_change_inside_a_bundle() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("Synth.replug");
        fs::create_dir_all(bundle.join("Contents")).unwrap();
        let binary = bundle.join("Contents/synth.so");
        touch(&binary, "v1");

        let (tx, rx) = unbounded();
        let watcher =
            ChangeWatcher::spawn_with_timing(bundle.clone(), 7, tx, TEST_POLL, TEST_DEBOUNCE);

        // Let the watcher take its baseline scan before modifying anything.
        thread::sleep(TEST_POLL * 2);
        touch(&binary, "v2");

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event, WatcherEvent::ModuleChanged { generation: 7 });

        assert!(watcher.stop(STOP_TIMEOUT));
    }

    #[test]
    fn burst_of_writes_collapses_into_one_notification() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("synth.replug");
        touch(&module, "v1");

        let (tx, rx) = unbounded();
        let watcher =
            ChangeWatcher::spawn_with_timing(module.clone(), 1, tx, TEST_POLL, TEST_DEBOUNCE);

        thread::sleep(TEST_POLL * 2);
        for revision in 0..5 {
            touch(&module, &format!("v{revision}"));
            thread::sleep(Duration::from_millis(10));
        }

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        // No second notification for the same burst.
        assert!(rx.recv_timeout(TEST_DEBOUNCE * 3).is_err());

        assert!(watcher.stop(STOP_TIMEOUT));
    }

    #[test]
    fn does_not_fire_before_the_debounce_window() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("synth.replug");
        touch(&module, "v1");

        let (tx, rx) = unbounded();
        let watcher = ChangeWatcher::spawn_with_timing(
            module.clone(),
            1,
            tx,
            TEST_POLL,
            Duration::from_millis(300),
        );

        thread::sleep(TEST_POLL * 2);
        touch(&module, "v2");

        // Well inside the debounce window there must be nothing yet.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

        assert!(watcher.stop(STOP_TIMEOUT));
    }

    #[test]
    fn stop_prevents_any_further_notification() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("synth.replug");
        touch(&module, "v1");

        let (tx, rx) = unbounded();
        let watcher =
            ChangeWatcher::spawn_with_timing(module.clone(), 1, tx, TEST_POLL, TEST_DEBOUNCE);

        thread::sleep(TEST_POLL * 2);
        touch(&module, "v2");
        assert!(watcher.stop(STOP_TIMEOUT));

        assert!(rx.recv_timeout(TEST_DEBOUNCE * 3).is_err());
    }

    #[test]
    fn unchanged_tree_stays_quiet() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("synth.replug");
        touch(&module, "v1");

        let (tx, rx) = unbounded();
        let watcher =
            ChangeWatcher::spawn_with_timing(module.clone(), 1, tx, TEST_POLL, TEST_DEBOUNCE);

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert!(watcher.stop(STOP_TIMEOUT));
    }
}
