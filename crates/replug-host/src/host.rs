use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use replug_sdk::{
    AudioBuffer, AudioProcessor, BufferConfig, ChannelLayout, EditorUi, HostLink, MidiEvent,
    ModulePlugin, PluginDescriptor, StateSerializable,
};

use crate::editor::{EditorEmbedder, NullEmbedder};
use crate::error::HostError;
use crate::loader::{LoadedModule, ModuleLoader};
use crate::runtime::{RuntimeContext, RuntimeGuard};
use crate::temp::{default_temp_root, TempCopy, TempCopyManager};
use crate::watcher::{ChangeWatcher, WatcherEvent, DEBOUNCE_WINDOW, POLL_INTERVAL, STOP_TIMEOUT};

/// File extension of loadable modules.
pub const MODULE_EXTENSION: &str = "replug";

const SESSION_TAG: &str = "replug-session";
const SESSION_VERSION: u32 = 1;

/// Outcome of the most recent lifecycle operation.
///
/// Ephemeral: meant to be read and cleared by a UI poller via
/// [`HostWrapper::take_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Reloading,
    LoadSucceeded,
    ReloadSucceeded,
    LoadFailed,
    ReloadFailed,
}

/// Persisted session blob: a self-describing document carrying the original
/// module path and the wrapped plugin's opaque state.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    tag: String,
    version: u32,
    source_path: PathBuf,
    state_b64: String,
}

/// Runtime options for a [`HostWrapper`].
#[derive(Debug, Clone)]
pub struct WrapperOptions {
    pub temp_root: PathBuf,
    pub config: BufferConfig,
    pub watcher_poll: Duration,
    pub watcher_debounce: Duration,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            config: BufferConfig::default(),
            watcher_poll: POLL_INTERVAL,
            watcher_debounce: DEBOUNCE_WINDOW,
        }
    }
}

type InstanceSlot = Arc<Mutex<Option<LoadedModule>>>;

/// Audio-thread handle onto the wrapper's instance slot.
///
/// The handle owns its own scratch buffer, so hosts that process on a
/// dedicated real-time thread can forward blocks without touching the wrapper
/// itself.
pub struct ProcessHandle {
    slot: InstanceSlot,
    scratch: AudioBuffer,
}

impl ProcessHandle {
    /// Forward one block of audio and MIDI to the wrapped instance, or render
    /// silence when nothing is loaded.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer, midi: &[MidiEvent]) {
        forward_block(&self.slot, &mut self.scratch, buffer, midi);
    }
}

fn forward_block(
    slot: &InstanceSlot,
    scratch: &mut AudioBuffer,
    buffer: &mut AudioBuffer,
    midi: &[MidiEvent],
) {
    let mut guard = slot.lock();
    let Some(loaded) = guard.as_mut() else {
        // Without an instance the buffer is silenced rather than passed
        // through; stale input must never reach the output.
        buffer.clear();
        return;
    };
    let plugin = loaded.plugin_mut();

    // Processing errors are dropped on the audio path.
    if !midi.is_empty() {
        let _ = plugin.process_midi(midi);
    }

    let frames = buffer.len();
    if buffer.channel_count() == 1 && plugin.layout() == ChannelLayout::Stereo {
        // Mono host buffer into a stereo instance: duplicate the mono channel
        // into a scratch pair, process, and take channel 0 back. The
        // instance's right channel is dropped on the way out.
        scratch.resize(2, frames);
        scratch.channel_mut(0).copy_from_slice(buffer.channel(0));
        scratch.channel_mut(1).copy_from_slice(buffer.channel(0));
        let _ = plugin.process(scratch);
        buffer.channel_mut(0).copy_from_slice(scratch.channel(0));
    } else {
        let _ = plugin.process(buffer);
    }
}

/// Everything one loaded generation owns besides the instance itself.
struct WrappedHandle {
    source_path: PathBuf,
    temp_copy: TempCopy,
    editor: Option<Box<dyn EditorUi>>,
    link: HostLink,
}

/// The reload coordinator: owns the wrapped plugin's lifecycle and exposes
/// the whole assembly as a plugin in its own right.
///
/// All lifecycle operations (`load_plugin`, `unload_plugin`, `pump_events`,
/// `set_state`) must run on the thread that owns the wrapper; the loader is
/// not safe to call anywhere else. The audio thread only ever touches the
/// instance slot, which is guarded by the audio-exclusion lock.
pub struct HostWrapper<L: ModuleLoader> {
    loader: L,
    temp: TempCopyManager,
    config: BufferConfig,
    slot: InstanceSlot,
    audio: ProcessHandle,
    handle: Option<WrappedHandle>,
    watcher: Option<ChangeWatcher>,
    watcher_tx: Sender<WatcherEvent>,
    watcher_rx: Receiver<WatcherEvent>,
    watcher_poll: Duration,
    watcher_debounce: Duration,
    embedder: Box<dyn EditorEmbedder>,
    outer_link: Option<HostLink>,
    status: Option<LoadStatus>,
    generation: u64,
    _runtime: RuntimeGuard,
}

impl<L: ModuleLoader> HostWrapper<L> {
    pub fn new(loader: L) -> Self {
        Self::with_options(loader, WrapperOptions::default())
    }

    pub fn with_options(loader: L, options: WrapperOptions) -> Self {
        let slot: InstanceSlot = Arc::new(Mutex::new(None));
        let (watcher_tx, watcher_rx) = unbounded();
        Self {
            loader,
            temp: TempCopyManager::new(options.temp_root),
            config: options.config,
            audio: ProcessHandle {
                slot: Arc::clone(&slot),
                scratch: AudioBuffer::default(),
            },
            slot,
            handle: None,
            watcher: None,
            watcher_tx,
            watcher_rx,
            watcher_poll: options.watcher_poll,
            watcher_debounce: options.watcher_debounce,
            embedder: Box::new(NullEmbedder),
            outer_link: None,
            status: None,
            generation: 0,
            _runtime: RuntimeContext::global().acquire(),
        }
    }

    /// Install the UI surface the wrapper mounts wrapped editors onto.
    pub fn set_editor_embedder(&mut self, embedder: Box<dyn EditorEmbedder>) {
        self.embedder = embedder;
    }

    /// Fresh audio-thread handle sharing this wrapper's instance slot.
    pub fn process_handle(&self) -> ProcessHandle {
        ProcessHandle {
            slot: Arc::clone(&self.slot),
            scratch: AudioBuffer::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Original (pre-copy) path of the currently wrapped module.
    pub fn source_path(&self) -> Option<&Path> {
        self.handle.as_ref().map(|handle| handle.source_path.as_path())
    }

    /// Temp-copy location backing the current instance.
    pub fn temp_copy_path(&self) -> Option<&Path> {
        self.handle.as_ref().map(|handle| handle.temp_copy.dir())
    }

    /// Path currently monitored for on-disk changes.
    pub fn watched_path(&self) -> Option<&Path> {
        self.watcher.as_ref().map(ChangeWatcher::path)
    }

    /// Descriptor of the wrapped plugin, if one is loaded.
    pub fn wrapped_descriptor(&self) -> Option<PluginDescriptor> {
        let guard = self.slot.lock();
        guard.as_ref().map(|loaded| loaded.plugin().descriptor())
    }

    /// Channel layout the wrapped instance actually configured.
    pub fn wrapped_layout(&self) -> Option<ChannelLayout> {
        let guard = self.slot.lock();
        guard.as_ref().map(|loaded| loaded.plugin().layout())
    }

    /// Latency the wrapper reports to its own host, mirrored from the wrapped
    /// instance's notification link.
    pub fn latency_samples(&self) -> u32 {
        self.handle
            .as_ref()
            .map(|handle| handle.link.latency_samples())
            .unwrap_or(0)
    }

    /// Read and clear the outcome of the most recent lifecycle operation.
    pub fn take_status(&mut self) -> Option<LoadStatus> {
        self.status.take()
    }

    /// Load or reload the module at `path`.
    ///
    /// This is the failure boundary: every error is converted into `false`
    /// plus a status for the UI poller, and a failed reload leaves the
    /// previous instance fully operative with monitoring restarted.
    pub fn load_plugin(&mut self, path: &Path) -> bool {
        let reloading = self
            .handle
            .as_ref()
            .is_some_and(|handle| handle.source_path == path);
        self.status = Some(if reloading {
            LoadStatus::Reloading
        } else {
            LoadStatus::Loading
        });

        // A load in progress must never be observed as a change, and two
        // reloads must never overlap.
        let was_watching = self.stop_watcher();

        match self.try_load(path, reloading) {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    reloading,
                    "wrapped module is live"
                );
                self.status = Some(if reloading {
                    LoadStatus::ReloadSucceeded
                } else {
                    LoadStatus::LoadSucceeded
                });
                self.publish_latency();
                true
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    reloading,
                    "failed to load module"
                );
                if was_watching {
                    // Monitoring resumes on the module that is still live.
                    if let Some(previous) = self
                        .handle
                        .as_ref()
                        .map(|handle| handle.source_path.clone())
                    {
                        self.start_watcher(previous);
                    }
                }
                self.status = Some(if reloading {
                    LoadStatus::ReloadFailed
                } else {
                    LoadStatus::LoadFailed
                });
                false
            }
        }
    }

    fn try_load(&mut self, path: &Path, reloading: bool) -> Result<(), HostError> {
        let copy = self.temp.copy_to_temp(path)?;

        let mut loaded = match self.instantiate_from_copy(&copy) {
            Ok(loaded) => loaded,
            Err(err) => {
                let _ = self.temp.remove(&copy);
                return Err(err);
            }
        };

        // State continuity across a rebuild is best effort; a plugin whose
        // serialization misbehaves still gets reloaded.
        if reloading {
            let outgoing_state = {
                let guard = self.slot.lock();
                guard.as_ref().map(|current| current.plugin().save_state())
            };
            match outgoing_state {
                Some(Ok(state)) => {
                    if let Err(err) = loaded.plugin_mut().load_state(&state) {
                        warn!(error = %err, "incoming instance rejected carried-over state");
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "could not capture outgoing instance state");
                }
                None => {}
            }
        }

        // The outgoing editor leaves the UI before its instance goes away.
        if let Some(handle) = self.handle.as_mut() {
            if handle.editor.take().is_some() {
                if let Err(err) = self.embedder.detach() {
                    warn!(error = %err, "failed to detach outgoing editor");
                }
            }
        }

        // The incoming instance is still exclusively ours here, so the link
        // and editor are set up without holding the audio lock.
        let link = HostLink::new();
        link.set_latency_samples(loaded.plugin().latency_samples());
        loaded.plugin_mut().connect_host(link.clone());
        let editor = loaded.plugin_mut().create_editor();

        // The swap itself is the only step the audio thread can race; the
        // audio-exclusion lock makes it atomic with respect to processing.
        let previous_module = {
            let mut guard = self.slot.lock();
            guard.replace(loaded)
        };
        let previous_handle = self.handle.take();
        self.generation += 1;

        // Teardown happens off the lock, and the stale copy is deleted only
        // once its instance is gone.
        drop(previous_module);
        if let Some(previous) = previous_handle {
            if let Err(err) = self.temp.remove(&previous.temp_copy) {
                warn!(
                    path = %previous.temp_copy.dir().display(),
                    error = %err,
                    "failed to delete superseded module copy"
                );
            }
        }

        let mut handle = WrappedHandle {
            source_path: path.to_path_buf(),
            temp_copy: copy,
            editor,
            link,
        };
        if let Some(editor) = handle.editor.as_deref() {
            if let Err(err) = self.embedder.attach(editor) {
                warn!(error = %err, "failed to attach wrapped editor");
            }
        }
        self.handle = Some(handle);

        // Monitoring always targets the original path, not the temp copy.
        self.start_watcher(path.to_path_buf());
        Ok(())
    }

    fn instantiate_from_copy(&mut self, copy: &TempCopy) -> Result<LoadedModule, HostError> {
        let description = self.loader.describe(copy.module_path())?;
        let loaded = self.loader.instantiate(&description, &self.config)?;
        let layout = loaded.plugin().layout();
        if !matches!(layout, ChannelLayout::Mono | ChannelLayout::Stereo) {
            return Err(HostError::Instantiation(format!(
                "instance configured an unsupported channel layout: {layout:?}"
            )));
        }
        Ok(loaded)
    }

    /// Tear down the wrapped plugin and return to the idle state.
    ///
    /// Idempotent: unloading an idle wrapper is a no-op.
    pub fn unload_plugin(&mut self) {
        self.stop_watcher();
        if let Some(mut handle) = self.handle.take() {
            if handle.editor.take().is_some() {
                if let Err(err) = self.embedder.detach() {
                    warn!(error = %err, "failed to detach editor during unload");
                }
            }

            let previous_module = {
                let mut guard = self.slot.lock();
                guard.take()
            };
            drop(previous_module);

            if let Err(err) = self.temp.remove(&handle.temp_copy) {
                warn!(
                    path = %handle.temp_copy.dir().display(),
                    error = %err,
                    "failed to delete module copy during unload"
                );
            }
            info!(path = %handle.source_path.display(), "module unloaded");
        }
        self.generation += 1;
        self.status = Some(LoadStatus::Idle);
        self.publish_latency();
    }

    /// Drain pending watcher notifications and run any reload they request.
    ///
    /// This is the marshalling point between the watcher's background thread
    /// and the wrapper's owning thread; it must be called from the latter.
    pub fn pump_events(&mut self) {
        let mut reload: Option<PathBuf> = None;
        while let Ok(event) = self.watcher_rx.try_recv() {
            match event {
                WatcherEvent::ModuleChanged { generation } => {
                    if generation == self.generation {
                        reload = self
                            .handle
                            .as_ref()
                            .map(|handle| handle.source_path.clone());
                    } else {
                        debug!(generation, "dropping stale watcher notification");
                    }
                }
            }
        }
        if let Some(path) = reload {
            info!(path = %path.display(), "module changed on disk, reloading");
            self.load_plugin(&path);
        }
        self.publish_latency();
    }

    /// Forward one block of audio and MIDI, or render silence when idle.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer, midi: &[MidiEvent]) {
        self.audio.process_block(buffer, midi);
    }

    /// Produce the persisted session blob, or `None` when no module is
    /// loaded or the wrapped instance cannot serialize itself.
    pub fn get_state(&self) -> Option<Vec<u8>> {
        let handle = self.handle.as_ref()?;
        let state = {
            let guard = self.slot.lock();
            match guard.as_ref()?.plugin().save_state() {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, "wrapped instance failed to serialize");
                    return None;
                }
            }
        };
        let document = SessionDocument {
            tag: SESSION_TAG.to_owned(),
            version: SESSION_VERSION,
            source_path: handle.source_path.clone(),
            state_b64: BASE64.encode(state),
        };
        match serde_json::to_vec(&document) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "failed to encode session document");
                None
            }
        }
    }

    /// Restore a previously persisted session blob.
    ///
    /// Unrecognized data is treated as absence of saved state and leaves the
    /// wrapper untouched. A recognized document whose module can no longer be
    /// loaded leaves the wrapper idle.
    pub fn set_state(&mut self, data: &[u8]) {
        let blob = match self.parse_session(data) {
            Ok(Some((source_path, blob))) => {
                self.unload_plugin();
                if !self.load_plugin(&source_path) {
                    return;
                }
                blob
            }
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "ignoring unrecognized session state");
                return;
            }
        };

        let mut guard = self.slot.lock();
        if let Some(loaded) = guard.as_mut() {
            if let Err(err) = loaded.plugin_mut().load_state(&blob) {
                warn!(error = %err, "restored instance rejected its saved state");
            }
        }
    }

    fn parse_session(&self, data: &[u8]) -> Result<Option<(PathBuf, Vec<u8>)>, HostError> {
        if data.is_empty() {
            return Ok(None);
        }
        let document: SessionDocument = serde_json::from_slice(data)
            .map_err(|err| HostError::InvalidState(err.to_string()))?;
        if document.tag != SESSION_TAG {
            return Err(HostError::InvalidState(format!(
                "unexpected document tag {:?}",
                document.tag
            )));
        }
        if document.version != SESSION_VERSION {
            return Err(HostError::InvalidState(format!(
                "unsupported document version {}",
                document.version
            )));
        }
        let blob = BASE64
            .decode(document.state_b64.as_bytes())
            .map_err(|err| HostError::InvalidState(err.to_string()))?;
        Ok(Some((document.source_path, blob)))
    }

    fn start_watcher(&mut self, path: PathBuf) {
        self.watcher = Some(ChangeWatcher::spawn_with_timing(
            path,
            self.generation,
            self.watcher_tx.clone(),
            self.watcher_poll,
            self.watcher_debounce,
        ));
    }

    fn stop_watcher(&mut self) -> bool {
        match self.watcher.take() {
            Some(watcher) => {
                if !watcher.stop(STOP_TIMEOUT) {
                    warn!("change watcher did not stop within its timeout");
                }
                true
            }
            None => false,
        }
    }

    fn publish_latency(&self) {
        if let Some(outer) = &self.outer_link {
            outer.set_latency_samples(self.latency_samples());
        }
    }
}

impl<L: ModuleLoader> Drop for HostWrapper<L> {
    fn drop(&mut self) {
        self.unload_plugin();
    }
}

/// Descriptor the wrapper advertises to its own host.
pub fn wrapper_descriptor() -> PluginDescriptor {
    PluginDescriptor::new("dev.replug.wrapper", "Replug", "Replug Project")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_description("Hot-reloading wrapper around a single Replug module")
}

impl<L: ModuleLoader + Send> AudioProcessor for HostWrapper<L> {
    fn descriptor(&self) -> PluginDescriptor {
        wrapper_descriptor()
    }

    fn prepare(&mut self, config: &BufferConfig) -> anyhow::Result<()> {
        self.config = config.clone();
        let mut guard = self.slot.lock();
        if let Some(loaded) = guard.as_mut() {
            loaded.plugin_mut().prepare(config)?;
        }
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> anyhow::Result<()> {
        self.audio.process_block(buffer, &[]);
        Ok(())
    }

    fn process_midi(&mut self, events: &[MidiEvent]) -> anyhow::Result<()> {
        let mut guard = self.slot.lock();
        if let Some(loaded) = guard.as_mut() {
            loaded.plugin_mut().process_midi(events)?;
        }
        Ok(())
    }

    fn layout(&self) -> ChannelLayout {
        self.config.layout
    }

    fn supports_layout(&self, layout: ChannelLayout) -> bool {
        // Mono or stereo, with input matching output; a single negotiated
        // layout models both sides.
        matches!(layout, ChannelLayout::Mono | ChannelLayout::Stereo)
    }

    fn latency_samples(&self) -> u32 {
        HostWrapper::latency_samples(self)
    }
}

impl<L: ModuleLoader + Send> StateSerializable for HostWrapper<L> {
    fn save_state(&self) -> anyhow::Result<Vec<u8>> {
        // Callers must tolerate empty state; an idle wrapper has nothing to
        // persist.
        Ok(self.get_state().unwrap_or_default())
    }

    fn load_state(&mut self, state: &[u8]) -> anyhow::Result<()> {
        self.set_state(state);
        Ok(())
    }
}

impl<L: ModuleLoader + Send> ModulePlugin for HostWrapper<L> {
    fn connect_host(&mut self, link: HostLink) {
        link.set_latency_samples(HostWrapper::latency_samples(self));
        self.outer_link = Some(link);
    }
}
