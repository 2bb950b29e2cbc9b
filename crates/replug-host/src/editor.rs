use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use replug_sdk::EditorUi;

/// Abstraction for mounting a wrapped plugin's editor inside the embedding
/// application's UI.
pub trait EditorEmbedder: Send {
    fn attach(&mut self, editor: &dyn EditorUi) -> Result<()>;
    fn detach(&mut self) -> Result<()>;
}

/// Embedder for headless hosts; attach and detach are accepted silently.
#[derive(Debug, Default)]
pub struct NullEmbedder;

impl EditorEmbedder for NullEmbedder {
    fn attach(&mut self, _editor: &dyn EditorUi) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MountState {
    attached: bool,
    size: [u32; 2],
}

/// Shared mount point connecting the wrapper and its editor shell.
///
/// The wrapper drives attach/detach during loads; the shell keeps a clone to
/// learn whether an editor is showing and how big the surrounding window
/// needs to be.
#[derive(Debug, Clone, Default)]
pub struct EditorMount {
    state: Arc<Mutex<MountState>>,
}

impl EditorMount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Size of the currently mounted editor, if any.
    pub fn editor_size(&self) -> Option<[u32; 2]> {
        let state = self.state.lock();
        state.attached.then_some(state.size)
    }
}

impl EditorEmbedder for EditorMount {
    fn attach(&mut self, editor: &dyn EditorUi) -> Result<()> {
        let mut state = self.state.lock();
        state.attached = true;
        state.size = editor.size();
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.attached = false;
        state.size = [0, 0];
        Ok(())
    }
}
