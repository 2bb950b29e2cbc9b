use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::editor::EditorMount;
use crate::host::{HostWrapper, LoadStatus, MODULE_EXTENSION};
use crate::loader::ModuleLoader;

/// How long a status message stays visible before it clears itself.
pub const STATUS_DISPLAY_DURATION: Duration = Duration::from_millis(2000);

/// UI surface able to receive dragged files.
pub trait FileDropTarget {
    fn is_interested_in_drag(&self, paths: &[PathBuf]) -> bool;
    fn drag_entered(&mut self) {}
    fn drag_exited(&mut self) {}
}

struct StatusLine {
    message: &'static str,
    shown_at: Instant,
}

/// Toolkit-independent logic behind the wrapper's own editor window.
///
/// The shell accepts dropped modules, offers browse/unload affordances, and
/// runs the transient status strip. Rendering is left to whichever widget
/// toolkit embeds it; everything here is plain state.
pub struct EditorShell {
    mount: EditorMount,
    drag_active: bool,
    status: Option<StatusLine>,
    status_display: Duration,
}

impl EditorShell {
    pub fn new() -> Self {
        Self {
            mount: EditorMount::new(),
            drag_active: false,
            status: None,
            status_display: STATUS_DISPLAY_DURATION,
        }
    }

    pub fn with_status_display(mut self, duration: Duration) -> Self {
        self.status_display = duration;
        self
    }

    /// Hand the shell's editor mount to the wrapper so reloads re-attach the
    /// wrapped editor here.
    pub fn install<L: ModuleLoader>(&self, wrapper: &mut HostWrapper<L>) {
        wrapper.set_editor_embedder(Box::new(self.mount.clone()));
    }

    pub fn mount(&self) -> &EditorMount {
        &self.mount
    }

    /// Whether a wrapped editor is currently showing, and at what size.
    pub fn embedded_editor_size(&self) -> Option<[u32; 2]> {
        self.mount.editor_size()
    }

    pub fn drag_active(&self) -> bool {
        self.drag_active
    }

    /// Handle a completed file drop.
    pub fn files_dropped<L: ModuleLoader>(
        &mut self,
        wrapper: &mut HostWrapper<L>,
        paths: &[PathBuf],
    ) {
        self.drag_active = false;
        if !self.is_interested_in_drag(paths) {
            return;
        }
        wrapper.load_plugin(&paths[0]);
    }

    /// Double-click-to-browse is only offered while nothing is loaded, so the
    /// affordance never interferes with an active plugin's own UI.
    pub fn allow_browse<L: ModuleLoader>(&self, wrapper: &HostWrapper<L>) -> bool {
        !wrapper.is_loaded()
    }

    /// A path picked through the browse dialog.
    pub fn browse_selected<L: ModuleLoader>(
        &mut self,
        wrapper: &mut HostWrapper<L>,
        path: &Path,
    ) {
        if self.allow_browse(wrapper) && has_module_extension(path) {
            wrapper.load_plugin(path);
        }
    }

    /// The header bar's unload button.
    pub fn unload_clicked<L: ModuleLoader>(&mut self, wrapper: &mut HostWrapper<L>) {
        wrapper.unload_plugin();
    }

    /// Poll the wrapper's status and expire stale messages. Call this from
    /// the UI tick; returns the message the status strip should show.
    pub fn poll_status<L: ModuleLoader>(
        &mut self,
        wrapper: &mut HostWrapper<L>,
    ) -> Option<&'static str> {
        if let Some(message) = wrapper.take_status().and_then(status_text) {
            self.status = Some(StatusLine {
                message,
                shown_at: Instant::now(),
            });
        }
        self.visible_message()
    }

    /// The message the status strip should currently show, if any.
    pub fn visible_message(&mut self) -> Option<&'static str> {
        if let Some(line) = &self.status {
            if line.shown_at.elapsed() >= self.status_display {
                self.status = None;
            }
        }
        self.status.as_ref().map(|line| line.message)
    }
}

impl Default for EditorShell {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDropTarget for EditorShell {
    /// Exactly one file, and it has to look like a module.
    fn is_interested_in_drag(&self, paths: &[PathBuf]) -> bool {
        match paths {
            [single] => has_module_extension(single),
            _ => false,
        }
    }

    fn drag_entered(&mut self) {
        self.drag_active = true;
    }

    fn drag_exited(&mut self) {
        self.drag_active = false;
    }
}

fn has_module_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(MODULE_EXTENSION))
        .unwrap_or(false)
}

fn status_text(status: LoadStatus) -> Option<&'static str> {
    match status {
        LoadStatus::Idle => Some("Plugin unloaded"),
        LoadStatus::Loading => Some("Loading plugin..."),
        LoadStatus::Reloading => Some("Reloading plugin..."),
        LoadStatus::LoadSucceeded => Some("Plugin loaded"),
        LoadStatus::ReloadSucceeded => Some("Plugin reloaded"),
        LoadStatus::LoadFailed => Some("Failed to load plugin"),
        LoadStatus::ReloadFailed => Some("Failed to reload plugin"),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn drop_predicate_requires_exactly_one_module_file() {
        let shell = EditorShell::new();

        assert!(shell.is_interested_in_drag(&[PathBuf::from("/plugins/Synth.replug")]));
        assert!(shell.is_interested_in_drag(&[PathBuf::from("/plugins/SYNTH.REPLUG")]));

        assert!(!shell.is_interested_in_drag(&[]));
        assert!(!shell.is_interested_in_drag(&[
            PathBuf::from("/plugins/a.replug"),
            PathBuf::from("/plugins/b.replug"),
        ]));
        assert!(!shell.is_interested_in_drag(&[PathBuf::from("/plugins/Synth.vst3")]));
        assert!(!shell.is_interested_in_drag(&[PathBuf::from("/plugins/replug")]));
    }

    #[test]
    fn drag_flag_follows_enter_and_exit() {
        let mut shell = EditorShell::new();
        assert!(!shell.drag_active());
        shell.drag_entered();
        assert!(shell.drag_active());
        shell.drag_exited();
        assert!(!shell.drag_active());
    }

    #[test]
    fn status_messages_expire_after_the_display_window() {
        let mut shell =
            EditorShell::new().with_status_display(Duration::from_millis(30));
        shell.status = Some(StatusLine {
            message: "Plugin loaded",
            shown_at: Instant::now(),
        });

        assert_eq!(shell.visible_message(), Some("Plugin loaded"));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(shell.visible_message(), None);
    }
}
