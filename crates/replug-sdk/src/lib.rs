//! Replug Module SDK
//! =================
//!
//! Contracts shared between Replug module authors and the Replug host
//! wrapper. A Replug module is a `cdylib` that exports a
//! [`replug_module_entrypoint`](declare_replug_module) returning a
//! [`PluginModule`] full of [`PluginFactory`] implementations. The host
//! instantiates plugins through those factories and talks to them through the
//! capability traits defined here: [`AudioProcessor`] for the real-time path,
//! [`StateSerializable`] for session persistence, and [`ModulePlugin`] for the
//! full module surface (editor creation, host notifications, programs).

mod buffer;
mod plugin;
mod registry;

pub use buffer::{AudioBuffer, BufferConfig, ChannelLayout};
pub use plugin::{
    AudioProcessor, EditorUi, HostLink, MidiEvent, ModulePlugin, PluginDescriptor,
    StateSerializable,
};
pub use registry::{ModuleExport, PluginFactory, PluginModule, MODULE_ENTRYPOINT};

/// Common imports for module authors.
pub mod prelude {
    pub use crate::{
        AudioBuffer, AudioProcessor, BufferConfig, ChannelLayout, EditorUi, HostLink, MidiEvent,
        ModuleExport, ModulePlugin, PluginDescriptor, PluginFactory, PluginModule,
        StateSerializable,
    };
}

/// Declare the entry point for a dynamic Replug module.
///
/// The macro expects one or more expressions that evaluate to types
/// implementing [`PluginFactory`]. Each factory will be registered within the
/// exported [`PluginModule`].
///
/// # Example
///
/// ```ignore
/// use replug_sdk::{declare_replug_module, PluginFactory};
///
/// struct MyFactory;
///
/// impl PluginFactory for MyFactory { /* ... */ }
///
/// declare_replug_module!(MyFactory);
/// ```
#[macro_export]
macro_rules! declare_replug_module {
    ($($factory:expr),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn replug_module_entrypoint() -> $crate::ModuleExport {
            let mut module = $crate::PluginModule::new();
            $(module.register_factory(Box::new($factory));)+
            $crate::ModuleExport::new(module)
        }
    };
}
