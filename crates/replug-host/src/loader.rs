use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

use replug_sdk::{
    AudioProcessor, BufferConfig, ModuleExport, ModulePlugin, PluginDescriptor, MODULE_ENTRYPOINT,
};

use crate::error::HostError;

/// Description of the plugin a module offers, produced before instantiation.
#[derive(Debug, Clone)]
pub struct ModuleDescription {
    pub module_path: PathBuf,
    pub descriptor: PluginDescriptor,
}

/// A live plugin instance together with the library that backs it.
pub struct LoadedModule {
    // Field order is load-bearing: the plugin must drop before the library
    // whose code it executes.
    plugin: Box<dyn ModulePlugin>,
    _library: Option<Library>,
}

impl LoadedModule {
    /// Wrap an instance that does not originate from a dynamic library
    /// (in-process factories, test doubles).
    pub fn new(plugin: Box<dyn ModulePlugin>) -> Self {
        Self {
            plugin,
            _library: None,
        }
    }

    pub fn with_library(plugin: Box<dyn ModulePlugin>, library: Library) -> Self {
        Self {
            plugin,
            _library: Some(library),
        }
    }

    pub fn plugin(&self) -> &dyn ModulePlugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn ModulePlugin {
        self.plugin.as_mut()
    }
}

/// Factory abstraction over the module format.
///
/// Implementations may only be invoked from the thread that owns the host
/// wrapper; platform loaders are not safe to call from arbitrary threads.
pub trait ModuleLoader {
    /// Inspect the module at `path` without keeping it loaded.
    fn describe(&self, path: &Path) -> Result<ModuleDescription, HostError>;

    /// Build a prepared instance from a description. The channel layout in
    /// `config` is a request; callers re-read the instance's actual layout
    /// afterwards.
    fn instantiate(
        &self,
        description: &ModuleDescription,
        config: &BufferConfig,
    ) -> Result<LoadedModule, HostError>;
}

/// Loads `.replug` modules: cdylibs exporting `replug_module_entrypoint`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

type EntryFn = unsafe extern "C" fn() -> ModuleExport;

impl DylibLoader {
    /// Map the library and run its entry point.
    ///
    /// # Safety
    ///
    /// Loading a dynamic library runs arbitrary initialization code; callers
    /// must trust the module at `path`.
    unsafe fn open(path: &Path) -> Result<(Library, ModuleExport), String> {
        let library = Library::new(path).map_err(|err| err.to_string())?;
        let entry = library
            .get::<EntryFn>(MODULE_ENTRYPOINT)
            .map_err(|err| err.to_string())?;
        let export = entry();
        drop(entry);
        Ok((library, export))
    }
}

impl ModuleLoader for DylibLoader {
    fn describe(&self, path: &Path) -> Result<ModuleDescription, HostError> {
        if !path.exists() {
            return Err(HostError::ModuleNotFound(path.to_path_buf()));
        }
        let (_library, export) = unsafe { Self::open(path) }.map_err(|err| {
            debug!(path = %path.display(), error = %err, "module rejected by loader");
            HostError::ModuleNotFound(path.to_path_buf())
        })?;
        let module = export.into_module();
        let descriptor = module
            .iter()
            .next()
            .map(|factory| factory.descriptor())
            .ok_or_else(|| HostError::ModuleNotFound(path.to_path_buf()))?;
        Ok(ModuleDescription {
            module_path: path.to_path_buf(),
            descriptor,
        })
    }

    fn instantiate(
        &self,
        description: &ModuleDescription,
        config: &BufferConfig,
    ) -> Result<LoadedModule, HostError> {
        let path = &description.module_path;
        let (library, export) =
            unsafe { Self::open(path) }.map_err(HostError::Instantiation)?;
        let module = export.into_module();
        let factory = module
            .iter()
            .find(|factory| factory.descriptor().id == description.descriptor.id)
            .or_else(|| module.iter().next())
            .ok_or_else(|| {
                HostError::Instantiation(format!(
                    "module at {} exports no plugin factories",
                    path.display()
                ))
            })?;

        let mut plugin = factory.create();
        plugin
            .prepare(config)
            .map_err(|err| HostError::Instantiation(err.to_string()))?;
        drop(module);
        Ok(LoadedModule::with_library(plugin, library))
    }
}
