use crate::{ModulePlugin, PluginDescriptor};

/// Symbol name resolved by hosts when loading a Replug module.
pub const MODULE_ENTRYPOINT: &[u8] = b"replug_module_entrypoint";

/// Factory registered by a module for one plugin it can build.
pub trait PluginFactory: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;
    fn create(&self) -> Box<dyn ModulePlugin>;
}

/// Set of factories a module exposes to hosts.
pub struct PluginModule {
    factories: Vec<Box<dyn PluginFactory>>,
}

impl PluginModule {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn register_factory(&mut self, factory: Box<dyn PluginFactory>) -> &mut Self {
        self.factories.push(factory);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PluginFactory> {
        self.factories.iter().map(|factory| factory.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn into_factories(self) -> Vec<Box<dyn PluginFactory>> {
        self.factories
    }
}

impl Default for PluginModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Value returned by a module's entry point.
pub struct ModuleExport {
    module: PluginModule,
}

impl ModuleExport {
    pub fn new(module: PluginModule) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &PluginModule {
        &self.module
    }

    pub fn into_module(self) -> PluginModule {
        self.module
    }
}
