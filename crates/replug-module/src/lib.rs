//! Host integration shim: exposes the Replug wrapper as a plugin module.
//!
//! Hosts that speak the Replug module ABI can load this cdylib like any other
//! module; the factory hands them a fresh [`HostWrapper`] that forwards
//! everything to whichever module the user drops onto it.

use replug_host::{wrapper_descriptor, DylibLoader, HostWrapper};
use replug_sdk::{declare_replug_module, ModulePlugin, PluginDescriptor, PluginFactory};

/// Build a fresh wrapper with the production loader.
pub fn create_wrapper() -> HostWrapper<DylibLoader> {
    HostWrapper::new(DylibLoader)
}

pub struct WrapperFactory;

impl PluginFactory for WrapperFactory {
    fn descriptor(&self) -> PluginDescriptor {
        wrapper_descriptor()
    }

    fn create(&self) -> Box<dyn ModulePlugin> {
        Box::new(create_wrapper())
    }
}

declare_replug_module!(WrapperFactory);
