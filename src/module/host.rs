//! Host-side view of native modules

use std::collections::HashMap;

use crate::interop::MethodSignature;

/// Native function a module exposes to scripts
#[derive(Debug, Clone)]
pub struct NativeMethod {
    pub signature: MethodSignature,
    pub address: usize,
}

/// Named set of native functions resolvable through `require`
#[derive(Debug, Clone, Default)]
pub struct NativeModule {
    pub name: String,
    pub methods: Vec<NativeMethod>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, signature: MethodSignature, address: usize) -> Self {
        self.methods.push(NativeMethod { signature, address });
        self
    }
}

/// Services the embedding host provides to the language module
pub trait Host {
    /// Native module registered under `name`, if any
    fn find_module(&self, name: &str) -> Option<NativeModule>;
}

/// Host backed by a fixed table of modules
#[derive(Debug, Default)]
pub struct StaticHost {
    modules: HashMap<String, NativeModule>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: NativeModule) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn with_module(mut self, module: NativeModule) -> Self {
        self.register(module);
        self
    }
}

impl Host for StaticHost {
    fn find_module(&self, name: &str) -> Option<NativeModule> {
        self.modules.get(name).cloned()
    }
}
