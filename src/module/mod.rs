//! Language module - the Lua side of the plugin host
//!
//! Design: one `LanguageModule` owns one script context. The host resolves
//! native modules through the `Host` trait when scripts `require` them;
//! plugins are Lua classes constructed from a manifest, whose declared
//! methods are exported as native entry points.
//!
//! Architecture:
//! - `host.rs` - `Host` trait, `NativeModule`, `StaticHost`
//! - `native.rs` - module tables, enums, the `require` hook, lib directory
//! - `plugin.rs` - manifests, entry points, load and lifecycle hooks

mod host;
mod native;
mod plugin;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use mlua::{Function, Lua, RegistryKey, Table};

pub use host::{Host, NativeMethod, NativeModule, StaticHost};
pub use plugin::{EntryPoint, ExportedMethod, LoadedPlugin, PluginDescriptor};

use crate::config::ModuleConfig;
use crate::context::{ContextError, ScriptContext};
use crate::logging;
use plugin::{Hook, PluginState};

#[derive(Debug)]
pub enum ModuleError {
    Context(ContextError),
    Script(mlua::Error),
    Io { path: PathBuf, message: String },
    Manifest(String),
    LibDirMissing(PathBuf),
    InvalidEntryPoint { entry: String, reason: &'static str },
    FileNotFound(PathBuf),
    Execution { path: PathBuf, source: mlua::Error },
    MissingTable { module: String },
    MissingClass { class: String },
    MissingConstructor { class: String },
    Constructor { class: String, message: String },
    InvalidInstance { class: String },
    InvalidMethods(Vec<String>),
    DuplicatePlugin(u64),
    PluginNotFound(u64),
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(e) => write!(f, "{}", e),
            Self::Script(e) => write!(f, "script error: {}", e),
            Self::Io { path, message } => write!(f, "{}: {}", path.display(), message),
            Self::Manifest(msg) => write!(f, "invalid plugin manifest: {}", msg),
            Self::LibDirMissing(path) => {
                write!(f, "lib directory '{}' does not exist", path.display())
            }
            Self::InvalidEntryPoint { entry, reason } => {
                write!(f, "invalid entry point '{}': {}", entry, reason)
            }
            Self::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            Self::Execution { path, source } => {
                write!(f, "failed to execute '{}': {}", path.display(), source)
            }
            Self::MissingTable { module } => {
                write!(f, "failed to find module table '{}'", module)
            }
            Self::MissingClass { class } => write!(f, "failed to find class '{}'", class),
            Self::MissingConstructor { class } => {
                write!(f, "class '{}' has no 'new' function", class)
            }
            Self::Constructor { class, message } => {
                write!(f, "failed to construct '{}': {}", class, message)
            }
            Self::InvalidInstance { class } => {
                write!(f, "'{}.new' did not return a table", class)
            }
            Self::InvalidMethods(errors) => {
                write!(f, "invalid methods:")?;
                for line in errors {
                    write!(f, "\n{}", line)?;
                }
                Ok(())
            }
            Self::DuplicatePlugin(id) => write!(f, "plugin {} is already loaded", id),
            Self::PluginNotFound(id) => write!(f, "plugin {} is not loaded", id),
        }
    }
}

impl std::error::Error for ModuleError {}

impl From<ContextError> for ModuleError {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

impl From<mlua::Error> for ModuleError {
    fn from(e: mlua::Error) -> Self {
        Self::Script(e)
    }
}

struct ModuleInner {
    ctx: ScriptContext,
    host: Rc<dyn Host>,
    config: ModuleConfig,
    original_require: RegistryKey,
    plugins: RefCell<HashMap<u64, PluginState>>,
    exposed: RefCell<HashSet<String>>,
}

/// Lua language module: one interpreter serving many plugins
pub struct LanguageModule {
    inner: Rc<ModuleInner>,
}

impl LanguageModule {
    /// Create the interpreter, register libraries and hook `require`
    pub fn initialize(config: ModuleConfig, host: Rc<dyn Host>) -> Result<Self, ModuleError> {
        logging::init_with_config(config.log.to_log_config());

        let lua = Lua::new();
        let libraries = match &config.lib_dir {
            Some(dir) => native::register_libraries(&lua, dir)?,
            None => 0,
        };
        logging::log_module_init(config.lib_dir.as_deref(), libraries);

        let ctx = ScriptContext::with_struct_module(lua, &config.struct_module)?;
        let original: Function = ctx.lua().globals().get("require")?;
        let original_require = ctx.lua().create_registry_value(original.clone())?;

        let inner = Rc::new(ModuleInner {
            ctx,
            host,
            config,
            original_require,
            plugins: RefCell::new(HashMap::new()),
            exposed: RefCell::new(HashSet::new()),
        });
        native::install_require_hook(&inner, original)?;

        Ok(Self { inner })
    }

    #[inline]
    pub fn context(&self) -> &ScriptContext {
        &self.inner.ctx
    }

    #[inline]
    pub fn lua(&self) -> &Lua {
        self.inner.ctx.lua()
    }

    /// Make a native module's functions callable from scripts
    pub fn expose_module(&self, module: &NativeModule) -> Result<Table, ModuleError> {
        let _perf = logging::perf::track("expose_module");
        native::expose_module(&self.inner, module)
    }

    pub fn load_plugin(&self, plugin: &PluginDescriptor) -> Result<LoadedPlugin, ModuleError> {
        if self.inner.plugins.borrow().contains_key(&plugin.id) {
            return Err(ModuleError::DuplicatePlugin(plugin.id));
        }
        let (loaded, state) = plugin::load(&self.inner, plugin)?;
        self.inner.plugins.borrow_mut().insert(plugin.id, state);
        Ok(loaded)
    }

    pub fn start_plugin(&self, id: u64) -> Result<(), ModuleError> {
        plugin::call_hook(&self.inner, id, Hook::Start, None)
    }

    /// `dt` is the frame time in seconds
    pub fn update_plugin(&self, id: u64, dt: f64) -> Result<(), ModuleError> {
        plugin::call_hook(&self.inner, id, Hook::Update, Some(dt))
    }

    /// Run `plugin_end`, then release the instance and its exported methods
    pub fn end_plugin(&self, id: u64) -> Result<(), ModuleError> {
        plugin::call_hook(&self.inner, id, Hook::End, None)?;
        let state = self.inner.plugins.borrow_mut().remove(&id);
        if let Some(state) = state {
            for address in &state.exported {
                self.inner.ctx.release_function(*address);
            }
            logging::log_plugin_event(&state.name, "ended");
        }
        Ok(())
    }

    pub fn is_loaded(&self, id: u64) -> bool {
        self.inner.plugins.borrow().contains_key(&id)
    }

    /// Restore `require`, drop every plugin and end the context
    pub fn shutdown(self) -> Result<(), ModuleError> {
        let lua = self.inner.ctx.lua();
        let original: Function = lua.registry_value(&self.inner.original_require)?;
        lua.globals().set("require", original)?;

        self.inner.plugins.borrow_mut().clear();
        self.inner.exposed.borrow_mut().clear();
        self.inner.ctx.shutdown();
        Ok(())
    }
}
