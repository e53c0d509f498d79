//! Plugin manifests, entry points and the load/lifecycle protocol

use std::fs;
use std::path::{Path, PathBuf};

use mlua::{Function, RegistryKey, Table, Value};
use serde::{Deserialize, Serialize};

use super::{ModuleError, ModuleInner};
use crate::interop::MethodSignature;
use crate::logging::{self, perf};

/// Plugin manifest as handed over by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub license: String,

    /// Directory the entry point is resolved against
    pub location: PathBuf,

    /// `path.to.file.ClassName`
    #[serde(rename = "entryPoint")]
    pub entry_point: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(rename = "exportedMethods", alias = "methods", default)]
    pub methods: Vec<MethodSignature>,
}

impl PluginDescriptor {
    pub fn from_json(text: &str) -> Result<Self, ModuleError> {
        serde_json::from_str(text).map_err(|e| ModuleError::Manifest(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ModuleError> {
        let text = fs::read_to_string(path).map_err(|e| ModuleError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }
}

/// Parsed `path.to.file.ClassName`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Dotted module path, `path.to.file`
    pub module: String,
    pub class: String,
}

impl EntryPoint {
    pub fn parse(entry: &str) -> Result<Self, ModuleError> {
        let invalid = |reason: &'static str| ModuleError::InvalidEntryPoint {
            entry: entry.to_string(),
            reason,
        };

        if entry.is_empty() {
            return Err(invalid("entry point is empty"));
        }
        if entry.contains(['/', '\\']) {
            return Err(invalid("entry point should not contain path separators, use dots"));
        }
        let Some((module, class)) = entry.rsplit_once('.') else {
            return Err(invalid("entry point should be 'path.to.file.ClassName'"));
        };
        if class.is_empty() {
            return Err(invalid("class name is empty"));
        }
        if module.is_empty() || module.split('.').any(str::is_empty) {
            return Err(invalid("module path is empty"));
        }

        Ok(Self {
            module: module.to_string(),
            class: class.to_string(),
        })
    }

    /// Script file under `location`
    pub fn file_path(&self, location: &Path) -> PathBuf {
        let mut path = location.to_path_buf();
        path.extend(self.module.split('.'));
        path.set_extension("lua");
        path
    }
}

/// Native entry point produced for one exported method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMethod {
    pub name: String,
    pub address: usize,
}

/// Result of a successful load
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub id: u64,
    pub methods: Vec<ExportedMethod>,
    pub has_start: bool,
    pub has_update: bool,
    pub has_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Hook {
    Start,
    Update,
    End,
}

impl Hook {
    pub(super) const fn name(self) -> &'static str {
        match self {
            Self::Start => "plugin_start",
            Self::Update => "plugin_update",
            Self::End => "plugin_end",
        }
    }
}

/// Live plugin instance and its pinned lifecycle hooks
pub(super) struct PluginState {
    pub(super) name: String,
    pub(super) instance: RegistryKey,
    /// Entry points handed to the host, released when the plugin ends
    pub(super) exported: Vec<usize>,
    start: Option<RegistryKey>,
    update: Option<RegistryKey>,
    end: Option<RegistryKey>,
}

impl PluginState {
    pub(super) fn hook(&self, hook: Hook) -> Option<&RegistryKey> {
        match hook {
            Hook::Start => self.start.as_ref(),
            Hook::Update => self.update.as_ref(),
            Hook::End => self.end.as_ref(),
        }
    }
}

pub(super) fn load(
    inner: &ModuleInner,
    plugin: &PluginDescriptor,
) -> Result<(LoadedPlugin, PluginState), ModuleError> {
    let _perf = perf::track("load_plugin");
    let lua = inner.ctx.lua();

    let entry = EntryPoint::parse(&plugin.entry_point)?;
    let path = entry.file_path(&plugin.location);
    if !path.is_file() {
        return Err(ModuleError::FileNotFound(path));
    }
    let source = fs::read_to_string(&path).map_err(|e| ModuleError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let result: Value = lua
        .load(source)
        .set_name(path.display().to_string())
        .eval()
        .map_err(|e| ModuleError::Execution {
            path: path.clone(),
            source: e,
        })?;

    let loaded: Table = lua.globals().get::<Table>("package")?.get("loaded")?;
    let module = match result {
        Value::Table(table) => table,
        _ => match loaded.get::<Value>(entry.module.as_str())? {
            Value::Table(table) => table,
            _ => return Err(ModuleError::MissingTable { module: entry.module }),
        },
    };
    loaded.set(entry.module.as_str(), module.clone())?;

    let Value::Table(class) = module.get::<Value>(entry.class.as_str())? else {
        return Err(ModuleError::MissingClass { class: entry.class });
    };
    let Value::Function(constructor) = class.get::<Value>("new")? else {
        return Err(ModuleError::MissingConstructor { class: entry.class });
    };

    let dependencies = lua.create_sequence_from(plugin.dependencies.iter().map(String::as_str))?;
    let instance: Value = constructor
        .call((
            class.clone(),
            plugin.id,
            plugin.name.as_str(),
            plugin.description.as_str(),
            plugin.version.as_str(),
            plugin.author.as_str(),
            plugin.website.as_str(),
            plugin.license.as_str(),
            plugin.location.display().to_string(),
            dependencies,
        ))
        .map_err(|e| ModuleError::Constructor {
            class: entry.class.clone(),
            message: e.to_string(),
        })?;
    let Value::Table(object) = &instance else {
        return Err(ModuleError::InvalidInstance { class: entry.class });
    };

    let hook = |name: &str| -> mlua::Result<Option<RegistryKey>> {
        match object.get::<Value>(name)? {
            Value::Function(f) => lua.create_registry_value(f).map(Some),
            _ => Ok(None),
        }
    };
    let start = hook(Hook::Start.name())?;
    let update = hook(Hook::Update.name())?;
    let end = hook(Hook::End.name())?;
    let instance_key = lua.create_registry_value(instance.clone())?;

    let methods = export_methods(inner, plugin, &module, object, &instance)?;

    let loaded_plugin = LoadedPlugin {
        id: plugin.id,
        methods,
        has_start: start.is_some(),
        has_update: update.is_some(),
        has_end: end.is_some(),
    };
    let exported = loaded_plugin.methods.iter().map(|m| m.address).collect();
    let state = PluginState {
        name: plugin.name.clone(),
        instance: instance_key,
        exported,
        start,
        update,
        end,
    };
    logging::log_plugin_event(&plugin.name, "loaded");
    Ok((loaded_plugin, state))
}

fn export_methods(
    inner: &ModuleInner,
    plugin: &PluginDescriptor,
    module: &Table,
    object: &Table,
    instance: &Value,
) -> Result<Vec<ExportedMethod>, ModuleError> {
    let ctx = &inner.ctx;
    let mut methods = Vec::with_capacity(plugin.methods.len());
    let mut errors = Vec::new();

    for signature in &plugin.methods {
        let scope = if signature.is_method() { object } else { module };
        let bound = match scope.get::<Value>(signature.method_name()) {
            Ok(bound) => bound,
            Err(e) => {
                errors.push(format!("{:>3}. {} {}", errors.len() + 1, signature.name, e));
                continue;
            }
        };

        let address = match &bound {
            Value::Function(_) if signature.is_method() => {
                ctx.bind_method(signature, instance, &bound)
            }
            Value::Function(_) => ctx.box_script_function(signature, &bound),
            _ => {
                errors.push(format!(
                    "{:>3}. {} not found '{}' in module",
                    errors.len() + 1,
                    signature.name,
                    signature.script_name()
                ));
                continue;
            }
        };

        match address {
            Ok(address) => methods.push(ExportedMethod {
                name: signature.name.clone(),
                address,
            }),
            Err(e) => errors.push(format!("{:>3}. {} {}", errors.len() + 1, signature.name, e)),
        }
    }

    if errors.is_empty() {
        return Ok(methods);
    }

    for method in &methods {
        ctx.release_function(method.address);
    }

    let limit = inner.config.max_export_errors.max(1);
    if errors.len() > limit {
        let hidden = errors.len() - limit;
        errors.truncate(limit);
        errors.push(format!("... and {} more", hidden));
    }
    Err(ModuleError::InvalidMethods(errors))
}

/// Call a lifecycle hook with the instance as `self`; failures are logged only
pub(super) fn call_hook(
    inner: &ModuleInner,
    id: u64,
    hook: Hook,
    extra: Option<f64>,
) -> Result<(), ModuleError> {
    let lua = inner.ctx.lua();
    let (name, instance, function) = {
        let plugins = inner.plugins.borrow();
        let state = plugins.get(&id).ok_or(ModuleError::PluginNotFound(id))?;
        let Some(key) = state.hook(hook) else {
            return Ok(());
        };
        (
            state.name.clone(),
            lua.registry_value::<Value>(&state.instance)?,
            lua.registry_value::<Function>(key)?,
        )
    };

    let outcome = match extra {
        Some(dt) => function.call::<()>((instance, dt)),
        None => function.call::<()>(instance),
    };
    match outcome {
        Ok(()) => logging::log_plugin_event(&name, hook.name()),
        Err(e) => logging::log_plugin_error(&name, hook.name(), &e),
    }
    Ok(())
}
