//! Native modules seen from Lua: module tables, enums and the `require` hook

use std::fs;
use std::path::Path;
use std::rc::{Rc, Weak};

use mlua::{Function, Lua, MultiValue, Table, Value};

use super::host::NativeModule;
use super::{ModuleError, ModuleInner};
use crate::logging;

/// Register every `*.lua` file of `dir` as a preloadable module
pub(super) fn register_libraries(lua: &Lua, dir: &Path) -> Result<usize, ModuleError> {
    if !dir.is_dir() {
        return Err(ModuleError::LibDirMissing(dir.to_path_buf()));
    }

    let io_error = |e: std::io::Error| ModuleError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    let mut files: Vec<_> = fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "lua"))
        .collect();
    files.sort();

    let preload: Table = lua.globals().get::<Table>("package")?.get("preload")?;
    for path in &files {
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let source = fs::read_to_string(path).map_err(|e| ModuleError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let loader = lua
            .load(source)
            .set_name(path.display().to_string())
            .into_function()?;
        preload.set(name, loader)?;
    }
    Ok(files.len())
}

/// Route `require` through the host before the standard searchers
pub(super) fn install_require_hook(inner: &Rc<ModuleInner>, original: Function) -> mlua::Result<()> {
    let lua = inner.ctx.lua();
    let module: Weak<ModuleInner> = Rc::downgrade(inner);

    let hook = lua.create_function(move |_, args: MultiValue| {
        if let (Some(inner), Some(Value::String(name))) = (module.upgrade(), args.iter().next()) {
            let name = String::from_utf8_lossy(&name.as_bytes()).into_owned();
            if let Some(native) = inner.host.find_module(&name) {
                expose_module(&inner, &native).map_err(mlua::Error::external)?;
            }
        }
        original.call::<MultiValue>(args)
    })?;

    lua.globals().set("require", hook)
}

/// Build the module table for `module` in `package.loaded`, once
pub(super) fn expose_module(inner: &ModuleInner, module: &NativeModule) -> Result<Table, ModuleError> {
    let lua = inner.ctx.lua();
    let loaded: Table = lua.globals().get::<Table>("package")?.get("loaded")?;

    if inner.exposed.borrow().contains(&module.name) {
        if let Value::Table(table) = loaded.get::<Value>(module.name.as_str())? {
            return Ok(table);
        }
    }

    let table = match loaded.get::<Value>(module.name.as_str())? {
        Value::Table(table) => table,
        _ => {
            let table = lua.create_table()?;
            loaded.set(module.name.as_str(), table.clone())?;
            lua.globals().set(module.name.as_str(), table.clone())?;
            table
        }
    };

    let mut skipped = 0;
    for method in &module.methods {
        match inner.ctx.box_native_function(&method.signature, method.address) {
            Ok(function) => table.set(method.signature.name.as_str(), function)?,
            Err(e) => {
                skipped += 1;
                tracing::warn!(
                    event = "method_skipped",
                    module = %module.name,
                    method = %method.signature.name,
                    error = %e,
                    "Native method not exposed"
                );
            }
        }
    }

    for method in &module.methods {
        for enumerator in method.signature.enums() {
            if enumerator.values.is_empty()
                || !table.raw_get::<Value>(enumerator.name.as_str())?.is_nil()
            {
                continue;
            }
            let values = lua.create_table()?;
            for value in &enumerator.values {
                values.set(value.name.as_str(), value.value)?;
            }
            table.set(enumerator.name.as_str(), values)?;
        }
    }

    inner.exposed.borrow_mut().insert(module.name.clone());
    logging::log_module_exposed(&module.name, module.methods.len() - skipped, skipped);
    Ok(table)
}
