//! Script context - one interpreter and everything bound to it
//!
//! Design: no global state. The interpreter, the struct constructors captured
//! at startup and the function cache live in one reference-counted object.
//! Generated trampolines hold a weak handle to it, so a trampoline outliving
//! its context degrades to fallback values instead of dangling.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use mlua::{Function, Lua, Table, Value};

use crate::interop::boxing::{self, FunctionCache};
use crate::interop::convert;
use crate::interop::marshal::{ScriptEnv, StructConstructors};
use crate::interop::{ConversionError, MethodSignature, NativeValue, PropertyDescriptor};
use crate::logging;

/// Module providing Vector2/3/4 and Matrix4x4 to scripts
pub const STRUCT_MODULE: &str = "plugify";

const STRUCT_MODULE_SOURCE: &str = include_str!("../lua/plugify.lua");

#[derive(Debug)]
pub enum ContextError {
    Script(mlua::Error),
    StructModule { module: String, source: mlua::Error },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(e) => write!(f, "failed to initialize script context: {}", e),
            Self::StructModule { module, source } => {
                write!(f, "struct module '{}' unavailable: {}", module, source)
            }
        }
    }
}

impl std::error::Error for ContextError {}

impl From<mlua::Error> for ContextError {
    fn from(e: mlua::Error) -> Self {
        Self::Script(e)
    }
}

pub(crate) struct ContextInner {
    cache: RefCell<FunctionCache>,
    env: ScriptEnv,
    this: Weak<ContextInner>,
}

impl ContextInner {
    #[inline]
    pub(crate) fn env(&self) -> &ScriptEnv {
        &self.env
    }

    #[inline]
    pub(crate) fn lua(&self) -> &Lua {
        self.env.lua()
    }

    /// Borrows must never be held across a call into script or native code.
    #[inline]
    pub(crate) fn cache(&self) -> &RefCell<FunctionCache> {
        &self.cache
    }

    #[inline]
    pub(crate) fn weak(&self) -> Weak<ContextInner> {
        self.this.clone()
    }
}

/// Interpreter plus marshalling state for one module instance
#[derive(Clone)]
pub struct ScriptContext {
    inner: Rc<ContextInner>,
}

impl ScriptContext {
    /// Fresh interpreter with the standard libraries and the built-in struct module
    pub fn new() -> Result<Self, ContextError> {
        Self::with_lua(Lua::new())
    }

    pub fn with_lua(lua: Lua) -> Result<Self, ContextError> {
        Self::with_struct_module(lua, STRUCT_MODULE)
    }

    /// Capture struct constructors from `module` (resolved through `require`)
    pub fn with_struct_module(lua: Lua, module: &str) -> Result<Self, ContextError> {
        register_builtin_module(&lua)?;
        let constructors = load_constructors(&lua, module).map_err(|source| {
            ContextError::StructModule {
                module: module.to_string(),
                source,
            }
        })?;

        let env = ScriptEnv::new(lua, constructors);
        let inner = Rc::new_cyclic(|this| ContextInner {
            cache: RefCell::new(FunctionCache::default()),
            env,
            this: this.clone(),
        });
        Ok(Self { inner })
    }

    #[inline]
    pub fn lua(&self) -> &Lua {
        self.inner.lua()
    }

    /// Convert a native value as the given parameter/return slot declares
    pub fn to_script(
        &self,
        property: &PropertyDescriptor,
        value: &NativeValue,
    ) -> Result<Value, ConversionError> {
        convert::to_script(&self.inner, property, value)
    }

    /// Convert a script value as the given parameter/return slot declares
    pub fn from_script(
        &self,
        property: &PropertyDescriptor,
        value: &Value,
    ) -> Result<NativeValue, ConversionError> {
        convert::from_script(&self.inner, property, value)
    }

    /// Native entry point invoking a script callable (nil gives null)
    pub fn box_script_function(
        &self,
        prototype: &MethodSignature,
        value: &Value,
    ) -> Result<usize, ConversionError> {
        boxing::box_script(&self.inner, prototype, value)
    }

    /// Script function forwarding to a native function pointer (null gives nil)
    pub fn box_native_function(
        &self,
        prototype: &MethodSignature,
        address: usize,
    ) -> Result<Value, ConversionError> {
        boxing::box_native(&self.inner, prototype, address)
    }

    /// Native entry point invoking `method` with `owner` as its receiver
    pub fn bind_method(
        &self,
        signature: &MethodSignature,
        owner: &Value,
        method: &Value,
    ) -> Result<usize, ConversionError> {
        match method {
            Value::Function(_) => boxing::bind(&self.inner, signature, Some(owner), method),
            other => Err(ConversionError::type_mismatch("function", other.type_name())),
        }
    }

    /// Number of distinct callables currently boxed
    pub fn cached_bindings(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    /// Give back one `box_script_function`/`bind_method` result
    ///
    /// Once every holder has released it the trampoline and the pinned
    /// callable are dropped and `address` becomes invalid. Returns whether
    /// that happened.
    pub fn release_function(&self, address: usize) -> bool {
        let released = self.inner.cache.borrow_mut().release(address);
        if released {
            logging::log_trampoline_released(address);
        }
        released
    }

    /// Release every trampoline and pinned callable
    ///
    /// Native addresses handed out earlier become invalid; the host must not
    /// call them afterwards.
    pub fn shutdown(&self) {
        let released = {
            let mut cache = self.inner.cache.borrow_mut();
            let count = cache.len();
            cache.clear();
            count
        };
        logging::log_context_shutdown(released);
    }
}

fn register_builtin_module(lua: &Lua) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let preload: Table = package.get("preload")?;
    if preload.get::<Value>(STRUCT_MODULE)?.is_nil() {
        let loader = lua
            .load(STRUCT_MODULE_SOURCE)
            .set_name(STRUCT_MODULE)
            .into_function()?;
        preload.set(STRUCT_MODULE, loader)?;
    }
    Ok(())
}

fn load_constructors(lua: &Lua, module: &str) -> mlua::Result<StructConstructors> {
    let require: Function = lua.globals().get("require")?;
    let table: Table = require.call(module)?;
    StructConstructors::capture(lua, &table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_module_is_requirable() {
        let ctx = ScriptContext::new().unwrap();
        let tag: String = ctx
            .lua()
            .load(r#"return getmetatable(require("plugify").Vector3.new(1, 2, 3)).__type"#)
            .eval()
            .unwrap();
        assert_eq!(tag, "Vector3");
    }

    #[test]
    fn test_missing_struct_module() {
        let err = ScriptContext::with_struct_module(Lua::new(), "does_not_exist").err().unwrap();
        assert!(matches!(err, ContextError::StructModule { .. }));
    }

    #[test]
    fn test_shutdown_clears_cache() {
        let ctx = ScriptContext::new().unwrap();
        let f: Value = ctx.lua().load("return function() end").eval().unwrap();
        let sig = MethodSignature::new(
            "noop",
            vec![],
            PropertyDescriptor::new(crate::interop::ValueKind::Void),
        );
        ctx.box_script_function(&sig, &f).unwrap();
        assert_eq!(ctx.cached_bindings(), 1);

        ctx.shutdown();
        assert_eq!(ctx.cached_bindings(), 0);
    }
}
