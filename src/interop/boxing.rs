//! Function boxing and the identity cache
//!
//! Design: a script callable crossing into native code becomes a generated
//! entry point; a native function pointer crossing into script becomes a Lua
//! function. Both directions share one cache keyed by identity, so each
//! distinct callable gets at most one trampoline and a value boxed one way
//! unboxes to the original when it comes back.

use std::collections::HashMap;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, RegistryKey, Value};
use once_cell::unsync::OnceCell;

use super::error::{CallError, ConversionError};
use super::external;
use super::internal;
use super::jit::{JitCall, JitCallback};
use super::stats::{self, Counter};
use super::types::MethodSignature;
use crate::context::ContextInner;
use crate::logging;

/// Identity of a (receiver, callable) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId {
    owner: Option<usize>,
    callable: usize,
}

impl BindingId {
    pub fn of(owner: Option<&Value>, callable: &Value) -> Self {
        Self {
            owner: owner.map(|o| o.to_pointer() as usize),
            callable: callable.to_pointer() as usize,
        }
    }
}

/// Script callable pinned for the lifetime of its context
pub struct FunctionBinding {
    id: BindingId,
    owner: Option<RegistryKey>,
    callable: RegistryKey,
    /// Script function with the owner already applied, built on first unboxing
    bound: OnceCell<RegistryKey>,
}

impl FunctionBinding {
    #[inline]
    pub fn id(&self) -> BindingId {
        self.id
    }

    #[inline]
    pub fn owner(&self) -> Option<&RegistryKey> {
        self.owner.as_ref()
    }

    #[inline]
    pub fn callable(&self) -> &RegistryKey {
        &self.callable
    }

    /// Script value behaving like the native entry point of this binding
    ///
    /// Without an owner that is the callable itself; with one, a function
    /// passing the owner as `self` ahead of the caller's arguments.
    fn script_value(&self, lua: &Lua) -> mlua::Result<Value> {
        let Some(owner) = &self.owner else {
            return lua.registry_value(&self.callable);
        };
        if let Some(key) = self.bound.get() {
            return lua.registry_value(key);
        }

        let owner: Value = lua.registry_value(owner)?;
        let method: Function = lua.registry_value(&self.callable)?;
        let function = lua.create_function(move |_, mut args: MultiValue| {
            args.push_front(owner.clone());
            method.call::<MultiValue>(args)
        })?;
        let _ = self.bound.set(lua.create_registry_value(function.clone())?);
        Ok(Value::Function(function))
    }
}

/// Bidirectional identity maps plus the trampolines they point at
#[derive(Default)]
pub struct FunctionCache {
    internal: HashMap<BindingId, usize>,
    external: HashMap<usize, BindingId>,
    bindings: HashMap<BindingId, Rc<FunctionBinding>>,
    callbacks: Vec<JitCallback>,
    /// Outstanding `bind` results per native address
    holds: HashMap<usize, usize>,
}

impl FunctionCache {
    pub fn native_address(&self, id: &BindingId) -> Option<usize> {
        self.internal.get(id).copied()
    }

    pub fn binding_for(&self, address: usize) -> Option<Rc<FunctionBinding>> {
        let id = self.external.get(&address)?;
        self.bindings.get(id).cloned()
    }

    fn insert(&mut self, binding: Rc<FunctionBinding>, address: usize, callback: Option<JitCallback>) {
        let id = binding.id();
        self.internal.insert(id, address);
        self.external.insert(address, id);
        self.bindings.insert(id, binding);
        self.callbacks.extend(callback);
    }

    /// Let another script identity resolve to an existing entry point
    fn alias(&mut self, id: BindingId, address: usize) {
        self.internal.entry(id).or_insert(address);
    }

    fn hold(&mut self, address: usize) {
        *self.holds.entry(address).or_default() += 1;
    }

    /// Give back one hold on `address`; the last one drops the binding
    ///
    /// Returns whether the entry point was released. A released address is
    /// invalid and must not be called again.
    pub fn release(&mut self, address: usize) -> bool {
        if let Some(holds) = self.holds.get_mut(&address) {
            if *holds > 1 {
                *holds -= 1;
                return false;
            }
        }
        self.holds.remove(&address);

        let Some(id) = self.external.remove(&address) else {
            return false;
        };
        self.internal.retain(|_, target| *target != address);
        self.bindings.remove(&id);
        self.callbacks.retain(|callback| callback.code_ptr() != address);
        true
    }

    /// Number of distinct bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every trampoline and unpin every callable
    pub fn clear(&mut self) {
        self.internal.clear();
        self.external.clear();
        self.callbacks.clear();
        self.bindings.clear();
        self.holds.clear();
    }
}

/// Box a script callable as a native function pointer (nil → null)
pub(crate) fn box_script(
    ctx: &ContextInner,
    prototype: &MethodSignature,
    value: &Value,
) -> Result<usize, ConversionError> {
    match value {
        Value::Nil => Ok(0),
        Value::Function(_) => bind(ctx, prototype, None, value),
        other => Err(ConversionError::type_mismatch("function", other.type_name())),
    }
}

/// Bind a callable, optionally with a receiver, to a native entry point
pub(crate) fn bind(
    ctx: &ContextInner,
    signature: &MethodSignature,
    owner: Option<&Value>,
    callable: &Value,
) -> Result<usize, ConversionError> {
    let id = BindingId::of(owner, callable);
    let cached = ctx.cache().borrow().native_address(&id);
    if let Some(address) = cached {
        stats::bump(Counter::CacheHit);
        logging::log_cache_hit(&signature.name, address);
        ctx.cache().borrow_mut().hold(address);
        return Ok(address);
    }

    let lua = ctx.lua();
    let binding = Rc::new(FunctionBinding {
        id,
        owner: owner.map(|o| lua.create_registry_value(o.clone())).transpose()?,
        callable: lua.create_registry_value(callable.clone())?,
        bound: OnceCell::new(),
    });

    let signature = Rc::new(signature.clone());
    let weak = ctx.weak();
    let target = Rc::clone(&binding);
    let handler_signature = Rc::clone(&signature);
    let callback = JitCallback::new(signature, move |args, ret| match weak.upgrade() {
        Some(ctx) => internal::internal_call(&ctx, &handler_signature, &target, args, ret),
        None => ret.write_fallback(),
    })?;

    let address = callback.code_ptr();
    stats::bump(Counter::TrampolineGenerated);
    logging::log_trampoline_generated(&callback.signature().name, "internal", address);

    let mut cache = ctx.cache().borrow_mut();
    cache.insert(binding, address, Some(callback));
    cache.hold(address);
    Ok(address)
}

/// Box a native function pointer as a script function (null → nil)
pub(crate) fn box_native(
    ctx: &ContextInner,
    prototype: &MethodSignature,
    address: usize,
) -> Result<Value, ConversionError> {
    if address == 0 {
        return Ok(Value::Nil);
    }

    let lua = ctx.lua();
    let cached = ctx.cache().borrow().binding_for(address);
    if let Some(binding) = cached {
        stats::bump(Counter::CacheHit);
        logging::log_cache_hit(&prototype.name, address);
        let value = binding.script_value(lua)?;
        if binding.owner().is_some() {
            ctx.cache().borrow_mut().alias(BindingId::of(None, &value), address);
        }
        return Ok(value);
    }

    let call = JitCall::new(Rc::new(prototype.clone()), address)?;
    let weak = ctx.weak();
    let function = lua.create_function(move |_, args: MultiValue| {
        let Some(ctx) = weak.upgrade() else {
            return Err(CallError::ContextGone {
                function: call.signature().name.clone(),
            }
            .into());
        };
        external::external_call(&ctx, &call, args).map_err(mlua::Error::from)
    })?;

    let value = Value::Function(function);
    let binding = Rc::new(FunctionBinding {
        id: BindingId::of(None, &value),
        owner: None,
        callable: lua.create_registry_value(value.clone())?,
        bound: OnceCell::new(),
    });

    stats::bump(Counter::TrampolineGenerated);
    logging::log_trampoline_generated(&prototype.name, "external", address);

    ctx.cache().borrow_mut().insert(binding, address, None);
    Ok(value)
}
