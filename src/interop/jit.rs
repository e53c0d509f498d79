//! Trampoline generation on top of libffi
//!
//! `JitCall` calls an arbitrary native function pointer whose signature is
//! only known at runtime. `JitCallback` is the reverse: a freshly generated
//! native entry point that forwards every invocation to a Rust handler.

use core::ffi::c_void;
use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use libffi::low::ffi_cif;
use libffi::middle::{Arg, Cif, Closure, CodePtr};
use smallvec::SmallVec;

use super::abi::{self, NativeArgs, ReturnSlot, Slot};
use super::types::{MethodSignature, ValueKind};
use super::values::{NativeValue, Vector2};

/// Trampoline generation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitError {
    message: String,
}

impl JitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trampoline generation failed: {}", self.message)
    }
}

impl std::error::Error for JitError {}

/// Prepared call into a native function
pub struct JitCall {
    cif: Cif,
    target: CodePtr,
    signature: Rc<MethodSignature>,
}

impl JitCall {
    pub fn new(signature: Rc<MethodSignature>, target: usize) -> Result<Self, JitError> {
        signature.validate()?;
        if target == 0 {
            return Err(JitError::new(format!("'{}': null function pointer", signature.name)));
        }

        let (params, ret) = abi::signature_types(&signature);
        Ok(Self {
            cif: Cif::new(params, ret),
            target: CodePtr::from_ptr(target as *const c_void),
            signature,
        })
    }

    #[inline]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    #[inline]
    pub fn target(&self) -> usize {
        self.target.as_ptr() as usize
    }

    /// Invoke the target with prepared slots
    ///
    /// Hidden returns land in the storage slot 0 points at; the returned
    /// value is then `Void`.
    ///
    /// # Safety
    /// The target must implement the signature, and `slots` must match its
    /// native form (hidden return slot included).
    pub unsafe fn invoke(&self, slots: &[Slot]) -> NativeValue {
        let args: SmallVec<[Arg; 8]> = slots.iter().map(Slot::as_arg).collect();
        let kind = self.signature.ret.kind;

        if kind == ValueKind::Void || kind.is_hidden_return() {
            self.cif.call::<()>(self.target, &args);
            return NativeValue::Void;
        }

        match kind {
            ValueKind::Float => NativeValue::Float(self.cif.call::<f32>(self.target, &args)),
            ValueKind::Double => NativeValue::Double(self.cif.call::<f64>(self.target, &args)),
            ValueKind::Vector2 => NativeValue::Vector2(self.cif.call::<Vector2>(self.target, &args)),
            _ => from_register(kind, self.cif.call::<u64>(self.target, &args)),
        }
    }
}

/// Truncate a full-word integer return to its declared kind
fn from_register(kind: ValueKind, raw: u64) -> NativeValue {
    match kind {
        ValueKind::Bool => NativeValue::Bool(raw as u8 != 0),
        ValueKind::Char8 => NativeValue::Char8(raw as u8),
        ValueKind::Char16 => NativeValue::Char16(raw as u16),
        ValueKind::Int8 => NativeValue::Int8(raw as i8),
        ValueKind::Int16 => NativeValue::Int16(raw as i16),
        ValueKind::Int32 => NativeValue::Int32(raw as i32),
        ValueKind::Int64 => NativeValue::Int64(raw as i64),
        ValueKind::UInt8 => NativeValue::UInt8(raw as u8),
        ValueKind::UInt16 => NativeValue::UInt16(raw as u16),
        ValueKind::UInt32 => NativeValue::UInt32(raw as u32),
        ValueKind::UInt64 => NativeValue::UInt64(raw),
        ValueKind::Pointer => NativeValue::Pointer(raw as usize),
        ValueKind::Function => NativeValue::Function(raw as usize),
        _ => NativeValue::Void,
    }
}

type Handler = dyn Fn(&NativeArgs, &mut ReturnSlot);

struct CallbackData {
    signature: Rc<MethodSignature>,
    arg_count: usize,
    handler: Box<Handler>,
}

/// Generated native entry point
pub struct JitCallback {
    // Borrows `data`; must drop first.
    closure: Closure<'static>,
    data: Box<CallbackData>,
}

impl JitCallback {
    pub fn new<F>(signature: Rc<MethodSignature>, handler: F) -> Result<Self, JitError>
    where
        F: Fn(&NativeArgs, &mut ReturnSlot) + 'static,
    {
        signature.validate()?;

        let (params, ret) = abi::signature_types(&signature);
        let arg_count = params.len();
        let cif = Cif::new(params, ret);

        let data = Box::new(CallbackData {
            signature,
            arg_count,
            handler: Box::new(handler),
        });
        // SAFETY: the heap allocation behind `data` outlives `closure`, which
        // is declared before it and therefore dropped first.
        let userdata: &'static CallbackData = unsafe { &*(data.as_ref() as *const CallbackData) };
        let closure = Closure::new(cif, dispatch, userdata);

        Ok(Self { closure, data })
    }

    /// Address callable as a plain C function
    #[inline]
    pub fn code_ptr(&self) -> usize {
        *self.closure.code_ptr() as usize
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.data.signature
    }
}

unsafe extern "C" fn dispatch(
    _cif: &ffi_cif,
    result: &mut u64,
    args: *const *const c_void,
    data: &CallbackData,
) {
    let args = NativeArgs::new(args, data.arg_count);
    let mut ret = ReturnSlot::new(data.signature.ret.kind, result as *mut u64 as *mut c_void, &args);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (data.handler)(&args, &mut ret)));
    if outcome.is_err() {
        tracing::error!(
            event = "callback_panic",
            function = %data.signature.name,
            "Panic inside generated entry point, returning fallback"
        );
        ret.write_fallback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::types::PropertyDescriptor;

    extern "C" fn add_i32(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn negate_i8(a: i8) -> i8 {
        -a
    }

    fn binary(kind: ValueKind) -> Rc<MethodSignature> {
        Rc::new(MethodSignature::new(
            "op",
            vec![PropertyDescriptor::new(kind), PropertyDescriptor::new(kind)],
            PropertyDescriptor::new(kind),
        ))
    }

    #[test]
    fn test_call_native() {
        let call = JitCall::new(binary(ValueKind::Int32), add_i32 as usize).unwrap();
        assert_eq!(call.target(), add_i32 as usize);
        let result = unsafe { call.invoke(&[Slot::I32(3), Slot::I32(4)]) };
        assert_eq!(result, NativeValue::Int32(7));
    }

    #[test]
    fn test_small_integer_return_is_truncated() {
        let signature = Rc::new(MethodSignature::new(
            "neg",
            vec![PropertyDescriptor::new(ValueKind::Int8)],
            PropertyDescriptor::new(ValueKind::Int8),
        ));
        let call = JitCall::new(signature, negate_i8 as usize).unwrap();
        assert_eq!(unsafe { call.invoke(&[Slot::I8(5)]) }, NativeValue::Int8(-5));
    }

    #[test]
    fn test_null_target_rejected() {
        assert!(JitCall::new(binary(ValueKind::Int32), 0).is_err());
    }

    #[test]
    fn test_callback_roundtrip() {
        let callback = JitCallback::new(binary(ValueKind::Int32), |args, ret| unsafe {
            let a = *(args.raw(0) as *const i32);
            let b = *(args.raw(1) as *const i32);
            ret.write(NativeValue::Int32(a * b));
        })
        .unwrap();

        let f: extern "C" fn(i32, i32) -> i32 = unsafe { core::mem::transmute(callback.code_ptr()) };
        assert_eq!(f(6, 7), 42);
    }

    #[test]
    fn test_void_param_rejected() {
        let signature = Rc::new(MethodSignature::new(
            "bad",
            vec![PropertyDescriptor::new(ValueKind::Void)],
            PropertyDescriptor::new(ValueKind::Void),
        ));
        let err = JitCallback::new(signature, |_, _| {}).err().unwrap();
        assert!(err.message().contains("cannot be void"));
    }
}
