//! Native → script calls
//!
//! Runs inside a generated entry point. Failures never cross back into
//! native code: they are logged and the caller receives the kind-appropriate
//! fallback value.

use mlua::{Function, MultiValue, Value};

use super::abi::{self, NativeArgs, ReturnSlot};
use super::boxing::FunctionBinding;
use super::convert;
use super::stats::{self, Counter};
use super::types::{MethodSignature, ValueKind};
use crate::context::ContextInner;
use crate::logging;

/// Forward one native invocation to the bound script callable
pub(crate) fn internal_call(
    ctx: &ContextInner,
    signature: &MethodSignature,
    binding: &FunctionBinding,
    args: &NativeArgs,
    ret: &mut ReturnSlot,
) {
    stats::bump(Counter::InternalCall);
    logging::log_internal_call(&signature.name, signature.params.len());

    let lua = ctx.lua();
    let name = signature.name.as_str();

    let callable: Function = match lua.registry_value(binding.callable()) {
        Ok(f) => f,
        Err(e) => {
            logging::log_script_error(name, &e);
            ret.write_fallback();
            return;
        }
    };

    let mut argv: Vec<Value> = Vec::with_capacity(signature.params.len() + 1);
    if let Some(owner) = binding.owner() {
        match lua.registry_value::<Value>(owner) {
            Ok(instance) => argv.push(instance),
            Err(e) => {
                logging::log_script_error(name, &e);
                ret.write_fallback();
                return;
            }
        }
    }

    let offset = signature.ret.kind.is_hidden_return() as usize;
    for (i, param) in signature.params.iter().enumerate() {
        // SAFETY: the entry point was generated from this signature.
        let native = unsafe { abi::read_arg(param, args.raw(i + offset)) };
        match convert::to_script(ctx, param, &native) {
            Ok(value) => argv.push(value),
            Err(e) => {
                stats::bump(Counter::ConversionError);
                logging::log_conversion_error(name, i + 1, &e);
                ret.write_fallback();
                return;
            }
        }
    }

    let ref_count = signature.ref_count();
    let expected = (signature.ret.kind != ValueKind::Void || ref_count > 0) as usize + ref_count;

    let results = match callable.call::<MultiValue>(argv.into_iter().collect::<MultiValue>()) {
        Ok(results) => results,
        Err(e) => {
            logging::log_script_error(name, &e);
            ret.write_fallback();
            return;
        }
    };
    let mut results: Vec<Value> = results.into_iter().collect();
    results.resize(expected, Value::Nil);

    let by_ref = signature.params.iter().enumerate().filter(|(_, p)| p.by_ref);
    for (result, (i, param)) in results.iter().skip(1).zip(by_ref) {
        match convert::from_script(ctx, param, result) {
            // SAFETY: by-reference slots hold a pointer to an initialized value.
            Ok(native) => unsafe { abi::write_through(param, args.raw(i + offset), native) },
            Err(e) => {
                stats::bump(Counter::ConversionError);
                logging::log_writeback_error(name, i + 1, &e);
            }
        }
    }

    if signature.ret.kind == ValueKind::Void {
        return;
    }
    match convert::from_script(ctx, &signature.ret, &results[0]) {
        Ok(native) => ret.write(native),
        Err(e) => {
            stats::bump(Counter::ConversionError);
            logging::log_conversion_error(name, 0, &e);
            ret.write_fallback();
        }
    }
}
