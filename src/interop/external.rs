//! Script → native calls
//!
//! Converts the script arguments into native slots, calls the target through
//! its prepared call interface and converts the results back. Every storage
//! cell allocated on the way lives in the call's `ArgsScope` and is released
//! whichever way the call ends.

use mlua::{MultiValue, Value};
use smallvec::SmallVec;

use super::convert;
use super::error::CallError;
use super::jit::JitCall;
use super::scope::ArgsScope;
use super::stats::{self, Counter};
use super::types::PropertyDescriptor;
use crate::context::ContextInner;
use crate::logging;

/// Call the native target of `call` with script arguments
///
/// Returns the primary result followed by the final value of every
/// by-reference parameter, in declared order.
pub(crate) fn external_call(
    ctx: &ContextInner,
    call: &JitCall,
    args: MultiValue,
) -> Result<MultiValue, CallError> {
    let signature = call.signature();
    stats::bump(Counter::ExternalCall);
    logging::log_external_call(&signature.name, args.len());

    let args: Vec<Value> = args.into_iter().collect();
    let implicit = signature.is_method() as usize;
    let expected = signature.params.len() + implicit;
    if args.len() != expected {
        return Err(CallError::ArgCountMismatch {
            function: signature.name.clone(),
            expected,
            got: args.len(),
        });
    }

    let hidden = signature.ret.kind.is_hidden_return();
    let mut scope = ArgsScope::with_capacity(signature.params.len() + hidden as usize);
    let ret_cell = hidden.then(|| scope.push_hidden_return(signature.ret.kind));

    let mut refs: SmallVec<[(usize, &PropertyDescriptor); 4]> = SmallVec::new();
    for (i, (param, value)) in signature.params.iter().zip(&args[implicit..]).enumerate() {
        let native = convert::from_script(ctx, param, value).map_err(|source| {
            stats::bump(Counter::ConversionError);
            CallError::Param {
                function: signature.name.clone(),
                index: i + 1,
                source,
            }
        })?;
        if let Some(cell) = scope.push_param(param, native) {
            if param.by_ref {
                refs.push((cell, param));
            }
        }
    }

    // SAFETY: the call interface and the slots were both built from `signature`.
    let raw = unsafe { call.invoke(scope.slots()) };
    let primary = match ret_cell {
        Some(cell) => scope.take_owned(cell),
        None => raw,
    };

    let returned = |source| CallError::Return {
        function: signature.name.clone(),
        source,
    };

    let mut out = Vec::with_capacity(1 + refs.len());
    out.push(convert::to_script(ctx, &signature.ret, &primary).map_err(returned)?);
    for (cell, param) in refs {
        out.push(convert::to_script(ctx, param, scope.owned(cell)).map_err(returned)?);
    }
    Ok(out.into_iter().collect())
}
