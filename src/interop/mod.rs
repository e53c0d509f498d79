//! Interoperability - values and calls across the Lua ↔ native boundary
//!
//! Design: enum dispatch over a closed kind taxonomy, owned storage for
//! every transient allocation, and libffi-generated trampolines in both
//! directions.
//!
//! Architecture:
//! - `types.rs` - kind taxonomy and signature descriptors
//! - `values.rs` - native value model (NativeValue, Vector2/3/4, Matrix4x4)
//! - `marshal.rs` - scalar and struct conversions, UTF-8 ↔ UTF-16
//! - `array.rs` - sequence tables and the `any` union
//! - `convert.rs` - per-kind dispatch
//! - `abi.rs` - native slot layout and raw reads/writes
//! - `jit.rs` - call interfaces and generated entry points (libffi)
//! - `scope.rs` - per-call transient storage
//! - `internal.rs` / `external.rs` - the two call protocols
//! - `boxing.rs` - function boxing and the identity cache

mod abi;
mod array;
pub(crate) mod boxing;
pub(crate) mod convert;
mod error;
mod external;
mod internal;
mod jit;
pub(crate) mod marshal;
mod scope;
mod stats;
mod types;
mod values;

pub use abi::{NativeArgs, ReturnSlot, Slot};
pub use array::{any_from_script, array_from_script, classify, ScriptType};
pub use boxing::BindingId;
pub use convert::value_from_script;
pub use error::{invariant_violation, CallError, ConversionError, Utf16Error};
pub use jit::{JitCall, JitCallback, JitError};
pub use marshal::{decode_utf16_unit, encode_utf16_unit, is_in_range, ScriptInteger};
pub use scope::ArgsScope;
pub use stats::InteropStats;
pub use types::{EnumDescriptor, EnumValue, MethodSignature, PropertyDescriptor, ValueKind};
pub use values::{Matrix4x4, NativeValue, Vector2, Vector3, Vector4};

/// Get interop statistics for the current thread
pub fn stats() -> InteropStats {
    stats::snapshot()
}
