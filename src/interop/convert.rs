//! Per-kind dispatch between script values and native values

use mlua::Value;

use super::array::{any_from_script, any_to_script, array_from_script};
use super::boxing;
use super::error::ConversionError;
use super::marshal::*;
use super::types::{PropertyDescriptor, ValueKind};
use super::values::NativeValue;
use crate::context::ContextInner;

/// Convert a script value into the native value of `kind`
///
/// Function values need a prototype and a context to be boxed; use
/// [`from_script`] for them.
pub fn value_from_script(kind: ValueKind, value: &Value) -> Result<NativeValue, ConversionError> {
    Ok(match kind {
        ValueKind::Void => NativeValue::Void,
        ValueKind::Bool => NativeValue::Bool(bool_from_script(value)?),
        ValueKind::Char8 => NativeValue::Char8(char8_from_script(value)?),
        ValueKind::Char16 => NativeValue::Char16(char16_from_script(value)?),
        ValueKind::Int8 => NativeValue::Int8(integer_from_script(value)?),
        ValueKind::Int16 => NativeValue::Int16(integer_from_script(value)?),
        ValueKind::Int32 => NativeValue::Int32(integer_from_script(value)?),
        ValueKind::Int64 => NativeValue::Int64(integer_from_script(value)?),
        ValueKind::UInt8 => NativeValue::UInt8(integer_from_script(value)?),
        ValueKind::UInt16 => NativeValue::UInt16(integer_from_script(value)?),
        ValueKind::UInt32 => NativeValue::UInt32(integer_from_script(value)?),
        ValueKind::UInt64 => NativeValue::UInt64(integer_from_script(value)?),
        ValueKind::Pointer => NativeValue::Pointer(pointer_from_script(value)?),
        ValueKind::Float => NativeValue::Float(float_from_script(value)?),
        ValueKind::Double => NativeValue::Double(double_from_script(value)?),
        ValueKind::Function => return Err(ConversionError::MissingPrototype),
        ValueKind::String => NativeValue::String(string_from_script(value)?),
        ValueKind::Any => any_from_script(value)?,
        ValueKind::Vector2 => NativeValue::Vector2(vector2_from_script(value)?),
        ValueKind::Vector3 => NativeValue::Vector3(vector3_from_script(value)?),
        ValueKind::Vector4 => NativeValue::Vector4(vector4_from_script(value)?),
        ValueKind::Matrix4x4 => NativeValue::Matrix4x4(matrix4x4_from_script(value)?),
        ValueKind::ArrayBool => NativeValue::ArrayBool(array_from_script(value, bool_from_script)?),
        ValueKind::ArrayChar8 => NativeValue::ArrayChar8(array_from_script(value, char8_from_script)?),
        ValueKind::ArrayChar16 => {
            NativeValue::ArrayChar16(array_from_script(value, char16_from_script)?)
        }
        ValueKind::ArrayInt8 => NativeValue::ArrayInt8(array_from_script(value, integer_from_script)?),
        ValueKind::ArrayInt16 => NativeValue::ArrayInt16(array_from_script(value, integer_from_script)?),
        ValueKind::ArrayInt32 => NativeValue::ArrayInt32(array_from_script(value, integer_from_script)?),
        ValueKind::ArrayInt64 => NativeValue::ArrayInt64(array_from_script(value, integer_from_script)?),
        ValueKind::ArrayUInt8 => NativeValue::ArrayUInt8(array_from_script(value, integer_from_script)?),
        ValueKind::ArrayUInt16 => {
            NativeValue::ArrayUInt16(array_from_script(value, integer_from_script)?)
        }
        ValueKind::ArrayUInt32 => {
            NativeValue::ArrayUInt32(array_from_script(value, integer_from_script)?)
        }
        ValueKind::ArrayUInt64 => {
            NativeValue::ArrayUInt64(array_from_script(value, integer_from_script)?)
        }
        ValueKind::ArrayPointer => {
            NativeValue::ArrayPointer(array_from_script(value, pointer_from_script)?)
        }
        ValueKind::ArrayFloat => NativeValue::ArrayFloat(array_from_script(value, float_from_script)?),
        ValueKind::ArrayDouble => {
            NativeValue::ArrayDouble(array_from_script(value, double_from_script)?)
        }
        ValueKind::ArrayString => {
            NativeValue::ArrayString(array_from_script(value, string_from_script)?)
        }
        ValueKind::ArrayAny => NativeValue::ArrayAny(array_from_script(value, any_from_script)?),
        ValueKind::ArrayVector2 => {
            NativeValue::ArrayVector2(array_from_script(value, vector2_from_script)?)
        }
        ValueKind::ArrayVector3 => {
            NativeValue::ArrayVector3(array_from_script(value, vector3_from_script)?)
        }
        ValueKind::ArrayVector4 => {
            NativeValue::ArrayVector4(array_from_script(value, vector4_from_script)?)
        }
        ValueKind::ArrayMatrix4x4 => {
            NativeValue::ArrayMatrix4x4(array_from_script(value, matrix4x4_from_script)?)
        }
    })
}

/// Convert a script value for a declared parameter or return slot
pub(crate) fn from_script(
    ctx: &ContextInner,
    property: &PropertyDescriptor,
    value: &Value,
) -> Result<NativeValue, ConversionError> {
    match property.kind {
        ValueKind::Function => {
            let prototype = property
                .prototype
                .as_deref()
                .ok_or(ConversionError::MissingPrototype)?;
            Ok(NativeValue::Function(boxing::box_script(ctx, prototype, value)?))
        }
        kind => value_from_script(kind, value),
    }
}

/// Convert a native value of a declared parameter or return slot
pub(crate) fn to_script(
    ctx: &ContextInner,
    property: &PropertyDescriptor,
    value: &NativeValue,
) -> Result<Value, ConversionError> {
    match (property.kind, value) {
        (ValueKind::Function, NativeValue::Function(address)) => {
            let prototype = property
                .prototype
                .as_deref()
                .ok_or(ConversionError::MissingPrototype)?;
            boxing::box_native(ctx, prototype, *address)
        }
        _ => any_to_script(ctx.env(), value),
    }
}
