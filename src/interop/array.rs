//! Sequence tables and the `any` union
//!
//! Arrays map to the sequence part of a table. `any` is ingested by runtime
//! inspection: scalars by script type, tables by struct tag or, for plain
//! sequences, by the single kind shared by every element.

use mlua::{Lua, Table, Value};

use super::error::ConversionError;
use super::marshal::{
    self, bool_from_script, double_from_script, integer_from_script, matrix4x4_from_script,
    string_from_script, tagged_struct_kind, vector2_from_script, vector3_from_script,
    vector4_from_script, ScriptEnv,
};
use super::types::ValueKind;
use super::values::NativeValue;

/// Runtime type of a script value, struct tags resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Nil,
    Boolean,
    LightUserData,
    Integer,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
    Vector2,
    Vector3,
    Vector4,
    Matrix4x4,
    Other,
}

impl ScriptType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::LightUserData => "lightuserdata",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::UserData => "userdata",
            Self::Thread => "thread",
            Self::Vector2 => "vector2",
            Self::Vector3 => "vector3",
            Self::Vector4 => "vector4",
            Self::Matrix4x4 => "matrix4x4",
            Self::Other => "unknown",
        }
    }

    /// Element kind of a homogeneous array of this script type
    const fn element_kind(self) -> Option<ValueKind> {
        Some(match self {
            Self::Boolean => ValueKind::Bool,
            Self::Integer => ValueKind::Int64,
            Self::Number => ValueKind::Double,
            Self::String => ValueKind::String,
            Self::Vector2 => ValueKind::Vector2,
            Self::Vector3 => ValueKind::Vector3,
            Self::Vector4 => ValueKind::Vector4,
            Self::Matrix4x4 => ValueKind::Matrix4x4,
            _ => return None,
        })
    }
}

pub fn classify(value: &Value) -> ScriptType {
    match value {
        Value::Nil => ScriptType::Nil,
        Value::Boolean(_) => ScriptType::Boolean,
        Value::LightUserData(_) => ScriptType::LightUserData,
        Value::Integer(_) => ScriptType::Integer,
        Value::Number(_) => ScriptType::Number,
        Value::String(_) => ScriptType::String,
        Value::Table(t) => match tagged_struct_kind(t) {
            Some(ValueKind::Vector2) => ScriptType::Vector2,
            Some(ValueKind::Vector3) => ScriptType::Vector3,
            Some(ValueKind::Vector4) => ScriptType::Vector4,
            Some(ValueKind::Matrix4x4) => ScriptType::Matrix4x4,
            _ => ScriptType::Table,
        },
        Value::Function(_) => ScriptType::Function,
        Value::UserData(_) => ScriptType::UserData,
        Value::Thread(_) => ScriptType::Thread,
        _ => ScriptType::Other,
    }
}

/// Convert the sequence part of a table element by element
pub fn array_from_script<T>(
    value: &Value,
    element: impl Fn(&Value) -> Result<T, ConversionError>,
) -> Result<Vec<T>, ConversionError> {
    let Value::Table(table) = value else {
        return Err(ConversionError::type_mismatch("table", value.type_name()));
    };

    let len = table.raw_len();
    let mut out = Vec::with_capacity(len);
    for index in 1..=len {
        let item: Value = table.raw_get(index)?;
        let converted = element(&item).map_err(|source| ConversionError::Element {
            index,
            source: Box::new(source),
        })?;
        out.push(converted);
    }
    Ok(out)
}

/// Build a fresh sequence table from native elements
pub fn array_to_script<T>(
    lua: &Lua,
    items: &[T],
    element: impl Fn(&T) -> Result<Value, ConversionError>,
) -> Result<Value, ConversionError> {
    let table = lua.create_table()?;
    for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, element(item)?)?;
    }
    Ok(Value::Table(table))
}

/// Ingest a script value whose native kind is only known at runtime
pub fn any_from_script(value: &Value) -> Result<NativeValue, ConversionError> {
    let found = classify(value);
    Ok(match found {
        ScriptType::Nil => NativeValue::Void,
        ScriptType::Boolean => NativeValue::Bool(bool_from_script(value)?),
        ScriptType::Integer => NativeValue::Int64(integer_from_script(value)?),
        ScriptType::Number => NativeValue::Double(double_from_script(value)?),
        ScriptType::String => NativeValue::String(string_from_script(value)?),
        ScriptType::Vector2 => NativeValue::Vector2(vector2_from_script(value)?),
        ScriptType::Vector3 => NativeValue::Vector3(vector3_from_script(value)?),
        ScriptType::Vector4 => NativeValue::Vector4(vector4_from_script(value)?),
        ScriptType::Matrix4x4 => NativeValue::Matrix4x4(matrix4x4_from_script(value)?),
        ScriptType::Table => {
            let Value::Table(table) = value else {
                return Err(ConversionError::type_mismatch("table", value.type_name()));
            };
            any_array_from_script(value, table)?
        }
        ScriptType::LightUserData
        | ScriptType::Function
        | ScriptType::UserData
        | ScriptType::Thread
        | ScriptType::Other => {
            return Err(ConversionError::UnsupportedAny {
                found: found.name().to_string(),
            })
        }
    })
}

fn any_array_from_script(value: &Value, table: &Table) -> Result<NativeValue, ConversionError> {
    let len = table.raw_len();
    if len == 0 {
        return Ok(NativeValue::ArrayInt64(Vec::new()));
    }

    let mut seen: Vec<ScriptType> = Vec::new();
    for index in 1..=len {
        let item: Value = table.raw_get(index)?;
        let ty = classify(&item);
        if !seen.contains(&ty) {
            seen.push(ty);
        }
    }

    let element = match seen.as_slice() {
        [only] => only.element_kind(),
        _ => None,
    };
    let Some(element) = element else {
        return Err(ConversionError::MixedArray {
            kinds: seen.iter().map(|ty| ty.name()).collect(),
        });
    };

    Ok(match element {
        ValueKind::Bool => NativeValue::ArrayBool(array_from_script(value, bool_from_script)?),
        ValueKind::Int64 => NativeValue::ArrayInt64(array_from_script(value, integer_from_script)?),
        ValueKind::Double => NativeValue::ArrayDouble(array_from_script(value, double_from_script)?),
        ValueKind::String => NativeValue::ArrayString(array_from_script(value, string_from_script)?),
        ValueKind::Vector2 => NativeValue::ArrayVector2(array_from_script(value, vector2_from_script)?),
        ValueKind::Vector3 => NativeValue::ArrayVector3(array_from_script(value, vector3_from_script)?),
        ValueKind::Vector4 => NativeValue::ArrayVector4(array_from_script(value, vector4_from_script)?),
        ValueKind::Matrix4x4 => {
            NativeValue::ArrayMatrix4x4(array_from_script(value, matrix4x4_from_script)?)
        }
        other => {
            return Err(ConversionError::UnsupportedAny {
                found: other.name().to_string(),
            })
        }
    })
}

/// Emit a native value, dispatching on its own variant
pub fn any_to_script(env: &ScriptEnv, value: &NativeValue) -> Result<Value, ConversionError> {
    use marshal::{
        char16_to_script, char8_to_script, integer_to_script, matrix4x4_to_script,
        pointer_to_script, string_to_script, vector2_to_script, vector3_to_script,
        vector4_to_script,
    };

    let lua = env.lua();
    Ok(match value {
        NativeValue::Void => Value::Nil,
        NativeValue::Bool(v) => Value::Boolean(*v),
        NativeValue::Char8(v) => char8_to_script(lua, *v)?,
        NativeValue::Char16(v) => char16_to_script(lua, *v)?,
        NativeValue::Int8(v) => integer_to_script(*v),
        NativeValue::Int16(v) => integer_to_script(*v),
        NativeValue::Int32(v) => integer_to_script(*v),
        NativeValue::Int64(v) => integer_to_script(*v),
        NativeValue::UInt8(v) => integer_to_script(*v),
        NativeValue::UInt16(v) => integer_to_script(*v),
        NativeValue::UInt32(v) => integer_to_script(*v),
        NativeValue::UInt64(v) => integer_to_script(*v),
        NativeValue::Pointer(v) => pointer_to_script(*v),
        NativeValue::Float(v) => Value::Number(*v as f64),
        NativeValue::Double(v) => Value::Number(*v),
        NativeValue::Function(_) => return Err(ConversionError::MissingPrototype),
        NativeValue::String(v) => string_to_script(lua, v)?,
        NativeValue::Vector2(v) => vector2_to_script(env, v)?,
        NativeValue::Vector3(v) => vector3_to_script(env, v)?,
        NativeValue::Vector4(v) => vector4_to_script(env, v)?,
        NativeValue::Matrix4x4(v) => matrix4x4_to_script(env, v)?,
        NativeValue::ArrayBool(v) => array_to_script(lua, v, |b| Ok(Value::Boolean(*b)))?,
        NativeValue::ArrayChar8(v) => array_to_script(lua, v, |c| char8_to_script(lua, *c))?,
        NativeValue::ArrayChar16(v) => array_to_script(lua, v, |c| char16_to_script(lua, *c))?,
        NativeValue::ArrayInt8(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayInt16(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayInt32(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayInt64(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayUInt8(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayUInt16(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayUInt32(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayUInt64(v) => array_to_script(lua, v, |i| Ok(integer_to_script(*i)))?,
        NativeValue::ArrayPointer(v) => array_to_script(lua, v, |p| Ok(pointer_to_script(*p)))?,
        NativeValue::ArrayFloat(v) => array_to_script(lua, v, |f| Ok(Value::Number(*f as f64)))?,
        NativeValue::ArrayDouble(v) => array_to_script(lua, v, |f| Ok(Value::Number(*f)))?,
        NativeValue::ArrayString(v) => array_to_script(lua, v, |s| string_to_script(lua, s))?,
        NativeValue::ArrayAny(v) => array_to_script(lua, v, |x| any_to_script(env, x))?,
        NativeValue::ArrayVector2(v) => array_to_script(lua, v, |x| vector2_to_script(env, x))?,
        NativeValue::ArrayVector3(v) => array_to_script(lua, v, |x| vector3_to_script(env, x))?,
        NativeValue::ArrayVector4(v) => array_to_script(lua, v, |x| vector4_to_script(env, x))?,
        NativeValue::ArrayMatrix4x4(v) => {
            array_to_script(lua, v, |x| matrix4x4_to_script(env, x))?
        }
    })
}
