//! Scalar and struct marshalling - Lua ↔ native conversions
//!
//! Design: one pure `*_from_script` function per native representation, and
//! `*_to_script` counterparts that need the interpreter (strings, tables) or
//! the captured struct constructors.

use mlua::{Function, Lua, MultiValue, RegistryKey, Table, Value};
use num_traits::NumCast;
use smallvec::SmallVec;

use super::error::{ConversionError, Utf16Error};
use super::types::ValueKind;
use super::values::{Matrix4x4, Vector2, Vector3, Vector4};

/// Script-side constructors of the struct kinds, pinned in the registry
pub struct StructConstructors {
    vector2: RegistryKey,
    vector3: RegistryKey,
    vector4: RegistryKey,
    matrix4x4: RegistryKey,
}

impl StructConstructors {
    /// Capture `Name.new` of every struct type exported by `module`
    pub fn capture(lua: &Lua, module: &Table) -> mlua::Result<Self> {
        let pin = |name: &str| -> mlua::Result<RegistryKey> {
            let class: Table = module.get(name)?;
            let new: Function = class.get("new")?;
            lua.create_registry_value(new)
        };

        Ok(Self {
            vector2: pin("Vector2")?,
            vector3: pin("Vector3")?,
            vector4: pin("Vector4")?,
            matrix4x4: pin("Matrix4x4")?,
        })
    }

    fn get(&self, kind: ValueKind) -> Option<&RegistryKey> {
        match kind {
            ValueKind::Vector2 => Some(&self.vector2),
            ValueKind::Vector3 => Some(&self.vector3),
            ValueKind::Vector4 => Some(&self.vector4),
            ValueKind::Matrix4x4 => Some(&self.matrix4x4),
            _ => None,
        }
    }
}

/// Interpreter plus everything needed to build script values
pub struct ScriptEnv {
    lua: Lua,
    constructors: StructConstructors,
}

impl ScriptEnv {
    pub fn new(lua: Lua, constructors: StructConstructors) -> Self {
        Self { lua, constructors }
    }

    #[inline]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn construct(&self, kind: ValueKind, components: &[f32]) -> Result<Value, ConversionError> {
        let name = struct_tag(kind);
        let failed = |message: String| ConversionError::Constructor { name, message };

        let key = self
            .constructors
            .get(kind)
            .ok_or_else(|| failed("no constructor registered".to_string()))?;
        let new: Function = self.lua.registry_value(key).map_err(|e| failed(e.to_string()))?;

        let args: MultiValue = components
            .iter()
            .map(|&c| Value::Number(c as f64))
            .collect();
        new.call::<Value>(args).map_err(|e| failed(e.to_string()))
    }
}

// ============================================================================
// Integers
// ============================================================================

/// Integer types reachable from a 64-bit script integer
pub trait ScriptInteger: Copy {
    const KIND: ValueKind;

    /// Narrow a script integer, `None` when out of range
    fn from_script_integer(value: i64) -> Option<Self>;

    fn into_script_integer(self) -> i64;
}

macro_rules! script_integer {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl ScriptInteger for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            #[inline]
            fn from_script_integer(value: i64) -> Option<Self> {
                <$ty as NumCast>::from(value)
            }

            #[inline]
            fn into_script_integer(self) -> i64 {
                self as i64
            }
        }
    )*};
}

script_integer!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
);

// Script integers are 64-bit two's complement; uint64 reuses every bit pattern.
impl ScriptInteger for u64 {
    const KIND: ValueKind = ValueKind::UInt64;

    #[inline]
    fn from_script_integer(value: i64) -> Option<Self> {
        Some(value as u64)
    }

    #[inline]
    fn into_script_integer(self) -> i64 {
        self as i64
    }
}

/// Check whether a script integer fits the target integer type
#[inline]
pub fn is_in_range<T: ScriptInteger>(value: i64) -> bool {
    T::from_script_integer(value).is_some()
}

pub fn integer_from_script<T: ScriptInteger>(value: &Value) -> Result<T, ConversionError> {
    match value {
        Value::Integer(i) => T::from_script_integer(*i).ok_or(ConversionError::Overflow {
            target: T::KIND,
            value: *i,
        }),
        other => Err(ConversionError::type_mismatch("integer", other.type_name())),
    }
}

#[inline]
pub fn integer_to_script<T: ScriptInteger>(value: T) -> Value {
    Value::Integer(value.into_script_integer())
}

// ============================================================================
// Bool, floats, pointers
// ============================================================================

pub fn bool_from_script(value: &Value) -> Result<bool, ConversionError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(ConversionError::type_mismatch("boolean", other.type_name())),
    }
}

pub fn double_from_script(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Integer(i) => Ok(*i as f64),
        other => Err(ConversionError::type_mismatch("number", other.type_name())),
    }
}

/// Narrowing never fails; out-of-range values become infinities
#[inline]
pub fn float_from_script(value: &Value) -> Result<f32, ConversionError> {
    double_from_script(value).map(|d| d as f32)
}

pub fn pointer_from_script(value: &Value) -> Result<usize, ConversionError> {
    match value {
        Value::Integer(i) => Ok(*i as usize),
        other => Err(ConversionError::type_mismatch("integer", other.type_name())),
    }
}

#[inline]
pub fn pointer_to_script(value: usize) -> Value {
    Value::Integer(value as i64)
}

// ============================================================================
// Characters and strings
// ============================================================================

pub fn char8_from_script(value: &Value) -> Result<u8, ConversionError> {
    let Value::String(s) = value else {
        return Err(ConversionError::type_mismatch("string", value.type_name()));
    };
    match &*s.as_bytes() {
        [] => Ok(0),
        [c] if c.is_ascii() => Ok(*c),
        [_] => Err(ConversionError::Char8Multibyte),
        _ => Err(ConversionError::Char8TooLong),
    }
}

pub fn char8_to_script(lua: &Lua, value: u8) -> Result<Value, ConversionError> {
    let bytes: &[u8] = if value == 0 { &[] } else { core::slice::from_ref(&value) };
    Ok(Value::String(lua.create_string(bytes)?))
}

pub fn char16_from_script(value: &Value) -> Result<u16, ConversionError> {
    let Value::String(s) = value else {
        return Err(ConversionError::type_mismatch("string", value.type_name()));
    };
    let bytes = s.as_bytes();
    let bytes: &[u8] = &bytes;
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 3 {
        return Err(ConversionError::Char16TooLong);
    }

    let (consumed, unit) = decode_utf16_unit(bytes).map_err(ConversionError::Char16)?;
    if consumed.max(1) != bytes.len() {
        return Err(ConversionError::Char16(Utf16Error::InvalidSequence));
    }
    Ok(unit)
}

pub fn char16_to_script(lua: &Lua, value: u16) -> Result<Value, ConversionError> {
    let bytes = encode_utf16_unit(value).map_err(ConversionError::Char16)?;
    Ok(Value::String(lua.create_string(&bytes[..])?))
}

/// Decode the leading UTF-8 scalar of `bytes` into one UTF-16 code unit
///
/// Returns the number of bytes consumed (0 for NUL) and the code unit.
pub fn decode_utf16_unit(bytes: &[u8]) -> Result<(usize, u16), Utf16Error> {
    let continuation = |i: usize| -> Result<u16, Utf16Error> {
        match bytes.get(i) {
            Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
            _ => Err(Utf16Error::InvalidSequence),
        }
    };

    let Some(&lead) = bytes.first() else {
        return Err(Utf16Error::InvalidSequence);
    };

    match lead {
        0x00 => Ok((0, 0)),
        0x01..=0x7F => Ok((1, lead as u16)),
        0x80..=0xBF => Err(Utf16Error::Encoding),
        0xC0..=0xDF => {
            let unit = ((lead as u16 & 0x1F) << 6) | continuation(1)?;
            Ok((2, unit))
        }
        0xE0..=0xEF => {
            let unit = ((lead as u16 & 0x0F) << 12) | (continuation(1)? << 6) | continuation(2)?;
            if (0xD800..0xE000).contains(&unit) {
                return Err(Utf16Error::Encoding);
            }
            Ok((3, unit))
        }
        0xF0..=0xF7 => Err(Utf16Error::SurrogatePair),
        _ => Err(Utf16Error::Encoding),
    }
}

/// Encode one UTF-16 code unit as 0..=3 UTF-8 bytes (NUL encodes as nothing)
pub fn encode_utf16_unit(unit: u16) -> Result<SmallVec<[u8; 3]>, Utf16Error> {
    let mut out = SmallVec::new();
    match unit {
        0 => {}
        0x01..=0x7F => out.push(unit as u8),
        0x80..=0x7FF => {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        0xD800..=0xDFFF => return Err(Utf16Error::Encoding),
        _ => {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
    Ok(out)
}

/// Numbers are accepted and take their script string form (`5`, `1.5`)
pub fn string_from_script(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::String(s) => {
            let bytes = s.as_bytes();
            std::str::from_utf8(&bytes)
                .map(str::to_owned)
                .map_err(|_| ConversionError::InvalidUtf8)
        }
        Value::Integer(_) | Value::Number(_) => Ok(value.to_string()?),
        other => Err(ConversionError::type_mismatch("string", other.type_name())),
    }
}

pub fn string_to_script(lua: &Lua, value: &str) -> Result<Value, ConversionError> {
    Ok(Value::String(lua.create_string(value)?))
}

// ============================================================================
// Struct types
// ============================================================================

/// Metatable tag identifying a struct kind
pub const fn struct_tag(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Vector2 => "Vector2",
        ValueKind::Vector3 => "Vector3",
        ValueKind::Vector4 => "Vector4",
        ValueKind::Matrix4x4 => "Matrix4x4",
        _ => "table",
    }
}

/// Raw `__type` tag of a table's metatable, if any
pub(crate) fn type_tag(table: &Table) -> Option<String> {
    let metatable = table.metatable()?;
    match metatable.get::<Value>("__type").ok()? {
        Value::String(s) => Some(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        _ => None,
    }
}

/// Struct kind named by a table's type tag
pub(crate) fn tagged_struct_kind(table: &Table) -> Option<ValueKind> {
    let tag = type_tag(table)?;
    [ValueKind::Vector2, ValueKind::Vector3, ValueKind::Vector4, ValueKind::Matrix4x4]
        .into_iter()
        .find(|kind| struct_tag(*kind) == tag)
}

fn struct_table(value: &Value, kind: ValueKind) -> Result<&Table, ConversionError> {
    let expected = struct_tag(kind);
    let Value::Table(table) = value else {
        return Err(ConversionError::type_mismatch(expected, value.type_name()));
    };
    if table.metatable().is_none() {
        return Err(ConversionError::MissingMetatable { expected });
    }
    match type_tag(table) {
        Some(tag) if tag == expected => Ok(table),
        Some(tag) => Err(ConversionError::type_mismatch(expected, tag)),
        None => Err(ConversionError::type_mismatch(expected, "table")),
    }
}

fn number_field(table: &Table, field: &str) -> Result<f32, ConversionError> {
    let value: Value = table.get(field)?;
    match value {
        Value::Number(n) => Ok(n as f32),
        Value::Integer(i) => Ok(i as f32),
        other => Err(ConversionError::Field {
            field: field.to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

pub fn vector2_from_script(value: &Value) -> Result<Vector2, ConversionError> {
    let t = struct_table(value, ValueKind::Vector2)?;
    Ok(Vector2::new(number_field(t, "x")?, number_field(t, "y")?))
}

pub fn vector3_from_script(value: &Value) -> Result<Vector3, ConversionError> {
    let t = struct_table(value, ValueKind::Vector3)?;
    Ok(Vector3::new(
        number_field(t, "x")?,
        number_field(t, "y")?,
        number_field(t, "z")?,
    ))
}

pub fn vector4_from_script(value: &Value) -> Result<Vector4, ConversionError> {
    let t = struct_table(value, ValueKind::Vector4)?;
    Ok(Vector4::new(
        number_field(t, "x")?,
        number_field(t, "y")?,
        number_field(t, "z")?,
        number_field(t, "w")?,
    ))
}

pub fn matrix4x4_from_script(value: &Value) -> Result<Matrix4x4, ConversionError> {
    let t = struct_table(value, ValueKind::Matrix4x4)?;
    let Value::Table(rows) = t.get::<Value>("m")? else {
        return Err(ConversionError::MatrixShape);
    };

    let mut matrix = Matrix4x4::default();
    for (r, row) in matrix.m.iter_mut().enumerate() {
        let Value::Table(cells) = rows.raw_get::<Value>(r + 1)? else {
            return Err(ConversionError::MatrixShape);
        };
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = match cells.raw_get::<Value>(c + 1)? {
                Value::Number(n) => n as f32,
                Value::Integer(i) => i as f32,
                _ => return Err(ConversionError::MatrixElement { row: r, column: c }),
            };
        }
    }
    Ok(matrix)
}

pub fn vector2_to_script(env: &ScriptEnv, v: &Vector2) -> Result<Value, ConversionError> {
    env.construct(ValueKind::Vector2, &[v.x, v.y])
}

pub fn vector3_to_script(env: &ScriptEnv, v: &Vector3) -> Result<Value, ConversionError> {
    env.construct(ValueKind::Vector3, &[v.x, v.y, v.z])
}

pub fn vector4_to_script(env: &ScriptEnv, v: &Vector4) -> Result<Value, ConversionError> {
    env.construct(ValueKind::Vector4, &[v.x, v.y, v.z, v.w])
}

pub fn matrix4x4_to_script(env: &ScriptEnv, v: &Matrix4x4) -> Result<Value, ConversionError> {
    let mut components = [0.0f32; 16];
    for (dst, src) in components.iter_mut().zip(v.m.iter().flatten()) {
        *dst = *src;
    }
    env.construct(ValueKind::Matrix4x4, &components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii_and_nul() {
        assert_eq!(decode_utf16_unit(b"A"), Ok((1, 0x41)));
        assert_eq!(decode_utf16_unit(b"\0"), Ok((0, 0)));
    }

    #[test]
    fn test_decode_multibyte() {
        assert_eq!(decode_utf16_unit("é".as_bytes()), Ok((2, 0xE9)));
        assert_eq!(decode_utf16_unit("€".as_bytes()), Ok((3, 0x20AC)));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_utf16_unit(b""), Err(Utf16Error::InvalidSequence));
        assert_eq!(decode_utf16_unit(&[0xC3]), Err(Utf16Error::InvalidSequence));
        assert_eq!(decode_utf16_unit(&[0xC3, 0x41]), Err(Utf16Error::InvalidSequence));
        assert_eq!(decode_utf16_unit(&[0x80]), Err(Utf16Error::Encoding));
        assert_eq!(decode_utf16_unit(&[0xED, 0xA0, 0x80]), Err(Utf16Error::Encoding));
        assert_eq!(decode_utf16_unit("😀".as_bytes()), Err(Utf16Error::SurrogatePair));
    }

    #[test]
    fn test_encode_rejects_surrogates() {
        assert!(encode_utf16_unit(0x0000).unwrap().is_empty());
        assert_eq!(&encode_utf16_unit(0x41).unwrap()[..], b"A");
        assert_eq!(&encode_utf16_unit(0x20AC).unwrap()[..], "€".as_bytes());
        assert_eq!(encode_utf16_unit(0xD83D), Err(Utf16Error::Encoding));
    }

    #[test]
    fn test_integer_range() {
        assert!(is_in_range::<u8>(255));
        assert!(!is_in_range::<u8>(256));
        assert!(!is_in_range::<u8>(-1));
        assert!(is_in_range::<i8>(-128));
        assert!(!is_in_range::<i8>(-129));
        assert!(is_in_range::<u64>(-1));
    }

    #[test]
    fn test_integer_requires_exact_integer() {
        let err = integer_from_script::<i32>(&Value::Number(1.0)).unwrap_err();
        assert_eq!(err.to_string(), "integer expected, got number");

        let err = integer_from_script::<u8>(&Value::Integer(300)).unwrap_err();
        assert!(matches!(err, ConversionError::Overflow { target: ValueKind::UInt8, value: 300 }));

        assert_eq!(integer_from_script::<i16>(&Value::Integer(-7)).unwrap(), -7);
        assert_eq!(integer_from_script::<u64>(&Value::Integer(-1)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_floats_accept_integers() {
        assert_eq!(float_from_script(&Value::Integer(3)).unwrap(), 3.0);
        assert_eq!(double_from_script(&Value::Number(0.5)).unwrap(), 0.5);
        assert!(float_from_script(&Value::Number(f64::MAX)).unwrap().is_infinite());
        assert!(double_from_script(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_chars() {
        let lua = Lua::new();
        let s = |text: &[u8]| Value::String(lua.create_string(text).unwrap());

        assert_eq!(char8_from_script(&s(b"")).unwrap(), 0);
        assert_eq!(char8_from_script(&s(b"a")).unwrap(), b'a');
        assert!(matches!(char8_from_script(&s(b"ab")), Err(ConversionError::Char8TooLong)));
        assert!(matches!(char8_from_script(&s(&[0xE9])), Err(ConversionError::Char8Multibyte)));

        assert_eq!(char16_from_script(&s("é".as_bytes())).unwrap(), 0xE9);
        assert_eq!(char16_from_script(&s(b"")).unwrap(), 0);
        assert!(matches!(char16_from_script(&s(b"abcd")), Err(ConversionError::Char16TooLong)));
        assert!(matches!(
            char16_from_script(&s(b"ab")),
            Err(ConversionError::Char16(Utf16Error::InvalidSequence))
        ));
    }

    #[test]
    fn test_string_must_be_utf8() {
        let lua = Lua::new();
        let bad = Value::String(lua.create_string([0xFFu8, 0xFE]).unwrap());
        assert!(matches!(string_from_script(&bad), Err(ConversionError::InvalidUtf8)));
        assert!(string_from_script(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_string_accepts_numbers() {
        assert_eq!(string_from_script(&Value::Integer(5)).unwrap(), "5");
        assert_eq!(string_from_script(&Value::Integer(-12)).unwrap(), "-12");
        assert_eq!(string_from_script(&Value::Number(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_char16_rejects_trailing_bytes() {
        let lua = Lua::new();
        let s = |text: &[u8]| Value::String(lua.create_string(text).unwrap());

        // Exactly one character; nothing after the first code unit
        assert!(matches!(
            char16_from_script(&s("é!".as_bytes())),
            Err(ConversionError::Char16(Utf16Error::InvalidSequence))
        ));
        assert!(matches!(
            char16_from_script(&s(b"\0a")),
            Err(ConversionError::Char16(Utf16Error::InvalidSequence))
        ));
        assert_eq!(char16_from_script(&s(b"\0")).unwrap(), 0);
        assert_eq!(char16_from_script(&s("€".as_bytes())).unwrap(), 0x20AC);
    }
}
