//! Native value model
//!
//! `NativeValue` is the owned, tagged form of every value kind. It doubles as
//! the native representation of `any`, with `Void` meaning "none".

use core::ffi::c_void;
use core::ptr;

use super::types::ValueKind;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Row-major 4x4 matrix
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Matrix4x4 {
    pub m: [[f32; 4]; 4],
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Vector4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Matrix4x4 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
}

/// Native value of any kind
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Void,
    Bool(bool),
    Char8(u8),
    Char16(u16),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Pointer(usize),
    Float(f32),
    Double(f64),
    Function(usize),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    Matrix4x4(Matrix4x4),
    ArrayBool(Vec<bool>),
    ArrayChar8(Vec<u8>),
    ArrayChar16(Vec<u16>),
    ArrayInt8(Vec<i8>),
    ArrayInt16(Vec<i16>),
    ArrayInt32(Vec<i32>),
    ArrayInt64(Vec<i64>),
    ArrayUInt8(Vec<u8>),
    ArrayUInt16(Vec<u16>),
    ArrayUInt32(Vec<u32>),
    ArrayUInt64(Vec<u64>),
    ArrayPointer(Vec<usize>),
    ArrayFloat(Vec<f32>),
    ArrayDouble(Vec<f64>),
    ArrayString(Vec<String>),
    ArrayAny(Vec<NativeValue>),
    ArrayVector2(Vec<Vector2>),
    ArrayVector3(Vec<Vector3>),
    ArrayVector4(Vec<Vector4>),
    ArrayMatrix4x4(Vec<Matrix4x4>),
}

impl NativeValue {
    /// Kind of the payload this value carries
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Void => ValueKind::Void,
            Self::Bool(_) => ValueKind::Bool,
            Self::Char8(_) => ValueKind::Char8,
            Self::Char16(_) => ValueKind::Char16,
            Self::Int8(_) => ValueKind::Int8,
            Self::Int16(_) => ValueKind::Int16,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::UInt8(_) => ValueKind::UInt8,
            Self::UInt16(_) => ValueKind::UInt16,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::UInt64(_) => ValueKind::UInt64,
            Self::Pointer(_) => ValueKind::Pointer,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Function(_) => ValueKind::Function,
            Self::String(_) => ValueKind::String,
            Self::Vector2(_) => ValueKind::Vector2,
            Self::Vector3(_) => ValueKind::Vector3,
            Self::Vector4(_) => ValueKind::Vector4,
            Self::Matrix4x4(_) => ValueKind::Matrix4x4,
            Self::ArrayBool(_) => ValueKind::ArrayBool,
            Self::ArrayChar8(_) => ValueKind::ArrayChar8,
            Self::ArrayChar16(_) => ValueKind::ArrayChar16,
            Self::ArrayInt8(_) => ValueKind::ArrayInt8,
            Self::ArrayInt16(_) => ValueKind::ArrayInt16,
            Self::ArrayInt32(_) => ValueKind::ArrayInt32,
            Self::ArrayInt64(_) => ValueKind::ArrayInt64,
            Self::ArrayUInt8(_) => ValueKind::ArrayUInt8,
            Self::ArrayUInt16(_) => ValueKind::ArrayUInt16,
            Self::ArrayUInt32(_) => ValueKind::ArrayUInt32,
            Self::ArrayUInt64(_) => ValueKind::ArrayUInt64,
            Self::ArrayPointer(_) => ValueKind::ArrayPointer,
            Self::ArrayFloat(_) => ValueKind::ArrayFloat,
            Self::ArrayDouble(_) => ValueKind::ArrayDouble,
            Self::ArrayString(_) => ValueKind::ArrayString,
            Self::ArrayAny(_) => ValueKind::ArrayAny,
            Self::ArrayVector2(_) => ValueKind::ArrayVector2,
            Self::ArrayVector3(_) => ValueKind::ArrayVector3,
            Self::ArrayVector4(_) => ValueKind::ArrayVector4,
            Self::ArrayMatrix4x4(_) => ValueKind::ArrayMatrix4x4,
        }
    }

    /// Zero or empty value of a kind, used as the fallback return
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Void | ValueKind::Any => Self::Void,
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Char8 => Self::Char8(0),
            ValueKind::Char16 => Self::Char16(0),
            ValueKind::Int8 => Self::Int8(0),
            ValueKind::Int16 => Self::Int16(0),
            ValueKind::Int32 => Self::Int32(0),
            ValueKind::Int64 => Self::Int64(0),
            ValueKind::UInt8 => Self::UInt8(0),
            ValueKind::UInt16 => Self::UInt16(0),
            ValueKind::UInt32 => Self::UInt32(0),
            ValueKind::UInt64 => Self::UInt64(0),
            ValueKind::Pointer => Self::Pointer(0),
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Double => Self::Double(0.0),
            ValueKind::Function => Self::Function(0),
            ValueKind::String => Self::String(String::new()),
            ValueKind::Vector2 => Self::Vector2(Vector2::default()),
            ValueKind::Vector3 => Self::Vector3(Vector3::default()),
            ValueKind::Vector4 => Self::Vector4(Vector4::default()),
            ValueKind::Matrix4x4 => Self::Matrix4x4(Matrix4x4::default()),
            ValueKind::ArrayBool => Self::ArrayBool(Vec::new()),
            ValueKind::ArrayChar8 => Self::ArrayChar8(Vec::new()),
            ValueKind::ArrayChar16 => Self::ArrayChar16(Vec::new()),
            ValueKind::ArrayInt8 => Self::ArrayInt8(Vec::new()),
            ValueKind::ArrayInt16 => Self::ArrayInt16(Vec::new()),
            ValueKind::ArrayInt32 => Self::ArrayInt32(Vec::new()),
            ValueKind::ArrayInt64 => Self::ArrayInt64(Vec::new()),
            ValueKind::ArrayUInt8 => Self::ArrayUInt8(Vec::new()),
            ValueKind::ArrayUInt16 => Self::ArrayUInt16(Vec::new()),
            ValueKind::ArrayUInt32 => Self::ArrayUInt32(Vec::new()),
            ValueKind::ArrayUInt64 => Self::ArrayUInt64(Vec::new()),
            ValueKind::ArrayPointer => Self::ArrayPointer(Vec::new()),
            ValueKind::ArrayFloat => Self::ArrayFloat(Vec::new()),
            ValueKind::ArrayDouble => Self::ArrayDouble(Vec::new()),
            ValueKind::ArrayString => Self::ArrayString(Vec::new()),
            ValueKind::ArrayAny => Self::ArrayAny(Vec::new()),
            ValueKind::ArrayVector2 => Self::ArrayVector2(Vec::new()),
            ValueKind::ArrayVector3 => Self::ArrayVector3(Vec::new()),
            ValueKind::ArrayVector4 => Self::ArrayVector4(Vec::new()),
            ValueKind::ArrayMatrix4x4 => Self::ArrayMatrix4x4(Vec::new()),
        }
    }

    #[inline]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Address of the payload, as a native callee expects it
    ///
    /// Null for `Void`. The pointer stays valid as long as `self` is neither
    /// moved nor dropped.
    pub fn payload_ptr(&mut self) -> *mut c_void {
        fn addr<T>(value: &mut T) -> *mut c_void {
            value as *mut T as *mut c_void
        }

        match self {
            Self::Void => ptr::null_mut(),
            Self::Bool(v) => addr(v),
            Self::Char8(v) => addr(v),
            Self::Char16(v) => addr(v),
            Self::Int8(v) => addr(v),
            Self::Int16(v) => addr(v),
            Self::Int32(v) => addr(v),
            Self::Int64(v) => addr(v),
            Self::UInt8(v) => addr(v),
            Self::UInt16(v) => addr(v),
            Self::UInt32(v) => addr(v),
            Self::UInt64(v) => addr(v),
            Self::Pointer(v) => addr(v),
            Self::Float(v) => addr(v),
            Self::Double(v) => addr(v),
            Self::Function(v) => addr(v),
            Self::String(v) => addr(v),
            Self::Vector2(v) => addr(v),
            Self::Vector3(v) => addr(v),
            Self::Vector4(v) => addr(v),
            Self::Matrix4x4(v) => addr(v),
            Self::ArrayBool(v) => addr(v),
            Self::ArrayChar8(v) => addr(v),
            Self::ArrayChar16(v) => addr(v),
            Self::ArrayInt8(v) => addr(v),
            Self::ArrayInt16(v) => addr(v),
            Self::ArrayInt32(v) => addr(v),
            Self::ArrayInt64(v) => addr(v),
            Self::ArrayUInt8(v) => addr(v),
            Self::ArrayUInt16(v) => addr(v),
            Self::ArrayUInt32(v) => addr(v),
            Self::ArrayUInt64(v) => addr(v),
            Self::ArrayPointer(v) => addr(v),
            Self::ArrayFloat(v) => addr(v),
            Self::ArrayDouble(v) => addr(v),
            Self::ArrayString(v) => addr(v),
            Self::ArrayAny(v) => addr(v),
            Self::ArrayVector2(v) => addr(v),
            Self::ArrayVector3(v) => addr(v),
            Self::ArrayVector4(v) => addr(v),
            Self::ArrayMatrix4x4(v) => addr(v),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layout() {
        assert_eq!(core::mem::size_of::<Vector2>(), 8);
        assert_eq!(core::mem::size_of::<Vector3>(), 12);
        assert_eq!(core::mem::size_of::<Vector4>(), 16);
        assert_eq!(core::mem::size_of::<Matrix4x4>(), 64);
    }

    #[test]
    fn test_default_matches_kind() {
        for kind in ValueKind::ALL {
            let value = NativeValue::default_for(kind);
            match kind {
                ValueKind::Any => assert!(value.is_void()),
                _ => assert_eq!(value.kind(), kind),
            }
        }
    }

    #[test]
    fn test_payload_ptr_points_into_value() {
        let mut value = NativeValue::Int32(41);
        let ptr = value.payload_ptr() as *mut i32;
        unsafe { *ptr += 1 };
        assert_eq!(value, NativeValue::Int32(42));

        assert!(NativeValue::Void.payload_ptr().is_null());
    }
}
