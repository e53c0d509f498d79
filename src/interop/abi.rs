//! Native slot layout
//!
//! Design: every parameter occupies one slot. Scalars travel by value;
//! strings, `any`, structs and arrays travel as a pointer to the value, and
//! so does every by-reference parameter. String, `any`, arrays, Vector3,
//! Vector4 and Matrix4x4 are returned through a hidden leading out-pointer
//! to an initialized value, which the callee assigns. Everything else is
//! returned in registers (Vector2 as a two-float struct).

use core::ffi::c_void;
use core::ptr;

use libffi::middle::{Arg, Type};

use super::error::invariant_violation;
use super::types::{MethodSignature, PropertyDescriptor, ValueKind};
use super::values::{NativeValue, Vector2};

/// libffi type of a value held directly in a slot or register
fn register_type(kind: ValueKind) -> Type {
    match kind {
        ValueKind::Void => Type::void(),
        ValueKind::Bool | ValueKind::Char8 | ValueKind::UInt8 => Type::u8(),
        ValueKind::Char16 | ValueKind::UInt16 => Type::u16(),
        ValueKind::Int8 => Type::i8(),
        ValueKind::Int16 => Type::i16(),
        ValueKind::Int32 => Type::i32(),
        ValueKind::Int64 => Type::i64(),
        ValueKind::UInt32 => Type::u32(),
        ValueKind::UInt64 => Type::u64(),
        ValueKind::Float => Type::f32(),
        ValueKind::Double => Type::f64(),
        ValueKind::Vector2 => Type::structure(vec![Type::f32(), Type::f32()]),
        _ => Type::pointer(),
    }
}

/// libffi type of a parameter slot
pub fn param_type(property: &PropertyDescriptor) -> Type {
    if property.by_ref || property.kind.is_passed_by_pointer() {
        Type::pointer()
    } else {
        register_type(property.kind)
    }
}

/// libffi return type; hidden returns come back through slot 0
pub fn return_type(kind: ValueKind) -> Type {
    if kind.is_hidden_return() {
        Type::void()
    } else {
        register_type(kind)
    }
}

/// Argument and return types of the native form of a signature
pub fn signature_types(signature: &MethodSignature) -> (Vec<Type>, Type) {
    let hidden = signature.ret.kind.is_hidden_return();
    let mut params = Vec::with_capacity(signature.params.len() + hidden as usize);
    if hidden {
        params.push(Type::pointer());
    }
    params.extend(signature.params.iter().map(param_type));
    (params, return_type(signature.ret.kind))
}

/// One by-value argument slot
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Ptr(*mut c_void),
}

impl Slot {
    /// Slot for a scalar value, `None` for pointer-passed kinds
    pub fn from_scalar(value: &NativeValue) -> Option<Self> {
        Some(match *value {
            NativeValue::Bool(v) => Self::U8(v as u8),
            NativeValue::Char8(v) | NativeValue::UInt8(v) => Self::U8(v),
            NativeValue::Char16(v) | NativeValue::UInt16(v) => Self::U16(v),
            NativeValue::Int8(v) => Self::I8(v),
            NativeValue::Int16(v) => Self::I16(v),
            NativeValue::Int32(v) => Self::I32(v),
            NativeValue::Int64(v) => Self::I64(v),
            NativeValue::UInt32(v) => Self::U32(v),
            NativeValue::UInt64(v) => Self::U64(v),
            NativeValue::Pointer(v) | NativeValue::Function(v) => Self::Ptr(v as *mut c_void),
            NativeValue::Float(v) => Self::F32(v),
            NativeValue::Double(v) => Self::F64(v),
            _ => return None,
        })
    }

    /// libffi argument pointing at this slot
    pub fn as_arg(&self) -> Arg {
        match self {
            Self::U8(v) => Arg::new(v),
            Self::I8(v) => Arg::new(v),
            Self::U16(v) => Arg::new(v),
            Self::I16(v) => Arg::new(v),
            Self::U32(v) => Arg::new(v),
            Self::I32(v) => Arg::new(v),
            Self::U64(v) => Arg::new(v),
            Self::I64(v) => Arg::new(v),
            Self::F32(v) => Arg::new(v),
            Self::F64(v) => Arg::new(v),
            Self::Ptr(v) => Arg::new(v),
        }
    }
}

/// Argument vector handed to a generated entry point
pub struct NativeArgs {
    args: *const *const c_void,
    count: usize,
}

impl NativeArgs {
    /// # Safety
    /// `args` must point to `count` valid argument addresses.
    pub unsafe fn new(args: *const *const c_void, count: usize) -> Self {
        Self { args, count }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Address of argument `index`
    ///
    /// # Safety
    /// `index` must be below `len()`.
    #[inline]
    pub unsafe fn raw(&self, index: usize) -> *const c_void {
        debug_assert!(index < self.count);
        *self.args.add(index)
    }
}

/// Read the value a parameter slot designates
///
/// # Safety
/// `slot` must point to a live argument laid out as `property` describes.
pub unsafe fn read_arg(property: &PropertyDescriptor, slot: *const c_void) -> NativeValue {
    if property.by_ref || property.kind.is_passed_by_pointer() {
        let target = *(slot as *const *const c_void);
        if target.is_null() {
            return NativeValue::default_for(property.kind);
        }
        read_value(property.kind, target)
    } else {
        read_value(property.kind, slot)
    }
}

/// Store into the value a by-reference parameter points at
///
/// # Safety
/// `slot` must hold a pointer to an initialized value of `property.kind`.
pub unsafe fn write_through(property: &PropertyDescriptor, slot: *const c_void, value: NativeValue) {
    let target = *(slot as *const *mut c_void);
    if !target.is_null() {
        write_value(property.kind, target, value);
    }
}

/// Clone the value of `kind` stored at `src`
///
/// # Safety
/// `src` must point to an initialized value of the native type of `kind`.
pub unsafe fn read_value(kind: ValueKind, src: *const c_void) -> NativeValue {
    unsafe fn get<T: Clone>(src: *const c_void) -> T {
        (*(src as *const T)).clone()
    }

    match kind {
        ValueKind::Void => NativeValue::Void,
        ValueKind::Bool => NativeValue::Bool(get::<u8>(src) != 0),
        ValueKind::Char8 => NativeValue::Char8(get(src)),
        ValueKind::Char16 => NativeValue::Char16(get(src)),
        ValueKind::Int8 => NativeValue::Int8(get(src)),
        ValueKind::Int16 => NativeValue::Int16(get(src)),
        ValueKind::Int32 => NativeValue::Int32(get(src)),
        ValueKind::Int64 => NativeValue::Int64(get(src)),
        ValueKind::UInt8 => NativeValue::UInt8(get(src)),
        ValueKind::UInt16 => NativeValue::UInt16(get(src)),
        ValueKind::UInt32 => NativeValue::UInt32(get(src)),
        ValueKind::UInt64 => NativeValue::UInt64(get(src)),
        ValueKind::Pointer => NativeValue::Pointer(get(src)),
        ValueKind::Float => NativeValue::Float(get(src)),
        ValueKind::Double => NativeValue::Double(get(src)),
        ValueKind::Function => NativeValue::Function(get(src)),
        ValueKind::String => NativeValue::String(get(src)),
        ValueKind::Any => get::<NativeValue>(src),
        ValueKind::Vector2 => NativeValue::Vector2(get(src)),
        ValueKind::Vector3 => NativeValue::Vector3(get(src)),
        ValueKind::Vector4 => NativeValue::Vector4(get(src)),
        ValueKind::Matrix4x4 => NativeValue::Matrix4x4(get(src)),
        ValueKind::ArrayBool => NativeValue::ArrayBool(get(src)),
        ValueKind::ArrayChar8 => NativeValue::ArrayChar8(get(src)),
        ValueKind::ArrayChar16 => NativeValue::ArrayChar16(get(src)),
        ValueKind::ArrayInt8 => NativeValue::ArrayInt8(get(src)),
        ValueKind::ArrayInt16 => NativeValue::ArrayInt16(get(src)),
        ValueKind::ArrayInt32 => NativeValue::ArrayInt32(get(src)),
        ValueKind::ArrayInt64 => NativeValue::ArrayInt64(get(src)),
        ValueKind::ArrayUInt8 => NativeValue::ArrayUInt8(get(src)),
        ValueKind::ArrayUInt16 => NativeValue::ArrayUInt16(get(src)),
        ValueKind::ArrayUInt32 => NativeValue::ArrayUInt32(get(src)),
        ValueKind::ArrayUInt64 => NativeValue::ArrayUInt64(get(src)),
        ValueKind::ArrayPointer => NativeValue::ArrayPointer(get(src)),
        ValueKind::ArrayFloat => NativeValue::ArrayFloat(get(src)),
        ValueKind::ArrayDouble => NativeValue::ArrayDouble(get(src)),
        ValueKind::ArrayString => NativeValue::ArrayString(get(src)),
        ValueKind::ArrayAny => NativeValue::ArrayAny(get(src)),
        ValueKind::ArrayVector2 => NativeValue::ArrayVector2(get(src)),
        ValueKind::ArrayVector3 => NativeValue::ArrayVector3(get(src)),
        ValueKind::ArrayVector4 => NativeValue::ArrayVector4(get(src)),
        ValueKind::ArrayMatrix4x4 => NativeValue::ArrayMatrix4x4(get(src)),
    }
}

/// Assign `value` to the initialized native value of `kind` at `dst`
///
/// # Safety
/// `dst` must point to an initialized, writable value of the native type of
/// `kind`. A variant that does not belong to `kind` aborts the process.
pub unsafe fn write_value(kind: ValueKind, dst: *mut c_void, value: NativeValue) {
    unsafe fn set<T>(dst: *mut c_void, value: T) {
        *(dst as *mut T) = value;
    }

    match (kind, value) {
        (ValueKind::Void, _) => {}
        (ValueKind::Any, v) => set::<NativeValue>(dst, v),
        (ValueKind::Bool, NativeValue::Bool(v)) => set(dst, v),
        (ValueKind::Char8, NativeValue::Char8(v)) => set(dst, v),
        (ValueKind::Char16, NativeValue::Char16(v)) => set(dst, v),
        (ValueKind::Int8, NativeValue::Int8(v)) => set(dst, v),
        (ValueKind::Int16, NativeValue::Int16(v)) => set(dst, v),
        (ValueKind::Int32, NativeValue::Int32(v)) => set(dst, v),
        (ValueKind::Int64, NativeValue::Int64(v)) => set(dst, v),
        (ValueKind::UInt8, NativeValue::UInt8(v)) => set(dst, v),
        (ValueKind::UInt16, NativeValue::UInt16(v)) => set(dst, v),
        (ValueKind::UInt32, NativeValue::UInt32(v)) => set(dst, v),
        (ValueKind::UInt64, NativeValue::UInt64(v)) => set(dst, v),
        (ValueKind::Pointer, NativeValue::Pointer(v)) => set(dst, v),
        (ValueKind::Float, NativeValue::Float(v)) => set(dst, v),
        (ValueKind::Double, NativeValue::Double(v)) => set(dst, v),
        (ValueKind::Function, NativeValue::Function(v)) => set(dst, v),
        (ValueKind::String, NativeValue::String(v)) => set(dst, v),
        (ValueKind::Vector2, NativeValue::Vector2(v)) => set(dst, v),
        (ValueKind::Vector3, NativeValue::Vector3(v)) => set(dst, v),
        (ValueKind::Vector4, NativeValue::Vector4(v)) => set(dst, v),
        (ValueKind::Matrix4x4, NativeValue::Matrix4x4(v)) => set(dst, v),
        (ValueKind::ArrayBool, NativeValue::ArrayBool(v)) => set(dst, v),
        (ValueKind::ArrayChar8, NativeValue::ArrayChar8(v)) => set(dst, v),
        (ValueKind::ArrayChar16, NativeValue::ArrayChar16(v)) => set(dst, v),
        (ValueKind::ArrayInt8, NativeValue::ArrayInt8(v)) => set(dst, v),
        (ValueKind::ArrayInt16, NativeValue::ArrayInt16(v)) => set(dst, v),
        (ValueKind::ArrayInt32, NativeValue::ArrayInt32(v)) => set(dst, v),
        (ValueKind::ArrayInt64, NativeValue::ArrayInt64(v)) => set(dst, v),
        (ValueKind::ArrayUInt8, NativeValue::ArrayUInt8(v)) => set(dst, v),
        (ValueKind::ArrayUInt16, NativeValue::ArrayUInt16(v)) => set(dst, v),
        (ValueKind::ArrayUInt32, NativeValue::ArrayUInt32(v)) => set(dst, v),
        (ValueKind::ArrayUInt64, NativeValue::ArrayUInt64(v)) => set(dst, v),
        (ValueKind::ArrayPointer, NativeValue::ArrayPointer(v)) => set(dst, v),
        (ValueKind::ArrayFloat, NativeValue::ArrayFloat(v)) => set(dst, v),
        (ValueKind::ArrayDouble, NativeValue::ArrayDouble(v)) => set(dst, v),
        (ValueKind::ArrayString, NativeValue::ArrayString(v)) => set(dst, v),
        (ValueKind::ArrayAny, NativeValue::ArrayAny(v)) => set(dst, v),
        (ValueKind::ArrayVector2, NativeValue::ArrayVector2(v)) => set(dst, v),
        (ValueKind::ArrayVector3, NativeValue::ArrayVector3(v)) => set(dst, v),
        (ValueKind::ArrayVector4, NativeValue::ArrayVector4(v)) => set(dst, v),
        (ValueKind::ArrayMatrix4x4, NativeValue::ArrayMatrix4x4(v)) => set(dst, v),
        (kind, other) => invariant_violation("write_value", kind, other.kind()),
    }
}

/// Store a register-returned value, widening small integers to a full word
///
/// # Safety
/// `dst` must be the return buffer of a generated entry point.
unsafe fn write_register(kind: ValueKind, dst: *mut c_void, value: NativeValue) {
    match (kind, value) {
        (ValueKind::Void, _) => {}
        (ValueKind::Bool, NativeValue::Bool(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::Char8, NativeValue::Char8(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::Char16, NativeValue::Char16(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::Int8, NativeValue::Int8(v)) => *(dst as *mut i64) = v as i64,
        (ValueKind::Int16, NativeValue::Int16(v)) => *(dst as *mut i64) = v as i64,
        (ValueKind::Int32, NativeValue::Int32(v)) => *(dst as *mut i64) = v as i64,
        (ValueKind::Int64, NativeValue::Int64(v)) => *(dst as *mut i64) = v,
        (ValueKind::UInt8, NativeValue::UInt8(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::UInt16, NativeValue::UInt16(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::UInt32, NativeValue::UInt32(v)) => *(dst as *mut u64) = v as u64,
        (ValueKind::UInt64, NativeValue::UInt64(v)) => *(dst as *mut u64) = v,
        (ValueKind::Pointer, NativeValue::Pointer(v)) => *(dst as *mut usize) = v,
        (ValueKind::Function, NativeValue::Function(v)) => *(dst as *mut usize) = v,
        (ValueKind::Float, NativeValue::Float(v)) => *(dst as *mut f32) = v,
        (ValueKind::Double, NativeValue::Double(v)) => *(dst as *mut f64) = v,
        (ValueKind::Vector2, NativeValue::Vector2(v)) => ptr::write(dst as *mut Vector2, v),
        (kind, other) => invariant_violation("write_register", kind, other.kind()),
    }
}

/// Where a generated entry point delivers its result
pub struct ReturnSlot {
    kind: ValueKind,
    register: *mut c_void,
    hidden: *mut c_void,
}

impl ReturnSlot {
    /// # Safety
    /// `register` must be the libffi return buffer and `args` the matching
    /// argument vector; for hidden returns slot 0 holds the out-pointer.
    pub unsafe fn new(kind: ValueKind, register: *mut c_void, args: &NativeArgs) -> Self {
        let hidden = if kind.is_hidden_return() && !args.is_empty() {
            *(args.raw(0) as *const *mut c_void)
        } else {
            ptr::null_mut()
        };
        Self { kind, register, hidden }
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Deliver the result
    pub fn write(&mut self, value: NativeValue) {
        unsafe {
            if self.kind.is_hidden_return() {
                if !self.hidden.is_null() {
                    write_value(self.kind, self.hidden, value);
                }
            } else {
                write_register(self.kind, self.register, value);
            }
        }
    }

    /// Deliver the kind-appropriate zero value
    pub fn write_fallback(&mut self) {
        self.write(NativeValue::default_for(self.kind));
    }
}
