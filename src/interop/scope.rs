//! Transient storage for one call
//!
//! Design: every heap value created while filling argument slots is recorded
//! the moment it is allocated and released when the scope drops, on success
//! and failure alike. Storage cells own a `NativeValue`, so release is the
//! value's own drop and covers every kind.

use core::ffi::c_void;
use core::ptr::NonNull;

use smallvec::SmallVec;

use super::abi::Slot;
use super::error::invariant_violation;
use super::stats::{self, Counter};
use super::types::{PropertyDescriptor, ValueKind};
use super::values::NativeValue;

/// Heap cell whose address is handed to native code
pub struct OwnedArg {
    kind: ValueKind,
    value: NonNull<NativeValue>,
}

impl OwnedArg {
    fn new(kind: ValueKind, value: NativeValue) -> Self {
        if kind != ValueKind::Any && value.kind() != kind {
            invariant_violation("ArgsScope::push_owned", kind, value.kind());
        }
        stats::bump(Counter::StorageAllocated);
        Self {
            kind,
            value: NonNull::from(Box::leak(Box::new(value))),
        }
    }

    /// Address passed in the slot: the payload, or the whole union for `any`
    fn as_ptr(&self) -> *mut c_void {
        if self.kind == ValueKind::Any {
            self.value.as_ptr() as *mut c_void
        } else {
            // SAFETY: the cell exclusively owns the allocation.
            unsafe { (*self.value.as_ptr()).payload_ptr() }
        }
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[inline]
    pub fn value(&self) -> &NativeValue {
        // SAFETY: allocated in `new`, freed only in `drop`.
        unsafe { self.value.as_ref() }
    }

    fn take(&mut self) -> NativeValue {
        // SAFETY: as above; the cell is left holding an empty value.
        unsafe { core::mem::take(self.value.as_mut()) }
    }
}

impl Drop for OwnedArg {
    fn drop(&mut self) {
        // SAFETY: produced by `Box::leak` in `new` and dropped exactly once.
        unsafe { drop(Box::from_raw(self.value.as_ptr())) };
        stats::bump(Counter::StorageReleased);
    }
}

/// Argument slots plus the storage they point into
pub struct ArgsScope {
    slots: SmallVec<[Slot; 8]>,
    storage: SmallVec<[OwnedArg; 4]>,
}

impl ArgsScope {
    pub fn with_capacity(slots: usize) -> Self {
        Self {
            slots: SmallVec::with_capacity(slots),
            storage: SmallVec::new(),
        }
    }

    /// Place a converted parameter
    ///
    /// Scalars go inline; pointer-passed kinds and by-reference parameters
    /// get a storage cell, whose index is returned.
    pub fn push_param(&mut self, property: &PropertyDescriptor, value: NativeValue) -> Option<usize> {
        if property.by_ref || property.kind.is_passed_by_pointer() {
            return Some(self.push_owned(property.kind, value));
        }
        match Slot::from_scalar(&value) {
            Some(slot) => self.slots.push(slot),
            None => invariant_violation("ArgsScope::push_param", property.kind, value.kind()),
        }
        None
    }

    /// Move `value` into a new storage cell and pass its address
    pub fn push_owned(&mut self, kind: ValueKind, value: NativeValue) -> usize {
        let cell = OwnedArg::new(kind, value);
        self.slots.push(Slot::Ptr(cell.as_ptr()));
        self.storage.push(cell);
        self.storage.len() - 1
    }

    /// Allocate the default return value and pass its address first
    pub fn push_hidden_return(&mut self, kind: ValueKind) -> usize {
        debug_assert!(self.slots.is_empty());
        self.push_owned(kind, NativeValue::default_for(kind))
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live storage cells
    #[inline]
    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }

    pub fn owned(&self, index: usize) -> &NativeValue {
        self.storage[index].value()
    }

    /// Move a value out of its cell; the cell is still released on drop
    pub fn take_owned(&mut self, index: usize) -> NativeValue {
        self.storage[index].take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_stay_inline() {
        let mut scope = ArgsScope::with_capacity(2);
        assert_eq!(scope.push_param(&PropertyDescriptor::new(ValueKind::Int32), NativeValue::Int32(1)), None);
        assert_eq!(scope.len(), 1);
        assert_eq!(scope.storage_len(), 0);
    }

    #[test]
    fn test_by_ref_scalar_gets_storage() {
        let mut scope = ArgsScope::with_capacity(1);
        let property = PropertyDescriptor::new(ValueKind::Int32).by_ref();
        let index = scope.push_param(&property, NativeValue::Int32(5)).unwrap();

        let Slot::Ptr(ptr) = scope.slots()[0] else { panic!("expected pointer slot") };
        unsafe { *(ptr as *mut i32) = 9 };
        assert_eq!(scope.owned(index), &NativeValue::Int32(9));
    }

    #[test]
    fn test_any_passes_the_union() {
        let mut scope = ArgsScope::with_capacity(1);
        scope.push_param(&PropertyDescriptor::new(ValueKind::Any), NativeValue::Double(2.5));

        let Slot::Ptr(ptr) = scope.slots()[0] else { panic!("expected pointer slot") };
        assert_eq!(unsafe { &*(ptr as *const NativeValue) }, &NativeValue::Double(2.5));
    }

    #[test]
    fn test_storage_released_on_drop() {
        let before = stats::snapshot();
        {
            let mut scope = ArgsScope::with_capacity(3);
            scope.push_hidden_return(ValueKind::String);
            scope.push_owned(ValueKind::ArrayInt32, NativeValue::ArrayInt32(vec![1, 2, 3]));
        }
        let after = stats::snapshot();
        assert_eq!(after.storage_allocated - before.storage_allocated, 2);
        assert_eq!(after.storage_released - before.storage_released, 2);
    }
}
