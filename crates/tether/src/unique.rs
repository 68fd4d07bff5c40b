//! The `Unique<T>` exclusive-ownership handle.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

/// A nullable, move-only owner of one boxed value.
///
/// `Unique` has no control block and no counters: ownership transfer is a
/// pointer exchange. It is not `Clone`. Moving out with [`std::mem::take`]
/// leaves an empty handle behind.
///
/// # Examples
///
/// ```
/// use tether::Unique;
///
/// let mut a = Unique::new(String::from("hello"));
/// a.push_str(", world");
///
/// let b = std::mem::take(&mut a);
/// assert!(a.is_null());
/// assert_eq!(&*b, "hello, world");
/// ```
pub struct Unique<T> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

impl<T> Unique<T> {
    /// Allocate `value` and take sole ownership of it.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Take sole ownership of a boxed value.
    #[must_use]
    pub fn from_box(value: Box<T>) -> Self {
        Self {
            ptr: Some(NonNull::from(Box::leak(value))),
            _marker: PhantomData,
        }
    }

    /// Take sole ownership of a raw pointer. Null yields an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned
    /// by anything else.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr: NonNull::new(ptr),
            _marker: PhantomData,
        }
    }

    /// Create an empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    /// Give up ownership without destroying the value.
    ///
    /// Returns the raw pointer (null if empty) and leaves the handle empty.
    /// Rebuild the box with [`Box::from_raw`] to free it.
    #[must_use = "the released pointer must be freed with `Box::from_raw`"]
    pub fn release(&mut self) -> *mut T {
        self.ptr.take().map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Give up ownership as a `Box`, leaving the handle empty.
    #[must_use]
    pub fn take_box(&mut self) -> Option<Box<T>> {
        // SAFETY: an owned pointer always comes from `Box::into_raw`.
        self.ptr
            .take()
            .map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }

    /// Destroy the owned value, if any, and become empty.
    pub fn reset(&mut self) {
        drop(self.take_box());
    }

    /// Destroy the owned value, if any, and adopt `value`.
    pub fn reset_with(&mut self, value: Box<T>) {
        let old = mem::replace(self, Self::from_box(value));
        drop(old);
    }

    /// Destroy the owned value, if any, and adopt a raw pointer.
    ///
    /// # Safety
    ///
    /// Same contract as [`Unique::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        // SAFETY: guaranteed by the caller.
        let old = mem::replace(self, unsafe { Self::from_raw(ptr) });
        drop(old);
    }

    /// Exchange the values owned by two handles.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// Get a raw pointer to the value, or null if empty.
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Get a reference to the value, or `None` if empty.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the handle owns the value for as long as `self` is borrowed.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Get a mutable reference to the value, or `None` if empty.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: sole ownership plus `&mut self` make this borrow unique.
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Returns `true` if the handle owns a value.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    /// Returns `true` if the handle is empty.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.ptr.is_none()
    }
}

impl<T> Deref for Unique<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty Unique")
    }
}

impl<T> DerefMut for Unique<T> {
    /// # Panics
    ///
    /// Panics if the handle is empty.
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut().expect("dereferenced an empty Unique")
    }
}

impl<T> Drop for Unique<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Unique<T> {
    /// Creates an empty handle.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Unique<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> From<Box<T>> for Unique<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Unique<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Unique").field(value).finish(),
            None => write!(f, "Unique(<empty>)"),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Unique<T> {
    /// Formats the value, or `<empty>` for an empty handle.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("<empty>"),
        }
    }
}

impl<T> fmt::Pointer for Unique<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

// A `Unique<T>` is a `Box<T>` that may be empty.
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Send> Send for Unique<T> {}
#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl<T: Sync> Sync for Unique<T> {}
