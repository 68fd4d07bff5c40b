//! The `Shared<T>` and `Weak<T>` handles.
//!
//! Both handles hold a nullable pointer to a control block and operate on it
//! only through its counters; payload and block lifetime are decided by the
//! release algorithm in [`crate::block`]. They live in one module because
//! each reads the other's block pointer during cross-construction.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ops::Deref;
use std::ptr;

use crate::block::{self, BlockPtr, Counts};
use crate::error::BadWeakPtr;

// ============================================================================
// Shared<T> - reference-counted owning handle
// ============================================================================

/// A reference-counted owning pointer to a value of type `T`.
///
/// Every clone increments the strong count of the shared control block and
/// every drop or [`reset`](Self::reset) decrements it. The payload is
/// destroyed when the last `Shared` lets go; the block itself survives until
/// the last [`Weak`] is gone as well.
///
/// Unlike `std::rc::Rc`, a `Shared` can be empty. An empty handle has no
/// control block, reports a [`use_count`](Self::use_count) of zero and panics
/// when dereferenced. Moving out with [`std::mem::take`] leaves an empty
/// handle behind.
///
/// The payload may borrow data: `Shared<&'a str>` is fine, and the borrow
/// checker keeps every handle inside `'a`.
///
/// # Thread Safety
///
/// `Shared<T>` is `!Send` and `!Sync`. The counters are plain integers.
///
/// # Examples
///
/// ```
/// use tether::Shared;
///
/// let b = Shared::new(5);
/// let a = b.clone();
/// assert_eq!(a.use_count(), 2);
///
/// let mut c = a.clone();
/// let d = std::mem::take(&mut c);
/// assert_eq!(d.use_count(), 3);
/// assert_eq!(c.use_count(), 0);
///
/// drop(d);
/// assert_eq!(b.use_count(), 2);
/// ```
pub struct Shared<T> {
    block: Option<BlockPtr>,
    /// The handle owns a `T` for drop-check purposes.
    _marker: PhantomData<T>,
}

impl<T> Shared<T> {
    /// Create a handle with the payload constructed in place.
    ///
    /// The value and the counters share a single allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether::Shared;
    ///
    /// let pair = Shared::new((11, 0.5));
    /// assert_eq!(pair.0, 11);
    /// assert_eq!(pair.use_count(), 1);
    /// ```
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_block(block::alloc_inline(MaybeUninit::new(value), Counts::new()))
    }

    /// Create a handle whose payload holds a weak reference to itself.
    ///
    /// The closure receives a [`Weak`] attached to the block being built.
    /// It is expired until this function returns, so [`Weak::lock`] inside
    /// the closure yields an empty handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether::{Shared, Weak};
    ///
    /// struct Node {
    ///     me: Weak<Node>,
    ///     value: i32,
    /// }
    ///
    /// let node = Shared::new_cyclic(|me| {
    ///     assert!(me.expired());
    ///     Node { me: me.clone(), value: 42 }
    /// });
    ///
    /// let again = node.me.lock();
    /// assert_eq!(again.value, 42);
    /// assert_eq!(node.use_count(), 2);
    /// ```
    #[must_use]
    pub fn new_cyclic<F>(data_fn: F) -> Self
    where
        F: FnOnce(&Weak<T>) -> T,
    {
        let block = block::alloc_inline::<T>(MaybeUninit::uninit(), Counts::pending());
        // Owns the pending weak reference; if `data_fn` unwinds, dropping it
        // frees the block without touching the uninitialised payload.
        let builder = Weak::from_block(block);

        let value = data_fn(&builder);

        // SAFETY: the block is live while `builder` exists, and the payload
        // slot is uninitialised until this write.
        unsafe {
            block::object(block).cast::<T>().write(value);
            block.as_ref().counts().activate();
        }
        drop(builder);

        Self::from_block(block)
    }

    /// Create a handle adopting a boxed value.
    ///
    /// The block is allocated separately from the box.
    #[must_use]
    pub fn from_box(value: Box<T>) -> Self {
        Self::from_block(block::alloc_external(value))
    }

    /// Create a handle adopting a raw pointer.
    ///
    /// A null pointer yields an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned
    /// by anything else. Adopting the same pointer twice is a double free.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        if ptr.is_null() {
            Self::empty()
        } else {
            // SAFETY: guaranteed by the caller.
            Self::from_box(unsafe { Box::from_raw(ptr) })
        }
    }

    /// Create an empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            block: None,
            _marker: PhantomData,
        }
    }

    /// Wrap a block whose strong reference the caller hands over.
    const fn from_block(block: BlockPtr) -> Self {
        Self {
            block: Some(block),
            _marker: PhantomData,
        }
    }

    /// Create a handle from a weak observer.
    ///
    /// # Errors
    ///
    /// Returns [`BadWeakPtr`] if `weak` is empty or its payload has already
    /// been destroyed. No count is modified in that case.
    pub fn try_from_weak(weak: &Weak<T>) -> Result<Self, BadWeakPtr> {
        let block = weak.block.ok_or(BadWeakPtr)?;
        // SAFETY: the weak reference keeps the block allocated.
        let counts = unsafe { block.as_ref() }.counts();
        if counts.strong() == 0 {
            return Err(BadWeakPtr);
        }
        counts.inc_strong();
        Ok(Self::from_block(block))
    }

    /// Release this handle's strong reference and become empty.
    ///
    /// Destroys the payload if this was the last strong reference, and frees
    /// the control block if no weak reference remains either.
    pub fn reset(&mut self) {
        // Taken first: the payload destructor may observe this handle.
        if let Some(block) = self.block.take() {
            // SAFETY: `block` carried this handle's strong reference.
            unsafe { block::release_strong(block) };
        }
    }

    /// Release the current reference and adopt `value` in a fresh block.
    pub fn reset_with(&mut self, value: Box<T>) {
        self.reset();
        self.block = Some(block::alloc_external(value));
    }

    /// Release the current reference and adopt a raw pointer.
    ///
    /// A null pointer leaves the handle empty.
    ///
    /// # Safety
    ///
    /// Same contract as [`Shared::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        self.reset();
        // SAFETY: guaranteed by the caller.
        *self = unsafe { Self::from_raw(ptr) };
    }

    /// Exchange the blocks of two handles. No count changes.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.block, &mut other.block);
    }

    /// Get a raw pointer to the payload, or null for an empty handle.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.block.map_or(ptr::null(), |block| {
            // SAFETY: this handle's strong reference keeps the block allocated.
            unsafe { block::object(block) }.cast_const().cast()
        })
    }

    /// Get a reference to the payload, or `None` for an empty handle.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-empty handle holds a strong reference, so the payload
        // is alive for as long as `self` is borrowed.
        unsafe { self.as_ptr().as_ref() }
    }

    /// Number of `Shared` handles attached to this block, or 0 if empty.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.counts().map_or(0, Counts::strong)
    }

    /// Number of `Weak` handles attached to this block, or 0 if empty.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.counts().map_or(0, Counts::weak)
    }

    /// Returns `true` if the handle owns a payload.
    #[must_use]
    pub fn is_some(&self) -> bool {
        !self.as_ptr().is_null()
    }

    /// Returns `true` if the handle is empty.
    #[must_use]
    pub fn is_null(&self) -> bool {
        !self.is_some()
    }

    /// Create a weak observer of this handle's block.
    #[must_use]
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    /// Returns `true` if both handles share a block, or both are empty.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    fn counts(&self) -> Option<&Counts> {
        // SAFETY: this handle's strong reference keeps the block allocated.
        self.block.map(|block| unsafe { block.as_ref() }.counts())
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty Shared")
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(counts) = self.counts() {
            counts.inc_strong();
        }
        Self {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Shared<T> {
    /// Creates an empty handle.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T> TryFrom<&Weak<T>> for Shared<T> {
    type Error = BadWeakPtr;

    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        Self::try_from_weak(weak)
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Shared").field(value).finish(),
            None => write!(f, "Shared(<empty>)"),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Shared<T> {
    /// Formats the payload, or `<empty>` for an empty handle.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("<empty>"),
        }
    }
}

impl<T> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

// ============================================================================
// Weak<T> - non-owning observer
// ============================================================================

/// A non-owning observer of a [`Shared`] payload.
///
/// A `Weak` keeps the control block allocated but never the payload. It can
/// report whether the payload is still alive and try to obtain a new
/// [`Shared`] to it.
///
/// Weak edges are what make reference cycles reclaimable: two nodes linked
/// by one `Shared` edge and one `Weak` edge are both freed once the outside
/// handles go away. Cycles are never broken automatically.
///
/// # Examples
///
/// ```
/// use tether::{Shared, Weak};
///
/// let shared = Shared::new(7);
/// let weak = Weak::from(&shared);
/// assert!(!weak.expired());
/// assert_eq!(*weak.lock(), 7);
///
/// drop(shared);
/// assert!(weak.expired());
/// assert!(weak.lock().is_null());
/// ```
pub struct Weak<T> {
    block: Option<BlockPtr>,
    _marker: PhantomData<*const T>,
}

impl<T> Weak<T> {
    /// Create an empty observer. It is always expired.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: None,
            _marker: PhantomData,
        }
    }

    /// Wrap a block whose weak reference the caller hands over.
    const fn from_block(block: BlockPtr) -> Self {
        Self {
            block: Some(block),
            _marker: PhantomData,
        }
    }

    /// Release this observer's weak reference and become empty.
    ///
    /// Frees the control block if the payload is already gone and this was
    /// the last weak reference.
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: `block` carried this handle's weak reference.
            unsafe { block::release_weak(block) };
        }
    }

    /// Exchange the blocks of two observers. No count changes.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.block, &mut other.block);
    }

    /// Returns `true` if the observer is empty or the payload is destroyed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of `Shared` handles keeping the payload alive, or 0 if empty.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.counts().map_or(0, Counts::strong)
    }

    /// Number of `Weak` handles attached to this block, or 0 if empty.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.counts().map_or(0, Counts::weak)
    }

    /// Obtain a new [`Shared`] to the payload.
    ///
    /// Returns an empty handle if the observer has expired; never fails.
    #[must_use]
    pub fn lock(&self) -> Shared<T> {
        Shared::try_from_weak(self).unwrap_or_default()
    }

    /// Like [`lock`](Self::lock), reporting expiry as `None`.
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        Shared::try_from_weak(self).ok()
    }

    /// Returns `true` if both observers share a block, or both are empty.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    fn counts(&self) -> Option<&Counts> {
        // SAFETY: this handle's weak reference keeps the block allocated.
        self.block.map(|block| unsafe { block.as_ref() }.counts())
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(counts) = self.counts() {
            counts.inc_weak();
        }
        Self {
            block: self.block,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Weak<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Weak<T> {
    /// Constructs an empty observer that can never be locked.
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Self {
        if let Some(counts) = shared.counts() {
            counts.inc_weak();
        }
        Self {
            block: shared.block,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expired() {
            write!(f, "Weak(<expired>)")
        } else {
            write!(f, "Weak(use_count: {})", self.use_count())
        }
    }
}
