//! Control blocks backing [`Shared`](crate::Shared) and [`Weak`](crate::Weak).
//!
//! A control block couples a strong counter and a weak counter to the storage
//! of the managed payload. Two storage strategies exist behind the
//! [`ControlBlock`] trait:
//!
//! - [`ExternalBlock`] wraps a payload that was boxed by the caller. Tearing
//!   the payload down frees that separate allocation.
//! - [`InlineBlock`] embeds the payload in the block allocation itself.
//!   Tearing the payload down runs its destructor in place; the storage is
//!   released together with the block.
//!
//! Both variants start with a [`BlockHeader`] holding the counters and the
//! type-erased entry points of the variant, so handles reach any block through
//! a thin [`BlockPtr`] without naming the payload type or its lifetime.
//!
//! Handles never touch payload lifetime directly. They go through
//! [`release_strong`] and [`release_weak`], which implement the release
//! algorithm.

use std::cell::{Cell, UnsafeCell};
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use crate::metrics::{self, StorageKind};
use crate::tracing::internal as trace;

/// Thin pointer to the header of a heap-resident control block.
pub(crate) type BlockPtr = NonNull<BlockHeader>;

// ============================================================================
// Counts - strong/weak counters
// ============================================================================

/// Strong and weak counters of one control block.
///
/// Plain `Cell`s: handles are `!Send` and `!Sync`, so every mutation happens
/// on the owning thread.
#[derive(Debug)]
pub(crate) struct Counts {
    strong: Cell<usize>,
    weak: Cell<usize>,
}

impl Counts {
    /// Counters of a block whose creator is its first strong owner.
    pub(crate) const fn new() -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(0),
        }
    }

    /// Counters of a block whose payload is still being built.
    ///
    /// No strong owner exists yet; the builder holds the single weak reference.
    pub(crate) const fn pending() -> Self {
        Self {
            strong: Cell::new(0),
            weak: Cell::new(1),
        }
    }

    #[inline]
    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn weak(&self) -> usize {
        self.weak.get()
    }

    #[inline]
    pub(crate) fn inc_strong(&self) {
        self.strong.set(checked_inc(self.strong.get()));
    }

    /// Decrement the strong count and return the new value.
    #[inline]
    pub(crate) fn dec_strong(&self) -> usize {
        let count = self.strong.get();
        debug_assert!(count > 0, "strong count underflow");
        self.strong.set(count - 1);
        count - 1
    }

    #[inline]
    pub(crate) fn inc_weak(&self) {
        self.weak.set(checked_inc(self.weak.get()));
    }

    /// Decrement the weak count and return the new value.
    #[inline]
    pub(crate) fn dec_weak(&self) -> usize {
        let count = self.weak.get();
        debug_assert!(count > 0, "weak count underflow");
        self.weak.set(count - 1);
        count - 1
    }

    /// Publish the first strong owner of a pending block.
    #[inline]
    pub(crate) fn activate(&self) {
        debug_assert_eq!(self.strong.get(), 0);
        self.strong.set(1);
    }
}

/// Overflowing a counter would let a payload be freed while still referenced.
#[inline]
fn checked_inc(count: usize) -> usize {
    count
        .checked_add(1)
        .unwrap_or_else(|| std::process::abort())
}

// ============================================================================
// ControlBlock - storage capability set
// ============================================================================

/// Storage strategy of a control block.
pub(crate) trait ControlBlock {
    /// The counters shared by every handle attached to this block.
    fn counts(&self) -> &Counts;

    /// Type-erased pointer to the payload.
    ///
    /// Null for an [`ExternalBlock`] whose payload has been destroyed.
    fn object(&self) -> *mut ();

    /// Tear the payload down.
    ///
    /// # Safety
    ///
    /// The payload must be initialised and must not have been destroyed yet.
    /// Only the release algorithm calls this, exactly once, when the strong
    /// count reaches zero.
    unsafe fn destroy_object(&self);
}

/// Common prefix of every control block.
///
/// The function pointers are monomorphised for the concrete block type when
/// the block is allocated.
#[repr(C)]
pub(crate) struct BlockHeader {
    counts: Counts,
    object_fn: unsafe fn(BlockPtr) -> *mut (),
    destroy_fn: unsafe fn(BlockPtr),
    free_fn: unsafe fn(BlockPtr),
}

impl BlockHeader {
    fn for_block<B: ControlBlock>(counts: Counts) -> Self {
        Self {
            counts,
            object_fn: object_fn_for::<B>,
            destroy_fn: destroy_fn_for::<B>,
            free_fn: free_fn_for::<B>,
        }
    }

    /// The counters shared by every handle attached to this block.
    #[inline]
    pub(crate) const fn counts(&self) -> &Counts {
        &self.counts
    }
}

/// # Safety
///
/// `block` must point to a live `B`.
unsafe fn object_fn_for<B: ControlBlock>(block: BlockPtr) -> *mut () {
    // SAFETY: guaranteed by the caller.
    unsafe { block.cast::<B>().as_ref() }.object()
}

/// # Safety
///
/// `block` must point to a live `B` whose payload may be destroyed.
unsafe fn destroy_fn_for<B: ControlBlock>(block: BlockPtr) {
    // SAFETY: guaranteed by the caller.
    unsafe { block.cast::<B>().as_ref().destroy_object() };
}

/// # Safety
///
/// `block` must come from `Box::<B>::into_raw` and not be used afterwards.
unsafe fn free_fn_for<B: ControlBlock>(block: BlockPtr) {
    // SAFETY: guaranteed by the caller.
    drop(unsafe { Box::from_raw(block.cast::<B>().as_ptr()) });
}

/// Type-erased pointer to the payload of `block`.
///
/// # Safety
///
/// `block` must be live.
#[inline]
pub(crate) unsafe fn object(block: BlockPtr) -> *mut () {
    // SAFETY: guaranteed by the caller; the entry point matches the variant.
    unsafe { (block.as_ref().object_fn)(block) }
}

/// A block around a payload that lives in its own `Box`.
#[repr(C)]
pub(crate) struct ExternalBlock<T> {
    header: BlockHeader,
    ptr: Cell<*mut T>,
}

impl<T> ControlBlock for ExternalBlock<T> {
    fn counts(&self) -> &Counts {
        &self.header.counts
    }

    fn object(&self) -> *mut () {
        self.ptr.get().cast()
    }

    unsafe fn destroy_object(&self) {
        debug_assert_eq!(self.counts().strong(), 0);
        // Cleared before the destructor runs so re-entrant reads see null.
        let ptr = self.ptr.replace(ptr::null_mut());
        if !ptr.is_null() {
            // SAFETY: `ptr` came from `Box::into_raw` in `alloc_external` and
            // has not been reclaimed, otherwise it would already be null.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

impl<T> Drop for ExternalBlock<T> {
    fn drop(&mut self) {
        // No-op under the release algorithm: the payload is gone before the
        // block is freed.
        // SAFETY: a non-null pointer is still owned by this block.
        unsafe { self.destroy_object() };
    }
}

/// A block whose payload is constructed in place inside the allocation.
#[repr(C)]
pub(crate) struct InlineBlock<T> {
    header: BlockHeader,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> ControlBlock for InlineBlock<T> {
    fn counts(&self) -> &Counts {
        &self.header.counts
    }

    fn object(&self) -> *mut () {
        self.value.get().cast()
    }

    unsafe fn destroy_object(&self) {
        debug_assert_eq!(self.counts().strong(), 0);
        // SAFETY: the caller guarantees the payload is initialised and
        // destroyed only once. `UnsafeCell` permits mutation through `&self`.
        unsafe { ptr::drop_in_place(self.value.get().cast::<T>()) };
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// Allocate an [`ExternalBlock`] adopting `value`, with `strong = 1`.
pub(crate) fn alloc_external<T>(value: Box<T>) -> BlockPtr {
    let block = Box::new(ExternalBlock {
        header: BlockHeader::for_block::<ExternalBlock<T>>(Counts::new()),
        ptr: Cell::new(Box::into_raw(value)),
    });
    register(NonNull::from(Box::leak(block)).cast(), StorageKind::External)
}

/// Allocate an [`InlineBlock`] holding `value` with the given counters.
///
/// `value` may be uninitialised only together with [`Counts::pending`]; the
/// caller must write the payload before calling [`Counts::activate`].
pub(crate) fn alloc_inline<T>(value: MaybeUninit<T>, counts: Counts) -> BlockPtr {
    let block = Box::new(InlineBlock {
        header: BlockHeader::for_block::<InlineBlock<T>>(counts),
        value: UnsafeCell::new(value),
    });
    register(NonNull::from(Box::leak(block)).cast(), StorageKind::Inline)
}

fn register(block: BlockPtr, kind: StorageKind) -> BlockPtr {
    metrics::record_block_alloc(kind);
    trace::log_block_alloc(kind, addr(block));
    block
}

/// Free the block allocation.
///
/// # Safety
///
/// `block` must come from [`alloc_external`] or [`alloc_inline`], both counts
/// must be zero, and no handle may reference it afterwards.
unsafe fn free(block: BlockPtr) {
    trace::log_block_free(addr(block));
    metrics::record_block_free();
    // SAFETY: guaranteed by the caller; the entry point matches the variant.
    unsafe {
        let free_fn = block.as_ref().free_fn;
        free_fn(block);
    }
}

/// Thin address of a block, for logging.
#[inline]
pub(crate) fn addr(block: BlockPtr) -> *const () {
    block.as_ptr().cast_const().cast()
}

// ============================================================================
// Release algorithm
// ============================================================================

/// Give up one strong reference to `block`.
///
/// When the strong count reaches zero the payload is destroyed. The block is
/// freed as well unless weak observers remain.
///
/// # Safety
///
/// `block` must be live and the caller must own one strong reference to it,
/// which this call consumes.
pub(crate) unsafe fn release_strong(block: BlockPtr) {
    // SAFETY: the caller's strong reference keeps the block allocated.
    let counts = unsafe { block.as_ref() }.counts();
    if counts.dec_strong() != 0 {
        return;
    }

    // The payload may hold weak references to its own block. Pin the block
    // with a weak reference so their release cannot free it mid-teardown.
    counts.inc_weak();
    let pin = WeakPin(block);
    {
        let _span = trace::enter_destroy(addr(block));
        // SAFETY: strong just reached zero, so this is the only teardown.
        unsafe {
            let destroy_fn = block.as_ref().destroy_fn;
            destroy_fn(block);
        }
    }
    metrics::record_payload_destroyed();
    drop(pin);
}

/// Give up one weak reference to `block`.
///
/// Frees the block when this was the last reference of either kind.
///
/// # Safety
///
/// `block` must be live and the caller must own one weak reference to it,
/// which this call consumes.
pub(crate) unsafe fn release_weak(block: BlockPtr) {
    // SAFETY: the caller's weak reference keeps the block allocated.
    let counts = unsafe { block.as_ref() }.counts();
    if counts.dec_weak() == 0 && counts.strong() == 0 {
        // SAFETY: no reference of either kind is left.
        unsafe { free(block) };
    }
}

/// Releases its weak reference on drop, including during unwinding.
struct WeakPin(BlockPtr);

impl Drop for WeakPin {
    fn drop(&mut self) {
        // SAFETY: the pin owns exactly one weak reference.
        unsafe { release_weak(self.0) };
    }
}
