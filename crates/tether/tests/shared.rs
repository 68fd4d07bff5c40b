//! Tests for the Shared<T> implementation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether::{thread_metrics, Shared};

/// Counts how many times values sharing `drops` have been destroyed.
struct DropCounter {
    drops: Rc<Cell<usize>>,
}

impl DropCounter {
    fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

// ============================================================================
// Constructors
// ============================================================================

#[test]
fn test_default_is_empty() {
    let a = Shared::<i32>::default();
    let b = unsafe { Shared::<i32>::from_raw(std::ptr::null_mut()) };

    assert!(a.as_ptr().is_null());
    assert!(a.is_null());
    assert!(!a.is_some());
    assert_eq!(a.use_count(), 0);
    assert!(b.as_ptr().is_null());
    assert!(b.is_null());
    assert!(a.get().is_none());
}

#[test]
fn test_from_raw() {
    let raw = Box::into_raw(Box::new(5));
    let a = unsafe { Shared::from_raw(raw) };

    assert_eq!(a.as_ptr(), raw.cast_const());
    assert!(a.is_some());
    assert_eq!(*a, 5);
}

#[test]
fn test_from_box_keeps_the_allocation() {
    let boxed = Box::new(String::from("boxed"));
    let addr: *const String = &*boxed;
    let a = Shared::from_box(boxed);

    assert_eq!(a.as_ptr(), addr);
    assert_eq!(a.len(), 5);
}

#[test]
fn test_clone() {
    let a = Shared::new(1);
    let b = a.clone();

    assert_eq!(a.as_ptr(), b.as_ptr());
    assert!(a.is_some());
    assert!(b.is_some());
    assert!(Shared::ptr_eq(&a, &b));

    let empty = Shared::<i32>::empty();
    let c = empty.clone();
    assert!(c.is_null());
    assert!(empty.is_null());
    assert!(Shared::ptr_eq(&c, &empty));
}

#[test]
fn test_move_leaves_empty() {
    let mut a = Shared::new(1);
    let ptr = a.as_ptr();
    let b = std::mem::take(&mut a);

    assert!(a.as_ptr().is_null());
    assert!(a.is_null());
    assert_eq!(a.use_count(), 0);
    assert_eq!(b.as_ptr(), ptr);
    assert_eq!(b.use_count(), 1);

    let mut empty = Shared::<i32>::empty();
    let c = std::mem::take(&mut empty);
    assert!(c.is_null());
    assert!(empty.is_null());

    // A moved-from handle is reusable.
    a = Shared::new(2);
    assert_eq!(*a, 2);
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_copy_assignment() {
    let a = Shared::new(1);
    let mut b: Shared<i32> = Shared::empty();
    b.clone_from(&a);

    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.use_count(), 2);
}

#[test]
fn test_move_assignment() {
    let mut a = Shared::new(1);
    let ptr = a.as_ptr();
    let mut b: Shared<i32> = Shared::empty();
    assert!(b.is_null());

    b = std::mem::take(&mut a);
    assert!(a.as_ptr().is_null());
    assert_eq!(b.as_ptr(), ptr);
    assert_eq!(b.use_count(), 1);
}

#[test]
fn test_self_assignment() {
    let mut a = Shared::new(3);
    let ptr = a.as_ptr();

    a = a.clone();
    assert_eq!(a.as_ptr(), ptr);
    assert_eq!(a.use_count(), 1);
    assert_eq!(*a, 3);
}

#[test]
fn test_assignment_releases_previous() {
    let drops = Rc::new(Cell::new(0));
    let mut a = Shared::new(DropCounter::new(&drops));
    let b = Shared::new(DropCounter::new(&drops));

    a = b.clone();
    assert_eq!(drops.get(), 1);
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(b.use_count(), 2);
}

#[test]
fn test_chained_assignment() {
    let a = Shared::new(1);
    let mut b = Shared::new(2);
    let mut c: Shared<i32> = Shared::empty();

    b.clone_from(&a);
    c.clone_from(&b);
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(c.as_ptr(), a.as_ptr());
    assert_eq!(a.use_count(), 3);
}

#[test]
fn test_assign_empty() {
    let mut a: Shared<i32> = Shared::empty();
    let b = Shared::new(1);
    a.clone_from(&b);
    assert_eq!(a.as_ptr(), b.as_ptr());

    a = Shared::empty();
    assert!(a.as_ptr().is_null());
    assert_eq!(b.use_count(), 1);
}

// ============================================================================
// Counts
// ============================================================================

#[test]
fn test_use_count_sequence() {
    let mut a: Shared<i32> = Shared::empty();
    let b = Shared::new(0);

    assert_eq!(a.use_count(), 0);
    assert_eq!(b.use_count(), 1);

    a.clone_from(&b);
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);

    {
        let mut c = a.clone();
        assert_eq!(a.use_count(), 3);
        assert_eq!(b.use_count(), 3);
        assert_eq!(c.use_count(), 3);

        let d = std::mem::take(&mut c);
        assert_eq!(a.use_count(), 3);
        assert_eq!(b.use_count(), 3);
        assert_eq!(c.use_count(), 0);
        assert_eq!(d.use_count(), 3);
    }

    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);

    a = Shared::empty();
    assert_eq!(a.use_count(), 0);
    assert_eq!(b.use_count(), 1);
}

#[test]
fn test_use_count_tracks_live_handles() {
    let root = Shared::new(0u8);
    let mut handles: Vec<Shared<u8>> = Vec::new();

    for i in 1..=10 {
        handles.push(root.clone());
        assert_eq!(root.use_count(), i + 1);
    }
    while let Some(handle) = handles.pop() {
        drop(handle);
        assert_eq!(root.use_count(), handles.len() + 1);
    }
}

// ============================================================================
// Swap
// ============================================================================

#[test]
fn test_swap() {
    let mut a: Shared<i32> = Shared::empty();
    let mut b = Shared::new(1);
    let mut c = Shared::new(2);
    let d = c.clone();
    let ptr1 = b.as_ptr();
    let ptr2 = c.as_ptr();

    a.swap(&mut b);
    assert!(a.is_some());
    assert_eq!(a.as_ptr(), ptr1);
    assert_eq!(a.use_count(), 1);
    assert!(b.is_null());
    assert_eq!(b.use_count(), 0);

    b.swap(&mut c);
    assert_eq!(b.as_ptr(), ptr2);
    assert_eq!(b.use_count(), 2);
    assert!(c.is_null());
    assert_eq!(c.use_count(), 0);

    a.swap(&mut b);
    assert_eq!(a.as_ptr(), ptr2);
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.as_ptr(), ptr1);
    assert_eq!(b.use_count(), 1);

    assert_eq!(d.as_ptr(), ptr2);
    assert_eq!(d.use_count(), 2);
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn test_reset_empty() {
    let mut a = Shared::<i32>::empty();
    a.reset();
    assert_eq!(a.use_count(), 0);

    a.reset_with(Box::new(1));
    assert_eq!(a.use_count(), 1);

    a.reset();
    assert_eq!(a.use_count(), 0);
    assert!(a.is_null());

    // Repeated resets keep the handle empty.
    a.reset();
    a.reset();
    assert!(a.as_ptr().is_null());
}

#[test]
fn test_reset_non_empty() {
    let ptr1 = Box::into_raw(Box::new(1));
    let ptr2 = Box::into_raw(Box::new(2));
    let a = unsafe { Shared::from_raw(ptr1) };
    let mut b = a.clone();

    b.reset();
    assert_eq!(a.use_count(), 1);
    assert_eq!(a.as_ptr(), ptr1.cast_const());
    assert_eq!(b.use_count(), 0);
    assert!(b.as_ptr().is_null());

    let mut a = a;
    b.clone_from(&a);
    unsafe { a.reset_raw(ptr2) };
    assert_eq!(a.use_count(), 1);
    assert_eq!(a.as_ptr(), ptr2.cast_const());
    assert_eq!(b.use_count(), 1);
    assert_eq!(b.as_ptr(), ptr1.cast_const());

    unsafe { a.reset_raw(std::ptr::null_mut()) };
    assert!(a.is_null());
}

#[test]
fn test_reset_destroys_only_on_last_owner() {
    let drops = Rc::new(Cell::new(0));
    let mut a = Shared::new(DropCounter::new(&drops));
    let mut b = a.clone();

    a.reset();
    assert_eq!(drops.get(), 0);
    b.reset();
    assert_eq!(drops.get(), 1);
    b.reset();
    assert_eq!(drops.get(), 1);
}

// ============================================================================
// Access
// ============================================================================

#[test]
fn test_deref() {
    let a = Shared::new(Cell::new(19));
    assert_eq!(a.get().map(Cell::get), Some(19));

    a.set(11);
    assert_eq!(a.get().map(Cell::get), Some(11));

    unsafe { (*a.as_ptr()).set(-11) };
    assert_eq!(a.get().map(Cell::get), Some(-11));
}

#[test]
fn test_member_access_on_nested_handle() {
    let inner = Box::into_raw(Box::new(11));
    let a = Shared::new(RefCell::new(unsafe { Shared::from_raw(inner) }));

    assert_eq!(a.borrow().use_count(), 1);
    assert_eq!(a.borrow().as_ptr(), inner.cast_const());

    a.borrow_mut().reset();
    assert_eq!(a.borrow().use_count(), 0);
    assert!(a.borrow().as_ptr().is_null());
}

#[test]
#[should_panic(expected = "dereferenced an empty Shared")]
fn test_deref_empty_panics() {
    let a = Shared::<i32>::empty();
    let _value = *a;
}

#[test]
fn test_formatting() {
    let a = Shared::new(42);
    assert_eq!(format!("{a:?}"), "Shared(42)");
    assert_eq!(format!("{a}"), "42");
    assert_eq!(format!("{a:p}"), format!("{:p}", a.as_ptr()));

    let empty = Shared::<i32>::empty();
    assert_eq!(format!("{empty:?}"), "Shared(<empty>)");
    assert_eq!(format!("{empty}"), "<empty>");
    assert_eq!(empty.to_string(), "<empty>");
}

#[test]
fn test_from_impls() {
    let a: Shared<i32> = 7.into();
    let b: Shared<i32> = Box::new(8).into();
    assert_eq!(*a, 7);
    assert_eq!(*b, 8);
}

// ============================================================================
// In-place construction
// ============================================================================

#[test]
fn test_new_nested_empty() {
    let ptr = Shared::new(Shared::<i32>::empty());
    assert_eq!(ptr.use_count(), 1);
    assert_eq!(ptr.get().map(Shared::use_count), Some(0));
    assert!(!ptr.as_ptr().is_null());
    assert!(ptr.get().is_some_and(Shared::is_null));
}

#[test]
fn test_new_pair() {
    let ptr = Shared::new((11, 0.5f64));
    assert_eq!(ptr.0, 11);
    assert!((ptr.1 - 0.5f64).abs() < f64::EPSILON);
}

#[test]
fn test_new_with_shared_state() {
    let x = Rc::new(Cell::new(11));
    let ptr = Shared::new((Rc::clone(&x), Box::new(Cell::new(11))));
    assert_eq!(ptr.0.get(), 11);
    assert_eq!(ptr.1.get(), 11);

    x.set(-11);
    ptr.1.set(-11);
    assert_eq!(ptr.0.get(), -11);
    assert_eq!(ptr.1.get(), -11);
}

#[test]
fn test_new_uses_single_allocation() {
    let before = thread_metrics();
    let inline = Shared::new(1);
    let external = Shared::from_box(Box::new(2));
    let after = thread_metrics();

    assert_eq!(
        after.inline_blocks_allocated - before.inline_blocks_allocated,
        1
    );
    assert_eq!(
        after.external_blocks_allocated - before.external_blocks_allocated,
        1
    );
    assert_eq!(*inline + *external, 3);
}

#[test]
fn test_payload_destroyed_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    {
        let a = Shared::new(DropCounter::new(&drops));
        let b = a.clone();
        let c = Shared::from_box(Box::new(DropCounter::new(&drops)));
        let d = c.clone();
        drop(a);
        drop(c);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 1);
        drop(d);
        assert_eq!(drops.get(), 2);
    }
    assert_eq!(drops.get(), 2);
}

#[test]
fn test_clones_share_one_block() {
    let a = Shared::new(1);
    let b = a.clone();
    let c = Shared::new(1);
    let empty = Shared::<i32>::empty();

    assert!(Shared::ptr_eq(&a, &b));
    assert!(!Shared::ptr_eq(&a, &c));
    assert!(!Shared::ptr_eq(&a, &empty));
    assert!(Shared::ptr_eq(&empty, &Shared::default()));
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_ne!(a.as_ptr(), c.as_ptr());
}

// ============================================================================
// Borrowed payloads
// ============================================================================

/// Bumps a borrowed counter when dropped.
struct BorrowedCounter<'a>(&'a Cell<usize>);

impl Drop for BorrowedCounter<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn test_borrowed_payload() {
    let text = String::from("borrowed");
    let a = Shared::new(text.as_str());
    let b = Shared::from_box(Box::new(&text[..4]));

    assert_eq!(*a, "borrowed");
    assert_eq!(*b, "borr");
    assert_eq!(a.clone().use_count(), 2);
}

#[test]
fn test_borrowed_payload_destroyed_once() {
    let drops = Cell::new(0);
    {
        let inline = Shared::new(BorrowedCounter(&drops));
        let external = Shared::from_box(Box::new(BorrowedCounter(&drops)));
        let _inline2 = inline.clone();
        let _external2 = external.clone();
        assert_eq!(drops.get(), 0);
    }
    assert_eq!(drops.get(), 2);
}
