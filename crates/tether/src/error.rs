//! Errors reported by handle conversions.

use std::fmt;

/// Returned when a [`Shared`](crate::Shared) is built from a
/// [`Weak`](crate::Weak) whose payload has already been destroyed.
///
/// This is the only recoverable failure of the crate. [`Weak::lock`]
/// reports the same condition as an empty handle instead.
///
/// [`Weak::lock`]: crate::Weak::lock
///
/// # Examples
///
/// ```
/// use tether::{BadWeakPtr, Shared, Weak};
///
/// let weak: Weak<i32> = Weak::new();
/// assert_eq!(Shared::try_from_weak(&weak).unwrap_err(), BadWeakPtr);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BadWeakPtr;

impl fmt::Display for BadWeakPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bad weak pointer: payload already destroyed")
    }
}

impl std::error::Error for BadWeakPtr {}
