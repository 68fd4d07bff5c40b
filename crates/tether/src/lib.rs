//! Single-threaded smart pointers built on a dual-variant control block.
//!
//! `tether` provides three handles:
//!
//! - [`Unique<T>`]: a nullable, move-only owner of one boxed value.
//! - [`Shared<T>`]: a reference-counted owner. Clones share one control
//!   block holding a strong and a weak counter.
//! - [`Weak<T>`]: a non-owning observer of a [`Shared`] payload that can tell
//!   whether the payload is still alive and try to re-acquire it.
//!
//! # Control blocks
//!
//! A `Shared` created with [`Shared::new`] constructs the payload inside the
//! control block, in a single allocation. One created from a `Box` with
//! [`Shared::from_box`] keeps the payload in its own allocation next to a
//! separately allocated block. Both behave identically afterwards.
//!
//! The payload is destroyed exactly once, when the last `Shared` lets go.
//! The block is freed exactly once, when no handle of either kind is left.
//!
//! # Quick Start
//!
//! ```
//! use tether::{Shared, Unique, Weak};
//!
//! let unique = Unique::new(42);
//! assert_eq!(*unique, 42);
//!
//! let shared = Shared::new(String::from("hello"));
//! let other = shared.clone();
//! assert_eq!(shared.use_count(), 2);
//!
//! let weak = Weak::from(&shared);
//! drop(shared);
//! drop(other);
//! assert!(weak.expired());
//! ```
//!
//! # Handling Cycles
//!
//! Cycles of `Shared` edges are never collected. Close a cycle with a
//! [`Weak`] edge instead:
//!
//! ```
//! use std::cell::RefCell;
//! use tether::{Shared, Weak};
//!
//! #[derive(Default)]
//! struct Node {
//!     next: RefCell<Shared<Node>>,
//!     prev: RefCell<Weak<Node>>,
//! }
//!
//! let front = Shared::new(Node::default());
//! let back = Shared::new(Node::default());
//! *front.next.borrow_mut() = back.clone();
//! *back.prev.borrow_mut() = Weak::from(&front);
//!
//! assert_eq!(front.use_count(), 1);
//! assert_eq!(back.use_count(), 2);
//! ```
//!
//! # Thread Safety
//!
//! `Shared<T>` and `Weak<T>` are `!Send` and `!Sync`; their counters are
//! plain integers. `Unique<T>` is `Send`/`Sync` exactly when `Box<T>` is.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod block;
mod error;
mod metrics;
mod ptr;
mod tracing;
mod unique;

// Re-export public API
pub use error::BadWeakPtr;
pub use metrics::{reset_thread_metrics, thread_metrics, RcMetrics};
pub use ptr::{Shared, Weak};
pub use unique::Unique;
