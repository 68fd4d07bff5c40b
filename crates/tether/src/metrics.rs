//! Control-block metrics.
//!
//! Handles are confined to one thread, so the counters are thread-local and
//! only describe blocks created and released on the calling thread.

use std::cell::Cell;

/// Storage variant of a control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StorageKind {
    /// The payload was boxed by the caller and adopted by the block.
    External,
    /// The payload was constructed inside the block allocation.
    Inline,
}

/// Snapshot of the control-block counters of the current thread.
///
/// # Example
///
/// ```
/// use tether::{thread_metrics, Shared};
///
/// let before = thread_metrics();
/// let shared = Shared::new(5);
/// drop(shared);
/// let after = thread_metrics();
///
/// assert_eq!(after.inline_blocks_allocated - before.inline_blocks_allocated, 1);
/// assert_eq!(after.payloads_destroyed - before.payloads_destroyed, 1);
/// assert_eq!(after.blocks_freed - before.blocks_freed, 1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RcMetrics {
    /// Blocks created around a caller-provided box.
    pub external_blocks_allocated: usize,
    /// Blocks created with the payload constructed in place.
    pub inline_blocks_allocated: usize,
    /// Payloads torn down because their strong count reached zero.
    pub payloads_destroyed: usize,
    /// Blocks whose allocation has been released.
    pub blocks_freed: usize,
}

impl RcMetrics {
    /// Create a snapshot with every counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            external_blocks_allocated: 0,
            inline_blocks_allocated: 0,
            payloads_destroyed: 0,
            blocks_freed: 0,
        }
    }

    /// Total number of blocks allocated, of either variant.
    #[inline]
    #[must_use]
    pub const fn blocks_allocated(&self) -> usize {
        self.external_blocks_allocated + self.inline_blocks_allocated
    }

    /// Blocks allocated but not yet freed.
    #[inline]
    #[must_use]
    pub const fn live_blocks(&self) -> usize {
        self.blocks_allocated().saturating_sub(self.blocks_freed)
    }
}

thread_local! {
    static METRICS: Cell<RcMetrics> = const { Cell::new(RcMetrics::new()) };
}

/// Counters may be touched from other thread-local destructors after ours is
/// gone; those updates are dropped.
fn update(f: impl FnOnce(&mut RcMetrics)) {
    let _ = METRICS.try_with(|cell| {
        let mut metrics = cell.get();
        f(&mut metrics);
        cell.set(metrics);
    });
}

pub(crate) fn record_block_alloc(kind: StorageKind) {
    update(|m| match kind {
        StorageKind::External => m.external_blocks_allocated += 1,
        StorageKind::Inline => m.inline_blocks_allocated += 1,
    });
}

pub(crate) fn record_payload_destroyed() {
    update(|m| m.payloads_destroyed += 1);
}

pub(crate) fn record_block_free() {
    update(|m| m.blocks_freed += 1);
}

/// Get the control-block metrics of the current thread.
#[must_use]
pub fn thread_metrics() -> RcMetrics {
    METRICS.try_with(Cell::get).unwrap_or_default()
}

/// Reset the control-block metrics of the current thread to zero.
pub fn reset_thread_metrics() {
    let _ = METRICS.try_with(|cell| cell.set(RcMetrics::new()));
}
