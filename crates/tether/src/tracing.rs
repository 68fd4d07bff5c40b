//! Control-block tracing support.
//!
//! When the `tracing` feature is enabled, this module emits structured
//! events for block allocation and release and a span around payload
//! teardown. Without the feature every hook compiles to nothing.

#[cfg(feature = "tracing")]
pub mod internal {
    use tracing::{span, Level};

    use crate::metrics::StorageKind;

    /// Span guard held while a payload is torn down.
    pub type DestroySpan = span::EnteredSpan;

    /// Log a freshly allocated control block.
    pub fn log_block_alloc(kind: StorageKind, block: *const ()) {
        tracing::trace!(kind = ?kind, block = ?block, "block_alloc");
    }

    /// Create a span for the teardown of the payload owned by `block`.
    pub fn enter_destroy(block: *const ()) -> DestroySpan {
        span!(Level::TRACE, "payload_destroy", block = ?block).entered()
    }

    /// Log the release of a control block allocation.
    pub fn log_block_free(block: *const ()) {
        tracing::trace!(block = ?block, "block_free");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    use crate::metrics::StorageKind;

    /// Stub span guard when tracing is disabled.
    pub struct DestroySpan;

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn log_block_alloc(_kind: StorageKind, _block: *const ()) {}

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn enter_destroy(_block: *const ()) -> DestroySpan {
        DestroySpan
    }

    /// Stub function when tracing is disabled.
    #[inline(always)]
    pub const fn log_block_free(_block: *const ()) {}
}
