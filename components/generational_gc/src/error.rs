//! Error types for the collector.
//!
//! Allocation exhaustion, contract violations detected by the tracer and
//! rejected tuning options all surface through [`GcError`].

use crate::object::ObjectId;
use crate::region::RegionKind;
use thiserror::Error;

/// Errors raised by the collector core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// Eden and Old are both exhausted after a minor and a major cycle.
    #[error(
        "allocation of {requested} bytes failed after minor and major collection \
         (eden free: {eden_free}, old free: {old_free})"
    )]
    AllocationFailure {
        /// Aligned size of the failed request
        requested: usize,
        /// Bytes left in Eden when the request was abandoned
        eden_free: usize,
        /// Bytes left in Old when the request was abandoned
        old_free: usize,
    },

    /// A black object still references a white one after marking finished.
    ///
    /// Indicates a store that bypassed the write barrier. Continuing would
    /// risk reclaiming a live object.
    #[error("tri-color invariant violated: black {holder:?} references white {target:?}")]
    InvariantViolation {
        /// The fully scanned object
        holder: ObjectId,
        /// The unvisited object it references
        target: ObjectId,
    },

    /// A tuning option was outside its accepted range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The handle does not name a live object.
    #[error("stale or unknown object handle {0:?}")]
    StaleHandle(ObjectId),

    /// Field index past the object's fixed shape.
    #[error("field {index} out of bounds for {object:?} with {len} fields")]
    FieldOutOfBounds {
        /// Object being accessed
        object: ObjectId,
        /// Requested field index
        index: usize,
        /// Number of reference fields the object was created with
        len: usize,
    },

    /// The memory provider refused the initial reservation for a region.
    #[error("memory provider refused to reserve {bytes} bytes for {region:?}")]
    RegionReservation {
        /// Region being reserved
        region: RegionKind,
        /// Requested capacity
        bytes: usize,
    },
}

impl GcError {
    /// Shorthand for [`GcError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        GcError::Configuration(message.into())
    }

    /// Returns true for errors that leave the heap in an unusable state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GcError::InvariantViolation { .. })
    }
}

/// Result type for collector operations
pub type GcResult<T> = Result<T, GcError>;
