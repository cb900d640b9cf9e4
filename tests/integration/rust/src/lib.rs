//! Integration test suite for the generational collector
//!
//! This crate provides end-to-end tests that verify the collector
//! components work together correctly across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use gc_sim;
    pub use generational_gc;
}
