//! Synthetic workload driver for the generational collector
//!
//! Runs a randomized allocate-and-link mutator against a
//! [`generational_gc::Collector`] and reports the resulting telemetry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod workload;

pub use cli::{Cli, OutputFormat};
pub use error::{SimError, SimResult};
pub use workload::{run, SimReport, Workload};
