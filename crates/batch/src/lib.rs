//! Hopper Batch - entry aggregation for the streaming writers
//!
//! Two aggregators with the same external shape:
//!
//! - [`Batcher`] collects opaque byte entries into size- and age-bounded
//!   lists, handed to a completion callback as a unit
//! - [`Globber`] collects entries into a compressed JSON array ("glob")
//!   with a one-byte version prefix, for bulk delivery
//!
//! Both run a single background worker that multiplexes the input queue and
//! an age timer. The completion callback runs inline in the worker; a slow
//! callback blocks intake, which applies backpressure into the input queue
//! on purpose.

mod batcher;
mod config;
mod globber;

pub use batcher::{BatchComplete, Batcher};
pub use config::{BatchConfig, ConfigError};
pub use globber::{GlobComplete, Globber, GLOB_VERSION};
