//! Hopper Processor - the worker pool driving parse → transform → write
//!
//! Two parallel worker fleets connected by bounded MPMC queues:
//!
//! ```text
//! [submit] --rawQ--> [converters xN] --eventQ--> [transformers xM] --> [writer]
//! ```
//!
//! Converters parse raw records into events; transformers format events
//! into write requests and hand them to the single configured downstream
//! writer. Both fleets contain panics at the per-item boundary: a bad
//! record produces a failure request, never a dead worker.

mod pipe;
mod pool;

pub use pipe::{ResultPipe, StdinPipe, StreamResult};
pub use pool::{PoolConfig, ProcessorError, ProcessorPool};
