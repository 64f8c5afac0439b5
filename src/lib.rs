#![deny(missing_docs)]

//! A bounded worker pool that streams inputs through a transformation.
//!
//! A [`Pool`] runs a fixed number of workers that pull inputs one at a time
//! from an unbuffered input stream, run them through a fault-isolating
//! [`Worker`], and forward non-empty results to an unbuffered output stream.
//! A panicking job is logged and dropped without affecting other jobs.

mod config;
mod error;
mod pool;
/// Scanner-style transformations used by the `jobpool` binary.
pub mod probe;
mod registry;
/// Executors the pool's work loops can run on.
pub mod thread_pool;
mod worker;

pub use config::PoolConfig;
pub use error::{JobError, PoolError, Result};
pub use pool::{Pool, State};
pub use registry::{InFlight, Registry, Ticket};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, ThreadPool};
pub use worker::{Function, Worker};
