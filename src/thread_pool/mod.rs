use crate::Result;

/// An executor for the long-running work loops of a [`Pool`](crate::Pool).
///
/// Each spawned job is one execution context: it keeps pulling inputs until
/// the input stream closes or the pool is stopped, so implementors should
/// expect jobs that block for a long time.
pub trait ThreadPool {
    /// Creates a new executor with the given number of threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor cannot be created (e.g., invalid size).
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a job into the executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the job could not be handed to a thread.
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static;
}

mod naive;
mod rayon_pool;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
