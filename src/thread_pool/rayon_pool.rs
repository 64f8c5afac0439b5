use super::ThreadPool;
use crate::{PoolError, Result};

/// Runs jobs on a `rayon` thread pool.
///
/// Work loops block while waiting for input, so a rayon pool smaller than the
/// worker count only starts the surplus loops once earlier ones have exited.
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("pool-rayon-{i}"))
            .build()
            .map_err(|e| PoolError::StringError(e.to_string()))?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
        Ok(())
    }
}
