use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use super::ThreadPool;
use crate::Result;

/// Spawns a dedicated, named OS thread for every job.
///
/// This is what [`Pool::run`](crate::Pool::run) uses: the pool already bounds
/// how many jobs it spawns, so there is nothing left to reuse.
#[derive(Default)]
pub struct NaiveThreadPool {
    next_id: AtomicU32,
}

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool::default())
    }

    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("pool-worker-{id}"))
            .spawn(job)?;
        Ok(())
    }
}
