use crate::Error;
use std::sync::Arc;

/// Builds a pool that update tasks of many runtimes can share.
pub fn build_worker_pool(threads: usize) -> Result<Arc<rayon::ThreadPool>, Error> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("montage-update-{index}"))
        .build()
        .map_err(|e| Error::WorkerPool {
            message: e.to_string(),
        })?;
    Ok(Arc::new(pool))
}
