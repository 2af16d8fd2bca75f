//! Rayon pool whose threads are joined when it is dropped

use crate::cache_manager::lock;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let threads = Arc::new(Mutex::new(Vec::with_capacity(size)));
        let registry = Arc::clone(&threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .spawn_handler(move |thread| {
                let mut builder = std::thread::Builder::new()
                    .name(format!("takeprint-worker-{}", thread.index()));
                if let Some(stack_size) = thread.stack_size() {
                    builder = builder.stack_size(stack_size);
                }
                let handle = builder.spawn(|| thread.run())?;
                lock(&registry).push(handle);
                Ok(())
            })
            .build()
            .context("Failed to build fingerprint worker pool")?;

        log::debug!("Started fingerprint worker pool with {} threads", size);

        Ok(Self {
            pool: Some(pool),
            threads,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `op` inside the pool so its parallel iterators use our threads
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping the pool lets idle workers exit; then wait for them
        drop(self.pool.take());
        let handles: Vec<_> = lock(&self.threads).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("Fingerprint worker thread panicked");
            }
        }
        log::trace!("Fingerprint worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_install_uses_pool_threads() {
        let pool = WorkerPool::new(2).unwrap();
        let names: Vec<String> = pool.install(|| {
            (0..8)
                .into_par_iter()
                .map(|_| std::thread::current().name().unwrap_or("").to_string())
                .collect()
        });
        assert!(names.iter().all(|n| n.starts_with("takeprint-worker-")));
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_drop_joins_threads() {
        let pool = WorkerPool::new(3).unwrap();
        let threads = Arc::clone(&pool.threads);
        let sum: u32 = pool.install(|| (0..100u32).into_par_iter().sum());
        assert_eq!(sum, 4950);
        drop(pool);
        assert!(lock(&threads).is_empty());
    }
}
