//! Background batch tasks
//!
//! Each task runs on its own coordinator thread which hands the heavy work to
//! the engine's worker pool. The tracker owns every coordinator's join handle,
//! so engine teardown can cancel and join all of them.

use crate::cache_manager::lock;
use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, Receiver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

struct RunningTask {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct TaskTracker {
    running: Mutex<HashMap<u64, RunningTask>>,
    next_id: AtomicU64,
}

impl TaskTracker {
    pub(crate) fn spawn<T, F>(self: &Arc<Self>, name: &str, work: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicBool) -> T + Send + 'static,
    {
        self.reap_finished();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(1);

        let flag = Arc::clone(&cancel);
        // Held across the spawn so a concurrent shutdown sees the new task
        let mut running = lock(&self.running);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let output = work(&flag);
                let _ = tx.send(output);
            })?;
        running.insert(
            id,
            RunningTask {
                cancel: Arc::clone(&cancel),
                thread,
            },
        );
        drop(running);

        Ok(TaskHandle {
            id,
            cancel,
            result: rx,
            tracker: Arc::clone(self),
        })
    }

    pub(crate) fn active(&self) -> usize {
        lock(&self.running)
            .values()
            .filter(|task| !task.thread.is_finished())
            .count()
    }

    pub(crate) fn cancel_all(&self) {
        for task in lock(&self.running).values() {
            task.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Join every coordinator thread
    pub(crate) fn join_all(&self) {
        let tasks: Vec<RunningTask> = lock(&self.running).drain().map(|(_, t)| t).collect();
        for task in tasks {
            join_thread(task.thread);
        }
    }

    fn join(&self, id: u64) {
        let task = lock(&self.running).remove(&id);
        if let Some(task) = task {
            join_thread(task.thread);
        }
    }

    fn is_finished(&self, id: u64) -> bool {
        lock(&self.running)
            .get(&id)
            .map_or(true, |task| task.thread.is_finished())
    }

    fn reap_finished(&self) {
        let finished: Vec<RunningTask> = {
            let mut running = lock(&self.running);
            let ids: Vec<u64> = running
                .iter()
                .filter(|(_, task)| task.thread.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| running.remove(id)).collect()
        };
        for task in finished {
            join_thread(task.thread);
        }
    }
}

fn join_thread(thread: JoinHandle<()>) {
    // A task dropping the engine from its own callback must not join itself
    if thread.thread().id() == std::thread::current().id() {
        return;
    }
    if thread.join().is_err() {
        log::error!("Background fingerprint task panicked");
    }
}

/// Handle to a running background task.
///
/// Dropping the handle does not cancel the task; it waits for the task's
/// thread to finish.
pub struct TaskHandle<T> {
    id: u64,
    cancel: Arc<AtomicBool>,
    result: Receiver<T>,
    tracker: Arc<TaskTracker>,
}

impl<T> TaskHandle<T> {
    /// Ask the task to stop before its next file
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        !self.result.is_empty() || self.tracker.is_finished(self.id)
    }

    /// Block until the task is done and take its output
    pub fn wait(self) -> Result<T> {
        let output = self
            .result
            .recv()
            .map_err(|_| anyhow!("Background task ended without a result"));
        self.tracker.join(self.id);
        output
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.tracker.join(self.id);
    }
}
