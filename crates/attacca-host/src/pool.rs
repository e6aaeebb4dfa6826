//! On-demand worker pool for plugin parallel tasks.
//!
//! A fixed set of threads is spawned once at session construction and torn
//! down once at destruction. Each worker parks on a counting handoff; a run
//! request releases it `n` times and the audio thread blocks until `n`
//! completions are acknowledged. Task ordering is undefined: workers claim
//! the next unclaimed task index from an atomic counter until none remain.

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use crate::thread::{assert_audio_thread, RoleGuard, ThreadRole};

/// The recipient of pool work: one call per claimed task index.
pub trait PoolTask: Send + Sync {
    fn exec_task(&self, task_index: u32);
}

struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            permits: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    fn release(&self, n: usize) {
        let mut permits = self.permits.lock();
        *permits += n;
        self.available.notify_all();
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    fn acquire_many(&self, n: usize) {
        for _ in 0..n {
            self.acquire();
        }
    }
}

struct PoolInner {
    produce: Semaphore,
    done: Semaphore,
    task_index: AtomicU32,
    stop: AtomicBool,
    target: ArcSwapOption<Arc<dyn PoolTask>>,
}

pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn one worker per apparent hardware thread.
    pub fn new() -> Self {
        let size = thread::available_parallelism().map_or(2, |n| n.get());
        Self::with_size(size)
    }

    pub fn with_size(size: usize) -> Self {
        assert!(size > 0, "worker pool needs at least one thread");
        let inner = Arc::new(PoolInner {
            produce: Semaphore::new(),
            done: Semaphore::new(),
            task_index: AtomicU32::new(0),
            stop: AtomicBool::new(false),
            target: ArcSwapOption::empty(),
        });

        let workers = (0..size)
            .map(|i| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("attacca-pool-{i}"))
                    .spawn(move || worker_entry(&inner))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Install the recipient of future task dispatches. Called on the main
    /// thread at load/unload so no allocation happens on the audio path.
    pub fn set_target(&self, target: Option<Arc<dyn PoolTask>>) {
        self.inner.target.store(target.map(Arc::new));
    }

    /// Run `num_tasks` tasks and block until all of them completed.
    ///
    /// Zero tasks is a no-op; a single task runs inline on the calling
    /// thread without waking the pool.
    pub fn request_exec(&self, num_tasks: u32) {
        assert_audio_thread();
        assert!(
            !self.inner.stop.load(Ordering::Relaxed),
            "worker pool is shut down"
        );

        if num_tasks == 0 {
            return;
        }
        if num_tasks == 1 {
            if let Some(target) = self.inner.target.load_full() {
                target.exec_task(0);
            }
            return;
        }

        self.inner.task_index.store(0, Ordering::SeqCst);
        self.inner.produce.release(num_tasks as usize);
        self.inner.done.acquire_many(num_tasks as usize);
    }

    /// Stop and join every worker. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock();
        self.inner.produce.release(workers.len());
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_entry(inner: &PoolInner) {
    let _role = RoleGuard::assume(ThreadRole::Worker);
    loop {
        inner.produce.acquire();
        if inner.stop.load(Ordering::Relaxed) {
            return;
        }

        let task_index = inner.task_index.fetch_add(1, Ordering::SeqCst);
        if let Some(target) = inner.target.load_full() {
            target.exec_task(task_index);
        }
        inner.done.release(1);
    }
}
