//! Shared FIFO work queue with outstanding-count quiescence.
//!
//! Workers busy-poll (bounded short sleeps, never a blocking wait) while the
//! outstanding-work counter is positive, and exit once it reaches zero. The
//! counter is incremented on enqueue and decremented only after a unit's
//! processing — including any new units it enqueued — completes, so workers
//! detect quiescence without a barrier.
//!
//! The calling thread drains the queue alongside the pool's workers. This is
//! a required property, not an optimization: it guarantees forward progress
//! even if the executor supplies fewer threads than requested, where a
//! blocking-queue-plus-join design can deadlock.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use rayon::ThreadPool;

const POLL_SLEEP: Duration = Duration::from_micros(200);

pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    outstanding: AtomicUsize,
    interrupted: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
}

impl<T: Send> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            outstanding: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let queue = Self::new();
        for item in items {
            queue.add(item);
        }
        queue
    }

    /// Enqueue a unit of work. May be called from inside a worker to spawn
    /// follow-up units; the parent unit stays outstanding until its own
    /// processing returns.
    pub fn add(&self, item: T) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.items.lock().expect("work queue poisoned").push_back(item);
    }

    fn poll(&self) -> Option<T> {
        self.items.lock().expect("work queue poisoned").pop_front()
    }

    /// Signal all workers to stop at their next loop iteration.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn record_error(&self, err: anyhow::Error) {
        let mut slot = self.first_error.lock().expect("work queue poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
        self.interrupt();
    }

    fn worker_loop<F>(&self, process: &F)
    where
        F: Fn(T, &Self) -> Result<()> + Sync,
    {
        loop {
            if self.is_interrupted() {
                return;
            }
            match self.poll() {
                Some(item) => {
                    let result = process(item, self);
                    self.outstanding.fetch_sub(1, Ordering::SeqCst);
                    if let Err(err) = result {
                        self.record_error(err);
                        return;
                    }
                }
                None => {
                    if self.outstanding.load(Ordering::SeqCst) == 0 {
                        return;
                    }
                    std::thread::sleep(POLL_SLEEP);
                }
            }
        }
    }

    /// Drain the queue with `num_workers` threads of `pool` plus the
    /// calling thread, returning after every worker has unwound. The first
    /// worker error interrupts the rest and is surfaced here; uncompleted
    /// work at shutdown is fatal.
    pub fn run<F>(&self, pool: &ThreadPool, num_workers: usize, process: F) -> Result<()>
    where
        F: Fn(T, &Self) -> Result<()> + Sync,
    {
        pool.scope(|s| {
            for _ in 0..num_workers {
                s.spawn(|_| self.worker_loop(&process));
            }
            self.worker_loop(&process);
        });

        if let Some(err) = self.first_error.lock().expect("work queue poisoned").take() {
            return Err(err);
        }
        let leftover = self.outstanding.load(Ordering::SeqCst);
        if leftover > 0 {
            bail!("scan stopped with {leftover} uncompleted work units");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    #[test]
    fn drains_work_that_spawns_more_work() {
        let queue = WorkQueue::with_items(0..10u32);
        let processed = AtomicUsize::new(0);
        let pool = pool(4);

        queue
            .run(&pool, 3, |item, queue| {
                processed.fetch_add(1, Ordering::SeqCst);
                if item < 10 {
                    // Each seed unit fans out into two generated units.
                    queue.add(item + 100);
                    queue.add(item + 200);
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 30);
    }

    #[test]
    fn makes_progress_with_zero_extra_workers() {
        // The calling thread alone must be able to drain the queue.
        let queue = WorkQueue::with_items(0..100u32);
        let processed = AtomicUsize::new(0);
        let pool = pool(1);

        queue
            .run(&pool, 0, |_, _| {
                processed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn first_error_interrupts_and_is_surfaced() {
        let queue = WorkQueue::with_items(0..1000u32);
        let pool = pool(2);

        let err = queue
            .run(&pool, 1, |item, _| {
                if item == 3 {
                    bail!("boom on {item}");
                }
                Ok(())
            })
            .unwrap_err();

        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn external_interrupt_leaves_uncompleted_work_as_fatal() {
        let queue = WorkQueue::with_items(0..1000u32);
        let pool = pool(1);
        queue.interrupt();

        let err = queue.run(&pool, 0, |_, _| Ok(())).unwrap_err();
        assert!(err.to_string().contains("uncompleted work"));
    }
}
