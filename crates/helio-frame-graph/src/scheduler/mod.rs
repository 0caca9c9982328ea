//! The process-wide priority thread pool: `High` (pass recording and
//! critical-path work), `Low` (background asset/pipeline work), `Streaming`
//! (single-threaded I/O). Thread counts default to `(cores-1, cores-2, 1)`.
//!
//! Grounded in the odeza example repo's job/threading primitives
//! (`odeza-core::job::JobSystem`'s priority-handle model,
//! `odeza-platform::threading::ThreadPool`'s worker-thread lifecycle), adapted
//! to this system's fixed three-class, parking_lot-guarded per-thread-queue
//! take-any design rather than a work-stealing deque (the teacher repo has no
//! job system of its own to ground this on).

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Priority {
    High,
    Low,
    Streaming,
}

/// One priority class's per-thread queues, guarded by a single mutex, plus the
/// condition variable idle workers in the class park on. A worker checks its
/// own queue first, then any other queue in the class (cooperative take-any)
/// before parking.
struct ClassQueues {
    per_thread: Mutex<Vec<VecDeque<Task>>>,
    condvar: Condvar,
    shutdown: AtomicBool,
    next_push: AtomicUsize,
}

impl ClassQueues {
    fn new(thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        Self {
            per_thread: Mutex::new((0..thread_count).map(|_| VecDeque::new()).collect()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_push: AtomicUsize::new(0),
        }
    }

    fn push(&self, task: Task) {
        let mut queues = self.per_thread.lock();
        let index = self.next_push.fetch_add(1, Ordering::Relaxed) % queues.len();
        queues[index].push_back(task);
        self.condvar.notify_one();
    }

    fn pop_blocking(&self, own_index: usize) -> Option<Task> {
        let mut queues = self.per_thread.lock();
        loop {
            if let Some(task) = queues[own_index].pop_front() {
                return Some(task);
            }
            for other in 0..queues.len() {
                if other != own_index {
                    if let Some(task) = queues[other].pop_front() {
                        return Some(task);
                    }
                }
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.condvar.wait(&mut queues);
        }
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

fn spawn_workers(class_name: &'static str, queues: Arc<ClassQueues>) -> Vec<JoinHandle<()>> {
    let thread_count = queues.per_thread.lock().len();
    (0..thread_count)
        .map(|index| {
            let queues = queues.clone();
            std::thread::Builder::new()
                .name(format!("helio-{class_name}-{index}"))
                .spawn(move || {
                    while let Some(task) = queues.pop_blocking(index) {
                        task();
                    }
                })
                .expect("failed to spawn scheduler worker thread")
        })
        .collect()
}

/// The pool passes and shader compilation dispatch onto. One instance lives
/// for the whole process; holding it behind an `Arc` in `FrameContext` /
/// `Renderer` lets passes and the pipeline manager share it.
pub struct PriorityPool {
    high: Arc<ClassQueues>,
    low: Arc<ClassQueues>,
    streaming: Arc<ClassQueues>,
    workers: Vec<JoinHandle<()>>,
}

impl PriorityPool {
    /// `(cores - 1, cores - 2, 1)`, per the scheduling model's default thread
    /// counts.
    pub fn new() -> Self {
        let cores = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        Self::with_thread_counts(cores.saturating_sub(1).max(1), cores.saturating_sub(2).max(1), 1)
    }

    pub fn with_thread_counts(high_threads: usize, low_threads: usize, streaming_threads: usize) -> Self {
        let high = Arc::new(ClassQueues::new(high_threads));
        let low = Arc::new(ClassQueues::new(low_threads));
        let streaming = Arc::new(ClassQueues::new(streaming_threads));

        let mut workers = spawn_workers("high", high.clone());
        workers.extend(spawn_workers("low", low.clone()));
        workers.extend(spawn_workers("streaming", streaming.clone()));

        Self { high, low, streaming, workers }
    }

    pub fn dispatch(&self, priority: Priority, task: impl FnOnce() + Send + 'static) {
        self.queues_for(priority).push(Box::new(task));
    }

    fn queues_for(&self, priority: Priority) -> &ClassQueues {
        match priority {
            Priority::High => &self.high,
            Priority::Low => &self.low,
            Priority::Streaming => &self.streaming,
        }
    }
}

impl Default for PriorityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PriorityPool {
    fn drop(&mut self) {
        self.high.request_shutdown();
        self.low.request_shutdown();
        self.streaming.request_shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Tracks a batch of dispatched tasks so a caller can block until all of them
/// finish — the frame executor's per-dependency-level record fan-out, and the
/// pipeline manager's pass-creation compile barrier, both build one of these.
pub struct TaskGroup {
    pending: AtomicUsize,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl TaskGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { pending: AtomicUsize::new(0), mutex: Mutex::new(()), condvar: Condvar::new() })
    }

    /// Dispatches `task` on `pool` at `priority`, tracked by this group.
    pub fn dispatch<F>(self: &Arc<Self>, pool: &PriorityPool, priority: Priority, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let group = self.clone();
        pool.dispatch(priority, move || {
            task();
            if group.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                let _guard = group.mutex.lock();
                group.condvar.notify_all();
            }
        });
    }

    /// Blocks the calling thread until every task dispatched through this
    /// group has completed. One of the scheduling model's explicit suspension
    /// points.
    pub fn wait(&self) {
        let mut guard = self.mutex.lock();
        while self.pending.load(Ordering::SeqCst) != 0 {
            self.condvar.wait(&mut guard);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn dispatched_tasks_run_and_task_group_wait_observes_completion() {
        let pool = PriorityPool::with_thread_counts(2, 1, 1);
        let group = TaskGroup::new();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..8 {
            let counter = counter.clone();
            group.dispatch(&pool, Priority::High, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        group.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(group.pending_count(), 0);
    }

    #[test]
    fn streaming_class_runs_on_its_own_single_thread() {
        let pool = PriorityPool::with_thread_counts(1, 1, 1);
        let group = TaskGroup::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        group.dispatch(&pool, Priority::Streaming, move || {
            ran_clone.store(true, Ordering::SeqCst);
        });
        group.wait();
        assert!(ran.load(Ordering::SeqCst));
    }
}
