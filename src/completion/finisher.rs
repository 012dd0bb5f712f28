//! Ordered off-stack completion executor
//!
//! A `Finisher` owns one worker thread that drains a FIFO queue of jobs.
//! Queue order is execution order, so two completions queued by the same
//! lock holder always run in the order they were queued.
//!
//! Jobs that need the journal re-acquire the owning lock themselves; the
//! worker never holds any lock while running a job.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::{Completion, Status};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    /// Jobs queued or currently running.
    outstanding: usize,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled when a job is queued or stop is requested.
    work: Condvar,
    /// Signalled when `outstanding` drops to zero.
    idle: Condvar,
}

/// Cloneable handle to a single-threaded FIFO completion executor.
#[derive(Clone)]
pub struct Finisher {
    shared: Arc<Shared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Finisher {
    /// Start a finisher with a named worker thread.
    pub fn start(name: &str) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(worker_shared))
            .expect("failed to spawn finisher thread");

        Self {
            shared,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(job) = queue.jobs.pop_front() {
                        break job;
                    }
                    if queue.stopping {
                        return;
                    }
                    shared.work.wait(&mut queue);
                }
            };

            job();

            let mut queue = shared.queue.lock();
            queue.outstanding -= 1;
            if queue.outstanding == 0 {
                shared.idle.notify_all();
            }
        }
    }

    /// Queue a completion to fire with `status`.
    pub fn queue(&self, completion: Completion, status: Status) {
        self.queue_fn(move || completion.complete(status));
    }

    /// Queue an arbitrary job.
    ///
    /// Jobs queued after `stop` are dropped without running.
    pub fn queue_fn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.stopping {
            return;
        }
        queue.jobs.push_back(Box::new(f));
        queue.outstanding += 1;
        self.shared.work.notify_one();
    }

    /// Number of jobs queued or running.
    pub fn outstanding(&self) -> usize {
        self.shared.queue.lock().outstanding
    }

    /// Block until every queued job, including jobs queued by running jobs,
    /// has finished.
    ///
    /// Must not be called while holding a lock that queued jobs acquire.
    pub fn wait_for_empty(&self) {
        let mut queue = self.shared.queue.lock();
        while queue.outstanding > 0 {
            self.shared.idle.wait(&mut queue);
        }
    }

    /// Drain remaining jobs and join the worker thread.
    pub fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.stopping = true;
            self.shared.work.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Whether `stop` has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shared.queue.lock().stopping
    }
}

impl std::fmt::Debug for Finisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finisher")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_fifo_order() {
        let finisher = Finisher::start("test-finisher");
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..32 {
            let order = Arc::clone(&order);
            finisher.queue_fn(move || order.lock().push(i));
        }
        finisher.wait_for_empty();

        assert_eq!(*order.lock(), (0..32).collect::<Vec<_>>());
        finisher.stop();
    }

    #[test]
    fn test_queue_completion_off_calling_thread() {
        let finisher = Finisher::start("test-finisher");
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&ran_on);
        finisher.queue(
            Completion::new(move |_| *slot.lock() = Some(thread::current().id())),
            Status::OK,
        );
        finisher.wait_for_empty();

        let ran_on = ran_on.lock().expect("completion ran");
        assert_ne!(ran_on, caller);
        finisher.stop();
    }

    #[test]
    fn test_wait_for_empty_covers_nested_jobs() {
        let finisher = Finisher::start("test-finisher");
        let count = Arc::new(AtomicUsize::new(0));

        let inner = finisher.clone();
        let c = Arc::clone(&count);
        finisher.queue_fn(move || {
            let c2 = Arc::clone(&c);
            inner.queue_fn(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            });
            c.fetch_add(1, Ordering::SeqCst);
        });
        finisher.wait_for_empty();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        finisher.stop();
    }

    #[test]
    fn test_stop_drains_queued_jobs() {
        let finisher = Finisher::start("test-finisher");
        let (signal, completion) = CompletionSignal::new();
        finisher.queue(completion, Status::EIO);
        finisher.stop();

        assert_eq!(signal.wait_for(Duration::from_secs(1)), Some(Status::EIO));
        assert!(finisher.is_stopped());
    }

    #[test]
    fn test_queue_after_stop_is_dropped() {
        let finisher = Finisher::start("test-finisher");
        finisher.stop();

        let (signal, completion) = CompletionSignal::new();
        finisher.queue(completion, Status::OK);
        assert_eq!(finisher.outstanding(), 0);
        assert!(!signal.is_fired());
    }
}
