//! Broker-managed worker and scheduled thread pools.
//!
//! Both pools are shared across all addresses. A slow consumer on one
//! address can therefore occupy workers that other addresses are waiting
//! for; there is no per-address isolation.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Unit of work executed on a pool thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_WORKER_THREADS: usize = 8;
const DEFAULT_SCHEDULED_THREADS: usize = 2;

/// Resolve a configured pool size (-1 = built-in default).
pub fn pool_size(configured: i32, default: usize) -> usize {
    if configured < 0 {
        default
    } else {
        (configured as usize).max(1)
    }
}

pub fn worker_pool_size(configured: i32) -> usize {
    pool_size(configured, DEFAULT_WORKER_THREADS)
}

pub fn scheduled_pool_size(configured: i32) -> usize {
    pool_size(configured, DEFAULT_SCHEDULED_THREADS)
}

/// Fixed-size worker pool draining a shared task channel.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    loop {
                        let task = {
                            let guard = rx.lock().unwrap();
                            guard.recv()
                        };
                        match task {
                            Ok(task) => task(),
                            Err(_) => break,
                        }
                    }
                })
                .expect("failed to spawn broker worker thread");
            workers.push(handle);
        }

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Submit a task. Tasks submitted after shutdown are dropped.
    pub fn execute(&self, task: Task) {
        let guard = self.sender.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(task);
        }
    }

    /// Stop accepting work and join the workers.
    pub fn shutdown(&self) {
        self.sender.lock().unwrap().take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

struct ScheduledTask {
    due: Instant,
    task: Task,
}

struct SchedulerState {
    queue: VecDeque<ScheduledTask>,
    shutdown: bool,
}

/// Scheduled pool: runs tasks after a delay (delayed redeliveries).
pub struct DelayScheduler {
    state: Arc<(Mutex<SchedulerState>, Condvar)>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl DelayScheduler {
    pub fn new(name: &str, size: usize) -> Self {
        let state = Arc::new((
            Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let state = state.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || scheduler_loop(&state))
                .expect("failed to spawn broker scheduler thread");
            workers.push(handle);
        }

        Self {
            state,
            workers: Mutex::new(workers),
        }
    }

    /// Run `task` no earlier than `delay` from now.
    pub fn schedule(&self, delay: Duration, task: Task) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap_or_poisoned();
        if state.shutdown {
            return;
        }
        state.queue.push_back(ScheduledTask {
            due: Instant::now() + delay,
            task,
        });
        cvar.notify_all();
    }

    pub fn shutdown(&self) {
        let (lock, cvar) = &*self.state;
        {
            let mut state = lock.lock().unwrap_or_poisoned();
            state.shutdown = true;
            state.queue.clear();
        }
        cvar.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.join();
        }
        debug!("scheduler pool stopped");
    }
}

fn scheduler_loop(state: &(Mutex<SchedulerState>, Condvar)) {
    let (lock, cvar) = state;
    let mut guard = lock.lock().unwrap_or_poisoned();
    loop {
        if guard.shutdown {
            return;
        }

        let now = Instant::now();
        // Pick the first due task, or compute how long to wait for the
        // earliest pending one.
        if let Some(pos) = guard.queue.iter().position(|t| t.due <= now) {
            if let Some(scheduled) = guard.queue.remove(pos) {
                drop(guard);
                (scheduled.task)();
                guard = lock.lock().unwrap_or_poisoned();
            }
            continue;
        }

        let earliest = guard.queue.iter().map(|t| t.due).min();
        guard = match earliest {
            Some(due) => {
                let wait = due.saturating_duration_since(now);
                cvar.wait_timeout(guard, wait).unwrap_or_poisoned().0
            }
            None => cvar.wait(guard).unwrap_or_poisoned(),
        };
    }
}

/// Lock helper: broker pools keep running even if a task panicked while
/// holding the lock.
trait UnwrapOrPoisoned {
    type Output;
    fn unwrap_or_poisoned(self) -> Self::Output;
}

impl<'a, T> UnwrapOrPoisoned for Result<std::sync::MutexGuard<'a, T>, std::sync::PoisonError<std::sync::MutexGuard<'a, T>>> {
    type Output = std::sync::MutexGuard<'a, T>;

    fn unwrap_or_poisoned(self) -> Self::Output {
        self.unwrap_or_else(|e| e.into_inner())
    }
}

impl<'a, T> UnwrapOrPoisoned
    for Result<
        (std::sync::MutexGuard<'a, T>, std::sync::WaitTimeoutResult),
        std::sync::PoisonError<(std::sync::MutexGuard<'a, T>, std::sync::WaitTimeoutResult)>,
    >
{
    type Output = (std::sync::MutexGuard<'a, T>, std::sync::WaitTimeoutResult);

    fn unwrap_or_poisoned(self) -> Self::Output {
        self.unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn worker_pool_runs_submitted_tasks() {
        let pool = WorkerPool::new("test-worker", 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn scheduler_runs_after_delay() {
        let scheduler = DelayScheduler::new("test-sched", 1);
        let (tx, rx) = mpsc::channel();

        let started = Instant::now();
        scheduler.schedule(
            Duration::from_millis(30),
            Box::new(move || {
                let _ = tx.send(started.elapsed());
            }),
        );

        let elapsed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(elapsed >= Duration::from_millis(30));
        scheduler.shutdown();
    }

    #[test]
    fn pool_size_resolution() {
        assert_eq!(worker_pool_size(-1), DEFAULT_WORKER_THREADS);
        assert_eq!(worker_pool_size(3), 3);
        assert_eq!(scheduled_pool_size(-1), DEFAULT_SCHEDULED_THREADS);
        assert_eq!(pool_size(0, 4), 1);
    }
}
