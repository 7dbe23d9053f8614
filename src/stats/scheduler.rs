//! Shared periodic scheduler handing out independently cancellable timers.
//!
//! A fixed pool of worker threads waits on one deadline heap. A timer is never run by two
//! workers at once: it only goes back on the heap after its tick has returned.

use crate::errors::MgmtError;
use crate::logger::STATS_TARGET;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What a tick wants to happen to its timer afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub type Task = Arc<dyn Fn() -> Tick + Send + Sync>;

#[derive(Default)]
struct TimerState {
    cancelled: AtomicBool,
    // Held for the whole duration of a tick.
    running: Mutex<()>,
}

struct Entry {
    due: Instant,
    id: u64,
    period: Duration,
    task: Task,
    state: Arc<TimerState>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must come out first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.due.cmp(&self.due).then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    shutdown: bool,
    next_id: u64,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    cond: Condvar,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(threads: usize) -> Result<Self, MgmtError> {
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tiermon-sampler-{i}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| MgmtError::Io(format!("Failed to spawn sampler thread: {e}")))?;
            workers.push(handle);
        }
        Ok(Self { shared, workers: Mutex::new(workers) })
    }

    /// Run `task` every `period`, first tick one period from now.
    pub fn schedule(&self, period: Duration, task: Task) -> Result<TimerHandle, MgmtError> {
        let period = period.max(Duration::from_millis(1));
        let state = Arc::new(TimerState::default());
        let mut q = self.shared.queue.lock();
        if q.shutdown {
            return Err(MgmtError::SchedulerShutdown);
        }
        q.next_id += 1;
        let id = q.next_id;
        q.heap.push(Entry { due: Instant::now() + period, id, period, task, state: state.clone() });
        drop(q);
        self.shared.cond.notify_all();
        Ok(TimerHandle { id, state, shared: Arc::downgrade(&self.shared) })
    }

    /// Timers currently waiting for their next tick.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shutdown
    }

    /// Stop all workers. In-flight ticks complete; nothing fires afterwards.
    pub fn shutdown(&self) {
        {
            let mut q = self.shared.queue.lock();
            if q.shutdown {
                return;
            }
            q.shutdown = true;
            q.heap.clear();
        }
        self.shared.cond.notify_all();
        let current = std::thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for w in workers {
            if w.thread().id() != current {
                let _ = w.join();
            }
        }
        log::debug!(target: STATS_TARGET, "sampling scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    let mut q = shared.queue.lock();
    loop {
        if q.shutdown {
            return;
        }
        let now = Instant::now();
        let next_due = q.heap.peek().map(|e| e.due);
        match next_due {
            None => {
                shared.cond.wait(&mut q);
            }
            Some(due) if due > now => {
                let _ = shared.cond.wait_until(&mut q, due);
            }
            Some(_) => {
                let Some(entry) = q.heap.pop() else { continue };
                if entry.state.cancelled.load(Ordering::Acquire) {
                    continue;
                }
                let next = MutexGuard::unlocked(&mut q, || run_tick(entry));
                if let Some(next) = next
                    && !q.shutdown
                {
                    q.heap.push(next);
                    shared.cond.notify_one();
                }
            }
        }
    }
}

fn run_tick(entry: Entry) -> Option<Entry> {
    let outcome = {
        let _running = entry.state.running.lock();
        if entry.state.cancelled.load(Ordering::Acquire) {
            return None;
        }
        match catch_unwind(AssertUnwindSafe(|| (entry.task)())) {
            Ok(t) => t,
            Err(_) => {
                log::error!(target: STATS_TARGET, "sampling task {} panicked; keeping timer", entry.id);
                Tick::Continue
            }
        }
    };
    if outcome == Tick::Stop {
        entry.state.cancelled.store(true, Ordering::Release);
        return None;
    }
    if entry.state.cancelled.load(Ordering::Acquire) {
        return None;
    }
    let now = Instant::now();
    let mut due = entry.due + entry.period;
    if due <= now {
        due = now + entry.period;
    }
    Some(Entry { due, ..entry })
}

/// Handle to one scheduled timer.
pub struct TimerHandle {
    id: u64,
    state: Arc<TimerState>,
    shared: Weak<Shared>,
}

impl TimerHandle {
    /// Cancel the timer and wait for an in-flight tick to finish.
    ///
    /// Must not be called from inside the timer's own task; return [`Tick::Stop`] instead.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        if let Some(shared) = self.shared.upgrade() {
            let id = self.id;
            shared.queue.lock().heap.retain(|e| e.id != id);
        }
        let _wait = self.state.running.lock();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
