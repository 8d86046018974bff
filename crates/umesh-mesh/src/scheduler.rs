//! Cooperative single-threaded task scheduler.
//!
//! Every piece of mesh state is mutated from handlers run by one
//! [`Scheduler`]. Other threads (radio receive callbacks, the CLI) only
//! *post* work; the loop that owns the state runs it. Two queues exist:
//!
//! - an immediate FIFO, drained in post order, and
//! - a timer list sorted by deadline; equal deadlines keep post order.
//!
//! One loop iteration runs all ready immediate tasks, then all timers whose
//! deadline has passed, then sleeps until the next deadline or a new post.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::error::SchedulerError;

/// Opaque argument handed to a task handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskArg(pub u64);

impl TaskArg {
    pub const NONE: TaskArg = TaskArg(0);
}

/// A task body run with exclusive access to the scheduler's state `S`.
///
/// Handlers are compared by identity: two clones of the same `Handler` are
/// equal, two separately constructed handlers never are. Timer cancellation
/// relies on this.
pub struct Handler<S>(Arc<dyn Fn(&mut S, TaskArg) + Send + Sync>);

impl<S> Handler<S> {
    pub fn new(f: impl Fn(&mut S, TaskArg) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Whether `self` and `other` are the same handler.
    pub fn same(&self, other: &Handler<S>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self, state: &mut S, arg: TaskArg) {
        (self.0)(state, arg)
    }
}

impl<S> Clone for Handler<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S> fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0))
    }
}

struct Task<S> {
    handler: Handler<S>,
    arg: TaskArg,
}

struct Timer<S> {
    handler: Handler<S>,
    arg: TaskArg,
    delay_ms: u64,
    deadline: Instant,
    seq: u64,
}

struct Queues<S> {
    tasks: VecDeque<Task<S>>,
    timers: VecDeque<Timer<S>>,
    next_seq: u64,
    closed: bool,
}

struct Shared<S> {
    queues: Mutex<Queues<S>>,
    wake: Notify,
    epoch: Instant,
    /// Offset added to `now_ms()` to form the absolute timestamp.
    timestamp_offset: AtomicI64,
}

/// Handle to a scheduler. Cheap to clone; all clones share the same queues.
pub struct Scheduler<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(Queues {
                    tasks: VecDeque::new(),
                    timers: VecDeque::new(),
                    next_seq: 0,
                    closed: false,
                }),
                wake: Notify::new(),
                epoch: Instant::now(),
                timestamp_offset: AtomicI64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queues<S>> {
        self.shared
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `handler` to run on the next loop iteration.
    pub fn post(&self, handler: &Handler<S>, arg: TaskArg) -> Result<(), SchedulerError> {
        {
            let mut queues = self.lock();
            if queues.closed {
                return Err(SchedulerError::Closed);
            }
            queues.tasks.push_back(Task {
                handler: handler.clone(),
                arg,
            });
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Run `handler` once, no earlier than `delay_ms` from now.
    pub fn post_delayed(
        &self,
        delay_ms: u64,
        handler: &Handler<S>,
        arg: TaskArg,
    ) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + Duration::from_millis(delay_ms);
        {
            let mut queues = self.lock();
            if queues.closed {
                return Err(SchedulerError::Closed);
            }
            // Insert after every timer with deadline <= ours so ties stay FIFO.
            let pos = queues
                .timers
                .iter()
                .position(|t| t.deadline > deadline)
                .unwrap_or(queues.timers.len());
            let seq = queues.next_seq;
            queues.next_seq += 1;
            queues.timers.insert(
                pos,
                Timer {
                    handler: handler.clone(),
                    arg,
                    delay_ms,
                    deadline,
                    seq,
                },
            );
            debug_assert!(
                queues
                    .timers
                    .iter()
                    .zip(queues.timers.iter().skip(1))
                    .all(|(a, b)| a.deadline <= b.deadline)
            );
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Remove the earliest pending timer matching `(delay_ms, handler, arg)`.
    ///
    /// A negative `delay_ms` matches any delay. Returns whether a timer was
    /// removed; cancelling a timer that is not pending is a no-op.
    pub fn cancel_delayed(&self, delay_ms: i64, handler: &Handler<S>, arg: TaskArg) -> bool {
        let mut queues = self.lock();
        let found = queues.timers.iter().position(|t| {
            (delay_ms < 0 || t.delay_ms == delay_ms as u64)
                && t.handler.same(handler)
                && t.arg == arg
        });
        match found {
            Some(pos) => {
                queues.timers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Whether a timer for `(handler, arg)` is pending, with any delay.
    pub fn is_scheduled(&self, handler: &Handler<S>, arg: TaskArg) -> bool {
        self.lock()
            .timers
            .iter()
            .any(|t| t.handler.same(handler) && t.arg == arg)
    }

    /// Number of queued immediate tasks and pending timers.
    pub fn pending(&self) -> (usize, usize) {
        let queues = self.lock();
        (queues.tasks.len(), queues.timers.len())
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().timers.front().map(|t| t.deadline)
    }

    /// Reject further posts and wake the run loop so it can exit.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Milliseconds elapsed since the scheduler was created.
    pub fn now_ms(&self) -> u64 {
        self.shared.epoch.elapsed().as_millis() as u64
    }

    /// Absolute time in milliseconds, as last set by [`set_timestamp`](Self::set_timestamp).
    pub fn timestamp(&self) -> u64 {
        let offset = self.shared.timestamp_offset.load(Ordering::Relaxed);
        (self.now_ms() as i64).saturating_add(offset).max(0) as u64
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        let offset = (timestamp as i64).saturating_sub(self.now_ms() as i64);
        self.shared
            .timestamp_offset
            .store(offset, Ordering::Relaxed);
    }

    /// Run one loop iteration without blocking.
    ///
    /// Drains every immediate task (including ones posted by handlers during
    /// the drain), then every timer that was pending and expired at the start
    /// of the timer phase. Timers armed by those handlers wait for the next
    /// iteration. Returns the number of handlers run.
    pub fn run_pending(&self, state: &mut S) -> usize {
        let mut ran = 0;

        loop {
            // Pop under the lock, run without it: handlers post freely.
            let task = self.lock().tasks.pop_front();
            let Some(task) = task else { break };
            tracing::trace!(arg = task.arg.0, "sched: running task");
            task.handler.call(state, task.arg);
            ran += 1;
        }

        let now = Instant::now();
        let limit = self.lock().next_seq;
        loop {
            let timer = {
                let mut queues = self.lock();
                match queues.timers.front() {
                    Some(t) if t.deadline <= now && t.seq < limit => queues.timers.pop_front(),
                    _ => None,
                }
            };
            let Some(timer) = timer else { break };
            tracing::trace!(
                arg = timer.arg.0,
                delay_ms = timer.delay_ms,
                "sched: running timer"
            );
            timer.handler.call(state, timer.arg);
            ran += 1;
        }

        ran
    }

    /// Run until the scheduler is closed.
    pub async fn run_forever(&self, state: &mut S) {
        let (_keep, stop) = watch::channel(false);
        self.run_until_stopped(state, stop).await;
    }

    /// Run until `stop` turns `true` (or its sender is dropped) or the
    /// scheduler is closed.
    pub async fn run_until_stopped(&self, state: &mut S, mut stop: watch::Receiver<bool>) {
        loop {
            self.run_pending(state);

            if *stop.borrow() || self.is_closed() {
                break;
            }

            let (ready, _) = self.pending();
            if ready > 0 {
                continue;
            }

            let woken = self.shared.wake.notified();
            match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = woken => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = woken => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!("sched: run loop exited");
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn fire_all(delays: &[u64]) -> Vec<u64> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let sched: Scheduler<Vec<u64>> = Scheduler::new();
            let h = Handler::new(|log: &mut Vec<u64>, arg| log.push(arg.0));
            for (i, d) in delays.iter().enumerate() {
                sched.post_delayed(*d, &h, TaskArg(i as u64)).unwrap();
            }
            tokio::time::advance(Duration::from_millis(500)).await;
            let mut log = Vec::new();
            sched.run_pending(&mut log);
            log
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn timers_never_fire_out_of_order(delays in proptest::collection::vec(0u64..500, 1..40)) {
            let fired = fire_all(&delays);
            prop_assert_eq!(fired.len(), delays.len());
            for pair in fired.windows(2) {
                let (a, b) = (pair[0] as usize, pair[1] as usize);
                prop_assert!(delays[a] < delays[b] || (delays[a] == delays[b] && a < b));
            }
        }
    }
}
