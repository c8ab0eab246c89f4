//! Two-level priority queue feeding the file worker.
//!
//! High-priority tasks always run before normal ones; within a level
//! tasks run in submission order. The worker blocks on a condition
//! variable while the queue is empty.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Scheduling class of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Someone is blocked on the result.
    High,
    /// Background work: chunk writes, read-ahead.
    Normal,
}

struct QueueState<T> {
    high: VecDeque<T>,
    normal: VecDeque<T>,
    closed: bool,
}

impl<T> QueueState<T> {
    fn pop(&mut self) -> Option<T> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }
}

/// Blocking MPSC queue with two priority levels and a close flag.
pub(crate) struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> TaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    // A panic while holding this lock cannot leave the deques in a torn
    // state, so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `task`. Hands it back if the queue is closed.
    pub(crate) fn push(&self, task: T, priority: Priority) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(task);
        }
        match priority {
            Priority::High => state.high.push_back(task),
            Priority::Normal => state.normal.push_back(task),
        }
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a task is available. Returns `None` once the queue is
    /// closed and fully drained.
    pub(crate) fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(task) = state.pop() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse further pushes and wake the consumer. Queued tasks are
    /// still handed out by [`pop`](Self::pop).
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Close and drop every queued task without running it.
    pub(crate) fn abandon(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.len();
        state.high.clear();
        state.normal.clear();
        drop(state);
        self.ready.notify_all();
        dropped
    }

    /// Number of queued tasks.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
