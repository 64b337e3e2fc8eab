use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;

use tokio::task::AbortHandle;

/// One second of countdown progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { remaining: u32 },
    Expired,
}

/// Per-session countdown. Expires exactly once; further ticks report zero
/// remaining without re-firing.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u32,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self { remaining: seconds }
    }

    pub fn tick(&mut self) -> Tick {
        match self.remaining {
            0 => Tick::Running { remaining: 0 },
            1 => {
                self.remaining = 0;
                Tick::Expired
            }
            _ => {
                self.remaining -= 1;
                Tick::Running {
                    remaining: self.remaining,
                }
            }
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Scheduled tasks (countdown, auto-advance, auto-complete) owned by one
/// chat's session, plus the completion claim those tasks race for.
/// Cancelling on every state-invalidating transition keeps a stale callback
/// from mutating a superseded session; the claim decides which of several
/// concurrent completion paths actually finishes the run.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<i64, Vec<AbortHandle>>>,
    completed: Mutex<HashSet<i64>>,
}

impl TaskRegistry {
    pub fn spawn<F>(&self, key: i64, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut).abort_handle();
        let mut tasks = self.tasks.lock().unwrap();
        let handles = tasks.entry(key).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn cancel(&self, key: i64) {
        if let Some(handles) = self.tasks.lock().unwrap().remove(&key) {
            for handle in handles {
                handle.abort();
            }
        }
    }

    /// Claims the right to complete the session for `key`. Of any
    /// competing completion paths (a give-up racing the countdown, say)
    /// exactly one gets `true`; the losers must back off without side
    /// effects.
    pub fn claim_completion(&self, key: i64) -> bool {
        self.completed.lock().unwrap().insert(key)
    }

    /// Re-arms the claim when a new play-through starts.
    pub fn reset_completion(&self, key: i64) {
        self.completed.lock().unwrap().remove(&key);
    }
}
