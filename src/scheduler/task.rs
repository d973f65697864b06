// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

thread_local! {
    static SCHEDULER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Marks the calling thread as owned by a scheduler.
pub(crate) fn mark_scheduler_thread() {
    SCHEDULER_THREAD.with(|flag| flag.set(true));
}

/// Returns true on threads spawned by a [`ConfigurationScheduler`](super::ConfigurationScheduler).
pub fn is_scheduler_thread() -> bool {
    SCHEDULER_THREAD.with(|flag| flag.get())
}

/// How a task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repeat {
    Once,
    /// The next run starts this long after the previous run finished.
    FixedDelay(Duration),
    /// Runs start this far apart, measured from the first due time.
    FixedRate(Duration),
}

pub(crate) type Action = Box<dyn Fn() + Send + Sync + 'static>;

pub(crate) struct TaskShared {
    pub(crate) id: u64,
    pub(crate) repeat: Repeat,
    pub(crate) action: Action,
    cancelled: AtomicBool,
    done: AtomicBool,
    runs: AtomicU64,
    // held for the duration of each run
    gate: Mutex<()>,
}

impl fmt::Debug for TaskShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("repeat", &self.repeat)
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .field("done", &self.done.load(Ordering::Relaxed))
            .field("runs", &self.runs.load(Ordering::Relaxed))
            .finish()
    }
}

impl TaskShared {
    pub(crate) fn new(id: u64, repeat: Repeat, action: Action) -> TaskShared {
        TaskShared {
            id,
            repeat,
            action,
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            gate: Mutex::new(()),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Flag the task as cancelled without waiting for an in-flight run.
    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Run the action unless cancelled. Returns false if the task was cancelled.
    pub(crate) fn run(&self, run: impl FnOnce(&Action)) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_cancelled() {
            return false;
        }
        run(&self.action);
        self.runs.fetch_add(1, Ordering::AcqRel);
        true
    }
}

/// A handle to a task submitted to a [`ConfigurationScheduler`](super::ConfigurationScheduler).
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    shared: Arc<TaskShared>,
}

impl ScheduledTask {
    pub(crate) fn new(shared: Arc<TaskShared>) -> ScheduledTask {
        ScheduledTask { shared }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Cancel the task. No run starts after this returns.
    ///
    /// If a run is in flight, waits for it to finish, unless called from a scheduler thread
    /// (for example from inside the task itself).
    pub fn cancel(&self) {
        self.shared.mark_cancelled();
        if !is_scheduler_thread() {
            drop(self.shared.gate.lock().unwrap_or_else(|e| e.into_inner()));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// True once a one-shot task has run, or once the task has been cancelled.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire) || self.is_cancelled()
    }

    /// The number of completed runs.
    pub fn runs(&self) -> u64 {
        self.shared.runs.load(Ordering::Acquire)
    }
}
