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

//! A shared executor for periodic configuration work.
//!
//! Components that need background work (polling watched resources, reloading rules) first
//! announce themselves with [`ConfigurationScheduler::increment_scheduled_items`]. The executor
//! is created on the first schedule call, sized to the number of announced items up to a cap,
//! and never exists when nothing was announced.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::Error;
use crate::LifeCycleState;
use crate::Trap;
use crate::lifecycle::LifeCycle;
use crate::trap::DefaultTrap;

pub use self::task::ScheduledTask;
pub use self::task::is_scheduler_thread;

mod task;
mod worker;

use self::task::Repeat;
use self::task::TaskShared;
use self::worker::Executor;
use self::worker::Job;

const DEFAULT_MAX_THREADS: usize = 5;

/// A periodic-task executor shared by every component of a configuration.
pub struct ConfigurationScheduler {
    name: String,
    max_threads: usize,
    trap: Arc<dyn Trap>,
    lifecycle: LifeCycle,
    next_id: AtomicU64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    scheduled_items: usize,
    executor: Option<Executor>,
    tasks: Vec<Weak<TaskShared>>,
}

impl fmt::Debug for ConfigurationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ConfigurationScheduler")
            .field("name", &self.name)
            .field("state", &self.lifecycle.state())
            .field("scheduled_items", &state.scheduled_items)
            .field("threads", &state.executor.as_ref().map(Executor::threads))
            .finish()
    }
}

impl Default for ConfigurationScheduler {
    fn default() -> Self {
        ConfigurationScheduler::new("logsift-scheduler")
    }
}

impl ConfigurationScheduler {
    /// Create a scheduler with the default thread cap and trap.
    pub fn new(name: impl Into<String>) -> ConfigurationScheduler {
        ConfigurationSchedulerBuilder::new(name).build()
    }

    pub fn builder(name: impl Into<String>) -> ConfigurationSchedulerBuilder {
        ConfigurationSchedulerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifeCycleState {
        self.lifecycle.state()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    pub fn start(&self) {
        self.lifecycle.set(LifeCycleState::Started);
    }

    /// Cancel every task, shut the executor down and wait up to `timeout` for its threads.
    ///
    /// Returns false if some thread was still running when the timeout elapsed.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.lifecycle.set(LifeCycleState::Stopping);

        let (executor, tasks) = {
            let mut state = self.lock_state();
            (state.executor.take(), std::mem::take(&mut state.tasks))
        };
        for task in tasks.iter().filter_map(Weak::upgrade) {
            task.mark_cancelled();
        }

        let finished = match executor {
            Some(executor) => {
                log::debug!("{} shutting down {} threads", self.name, executor.threads());
                let finished = executor.shutdown(timeout);
                if !finished {
                    log::warn!(
                        "{} stopped but some scheduled tasks may not have completed",
                        self.name
                    );
                }
                finished
            }
            None => true,
        };

        self.lifecycle.set(LifeCycleState::Stopped);
        finished
    }

    /// Announce one more component that will schedule work.
    ///
    /// Ignored, with an error logged, once the executor exists.
    pub fn increment_scheduled_items(&self) {
        let mut state = self.lock_state();
        if state.executor.is_some() {
            log::error!("{} attempted to increment scheduled items after start", self.name);
        } else {
            state.scheduled_items += 1;
        }
    }

    /// Withdraw an announcement. Ignored while the scheduler is started.
    pub fn decrement_scheduled_items(&self) {
        let mut state = self.lock_state();
        if !self.lifecycle.is_started() && state.scheduled_items > 0 {
            state.scheduled_items -= 1;
        }
    }

    pub fn scheduled_items(&self) -> usize {
        self.lock_state().scheduled_items
    }

    /// Whether the executor threads have been created.
    pub fn has_executor(&self) -> bool {
        self.lock_state().executor.is_some()
    }

    /// Run `task` once after `delay`.
    pub fn schedule(
        &self,
        delay: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<ScheduledTask, Error> {
        self.submit(delay, Repeat::Once, Box::new(task))
    }

    /// Run `task` after `initial_delay`, then again `delay` after each run finishes.
    pub fn schedule_with_fixed_delay(
        &self,
        initial_delay: Duration,
        delay: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<ScheduledTask, Error> {
        self.submit(initial_delay, Repeat::FixedDelay(delay), Box::new(task))
    }

    /// Run `task` after `initial_delay`, then every `period`. Runs never overlap; a late run
    /// delays the following ones.
    pub fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Result<ScheduledTask, Error> {
        self.submit(initial_delay, Repeat::FixedRate(period), Box::new(task))
    }

    fn submit(
        &self,
        delay: Duration,
        repeat: Repeat,
        action: task::Action,
    ) -> Result<ScheduledTask, Error> {
        let mut state = self.lock_state();

        if state.executor.is_none() {
            if state.scheduled_items == 0 {
                log::debug!("{}: no scheduled items", self.name);
                return Err(Error::new("no scheduled items were announced")
                    .with_context("scheduler", &self.name));
            }
            let threads = state.scheduled_items.min(self.max_threads);
            log::debug!("{} starting {} threads", self.name, threads);
            state.scheduled_items = threads;
            state.executor = Some(Executor::spawn(&self.name, threads, self.trap.clone())?);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TaskShared::new(id, repeat, action));
        let job = Job::new(Instant::now() + delay, shared.clone());
        if let Some(executor) = state.executor.as_ref() {
            executor.submit(job)?;
        }

        state.tasks.retain(|task| task.strong_count() > 0);
        state.tasks.push(Arc::downgrade(&shared));
        Ok(ScheduledTask::new(shared))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A builder for [`ConfigurationScheduler`].
pub struct ConfigurationSchedulerBuilder {
    name: String,
    max_threads: usize,
    trap: Box<dyn Trap>,
}

impl ConfigurationSchedulerBuilder {
    pub fn new(name: impl Into<String>) -> ConfigurationSchedulerBuilder {
        ConfigurationSchedulerBuilder {
            name: name.into(),
            max_threads: DEFAULT_MAX_THREADS,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Cap the number of runner threads. Values below one are raised to one.
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Set the trap receiving panics raised by scheduled tasks.
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    pub fn build(self) -> ConfigurationScheduler {
        ConfigurationScheduler {
            name: self.name,
            max_threads: self.max_threads,
            trap: Arc::from(self.trap),
            lifecycle: LifeCycle::default(),
            next_id: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn scheduler(items: usize) -> ConfigurationScheduler {
        let scheduler = ConfigurationScheduler::new("test-scheduler");
        for _ in 0..items {
            scheduler.increment_scheduled_items();
        }
        scheduler.start();
        scheduler
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_no_executor_without_items() {
        let scheduler = scheduler(0);
        assert!(scheduler.schedule(Duration::ZERO, || {}).is_err());
        assert!(!scheduler.has_executor());
        assert!(scheduler.stop(Duration::from_secs(1)));
    }

    #[test]
    fn test_thread_cap() {
        let scheduler = scheduler(8);
        assert_eq!(scheduler.scheduled_items(), 8);
        scheduler.schedule(Duration::ZERO, || {}).unwrap();
        assert!(scheduler.has_executor());
        assert_eq!(scheduler.scheduled_items(), 5);

        // announcements after the executor exists are ignored
        scheduler.increment_scheduled_items();
        assert_eq!(scheduler.scheduled_items(), 5);
        assert!(scheduler.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_decrement_only_while_stopped() {
        let scheduler = ConfigurationScheduler::new("test-scheduler");
        scheduler.increment_scheduled_items();
        scheduler.increment_scheduled_items();
        scheduler.decrement_scheduled_items();
        assert_eq!(scheduler.scheduled_items(), 1);
        scheduler.start();
        scheduler.decrement_scheduled_items();
        assert_eq!(scheduler.scheduled_items(), 1);
        scheduler.stop(Duration::from_secs(1));
        scheduler.decrement_scheduled_items();
        scheduler.decrement_scheduled_items();
        assert_eq!(scheduler.scheduled_items(), 0);
    }

    #[test]
    fn test_one_shot() {
        let scheduler = scheduler(1);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = scheduler
            .schedule(Duration::from_millis(10), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || task.is_done()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(task.runs(), 1);
        assert!(scheduler.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_fixed_delay_until_cancelled() {
        let scheduler = scheduler(1);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = scheduler
            .schedule_with_fixed_delay(Duration::ZERO, Duration::from_millis(5), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || count
            .load(Ordering::SeqCst)
            >= 3));

        task.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        assert!(task.is_done());
        assert!(scheduler.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_fixed_rate() {
        let scheduler = scheduler(2);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = scheduler
            .schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(5), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || task.runs() >= 3));
        assert!(scheduler.stop(Duration::from_secs(5)));
        assert!(task.is_cancelled());
    }

    #[test]
    fn test_panicking_task_keeps_scheduler_alive() {
        #[derive(Debug, Default)]
        struct CountingTrap(Arc<AtomicUsize>);

        impl Trap for CountingTrap {
            fn trap(&self, _: &Error) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let trapped = Arc::new(AtomicUsize::new(0));
        let scheduler = ConfigurationScheduler::builder("test-scheduler")
            .trap(CountingTrap(trapped.clone()))
            .build();
        scheduler.increment_scheduled_items();
        scheduler.start();

        let task = scheduler
            .schedule_with_fixed_delay(Duration::ZERO, Duration::from_millis(5), || {
                panic!("task failure");
            })
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || trapped
            .load(Ordering::SeqCst)
            >= 2));
        task.cancel();

        let ok = scheduler.schedule(Duration::ZERO, || {}).unwrap();
        assert!(wait_until(Duration::from_secs(5), || ok.is_done()));
        assert!(scheduler.stop(Duration::from_secs(5)));
    }

    #[test]
    fn test_stop_cancels_pending() {
        let scheduler = scheduler(1);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = scheduler
            .schedule(Duration::from_secs(60), move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(scheduler.stop(Duration::from_secs(5)));
        assert!(task.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), LifeCycleState::Stopped);
    }

    #[test]
    fn test_cancel_from_inside_task() {
        let scheduler = scheduler(1);
        let slot: Arc<Mutex<Option<ScheduledTask>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));
        let (s, c) = (slot.clone(), count.clone());
        let task = scheduler
            .schedule_with_fixed_delay(Duration::from_millis(20), Duration::from_millis(1), move || {
                c.fetch_add(1, Ordering::SeqCst);
                if let Some(task) = s.lock().unwrap().as_ref() {
                    task.cancel();
                }
            })
            .unwrap();
        *slot.lock().unwrap() = Some(task.clone());

        assert!(wait_until(Duration::from_secs(5), || task.is_cancelled()));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.stop(Duration::from_secs(5)));
    }
}
