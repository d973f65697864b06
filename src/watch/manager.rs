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

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arc_swap::ArcSwap;
use jiff::Timestamp;

use crate::ConfigurationScheduler;
use crate::Error;
use crate::LifeCycleState;
use crate::Trap;
use crate::error::panic_message;
use crate::lifecycle::LifeCycle;
use crate::scheduler::ScheduledTask;
use crate::trap::DefaultTrap;
use crate::watch::Source;
use crate::watch::Watcher;

thread_local! {
    // addresses of the monitors whose gate the current thread holds
    static HELD_GATES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Polls registered watchers and notifies their listeners when a source changes.
///
/// The manager is a cheap handle; clones share the same registry.
#[derive(Clone)]
pub struct WatchManager {
    inner: Arc<Inner>,
}

struct Inner {
    scheduler: Arc<ConfigurationScheduler>,
    trap: Box<dyn Trap>,
    lifecycle: LifeCycle,
    settings: Mutex<Settings>,
    monitors: ArcSwap<HashMap<Source, Arc<Monitor>>>,
}

#[derive(Debug, Default)]
struct Settings {
    interval_seconds: u64,
    task: Option<ScheduledTask>,
}

struct Monitor {
    watcher: Arc<dyn Watcher>,
    // cleared on unwatch; checked under `gate`
    active: AtomicBool,
    gate: Mutex<()>,
    last_modified: Mutex<Option<Timestamp>>,
}

impl fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchManager")
            .field("interval_seconds", &self.interval_seconds())
            .field("state", &self.state())
            .field("watchers", &self.inner.monitors.load().len())
            .field("scheduler", &self.inner.scheduler.name())
            .finish()
    }
}

impl WatchManager {
    pub fn new(scheduler: Arc<ConfigurationScheduler>) -> WatchManager {
        WatchManagerBuilder::new(scheduler).build()
    }

    pub fn builder(scheduler: Arc<ConfigurationScheduler>) -> WatchManagerBuilder {
        WatchManagerBuilder::new(scheduler)
    }

    pub fn state(&self) -> LifeCycleState {
        self.inner.lifecycle.state()
    }

    pub fn is_started(&self) -> bool {
        self.inner.lifecycle.is_started()
    }

    pub fn interval_seconds(&self) -> u64 {
        self.inner.lock_settings().interval_seconds
    }

    /// Set the polling interval. Zero disables polling.
    ///
    /// Has no effect once started. Moving between zero and a positive interval announces or
    /// withdraws a scheduled item on the scheduler.
    pub fn set_interval_seconds(&self, interval_seconds: u64) {
        if self.is_started() {
            log::warn!("ignoring interval change on a started watch manager");
            return;
        }
        let mut settings = self.inner.lock_settings();
        if settings.interval_seconds > 0 && interval_seconds == 0 {
            self.inner.scheduler.decrement_scheduled_items();
        } else if settings.interval_seconds == 0 && interval_seconds > 0 {
            self.inner.scheduler.increment_scheduled_items();
        }
        settings.interval_seconds = interval_seconds;
    }

    /// Start polling, if an interval is set.
    ///
    /// Does nothing unless the manager is initialized or stopped. If the polling task cannot
    /// be scheduled, the failure is trapped and the manager keeps its previous state.
    pub fn start(&self) {
        let lifecycle = &self.inner.lifecycle;
        let previous = [LifeCycleState::Initialized, LifeCycleState::Stopped]
            .into_iter()
            .find(|&from| lifecycle.transition(from, LifeCycleState::Starting));
        let Some(previous) = previous else {
            log::debug!("watch manager is already {:?}", lifecycle.state());
            return;
        };

        let mut settings = self.inner.lock_settings();
        if settings.interval_seconds > 0 && settings.task.is_none() {
            let interval = Duration::from_secs(settings.interval_seconds);
            let inner = Arc::downgrade(&self.inner);
            let scheduled = self.inner.scheduler.schedule_with_fixed_delay(
                interval,
                interval,
                move || tick(&inner),
            );
            match scheduled {
                Ok(task) => settings.task = Some(task),
                Err(err) => {
                    drop(settings);
                    lifecycle.set(previous);
                    self.inner
                        .trap
                        .trap(&Error::new("failed to schedule the watch task").with_source(err));
                    return;
                }
            }
        }
        drop(settings);
        lifecycle.set(LifeCycleState::Started);
    }

    /// Stop polling and deregister every source.
    ///
    /// Waits for an in-flight tick to finish, unless called from a scheduler thread.
    pub fn stop(&self) {
        self.inner.lifecycle.set(LifeCycleState::Stopping);
        let task = self.inner.lock_settings().task.take();
        if let Some(task) = task {
            task.cancel();
        }
        let monitors = self.inner.monitors.swap(Arc::new(HashMap::new()));
        for monitor in monitors.values() {
            monitor.deactivate();
        }
        self.inner.lifecycle.set(LifeCycleState::Stopped);
    }

    /// Register `watcher` for `source`, replacing any watcher registered for it.
    ///
    /// The watcher's baseline is captured before this returns, so only later changes are
    /// reported.
    pub fn watch(&self, source: Source, watcher: Arc<dyn Watcher>) -> Result<(), Error> {
        watcher
            .watching(&source)
            .map_err(|err| err.with_context("source", &source))?;
        let last_modified = watcher.last_modified();
        log::debug!(
            "watching configuration '{source}' for last modified {}",
            display_time(last_modified)
        );

        let monitor = Arc::new(Monitor {
            watcher,
            active: AtomicBool::new(true),
            gate: Mutex::new(()),
            last_modified: Mutex::new(last_modified),
        });
        let previous = self.inner.monitors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(source.clone(), monitor.clone());
            next
        });
        if let Some(replaced) = previous.get(&source) {
            replaced.deactivate();
        }
        Ok(())
    }

    /// Deregister `source`. Returns false if it was not registered.
    ///
    /// Once this returns, the removed watcher's listeners no longer fire. Called from inside a
    /// listener, the running notification completes first.
    pub fn unwatch(&self, source: &Source) -> bool {
        log::debug!("unwatching configuration '{source}'");
        let previous = self.inner.monitors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(source);
            next
        });
        match previous.get(source) {
            Some(monitor) => {
                monitor.deactivate();
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, source: &Source) -> bool {
        self.inner.monitors.load().contains_key(source)
    }

    /// A snapshot of the registered watchers.
    pub fn watchers(&self) -> HashMap<Source, Arc<dyn Watcher>> {
        self.inner
            .monitors
            .load()
            .iter()
            .map(|(source, monitor)| (source.clone(), monitor.watcher.clone()))
            .collect()
    }

    /// Run one polling pass on the calling thread.
    pub fn check_files(&self) {
        self.inner.tick();
    }

    /// Re-baseline every watcher without notifying listeners.
    pub fn reset(&self) {
        log::debug!("resetting {self:?}");
        let monitors = self.inner.monitors.load_full();
        for (source, monitor) in monitors.iter() {
            self.inner.reset_monitor(source, monitor);
        }
    }

    /// Re-baseline the watcher of `source` without notifying listeners.
    pub fn reset_source(&self, source: &Source) {
        if let Some(monitor) = self.inner.monitors.load().get(source) {
            self.inner.reset_monitor(source, monitor);
        }
    }
}

impl Inner {
    fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick(&self) {
        log::trace!("watch run triggered");
        let monitors = self.monitors.load_full();
        for (source, monitor) in monitors.iter() {
            let _held = monitor.enter();
            if !monitor.active.load(Ordering::Acquire) {
                continue;
            }
            self.check(source, monitor);
        }
        log::trace!("watch run ended");
    }

    fn check(&self, source: &Source, monitor: &Monitor) {
        let checked = catch_unwind(AssertUnwindSafe(|| monitor.watcher.check_and_reset()));
        match checked {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return,
            Ok(Err(err)) => {
                self.trap.trap(&err.with_context("source", source));
                return;
            }
            Err(payload) => {
                self.trap.trap(
                    &Error::new("watcher panicked while checking for changes")
                        .with_context("source", source)
                        .with_context("panic", panic_message(payload.as_ref())),
                );
                return;
            }
        }

        let last_modified = monitor.watcher.last_modified();
        let previous = monitor.replace_last_modified(last_modified);
        log::info!(
            "source '{source}' was modified on {}, previous modification was on {}",
            display_time(last_modified),
            display_time(previous)
        );

        let notified = catch_unwind(AssertUnwindSafe(|| monitor.watcher.modified(source)));
        if let Err(payload) = notified {
            self.trap.trap(
                &Error::new("watch listener panicked")
                    .with_context("source", source)
                    .with_context("panic", panic_message(payload.as_ref())),
            );
        }
    }

    fn reset_monitor(&self, source: &Source, monitor: &Monitor) {
        let _held = monitor.enter();
        match monitor.watcher.check_and_reset() {
            Ok(true) => {
                let last_modified = monitor.watcher.last_modified();
                let previous = monitor.replace_last_modified(last_modified);
                log::debug!(
                    "resetting monitor for '{source}' from {} to {}",
                    display_time(previous),
                    display_time(last_modified)
                );
            }
            Ok(false) => {}
            Err(err) => self.trap.trap(&err.with_context("source", source)),
        }
    }
}

impl Monitor {
    fn key(&self) -> usize {
        self as *const Monitor as usize
    }

    fn held_by_current_thread(&self) -> bool {
        let key = self.key();
        HELD_GATES.with(|held| held.borrow().contains(&key))
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the gate, unless the current thread already holds it further up the stack.
    fn enter(&self) -> Option<HeldGate<'_>> {
        if self.held_by_current_thread() {
            return None;
        }
        let gate = self.lock_gate();
        HELD_GATES.with(|held| held.borrow_mut().push(self.key()));
        Some(HeldGate {
            monitor: self,
            _gate: gate,
        })
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        if !self.held_by_current_thread() {
            drop(self.lock_gate());
        }
    }

    fn replace_last_modified(&self, last_modified: Option<Timestamp>) -> Option<Timestamp> {
        let mut guard = self.last_modified.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, last_modified)
    }
}

struct HeldGate<'a> {
    monitor: &'a Monitor,
    _gate: MutexGuard<'a, ()>,
}

impl Drop for HeldGate<'_> {
    fn drop(&mut self) {
        let key = self.monitor.key();
        HELD_GATES.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|k| *k == key) {
                held.swap_remove(pos);
            }
        });
    }
}

fn tick(inner: &Weak<Inner>) {
    if let Some(inner) = inner.upgrade() {
        inner.tick();
    }
}

fn display_time(time: Option<Timestamp>) -> String {
    match time {
        Some(time) => time.to_string(),
        None => "never".to_string(),
    }
}

/// A builder for [`WatchManager`].
#[derive(Debug)]
pub struct WatchManagerBuilder {
    scheduler: Arc<ConfigurationScheduler>,
    trap: Box<dyn Trap>,
}

impl WatchManagerBuilder {
    pub fn new(scheduler: Arc<ConfigurationScheduler>) -> WatchManagerBuilder {
        WatchManagerBuilder {
            scheduler,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set the trap that receives watcher failures. Default to [`DefaultTrap`].
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    pub fn build(self) -> WatchManager {
        WatchManager {
            inner: Arc::new(Inner {
                scheduler: self.scheduler,
                trap: self.trap,
                lifecycle: LifeCycle::default(),
                settings: Mutex::default(),
                monitors: ArcSwap::from_pointee(HashMap::new()),
            }),
        }
    }
}
