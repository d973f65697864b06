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

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;

use crate::Error;
use crate::Trap;
use crate::error::panic_message;
use crate::scheduler::task::Repeat;
use crate::scheduler::task::TaskShared;
use crate::scheduler::task::mark_scheduler_thread;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub(crate) struct Job {
    due: Instant,
    seq: u64,
    task: Arc<TaskShared>,
}

impl Job {
    pub(crate) fn new(due: Instant, task: Arc<TaskShared>) -> Job {
        let seq = SEQUENCE.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Job { due, seq, task }
    }
}

// BinaryHeap is a max-heap; the earliest due job must compare greatest.
impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Job {}

pub(crate) enum Command {
    Schedule(Job),
    Shutdown,
}

/// A timer thread plus a fixed set of runner threads.
///
/// The timer keeps pending jobs ordered by due time and hands due jobs to the runners.
/// Runners put periodic jobs back on the timer after each run.
#[derive(Debug)]
pub(crate) struct Executor {
    commands: Sender<Command>,
    // disconnects once every spawned thread has exited
    done: Receiver<()>,
    threads: usize,
}

impl Executor {
    pub(crate) fn spawn(name: &str, threads: usize, trap: Arc<dyn Trap>) -> Result<Executor, Error> {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded(0);

        for i in 0..threads {
            let runner = Runner {
                scheduler: name.to_string(),
                jobs: jobs_rx.clone(),
                commands: commands_tx.clone(),
                trap: trap.clone(),
                _done: done_tx.clone(),
            };
            std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || runner.run())
                .map_err(|err| {
                    Error::new("failed to spawn scheduler thread")
                        .with_context("scheduler", name)
                        .with_source(err)
                })?;
        }

        let timer = Timer {
            commands: commands_rx,
            jobs: jobs_tx,
            pending: BinaryHeap::new(),
            _done: done_tx,
        };
        std::thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || timer.run())
            .map_err(|err| {
                Error::new("failed to spawn scheduler timer thread")
                    .with_context("scheduler", name)
                    .with_source(err)
            })?;

        Ok(Executor {
            commands: commands_tx,
            done: done_rx,
            threads,
        })
    }

    pub(crate) fn threads(&self) -> usize {
        self.threads
    }

    pub(crate) fn submit(&self, job: Job) -> Result<(), Error> {
        self.commands
            .send(Command::Schedule(job))
            .map_err(|_| Error::new("scheduler executor has shut down"))
    }

    /// Stop the timer and wait up to `timeout` for every thread to exit.
    pub(crate) fn shutdown(self, timeout: Duration) -> bool {
        let Executor {
            commands,
            done,
            threads: _,
        } = self;

        let _ = commands.send(Command::Shutdown);
        drop(commands);

        match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

struct Timer {
    commands: Receiver<Command>,
    jobs: Sender<Job>,
    pending: BinaryHeap<Job>,
    _done: Sender<()>,
}

impl Timer {
    fn run(mut self) {
        mark_scheduler_thread();
        loop {
            if !self.dispatch_due() {
                break;
            }

            let command = match self.pending.peek() {
                Some(job) => match self.commands.recv_deadline(job.due) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            match command {
                Command::Schedule(job) => self.pending.push(job),
                Command::Shutdown => break,
            }
        }
        log::trace!("scheduler timer exiting with {} pending jobs", self.pending.len());
    }

    /// Hand every due job to the runners. Returns false if the runners are gone.
    fn dispatch_due(&mut self) -> bool {
        let now = Instant::now();
        while self.pending.peek().is_some_and(|job| job.due <= now) {
            let Some(job) = self.pending.pop() else {
                break;
            };
            if job.task.is_cancelled() {
                continue;
            }
            if self.jobs.send(job).is_err() {
                return false;
            }
        }
        true
    }
}

struct Runner {
    scheduler: String,
    jobs: Receiver<Job>,
    commands: Sender<Command>,
    trap: Arc<dyn Trap>,
    _done: Sender<()>,
}

impl Runner {
    fn run(self) {
        mark_scheduler_thread();
        while let Ok(job) = self.jobs.recv() {
            let Job { due, task, .. } = job;

            let ran = task.run(|action| {
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| action())) {
                    let err = Error::new("scheduled task panicked")
                        .with_context("scheduler", &self.scheduler)
                        .with_context("task", task.id)
                        .with_context("panic", panic_message(payload.as_ref()));
                    self.trap.trap(&err);
                }
            });
            if !ran {
                continue;
            }

            let next = match task.repeat {
                Repeat::Once => {
                    task.mark_done();
                    None
                }
                Repeat::FixedDelay(delay) => Some(Instant::now() + delay),
                Repeat::FixedRate(period) => Some(due + period),
            };
            if let Some(next) = next {
                if task.is_cancelled() {
                    continue;
                }
                // fails only after shutdown, when the task is already cancelled
                let _ = self.commands.send(Command::Schedule(Job::new(next, task)));
            }
        }
    }
}
