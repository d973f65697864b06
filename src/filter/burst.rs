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

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Mutex;

use jiff::SignedDuration;
use jiff::Timestamp;

use crate::Clock;
use crate::Level;
use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;

/// A filter that limits the rate of events at or below a severity.
///
/// Events at the configured level or more verbose each take a slot from a pool of `max_burst`
/// slots; a taken slot returns to the pool `max_burst / rate` seconds later. An event that
/// finds the pool empty gets `on_mismatch`. Events more severe than the level are never
/// limited and always get `on_match`.
///
/// With the defaults (level `WARN`, rate 10, max burst 1000) a quiet application may emit a
/// burst of 1000 warnings, after which each slot needs 100 seconds to come back.
#[derive(Debug)]
pub struct BurstFilter {
    level: Level,
    max_burst: usize,
    interval: SignedDuration,
    clock: Clock,
    // expiry instants of the taken slots, in ascending order
    taken: Mutex<VecDeque<Timestamp>>,
    common: FilterCommon,
}

impl BurstFilter {
    pub fn builder() -> BurstFilterBuilder {
        BurstFilterBuilder::default()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn max_burst(&self) -> usize {
        self.max_burst
    }

    /// The time a taken slot needs to return to the pool.
    pub fn interval(&self) -> SignedDuration {
        self.interval
    }

    /// The number of slots currently available.
    pub fn available(&self) -> usize {
        let now = self.clock.now();
        let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());
        release_expired(&mut taken, now);
        self.max_burst - taken.len()
    }

    /// Return every slot to the pool.
    pub fn clear(&self) {
        let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());
        taken.clear();
    }

    fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());
        release_expired(&mut taken, now);
        if taken.len() >= self.max_burst {
            return false;
        }
        let expiry = now.checked_add(self.interval).unwrap_or(Timestamp::MAX);
        let pos = taken.partition_point(|t| *t <= expiry);
        taken.insert(pos, expiry);
        true
    }
}

fn release_expired(taken: &mut VecDeque<Timestamp>, now: Timestamp) {
    while taken.front().is_some_and(|expiry| *expiry <= now) {
        taken.pop_front();
    }
}

impl Filter for BurstFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        if self.level.is_at_least_as_severe_as(record.level()) {
            self.common.decide(self.try_acquire())
        } else {
            self.common.on_match
        }
    }

    fn on_match(&self) -> FilterResult {
        self.common.on_match
    }

    fn on_mismatch(&self) -> FilterResult {
        self.common.on_mismatch
    }

    fn start(&self) {
        self.common.start();
    }

    fn stop(&self) {
        self.common.stop();
    }

    fn state(&self) -> LifeCycleState {
        self.common.state()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A builder for [`BurstFilter`].
#[derive(Debug)]
pub struct BurstFilterBuilder {
    level: Level,
    rate: f64,
    max_burst: Option<u64>,
    clock: Clock,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for BurstFilterBuilder {
    fn default() -> Self {
        BurstFilterBuilder {
            level: Level::Warn,
            rate: 10.0,
            max_burst: None,
            clock: Clock::System,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl BurstFilterBuilder {
    /// Events at this level or more verbose are limited.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// The average number of events per second allowed once the burst is spent.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// The number of events allowed in a burst. Defaults to 100 times the rate.
    pub fn max_burst(mut self, max_burst: u64) -> Self {
        self.max_burst = Some(max_burst);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn on_match(mut self, result: FilterResult) -> Self {
        self.on_match = result;
        self
    }

    pub fn on_mismatch(mut self, result: FilterResult) -> Self {
        self.on_mismatch = result;
        self
    }

    /// Build the filter. Returns `None` when the rate is not a positive number.
    pub fn build(self) -> Option<BurstFilter> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            log::error!("rate must be positive for BurstFilter, got {}", self.rate);
            return None;
        }
        let max_burst = self.max_burst.unwrap_or((self.rate * 100.0) as u64);
        let interval = match SignedDuration::try_from_secs_f64(max_burst as f64 / self.rate) {
            Ok(interval) => interval,
            Err(err) => {
                log::error!("cannot derive the slot interval for BurstFilter: {err}");
                return None;
            }
        };

        Some(BurstFilter {
            level: self.level,
            max_burst: max_burst as usize,
            interval,
            clock: self.clock,
            taken: Mutex::new(VecDeque::new()),
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}
