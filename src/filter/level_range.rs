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

use crate::Level;
use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::equals_by_value;

/// A filter that matches events whose level lies between `min_level` and `max_level`,
/// inclusive, in the `OFF < FATAL < ERROR < WARN < INFO < DEBUG < TRACE < ALL` order.
///
/// The defaults (`OFF` to `ALL`) match every level.
#[derive(Debug, PartialEq, Eq)]
pub struct LevelRangeFilter {
    min_level: Level,
    max_level: Level,
    common: FilterCommon,
}

impl LevelRangeFilter {
    pub fn builder() -> LevelRangeFilterBuilder {
        LevelRangeFilterBuilder::default()
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn max_level(&self) -> Level {
        self.max_level
    }
}

impl Filter for LevelRangeFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        self.common
            .decide(record.level().is_in_range(self.min_level, self.max_level))
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

    fn equals(&self, other: &dyn Filter) -> bool {
        equals_by_value(self, other)
    }
}

/// A builder for [`LevelRangeFilter`].
#[derive(Debug)]
pub struct LevelRangeFilterBuilder {
    min_level: Level,
    max_level: Level,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for LevelRangeFilterBuilder {
    fn default() -> Self {
        LevelRangeFilterBuilder {
            min_level: Level::Off,
            max_level: Level::All,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl LevelRangeFilterBuilder {
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn max_level(mut self, level: Level) -> Self {
        self.max_level = level;
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

    pub fn build(self) -> LevelRangeFilter {
        LevelRangeFilter {
            min_level: self.min_level,
            max_level: self.max_level,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        }
    }
}
