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

/// A filter that matches events at least as severe as the configured level.
///
/// With the default level `ERROR`, `FATAL` and `ERROR` events match while `WARN` and more
/// verbose events mismatch.
#[derive(Debug, PartialEq, Eq)]
pub struct ThresholdFilter {
    level: Level,
    common: FilterCommon,
}

impl ThresholdFilter {
    pub fn builder() -> ThresholdFilterBuilder {
        ThresholdFilterBuilder::default()
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Filter for ThresholdFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        self.common
            .decide(record.level().is_at_least_as_severe_as(self.level))
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

/// A builder for [`ThresholdFilter`].
#[derive(Debug)]
pub struct ThresholdFilterBuilder {
    level: Level,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for ThresholdFilterBuilder {
    fn default() -> Self {
        ThresholdFilterBuilder {
            level: Level::Error,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl ThresholdFilterBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
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

    pub fn build(self) -> ThresholdFilter {
        ThresholdFilter {
            level: self.level,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_is_error() {
        let filter = ThresholdFilter::builder().build();
        assert_eq!(filter.level(), Level::Error);
        assert_eq!(
            filter.filter_parts(Level::Fatal, None, None, None),
            FilterResult::Neutral
        );
        assert_eq!(
            filter.filter_parts(Level::Error, None, None, None),
            FilterResult::Neutral
        );
        assert_eq!(
            filter.filter_parts(Level::Warn, None, None, None),
            FilterResult::Deny
        );
    }

    #[test]
    fn test_configured_outcomes() {
        let filter = ThresholdFilter::builder()
            .level(Level::Debug)
            .on_match(FilterResult::Accept)
            .on_mismatch(FilterResult::Neutral)
            .build();
        let record = Record::builder().level(Level::Info).build();
        assert_eq!(filter.filter(&record), FilterResult::Accept);
        let record = Record::builder().level(Level::Trace).build();
        assert_eq!(filter.filter(&record), FilterResult::Neutral);
    }

    #[test]
    fn test_value_equality() {
        let a = ThresholdFilter::builder().level(Level::Warn).build();
        let b = ThresholdFilter::builder().level(Level::Warn).build();
        let c = ThresholdFilter::builder().level(Level::Info).build();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }
}
