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
use std::collections::BTreeMap;

use crate::Level;
use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::equals_by_value;

/// A threshold filter whose level is chosen by a context value.
///
/// When the event's context holds `key`, the level configured for that value (or the default
/// threshold, for unknown values) decides: events at least as severe match. Events whose
/// context lacks `key` answer `NEUTRAL`.
///
/// ```
/// use std::collections::BTreeMap;
///
/// use logsift::Filter;
/// use logsift::FilterResult;
/// use logsift::Level;
/// use logsift::Record;
/// use logsift::filter::DynamicThresholdFilter;
///
/// let filter = DynamicThresholdFilter::builder()
///     .key("user")
///     .pair("alice", Level::Debug)
///     .on_match(FilterResult::Accept)
///     .build()
///     .unwrap();
///
/// let context = BTreeMap::from([("user".to_string(), "alice".to_string())]);
/// let record = Record::builder().level(Level::Debug).context(&context).build();
/// assert_eq!(filter.filter(&record), FilterResult::Accept);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct DynamicThresholdFilter {
    key: String,
    default_threshold: Level,
    levels: BTreeMap<String, Level>,
    common: FilterCommon,
}

impl DynamicThresholdFilter {
    pub fn builder() -> DynamicThresholdFilterBuilder {
        DynamicThresholdFilterBuilder::default()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_threshold(&self) -> Level {
        self.default_threshold
    }

    pub fn levels(&self) -> &BTreeMap<String, Level> {
        &self.levels
    }
}

impl Filter for DynamicThresholdFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        let Some(value) = record.context().get(&self.key) else {
            return FilterResult::Neutral;
        };
        let threshold = self
            .levels
            .get(&value)
            .copied()
            .unwrap_or(self.default_threshold);
        self.common
            .decide(record.level().is_at_least_as_severe_as(threshold))
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

/// A builder for [`DynamicThresholdFilter`].
#[derive(Debug)]
pub struct DynamicThresholdFilterBuilder {
    key: Option<String>,
    default_threshold: Level,
    levels: BTreeMap<String, Level>,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for DynamicThresholdFilterBuilder {
    fn default() -> Self {
        DynamicThresholdFilterBuilder {
            key: None,
            default_threshold: Level::Error,
            levels: BTreeMap::new(),
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl DynamicThresholdFilterBuilder {
    /// The context key whose value selects the threshold.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The threshold for context values without a configured level.
    pub fn default_threshold(mut self, level: Level) -> Self {
        self.default_threshold = level;
        self
    }

    /// Map a context value to a threshold.
    pub fn pair(mut self, value: impl Into<String>, level: Level) -> Self {
        self.levels.insert(value.into(), level);
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

    /// Build the filter. Returns `None` when no key is configured.
    pub fn build(self) -> Option<DynamicThresholdFilter> {
        let Some(key) = self.key.filter(|key| !key.is_empty()) else {
            log::error!("a context key must be provided for DynamicThresholdFilter");
            return None;
        };
        Some(DynamicThresholdFilter {
            key,
            default_threshold: self.default_threshold,
            levels: self.levels,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}
