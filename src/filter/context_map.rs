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

use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::KeyValuePair;
use crate::filter::Operator;
use crate::filter::equals_by_value;
use crate::filter::pairs::evaluate_map;
use crate::filter::pairs::group_pairs;

/// A filter that compares the event's context map against configured key-value pairs.
///
/// Each configured key matches when the context holds one of the values configured for that
/// key. With [`Operator::Or`] any matching key is enough; with [`Operator::And`] every key must
/// match.
#[derive(Debug, PartialEq, Eq)]
pub struct ThreadContextMapFilter {
    map: BTreeMap<String, Vec<String>>,
    operator: Operator,
    common: FilterCommon,
}

impl ThreadContextMapFilter {
    pub fn builder() -> ThreadContextMapFilterBuilder {
        ThreadContextMapFilterBuilder::default()
    }

    /// Build an OR filter directly from a grouped map. Used for hot-swapped rule sets.
    pub(crate) fn from_map(
        map: BTreeMap<String, Vec<String>>,
        on_match: FilterResult,
        on_mismatch: FilterResult,
    ) -> ThreadContextMapFilter {
        ThreadContextMapFilter {
            map,
            operator: Operator::Or,
            common: FilterCommon::new(on_match, on_mismatch),
        }
    }

    /// The configured values, grouped by key.
    pub fn map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.map
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub(crate) fn matches(&self, context: &BTreeMap<String, String>) -> bool {
        evaluate_map(&self.map, self.operator, |key, values| {
            context
                .get(key)
                .is_some_and(|actual| values.iter().any(|v| v == actual))
        })
    }
}

impl Filter for ThreadContextMapFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        let matched = record.context().with_map(|context| self.matches(context));
        self.common.decide(matched)
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

/// A builder for [`ThreadContextMapFilter`].
#[derive(Debug)]
pub struct ThreadContextMapFilterBuilder {
    pairs: Vec<KeyValuePair>,
    operator: Operator,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for ThreadContextMapFilterBuilder {
    fn default() -> Self {
        ThreadContextMapFilterBuilder {
            pairs: vec![],
            operator: Operator::Or,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl ThreadContextMapFilterBuilder {
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push(KeyValuePair::new(key, value));
        self
    }

    pub fn pairs(mut self, pairs: impl IntoIterator<Item = KeyValuePair>) -> Self {
        self.pairs.extend(pairs);
        self
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
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

    /// Build the filter. Returns `None` when no pairs are configured or a key is empty.
    pub fn build(self) -> Option<ThreadContextMapFilter> {
        let map = group_pairs("ThreadContextMapFilter", self.pairs)?;
        Some(ThreadContextMapFilter {
            map,
            operator: self.operator,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}
