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
use crate::message::StructuredData;

/// A filter that compares fields of structured-data messages against configured values.
///
/// The keys `id`, `id.name`, `type` and `message` address the SD-ID, the SD-ID without its
/// enterprise number, the message type and the free text; any other key addresses a
/// parameter. Events without a structured-data message answer `NEUTRAL`.
#[derive(Debug, PartialEq, Eq)]
pub struct StructuredDataFilter {
    map: BTreeMap<String, Vec<String>>,
    operator: Operator,
    common: FilterCommon,
}

impl StructuredDataFilter {
    pub fn builder() -> StructuredDataFilterBuilder {
        StructuredDataFilterBuilder::default()
    }

    fn matches(&self, data: &StructuredData) -> bool {
        evaluate_map(&self.map, self.operator, |key, values| {
            let actual = match key {
                "id" => Some(data.id()),
                "id.name" => Some(data.id_name()),
                "type" => Some(data.kind()),
                "message" => Some(data.message()),
                key => data.get(key),
            };
            actual.is_some_and(|actual| values.iter().any(|v| v == actual))
        })
    }
}

impl Filter for StructuredDataFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        match record.message().and_then(|m| m.as_structured()) {
            Some(data) => self.common.decide(self.matches(data)),
            None => FilterResult::Neutral,
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

    fn equals(&self, other: &dyn Filter) -> bool {
        equals_by_value(self, other)
    }
}

/// A builder for [`StructuredDataFilter`].
#[derive(Debug)]
pub struct StructuredDataFilterBuilder {
    pairs: Vec<KeyValuePair>,
    operator: Operator,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for StructuredDataFilterBuilder {
    fn default() -> Self {
        StructuredDataFilterBuilder {
            pairs: vec![],
            operator: Operator::Or,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl StructuredDataFilterBuilder {
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
    pub fn build(self) -> Option<StructuredDataFilter> {
        let map = group_pairs("StructuredDataFilter", self.pairs)?;
        Some(StructuredDataFilter {
            map,
            operator: self.operator,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}
