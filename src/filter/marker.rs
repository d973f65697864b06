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

use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::equals_by_value;

/// A filter that matches events whose marker is, or descends from, the named marker.
#[derive(Debug, PartialEq, Eq)]
pub struct MarkerFilter {
    name: String,
    common: FilterCommon,
}

impl MarkerFilter {
    pub fn builder() -> MarkerFilterBuilder {
        MarkerFilterBuilder::default()
    }

    pub fn marker_name(&self) -> &str {
        &self.name
    }
}

impl Filter for MarkerFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        let matched = record
            .marker()
            .is_some_and(|marker| marker.is_instance_of(&self.name));
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

/// A builder for [`MarkerFilter`].
#[derive(Debug)]
pub struct MarkerFilterBuilder {
    marker: Option<String>,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for MarkerFilterBuilder {
    fn default() -> Self {
        MarkerFilterBuilder {
            marker: None,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl MarkerFilterBuilder {
    pub fn marker(mut self, name: impl Into<String>) -> Self {
        self.marker = Some(name.into());
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

    /// Build the filter. Returns `None` when no marker name is configured.
    pub fn build(self) -> Option<MarkerFilter> {
        let Some(name) = self.marker.filter(|name| !name.is_empty()) else {
            log::error!("a marker name must be provided for MarkerFilter");
            return None;
        };
        Some(MarkerFilter {
            name,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}

/// A filter that matches events carrying no marker at all.
#[derive(Debug, PartialEq, Eq)]
pub struct NoMarkerFilter {
    common: FilterCommon,
}

impl Default for NoMarkerFilter {
    fn default() -> Self {
        NoMarkerFilter::new(FilterResult::Neutral, FilterResult::Deny)
    }
}

impl NoMarkerFilter {
    pub fn new(on_match: FilterResult, on_mismatch: FilterResult) -> NoMarkerFilter {
        NoMarkerFilter {
            common: FilterCommon::new(on_match, on_mismatch),
        }
    }
}

impl Filter for NoMarkerFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        self.common.decide(record.marker().is_none())
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
