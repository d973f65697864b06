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

//! Filters for log records.
//!
//! A [`Filter`] inspects an event and answers [`FilterResult::Accept`],
//! [`FilterResult::Deny`] or [`FilterResult::Neutral`]. Most filters evaluate a predicate and
//! map it onto their configured `on_match` / `on_mismatch` results, so the same predicate can
//! whitelist or blacklist depending on configuration.

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::Level;
use crate::LifeCycleState;
use crate::Marker;
use crate::Message;
use crate::Record;
use crate::lifecycle::LifeCycle;

pub use self::burst::BurstFilter;
pub use self::burst::BurstFilterBuilder;
pub use self::composite::CompositeFilter;
pub use self::context_map::ThreadContextMapFilter;
pub use self::context_map::ThreadContextMapFilterBuilder;
pub use self::custom::CustomFilter;
pub use self::dynamic_threshold::DynamicThresholdFilter;
pub use self::dynamic_threshold::DynamicThresholdFilterBuilder;
pub use self::filterable::Filterable;
pub use self::level_range::LevelRangeFilter;
pub use self::level_range::LevelRangeFilterBuilder;
pub use self::marker::MarkerFilter;
pub use self::marker::MarkerFilterBuilder;
pub use self::marker::NoMarkerFilter;
pub use self::mutable_context_map::LoadStatus;
pub use self::mutable_context_map::MutableThreadContextMapFilter;
pub use self::mutable_context_map::MutableThreadContextMapFilterBuilder;
pub use self::pairs::KeyValuePair;
pub use self::pairs::Operator;
pub use self::regex::RegexFilter;
pub use self::regex::RegexFilterBuilder;
pub use self::string_match::StringMatchFilter;
pub use self::string_match::StringMatchFilterBuilder;
pub use self::structured_data::StructuredDataFilter;
pub use self::structured_data::StructuredDataFilterBuilder;
pub use self::threshold::ThresholdFilter;
pub use self::threshold::ThresholdFilterBuilder;
pub use self::time::TimeFilter;
pub use self::time::TimeFilterBuilder;

mod burst;
mod composite;
mod context_map;
mod custom;
mod dynamic_threshold;
mod filterable;
mod level_range;
mod marker;
mod mutable_context_map;
mod pairs;
mod regex;
mod string_match;
mod structured_data;
mod threshold;
mod time;

/// The result of a filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterResult {
    /// The record will be processed without further filtering.
    Accept,
    /// The record should not be processed.
    Deny,
    /// No decision could be made, further filtering should occur.
    Neutral,
}

impl FilterResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterResult::Accept => "ACCEPT",
            FilterResult::Deny => "DENY",
            FilterResult::Neutral => "NEUTRAL",
        }
    }

    /// Accept and Deny end the evaluation of a filter chain.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FilterResult::Neutral)
    }
}

impl fmt::Display for FilterResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FilterResult {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for result in [
            FilterResult::Accept,
            FilterResult::Deny,
            FilterResult::Neutral,
        ] {
            if s.trim().eq_ignore_ascii_case(result.as_str()) {
                return Ok(result);
            }
        }
        Err(Error::new(format!("malformed filter result: {s:?}")))
    }
}

/// A filter decides whether a log event should be processed.
///
/// Filters are evaluated synchronously on the logging thread and never fail. Implementations
/// that keep state use interior mutability so that evaluation takes `&self`.
pub trait Filter: fmt::Debug + Send + Sync + 'static {
    /// Evaluate the filter against an event.
    fn filter(&self, record: &Record) -> FilterResult;

    /// Evaluate the filter against discrete event attributes.
    ///
    /// The attributes are assembled into a [`Record`] without a timestamp and bound to the
    /// calling thread's context, then passed to [`filter`](Self::filter); both shapes yield the
    /// same answer.
    fn filter_parts(
        &self,
        level: Level,
        marker: Option<&Marker>,
        message: Option<&Message>,
        throwable: Option<&(dyn std::error::Error + 'static)>,
    ) -> FilterResult {
        let mut builder = Record::builder().level(level);
        if let Some(marker) = marker {
            builder = builder.marker(marker);
        }
        if let Some(message) = message {
            builder = builder.message(message);
        }
        if let Some(throwable) = throwable {
            builder = builder.throwable(throwable);
        }
        self.filter(&builder.build())
    }

    /// The result returned when the predicate holds.
    fn on_match(&self) -> FilterResult {
        FilterResult::Neutral
    }

    /// The result returned when the predicate does not hold.
    fn on_mismatch(&self) -> FilterResult {
        FilterResult::Deny
    }

    fn start(&self) {}

    fn stop(&self) {}

    fn state(&self) -> LifeCycleState {
        LifeCycleState::Initialized
    }

    /// Returns self as [`Any`], for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Value equality with another filter.
    ///
    /// Filters compare by identity unless they override this; only filters whose behavior is
    /// fully described by their configuration do.
    fn equals(&self, _other: &dyn Filter) -> bool {
        false
    }
}

impl dyn Filter {
    /// Returns the composite if this filter is one.
    pub fn as_composite(&self) -> Option<&CompositeFilter> {
        self.as_any().downcast_ref::<CompositeFilter>()
    }

    /// Returns true if both refer to the same filter instance or are equal by value.
    pub fn same_as(&self, other: &dyn Filter) -> bool {
        std::ptr::addr_eq(self as *const dyn Filter, other as *const dyn Filter)
            || self.equals(other)
    }
}

/// The outcomes and lifecycle every built-in filter carries.
#[derive(Debug)]
pub(crate) struct FilterCommon {
    pub(crate) on_match: FilterResult,
    pub(crate) on_mismatch: FilterResult,
    lifecycle: LifeCycle,
}

impl FilterCommon {
    pub(crate) fn new(on_match: FilterResult, on_mismatch: FilterResult) -> Self {
        FilterCommon {
            on_match,
            on_mismatch,
            lifecycle: LifeCycle::default(),
        }
    }

    /// Maps a predicate onto the configured outcomes.
    pub(crate) fn decide(&self, matched: bool) -> FilterResult {
        if matched {
            self.on_match
        } else {
            self.on_mismatch
        }
    }

    pub(crate) fn start(&self) {
        self.lifecycle.set(LifeCycleState::Started);
    }

    pub(crate) fn stop(&self) {
        self.lifecycle.set(LifeCycleState::Stopped);
    }

    pub(crate) fn state(&self) -> LifeCycleState {
        self.lifecycle.state()
    }
}

impl Default for FilterCommon {
    fn default() -> Self {
        FilterCommon::new(FilterResult::Neutral, FilterResult::Deny)
    }
}

impl PartialEq for FilterCommon {
    fn eq(&self, other: &Self) -> bool {
        self.on_match == other.on_match && self.on_mismatch == other.on_mismatch
    }
}

impl Eq for FilterCommon {}

/// Downcasts `other` to `T` and compares by value.
pub(crate) fn equals_by_value<T: PartialEq + 'static>(this: &T, other: &dyn Filter) -> bool {
    other
        .as_any()
        .downcast_ref::<T>()
        .is_some_and(|other| this == other)
}
