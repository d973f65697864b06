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

//! Declarative filter configuration.
//!
//! Filters can be described in JSON and built through the same builders used in code:
//!
//! ```
//! use logsift::config::BuildContext;
//! use logsift::config::FilterConfig;
//!
//! let config = FilterConfig::from_json(
//!     r#"{
//!         "type": "Filters",
//!         "filters": [
//!             {"type": "ThresholdFilter", "level": "WARN"},
//!             {"type": "StringMatchFilter", "text": "disk", "onMatch": "ACCEPT"}
//!         ]
//!     }"#,
//! )?;
//! let filter = config.build(&BuildContext::default()).unwrap();
//! assert_eq!(filter.as_composite().unwrap().len(), 2);
//! # Ok::<(), logsift::Error>(())
//! ```

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Deserializer;

use crate::Clock;
use crate::CompositeFilter;
use crate::ConfigurationScheduler;
use crate::Error;
use crate::Filter;
use crate::FilterResult;
use crate::Level;
use crate::filter::BurstFilter;
use crate::filter::DynamicThresholdFilter;
use crate::filter::KeyValuePair;
use crate::filter::LevelRangeFilter;
use crate::filter::MarkerFilter;
use crate::filter::MutableThreadContextMapFilter;
use crate::filter::NoMarkerFilter;
use crate::filter::Operator;
use crate::filter::RegexFilter;
use crate::filter::StringMatchFilter;
use crate::filter::StructuredDataFilter;
use crate::filter::ThreadContextMapFilter;
use crate::filter::ThresholdFilter;
use crate::filter::TimeFilter;

/// A filter declaration, tagged by its `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum FilterConfig {
    ThresholdFilter(ThresholdConfig),
    LevelRangeFilter(LevelRangeConfig),
    RegexFilter(RegexConfig),
    StringMatchFilter(StringMatchConfig),
    MarkerFilter(MarkerConfig),
    NoMarkerFilter(NoMarkerConfig),
    TimeFilter(TimeConfig),
    BurstFilter(BurstConfig),
    StructuredDataFilter(MapConfig),
    ThreadContextMapFilter(MapConfig),
    DynamicThresholdFilter(DynamicThresholdConfig),
    MutableThreadContextMapFilter(MutableThreadContextMapConfig),
    /// An explicit composite.
    Filters(FiltersConfig),
}

/// The `onMatch` and `onMismatch` attributes shared by every filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcomes {
    #[serde(default = "default_on_match")]
    pub on_match: FilterResult,
    #[serde(default = "default_on_mismatch")]
    pub on_mismatch: FilterResult,
}

impl Default for Outcomes {
    fn default() -> Self {
        Outcomes {
            on_match: default_on_match(),
            on_mismatch: default_on_mismatch(),
        }
    }
}

fn default_on_match() -> FilterResult {
    FilterResult::Neutral
}

fn default_on_mismatch() -> FilterResult {
    FilterResult::Deny
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub level: Option<Level>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRangeConfig {
    pub min_level: Option<Level>,
    pub max_level: Option<Level>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexConfig {
    pub regex: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub use_raw_msg: bool,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringMatchConfig {
    pub text: Option<String>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerConfig {
    pub marker: Option<String>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoMarkerConfig {
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    pub timezone: Option<String>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurstConfig {
    pub level: Option<Level>,
    pub rate: Option<f64>,
    pub max_burst: Option<u64>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

/// Attributes of the filters that compare key-value pairs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    #[serde(default)]
    pub pairs: Vec<KeyValuePair>,
    #[serde(default)]
    pub operator: Operator,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicThresholdConfig {
    pub key: Option<String>,
    pub default_threshold: Option<Level>,
    /// Context values mapped to level names.
    #[serde(default)]
    pub pairs: Vec<KeyValuePair>,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutableThreadContextMapConfig {
    pub config_location: Option<String>,
    #[serde(default)]
    pub poll_interval: u64,
    #[serde(flatten)]
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Services available to filters built from configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    scheduler: Option<Arc<ConfigurationScheduler>>,
    clock: Clock,
}

impl BuildContext {
    pub fn new() -> BuildContext {
        BuildContext::default()
    }

    /// The scheduler that runs polling reloads.
    pub fn with_scheduler(mut self, scheduler: Arc<ConfigurationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// The clock given to time-aware filters.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl FilterConfig {
    pub fn from_json(json: &str) -> Result<FilterConfig, Error> {
        serde_json::from_str(json).map_err(Error::from_json_error)
    }

    /// Build the declared filter.
    ///
    /// Returns `None` when the declaration is illegal; the reason is logged at error level.
    /// Members of `Filters` that fail to build are left out.
    pub fn build(&self, context: &BuildContext) -> Option<Arc<dyn Filter>> {
        let filter: Arc<dyn Filter> = match self {
            FilterConfig::ThresholdFilter(c) => {
                let mut builder = ThresholdFilter::builder();
                if let Some(level) = c.level {
                    builder = builder.level(level);
                }
                Arc::new(
                    builder
                        .on_match(c.outcomes.on_match)
                        .on_mismatch(c.outcomes.on_mismatch)
                        .build(),
                )
            }
            FilterConfig::LevelRangeFilter(c) => {
                let mut builder = LevelRangeFilter::builder();
                if let Some(level) = c.min_level {
                    builder = builder.min_level(level);
                }
                if let Some(level) = c.max_level {
                    builder = builder.max_level(level);
                }
                Arc::new(
                    builder
                        .on_match(c.outcomes.on_match)
                        .on_mismatch(c.outcomes.on_mismatch)
                        .build(),
                )
            }
            FilterConfig::RegexFilter(c) => {
                let mut builder = RegexFilter::builder()
                    .flags(c.flags.iter().cloned())
                    .use_raw_msg(c.use_raw_msg)
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(regex) = c.regex.as_deref() {
                    builder = builder.regex(regex);
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::StringMatchFilter(c) => {
                let mut builder = StringMatchFilter::builder()
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(text) = c.text.as_deref() {
                    builder = builder.text(text);
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::MarkerFilter(c) => {
                let mut builder = MarkerFilter::builder()
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(marker) = c.marker.as_deref() {
                    builder = builder.marker(marker);
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::NoMarkerFilter(c) => Arc::new(NoMarkerFilter::new(
                c.outcomes.on_match,
                c.outcomes.on_mismatch,
            )),
            FilterConfig::TimeFilter(c) => {
                let mut builder = TimeFilter::builder()
                    .clock(context.clock.clone())
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(start) = c.start.as_deref() {
                    builder = builder.start(start);
                }
                if let Some(end) = c.end.as_deref() {
                    builder = builder.end(end);
                }
                if let Some(timezone) = c.timezone.as_deref() {
                    builder = builder.timezone(timezone);
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::BurstFilter(c) => {
                let mut builder = BurstFilter::builder()
                    .clock(context.clock.clone())
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(level) = c.level {
                    builder = builder.level(level);
                }
                if let Some(rate) = c.rate {
                    builder = builder.rate(rate);
                }
                if let Some(max_burst) = c.max_burst {
                    builder = builder.max_burst(max_burst);
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::StructuredDataFilter(c) => Arc::new(
                StructuredDataFilter::builder()
                    .pairs(c.pairs.iter().cloned())
                    .operator(c.operator)
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch)
                    .build()?,
            ),
            FilterConfig::ThreadContextMapFilter(c) => Arc::new(
                ThreadContextMapFilter::builder()
                    .pairs(c.pairs.iter().cloned())
                    .operator(c.operator)
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch)
                    .build()?,
            ),
            FilterConfig::DynamicThresholdFilter(c) => {
                let mut builder = DynamicThresholdFilter::builder()
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(key) = c.key.as_deref() {
                    builder = builder.key(key);
                }
                if let Some(level) = c.default_threshold {
                    builder = builder.default_threshold(level);
                }
                for pair in c.pairs.iter() {
                    match Level::from_str(&pair.value) {
                        Ok(level) => builder = builder.pair(pair.key.as_str(), level),
                        Err(err) => {
                            log::error!("invalid level for DynamicThresholdFilter: {err}");
                            return None;
                        }
                    }
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::MutableThreadContextMapFilter(c) => {
                let mut builder = MutableThreadContextMapFilter::builder()
                    .poll_interval(c.poll_interval)
                    .on_match(c.outcomes.on_match)
                    .on_mismatch(c.outcomes.on_mismatch);
                if let Some(location) = c.config_location.as_deref() {
                    builder = builder.config_location(location);
                }
                if let Some(scheduler) = context.scheduler.as_ref() {
                    builder = builder.scheduler(scheduler.clone());
                }
                Arc::new(builder.build()?)
            }
            FilterConfig::Filters(c) => {
                let filters = c.filters.iter().filter_map(|member| member.build(context));
                Arc::new(CompositeFilter::new(filters))
            }
        };
        Some(filter)
    }
}

fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = Error>,
{
    let s = String::deserialize(deserializer)?;
    T::from_str(&s).map_err(|err| serde::de::Error::custom(err.message()))
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}

impl<'de> Deserialize<'de> for FilterResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}
