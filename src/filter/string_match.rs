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

/// A filter that matches when the formatted message contains the configured text.
#[derive(Debug, PartialEq, Eq)]
pub struct StringMatchFilter {
    text: String,
    common: FilterCommon,
}

impl StringMatchFilter {
    pub fn builder() -> StringMatchFilterBuilder {
        StringMatchFilterBuilder::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Filter for StringMatchFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        match record.message() {
            Some(message) => self
                .common
                .decide(message.formatted().contains(self.text.as_str())),
            None => self.common.on_mismatch,
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

/// A builder for [`StringMatchFilter`].
#[derive(Debug)]
pub struct StringMatchFilterBuilder {
    text: String,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for StringMatchFilterBuilder {
    fn default() -> Self {
        StringMatchFilterBuilder {
            text: String::new(),
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl StringMatchFilterBuilder {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
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

    /// Build the filter. Returns `None` when no text is configured.
    pub fn build(self) -> Option<StringMatchFilter> {
        if self.text.is_empty() {
            log::error!("a text to match must be provided for StringMatchFilter");
            return None;
        }
        Some(StringMatchFilter {
            text: self.text,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use crate::Message;

    #[test]
    fn test_contains() {
        let filter = StringMatchFilter::builder()
            .text("timeout")
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        let hit = Message::parameterized("request {} hit a timeout", [7]);
        let miss = Message::text("request 7 succeeded");
        assert_eq!(
            filter.filter_parts(Level::Info, None, Some(&hit), None),
            FilterResult::Accept
        );
        assert_eq!(
            filter.filter_parts(Level::Info, None, Some(&miss), None),
            FilterResult::Deny
        );
        assert_eq!(
            filter.filter_parts(Level::Info, None, None, None),
            FilterResult::Deny
        );
    }

    #[test]
    fn test_empty_text_is_rejected() {
        assert!(StringMatchFilter::builder().build().is_none());
    }
}
