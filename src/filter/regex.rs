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

use regex::Regex;
use regex::RegexBuilder;

use crate::LifeCycleState;
use crate::Message;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::equals_by_value;

/// A filter that matches when the whole message matches a regular expression.
///
/// The formatted message is tested unless `use_raw_msg` is set, in which case the format string
/// of parameterized and structured messages is tested instead. Events without a message
/// mismatch.
#[derive(Debug)]
pub struct RegexFilter {
    pattern: String,
    regex: Regex,
    use_raw_msg: bool,
    common: FilterCommon,
}

impl PartialEq for RegexFilter {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
            && self.use_raw_msg == other.use_raw_msg
            && self.common == other.common
    }
}

impl RegexFilter {
    pub fn builder() -> RegexFilterBuilder {
        RegexFilterBuilder::default()
    }

    /// The expression as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn use_raw_msg(&self) -> bool {
        self.use_raw_msg
    }

    fn target_text(&self, message: &Message) -> String {
        if self.use_raw_msg && message.has_raw_format() {
            message.format().to_string()
        } else {
            message.formatted()
        }
    }
}

impl Filter for RegexFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        match record.message() {
            Some(message) => {
                let text = self.target_text(message);
                self.common.decide(self.regex.is_match(&text))
            }
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

/// A builder for [`RegexFilter`].
///
/// Recognized flags are `CASE_INSENSITIVE`, `MULTILINE`, `DOTALL`, `COMMENTS`, `LITERAL`,
/// `UNICODE_CASE`, `UNICODE_CHARACTER_CLASS` and `UNIX_LINES`. Matching is always
/// Unicode-aware, so the last three are accepted without effect. Other flags are ignored with
/// a warning.
#[derive(Debug)]
pub struct RegexFilterBuilder {
    regex: Option<String>,
    flags: Vec<String>,
    use_raw_msg: bool,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for RegexFilterBuilder {
    fn default() -> Self {
        RegexFilterBuilder {
            regex: None,
            flags: vec![],
            use_raw_msg: false,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl RegexFilterBuilder {
    pub fn regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn use_raw_msg(mut self, use_raw_msg: bool) -> Self {
        self.use_raw_msg = use_raw_msg;
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

    /// Build the filter. Returns `None` when the expression is missing, empty or invalid.
    pub fn build(self) -> Option<RegexFilter> {
        let Some(pattern) = self.regex.filter(|r| !r.is_empty()) else {
            log::error!("a regular expression must be provided for RegexFilter");
            return None;
        };

        let mut literal = false;
        let mut case_insensitive = false;
        let mut multi_line = false;
        let mut dot_matches_new_line = false;
        let mut ignore_whitespace = false;
        for flag in self.flags.iter() {
            match flag.trim().to_ascii_uppercase().as_str() {
                "CASE_INSENSITIVE" => case_insensitive = true,
                "MULTILINE" => multi_line = true,
                "DOTALL" => dot_matches_new_line = true,
                "COMMENTS" => ignore_whitespace = true,
                "LITERAL" => literal = true,
                "UNICODE_CASE" | "UNICODE_CHARACTER_CLASS" | "UNIX_LINES" => {}
                "" => {}
                other => log::warn!("ignoring unsupported regex flag {other:?}"),
            }
        }

        let body = if literal {
            regex::escape(&pattern)
        } else {
            pattern.clone()
        };
        // a trailing `#` comment would otherwise swallow the closing group
        let anchored = if ignore_whitespace {
            format!("^(?:{body}\n)$")
        } else {
            format!("^(?:{body})$")
        };
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(case_insensitive)
            .multi_line(multi_line)
            .dot_matches_new_line(dot_matches_new_line)
            .ignore_whitespace(ignore_whitespace)
            .build();
        let regex = match regex {
            Ok(regex) => regex,
            Err(err) => {
                log::error!("invalid regular expression {pattern:?} for RegexFilter: {err}");
                return None;
            }
        };

        Some(RegexFilter {
            pattern,
            regex,
            use_raw_msg: self.use_raw_msg,
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use crate::message::StructuredData;

    fn check(filter: &RegexFilter, message: &Message) -> FilterResult {
        filter.filter_parts(Level::Error, None, Some(message), None)
    }

    #[test]
    fn test_whole_message_match() {
        let filter = RegexFilter::builder()
            .regex("[a-z]+")
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(check(&filter, &Message::text("hello")), FilterResult::Accept);
        assert_eq!(
            check(&filter, &Message::text("hello world")),
            FilterResult::Deny
        );
        assert_eq!(
            filter.filter_parts(Level::Error, None, None, None),
            FilterResult::Deny
        );
    }

    #[test]
    fn test_raw_message() {
        let message = Message::parameterized("user {} logged in", ["alice"]);
        let raw = RegexFilter::builder()
            .regex("user \\{\\} logged in")
            .use_raw_msg(true)
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(check(&raw, &message), FilterResult::Accept);

        let formatted = RegexFilter::builder()
            .regex("user \\{\\} logged in")
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(check(&formatted, &message), FilterResult::Deny);

        let structured = Message::from(StructuredData::new("Audit@1", "transfer done", "Audit"));
        let raw = RegexFilter::builder()
            .regex("transfer.*")
            .use_raw_msg(true)
            .build()
            .unwrap();
        assert_eq!(check(&raw, &structured), FilterResult::Neutral);
    }

    #[test]
    fn test_flags() {
        let filter = RegexFilter::builder()
            .regex("ERROR.*")
            .flags(["CASE_INSENSITIVE", "DOTALL", "CANON_EQ"])
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(
            check(&filter, &Message::text("error on\nline two")),
            FilterResult::Accept
        );

        let literal = RegexFilter::builder()
            .regex("a.b")
            .flag("LITERAL")
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(check(&literal, &Message::text("a.b")), FilterResult::Accept);
        assert_eq!(check(&literal, &Message::text("axb")), FilterResult::Deny);
    }

    #[test]
    fn test_illegal_configuration() {
        assert!(RegexFilter::builder().build().is_none());
        assert!(RegexFilter::builder().regex("").build().is_none());
        assert!(RegexFilter::builder().regex("(unclosed").build().is_none());
    }

    #[test]
    fn test_value_equality() {
        let a = RegexFilter::builder().regex("a+").build().unwrap();
        let b = RegexFilter::builder().regex("a+").build().unwrap();
        let c = RegexFilter::builder()
            .regex("a+")
            .use_raw_msg(true)
            .build()
            .unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }
}
