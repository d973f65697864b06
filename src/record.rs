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

//! Log events as seen by filters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;

use crate::Error;
use crate::context::ThreadContext;
use crate::marker::Marker;
use crate::message::Message;

/// An enum representing the available levels, from the most severe to the most verbose.
///
/// The ordering follows severity: `Off < Fatal < Error < Warn < Info < Debug < Trace < All`.
/// `Off` and `All` are thresholds rather than event levels; an event is rarely logged at them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// No events at all.
    Off,
    /// Designates errors the application cannot recover from.
    Fatal,
    /// Designates very serious errors.
    Error,
    /// Designates hazardous situations.
    Warn,
    /// Designates useful information.
    Info,
    /// Designates lower priority information.
    Debug,
    /// Designates very low priority, often extremely verbose, information.
    Trace,
    /// Every event.
    All,
}

impl Level {
    /// Return the string representation of the `Level`.
    ///
    /// This returns the same string as the `fmt::Display` implementation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Off => "OFF",
            Level::Fatal => "FATAL",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
            Level::All => "ALL",
        }
    }

    /// Returns true if `self` is as severe as `other`, or more severe.
    ///
    /// ```
    /// use logsift::Level;
    ///
    /// assert!(Level::Error.is_at_least_as_severe_as(Level::Warn));
    /// assert!(Level::Warn.is_at_least_as_severe_as(Level::Warn));
    /// assert!(!Level::Info.is_at_least_as_severe_as(Level::Warn));
    /// ```
    pub fn is_at_least_as_severe_as(&self, other: Level) -> bool {
        *self <= other
    }

    /// Returns true if `self` lies within `[most_severe, least_severe]`.
    pub fn is_in_range(&self, most_severe: Level, least_severe: Level) -> bool {
        most_severe <= *self && *self <= least_severe
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;
    fn from_str(s: &str) -> Result<Level, Self::Err> {
        for (name, level) in [
            ("off", Level::Off),
            ("fatal", Level::Fatal),
            ("error", Level::Error),
            ("warn", Level::Warn),
            ("info", Level::Info),
            ("debug", Level::Debug),
            ("trace", Level::Trace),
            ("all", Level::All),
        ] {
            if s.trim().eq_ignore_ascii_case(name) {
                return Ok(level);
            }
        }

        Err(Error::new(format!("malformed level: {s:?}")))
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

/// The context map attached to an event.
#[derive(Clone, Copy, Debug, Default)]
pub enum ContextData<'a> {
    /// Read the calling thread's [`ThreadContext`] at evaluation time.
    #[default]
    Current,
    /// A map captured when the event was created.
    Captured(&'a BTreeMap<String, String>),
}

impl ContextData<'_> {
    /// Run `f` against the context map.
    pub fn with_map<R>(&self, f: impl FnOnce(&BTreeMap<String, String>) -> R) -> R {
        match self {
            ContextData::Current => ThreadContext::with_map(f),
            ContextData::Captured(map) => f(map),
        }
    }

    /// Look up one entry.
    pub fn get(&self, key: &str) -> Option<String> {
        self.with_map(|map| map.get(key).cloned())
    }
}

/// A log event.
///
/// Every attribute except the level is optional. Filters that need a missing attribute treat
/// the event as a mismatch.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    level: Level,
    target: &'a str,
    marker: Option<&'a Marker>,
    message: Option<&'a Message>,
    throwable: Option<&'a (dyn std::error::Error + 'static)>,
    time: Option<Timestamp>,
    context: ContextData<'a>,
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("level", &self.level)
            .field("target", &self.target)
            .field("marker", &self.marker.map(Marker::name))
            .field("message", &self.message)
            .field("throwable", &self.throwable.map(|t| t.to_string()))
            .field("time", &self.time)
            .field("context", &self.context)
            .finish()
    }
}

impl<'a> Record<'a> {
    /// Returns a new builder.
    pub fn builder() -> RecordBuilder<'a> {
        RecordBuilder::default()
    }

    /// The level of the event.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The name of the logger the event was sent to.
    pub fn target(&self) -> &'a str {
        self.target
    }

    /// The marker of the event, if any.
    pub fn marker(&self) -> Option<&'a Marker> {
        self.marker
    }

    /// The message of the event, if any.
    pub fn message(&self) -> Option<&'a Message> {
        self.message
    }

    /// The error attached to the event, if any.
    pub fn throwable(&self) -> Option<&'a (dyn std::error::Error + 'static)> {
        self.throwable
    }

    /// The time the event was created.
    ///
    /// `None` for events assembled from discrete attributes; time-aware filters fall back to
    /// their clock.
    pub fn time(&self) -> Option<Timestamp> {
        self.time
    }

    /// The context map of the event.
    pub fn context(&self) -> ContextData<'a> {
        self.context
    }
}

/// Builder for [`Record`].
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    record: Record<'a>,
}

impl Default for RecordBuilder<'_> {
    fn default() -> Self {
        RecordBuilder {
            record: Record {
                level: Level::Info,
                target: "",
                marker: None,
                message: None,
                throwable: None,
                time: None,
                context: ContextData::Current,
            },
        }
    }
}

impl<'a> RecordBuilder<'a> {
    /// Set [`level`](Record::level).
    pub fn level(mut self, level: Level) -> Self {
        self.record.level = level;
        self
    }

    /// Set [`target`](Record::target).
    pub fn target(mut self, target: &'a str) -> Self {
        self.record.target = target;
        self
    }

    /// Set [`marker`](Record::marker).
    pub fn marker(mut self, marker: &'a Marker) -> Self {
        self.record.marker = Some(marker);
        self
    }

    /// Set [`message`](Record::message).
    pub fn message(mut self, message: &'a Message) -> Self {
        self.record.message = Some(message);
        self
    }

    /// Set [`throwable`](Record::throwable).
    pub fn throwable(mut self, throwable: &'a (dyn std::error::Error + 'static)) -> Self {
        self.record.throwable = Some(throwable);
        self
    }

    /// Set [`time`](Record::time).
    pub fn time(mut self, time: Timestamp) -> Self {
        self.record.time = Some(time);
        self
    }

    /// Use a captured context map instead of the calling thread's context.
    pub fn context(mut self, context: &'a BTreeMap<String, String>) -> Self {
        self.record.context = ContextData::Captured(context);
        self
    }

    /// Invoke the builder and return a `Record`.
    pub fn build(self) -> Record<'a> {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        let levels = [
            Level::Off,
            Level::Fatal,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
            Level::All,
        ];
        for w in levels.windows(2) {
            assert!(w[0] < w[1], "{} < {}", w[0], w[1]);
        }
        assert!(Level::Fatal.is_at_least_as_severe_as(Level::Error));
        assert!(Level::Debug.is_in_range(Level::Off, Level::All));
        assert!(!Level::Trace.is_in_range(Level::Error, Level::Info));
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("ALL".parse::<Level>().unwrap(), Level::All);
        assert_eq!(" Fatal ".parse::<Level>().unwrap(), Level::Fatal);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_captured_context() {
        let mut map = BTreeMap::new();
        map.insert("user".to_string(), "alice".to_string());
        let record = Record::builder().context(&map).build();
        assert_eq!(record.context().get("user").as_deref(), Some("alice"));
        assert_eq!(record.context().get("tenant"), None);
        assert_eq!(record.time(), None);
    }
}
