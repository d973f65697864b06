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
use std::sync::Mutex;

use jiff::SignedDuration;
use jiff::Timestamp;
use jiff::civil::Date;
use jiff::civil::Time;
use jiff::tz::TimeZone;

use crate::Clock;
use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;

/// A filter that matches events inside a daily wall-clock window.
///
/// The window runs from `start` to `end` in the configured time zone and wraps past midnight
/// when `end` is not after `start`. Its length is the wall-clock distance between the two
/// times: on a daylight-saving transition the window starts at the (possibly shifted) start
/// instant and lasts exactly that long, so no hour is skipped or counted twice. Start times in
/// a gap move forward by the gap length and start times in an overlap use the earlier offset.
///
/// Events carry their own timestamp; events assembled from discrete attributes are checked
/// against the filter's clock.
#[derive(Debug)]
pub struct TimeFilter {
    start: Time,
    end: Time,
    duration: SignedDuration,
    timezone: TimeZone,
    clock: Clock,
    window: Mutex<Window>,
    common: FilterCommon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: Timestamp,
    end: Timestamp,
}

impl TimeFilter {
    pub fn builder() -> TimeFilterBuilder {
        TimeFilterBuilder::default()
    }

    pub fn start_time(&self) -> Time {
        self.start
    }

    pub fn end_time(&self) -> Time {
        self.end
    }

    pub fn timezone(&self) -> &TimeZone {
        &self.timezone
    }

    /// Returns true if `ts` falls inside the current window, first moving the window forward
    /// when `ts` is past its end.
    fn contains(&self, ts: Timestamp) -> bool {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if ts > window.end {
            if let Some(next) = self.window_around(ts) {
                *window = next;
            }
        }
        window.start <= ts && ts <= window.end
    }

    /// The window for the local date of `ts`, or the previous date's window if that one is
    /// still open at `ts`.
    fn window_around(&self, ts: Timestamp) -> Option<Window> {
        let date = ts.to_zoned(self.timezone.clone()).date();
        let today = self.window_on(date)?;
        if ts < today.start {
            let previous = date.yesterday().ok().and_then(|d| self.window_on(d));
            if let Some(previous) = previous.filter(|w| ts <= w.end) {
                return Some(previous);
            }
        }
        Some(today)
    }

    fn window_on(&self, date: Date) -> Option<Window> {
        let start = date
            .to_datetime(self.start)
            .to_zoned(self.timezone.clone())
            .ok()?
            .timestamp();
        let end = start.checked_add(self.duration).ok()?;
        Some(Window { start, end })
    }
}

impl Filter for TimeFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        let ts = record.time().unwrap_or_else(|| self.clock.now());
        self.common.decide(self.contains(ts))
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
}

/// A builder for [`TimeFilter`].
///
/// Times use the `HH:mm:ss` form. Unparseable times fall back to the whole day (`00:00:00`
/// to `23:59:59.999999999`) with a warning; an unknown time zone fails the build.
#[derive(Debug)]
pub struct TimeFilterBuilder {
    start: Option<String>,
    end: Option<String>,
    timezone: Option<String>,
    clock: Clock,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for TimeFilterBuilder {
    fn default() -> Self {
        TimeFilterBuilder {
            start: None,
            end: None,
            timezone: None,
            clock: Clock::System,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl TimeFilterBuilder {
    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// An IANA time zone name such as `America/Los_Angeles`. Defaults to the system zone.
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
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

    pub fn build(self) -> Option<TimeFilter> {
        let start = parse_time("start", self.start.as_deref(), Time::MIN);
        let end = parse_time("end", self.end.as_deref(), Time::MAX);

        let timezone = match self.timezone.as_deref() {
            None => TimeZone::system(),
            Some(name) => match TimeZone::get(name) {
                Ok(tz) => tz,
                Err(err) => {
                    log::error!("invalid time zone {name:?} for TimeFilter: {err}");
                    return None;
                }
            },
        };

        let mut duration = end.duration_since(start);
        if end <= start {
            duration += SignedDuration::from_hours(24);
        }

        let mut filter = TimeFilter {
            start,
            end,
            duration,
            timezone,
            clock: self.clock,
            window: Mutex::new(Window {
                start: Timestamp::MIN,
                end: Timestamp::MIN,
            }),
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        };

        let Some(window) = filter.window_around(filter.clock.now()) else {
            log::error!("cannot compute the initial window for TimeFilter");
            return None;
        };
        *filter.window.get_mut().unwrap_or_else(|e| e.into_inner()) = window;
        Some(filter)
    }
}

fn parse_time(which: &str, value: Option<&str>, default: Time) -> Time {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return default;
    };
    match value.parse::<Time>() {
        Ok(time) => time,
        Err(err) => {
            log::warn!("ignoring unparseable {which} time {value:?} for TimeFilter: {err}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use super::*;
    use crate::Level;

    const LA: &str = "America/Los_Angeles";

    fn filter(start: &str, end: &str, built_on: Date) -> TimeFilter {
        let noon = built_on
            .at(12, 0, 0, 0)
            .to_zoned(TimeZone::get(LA).unwrap())
            .unwrap()
            .timestamp();
        let (clock, _) = Clock::manual(noon);
        TimeFilter::builder()
            .start(start)
            .end(end)
            .timezone(LA)
            .clock(clock)
            .build()
            .unwrap()
    }

    fn at(filter: &TimeFilter, ts: &str) -> FilterResult {
        let ts: Timestamp = ts.parse().unwrap();
        let record = Record::builder().level(Level::Info).time(ts).build();
        filter.filter(&record)
    }

    #[test]
    fn test_spring_forward() {
        let filter = filter("02:00:00", "03:00:00", date(2020, 3, 8));
        // 02:06:30 does not exist on this day and shifts to 03:06:30 PDT
        assert_eq!(at(&filter, "2020-03-08T03:06:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-09T02:06:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-09T04:06:30-07:00"), FilterResult::Deny);
    }

    #[test]
    fn test_fall_back() {
        let filter = filter("01:00:00", "02:00:00", date(2020, 11, 1));
        // 01:06:30 happens twice; only the earlier one is inside the one-hour window
        assert_eq!(at(&filter, "2020-11-01T01:06:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-11-01T01:06:30-08:00"), FilterResult::Deny);
        assert_eq!(at(&filter, "2020-11-02T01:30:30-08:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-11-02T04:30:30-08:00"), FilterResult::Deny);
    }

    #[test]
    fn test_overnight() {
        let filter = filter("23:00:00", "01:00:00", date(2020, 3, 10));
        assert_eq!(at(&filter, "2020-03-10T23:30:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-11T00:30:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-11T01:30:30-07:00"), FilterResult::Deny);
        assert_eq!(at(&filter, "2020-03-12T00:30:30-07:00"), FilterResult::Neutral);
    }

    #[test]
    fn test_overnight_spring_forward() {
        let filter = filter("23:00:00", "02:00:00", date(2020, 3, 7));
        assert_eq!(at(&filter, "2020-03-07T23:30:30-08:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-08T00:30:30-08:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-03-08T03:30:30-07:00"), FilterResult::Deny);
        assert_eq!(at(&filter, "2020-03-09T00:30:30-07:00"), FilterResult::Neutral);
    }

    #[test]
    fn test_overnight_fall_back() {
        let filter = filter("23:00:00", "02:00:00", date(2020, 10, 31));
        assert_eq!(at(&filter, "2020-10-31T23:30:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-11-01T00:30:30-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-11-01T01:30:30-08:00"), FilterResult::Deny);
        assert_eq!(at(&filter, "2020-11-02T00:30:30-08:00"), FilterResult::Neutral);
    }

    #[test]
    fn test_late_start_inside_overnight_window() {
        let filter = filter("23:00:00", "02:00:00", date(2020, 6, 1));
        // two days later, just after midnight: the window that opened the evening before applies
        assert_eq!(at(&filter, "2020-06-03T01:00:00-07:00"), FilterResult::Neutral);
        assert_eq!(at(&filter, "2020-06-03T12:00:00-07:00"), FilterResult::Deny);
    }

    #[test]
    fn test_discrete_parts_use_clock() {
        let tz = TimeZone::get(LA).unwrap();
        let inside = date(2024, 5, 1)
            .at(9, 30, 0, 0)
            .to_zoned(tz.clone())
            .unwrap()
            .timestamp();
        let (clock, handle) = Clock::manual(inside);
        let filter = TimeFilter::builder()
            .start("09:00:00")
            .end("17:00:00")
            .timezone(LA)
            .clock(clock)
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        assert_eq!(
            filter.filter_parts(Level::Info, None, None, None),
            FilterResult::Accept
        );
        handle.advance(SignedDuration::from_hours(9));
        assert_eq!(
            filter.filter_parts(Level::Info, None, None, None),
            FilterResult::Deny
        );
    }

    #[test]
    fn test_defaults_and_fallbacks() {
        let filter = TimeFilter::builder()
            .start("not a time")
            .timezone("UTC")
            .build()
            .unwrap();
        assert_eq!(filter.start_time(), Time::MIN);
        assert_eq!(filter.end_time(), Time::MAX);
        assert_eq!(
            filter.filter_parts(Level::Info, None, None, None),
            FilterResult::Neutral
        );

        assert!(TimeFilter::builder().timezone("Mars/Olympus").build().is_none());
    }
}
