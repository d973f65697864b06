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

//! Time sources for time-aware filters.

use std::sync::Arc;
use std::sync::Mutex;

use jiff::SignedDuration;
use jiff::Timestamp;

/// A source of the current time.
///
/// Filters that reason about wall-clock time take a clock so tests can drive them
/// deterministically.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// The system clock.
    #[default]
    System,
    /// A clock that only moves when told to.
    Manual(ManualClock),
}

impl Clock {
    /// Create a manual clock starting at `now`, together with a handle for moving it.
    pub fn manual(now: Timestamp) -> (Clock, ManualClock) {
        let clock = ManualClock::new(now);
        (Clock::Manual(clock.clone()), clock)
    }

    /// Return the current time of this clock.
    pub fn now(&self) -> Timestamp {
        match self {
            Clock::System => Timestamp::now(),
            Clock::Manual(clock) => clock.now(),
        }
    }
}

/// The time could be reset. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_now(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, duration: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(next) = now.checked_add(duration) {
            *now = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_manual_clock_adjusting() {
        let now = Timestamp::from_str("2023-01-01T12:00:00Z").unwrap();
        let (clock, handle) = Clock::manual(now);
        assert_eq!(clock.now(), now);

        let now = Timestamp::from_str("2024-01-01T12:00:00Z").unwrap();
        handle.set_now(now);
        assert_eq!(clock.now(), now);

        handle.advance(SignedDuration::from_secs(90));
        assert_eq!(
            clock.now(),
            Timestamp::from_str("2024-01-01T12:01:30Z").unwrap()
        );
    }
}
