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

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

/// The lifecycle state of a filter or a background service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifeCycleState {
    /// Constructed but never started.
    Initialized = 0,
    /// `start` is running.
    Starting = 1,
    /// Running.
    Started = 2,
    /// `stop` is running.
    Stopping = 3,
    /// Stopped. A stopped component may be started again.
    Stopped = 4,
}

impl LifeCycleState {
    fn from_u8(v: u8) -> LifeCycleState {
        match v {
            0 => LifeCycleState::Initialized,
            1 => LifeCycleState::Starting,
            2 => LifeCycleState::Started,
            3 => LifeCycleState::Stopping,
            _ => LifeCycleState::Stopped,
        }
    }
}

/// An atomic cell holding a [`LifeCycleState`].
#[derive(Debug)]
pub(crate) struct LifeCycle(AtomicU8);

impl Default for LifeCycle {
    fn default() -> Self {
        LifeCycle(AtomicU8::new(LifeCycleState::Initialized as u8))
    }
}

impl LifeCycle {
    pub(crate) fn state(&self) -> LifeCycleState {
        LifeCycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LifeCycleState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state() == LifeCycleState::Started
    }

    /// Move from `from` to `to`. Returns false if the current state is not `from`.
    pub(crate) fn transition(&self, from: LifeCycleState, to: LifeCycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let lifecycle = LifeCycle::default();
        assert_eq!(lifecycle.state(), LifeCycleState::Initialized);
        assert!(!lifecycle.transition(LifeCycleState::Started, LifeCycleState::Stopped));
        assert!(lifecycle.transition(LifeCycleState::Initialized, LifeCycleState::Started));
        assert!(lifecycle.is_started());
        lifecycle.set(LifeCycleState::Stopped);
        assert_eq!(lifecycle.state(), LifeCycleState::Stopped);
        assert!(lifecycle.transition(LifeCycleState::Stopped, LifeCycleState::Starting));
    }
}
