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

//! The per-thread diagnostic context consulted by context-map filters.

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    static CONTEXT: RefCell<BTreeMap<String, String>> = const { RefCell::new(BTreeMap::new()) };
}

/// Key-value pairs stored in a thread-local map.
///
/// Events that do not capture their own context map are evaluated against the calling thread's
/// map.
///
/// ## Example
///
/// ```rust
/// use logsift::ThreadContext;
///
/// ThreadContext::insert("user", "alice");
/// assert_eq!(ThreadContext::get("user").as_deref(), Some("alice"));
/// ThreadContext::remove("user");
/// ```
#[derive(Default, Debug, Clone, Copy)]
#[non_exhaustive]
pub struct ThreadContext {}

impl ThreadContext {
    /// Inserts a key-value pair into the thread local context.
    pub fn insert<K, V>(key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        CONTEXT.with(|map| {
            map.borrow_mut().insert(key.into(), value.into());
        });
    }

    /// Removes a key-value pair from the thread local context.
    pub fn remove(key: &str) {
        CONTEXT.with(|map| {
            map.borrow_mut().remove(key);
        });
    }

    /// Removes every entry.
    pub fn clear() {
        CONTEXT.with(|map| map.borrow_mut().clear());
    }

    /// Returns the value stored under `key`.
    pub fn get(key: &str) -> Option<String> {
        CONTEXT.with(|map| map.borrow().get(key).cloned())
    }

    /// Returns a copy of the whole map.
    pub fn snapshot() -> BTreeMap<String, String> {
        CONTEXT.with(|map| map.borrow().clone())
    }

    /// Runs `f` against the map without copying it.
    ///
    /// `f` must not modify the thread context.
    pub fn with_map<R>(f: impl FnOnce(&BTreeMap<String, String>) -> R) -> R {
        CONTEXT.with(|map| f(&map.borrow()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_per_thread() {
        ThreadContext::insert("request", "42");
        let other = std::thread::spawn(|| ThreadContext::get("request"))
            .join()
            .unwrap();
        assert_eq!(other, None);
        assert_eq!(ThreadContext::snapshot().len(), 1);
        ThreadContext::clear();
        assert_eq!(ThreadContext::get("request"), None);
    }
}
