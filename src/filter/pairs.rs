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

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::Error;

/// A configured key and expected value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> KeyValuePair {
        KeyValuePair {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValuePair {
    fn from((key, value): (K, V)) -> Self {
        KeyValuePair::new(key, value)
    }
}

/// How the per-key checks of a map-based filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Every key must match.
    And,
    /// Any key may match.
    #[default]
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        })
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("and") => Ok(Operator::And),
            s if s.eq_ignore_ascii_case("or") => Ok(Operator::Or),
            _ => Err(Error::new(format!("malformed operator: {s:?}"))),
        }
    }
}

/// Groups pairs by key; repeated keys accumulate their values.
///
/// Returns `None` (after logging the reason) if there are no pairs or a pair has an empty key.
pub(crate) fn group_pairs(
    filter: &str,
    pairs: Vec<KeyValuePair>,
) -> Option<BTreeMap<String, Vec<String>>> {
    if pairs.is_empty() {
        log::error!("key-value pairs must be specified for {filter}");
        return None;
    }

    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for KeyValuePair { key, value } in pairs {
        if key.is_empty() {
            log::error!("a null key is not valid in {filter}");
            return None;
        }
        map.entry(key).or_default().push(value);
    }
    Some(map)
}

/// Applies the configured operator over per-key checks.
///
/// `lookup` returns whether a key's actual value is among its expected values. Iteration stops
/// at the first match under OR and the first mismatch under AND.
pub(crate) fn evaluate_map(
    map: &BTreeMap<String, Vec<String>>,
    operator: Operator,
    mut lookup: impl FnMut(&str, &[String]) -> bool,
) -> bool {
    let mut matched = false;
    for (key, values) in map.iter() {
        matched = lookup(key, values);
        match operator {
            Operator::Or if matched => break,
            Operator::And if !matched => break,
            _ => {}
        }
    }
    matched
}
