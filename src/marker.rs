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

use std::fmt;
use std::sync::Arc;

/// A named tag attached to an event, optionally descending from parent markers.
///
/// Markers form a DAG: a marker is an instance of itself and of every ancestor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    name: Arc<str>,
    parents: Arc<[Marker]>,
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_tuple("Marker");
        d.field(&self.name);
        if !self.parents.is_empty() {
            d.field(&self.parents);
        }
        d.finish()
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Marker {
    /// Create a marker without parents.
    pub fn new(name: impl AsRef<str>) -> Marker {
        Marker {
            name: Arc::from(name.as_ref()),
            parents: Arc::from(Vec::new()),
        }
    }

    /// Create a marker with the given parents.
    pub fn with_parents(name: impl AsRef<str>, parents: impl IntoIterator<Item = Marker>) -> Marker {
        Marker {
            name: Arc::from(name.as_ref()),
            parents: parents.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[Marker] {
        &self.parents
    }

    /// Returns true if this marker is named `name` or descends from a marker named `name`.
    pub fn is_instance_of(&self, name: &str) -> bool {
        &*self.name == name || self.parents.iter().any(|p| p.is_instance_of(name))
    }
}
