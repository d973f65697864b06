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
use std::fmt::Debug;

use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterResult;

/// A filter that you can pass the custom filter function.
///
/// The custom filter function accepts [`&Record`][Record] and returns the [`FilterResult`].
/// For example:
///
/// ```rust
/// use logsift::FilterResult;
/// use logsift::Record;
/// use logsift::filter::CustomFilter;
///
/// let filter = CustomFilter::new(|record: &Record| {
///     if record.target() == "my_crate" {
///         FilterResult::Accept
///     } else {
///         FilterResult::Neutral
///     }
/// });
/// ```
///
/// Custom filters compare by identity only.
pub struct CustomFilter {
    f: Box<dyn Fn(&Record) -> FilterResult + Send + Sync + 'static>,
}

impl Debug for CustomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustomFilter {{ ... }}")
    }
}

impl CustomFilter {
    pub fn new(filter: impl Fn(&Record) -> FilterResult + Send + Sync + 'static) -> Self {
        CustomFilter {
            f: Box::new(filter),
        }
    }
}

impl Filter for CustomFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        (self.f)(record)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
