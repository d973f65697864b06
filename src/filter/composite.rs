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
use std::sync::Arc;

use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterResult;
use crate::lifecycle::LifeCycle;

/// An ordered chain of filters.
///
/// Members are evaluated in order; the first `ACCEPT` or `DENY` is returned immediately and a
/// chain whose members all answer `NEUTRAL` (or an empty chain) answers `NEUTRAL`.
///
/// A composite is immutable once built and always flat: composites passed as members are
/// replaced by their own members. Duplicates are allowed. Composites compare by identity.
#[derive(Debug, Default)]
pub struct CompositeFilter {
    filters: Vec<Arc<dyn Filter>>,
    lifecycle: LifeCycle,
}

impl CompositeFilter {
    /// Create a composite from the given filters, flattening nested composites.
    pub fn new(filters: impl IntoIterator<Item = Arc<dyn Filter>>) -> CompositeFilter {
        let mut flat = vec![];
        for filter in filters {
            flatten_into(&mut flat, filter);
        }
        CompositeFilter {
            filters: flat,
            lifecycle: LifeCycle::default(),
        }
    }

    /// The members, in evaluation order.
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns a new composite with `filter` (or its members, if it is a composite) appended.
    pub fn with_filter(&self, filter: Arc<dyn Filter>) -> CompositeFilter {
        let mut filters = self.filters.clone();
        flatten_into(&mut filters, filter);
        CompositeFilter {
            filters,
            lifecycle: LifeCycle::default(),
        }
    }

    /// Returns a new composite without the first member matching `filter`.
    ///
    /// If `filter` is itself a composite, the first match of each of its members is removed
    /// instead. Matching is by identity or value equality.
    pub fn without_filter(&self, filter: &dyn Filter) -> CompositeFilter {
        let mut filters = self.filters.clone();
        remove_matching(&mut filters, filter);
        CompositeFilter {
            filters,
            lifecycle: LifeCycle::default(),
        }
    }
}

/// Appends `filter` to `filters`, expanding it if it is a composite.
pub(crate) fn flatten_into(filters: &mut Vec<Arc<dyn Filter>>, filter: Arc<dyn Filter>) {
    match filter.as_composite() {
        Some(composite) => filters.extend(composite.filters.iter().cloned()),
        None => filters.push(filter),
    }
}

/// Removes the first member matching `target`, or the first match of each member of a
/// composite `target`. Returns whether anything was removed.
pub(crate) fn remove_matching(filters: &mut Vec<Arc<dyn Filter>>, target: &dyn Filter) -> bool {
    let mut remove_first = |target: &dyn Filter| -> bool {
        match filters.iter().position(|f| f.same_as(target)) {
            Some(pos) => {
                filters.remove(pos);
                true
            }
            None => false,
        }
    };

    match target.as_composite() {
        Some(composite) => {
            let mut removed = false;
            for member in composite.filters.iter() {
                removed |= remove_first(member.as_ref());
            }
            removed
        }
        None => remove_first(target),
    }
}

impl Filter for CompositeFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        for filter in self.filters.iter() {
            let result = filter.filter(record);
            if result.is_terminal() {
                return result;
            }
        }
        FilterResult::Neutral
    }

    fn start(&self) {
        self.lifecycle.set(LifeCycleState::Starting);
        for filter in self.filters.iter() {
            filter.start();
        }
        self.lifecycle.set(LifeCycleState::Started);
    }

    fn stop(&self) {
        self.lifecycle.set(LifeCycleState::Stopping);
        for filter in self.filters.iter() {
            filter.stop();
        }
        self.lifecycle.set(LifeCycleState::Stopped);
    }

    fn state(&self) -> LifeCycleState {
        self.lifecycle.state()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::Level;
    use crate::filter::CustomFilter;
    use crate::filter::ThresholdFilter;

    fn constant(result: FilterResult, calls: Arc<AtomicUsize>) -> Arc<dyn Filter> {
        Arc::new(CustomFilter::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            result
        }))
    }

    #[test]
    fn test_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeFilter::new([
            constant(FilterResult::Neutral, calls.clone()),
            constant(FilterResult::Deny, calls.clone()),
            constant(FilterResult::Accept, calls.clone()),
        ]);
        let record = Record::builder().level(Level::Info).build();
        assert_eq!(composite.filter(&record), FilterResult::Deny);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_neutral_and_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeFilter::new([
            constant(FilterResult::Neutral, calls.clone()),
            constant(FilterResult::Neutral, calls.clone()),
        ]);
        let record = Record::builder().build();
        assert_eq!(composite.filter(&record), FilterResult::Neutral);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            CompositeFilter::default().filter(&record),
            FilterResult::Neutral
        );
    }

    #[test]
    fn test_flattening() {
        let a: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().build());
        let b: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().level(Level::Warn).build());
        let inner: Arc<dyn Filter> = Arc::new(CompositeFilter::new([a.clone(), b.clone()]));
        let outer = CompositeFilter::new([inner.clone(), a.clone()]);
        assert_eq!(outer.len(), 3);
        assert!(outer.filters().iter().all(|f| f.as_composite().is_none()));

        let grown = outer.with_filter(inner);
        assert_eq!(grown.len(), 5);
        assert_eq!(outer.len(), 3);
    }

    #[test]
    fn test_without_filter() {
        let a: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().build());
        let b: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().level(Level::Warn).build());
        let composite = CompositeFilter::new([a.clone(), b.clone(), a.clone()]);

        // equal by value is enough
        let equal_to_a = ThresholdFilter::builder().build();
        let removed = composite.without_filter(&equal_to_a);
        assert_eq!(removed.len(), 2);
        assert!(Arc::ptr_eq(&removed.filters()[0], &b));

        let both = CompositeFilter::new([a.clone(), b.clone()]);
        let removed = composite.without_filter(&both);
        assert_eq!(removed.len(), 1);
        assert!(Arc::ptr_eq(&removed.filters()[0], &a));
    }

    #[test]
    fn test_lifecycle_is_delegated() {
        let member: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().build());
        let composite = CompositeFilter::new([member.clone()]);
        composite.start();
        assert_eq!(composite.state(), LifeCycleState::Started);
        assert_eq!(member.state(), LifeCycleState::Started);
        composite.stop();
        assert_eq!(member.state(), LifeCycleState::Stopped);
    }
}
