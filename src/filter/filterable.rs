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

use std::sync::Arc;

use crate::Record;
use crate::filter::CompositeFilter;
use crate::filter::Filter;
use crate::filter::FilterResult;
use crate::filter::composite::flatten_into;
use crate::filter::composite::remove_matching;

/// A container owning zero, one or many filters.
///
/// The container is always in canonical form: empty, a single filter, or a composite of at
/// least two members. Adding promotes a single filter to a composite and removing demotes a
/// composite left with one member back to that member.
///
/// ```
/// use std::sync::Arc;
///
/// use logsift::Filter;
/// use logsift::Filterable;
/// use logsift::Level;
/// use logsift::filter::ThresholdFilter;
///
/// let warn: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().level(Level::Warn).build());
/// let info: Arc<dyn Filter> = Arc::new(ThresholdFilter::builder().level(Level::Info).build());
///
/// let mut filterable = Filterable::new();
/// filterable.add_filter(warn.clone());
/// filterable.add_filter(info);
/// assert!(filterable.filter().unwrap().as_composite().is_some());
///
/// assert!(filterable.remove_filter(warn.as_ref()));
/// assert!(filterable.filter().unwrap().as_composite().is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct Filterable {
    filter: Option<Arc<dyn Filter>>,
}

impl Filterable {
    pub fn new() -> Filterable {
        Filterable::default()
    }

    /// Create a container holding `filter`, canonicalized.
    pub fn with_filter(filter: Arc<dyn Filter>) -> Filterable {
        let mut filterable = Filterable::new();
        filterable.add_filter(filter);
        filterable
    }

    /// The held filter: `None`, a single filter, or a composite of at least two members.
    pub fn filter(&self) -> Option<&Arc<dyn Filter>> {
        self.filter.as_ref()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Add a filter, flattening it if it is a composite.
    pub fn add_filter(&mut self, filter: Arc<dyn Filter>) {
        let current = match self.filter.take() {
            Some(current) => current,
            None => {
                // keep the instance itself when it is already canonical
                let undersized = filter
                    .as_composite()
                    .filter(|composite| composite.len() < 2)
                    .map(|composite| composite.filters().to_vec());
                self.filter = match undersized {
                    Some(members) => canonical(members),
                    None => Some(filter),
                };
                return;
            }
        };

        let mut filters = vec![];
        flatten_into(&mut filters, current);
        flatten_into(&mut filters, filter);
        self.filter = canonical(filters);
    }

    /// Remove a filter, matching by identity or value equality.
    ///
    /// If the held filter is `target`, the container becomes empty. Otherwise, if the held
    /// filter is a composite, its first member matching `target` is removed; a composite
    /// `target` removes the first match of each of its members. Returns whether anything
    /// changed.
    pub fn remove_filter(&mut self, target: &dyn Filter) -> bool {
        let Some(current) = self.filter.as_ref() else {
            return false;
        };

        if current.same_as(target) {
            self.filter = None;
            return true;
        }

        let Some(composite) = current.as_composite() else {
            return false;
        };
        let mut filters = composite.filters().to_vec();
        if !remove_matching(&mut filters, target) {
            return false;
        }
        self.filter = canonical(filters);
        true
    }

    /// Evaluate the held filter; an empty container answers `NEUTRAL`.
    pub fn evaluate(&self, record: &Record) -> FilterResult {
        match self.filter.as_ref() {
            Some(filter) => filter.filter(record),
            None => FilterResult::Neutral,
        }
    }

    /// Returns true if the held filter denies the event.
    pub fn is_filtered(&self, record: &Record) -> bool {
        self.evaluate(record) == FilterResult::Deny
    }

    pub fn start(&self) {
        if let Some(filter) = self.filter.as_ref() {
            filter.start();
        }
    }

    pub fn stop(&self) {
        if let Some(filter) = self.filter.as_ref() {
            filter.stop();
        }
    }
}

fn canonical(mut filters: Vec<Arc<dyn Filter>>) -> Option<Arc<dyn Filter>> {
    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(Arc::new(CompositeFilter::new(filters))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use crate::filter::CustomFilter;
    use crate::filter::ThresholdFilter;

    fn custom() -> Arc<dyn Filter> {
        Arc::new(CustomFilter::new(|_| FilterResult::Neutral))
    }

    fn members(filterable: &Filterable) -> usize {
        match filterable.filter() {
            None => 0,
            Some(filter) => filter.as_composite().map_or(1, CompositeFilter::len),
        }
    }

    #[test]
    fn test_promotion_and_demotion() {
        let mut filterable = Filterable::new();
        let a = custom();
        let b = custom();

        filterable.add_filter(a.clone());
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &a));

        filterable.add_filter(b.clone());
        assert_eq!(members(&filterable), 2);

        assert!(filterable.remove_filter(a.as_ref()));
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &b));

        assert!(filterable.remove_filter(b.as_ref()));
        assert!(!filterable.has_filter());
    }

    #[test]
    fn test_add_composite_flattens() {
        let mut filterable = Filterable::new();
        filterable.add_filter(custom());
        filterable.add_filter(custom());
        filterable.add_filter(Arc::new(CompositeFilter::new([custom(), custom(), custom()])));
        assert_eq!(members(&filterable), 5);
        let composite = filterable.filter().unwrap().as_composite().unwrap();
        assert!(composite.filters().iter().all(|f| f.as_composite().is_none()));
    }

    #[test]
    fn test_add_composite_to_single() {
        let mut filterable = Filterable::new();
        filterable.add_filter(custom());
        filterable.add_filter(Arc::new(CompositeFilter::new([custom(), custom()])));
        assert_eq!(members(&filterable), 3);
    }

    #[test]
    fn test_add_composite_to_empty_keeps_instance() {
        let composite: Arc<dyn Filter> = Arc::new(CompositeFilter::new([custom(), custom()]));
        let mut filterable = Filterable::new();
        filterable.add_filter(composite.clone());
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &composite));

        let single = custom();
        let mut filterable = Filterable::new();
        filterable.add_filter(Arc::new(CompositeFilter::new([single.clone()])));
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &single));

        let mut filterable = Filterable::new();
        filterable.add_filter(Arc::new(CompositeFilter::default()));
        assert!(!filterable.has_filter());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut filterable = Filterable::new();
        assert!(!filterable.remove_filter(custom().as_ref()));

        let a = custom();
        let b = custom();
        filterable.add_filter(a.clone());
        filterable.add_filter(b.clone());
        let before = filterable.filter().cloned().unwrap();
        assert!(!filterable.remove_filter(custom().as_ref()));
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &before));
    }

    #[test]
    fn test_remove_by_value() {
        let mut filterable = Filterable::new();
        filterable.add_filter(Arc::new(ThresholdFilter::builder().level(Level::Warn).build()));
        filterable.add_filter(custom());

        let equal = ThresholdFilter::builder().level(Level::Warn).build();
        assert!(filterable.remove_filter(&equal));
        assert_eq!(members(&filterable), 1);
        assert!(filterable.filter().unwrap().as_composite().is_none());
    }

    #[test]
    fn test_remove_composite_target() {
        let a = custom();
        let b = custom();
        let c = custom();
        let mut filterable = Filterable::new();
        filterable.add_filter(a.clone());
        filterable.add_filter(b.clone());
        filterable.add_filter(c.clone());

        let target = CompositeFilter::new([a.clone(), c.clone()]);
        assert!(filterable.remove_filter(&target));
        assert!(Arc::ptr_eq(filterable.filter().unwrap(), &b));
    }

    #[test]
    fn test_remove_held_composite() {
        let composite: Arc<dyn Filter> = Arc::new(CompositeFilter::new([custom(), custom()]));
        let mut filterable = Filterable::with_filter(composite.clone());
        assert!(filterable.remove_filter(composite.as_ref()));
        assert!(!filterable.has_filter());
    }

    #[test]
    fn test_is_filtered() {
        let mut filterable = Filterable::new();
        let record = Record::builder().level(Level::Debug).build();
        assert!(!filterable.is_filtered(&record));
        filterable.add_filter(Arc::new(ThresholdFilter::builder().level(Level::Info).build()));
        assert!(filterable.is_filtered(&record));
        assert_eq!(filterable.evaluate(&record), FilterResult::Deny);
    }
}
