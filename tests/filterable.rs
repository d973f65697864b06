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

use logsift::CompositeFilter;
use logsift::Filter;
use logsift::FilterResult;
use logsift::Filterable;
use logsift::Level;
use logsift::Record;
use logsift::filter::CustomFilter;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn custom(result: FilterResult) -> Arc<dyn Filter> {
    Arc::new(CustomFilter::new(move |_| result))
}

fn members(filterable: &Filterable) -> Vec<Arc<dyn Filter>> {
    match filterable.filter() {
        None => vec![],
        Some(filter) => match filter.as_composite() {
            Some(composite) => composite.filters().to_vec(),
            None => vec![filter.clone()],
        },
    }
}

fn assert_canonical(filterable: &Filterable, model: &[Arc<dyn Filter>]) {
    let actual = members(filterable);
    assert_eq!(actual.len(), model.len());
    for (actual, expected) in actual.iter().zip(model) {
        assert!(Arc::ptr_eq(actual, expected));
        assert!(actual.as_composite().is_none());
    }
    match filterable.filter() {
        None => assert!(model.is_empty()),
        Some(filter) => {
            let composite = filter.as_composite().map_or(0, CompositeFilter::len);
            assert_eq!(composite >= 2, model.len() >= 2);
        }
    }
}

#[test]
fn test_random_add_remove_keeps_canonical_form() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut filterable = Filterable::new();
    let mut model: Vec<Arc<dyn Filter>> = vec![];

    for _ in 0..2000 {
        match rng.random_range(0..4) {
            0 => {
                let filter = custom(FilterResult::Neutral);
                model.push(filter.clone());
                filterable.add_filter(filter);
            }
            1 => {
                let batch: Vec<_> = (0..rng.random_range(0..4))
                    .map(|_| custom(FilterResult::Neutral))
                    .collect();
                model.extend(batch.iter().cloned());
                filterable.add_filter(Arc::new(CompositeFilter::new(batch)));
            }
            2 if !model.is_empty() => {
                let target = model.remove(rng.random_range(0..model.len()));
                assert!(filterable.remove_filter(target.as_ref()));
            }
            _ => {
                let stranger = custom(FilterResult::Neutral);
                assert!(!filterable.remove_filter(stranger.as_ref()));
            }
        }
        assert_canonical(&filterable, &model);
    }
}

#[test]
fn test_first_terminal_result_wins() {
    let record = Record::builder().level(Level::Info).build();
    let mut filterable = Filterable::new();
    assert_eq!(filterable.evaluate(&record), FilterResult::Neutral);

    filterable.add_filter(custom(FilterResult::Neutral));
    filterable.add_filter(custom(FilterResult::Accept));
    filterable.add_filter(custom(FilterResult::Deny));
    assert_eq!(filterable.evaluate(&record), FilterResult::Accept);
    assert!(!filterable.is_filtered(&record));

    let only_neutral = Filterable::with_filter(Arc::new(CompositeFilter::new([
        custom(FilterResult::Neutral),
        custom(FilterResult::Neutral),
    ])));
    assert_eq!(only_neutral.evaluate(&record), FilterResult::Neutral);
}
