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
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Deserialize;

use crate::ConfigurationScheduler;
use crate::Error;
use crate::LifeCycleState;
use crate::Record;
use crate::filter::Filter;
use crate::filter::FilterCommon;
use crate::filter::FilterResult;
use crate::filter::ThreadContextMapFilter;
use crate::scheduler::ScheduledTask;
use crate::watch::Source;
use crate::watch::resource::Fetched;
use crate::watch::resource::Resource;

type UpdateListener = Arc<dyn Fn() + Send + Sync + 'static>;

/// The outcome of reloading the rules of a [`MutableThreadContextMapFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// New rules were installed.
    Success,
    /// The document did not change; the current rules are kept.
    NotModified,
    /// The document does not exist; the rules were cleared.
    NotFound,
    /// The document holds no rules; the rules were cleared.
    Empty,
    /// The document could not be read or parsed; the current rules are kept.
    Error,
}

/// A [`ThreadContextMapFilter`] whose key-value rules are loaded from a JSON document and
/// swapped atomically while the filter is in use.
///
/// The document lives at a file path or an HTTP(S) URL and looks like:
///
/// ```json
/// {"configs": {"loginId": ["alice", "bob"], "corpAcctNumber": ["12345"]}}
/// ```
///
/// Keys are OR-ed together. Without rules the filter answers `NEUTRAL`. With a positive poll
/// interval the document is reloaded on the configuration scheduler; otherwise it is read once
/// on [`start`](Filter::start).
pub struct MutableThreadContextMapFilter {
    shared: Arc<Shared>,
    poll_interval: u64,
    scheduler: Option<Arc<ConfigurationScheduler>>,
    task: Mutex<Option<ScheduledTask>>,
    common: FilterCommon,
}

struct Shared {
    resource: Resource,
    rules: ArcSwapOption<ThreadContextMapFilter>,
    listeners: Mutex<Vec<UpdateListener>>,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl fmt::Debug for MutableThreadContextMapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableThreadContextMapFilter")
            .field("source", self.shared.resource.source())
            .field("poll_interval", &self.poll_interval)
            .field("rules", &self.shared.rules.load_full())
            .field("common", &self.common)
            .finish()
    }
}

impl MutableThreadContextMapFilter {
    pub fn builder() -> MutableThreadContextMapFilterBuilder {
        MutableThreadContextMapFilterBuilder::default()
    }

    /// The location the rules are loaded from.
    pub fn source(&self) -> &Source {
        self.shared.resource.source()
    }

    /// The poll interval in seconds; zero means the rules are loaded once on start.
    pub fn poll_interval(&self) -> u64 {
        self.poll_interval
    }

    /// The rules currently in force, if any.
    pub fn rules(&self) -> Option<Arc<ThreadContextMapFilter>> {
        self.shared.rules.load_full()
    }

    /// Register a callback invoked after the rules change.
    pub fn register_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        let mut listeners = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        listeners.push(Arc::new(listener));
    }

    /// Reload the rules now.
    pub fn reload(&self) -> LoadStatus {
        self.shared.reload()
    }
}

impl Shared {
    fn reload(&self) -> LoadStatus {
        let source = self.resource.source();
        let status = match self.resource.fetch() {
            Ok(Fetched::Modified(content)) => match parse_rules(&content) {
                Ok(Some(map)) => {
                    let rules =
                        ThreadContextMapFilter::from_map(map, self.on_match, self.on_mismatch);
                    log::info!("filter configuration from {source} was updated: {rules:?}");
                    self.rules.store(Some(Arc::new(rules)));
                    LoadStatus::Success
                }
                Ok(None) => LoadStatus::Empty,
                Err(err) => {
                    log::warn!("invalid key/value pair configuration in {source}: {err}");
                    LoadStatus::Error
                }
            },
            Ok(Fetched::NotModified) => LoadStatus::NotModified,
            Ok(Fetched::NotFound) => LoadStatus::NotFound,
            Err(err) => {
                log::warn!("failed to load filter configuration from {source}: {err}");
                LoadStatus::Error
            }
        };

        match status {
            LoadStatus::Success => self.notify(),
            LoadStatus::NotFound => {
                if self.rules.swap(None).is_some() {
                    log::info!("filter configuration {source} was removed");
                    self.notify();
                }
            }
            LoadStatus::Empty => {
                log::debug!("filter configuration {source} is empty");
                self.rules.store(None);
            }
            LoadStatus::NotModified | LoadStatus::Error => {}
        }
        status
    }

    fn notify(&self) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener();
        }
    }
}

#[derive(Deserialize)]
struct RulesDocument {
    #[serde(default)]
    configs: Option<BTreeMap<String, Vec<Option<String>>>>,
}

/// Parses a rules document. Returns `Ok(None)` when it holds no rules.
fn parse_rules(content: &[u8]) -> Result<Option<BTreeMap<String, Vec<String>>>, Error> {
    let document: Option<RulesDocument> =
        serde_json::from_slice(content).map_err(Error::from_json_error)?;
    let Some(document) = document else {
        return Err(Error::new("no configuration data"));
    };

    let mut rules = BTreeMap::new();
    for (key, values) in document.configs.unwrap_or_default() {
        if key.is_empty() {
            log::warn!("ignoring rule with an empty key");
            continue;
        }
        let total = values.len();
        let values: Vec<String> = values.into_iter().flatten().collect();
        if values.len() < total {
            log::warn!("ignoring null values for key {key:?}");
        }
        if !values.is_empty() {
            rules.insert(key, values);
        }
    }
    Ok((!rules.is_empty()).then_some(rules))
}

fn reload(shared: &Weak<Shared>) {
    if let Some(shared) = shared.upgrade() {
        shared.reload();
    }
}

impl Filter for MutableThreadContextMapFilter {
    fn filter(&self, record: &Record) -> FilterResult {
        let rules = self.shared.rules.load();
        match rules.as_deref() {
            Some(rules) => rules.filter(record),
            None => FilterResult::Neutral,
        }
    }

    fn on_match(&self) -> FilterResult {
        self.common.on_match
    }

    fn on_mismatch(&self) -> FilterResult {
        self.common.on_mismatch
    }

    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_none() {
            let source = self.source();
            match self.scheduler.as_ref().filter(|_| self.poll_interval > 0) {
                Some(scheduler) => {
                    let shared = Arc::downgrade(&self.shared);
                    let scheduled = scheduler.schedule_with_fixed_delay(
                        Duration::ZERO,
                        Duration::from_secs(self.poll_interval),
                        move || reload(&shared),
                    );
                    match scheduled {
                        Ok(scheduled) => {
                            log::debug!(
                                "watching {source} with poll interval {}s",
                                self.poll_interval
                            );
                            *task = Some(scheduled);
                        }
                        Err(err) => {
                            log::error!("failed to schedule reloads of {source}: {err}");
                            self.shared.reload();
                        }
                    }
                }
                None => {
                    self.shared.reload();
                }
            }
        }
        drop(task);
        self.common.start();
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.cancel();
        }
        self.common.stop();
    }

    fn state(&self) -> LifeCycleState {
        self.common.state()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A builder for [`MutableThreadContextMapFilter`].
#[derive(Debug)]
pub struct MutableThreadContextMapFilterBuilder {
    config_location: Option<String>,
    poll_interval: u64,
    scheduler: Option<Arc<ConfigurationScheduler>>,
    on_match: FilterResult,
    on_mismatch: FilterResult,
}

impl Default for MutableThreadContextMapFilterBuilder {
    fn default() -> Self {
        MutableThreadContextMapFilterBuilder {
            config_location: None,
            poll_interval: 0,
            scheduler: None,
            on_match: FilterResult::Neutral,
            on_mismatch: FilterResult::Deny,
        }
    }
}

impl MutableThreadContextMapFilterBuilder {
    /// Set the file path or HTTP(S) URL of the rules document.
    pub fn config_location(mut self, location: impl Into<String>) -> Self {
        self.config_location = Some(location.into());
        self
    }

    /// Set the reload interval in seconds. Zero loads the rules once on start.
    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval = seconds;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<ConfigurationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
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

    /// Build the filter. Returns `None` when no location is configured, or when polling is
    /// requested without a scheduler.
    ///
    /// A positive poll interval announces one scheduled item on the scheduler.
    pub fn build(self) -> Option<MutableThreadContextMapFilter> {
        let Some(location) = self.config_location.filter(|l| !l.trim().is_empty()) else {
            log::error!("a configuration location must be provided for MutableThreadContextMapFilter");
            return None;
        };
        if self.poll_interval > 0 {
            let Some(scheduler) = self.scheduler.as_ref() else {
                log::error!("MutableThreadContextMapFilter requires a scheduler to poll {location}");
                return None;
            };
            scheduler.increment_scheduled_items();
        }

        Some(MutableThreadContextMapFilter {
            shared: Arc::new(Shared {
                resource: Resource::new(Source::parse(&location)),
                rules: ArcSwapOption::empty(),
                listeners: Mutex::default(),
                on_match: self.on_match,
                on_mismatch: self.on_mismatch,
            }),
            poll_interval: self.poll_interval,
            scheduler: self.scheduler,
            task: Mutex::default(),
            common: FilterCommon::new(self.on_match, self.on_mismatch),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::fs::File;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::SystemTime;

    use super::*;
    use crate::Level;

    fn evaluate(filter: &MutableThreadContextMapFilter, key: &str, value: &str) -> FilterResult {
        let context = BTreeMap::from([(key.to_string(), value.to_string())]);
        filter.filter(&Record::builder().level(Level::Info).context(&context).build())
    }

    fn write_at(path: &std::path::Path, content: &str, age_secs: u64) {
        fs::write(path, content).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_reload_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let filter = MutableThreadContextMapFilter::builder()
            .config_location(path.to_string_lossy())
            .on_match(FilterResult::Accept)
            .build()
            .unwrap();
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        filter.register_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(filter.reload(), LoadStatus::NotFound);
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(evaluate(&filter, "loginId", "alice"), FilterResult::Neutral);

        write_at(&path, r#"{"configs": {"loginId": ["alice", null]}}"#, 60);
        assert_eq!(filter.reload(), LoadStatus::Success);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(evaluate(&filter, "loginId", "alice"), FilterResult::Accept);
        assert_eq!(evaluate(&filter, "loginId", "bob"), FilterResult::Deny);
        assert_eq!(filter.reload(), LoadStatus::NotModified);

        write_at(&path, "not json", 50);
        assert_eq!(filter.reload(), LoadStatus::Error);
        assert!(filter.rules().is_some());

        write_at(&path, r#"{"configs": {}}"#, 40);
        assert_eq!(filter.reload(), LoadStatus::Empty);
        assert!(filter.rules().is_none());
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        write_at(&path, r#"{"configs": {"loginId": ["bob"]}}"#, 30);
        assert_eq!(filter.reload(), LoadStatus::Success);
        fs::remove_file(&path).unwrap();
        assert_eq!(filter.reload(), LoadStatus::NotFound);
        assert!(filter.rules().is_none());
        assert_eq!(updates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_start_without_polling_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        write_at(&path, r#"{"configs": {"user": ["root"]}}"#, 60);

        let filter = MutableThreadContextMapFilter::builder()
            .config_location(format!("file://{}", path.display()))
            .build()
            .unwrap();
        assert!(filter.rules().is_none());
        filter.start();
        assert_eq!(filter.state(), LifeCycleState::Started);
        assert_eq!(evaluate(&filter, "user", "root"), FilterResult::Neutral);
        assert_eq!(evaluate(&filter, "user", "guest"), FilterResult::Deny);
        filter.stop();
    }

    #[test]
    fn test_illegal_configuration() {
        assert!(MutableThreadContextMapFilter::builder().build().is_none());
        assert!(
            MutableThreadContextMapFilter::builder()
                .config_location("/tmp/rules.json")
                .poll_interval(5)
                .build()
                .is_none()
        );

        let scheduler = Arc::new(ConfigurationScheduler::new("test"));
        let filter = MutableThreadContextMapFilter::builder()
            .config_location("/tmp/rules.json")
            .poll_interval(5)
            .scheduler(scheduler.clone())
            .build();
        assert!(filter.is_some());
        assert_eq!(scheduler.scheduled_items(), 1);
    }

    #[test]
    fn test_parse_rules() {
        assert_eq!(parse_rules(br#"{}"#).unwrap(), None);
        assert_eq!(parse_rules(br#"{"configs": {"k": [null]}}"#).unwrap(), None);
        assert!(parse_rules(b"null").is_err());
        assert!(parse_rules(b"").is_err());
        let rules = parse_rules(br#"{"configs": {"k": ["a", "b"], "": ["c"]}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            rules,
            BTreeMap::from([("k".to_string(), vec!["a".to_string(), "b".to_string()])])
        );
    }
}
