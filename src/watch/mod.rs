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

//! Watching configuration resources for changes.
//!
//! A [`WatchManager`] owns a registry of [`Source`] / [`Watcher`] pairs and polls them on a
//! [`ConfigurationScheduler`](crate::ConfigurationScheduler). Watchers compare the resource
//! against a baseline captured on registration and notify their listeners once per change.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use jiff::Timestamp;

use crate::Error;

pub use self::file::FileWatcher;
#[cfg(feature = "http")]
pub use self::http::HttpWatcher;
pub use self::manager::WatchManager;
pub use self::manager::WatchManagerBuilder;

mod file;
#[cfg(feature = "http")]
mod http;
mod manager;
pub(crate) mod resource;

/// The location of a watched resource: a file path or a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    File(PathBuf),
    Uri(String),
}

impl Source {
    pub fn from_path(path: impl Into<PathBuf>) -> Source {
        Source::File(path.into())
    }

    pub fn from_uri(uri: impl Into<String>) -> Source {
        Source::Uri(uri.into())
    }

    /// Interpret a configured location.
    ///
    /// `file:` URIs and strings without a scheme become file sources; anything else is kept as
    /// a URI.
    pub fn parse(location: &str) -> Source {
        let location = location.trim();
        if let Some(path) = location.strip_prefix("file://") {
            return Source::from_path(path);
        }
        if let Some(path) = location.strip_prefix("file:") {
            return Source::from_path(path);
        }
        match location.split_once("://") {
            Some((scheme, _))
                if !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
            {
                Source::from_uri(location)
            }
            _ => Source::from_path(location),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Source::File(path) => Some(path),
            Source::Uri(_) => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Source::File(_) => None,
            Source::Uri(uri) => Some(uri),
        }
    }

    /// Whether this is an `http` or `https` URI.
    pub fn is_http(&self) -> bool {
        self.uri().is_some_and(|uri| {
            let lower = uri.to_ascii_lowercase();
            lower.starts_with("http://") || lower.starts_with("https://")
        })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Detects changes to one resource.
///
/// The [`WatchManager`] calls [`watching`](Watcher::watching) once on registration, then
/// [`check_and_reset`](Watcher::check_and_reset) on every tick, and
/// [`modified`](Watcher::modified) once for each change it reports.
pub trait Watcher: fmt::Debug + Send + Sync + 'static {
    /// Bind the watcher to `source` and capture the baseline.
    fn watching(&self, source: &Source) -> Result<(), Error>;

    /// Returns true if the resource changed since the baseline. The observed state becomes the
    /// new baseline.
    fn check_and_reset(&self) -> Result<bool, Error>;

    /// The modification time of the current baseline, if known.
    fn last_modified(&self) -> Option<Timestamp>;

    /// Notify the listeners that `source` changed.
    fn modified(&self, source: &Source);
}

/// Receives change notifications from a [`Watcher`].
pub trait WatchListener: Send + Sync + 'static {
    fn on_change(&self, source: &Source);
}

impl<F> WatchListener for F
where
    F: Fn(&Source) + Send + Sync + 'static,
{
    fn on_change(&self, source: &Source) {
        self(source)
    }
}

/// The listeners registered on a watcher.
#[derive(Default)]
pub(crate) struct Listeners(Mutex<Vec<Arc<dyn WatchListener>>>);

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.snapshot().len())
            .finish()
    }
}

impl Listeners {
    pub(crate) fn push(&self, listener: Arc<dyn WatchListener>) {
        let mut listeners = self.0.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push(listener);
    }

    pub(crate) fn notify(&self, source: &Source) {
        for listener in self.snapshot() {
            listener.on_change(source);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn WatchListener>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
