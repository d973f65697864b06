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

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use jiff::Timestamp;

use crate::Error;
use crate::watch::Listeners;
use crate::watch::Source;
use crate::watch::WatchListener;
use crate::watch::Watcher;

/// A [`Watcher`] that compares the modification time of a local file.
///
/// Any difference from the baseline counts as a change, including the file disappearing or
/// reappearing.
#[derive(Debug, Default)]
pub struct FileWatcher {
    state: Mutex<FileState>,
    listeners: Listeners,
}

#[derive(Debug, Default)]
struct FileState {
    path: Option<PathBuf>,
    last_modified: Option<Timestamp>,
}

impl FileWatcher {
    pub fn new() -> FileWatcher {
        FileWatcher::default()
    }

    /// Add a listener, builder style.
    pub fn listener(self, listener: impl WatchListener) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn add_listener(&self, listener: impl WatchListener) {
        self.listeners.push(Arc::new(listener));
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Watcher for FileWatcher {
    fn watching(&self, source: &Source) -> Result<(), Error> {
        let Some(path) = source.path() else {
            return Err(Error::new("file watcher requires a file source")
                .with_context("source", source));
        };
        let last_modified = modified_time(path)?;
        let mut state = self.lock_state();
        state.path = Some(path.to_path_buf());
        state.last_modified = last_modified;
        Ok(())
    }

    fn check_and_reset(&self) -> Result<bool, Error> {
        let mut state = self.lock_state();
        let Some(path) = state.path.as_ref() else {
            return Err(Error::new("file watcher is not watching any source"));
        };
        let current = modified_time(path)?;
        if current == state.last_modified {
            return Ok(false);
        }
        state.last_modified = current;
        Ok(true)
    }

    fn last_modified(&self) -> Option<Timestamp> {
        self.lock_state().last_modified
    }

    fn modified(&self, source: &Source) {
        self.listeners.notify(source);
    }
}

/// The modification time of `path`, or `None` if it does not exist.
pub(crate) fn modified_time(path: &Path) -> Result<Option<Timestamp>, Error> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::from_io_error(err).with_context("path", path.display())),
    };
    let modified = metadata
        .modified()
        .map_err(|err| Error::from_io_error(err).with_context("path", path.display()))?;
    let modified = Timestamp::try_from(modified).map_err(|err| {
        Error::new("modification time out of range")
            .with_context("path", path.display())
            .with_source(err)
    })?;
    Ok(Some(modified))
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;
    use std::time::SystemTime;

    use super::*;

    fn touch(path: &Path, at: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(at).unwrap();
    }

    #[test]
    fn test_detects_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        fs::write(&path, "{}").unwrap();
        let base = SystemTime::now() - Duration::from_secs(60);
        touch(&path, base);

        let watcher = FileWatcher::new();
        watcher.watching(&Source::from_path(&path)).unwrap();
        assert_eq!(
            watcher.last_modified(),
            Some(Timestamp::try_from(base).unwrap())
        );
        assert!(!watcher.check_and_reset().unwrap());

        touch(&path, base + Duration::from_secs(10));
        assert!(watcher.check_and_reset().unwrap());
        assert!(!watcher.check_and_reset().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.json");

        let watcher = FileWatcher::new();
        watcher.watching(&Source::from_path(&path)).unwrap();
        assert_eq!(watcher.last_modified(), None);
        assert!(!watcher.check_and_reset().unwrap());

        fs::write(&path, "{}").unwrap();
        assert!(watcher.check_and_reset().unwrap());

        fs::remove_file(&path).unwrap();
        assert!(watcher.check_and_reset().unwrap());
        assert_eq!(watcher.last_modified(), None);
    }

    #[test]
    fn test_rejects_uri_and_unbound() {
        let watcher = FileWatcher::new();
        assert!(watcher.check_and_reset().is_err());
        assert!(
            watcher
                .watching(&Source::from_uri("http://localhost/x"))
                .is_err()
        );
    }
}
