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
use std::sync::Mutex;
use std::time::Duration;

use jiff::Timestamp;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header;

use crate::Error;
use crate::watch::Listeners;
use crate::watch::Source;
use crate::watch::WatchListener;
use crate::watch::Watcher;
use crate::watch::resource::Fetched;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache validators echoed back on conditional requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Validators {
    last_modified: Option<String>,
    etag: Option<String>,
}

impl Validators {
    /// The parsed `Last-Modified` value.
    pub(crate) fn last_modified_time(&self) -> Option<Timestamp> {
        let value = self.last_modified.as_deref()?;
        match jiff::fmt::rfc2822::parse(value) {
            Ok(zoned) => Some(zoned.timestamp()),
            Err(err) => {
                log::debug!("ignoring unparseable Last-Modified header {value:?}: {err}");
                None
            }
        }
    }
}

/// A blocking HTTP client issuing conditional GETs.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub(crate) fn new(timeout: Duration) -> Result<HttpClient, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::new("failed to create http client").with_source(err))?;
        Ok(HttpClient { client, timeout })
    }

    /// Fetch `url` unless it is unchanged since `validators`, which are updated on success.
    ///
    /// 200 is a change, 304 is no change and 404 is a missing resource. Any other status is an
    /// error.
    pub(crate) fn conditional_get(
        &self,
        url: &str,
        validators: &mut Validators,
    ) -> Result<Fetched, Error> {
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(last_modified) = validators.last_modified.as_deref() {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }
        if let Some(etag) = validators.etag.as_deref() {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().map_err(|err| {
            Error::new("http request failed")
                .with_context("url", url)
                .with_source(err)
        })?;

        match response.status() {
            StatusCode::OK => {
                let header_value = |name: header::HeaderName| {
                    response
                        .headers()
                        .get(name)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string)
                };
                let next = Validators {
                    last_modified: header_value(header::LAST_MODIFIED),
                    etag: header_value(header::ETAG),
                };
                let body = response.bytes().map_err(|err| {
                    Error::new("failed to read http response")
                        .with_context("url", url)
                        .with_source(err)
                })?;
                *validators = next;
                Ok(Fetched::Modified(body.to_vec()))
            }
            StatusCode::NOT_MODIFIED => Ok(Fetched::NotModified),
            StatusCode::NOT_FOUND => Ok(Fetched::NotFound),
            status => Err(Error::new("unexpected http status")
                .with_context("url", url)
                .with_context("status", status)),
        }
    }
}

/// A [`Watcher`] that polls an HTTP(S) resource with conditional GETs.
///
/// The baseline is the `Last-Modified` and `ETag` of the response seen on registration. A
/// missing resource is not a change; any other unexpected status fails the check and is retried
/// on the next tick.
#[derive(Debug)]
pub struct HttpWatcher {
    timeout: Duration,
    state: Mutex<HttpState>,
    listeners: Listeners,
}

#[derive(Debug, Default)]
struct HttpState {
    url: Option<String>,
    client: Option<HttpClient>,
    validators: Validators,
}

impl Default for HttpWatcher {
    fn default() -> Self {
        HttpWatcher {
            timeout: DEFAULT_TIMEOUT,
            state: Mutex::default(),
            listeners: Listeners::default(),
        }
    }
}

impl HttpWatcher {
    pub fn new() -> HttpWatcher {
        HttpWatcher::default()
    }

    /// Set the timeout of each request. Default to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a listener, builder style.
    pub fn listener(self, listener: impl WatchListener) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn add_listener(&self, listener: impl WatchListener) {
        self.listeners.push(Arc::new(listener));
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HttpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Watcher for HttpWatcher {
    fn watching(&self, source: &Source) -> Result<(), Error> {
        let Some(url) = source.uri().filter(|_| source.is_http()) else {
            return Err(Error::new("http watcher requires an http or https source")
                .with_context("source", source));
        };
        let client = HttpClient::new(self.timeout)?;

        let mut validators = Validators::default();
        match client.conditional_get(url, &mut validators) {
            Ok(Fetched::NotFound) => log::info!("unable to locate {url}, watching for it"),
            Ok(_) => {}
            Err(err) => log::warn!("failed to fetch the initial state of {url}: {err}"),
        }

        let mut state = self.lock_state();
        state.url = Some(url.to_string());
        state.client = Some(client);
        state.validators = validators;
        Ok(())
    }

    fn check_and_reset(&self) -> Result<bool, Error> {
        let mut state = self.lock_state();
        let HttpState {
            url,
            client,
            validators,
        } = &mut *state;
        let (Some(url), Some(client)) = (url.as_deref(), client.as_ref()) else {
            return Err(Error::new("http watcher is not watching any source"));
        };

        match client.conditional_get(url, validators)? {
            Fetched::Modified(_) => Ok(true),
            Fetched::NotModified => Ok(false),
            Fetched::NotFound => {
                log::info!("unable to locate {url}");
                Ok(false)
            }
        }
    }

    fn last_modified(&self) -> Option<Timestamp> {
        self.lock_state().validators.last_modified_time()
    }

    fn modified(&self, source: &Source) {
        self.listeners.notify(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_modified_header() {
        let validators = Validators {
            last_modified: Some("Sun, 06 Nov 1994 08:49:37 GMT".to_string()),
            etag: None,
        };
        assert_eq!(
            validators.last_modified_time(),
            Some("1994-11-06T08:49:37Z".parse().unwrap())
        );

        let garbage = Validators {
            last_modified: Some("yesterday".to_string()),
            etag: None,
        };
        assert_eq!(garbage.last_modified_time(), None);
    }

    #[test]
    fn test_rejects_file_source() {
        let watcher = HttpWatcher::new();
        assert!(watcher.watching(&Source::from_path("/tmp/x")).is_err());
        assert!(watcher.check_and_reset().is_err());
    }
}
