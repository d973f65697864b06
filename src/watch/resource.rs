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

//! Conditional loading of a document from a file or an HTTP(S) URL.

use std::fs;
use std::sync::Mutex;
#[cfg(feature = "http")]
use std::time::Duration;

use jiff::Timestamp;

use crate::Error;
use crate::watch::Source;
use crate::watch::file::modified_time;
#[cfg(feature = "http")]
use crate::watch::http::HttpClient;
#[cfg(feature = "http")]
use crate::watch::http::Validators;

/// The outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fetched {
    /// The resource changed; carries the new content.
    Modified(Vec<u8>),
    NotModified,
    NotFound,
}

/// A document that is re-read only when it changed since the previous successful read.
///
/// Files are compared by modification time, which must move forward. HTTP resources use
/// conditional GETs.
#[derive(Debug)]
pub(crate) struct Resource {
    source: Source,
    state: Mutex<ResourceState>,
}

#[derive(Debug, Default)]
struct ResourceState {
    last_modified: Option<Timestamp>,
    #[cfg(feature = "http")]
    client: Option<HttpClient>,
    #[cfg(feature = "http")]
    validators: Validators,
}

impl Resource {
    pub(crate) fn new(source: Source) -> Resource {
        Resource {
            source,
            state: Mutex::default(),
        }
    }

    pub(crate) fn source(&self) -> &Source {
        &self.source
    }

    pub(crate) fn fetch(&self) -> Result<Fetched, Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &self.source {
            Source::File(path) => {
                let Some(modified) = modified_time(path)? else {
                    return Ok(Fetched::NotFound);
                };
                if state.last_modified.is_some_and(|last| modified <= last) {
                    return Ok(Fetched::NotModified);
                }
                let content = fs::read(path).map_err(|err| {
                    Error::from_io_error(err).with_context("path", path.display())
                })?;
                state.last_modified = Some(modified);
                Ok(Fetched::Modified(content))
            }
            Source::Uri(uri) if self.source.is_http() => fetch_http(&mut state, uri),
            Source::Uri(uri) => {
                Err(Error::new("unsupported resource scheme").with_context("uri", uri))
            }
        }
    }
}

#[cfg(feature = "http")]
fn fetch_http(state: &mut ResourceState, uri: &str) -> Result<Fetched, Error> {
    const TIMEOUT: Duration = Duration::from_secs(30);

    let client = match state.client.as_ref() {
        Some(client) => client.clone(),
        None => {
            let client = HttpClient::new(TIMEOUT)?;
            state.client = Some(client.clone());
            client
        }
    };
    let fetched = client.conditional_get(uri, &mut state.validators)?;
    if matches!(fetched, Fetched::Modified(_)) {
        state.last_modified = state.validators.last_modified_time();
    }
    Ok(fetched)
}

#[cfg(not(feature = "http"))]
fn fetch_http(_: &mut ResourceState, uri: &str) -> Result<Fetched, Error> {
    Err(Error::new("http support is not enabled").with_context("uri", uri))
}
