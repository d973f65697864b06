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

//! Logsift decides which log events get through, and notices when the configuration behind
//! those decisions changes.
//!
//! # Overview
//!
//! Two subsystems make up the crate:
//!
//! * [`filter`]: composable, stateful predicates over log records. Every filter answers
//!   [`FilterResult::Accept`], [`FilterResult::Deny`] or [`FilterResult::Neutral`]; a
//!   [`CompositeFilter`] evaluates its members in order until one of them gives a terminal
//!   answer, and a [`Filterable`] container keeps zero, one or many filters in canonical form.
//! * [`watch`] and [`scheduler`]: a [`WatchManager`] polls registered [`Watcher`]s on a shared
//!   [`ConfigurationScheduler`] and notifies listeners when the watched resource changes.
//!
//! # Examples
//!
//! Chain a threshold with a text match:
//!
//! ```
//! use std::sync::Arc;
//!
//! use logsift::Filterable;
//! use logsift::FilterResult;
//! use logsift::Level;
//! use logsift::Message;
//! use logsift::Record;
//! use logsift::filter::StringMatchFilter;
//! use logsift::filter::ThresholdFilter;
//!
//! let mut filterable = Filterable::new();
//! filterable.add_filter(Arc::new(ThresholdFilter::builder().level(Level::Warn).build()));
//! filterable.add_filter(Arc::new(
//!     StringMatchFilter::builder()
//!         .text("disk")
//!         .on_match(FilterResult::Accept)
//!         .build()
//!         .unwrap(),
//! ));
//!
//! let message = Message::text("disk almost full");
//! let record = Record::builder().level(Level::Error).message(&message).build();
//! assert!(!filterable.is_filtered(&record));
//! ```
//!
//! Poll a file and react when it changes:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logsift::ConfigurationScheduler;
//! use logsift::Source;
//! use logsift::WatchManager;
//! use logsift::watch::FileWatcher;
//!
//! let scheduler = Arc::new(ConfigurationScheduler::new("reconfigure"));
//! let manager = WatchManager::new(scheduler.clone());
//! manager.set_interval_seconds(5);
//! scheduler.start();
//! manager.start();
//!
//! let watcher = FileWatcher::new().listener(|source: &Source| {
//!     log::info!("{source} changed, rebuilding filters");
//! });
//! manager.watch(Source::from_path("logsift.json"), Arc::new(watcher))?;
//! # Ok::<(), logsift::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod clock;
pub mod config;
pub mod context;
pub mod filter;
pub mod message;
pub mod record;
pub mod scheduler;
pub mod trap;
pub mod watch;

mod error;
mod lifecycle;
mod marker;

pub use self::clock::Clock;
pub use self::context::ThreadContext;
pub use self::error::Error;
pub use self::filter::CompositeFilter;
pub use self::filter::Filter;
pub use self::filter::FilterResult;
pub use self::filter::Filterable;
pub use self::lifecycle::LifeCycleState;
pub use self::marker::Marker;
pub use self::message::Message;
pub use self::record::Level;
pub use self::record::Record;
pub use self::scheduler::ConfigurationScheduler;
pub use self::trap::Trap;
pub use self::watch::Source;
pub use self::watch::WatchManager;
pub use self::watch::Watcher;
