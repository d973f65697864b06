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

use std::io;
use std::io::Write;

use crate::Error;
use crate::trap::Trap;

/// A default trap that reports errors through the `log` facade and to standard error.
///
/// Standard error is written on a best-effort basis; with no `log` backend installed the
/// error only reaches standard error.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct DefaultTrap {}

impl Trap for DefaultTrap {
    fn trap(&self, err: &Error) {
        log::error!(target: "logsift", "{err}");
        let _ = writeln!(io::stderr(), "logsift: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use log::Log;
    use log::Metadata;

    use super::*;

    struct Recording(Mutex<Vec<String>>);

    impl Log for Recording {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if record.level() == log::Level::Error {
                let mut lines = self.0.lock().unwrap_or_else(|e| e.into_inner());
                lines.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static RECORDING: Recording = Recording(Mutex::new(Vec::new()));

    #[test]
    fn test_trap_reaches_log() {
        let _ = log::set_logger(&RECORDING);
        log::set_max_level(log::LevelFilter::Error);

        let err = Error::new("watch check failed").with_context("source", "trap-test.json");
        DefaultTrap::default().trap(&err);

        let lines = RECORDING.0.lock().unwrap();
        assert!(
            lines
                .iter()
                .any(|line| line.contains("watch check failed") && line.contains("trap-test.json"))
        );
    }
}
