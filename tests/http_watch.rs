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

#![cfg(feature = "http")]

use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::Mutex;

use logsift::Filter;
use logsift::FilterResult;
use logsift::Level;
use logsift::Record;
use logsift::Source;
use logsift::Watcher;
use logsift::filter::LoadStatus;
use logsift::filter::MutableThreadContextMapFilter;
use logsift::watch::HttpWatcher;

/// What the test server answers.
#[derive(Debug, Clone)]
struct Document {
    status: u16,
    version: u32,
    body: String,
}

impl Document {
    fn last_modified(&self) -> String {
        format!("Sun, 06 Nov 1994 08:{:02}:00 GMT", self.version % 60)
    }
}

/// A single-threaded HTTP/1.1 server honoring `If-Modified-Since`.
struct TestServer {
    url: String,
    document: Arc<Mutex<Document>>,
}

impl TestServer {
    fn start(body: &str) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/rules.json", listener.local_addr().unwrap());
        let document = Arc::new(Mutex::new(Document {
            status: 200,
            version: 1,
            body: body.to_string(),
        }));

        let shared = document.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let document = shared.lock().unwrap().clone();
                respond(stream, &document);
            }
        });
        TestServer { url, document }
    }

    fn update(&self, f: impl FnOnce(&mut Document)) {
        f(&mut self.document.lock().unwrap());
    }
}

fn respond(mut stream: TcpStream, document: &Document) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&request).to_ascii_lowercase();
    let if_modified_since = request
        .lines()
        .find_map(|line| line.strip_prefix("if-modified-since:"))
        .map(|value| value.trim().to_string());

    let last_modified = document.last_modified();
    let response = if document.status != 200 {
        format!(
            "HTTP/1.1 {} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            document.status
        )
    } else if if_modified_since.as_deref() == Some(last_modified.to_ascii_lowercase().as_str()) {
        "HTTP/1.1 304 Not Modified\r\nconnection: close\r\n\r\n".to_string()
    } else {
        format!(
            "HTTP/1.1 200 OK\r\nlast-modified: {last_modified}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            document.body.len(),
            document.body
        )
    };
    let _ = stream.write_all(response.as_bytes());
}

#[test]
fn test_http_watcher_conditional_get() {
    let server = TestServer::start("{}");
    let source = Source::from_uri(server.url.clone());
    let watcher = HttpWatcher::new();
    watcher.watching(&source).unwrap();
    assert_eq!(
        watcher.last_modified(),
        Some("1994-11-06T08:01:00Z".parse().unwrap())
    );
    assert!(!watcher.check_and_reset().unwrap());

    server.update(|doc| doc.version = 2);
    assert!(watcher.check_and_reset().unwrap());
    assert!(!watcher.check_and_reset().unwrap());

    server.update(|doc| doc.status = 404);
    assert!(!watcher.check_and_reset().unwrap());

    server.update(|doc| doc.status = 500);
    assert!(watcher.check_and_reset().is_err());

    server.update(|doc| doc.status = 200);
    assert!(!watcher.check_and_reset().unwrap());
}

#[test]
fn test_mutable_filter_over_http() {
    let server = TestServer::start(r#"{"configs": {"loginId": ["alice"]}}"#);
    let filter = MutableThreadContextMapFilter::builder()
        .config_location(server.url.clone())
        .on_match(FilterResult::Accept)
        .build()
        .unwrap();

    assert_eq!(filter.reload(), LoadStatus::Success);
    assert_eq!(filter.reload(), LoadStatus::NotModified);

    let context = [("loginId".to_string(), "alice".to_string())].into();
    let record = Record::builder().level(Level::Debug).context(&context).build();
    assert_eq!(filter.filter(&record), FilterResult::Accept);

    server.update(|doc| {
        doc.version = 2;
        doc.body = r#"{"configs": {"loginId": ["bob"]}}"#.to_string();
    });
    assert_eq!(filter.reload(), LoadStatus::Success);
    assert_eq!(filter.filter(&record), FilterResult::Deny);

    server.update(|doc| doc.status = 404);
    assert_eq!(filter.reload(), LoadStatus::NotFound);
    assert_eq!(filter.filter(&record), FilterResult::Neutral);

    server.update(|doc| doc.status = 503);
    assert_eq!(filter.reload(), LoadStatus::Error);
}
