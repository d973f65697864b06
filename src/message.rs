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

//! Message payloads.

use std::collections::BTreeMap;
use std::fmt;

/// The payload of a log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Plain text.
    Text(String),
    /// A format string with `{}` placeholders and the arguments to substitute.
    Parameterized {
        /// The raw format string.
        format: String,
        /// The rendered arguments, in placeholder order.
        args: Vec<String>,
    },
    /// An RFC 5424 structured-data message.
    Structured(StructuredData),
}

impl Message {
    /// Create a plain text message.
    pub fn text(text: impl Into<String>) -> Message {
        Message::Text(text.into())
    }

    /// Create a parameterized message.
    ///
    /// ```
    /// use logsift::Message;
    ///
    /// let message = Message::parameterized("user {} logged in from {}", ["alice", "10.0.0.1"]);
    /// assert_eq!(message.format(), "user {} logged in from {}");
    /// assert_eq!(message.formatted(), "user alice logged in from 10.0.0.1");
    /// ```
    pub fn parameterized<I, S>(format: impl Into<String>, args: I) -> Message
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Message::Parameterized {
            format: format.into(),
            args: args.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The unformatted form: the format string of a parameterized message, the free-text
    /// part of a structured one, or the text itself.
    pub fn format(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Parameterized { format, .. } => format,
            Message::Structured(data) => data.message(),
        }
    }

    /// The rendered message.
    pub fn formatted(&self) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Parameterized { format, args } => substitute(format, args),
            Message::Structured(data) => data.to_string(),
        }
    }

    /// Whether [`format`](Self::format) differs from [`formatted`](Self::formatted) for this
    /// kind of message.
    pub fn has_raw_format(&self) -> bool {
        !matches!(self, Message::Text(_))
    }

    /// The structured data, if this is a structured message.
    pub fn as_structured(&self) -> Option<&StructuredData> {
        match self {
            Message::Structured(data) => Some(data),
            _ => None,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<StructuredData> for Message {
    fn from(data: StructuredData) -> Self {
        Message::Structured(data)
    }
}

// Replaces each `{}` with the next argument. Missing arguments leave the placeholder as-is,
// extra arguments are dropped, and `\{}` escapes a placeholder.
fn substitute(format: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;
    while let Some(pos) = rest.find("{}") {
        let (head, tail) = rest.split_at(pos);
        if let Some(stripped) = head.strip_suffix('\\') {
            out.push_str(stripped);
            out.push_str("{}");
        } else {
            out.push_str(head);
            match args.next() {
                Some(arg) => out.push_str(arg),
                None => out.push_str("{}"),
            }
        }
        rest = &tail[2..];
    }
    out.push_str(rest);
    out
}

/// An RFC 5424 structured-data element with an optional free-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredData {
    id: String,
    kind: String,
    message: String,
    data: BTreeMap<String, String>,
}

impl StructuredData {
    /// Create structured data with the given SD-ID (for example `RequestAudit@18060`),
    /// message text and type.
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        kind: impl Into<String>,
    ) -> StructuredData {
        StructuredData {
            id: id.into(),
            kind: kind.into(),
            message: message.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add one parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// The full SD-ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The SD-ID without its enterprise number.
    pub fn id_name(&self) -> &str {
        match self.id.split_once('@') {
            Some((name, _)) => name,
            None => &self.id,
        }
    }

    /// The message type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The free-text part.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The parameters.
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Look up one parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

impl fmt::Display for StructuredData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.kind, self.id)?;
        for (key, value) in self.data.iter() {
            write!(f, " {key}=\"")?;
            for c in value.chars() {
                if matches!(c, '"' | '\\' | ']') {
                    write!(f, "\\")?;
                }
                write!(f, "{c}")?;
            }
            write!(f, "\"")?;
        }
        write!(f, "]")?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute() {
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(substitute("{} and {}", &args), "a and b");
        assert_eq!(substitute("{} {} {}", &args), "a b {}");
        assert_eq!(substitute("no placeholders", &args), "no placeholders");
        assert_eq!(substitute("\\{} {}", &args), "{} a");
    }

    #[test]
    fn test_structured_rendering() {
        let data = StructuredData::new("Audit@18060", "Transfer complete", "Transfer")
            .with("toAccount", "123456")
            .with("memo", "say \"hi\"");
        assert_eq!(data.id_name(), "Audit");
        assert_eq!(
            data.to_string(),
            r#"Transfer [Audit@18060 memo="say \"hi\"" toAccount="123456"] Transfer complete"#
        );

        let message = Message::from(data);
        assert_eq!(message.format(), "Transfer complete");
        assert!(message.has_raw_format());
        assert!(message.as_structured().is_some());
    }
}
