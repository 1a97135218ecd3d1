//! HTTP header collection
//!
//! An ordered association list of (name, value) pairs plus a
//! lowercase-normalized index to the first occurrence of each name. Lookup
//! and removal are case-insensitive without relying on case-insensitive
//! hashing; iteration preserves insertion order.

use super::{header, HttpError, Result, CRLF};
use std::collections::HashMap;
use std::fmt;

/// Ordered, case-insensitively indexed header collection
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
    /// Lowercased name to index of its first entry
    index: HashMap<String, usize>,
}

impl HttpHeaders {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values for the same name
    ///
    /// This is the wire-load path; duplicates are allowed.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let lower = name.to_ascii_lowercase();
        self.entries.push((name, value.into()));
        self.index.entry(lower).or_insert(self.entries.len() - 1);
    }

    /// Replace or remove a header
    ///
    /// `Some(value)` replaces all prior values for the name with the one
    /// given; `None` removes the header entirely.
    pub fn put(&mut self, name: &str, value: Option<&str>) {
        self.remove(name);
        if let Some(value) = value {
            self.add(name, value);
        }
    }

    /// First value for a name, case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&i| self.entries[i].1.as_str())
    }

    /// All values for a name, in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether a name is present
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove all values for a name, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild_index();
        }
        removed
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parsed `Content-Length`, `None` when absent or unparsable
    pub fn content_length(&self) -> Option<u64> {
        self.get(header::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Parse one `Name: Value` line
    pub fn parse_line(line: &str) -> Result<(String, String)> {
        let colon = line
            .find(':')
            .ok_or_else(|| HttpError::Parse(format!("no colon in header: {}", line)))?;
        let name = line[..colon].trim();
        if name.is_empty() {
            return Err(HttpError::Parse("empty header name".to_string()));
        }
        let value = line[colon + 1..].trim();
        Ok((name.to_string(), value.to_string()))
    }

    /// Serialize all entries plus the terminating blank line
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (name, value) in &self.entries {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }
        buf.extend_from_slice(CRLF.as_bytes());
        buf
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, (name, _)) in self.entries.iter().enumerate() {
            self.index.entry(name.to_ascii_lowercase()).or_insert(i);
        }
    }
}

impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = HttpHeaders::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}
