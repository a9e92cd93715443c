use crate::util::error::ConfigError;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// `key=value` settings read from a configuration file, sorted by key.
///
/// Accepts the usual properties dialect: `#`/`!` comments, `=`, `:` or
/// whitespace as the separator, and a trailing `\` to continue a line. A
/// later duplicate key replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;
        text.parse()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for Properties {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut props = Properties::new();
        let mut pending = String::new();
        let mut pending_line = 0;

        for (idx, raw) in text.lines().enumerate() {
            let line = if pending.is_empty() {
                pending_line = idx + 1;
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed
            } else {
                raw.trim_start()
            };

            if let Some(head) = continued(line) {
                pending.push_str(head);
                continue;
            }
            pending.push_str(line);
            let logical = std::mem::take(&mut pending);
            let (key, value) = split_entry(&logical, pending_line)?;
            props.insert(key, value);
        }

        if !pending.is_empty() {
            let (key, value) = split_entry(&pending, pending_line)?;
            props.insert(key, value);
        }
        Ok(props)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut props = Properties::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

/// Returns the line without its continuation marker when it ends in an odd
/// number of backslashes.
fn continued(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

fn split_entry(line: &str, line_no: usize) -> Result<(String, String), ConfigError> {
    let line = line.trim();
    let mut key = String::new();
    let mut rest = "";
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            key.push(escaped_char(ch));
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => {
                rest = &line[idx + 1..];
                break;
            }
            c if c.is_whitespace() => {
                let tail = line[idx..].trim_start();
                rest = tail
                    .strip_prefix('=')
                    .or_else(|| tail.strip_prefix(':'))
                    .unwrap_or(tail);
                break;
            }
            c => key.push(c),
        }
    }

    if key.is_empty() {
        return Err(ConfigError::Malformed {
            line: line_no,
            reason: format!("missing key in {line:?}"),
        });
    }
    Ok((key, unescape(rest.trim())))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
        } else if let Some(next) = chars.next() {
            out.push(escaped_char(next));
        }
    }
    out
}

fn escaped_char(ch: char) -> char {
    match ch {
        't' => '\t',
        'n' => '\n',
        'r' => '\r',
        'f' => '\u{c}',
        other => other,
    }
}

/// Inverse of the value unescaping applied on read.
pub(crate) fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            other => out.push(other),
        }
    }
    out
}
