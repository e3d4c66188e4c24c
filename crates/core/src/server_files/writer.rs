use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use super::atomic::write_atomically;
use super::ServerFilesError;

/// Exact content of an accepted license file.
pub const LICENSE_ACCEPTANCE: &str = "eula=true\n";

/// Writes the declarative files the game server reads on startup.
#[derive(Debug, Clone, Default)]
pub struct ServerConfigWriter;

impl ServerConfigWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes the license acceptance file.
    pub fn write_license_acceptance(&self, path: &Path) -> Result<(), ServerFilesError> {
        write_atomically(path, LICENSE_ACCEPTANCE.as_bytes())?;
        info!("License accepted at {:?}", path);
        Ok(())
    }

    /// Writes `overrides` as a properties file.
    ///
    /// Output is sorted by key, so identical inputs produce identical bytes.
    pub fn write_properties(
        &self,
        path: &Path,
        overrides: &BTreeMap<String, String>,
    ) -> Result<(), ServerFilesError> {
        let body = render_properties(overrides);
        write_atomically(path, body.as_bytes())?;
        info!("Wrote {} properties to {:?}", overrides.len(), path);
        Ok(())
    }
}

/// Renders `key=value` lines in key order.
pub fn render_properties(properties: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in properties {
        out.push_str(&escape_key(key));
        out.push('=');
        out.push_str(&escape_value(value));
        out.push('\n');
    }
    out
}

/// Parses a properties file. Later duplicates win.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let (key, value) = split_entry(trimmed);
        properties.insert(unescape(key.trim_end()), unescape(value));
    }
    properties
}

/// Splits at the first unescaped `=` or `:`.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '=' | ':' if !escaped => return (&line[..idx], line[idx + 1..].trim_start()),
            _ => escaped = false,
        }
    }
    (line, "")
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '\\' | '=' | ':' | ' ' | '#' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            // Leading blanks would be eaten by the separator.
            ' ' if idx == 0 => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
