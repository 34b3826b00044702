//! Line-oriented layer text format.
//!
//! ```text
//! [SectionName]
//! Key=Value          ; Set
//! +Key=Value         ; AddUnique   (. Append, - Remove, ! Clear, ^ InitializeToEmpty)
//! @Key=Id=5,Name=A   ; StructKeyed (* PerObjectStructKeyed)
//! ```

use std::path::Path;

use crate::error::{ConfigError, ParseDiagnostic};
use crate::section::first_field;
use crate::stream::{Command, CommandStream, LayerSource};
use crate::value::{ConfigValue, ValueOp};

/// Parse one layer. Malformed lines are skipped and recorded as diagnostics;
/// the rest of the stream is unaffected.
pub fn parse_stream(name: &str, text: &str) -> CommandStream {
    let mut stream = CommandStream::new(LayerSource::from_text(name, text));
    let mut section: Option<String> = None;

    for (line_no, line) in logical_lines(text) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with("//") {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
            let name = line[1..line.len() - 1].trim();
            if name.is_empty() {
                report(&mut stream, line_no, "empty section name".into());
                section = None;
            } else {
                section = Some(name.to_string());
            }
            continue;
        }

        let Some(current) = section.as_deref() else {
            report(&mut stream, line_no, "data line outside of any section".into());
            continue;
        };

        match parse_data_line(line) {
            Ok((key, value)) => stream.push(Command::new(current, key, value)),
            Err(reason) => report(&mut stream, line_no, reason),
        }
    }

    stream
}

/// Read and parse a layer from disk. A missing file is not an error.
pub fn read_stream(path: &Path) -> Result<Option<CommandStream>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(parse_stream(&path.to_string_lossy(), &text))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "layer not present, skipping");
            Ok(None)
        }
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

fn report(stream: &mut CommandStream, line: usize, reason: String) {
    tracing::warn!(source = %stream.name(), line, "skipping malformed config line: {reason}");
    stream.push_diagnostic(ParseDiagnostic { line, reason });
}

/// Split a `<sigil><Key>=<Value>` line.
pub fn parse_data_line(line: &str) -> Result<(String, ConfigValue), String> {
    let Some((raw_key, raw_value)) = line.split_once('=') else {
        return Err("missing '=' separator".into());
    };

    let mut key = raw_key.trim();
    key = key.strip_prefix('~').unwrap_or(key);
    let mut op = ValueOp::Set;
    if let Some(first) = key.chars().next()
        && let Some(found) = ValueOp::from_sigil(first)
    {
        op = found;
        key = key[first.len_utf8()..].trim();
    }
    if key.is_empty() {
        return Err("empty key".into());
    }

    let value = unquote(raw_value.trim());

    if matches!(op, ValueOp::StructKeyed | ValueOp::PerObjectStructKeyed) {
        let valid = if value.contains('=') {
            first_field(&value).is_some()
        } else {
            !value.is_empty() && value.chars().all(|c| c.is_alphanumeric() || c == '_')
        };
        if !valid {
            return Err(format!("cannot parse struct identity field for '{key}'"));
        }
    }

    Ok((key.to_string(), ConfigValue::new(value, op)))
}

/// Strip surrounding quotes and resolve escapes. Unquoted text is returned as is.
pub fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"') else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

/// Physical lines joined on a trailing `\`, tagged with their 1-based start line.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, physical) in text.lines().enumerate() {
        let trimmed = physical.trim_end();
        let (content, continues) = match trimmed.strip_suffix('\\') {
            Some(head) if !trimmed.ends_with("\\\\") => (head, true),
            _ => (trimmed, false),
        };
        let entry = pending.get_or_insert_with(|| (idx + 1, String::new()));
        entry.1.push_str(content);
        if !continues && let Some(done) = pending.take() {
            out.push(done);
        }
    }
    if let Some(done) = pending {
        out.push(done);
    }
    out
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
