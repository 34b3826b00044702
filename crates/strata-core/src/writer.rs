//! Serialize streams and files back to layer text.

use std::fmt::Write as _;

use crate::file::ConfigFile;
use crate::stream::CommandStream;
use crate::value::ValueOp;

/// First line of every persisted saved layer.
pub const DIFF_METADATA: &str = ";METADATA=(Diff=true, UseCommands=true)";

/// Whether `value` would not survive a parse round trip unquoted.
pub fn should_quote(value: &str) -> bool {
    let starts_or_ends_blank = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    starts_or_ends_blank
        || value.starts_with('"')
        || value.ends_with('\\')
        || value.contains(['\n', '\r'])
}

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// `<sigil><key>=<value>` without a line terminator.
pub fn format_line(op: ValueOp, key: &str, value: &str) -> String {
    let mut line = String::new();
    if let Some(sigil) = op.sigil() {
        line.push(sigil);
    }
    line.push_str(key);
    line.push('=');
    if should_quote(value) {
        line.push('"');
        line.push_str(&escape(value));
        line.push('"');
    } else {
        line.push_str(value);
    }
    line
}

/// Write a stream's commands, grouped by section in first-appearance order.
pub fn write_stream(stream: &CommandStream) -> String {
    let mut order: Vec<&str> = Vec::new();
    for command in stream.commands() {
        if !order.contains(&command.section.as_str()) {
            order.push(&command.section);
        }
    }

    let mut out = String::new();
    for section in order {
        let _ = writeln!(out, "[{section}]");
        for command in stream.commands().iter().filter(|c| c.section == section) {
            let _ = writeln!(
                out,
                "{}",
                format_line(command.op(), &command.key, command.value.raw())
            );
        }
        out.push('\n');
    }
    out
}

/// Write a merged file as a standalone layer that reproduces it when parsed.
pub fn write_file(file: &ConfigFile) -> String {
    let mut out = String::new();
    for section in file.sections() {
        let name = section.name();
        let _ = writeln!(out, "[{name}]");

        let per_object = file.per_object_struct_keys().get(name);
        for (key, field) in section.struct_keys() {
            let op = if per_object.is_some_and(|keys| keys.contains_key(key)) {
                ValueOp::PerObjectStructKeyed
            } else {
                ValueOp::StructKeyed
            };
            let _ = writeln!(out, "{}", format_line(op, key, field));
        }

        for key in section.keys() {
            let values: Vec<_> = section.values(key).collect();
            let op = if values.len() == 1 {
                ValueOp::Set
            } else {
                ValueOp::Append
            };
            for value in values {
                let _ = writeln!(out, "{}", format_line(op, key, value.raw()));
            }
        }
        for key in section.empty_keys() {
            if !section.contains(key) {
                let _ = writeln!(out, "{}", format_line(ValueOp::InitializeToEmpty, key, ""));
            }
        }
        out.push('\n');
    }
    out
}
