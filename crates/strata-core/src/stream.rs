//! Unmerged, per-layer operation lists.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::error::ParseDiagnostic;
use crate::value::{ConfigValue, ValueOp};

/// One parsed line: `[section]` + `<sigil>key=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub section: String,
    pub key: String,
    pub value: ConfigValue,
}

impl Command {
    pub fn new(section: impl Into<String>, key: impl Into<String>, value: ConfigValue) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            value,
        }
    }

    pub fn op(&self) -> ValueOp {
        self.value.op()
    }
}

/// Identity of the text a stream was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayerSource {
    /// File path or synthetic name (for string layers).
    pub name: String,
    /// Hex SHA-256 of the source text.
    pub content_hash: String,
}

impl LayerSource {
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            content_hash: format!("{:x}", Sha256::digest(text.as_bytes())),
        }
    }
}

/// The ordered operations of one layer, exactly as parsed.
///
/// A stream is never merged with another stream; merging happens only when a
/// stream is applied onto a [`crate::ConfigFile`].
#[derive(Debug, Clone, Default)]
pub struct CommandStream {
    pub source: LayerSource,
    pub priority: u16,
    /// Lifecycle tag (e.g. a plugin name) used for bulk removal.
    pub tag: Option<String>,
    commands: Vec<Command>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl CommandStream {
    pub fn new(source: LayerSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: Option<String>, priority: u16) -> Self {
        self.tag = tag;
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn emplace(&mut self, section: &str, key: &str, raw: &str, op: ValueOp) {
        self.commands
            .push(Command::new(section, key, ConfigValue::new(raw, op)));
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Distinct section names touched by this stream.
    pub fn section_names(&self) -> BTreeSet<&str> {
        self.commands.iter().map(|c| c.section.as_str()).collect()
    }

    /// Last `Set` value of `section.key`, ignoring array operations.
    pub fn last_set(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.commands
            .iter()
            .rev()
            .find(|c| c.section == section && c.key == key && c.op() == ValueOp::Set)
            .map(|c| &c.value)
    }

    /// Drop every command for `section.key`. Returns how many were dropped.
    pub fn remove_key(&mut self, section: &str, key: &str) -> usize {
        let before = self.commands.len();
        self.commands
            .retain(|c| !(c.section == section && c.key == key));
        before - self.commands.len()
    }

    pub fn remove_section(&mut self, section: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|c| c.section != section);
        before - self.commands.len()
    }

    /// Keep only commands whose section satisfies `keep`.
    pub fn retain_sections(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.commands.retain(|c| keep(&c.section));
    }
}
