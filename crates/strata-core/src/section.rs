//! Ordered multi-map of keys to values for one `[Section]`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::value::{ConfigValue, ValueOp};

/// One merged section.
///
/// Entries keep insertion order across keys, so an array key interleaved with
/// other keys round-trips exactly. `empty_initialized` distinguishes "array has
/// zero entries" from "array never touched"; `struct_keys` maps an array key to
/// the sub-field that identifies its struct entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Section {
    name: String,
    entries: Vec<(String, ConfigValue)>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    empty_initialized: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    struct_keys: BTreeMap<String, String>,
}

/// Equal when every key holds the same values in the same order. The
/// interleaving of different keys is not significant.
impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.empty_initialized == other.empty_initialized
            && self.struct_keys == other.struct_keys
            && self.by_key() == other.by_key()
    }
}

impl Eq for Section {}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.empty_initialized.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Distinct keys in order of first appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|(k, _)| seen.insert(k.as_str()))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn values<'a, 'k>(
        &'a self,
        key: &'k str,
    ) -> impl Iterator<Item = &'a ConfigValue> + use<'a, 'k> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn first(&self, key: &str) -> Option<&ConfigValue> {
        self.values(key).next()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn is_initialized_empty(&self, key: &str) -> bool {
        self.empty_initialized.contains(key)
    }

    /// Keys marked present-but-empty.
    pub fn empty_keys(&self) -> impl Iterator<Item = &str> {
        self.empty_initialized.iter().map(String::as_str)
    }

    pub fn struct_key(&self, key: &str) -> Option<&str> {
        self.struct_keys.get(key).map(String::as_str)
    }

    pub fn struct_keys(&self) -> &BTreeMap<String, String> {
        &self.struct_keys
    }

    pub fn declare_struct_key(&mut self, key: &str, field: &str) {
        self.struct_keys.insert(key.to_string(), field.to_string());
    }

    /// Replace all values of `key` with `value`, keeping the position of the
    /// first existing entry.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        if self.try_replace_struct(key, &value) {
            return;
        }
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut idx = 0;
                self.entries.retain(|(k, _)| {
                    let keep = idx <= first || k != key;
                    idx += 1;
                    keep
                });
            }
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn append(&mut self, key: &str, value: ConfigValue) {
        if !self.try_replace_struct(key, &value) {
            self.entries.push((key.to_string(), value));
        }
    }

    /// Returns false when an equal value was already present.
    pub fn add_unique(&mut self, key: &str, value: ConfigValue) -> bool {
        if self.try_replace_struct(key, &value) {
            return true;
        }
        if self.values(key).any(|v| *v == value) {
            return false;
        }
        self.entries.push((key.to_string(), value));
        true
    }

    /// Delete every value of `key` equal to `value`. Returns how many were removed.
    pub fn remove_value(&mut self, key: &str, value: &ConfigValue) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, v)| !(k == key && v == value));
        before - self.entries.len()
    }

    /// Unset `key`: drop every value and any empty-initialization marker.
    pub fn clear_key(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        let had_marker = self.empty_initialized.remove(key);
        before != self.entries.len() || had_marker
    }

    pub fn initialize_to_empty(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.empty_initialized.insert(key.to_string());
    }

    /// Handle an `@Key=...` line.
    ///
    /// A value without `=` declares the identity field for `key`. A struct
    /// literal replaces the entry with the same identity in place, or appends.
    pub fn apply_struct_keyed(&mut self, key: &str, value: ConfigValue) -> Result<(), String> {
        let raw = value.raw().trim();
        if !raw.contains('=') {
            if !is_field_name(raw) {
                return Err(format!("invalid struct identity field {raw:?} for key '{key}'"));
            }
            self.declare_struct_key(key, raw);
            return Ok(());
        }
        let field = match self.struct_keys.get(key) {
            Some(field) => field.clone(),
            None => {
                let field = first_field(raw)
                    .ok_or_else(|| format!("struct literal for '{key}' has no field name"))?;
                self.declare_struct_key(key, &field);
                field
            }
        };
        if extract_field(raw, &field).is_none() {
            return Err(format!(
                "struct literal for '{key}' is missing identity field '{field}'"
            ));
        }
        if !self.try_replace_struct(key, &value) {
            self.entries.push((key.to_string(), value));
        }
        Ok(())
    }

    /// Apply one operation. Per-object declarations are resolved by the owning
    /// file before reaching here, so both struct-keyed variants behave alike.
    pub fn apply(&mut self, op: ValueOp, key: &str, value: ConfigValue) -> Result<(), String> {
        match op {
            ValueOp::Set => self.set(key, value),
            ValueOp::Append => self.append(key, value),
            ValueOp::AddUnique => {
                self.add_unique(key, value);
            }
            ValueOp::Remove => {
                self.remove_value(key, &value);
            }
            ValueOp::Clear => {
                self.clear_key(key);
            }
            ValueOp::InitializeToEmpty => self.initialize_to_empty(key),
            ValueOp::StructKeyed | ValueOp::PerObjectStructKeyed => {
                return self.apply_struct_keyed(key, value);
            }
        }
        Ok(())
    }

    /// Replace every value of `key`, keeping the position of its first entry.
    pub fn replace_values(&mut self, key: &str, values: Vec<ConfigValue>) {
        self.empty_initialized.remove(key);
        let at = self.entries.iter().position(|(k, _)| k == key);
        self.entries.retain(|(k, _)| k != key);
        let at = at.unwrap_or(self.entries.len());
        self.entries
            .splice(at..at, values.into_iter().map(|v| (key.to_string(), v)));
    }

    fn by_key(&self) -> BTreeMap<&str, Vec<&ConfigValue>> {
        let mut grouped: BTreeMap<&str, Vec<&ConfigValue>> = BTreeMap::new();
        for (k, v) in &self.entries {
            grouped.entry(k.as_str()).or_default().push(v);
        }
        grouped
    }

    /// If `key` has a declared identity field and `value` carries it, overwrite
    /// the entry with the same identity without reordering.
    fn try_replace_struct(&mut self, key: &str, value: &ConfigValue) -> bool {
        let Some(field) = self.struct_keys.get(key) else {
            return false;
        };
        let Some(identity) = extract_field(value.raw(), field) else {
            return false;
        };
        let existing = self.entries.iter_mut().find(|(k, v)| {
            k == key && extract_field(v.raw(), field).as_deref() == Some(identity.as_str())
        });
        match existing {
            Some((_, slot)) => {
                *slot = value.clone();
                true
            }
            None => false,
        }
    }
}

fn is_field_name(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Name of the first `Field=` in a struct literal such as `(Id=5,Name=A)`.
pub fn first_field(literal: &str) -> Option<String> {
    let body = literal.trim().trim_start_matches('(');
    let (name, _) = body.split_once('=')?;
    let name = name.trim();
    is_field_name(name).then(|| name.to_string())
}

/// Value of `field` inside a struct literal. Quoted values run to the closing
/// quote; bare values run to the next `,` or `)`.
pub fn extract_field(literal: &str, field: &str) -> Option<String> {
    for (start, _) in literal.match_indices(field) {
        let after = start + field.len();
        let at_boundary = literal[..start]
            .chars()
            .next_back()
            .is_none_or(|c| c == '(' || c == ',' || c.is_whitespace());
        if !at_boundary || !literal[after..].starts_with('=') {
            continue;
        }
        let rest = &literal[after + 1..];
        let token = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next().unwrap_or_default()
        } else {
            rest.split([',', ')']).next().unwrap_or_default().trim()
        };
        return (!token.is_empty()).then(|| token.to_string());
    }
    None
}

#[cfg(test)]
#[path = "section_tests.rs"]
mod tests;
