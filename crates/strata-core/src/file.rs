//! Merged configuration for one logical name.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::section::Section;
use crate::stream::CommandStream;
use crate::value::{ConfigValue, ValueOp};

/// The merged result of applying command streams in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigFile {
    name: String,
    sections: BTreeMap<String, Section>,
    /// Section-name suffix -> (array key -> identity field), from `*Key=Field`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    per_object_struct_keys: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(skip)]
    pub dirty: bool,
    #[serde(skip)]
    pub no_persist: bool,
    #[serde(skip)]
    pub allow_full_section_save: bool,
}

impl PartialEq for ConfigFile {
    fn eq(&self, other: &Self) -> bool {
        self.sections == other.sections
            && self.per_object_struct_keys == other.per_object_struct_keys
    }
}

impl Eq for ConfigFile {}

impl ConfigFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn per_object_struct_keys(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.per_object_struct_keys
    }

    /// Copy contents (not flags) from `other`.
    pub fn replace_contents(&mut self, other: &ConfigFile) {
        self.sections = other.sections.clone();
        self.per_object_struct_keys = other.per_object_struct_keys.clone();
    }

    /// Apply every command of `stream`, in order.
    pub fn apply_stream(&mut self, stream: &CommandStream) {
        for command in stream.commands() {
            if let Err(reason) =
                self.process_command(&command.section, &command.key, command.value.clone())
            {
                tracing::warn!(
                    source = %stream.name(),
                    section = %command.section,
                    key = %command.key,
                    "skipping config command: {reason}"
                );
            }
        }
    }

    /// Apply a single operation onto the named section.
    pub fn process_command(
        &mut self,
        section: &str,
        key: &str,
        value: ConfigValue,
    ) -> Result<(), String> {
        let op = value.op();
        if op == ValueOp::PerObjectStructKeyed && !value.raw().contains('=') {
            self.declare_per_object_key(section, key, value.raw().trim());
            self.section_entry(section);
            return Ok(());
        }

        let target = self.section_entry(section);
        target.apply(op, key, value)?;

        if op == ValueOp::PerObjectStructKeyed
            && let Some(field) = target.struct_key(key).map(str::to_string)
        {
            self.per_object_struct_keys
                .entry(section.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert(field);
        }
        self.dirty = true;
        Ok(())
    }

    fn declare_per_object_key(&mut self, suffix: &str, key: &str, field: &str) {
        self.per_object_struct_keys
            .entry(suffix.to_string())
            .or_default()
            .insert(key.to_string(), field.to_string());
        for (name, section) in self.sections.iter_mut() {
            if name.ends_with(suffix) {
                section.declare_struct_key(key, field);
            }
        }
    }

    /// Find or create a section, seeding per-object identity fields that apply to it.
    fn section_entry(&mut self, name: &str) -> &mut Section {
        let per_object = &self.per_object_struct_keys;
        self.sections.entry(name.to_string()).or_insert_with(|| {
            let mut section = Section::new(name);
            for (suffix, keys) in per_object {
                if name.ends_with(suffix.as_str()) {
                    for (key, field) in keys {
                        section.declare_struct_key(key, field);
                    }
                }
            }
            section
        })
    }

    pub fn remove_section(&mut self, name: &str) -> bool {
        let removed = self.sections.remove(name).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn value(&self, section: &str, key: &str) -> Option<&ConfigValue> {
        self.sections.get(section)?.first(key)
    }

    /// All values of an array key. `Some(empty)` when the key was initialized
    /// to empty, `None` when it was never touched.
    pub fn array(&self, section: &str, key: &str) -> Option<Vec<&ConfigValue>> {
        let section = self.sections.get(section)?;
        let values: Vec<_> = section.values(key).collect();
        (!values.is_empty() || section.is_initialized_empty(key)).then_some(values)
    }

    /// Set a scalar. Returns true when the stored value changed.
    pub fn set_value(&mut self, section: &str, key: &str, raw: &str) -> bool {
        let target = self.section_entry(section);
        let unchanged = target.values(key).count() == 1
            && target.first(key).is_some_and(|v| v.raw() == raw);
        if unchanged {
            return false;
        }
        target.set(key, ConfigValue::set(raw));
        self.dirty = true;
        true
    }

    /// Replace an array wholesale.
    pub fn set_array(&mut self, section: &str, key: &str, values: &[String]) -> bool {
        let target = self.section_entry(section);
        let current: Vec<&str> = target.values(key).map(ConfigValue::raw).collect();
        let unchanged = current == values.iter().map(String::as_str).collect::<Vec<_>>()
            && (!values.is_empty() || target.is_initialized_empty(key));
        if unchanged {
            return false;
        }
        if values.is_empty() {
            target.initialize_to_empty(key);
        } else {
            let values = values
                .iter()
                .map(|v| ConfigValue::new(v.as_str(), ValueOp::Append))
                .collect();
            target.replace_values(key, values);
        }
        self.dirty = true;
        true
    }

    pub fn add_to_section(&mut self, section: &str, key: &str, raw: &str) -> bool {
        self.section_entry(section)
            .append(key, ConfigValue::new(raw, ValueOp::Append));
        self.dirty = true;
        true
    }

    pub fn add_unique_to_section(&mut self, section: &str, key: &str, raw: &str) -> bool {
        let added = self
            .section_entry(section)
            .add_unique(key, ConfigValue::new(raw, ValueOp::AddUnique));
        self.dirty |= added;
        added
    }

    pub fn remove_key_from_section(&mut self, section: &str, key: &str) -> bool {
        let Some(target) = self.sections.get_mut(section) else {
            return false;
        };
        if !target.contains(key) {
            return false;
        }
        target.clear_key(key);
        self.dirty = true;
        true
    }

    pub fn remove_from_section(&mut self, section: &str, key: &str, raw: &str) -> bool {
        let Some(target) = self.sections.get_mut(section) else {
            return false;
        };
        let removed = target.remove_value(key, &ConfigValue::set(raw)) > 0;
        self.dirty |= removed;
        removed
    }

    /// Replace one key's state with whatever `source` holds for it.
    pub fn copy_key_from(&mut self, source: &ConfigFile, section: &str, key: &str) {
        let src = source.section(section);
        let target = self.section_entry(section);
        let values = src
            .map(|s| s.values(key).cloned().collect())
            .unwrap_or_default();
        target.replace_values(key, values);
        if let Some(src) = src {
            if let Some(field) = src.struct_key(key) {
                target.declare_struct_key(key, field);
            }
            if src.is_initialized_empty(key) && !target.contains(key) {
                target.initialize_to_empty(key);
            }
        }
    }

    /// Names of sections whose content differs between `self` and `other`,
    /// including sections present on only one side.
    pub fn changed_sections(&self, other: &ConfigFile) -> BTreeSet<String> {
        let names: BTreeSet<&String> = self.sections.keys().chain(other.sections.keys()).collect();
        names
            .into_iter()
            .filter(|name| {
                let a = self.sections.get(*name).filter(|s| !s.is_empty());
                let b = other.sections.get(*name).filter(|s| !s.is_empty());
                a != b
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
