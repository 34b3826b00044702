//! Minimal command stream that turns one merged file into another.

use std::collections::BTreeSet;

use crate::file::ConfigFile;
use crate::section::{Section, extract_field};
use crate::stream::{CommandStream, LayerSource};
use crate::value::{ConfigValue, ValueOp};

const CLEAR_MARKER: &str = "__ClearArray__";

/// Build a stream such that applying it onto `base` yields `target`.
///
/// Sections that exist only in `base` are left alone; removing them wholesale
/// is a structural edit, not a layer operation.
pub fn calculate_diff(base: &ConfigFile, target: &ConfigFile) -> CommandStream {
    let mut diff = CommandStream::new(LayerSource {
        name: format!("{} (diff)", target.name()),
        content_hash: String::new(),
    });

    for section in base.sections() {
        let name = section.name();
        match target.section(name) {
            Some(other) => diff_section(&mut diff, section, other),
            None => clear_section(&mut diff, section),
        }
    }
    for section in target.sections() {
        if base.section(section.name()).is_none() {
            copy_section(&mut diff, section);
        }
    }
    diff
}

fn diff_section(diff: &mut CommandStream, first: &Section, second: &Section) {
    let name = first.name();
    declare_new_struct_keys(diff, Some(first), second);

    let first_keys: BTreeSet<&str> = first.keys().into_iter().chain(first.empty_keys()).collect();
    let mut ordered: Vec<&str> = first.keys();
    ordered.extend(first.empty_keys().filter(|k| !first.contains(k)));

    for key in ordered {
        let first_values: Vec<&ConfigValue> = first.values(key).collect();
        let mut second_values: Vec<&ConfigValue> = second.values(key).collect();

        if second_values.is_empty() {
            if second.is_initialized_empty(key) {
                if !first_values.is_empty() || !first.is_initialized_empty(key) {
                    diff.emplace(name, key, "", ValueOp::InitializeToEmpty);
                }
            } else {
                diff.emplace(name, key, CLEAR_MARKER, ValueOp::Clear);
            }
            continue;
        }

        let is_array = first_values.len() > 1
            || second_values.len() > 1
            || first_values.iter().any(|v| v.op().is_array_add());
        let identity = second.struct_key(key);
        for value in &first_values {
            if let Some(found) = second_values.iter().position(|v| v.raw() == value.raw()) {
                second_values.remove(found);
                continue;
            }
            // Applying a literal with an existing identity overwrites that entry in place.
            if let Some(found) =
                identity.and_then(|field| same_identity(&second_values, value, field))
            {
                let replacement = second_values.remove(found);
                diff.emplace(name, key, replacement.raw(), ValueOp::AddUnique);
                continue;
            }
            if is_array {
                diff.emplace(name, key, value.raw(), ValueOp::Remove);
            } else if let Some(replacement) = second_values.first() {
                diff.emplace(name, key, replacement.raw(), ValueOp::Set);
                second_values.clear();
            }
        }

        let op = if first_values.is_empty()
            && second_values.len() == 1
            && !second_values[0].op().is_array_add()
        {
            ValueOp::Set
        } else {
            ValueOp::AddUnique
        };
        // AddUnique would swallow a repeated value, so repeats are appended.
        let mut emitted: Vec<&str> = Vec::new();
        for value in second_values {
            let raw = value.raw();
            let repeated = first_values.iter().any(|v| v.raw() == raw) || emitted.contains(&raw);
            let op = if op == ValueOp::AddUnique && repeated {
                ValueOp::Append
            } else {
                op
            };
            diff.emplace(name, key, raw, op);
            emitted.push(raw);
        }
    }

    let mut added: Vec<&str> = second
        .keys()
        .into_iter()
        .filter(|k| !first_keys.contains(k))
        .collect();
    added.extend(
        second
            .empty_keys()
            .filter(|k| !first_keys.contains(k) && !second.contains(k)),
    );
    for key in added {
        copy_key(diff, second, key);
    }
}

fn same_identity(candidates: &[&ConfigValue], value: &ConfigValue, field: &str) -> Option<usize> {
    let id = extract_field(value.raw(), field)?;
    candidates
        .iter()
        .position(|v| extract_field(v.raw(), field).as_deref() == Some(id.as_str()))
}

fn clear_section(diff: &mut CommandStream, section: &Section) {
    let mut keys = section.keys();
    keys.extend(section.empty_keys().filter(|k| !section.contains(k)));
    for key in keys {
        diff.emplace(section.name(), key, CLEAR_MARKER, ValueOp::Clear);
    }
}

fn copy_section(diff: &mut CommandStream, section: &Section) {
    declare_new_struct_keys(diff, None, section);
    for key in section.keys() {
        copy_key(diff, section, key);
    }
    for key in section.empty_keys() {
        if !section.contains(key) {
            copy_key(diff, section, key);
        }
    }
}

fn copy_key(diff: &mut CommandStream, section: &Section, key: &str) {
    let values: Vec<&ConfigValue> = section.values(key).collect();
    match values.as_slice() {
        [] => diff.emplace(section.name(), key, "", ValueOp::InitializeToEmpty),
        [single] => diff.emplace(section.name(), key, single.raw(), ValueOp::Set),
        many => {
            for value in many {
                diff.emplace(section.name(), key, value.raw(), ValueOp::Append);
            }
        }
    }
}

fn declare_new_struct_keys(diff: &mut CommandStream, first: Option<&Section>, second: &Section) {
    for (key, field) in second.struct_keys() {
        if first.and_then(|s| s.struct_key(key)) != Some(field.as_str()) {
            diff.emplace(second.name(), key, field, ValueOp::StructKeyed);
        }
    }
}
