//! Lazy `{TOKEN}` expansion for stored values.

use std::borrow::Cow;

#[derive(Debug, Clone)]
struct MacroEntry {
    token: String,
    value: String,
    collapsible: bool,
}

/// Table of value macros such as `{PROJECTDIR}`.
///
/// Values are stored with their macros intact and only expanded when read, so
/// the persisted diff stays portable across machines.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    entries: Vec<MacroEntry>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `{name}`. Directory macros should be `collapsible` so absolute
    /// paths written through the typed setters are folded back into the macro.
    pub fn insert(&mut self, name: &str, value: impl Into<String>, collapsible: bool) {
        let token = format!("{{{name}}}");
        let value = value.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.token == token) {
            existing.value = value;
            existing.collapsible = collapsible;
        } else {
            self.entries.push(MacroEntry {
                token,
                value,
                collapsible,
            });
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>, collapsible: bool) -> Self {
        self.insert(name, value, collapsible);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn match_at(&self, rest: &str) -> Option<&MacroEntry> {
        self.entries.iter().find(|e| rest.starts_with(&e.token))
    }

    pub fn has_expansion(&self, text: &str) -> bool {
        text.match_indices('{')
            .any(|(idx, _)| self.match_at(&text[idx..]).is_some())
    }

    /// Replace every known macro. Unknown `{...}` sequences are left untouched.
    pub fn expand<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !self.has_expansion(text) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(idx) = rest.find('{') {
            out.push_str(&rest[..idx]);
            let candidate = &rest[idx..];
            match self.match_at(candidate) {
                Some(entry) => {
                    out.push_str(&entry.value);
                    rest = &candidate[entry.token.len()..];
                }
                None => {
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        out.push_str(rest);
        Cow::Owned(out)
    }

    /// Fold a leading absolute directory back into its macro.
    pub fn collapse<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let best = self
            .entries
            .iter()
            .filter(|e| e.collapsible && !e.value.is_empty() && text.starts_with(&e.value))
            .max_by_key(|e| e.value.len());
        match best {
            Some(entry) => Cow::Owned(format!("{}{}", entry.token, &text[entry.value.len()..])),
            None => Cow::Borrowed(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MacroTable {
        MacroTable::new()
            .with("PROJECTDIR", "/work/game/", true)
            .with("ENGINEDIR", "/opt/engine/", true)
            .with("PROJECTNAME", "Shooter", false)
    }

    #[test]
    fn expands_known_tokens_only() {
        let macros = table();
        assert_eq!(
            macros.expand("{PROJECTDIR}Content/{PROJECTNAME}.pak"),
            "/work/game/Content/Shooter.pak"
        );
        assert_eq!(macros.expand("{UNKNOWN}/x"), "{UNKNOWN}/x");
        assert!(matches!(macros.expand("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn collapse_prefers_longest_directory() {
        let macros = table().with("PLUGINDIR", "/work/game/Plugins/", true);
        assert_eq!(
            macros.collapse("/work/game/Plugins/Foo"),
            "{PLUGINDIR}Foo"
        );
        assert_eq!(macros.collapse("/work/game/Saved"), "{PROJECTDIR}Saved");
        assert_eq!(macros.collapse("Shooter"), "Shooter");
    }

    #[test]
    fn insert_replaces_existing_token() {
        let mut macros = table();
        macros.insert("PROJECTNAME", "Racer", false);
        assert_eq!(macros.expand("{PROJECTNAME}"), "Racer");
    }
}
