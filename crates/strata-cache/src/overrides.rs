//! `-ini:<Branch>:[<Section>]:<Key>=<Value>` command-line overrides.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use strata_core::{CommandStream, LayerSource, ValueOp};

const SWITCH: &str = "-ini:";

fn entry_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(?x)
                    \[(?P<section>[^\]]+)\]:
                    (?P<key>[^=,]+)=
                    (?P<value>"[^"]*"|[^,]*)
                "#,
            )
            .ok()
        })
        .as_ref()
}

/// Override streams keyed by lower-cased branch name.
#[derive(Debug, Default)]
pub struct CommandLineOverrides {
    streams: BTreeMap<String, CommandStream>,
}

impl CommandLineOverrides {
    /// Collect overrides from arguments. Arguments that are not `-ini:`
    /// switches are ignored; malformed entries are skipped with a warning.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let mut overrides = Self::default();
        for arg in args {
            overrides.add_argument(arg.as_ref());
        }
        overrides
    }

    fn add_argument(&mut self, arg: &str) {
        let Some(rest) = arg.strip_prefix(SWITCH) else {
            return;
        };
        let Some((branch, settings)) = rest.split_once(':') else {
            tracing::warn!(arg, "ini override has no branch name");
            return;
        };
        let Some(pattern) = entry_pattern() else {
            return;
        };

        let stream = self
            .streams
            .entry(branch.to_ascii_lowercase())
            .or_insert_with(|| {
                CommandStream::new(LayerSource::from_text(format!("command line ({branch})"), arg))
            });
        let mut matched = false;
        for caps in pattern.captures_iter(settings) {
            matched = true;
            let section = caps["section"].trim();
            let mut key = caps["key"].trim();
            let mut value = caps["value"].trim();
            if value.len() > 1 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }
            let mut op = ValueOp::Set;
            if let Some(first) = key.chars().next()
                && let Some(found) = ValueOp::from_sigil(first)
            {
                op = found;
                key = &key[first.len_utf8()..];
            }
            if section.is_empty() || key.is_empty() {
                tracing::warn!(arg, "skipping malformed ini override entry");
                continue;
            }
            stream.emplace(section, key, value, op);
        }
        if !matched {
            tracing::warn!(arg, "ini override has no [Section]:Key=Value entries");
        }
    }

    /// Override stream for a branch; empty when none were given.
    pub fn stream_for(&self, branch: &str) -> CommandStream {
        self.streams
            .get(&branch.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| {
                CommandStream::new(LayerSource::from_text(format!("command line ({branch})"), ""))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(stream: &CommandStream) -> Vec<String> {
        stream
            .commands()
            .iter()
            .map(|c| {
                let sigil = c.op().sigil().map(String::from).unwrap_or_default();
                format!("[{}]{sigil}{}={}", c.section, c.key, c.value.raw())
            })
            .collect()
    }

    #[test]
    fn test_parse_single_and_multiple_entries() {
        let overrides = CommandLineOverrides::parse(&[
            "-ini:Engine:[/Script/Engine.Engine]:bSmoothFrameRate=False",
            "-log",
            "-ini:Game:[/Script/Engine.Player]:MaxHealth=200,[Paths]:+Dirs=\"a, b\",[Paths]:-Dirs=old",
        ]);
        assert_eq!(
            lines(&overrides.stream_for("engine")),
            vec!["[/Script/Engine.Engine]bSmoothFrameRate=False"]
        );
        assert_eq!(
            lines(&overrides.stream_for("Game")),
            vec![
                "[/Script/Engine.Player]MaxHealth=200",
                "[Paths]+Dirs=a, b",
                "[Paths]-Dirs=old",
            ]
        );
        assert!(overrides.stream_for("Input").is_empty());
    }

    #[test]
    fn test_malformed_arguments_are_ignored() {
        let overrides = CommandLineOverrides::parse(&[
            "-ini:NoSettings",
            "-ini:Game:Key=1",
            "-ini:Game:[]:K=1",
        ]);
        assert!(overrides.stream_for("Game").is_empty());
    }
}
