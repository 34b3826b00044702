//! Turns the layer-template table into concrete layer paths.

use std::path::{Path, PathBuf};

use strata_config::paths::dir_with_slash;
use strata_config::platform::DEDICATED_SERVER;
use strata_config::{EngineSettings, Expansion, LayerTemplate, ResolveMode};

use crate::hierarchy::{Hierarchy, HierarchyKey};

/// Template, expansion and platform indices are packed into one byte each.
const MAX_TABLE_ROWS: usize = u8::MAX as usize + 1;

/// A plugin whose layer templates are being resolved.
#[derive(Debug, Clone, Copy)]
pub struct PluginRoot<'a> {
    pub name: &'a str,
    pub dir: &'a Path,
}

/// Resolve the static hierarchy for `name` on `platform`.
pub fn resolve_hierarchy(settings: &EngineSettings, name: &str, platform: &str) -> Hierarchy {
    resolve_hierarchy_until(settings, name, platform, None)
}

/// Like [`resolve_hierarchy`], but generation stops at `stop_at`; the sentinel
/// and everything after it are left out.
pub fn resolve_hierarchy_until(
    settings: &EngineSettings,
    name: &str,
    platform: &str,
    stop_at: Option<&Path>,
) -> Hierarchy {
    let resolver = Resolver::new(settings, name, platform, None);
    resolver.run(&settings.layer_table(), stop_at)
}

/// Layer paths contributed by a plugin for `name` on `platform`, in priority order.
pub fn resolve_plugin_layers(
    settings: &EngineSettings,
    plugin: PluginRoot<'_>,
    name: &str,
    platform: &str,
) -> Vec<PathBuf> {
    let resolver = Resolver::new(settings, name, platform, Some(plugin));
    resolver
        .run(&settings.plugin_layer_table(), None)
        .paths()
        .map(Path::to_path_buf)
        .collect()
}

struct Resolver<'a> {
    settings: &'a EngineSettings,
    name: &'a str,
    chain: Vec<String>,
    expansions: Vec<(usize, Expansion)>,
    plugin: Option<PluginRoot<'a>>,
}

impl<'a> Resolver<'a> {
    fn new(
        settings: &'a EngineSettings,
        name: &'a str,
        platform: &str,
        plugin: Option<PluginRoot<'a>>,
    ) -> Self {
        let mut chain = settings.ancestry(platform);
        if settings.runtime.is_server {
            chain.push(DEDICATED_SERVER.to_string());
        }
        chain.truncate(capped("platform ancestry", chain.len()));
        let cooked = settings.runtime.resolve_mode == ResolveMode::Cooked;
        let table = settings.expansion_table();
        let rows = capped("expansion table", table.len());
        let expansions = table
            .into_iter()
            .take(rows)
            .enumerate()
            .filter(|(_, e)| {
                if plugin.is_some() {
                    e.modes.plugin
                } else if cooked {
                    e.modes.cooked
                } else {
                    e.modes.uncooked
                }
            })
            .collect();
        Self {
            settings,
            name,
            chain,
            expansions,
            plugin,
        }
    }

    fn run(&self, templates: &[LayerTemplate], stop_at: Option<&Path>) -> Hierarchy {
        let mut hierarchy = Hierarchy::new();
        let rows = capped("layer table", templates.len());
        for (t_idx, template) in templates.iter().take(rows).enumerate() {
            if template.requires_custom_config && self.settings.runtime.custom_config.is_none() {
                continue;
            }
            if template.requires_sub_dir && self.settings.runtime.sub_dir.is_none() {
                continue;
            }
            let Some(base) = self.substitute_base(&template.path) else {
                tracing::debug!(
                    template = %template.name,
                    "layer root unavailable, skipping template"
                );
                continue;
            };

            let variants: Vec<(usize, String)> = if template.no_expand {
                vec![(0, base)]
            } else {
                self.expansions
                    .iter()
                    .filter_map(|(e_idx, e)| e.apply(&base).map(|p| (*e_idx, p)))
                    .collect()
            };

            for (e_idx, expanded) in variants {
                for (p_idx, path, mut flags) in self.platform_passes(&expanded) {
                    if stop_at == Some(path.as_path()) {
                        return hierarchy;
                    }
                    if template.requires_existence {
                        if !path.exists() {
                            continue;
                        }
                        flags |= HierarchyKey::ASSUMED_EXISTS;
                    }
                    // Every index is below MAX_TABLE_ROWS.
                    let key = HierarchyKey::new(t_idx as u8, e_idx as u8, p_idx as u8, flags);
                    hierarchy.insert(key, path);
                }
            }
        }
        hierarchy
    }

    /// One path per platform ancestor when the template is platform specific,
    /// otherwise a single cache-source path.
    fn platform_passes(&self, expanded: &str) -> Vec<(usize, PathBuf, u8)> {
        let platform_specific = expanded.contains("{PLATFORM}") || expanded.contains("{EXT");
        if !platform_specific {
            return self
                .substitute_final(expanded, None)
                .map(|p| (0, PathBuf::from(p), HierarchyKey::CACHE_SOURCE))
                .into_iter()
                .collect();
        }
        self.chain
            .iter()
            .enumerate()
            .filter(|(_, platform)| {
                platform.as_str() != DEDICATED_SERVER || !expanded.contains("{EXT")
            })
            .filter_map(|(p_idx, platform)| {
                let path = self.substitute_final(expanded, Some(platform))?;
                let path = path.replace(
                    &format!("/{DEDICATED_SERVER}/{DEDICATED_SERVER}"),
                    &format!("/{DEDICATED_SERVER}"),
                );
                Some((p_idx, PathBuf::from(path), 0))
            })
            .collect()
    }

    /// Tokens that do not depend on the platform or the expansion variant.
    fn substitute_base(&self, template: &str) -> Option<String> {
        let runtime = &self.settings.runtime;
        let mut out = template.replace("{TYPE}", self.name);
        if out.contains("{USER}") {
            out = out.replace("{USER}", &dir_with_slash(&self.settings.user_dir()?));
        }
        if out.contains("{USERSETTINGS}") {
            out = out.replace(
                "{USERSETTINGS}",
                &dir_with_slash(&self.settings.user_settings_dir()?),
            );
        }
        if out.contains("{APPSETTINGS}") {
            out = out.replace(
                "{APPSETTINGS}",
                &dir_with_slash(&self.settings.app_settings_dir()?),
            );
        }
        if let Some(custom) = &runtime.custom_config {
            out = out.replace("{CUSTOMCONFIG}", custom);
        }
        let sub_dir = runtime
            .sub_dir
            .as_deref()
            .map(|d| format!("{}/", d.trim_end_matches('/')))
            .unwrap_or_default();
        out = out.replace("{OPT_SUBDIR}", &sub_dir);
        if let Some(plugin) = self.plugin {
            out = out.replace("{PLUGINNAME}", plugin.name);
        }
        Some(out)
    }

    /// Root and platform tokens. `None` when the path needs a plugin root and
    /// none is being resolved.
    fn substitute_final(&self, path: &str, platform: Option<&str>) -> Option<String> {
        let roots = &self.settings.roots;
        let engine = root(&roots.engine_dir);
        let project = root(&roots.project_dir);
        let mut out = path
            .replace("{ENGINE}", &engine)
            .replace("{PROJECT}", &project)
            .replace(
                "{RESTRICTEDPROJECT_NFL}",
                &format!("{project}/Restricted/NotForLicensees"),
            )
            .replace(
                "{RESTRICTEDPROJECT_NR}",
                &format!("{project}/Restricted/NoRedist"),
            );
        if let Some(platform) = platform {
            out = out
                .replace("{EXTENGINE}", &format!("{engine}/Platforms/{platform}"))
                .replace("{EXTPROJECT}", &format!("{project}/Platforms/{platform}"))
                .replace("{PLATFORM}", platform);
        }
        if out.contains("{PLUGIN}") || out.contains("{EXTPLUGIN}") {
            let plugin = root(self.plugin?.dir);
            out = out.replace("{PLUGIN}", &plugin);
            if let Some(platform) = platform {
                out = out.replace("{EXTPLUGIN}", &format!("{plugin}/Platforms/{platform}"));
            }
        }
        if out.contains("{PLUGINNAME}") {
            return None;
        }
        Some(out)
    }
}

/// Number of rows that fit in a hierarchy key, warning when `len` is more.
fn capped(table: &str, len: usize) -> usize {
    if len > MAX_TABLE_ROWS {
        tracing::warn!(table, rows = len, "ignoring rows past {MAX_TABLE_ROWS}");
    }
    len.min(MAX_TABLE_ROWS)
}

fn root(path: &Path) -> String {
    dir_with_slash(path).trim_end_matches('/').to_string()
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
