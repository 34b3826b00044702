//! Plugin locations whose layers are added to branches as dynamic layers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use strata_config::PluginSettings;

use crate::dynamic::priority;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub dir: PathBuf,
    pub priority: u16,
    /// Whether its layers are applied to every branch, including new ones.
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Plugin>,
}

impl PluginRegistry {
    /// Plugins listed in the engine settings start out active.
    pub fn from_settings(plugins: &[PluginSettings]) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register(&plugin.name, &plugin.dir, plugin.priority);
            registry.activate(&plugin.name);
        }
        registry
    }

    /// Register or re-point a plugin. Returns `false` when an existing
    /// registration was replaced.
    pub fn register(&mut self, name: &str, dir: &Path, priority: Option<u16>) -> bool {
        let plugin = Plugin {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            priority: priority.unwrap_or(priority::PLUGIN),
            active: false,
        };
        match self.plugins.insert(name.to_string(), plugin) {
            Some(previous) => {
                tracing::debug!(
                    plugin = name,
                    previous = %previous.dir.display(),
                    "replaced plugin registration"
                );
                false
            }
            None => true,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Mark a plugin active. `None` when it was never registered.
    pub fn activate(&mut self, name: &str) -> Option<&Plugin> {
        let plugin = self.plugins.get_mut(name)?;
        plugin.active = true;
        Some(plugin)
    }

    pub fn deactivate(&mut self, name: &str) -> bool {
        match self.plugins.get_mut(name) {
            Some(plugin) if plugin.active => {
                plugin.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values().filter(|p| p.active)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
