//! Engine settings (`~/.config/strata/config.toml`).
//!
//! Describes the roots layers are resolved under, the runtime mode that picks
//! layers and replay strategy, and optional overrides of the built-in layer
//! and expansion tables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strata_core::MacroTable;

use crate::layers::{self, Expansion, LayerTemplate};
use crate::paths::{self, dir_with_slash};
use crate::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub roots: RootSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub migration: MigrationSettings,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformInfo>,
    #[serde(default)]
    pub plugins: Vec<PluginSettings>,
    /// Replaces the built-in layer table when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerTemplate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansions: Option<Vec<Expansion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_layers: Option<Vec<LayerTemplate>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootSettings {
    #[serde(default = "default_engine_dir")]
    pub engine_dir: PathBuf,
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// `{USER}`; defaults to the documents directory.
    #[serde(default)]
    pub user_dir: Option<PathBuf>,
    /// `{USERSETTINGS}`; defaults to the local data directory.
    #[serde(default)]
    pub user_settings_dir: Option<PathBuf>,
    /// `{APPSETTINGS}`; defaults to the roaming data directory.
    #[serde(default)]
    pub app_settings_dir: Option<PathBuf>,
    /// Root for persisted saved layers; defaults to `<project_dir>/Saved`.
    #[serde(default)]
    pub saved_dir: Option<PathBuf>,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            engine_dir: default_engine_dir(),
            project_dir: default_project_dir(),
            project_name: default_project_name(),
            user_dir: None,
            user_settings_dir: None,
            app_settings_dir: None,
            saved_dir: None,
        }
    }
}

fn default_engine_dir() -> PathBuf {
    PathBuf::from("Engine")
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_project_name() -> String {
    "Project".to_string()
}

/// Which layers a resolution includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMode {
    Cooked,
    #[default]
    Uncooked,
}

/// How a branch retains its static layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayMethod {
    /// Keep every static stream; reconstruction never re-reads disk.
    Full,
    /// Keep one pre-combined static baseline.
    #[default]
    DynamicLayer,
    /// Keep neither; removing dynamic layers requires a reload from disk.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub is_server: bool,
    #[serde(default)]
    pub resolve_mode: ResolveMode,
    #[serde(default)]
    pub custom_config: Option<String>,
    /// Substituted for `{OPT_SUBDIR}`.
    #[serde(default)]
    pub sub_dir: Option<String>,
    #[serde(default)]
    pub replay: ReplayMethod,
    #[serde(default = "default_true")]
    pub writes_allowed: bool,
    /// Unload branches idle for this many seconds on `tick`. Disabled when unset.
    #[serde(default)]
    pub unload_after_secs: Option<u64>,
    #[serde(default)]
    pub never_unload: Vec<String>,
    #[serde(default = "default_true")]
    pub track_access: bool,
    /// `-ini:Branch:[Section]:Key=Value` overrides, as on a command line.
    #[serde(default)]
    pub ini_overrides: Vec<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            is_server: false,
            resolve_mode: ResolveMode::default(),
            custom_config: None,
            sub_dir: None,
            replay: ReplayMethod::default(),
            writes_allowed: true,
            unload_after_secs: None,
            never_unload: Vec::new(),
            track_access: true,
            ini_overrides: Vec::new(),
        }
    }
}

fn default_platform() -> String {
    platform::host_platform().to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Saved-layer sections kept across a version bump.
    #[serde(default)]
    pub preserve_sections: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    #[serde(default)]
    pub parent: Option<String>,
}

/// A plugin registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSettings {
    pub name: String,
    pub dir: PathBuf,
    /// Dynamic-layer priority; plugins default to 20.
    #[serde(default)]
    pub priority: Option<u16>,
}

impl EngineSettings {
    /// Load from `$STRATA_CONFIG` or `~/.config/strata/config.toml`.
    ///
    /// Returns `Default` if the file does not exist or if the config
    /// directory cannot be determined.
    pub fn load() -> Result<Self> {
        let Some(path) = paths::settings_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no engine settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine settings: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse engine settings: {}", path.display()))?;
        Ok(settings)
    }

    pub fn layer_table(&self) -> Vec<LayerTemplate> {
        self.layers.clone().unwrap_or_else(layers::default_layers)
    }

    pub fn expansion_table(&self) -> Vec<Expansion> {
        self.expansions
            .clone()
            .unwrap_or_else(layers::default_expansions)
    }

    pub fn plugin_layer_table(&self) -> Vec<LayerTemplate> {
        self.plugin_layers
            .clone()
            .unwrap_or_else(layers::default_plugin_layers)
    }

    pub fn user_dir(&self) -> Option<PathBuf> {
        self.roots.user_dir.clone().or_else(paths::default_user_dir)
    }

    pub fn user_settings_dir(&self) -> Option<PathBuf> {
        self.roots
            .user_settings_dir
            .clone()
            .or_else(paths::default_user_settings_dir)
    }

    pub fn app_settings_dir(&self) -> Option<PathBuf> {
        self.roots
            .app_settings_dir
            .clone()
            .or_else(paths::default_app_settings_dir)
    }

    pub fn saved_dir(&self) -> PathBuf {
        self.roots
            .saved_dir
            .clone()
            .unwrap_or_else(|| self.roots.project_dir.join("Saved"))
    }

    /// Directory persisted saved layers for `platform` are written to.
    pub fn saved_config_dir(&self, platform: &str) -> PathBuf {
        self.saved_dir().join("Config").join(platform)
    }

    /// Value macros expanded by read accessors.
    pub fn macro_table(&self) -> MacroTable {
        let mut table = MacroTable::new()
            .with("ENGINEDIR", dir_with_slash(&self.roots.engine_dir), true)
            .with("PROJECTDIR", dir_with_slash(&self.roots.project_dir), true)
            .with("PROJECTNAME", self.roots.project_name.clone(), false)
            .with("SAVEDDIR", dir_with_slash(&self.saved_dir()), true);
        if let Some(dir) = self.user_dir() {
            table.insert("USERDIR", dir_with_slash(&dir), true);
        }
        if let Some(dir) = self.app_settings_dir() {
            table.insert("APPSETTINGSDIR", dir_with_slash(&dir), true);
        }
        table
    }

    pub fn ancestry(&self, platform: &str) -> Vec<String> {
        platform::platform_ancestry(&self.platforms, platform)
    }

    /// Generate a commented settings TOML as a template.
    pub fn default_template() -> String {
        r#"# Strata engine settings
# Location: ~/.config/strata/config.toml (override with STRATA_CONFIG)

[roots]
engine_dir = "Engine"
project_dir = "."
project_name = "Project"
# saved_dir = "./Saved"
# user_dir = "/home/me/Documents"

[runtime]
# platform = "Linux"        # defaults to the host platform
is_server = false
resolve_mode = "uncooked"   # "cooked" skips restricted expansions
replay = "dynamic-layer"    # "full" | "dynamic-layer" | "none"
writes_allowed = true
# custom_config = "Staging"
# sub_dir = "Tools"
# unload_after_secs = 300
# never_unload = ["Engine", "Game"]
# ini_overrides = ["-ini:Game:[/Script/Engine.Player]:MaxHealth=200"]

[migration]
preserve_sections = []

# Platform inheritance. A child reads every layer of its parents first.
# [platforms.LinuxArm64]
# parent = "Linux"

# Plugins whose layers are added to every branch at startup.
# [[plugins]]
# name = "Shooter"
# dir = "Plugins/Shooter"
# priority = 20
"#
        .to_string()
    }

    /// Write the default template to the settings path, creating directories as needed.
    pub fn save_default_template() -> Result<PathBuf> {
        let path = paths::settings_path().context("Failed to determine config directory")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&path, Self::default_template())
            .with_context(|| format!("Failed to write engine settings: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
