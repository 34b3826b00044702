//! Process-wide registry of branches and the typed accessor surface.
//!
//! Lookups take the registry's read lock; building a branch happens outside
//! any lock and only the insert is exclusive. Accessors never fail loudly:
//! anything that cannot be resolved reads as absent.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use strata_config::EngineSettings;
use strata_core::{AccessTracker, ConfigError, ConfigValueType, MacroTable};

use crate::branch::{Branch, BuildOptions};
use crate::overrides::CommandLineOverrides;
use crate::persist::PersistOutcome;
use crate::plugins::{Plugin, PluginRegistry};
use crate::resolver::{PluginRoot, resolve_plugin_layers};
use crate::source_cache::SourceCache;

type BranchKey = (String, String);

pub struct ConfigContext {
    settings: EngineSettings,
    macros: MacroTable,
    branches: RwLock<HashMap<BranchKey, Arc<Branch>>>,
    cache: Arc<SourceCache>,
    overrides: CommandLineOverrides,
    plugins: RwLock<PluginRegistry>,
    boot_complete: AtomicBool,
    access: AccessTracker,
}

impl ConfigContext {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_overrides(settings, &[] as &[&str])
    }

    /// Like [`ConfigContext::new`], adding `-ini:` switches from `args` after
    /// those listed in the settings.
    pub fn with_overrides<S: AsRef<str>>(settings: EngineSettings, args: &[S]) -> Self {
        let mut switches = settings.runtime.ini_overrides.clone();
        switches.extend(args.iter().map(|a| a.as_ref().to_string()));
        Self {
            macros: settings.macro_table(),
            branches: RwLock::new(HashMap::new()),
            cache: Arc::new(SourceCache::default()),
            overrides: CommandLineOverrides::parse(&switches),
            plugins: RwLock::new(PluginRegistry::from_settings(&settings.plugins)),
            boot_complete: AtomicBool::new(false),
            access: AccessTracker::new(settings.runtime.track_access),
            settings,
        }
    }

    /// Build a context from the engine settings file.
    pub fn load() -> Result<Self> {
        let settings = EngineSettings::load().context("Failed to load engine settings")?;
        Ok(Self::new(settings))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn platform(&self) -> &str {
        &self.settings.runtime.platform
    }

    pub fn access_tracker(&self) -> &AccessTracker {
        &self.access
    }

    pub fn source_cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Allow saved layers to be written. Until then every save is suppressed.
    pub fn mark_boot_complete(&self) {
        if !self.boot_complete.swap(true, Ordering::AcqRel) {
            tracing::debug!("initial boot complete, config saves enabled");
        }
    }

    pub fn boot_complete(&self) -> bool {
        self.boot_complete.load(Ordering::Acquire)
    }

    fn persist_allowed(&self) -> bool {
        self.boot_complete() && self.settings.runtime.writes_allowed
    }

    // Registry

    /// Branch `name` on the current platform, built on first use.
    pub fn branch(&self, name: &str) -> Result<Arc<Branch>, ConfigError> {
        self.branch_for_platform(name, &self.settings.runtime.platform)
    }

    pub fn branch_for_platform(
        &self,
        name: &str,
        platform: &str,
    ) -> Result<Arc<Branch>, ConfigError> {
        let key = (name.to_string(), platform.to_string());
        if let Some(branch) = self.read_branches().get(&key) {
            return Ok(Arc::clone(branch));
        }

        let branch = Branch::build(
            name,
            platform,
            BuildOptions {
                settings: &self.settings,
                cache: Arc::clone(&self.cache),
                overrides: self.overrides.stream_for(name),
            },
        )?;
        // The plugin guard is held until the branch is registered, so an
        // activation either sees the new branch or is seen by it, never both.
        let plugins = self.read_plugins();
        for plugin in plugins.active() {
            self.apply_plugin(&branch, plugin);
        }
        let branch = match self.write_branches().entry(key) {
            // Another thread finished first; keep its branch.
            Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(branch))),
        };
        drop(plugins);
        if let Err(e) = branch.flush(self.persist_allowed()) {
            tracing::warn!(branch = name, platform, "failed to save config: {e}");
        }
        Ok(branch)
    }

    /// Drop a branch from the registry. Unsaved edits are lost.
    pub fn remove_branch(&self, name: &str, platform: &str) -> bool {
        self.write_branches()
            .remove(&(name.to_string(), platform.to_string()))
            .is_some()
    }

    /// Every built branch, in no particular order.
    pub fn loaded_branches(&self) -> Vec<Arc<Branch>> {
        self.read_branches().values().cloned().collect()
    }

    fn find(&self, name: &str) -> Option<Arc<Branch>> {
        match self.branch(name) {
            Ok(branch) => Some(branch),
            Err(e) => {
                tracing::warn!(branch = name, "config branch unavailable: {e}");
                None
            }
        }
    }

    // Typed reads

    /// Read and convert the first value of `key`, with macros expanded.
    pub fn get<T: ConfigValueType>(&self, branch: &str, section: &str, key: &str) -> Option<T> {
        T::parse_config(&self.get_raw(branch, section, key)?)
    }

    pub fn get_string(&self, branch: &str, section: &str, key: &str) -> Option<String> {
        self.get(branch, section, key)
    }

    pub fn get_int(&self, branch: &str, section: &str, key: &str) -> Option<i32> {
        self.get(branch, section, key)
    }

    pub fn get_float(&self, branch: &str, section: &str, key: &str) -> Option<f32> {
        self.get(branch, section, key)
    }

    pub fn get_double(&self, branch: &str, section: &str, key: &str) -> Option<f64> {
        self.get(branch, section, key)
    }

    pub fn get_bool(&self, branch: &str, section: &str, key: &str) -> Option<bool> {
        self.get(branch, section, key)
    }

    /// Every value of `key`. `Some(vec![])` for a key explicitly initialized empty.
    pub fn get_array(&self, branch: &str, section: &str, key: &str) -> Option<Vec<String>> {
        let found = self.find(branch)?;
        self.access.record(found.name(), section, key);
        found.read(|file| {
            file.array(section, key).map(|values| {
                values
                    .iter()
                    .map(|v| v.expanded(&self.macros).into_owned())
                    .collect()
            })
        })
    }

    fn get_raw(&self, branch: &str, section: &str, key: &str) -> Option<String> {
        let found = self.find(branch)?;
        self.access.record(found.name(), section, key);
        found.read(|file| {
            file.value(section, key)
                .map(|v| v.expanded(&self.macros).into_owned())
        })
    }

    // Typed writes

    pub fn set<T: ConfigValueType>(
        &self,
        branch: &str,
        section: &str,
        key: &str,
        value: &T,
    ) -> bool {
        self.edit(branch, |b| b.set_value(section, key, &value.format_config()))
    }

    /// Store a string, collapsing known directories back into macros.
    pub fn set_string(&self, branch: &str, section: &str, key: &str, value: &str) -> bool {
        let collapsed = self.macros.collapse(value);
        self.edit(branch, |b| b.set_value(section, key, &collapsed))
    }

    pub fn set_int(&self, branch: &str, section: &str, key: &str, value: i32) -> bool {
        self.set(branch, section, key, &value)
    }

    pub fn set_float(&self, branch: &str, section: &str, key: &str, value: f32) -> bool {
        self.set(branch, section, key, &value)
    }

    pub fn set_double(&self, branch: &str, section: &str, key: &str, value: f64) -> bool {
        self.set(branch, section, key, &value)
    }

    pub fn set_bool(&self, branch: &str, section: &str, key: &str, value: bool) -> bool {
        self.set(branch, section, key, &value)
    }

    pub fn set_array(&self, branch: &str, section: &str, key: &str, values: &[String]) -> bool {
        self.edit(branch, |b| b.set_array(section, key, values))
    }

    // Section mutations

    pub fn add_to_section(&self, branch: &str, section: &str, key: &str, value: &str) -> bool {
        self.edit(branch, |b| b.add_to_section(section, key, value))
    }

    pub fn add_unique_to_section(
        &self,
        branch: &str,
        section: &str,
        key: &str,
        value: &str,
    ) -> bool {
        self.edit(branch, |b| b.add_unique_to_section(section, key, value))
    }

    pub fn remove_key_from_section(&self, branch: &str, section: &str, key: &str) -> bool {
        self.edit(branch, |b| b.remove_key_from_section(section, key))
    }

    pub fn remove_from_section(&self, branch: &str, section: &str, key: &str, value: &str) -> bool {
        self.edit(branch, |b| b.remove_from_section(section, key, value))
    }

    pub fn reset_key_in_section(&self, branch: &str, section: &str, key: &str) -> bool {
        self.edit(branch, |b| b.reset_key_in_section(section, key))
    }

    fn edit(&self, branch: &str, f: impl FnOnce(&Branch) -> bool) -> bool {
        self.find(branch).is_some_and(|b| f(&b))
    }

    /// Rename `from` to `to` in `section` of every loaded branch holding it.
    ///
    /// Not transactional. Branches where `to` already exists are left alone
    /// and reported; the others keep their rename.
    pub fn rename_key_everywhere(
        &self,
        section: &str,
        from: &str,
        to: &str,
    ) -> Result<usize, ConfigError> {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        for branch in self.loaded_branches() {
            let (values, occupied) = branch.read(|file| {
                let values = file.array(section, from).map(|values| {
                    values
                        .iter()
                        .map(|v| v.raw().to_string())
                        .collect::<Vec<_>>()
                });
                (values, file.array(section, to).is_some())
            });
            let Some(values) = values else {
                continue;
            };
            if occupied {
                failed.push(format!("{}/{}", branch.name(), branch.platform()));
                continue;
            }
            let copied = branch.set_array(section, to, &values);
            let removed = branch.remove_key_from_section(section, from);
            if copied && removed {
                succeeded += 1;
            } else {
                failed.push(format!("{}/{}", branch.name(), branch.platform()));
            }
        }

        if failed.is_empty() {
            return Ok(succeeded);
        }
        tracing::warn!(
            section,
            from,
            to,
            succeeded,
            failed = failed.len(),
            "rename partially applied"
        );
        Err(ConfigError::PartialStructuralEdit {
            section: section.to_string(),
            succeeded,
            failed,
        })
    }

    // Plugins

    /// Register a plugin location. Its layers are applied by
    /// [`ConfigContext::add_plugin_to_all_branches`].
    pub fn register_plugin(&self, name: &str, dir: &Path, priority: Option<u16>) -> bool {
        self.write_plugins().register(name, dir, priority)
    }

    /// Activate a plugin and add its layers to every loaded branch; branches
    /// built later pick them up too. Returns the number of layers added.
    pub fn add_plugin_to_all_branches(&self, name: &str) -> usize {
        let (plugin, branches) = {
            let mut plugins = self.write_plugins();
            match plugins.get(name) {
                None => {
                    tracing::warn!(plugin = name, "cannot activate unregistered plugin");
                    return 0;
                }
                Some(plugin) if plugin.active => return 0,
                Some(_) => {}
            }
            let Some(plugin) = plugins.activate(name).cloned() else {
                return 0;
            };
            (plugin, self.loaded_branches())
        };
        let added: usize = branches
            .iter()
            .map(|branch| self.apply_plugin(branch, &plugin))
            .sum();
        tracing::info!(plugin = name, layers = added, "plugin config layers added");
        added
    }

    /// Remove every dynamic layer tagged `tag` from every loaded branch.
    /// Returns the number of branches whose content changed.
    pub fn remove_tag_from_all_branches(&self, tag: &str) -> usize {
        let branches = {
            let mut plugins = self.write_plugins();
            plugins.deactivate(tag);
            self.loaded_branches()
        };
        let changed = branches
            .iter()
            .filter(|branch| !branch.remove_layers_by_tag(&[tag]).is_empty())
            .count();
        tracing::debug!(tag, branches = changed, "removed tagged config layers");
        changed
    }

    fn apply_plugin(&self, branch: &Branch, plugin: &Plugin) -> usize {
        let root = PluginRoot {
            name: &plugin.name,
            dir: &plugin.dir,
        };
        let mut added = 0;
        for path in resolve_plugin_layers(&self.settings, root, branch.name(), branch.platform()) {
            if !path.is_file() {
                continue;
            }
            branch.add_dynamic_layer(&path, Some(&plugin.name), plugin.priority);
            added += 1;
        }
        added
    }

    // Persistence and maintenance

    /// Save one branch of the current platform.
    pub fn flush(&self, name: &str) -> Result<PersistOutcome, ConfigError> {
        let key = (name.to_string(), self.settings.runtime.platform.clone());
        let branch = self
            .read_branches()
            .get(&key)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBranch(name.to_string()))?;
        branch.flush(self.persist_allowed())
    }

    /// Save every branch with unsaved edits. Failures are logged and skipped.
    /// Returns the number of files written or deleted.
    pub fn flush_all(&self) -> usize {
        let allowed = self.persist_allowed();
        let mut touched = 0;
        for branch in self.loaded_branches() {
            if !branch.is_dirty() {
                continue;
            }
            match branch.flush(allowed) {
                Ok(PersistOutcome::Written | PersistOutcome::Deleted) => touched += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(branch = %branch.name(), "failed to save config: {e}"),
            }
        }
        touched
    }

    /// Unload branches idle longer than the configured timeout.
    /// Returns the number unloaded.
    pub fn tick(&self) -> usize {
        let Some(secs) = self.settings.runtime.unload_after_secs else {
            return 0;
        };
        let limit = Duration::from_secs(secs);
        let never = &self.settings.runtime.never_unload;
        self.loaded_branches()
            .iter()
            .filter(|b| !never.iter().any(|n| n == b.name()))
            .filter(|b| !b.is_unloaded() && b.idle_for() >= limit)
            .filter(|b| b.safe_unload())
            .count()
    }

    /// Build `names` for each of `platforms` on scoped worker threads, one per
    /// platform. Returns the number of branches available afterwards.
    pub fn prewarm(&self, platforms: &[&str], names: &[&str]) -> usize {
        std::thread::scope(|scope| {
            let workers: Vec<_> = platforms
                .iter()
                .map(|platform| {
                    scope.spawn(move || {
                        names
                            .iter()
                            .filter(|name| self.prewarm_one(name, platform))
                            .count()
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap_or(0))
                .sum()
        })
    }

    fn prewarm_one(&self, name: &str, platform: &str) -> bool {
        match self.branch_for_platform(name, platform) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(branch = name, platform, "prewarm failed: {e}");
                false
            }
        }
    }

    /// Save what is dirty, then drop every branch and cached source layer.
    pub fn shutdown(&self) {
        let saved = self.flush_all();
        let mut branches = self.write_branches();
        tracing::debug!(branches = branches.len(), saved, "config context shut down");
        branches.clear();
        self.cache.clear();
    }

    fn read_branches(&self) -> RwLockReadGuard<'_, HashMap<BranchKey, Arc<Branch>>> {
        self.branches.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_branches(&self) -> RwLockWriteGuard<'_, HashMap<BranchKey, Arc<Branch>>> {
        self.branches.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_plugins(&self) -> RwLockReadGuard<'_, PluginRegistry> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_plugins(&self) -> RwLockWriteGuard<'_, PluginRegistry> {
        self.plugins.write().unwrap_or_else(|e| e.into_inner())
    }
}
