//! One composed configuration: a logical name on a target platform.
//!
//! Merge order is static layers (hierarchy order), then dynamic layers
//! (priority, then insertion), then the saved layer, then command-line
//! overrides. Runtime edits go into the saved layer, so the final file always
//! equals a rebuild from those four inputs.
//!
//! Lock order: `layers` before `file`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use strata_config::{EngineSettings, ReplayMethod};
use strata_core::{
    CommandStream, ConfigError, ConfigFile, LayerSource, calculate_diff, parse_stream,
    read_stream, write_file,
};

use crate::dynamic::{DynamicLayers, LayerOrigin};
use crate::hierarchy::{Hierarchy, HierarchyKey};
use crate::persist::{self, PersistOutcome};
use crate::resolver::resolve_hierarchy;
use crate::source_cache::SourceCache;
use crate::version::{self, Migration};

/// Inputs to [`Branch::build`] owned by the registry.
pub struct BuildOptions<'a> {
    pub settings: &'a EngineSettings,
    pub cache: Arc<SourceCache>,
    pub overrides: CommandStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Static,
    Dynamic,
    Saved,
    CommandLine,
}

/// One row of [`Branch::describe_layers`].
#[derive(Debug, Clone, Serialize)]
pub struct LayerInfo {
    pub kind: LayerKind,
    pub name: String,
    /// Command count, when the layer is held in memory.
    pub commands: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

#[derive(Debug)]
struct Layers {
    /// Retained only with full replay.
    static_streams: Vec<Arc<CommandStream>>,
    /// Retained only with dynamic-layer replay.
    static_baseline: Option<ConfigFile>,
    /// Static plus dynamic layers. `None` while unloaded.
    source: Option<ConfigFile>,
    dynamic: DynamicLayers,
    saved: CommandStream,
    saved_version: i64,
    source_version: i64,
    overrides: CommandStream,
    /// Sections deleted with [`Branch::remove_section`]; stripped again on reload.
    removed_sections: BTreeSet<String>,
}

pub struct Branch {
    name: String,
    platform: String,
    hierarchy: Hierarchy,
    replay: ReplayMethod,
    destination: Option<PathBuf>,
    cache: Arc<SourceCache>,
    layers: Mutex<Layers>,
    file: RwLock<ConfigFile>,
    unloaded: AtomicBool,
    last_access: Mutex<Instant>,
}

impl Branch {
    /// Resolve, read and merge every layer of `name` on `platform`.
    ///
    /// Fails only when writes are enabled and no saved-config destination can
    /// be derived for the branch.
    pub fn build(
        name: &str,
        platform: &str,
        options: BuildOptions<'_>,
    ) -> Result<Self, ConfigError> {
        let settings = options.settings;
        let destination = destination(settings, name, platform);
        if settings.runtime.writes_allowed && destination.is_none() {
            return Err(ConfigError::UnresolvedDestination {
                branch: name.to_string(),
                platform: platform.to_string(),
            });
        }

        let hierarchy = resolve_hierarchy(settings, name, platform);
        let statics = load_static(&hierarchy, &options.cache, &BTreeSet::new());
        let static_file = combine(name, &statics);
        let source_version = version::source_version(&static_file);

        let (mut saved, mut saved_version) = match destination.as_deref().and_then(read_layer) {
            Some(mut stream) => {
                let version = version::take_saved_version(&mut stream);
                (stream, version)
            }
            None => (empty_stream(format!("{name} (saved)")), 0),
        };
        let migration = version::migrate(
            name,
            &mut saved,
            &mut saved_version,
            source_version,
            &settings.migration.preserve_sections,
        );

        let replay = settings.runtime.replay;
        let mut file = compose(&static_file, &saved, &options.overrides);
        file.dirty = matches!(migration, Migration::Reset { .. });

        tracing::debug!(
            branch = name,
            platform,
            layers = statics.len(),
            replay = ?replay,
            "built config branch"
        );

        let layers = Layers {
            static_streams: if replay == ReplayMethod::Full {
                statics
            } else {
                Vec::new()
            },
            static_baseline: (replay == ReplayMethod::DynamicLayer).then(|| static_file.clone()),
            source: Some(static_file),
            dynamic: DynamicLayers::default(),
            saved,
            saved_version,
            source_version,
            overrides: options.overrides,
            removed_sections: BTreeSet::new(),
        };

        Ok(Self {
            name: name.to_string(),
            platform: platform.to_string(),
            hierarchy,
            replay,
            destination,
            cache: options.cache,
            layers: Mutex::new(layers),
            file: RwLock::new(file),
            unloaded: AtomicBool::new(false),
            last_access: Mutex::new(Instant::now()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn replay(&self) -> ReplayMethod {
        self.replay
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Where the saved layer is persisted.
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    /// Run `f` against the final file under a shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&ConfigFile) -> R) -> R {
        self.touch();
        f(&self.read_final())
    }

    pub fn snapshot(&self) -> ConfigFile {
        self.read(ConfigFile::clone)
    }

    pub fn saved_layer(&self) -> CommandStream {
        self.lock_layers().saved.clone()
    }

    pub fn saved_version(&self) -> i64 {
        self.lock_layers().saved_version
    }

    pub fn source_version(&self) -> i64 {
        self.lock_layers().source_version
    }

    pub fn dynamic_layer_count(&self) -> usize {
        self.lock_layers().dynamic.len()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.read_final().dirty
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub fn set_no_persist(&self, no_persist: bool) {
        self.write_final().no_persist = no_persist;
    }

    pub fn set_allow_full_section_save(&self, allow: bool) {
        self.write_final().allow_full_section_save = allow;
    }

    // Dynamic layers

    /// Add a layer file above the existing dynamic layers of lower or equal
    /// priority. Returns the sections whose resolved content changed.
    pub fn add_dynamic_layer(
        &self,
        path: &Path,
        tag: Option<&str>,
        priority: u16,
    ) -> BTreeSet<String> {
        let Some(stream) = read_layer(path) else {
            tracing::debug!(
                branch = %self.name,
                path = %path.display(),
                "dynamic layer not present"
            );
            return BTreeSet::new();
        };
        self.insert_dynamic(
            LayerOrigin::File(path.to_path_buf()),
            stream,
            tag.map(str::to_string),
            priority,
        )
    }

    /// Add an in-memory layer, e.g. a hotfix payload.
    pub fn add_dynamic_layer_string(
        &self,
        name: &str,
        contents: &str,
        tag: Option<&str>,
        priority: u16,
    ) -> BTreeSet<String> {
        self.insert_dynamic(
            LayerOrigin::Text,
            parse_stream(name, contents),
            tag.map(str::to_string),
            priority,
        )
    }

    /// Drop every dynamic layer tagged with one of `tags` and recompute.
    pub fn remove_layers_by_tag(&self, tags: &[&str]) -> BTreeSet<String> {
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        self.touch();
        let removed = layers.dynamic.remove_tagged(tags);
        if removed.is_empty() {
            return BTreeSet::new();
        }
        tracing::debug!(branch = %self.name, removed = removed.len(), "removed dynamic layers");
        self.recompute(&mut layers)
    }

    fn insert_dynamic(
        &self,
        origin: LayerOrigin,
        stream: CommandStream,
        tag: Option<String>,
        priority: u16,
    ) -> BTreeSet<String> {
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        self.touch();

        let stream = strip_sections(
            stream.with_tag(tag.clone(), priority),
            &layers.removed_sections,
        );
        let stream = Arc::new(stream);
        let (_, index) = layers.dynamic.insert(origin, Arc::clone(&stream), tag, priority);

        if index + 1 == layers.dynamic.len()
            && let Some(source) = layers.source.as_mut()
        {
            source.apply_stream(&stream);
            self.refresh_final(&layers)
        } else {
            self.recompute(&mut layers)
        }
    }

    // Sanctioned mutations

    pub fn set_value(&self, section: &str, key: &str, raw: &str) -> bool {
        self.edit_key(section, key, |user| user.set_value(section, key, raw))
    }

    pub fn set_array(&self, section: &str, key: &str, values: &[String]) -> bool {
        self.edit_key(section, key, |user| user.set_array(section, key, values))
    }

    pub fn add_to_section(&self, section: &str, key: &str, raw: &str) -> bool {
        self.edit_key(section, key, |user| user.add_to_section(section, key, raw))
    }

    pub fn add_unique_to_section(&self, section: &str, key: &str, raw: &str) -> bool {
        self.edit_key(section, key, |user| {
            user.add_unique_to_section(section, key, raw)
        })
    }

    pub fn remove_key_from_section(&self, section: &str, key: &str) -> bool {
        self.edit_key(section, key, |user| user.remove_key_from_section(section, key))
    }

    pub fn remove_from_section(&self, section: &str, key: &str, raw: &str) -> bool {
        self.edit_key(section, key, |user| {
            user.remove_from_section(section, key, raw)
        })
    }

    /// Discard saved-layer edits of one key, returning it to the source value.
    pub fn reset_key_in_section(&self, section: &str, key: &str) -> bool {
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        self.touch();
        if layers.saved.remove_key(section, key) == 0 {
            return false;
        }
        let mut base = ConfigFile::new(self.name.as_str());
        if let Some(source) = &layers.source {
            base.copy_key_from(source, section, key);
        }
        self.apply_key_to_final(&layers, &base, section, key);
        true
    }

    /// Apply `edit` to the user view (source plus saved) of one key, then
    /// store the result in the saved layer as a diff against the source.
    fn edit_key(
        &self,
        section: &str,
        key: &str,
        edit: impl FnOnce(&mut ConfigFile) -> bool,
    ) -> bool {
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        self.touch();

        let mut base = ConfigFile::new(self.name.as_str());
        match &layers.source {
            Some(source) => base.copy_key_from(source, section, key),
            None => return false,
        }
        let mut user = base.clone();
        for command in layers
            .saved
            .commands()
            .iter()
            .filter(|c| c.section == section && c.key == key)
        {
            if let Err(reason) = user.process_command(section, key, command.value.clone()) {
                tracing::debug!(
                    branch = %self.name,
                    section,
                    key,
                    "skipping saved command: {reason}"
                );
            }
        }
        if !edit(&mut user) {
            return false;
        }

        let patch = calculate_diff(&base, &user);
        layers.saved.remove_key(section, key);
        for command in patch.commands() {
            layers.saved.push(command.clone());
        }
        self.apply_key_to_final(&layers, &user, section, key);
        true
    }

    /// Replace one key of the final file with `user`'s state, then re-apply
    /// command-line overrides for that key.
    fn apply_key_to_final(&self, layers: &Layers, user: &ConfigFile, section: &str, key: &str) {
        let mut file = self.write_final();
        file.copy_key_from(user, section, key);
        for command in layers
            .overrides
            .commands()
            .iter()
            .filter(|c| c.section == section && c.key == key)
        {
            if let Err(reason) = file.process_command(section, key, command.value.clone()) {
                tracing::debug!(branch = %self.name, section, key, "skipping override: {reason}");
            }
        }
        file.dirty = true;
    }

    /// Delete `section` from every layer. The removal survives unload/reload.
    pub fn remove_section(&self, section: &str) -> bool {
        let mut guard = self.lock_layers();
        self.ensure_loaded(&mut guard);
        self.touch();
        let layers = &mut *guard;
        layers.removed_sections.insert(section.to_string());

        let mut touched = false;
        for stream in layers.static_streams.iter_mut() {
            touched |= Arc::make_mut(stream).remove_section(section) > 0;
        }
        if let Some(baseline) = layers.static_baseline.as_mut() {
            touched |= baseline.remove_section(section);
        }
        for layer in layers.dynamic.iter_mut() {
            if let Some(stream) = layer.stream.as_mut() {
                touched |= Arc::make_mut(stream).remove_section(section) > 0;
            }
        }
        touched |= layers.saved.remove_section(section) > 0;
        touched |= layers.overrides.remove_section(section) > 0;
        if let Some(source) = layers.source.as_mut() {
            touched |= source.remove_section(section);
        }

        let mut file = self.write_final();
        touched |= file.remove_section(section);
        if touched {
            file.dirty = true;
        }
        touched
    }

    // Unload / reload

    /// Drop retained static data and re-readable dynamic layers. The final
    /// file stays readable; the next operation that needs layers reloads.
    pub fn safe_unload(&self) -> bool {
        let mut layers = self.lock_layers();
        if self.is_unloaded() {
            return false;
        }
        layers.static_streams = Vec::new();
        layers.static_baseline = None;
        layers.source = None;
        for layer in layers.dynamic.iter_mut() {
            if matches!(layer.origin, LayerOrigin::File(_)) {
                layer.stream = None;
            }
        }
        self.unloaded.store(true, Ordering::Release);
        tracing::info!(branch = %self.name, platform = %self.platform, "unloaded config branch");
        true
    }

    /// Re-read everything dropped by [`Branch::safe_unload`].
    pub fn safe_reload(&self) -> bool {
        let mut layers = self.lock_layers();
        if !self.is_unloaded() {
            return false;
        }
        self.reload_locked(&mut layers);
        true
    }

    fn ensure_loaded(&self, layers: &mut Layers) {
        if self.is_unloaded() {
            self.reload_locked(layers);
        }
    }

    fn reload_locked(&self, layers: &mut Layers) {
        let statics = load_static(&self.hierarchy, &self.cache, &layers.removed_sections);
        let static_file = combine(&self.name, &statics);
        layers.source_version = version::source_version(&static_file);
        match self.replay {
            ReplayMethod::Full => layers.static_streams = statics,
            ReplayMethod::DynamicLayer => layers.static_baseline = Some(static_file.clone()),
            ReplayMethod::None => {}
        }

        for layer in layers.dynamic.iter_mut() {
            if layer.stream.is_some() {
                continue;
            }
            if let LayerOrigin::File(path) = &layer.origin {
                let stream = read_layer(path)
                    .unwrap_or_else(|| empty_stream(path.display().to_string()))
                    .with_tag(layer.tag.clone(), layer.priority);
                layer.stream = Some(Arc::new(strip_sections(stream, &layers.removed_sections)));
            }
        }

        let mut source = static_file;
        apply_dynamic(&mut source, &layers.dynamic);
        layers.source = Some(source);
        self.unloaded.store(false, Ordering::Release);
        self.refresh_final(layers);
        tracing::info!(branch = %self.name, platform = %self.platform, "reloaded config branch");
    }

    /// Static layers merged, from whatever the replay method retained.
    fn static_file(&self, layers: &Layers) -> ConfigFile {
        match (self.replay, &layers.static_baseline) {
            (ReplayMethod::Full, _) => combine(&self.name, &layers.static_streams),
            (ReplayMethod::DynamicLayer, Some(baseline)) => baseline.clone(),
            _ => {
                tracing::debug!(
                    branch = %self.name,
                    "no static baseline retained, re-reading layers"
                );
                let statics = load_static(&self.hierarchy, &self.cache, &layers.removed_sections);
                combine(&self.name, &statics)
            }
        }
    }

    fn recompute(&self, layers: &mut Layers) -> BTreeSet<String> {
        let mut source = self.static_file(layers);
        apply_dynamic(&mut source, &layers.dynamic);
        layers.source = Some(source);
        self.refresh_final(layers)
    }

    fn refresh_final(&self, layers: &Layers) -> BTreeSet<String> {
        let Some(source) = &layers.source else {
            return BTreeSet::new();
        };
        let fresh = compose(source, &layers.saved, &layers.overrides);
        let mut file = self.write_final();
        let changed = file.changed_sections(&fresh);
        file.replace_contents(&fresh);
        changed
    }

    // Persistence

    /// Persist the saved layer as a diff against the source layers.
    /// `allowed` carries the registry's boot and write gates.
    pub fn flush(&self, allowed: bool) -> Result<PersistOutcome, ConfigError> {
        if !allowed {
            tracing::debug!(branch = %self.name, "config writes not yet allowed, suppressing save");
            return Ok(PersistOutcome::Suppressed);
        }
        let Some(dest) = &self.destination else {
            return Ok(PersistOutcome::Suppressed);
        };
        let layers = {
            let mut layers = self.lock_layers();
            self.ensure_loaded(&mut layers);
            layers
        };
        if self.read_final().no_persist {
            return Ok(PersistOutcome::Suppressed);
        }
        let content = self.render_locked(&layers);
        let outcome = persist::save(dest, content.as_deref())?;
        self.write_final().dirty = false;
        Ok(outcome)
    }

    /// Text [`Branch::flush`] would write, or `None` when the saved file
    /// would be removed.
    pub fn render_pending(&self) -> Option<String> {
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        self.render_locked(&layers)
    }

    fn render_locked(&self, layers: &Layers) -> Option<String> {
        let source = layers.source.as_ref()?;
        let allow_full = self.read_final().allow_full_section_save;
        let version = layers.saved_version.max(layers.source_version);
        persist::render_saved(source, &layers.saved, version, allow_full)
    }

    // Inspection

    /// Retained static streams. Only full replay keeps them.
    pub fn static_layers(&self) -> Result<Vec<Arc<CommandStream>>, ConfigError> {
        if self.replay != ReplayMethod::Full {
            return Err(ConfigError::ReplayUnavailable(self.name.clone()));
        }
        let mut layers = self.lock_layers();
        self.ensure_loaded(&mut layers);
        Ok(layers.static_streams.clone())
    }

    /// Final file in the text format.
    pub fn dump(&self) -> String {
        self.read(write_file)
    }

    pub fn describe_layers(&self) -> Vec<LayerInfo> {
        let mut out: Vec<LayerInfo> = match self.static_layers() {
            Ok(streams) => streams
                .iter()
                .map(|s| LayerInfo {
                    kind: LayerKind::Static,
                    name: s.name().to_string(),
                    commands: Some(s.len()),
                    tag: None,
                    priority: None,
                })
                .collect(),
            Err(_) => self
                .hierarchy
                .paths()
                .filter(|p| p.exists())
                .map(|p| LayerInfo {
                    kind: LayerKind::Static,
                    name: p.display().to_string(),
                    commands: None,
                    tag: None,
                    priority: None,
                })
                .collect(),
        };

        let layers = self.lock_layers();
        out.extend(layers.dynamic.iter().map(|layer| LayerInfo {
            kind: LayerKind::Dynamic,
            name: layer.name(),
            commands: layer.stream.as_ref().map(|s| s.len()),
            tag: layer.tag.clone(),
            priority: Some(layer.priority),
        }));
        out.push(LayerInfo {
            kind: LayerKind::Saved,
            name: self
                .destination
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| layers.saved.name().to_string()),
            commands: Some(layers.saved.len()),
            tag: None,
            priority: None,
        });
        if !layers.overrides.is_empty() {
            out.push(LayerInfo {
                kind: LayerKind::CommandLine,
                name: layers.overrides.name().to_string(),
                commands: Some(layers.overrides.len()),
                tag: None,
                priority: None,
            });
        }
        out
    }

    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn lock_layers(&self) -> MutexGuard<'_, Layers> {
        self.layers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_final(&self) -> RwLockReadGuard<'_, ConfigFile> {
        self.file.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_final(&self) -> RwLockWriteGuard<'_, ConfigFile> {
        self.file.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Saved-layer path for `name` on `platform`. `None` when either cannot be
/// used as a path component.
pub fn destination(settings: &EngineSettings, name: &str, platform: &str) -> Option<PathBuf> {
    fn usable(component: &str) -> bool {
        !component.trim().is_empty()
            && component != "."
            && component != ".."
            && !component.contains(['/', '\\', ':'])
    }
    if !usable(name) || !usable(platform) {
        return None;
    }
    Some(settings.saved_config_dir(platform).join(format!("{name}.ini")))
}

fn load_static(
    hierarchy: &Hierarchy,
    cache: &SourceCache,
    removed: &BTreeSet<String>,
) -> Vec<Arc<CommandStream>> {
    let mut streams = Vec::new();
    for (key, path) in hierarchy.iter() {
        let loaded = if key.has(HierarchyKey::CACHE_SOURCE) {
            cache.load(path)
        } else {
            read_stream(path).map(|s| s.map(Arc::new))
        };
        match loaded {
            Ok(Some(stream)) if removed.is_empty() => streams.push(stream),
            Ok(Some(stream)) => streams.push(Arc::new(strip_sections((*stream).clone(), removed))),
            Ok(None) => {
                if key.has(HierarchyKey::ASSUMED_EXISTS) {
                    tracing::warn!(path = %path.display(), "layer vanished after resolution");
                }
            }
            Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable layer: {e}"),
        }
    }
    streams
}

fn read_layer(path: &Path) -> Option<CommandStream> {
    match read_stream(path) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(path = %path.display(), "skipping unreadable layer: {e}");
            None
        }
    }
}

fn combine(name: &str, streams: &[Arc<CommandStream>]) -> ConfigFile {
    let mut file = ConfigFile::new(name);
    for stream in streams {
        file.apply_stream(stream);
    }
    file
}

fn apply_dynamic(source: &mut ConfigFile, dynamic: &DynamicLayers) {
    for layer in dynamic.iter() {
        if let Some(stream) = &layer.stream {
            source.apply_stream(stream);
        }
    }
}

fn compose(source: &ConfigFile, saved: &CommandStream, overrides: &CommandStream) -> ConfigFile {
    let mut file = source.clone();
    file.apply_stream(saved);
    file.apply_stream(overrides);
    file.dirty = false;
    file
}

fn strip_sections(mut stream: CommandStream, removed: &BTreeSet<String>) -> CommandStream {
    if !removed.is_empty() {
        stream.retain_sections(|section| !removed.contains(section));
    }
    stream
}

fn empty_stream(name: String) -> CommandStream {
    CommandStream::new(LayerSource {
        name,
        content_hash: String::new(),
    })
}

#[cfg(test)]
#[path = "branch_tests.rs"]
mod tests;
