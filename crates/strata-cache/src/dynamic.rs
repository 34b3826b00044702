//! Ordered dynamic layers of a branch.

use std::path::PathBuf;
use std::sync::Arc;

use strata_core::CommandStream;

/// Conventional priorities for dynamic layers. Higher merges later.
pub mod priority {
    pub const UNKNOWN: u16 = 0;
    pub const PLUGIN: u16 = 20;
    pub const GAME_FEATURE: u16 = 50;
    pub const HOTFIX: u16 = 80;
}

/// Where a dynamic layer's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOrigin {
    File(PathBuf),
    /// Supplied in memory; cannot be re-read, so it is never dropped on unload.
    Text,
}

#[derive(Debug, Clone)]
pub struct DynamicLayer {
    pub id: u64,
    pub origin: LayerOrigin,
    /// `None` while the branch is unloaded and the layer can be re-read from disk.
    pub stream: Option<Arc<CommandStream>>,
    pub tag: Option<String>,
    pub priority: u16,
}

impl DynamicLayer {
    pub fn name(&self) -> String {
        match (&self.origin, &self.stream) {
            (LayerOrigin::File(path), _) => path.display().to_string(),
            (LayerOrigin::Text, Some(stream)) => stream.name().to_string(),
            (LayerOrigin::Text, None) => format!("<text #{}>", self.id),
        }
    }
}

#[derive(Debug, Default)]
pub struct DynamicLayers {
    layers: Vec<DynamicLayer>,
    next_id: u64,
}

impl DynamicLayers {
    /// Insert before the first layer with a higher priority; equal priorities
    /// keep insertion order. Returns the new layer's id and index.
    pub fn insert(
        &mut self,
        origin: LayerOrigin,
        stream: Arc<CommandStream>,
        tag: Option<String>,
        priority: u16,
    ) -> (u64, usize) {
        let id = self.next_id;
        self.next_id += 1;
        let index = self
            .layers
            .iter()
            .position(|l| l.priority > priority)
            .unwrap_or(self.layers.len());
        self.layers.insert(
            index,
            DynamicLayer {
                id,
                origin,
                stream: Some(stream),
                tag,
                priority,
            },
        );
        (id, index)
    }

    /// Remove every layer whose tag is in `tags`.
    pub fn remove_tagged(&mut self, tags: &[&str]) -> Vec<DynamicLayer> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.layers.len());
        for layer in self.layers.drain(..) {
            if layer.tag.as_deref().is_some_and(|t| tags.contains(&t)) {
                removed.push(layer);
            } else {
                kept.push(layer);
            }
        }
        self.layers = kept;
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicLayer> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DynamicLayer> {
        self.layers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::parse_stream;

    fn stream(name: &str) -> Arc<CommandStream> {
        Arc::new(parse_stream(name, "[S]\nK=1\n"))
    }

    fn order(layers: &DynamicLayers) -> Vec<String> {
        layers.iter().map(DynamicLayer::name).collect()
    }

    #[test]
    fn test_priority_insertion_is_stable() {
        let mut layers = DynamicLayers::default();
        layers.insert(LayerOrigin::Text, stream("hotfix"), None, priority::HOTFIX);
        layers.insert(LayerOrigin::Text, stream("plugin-a"), None, priority::PLUGIN);
        let (_, index) =
            layers.insert(LayerOrigin::Text, stream("plugin-b"), None, priority::PLUGIN);
        assert_eq!(index, 1);
        layers.insert(LayerOrigin::Text, stream("feature"), None, priority::GAME_FEATURE);
        assert_eq!(order(&layers), vec!["plugin-a", "plugin-b", "feature", "hotfix"]);
    }

    #[test]
    fn test_remove_tagged() {
        let mut layers = DynamicLayers::default();
        layers.insert(LayerOrigin::Text, stream("a"), Some("x".into()), 0);
        layers.insert(LayerOrigin::Text, stream("b"), Some("y".into()), 0);
        layers.insert(LayerOrigin::Text, stream("c"), None, 0);
        let removed = layers.remove_tagged(&["x", "z"]);
        assert_eq!(removed.len(), 1);
        assert_eq!(order(&layers), vec!["b", "c"]);
        assert!(layers.remove_tagged(&["x"]).is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut layers = DynamicLayers::default();
        let (a, _) = layers.insert(LayerOrigin::Text, stream("a"), Some("t".into()), 0);
        layers.remove_tagged(&["t"]);
        let (b, _) = layers.insert(LayerOrigin::Text, stream("b"), None, 0);
        assert_ne!(a, b);
    }
}
