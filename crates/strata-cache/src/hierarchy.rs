//! Resolved, ordered layer paths of one branch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Packed priority key: `template << 24 | expansion << 16 | platform << 8 | flags`.
///
/// Ordering by the packed value reproduces the resolver's iteration order:
/// template first, then expansion variant, then platform ancestor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct HierarchyKey(u32);

impl HierarchyKey {
    /// Existence was confirmed during resolution.
    pub const ASSUMED_EXISTS: u8 = 1 << 0;
    /// Platform independent; the parsed stream may be shared between platform branches.
    pub const CACHE_SOURCE: u8 = 1 << 1;

    pub fn new(template: u8, expansion: u8, platform: u8, flags: u8) -> Self {
        Self(
            (u32::from(template) << 24)
                | (u32::from(expansion) << 16)
                | (u32::from(platform) << 8)
                | u32::from(flags),
        )
    }

    pub fn packed(self) -> u32 {
        self.0
    }

    pub fn template(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn expansion(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn platform(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn flags(self) -> u8 {
        self.0 as u8
    }

    pub fn has(self, flag: u8) -> bool {
        self.flags() & flag != 0
    }
}

impl fmt::Debug for HierarchyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HierarchyKey(t{} e{} p{} f{:#04b})",
            self.template(),
            self.expansion(),
            self.platform(),
            self.flags()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hierarchy {
    entries: BTreeMap<HierarchyKey, PathBuf>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer path. Returns false if the path is already present.
    pub fn insert(&mut self, key: HierarchyKey, path: PathBuf) -> bool {
        if self.contains_path(&path) {
            return false;
        }
        self.entries.insert(key, path);
        true
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.entries.values().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HierarchyKey, &Path)> {
        self.entries.iter().map(|(k, p)| (*k, p.as_path()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.values().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_packing() {
        let key = HierarchyKey::new(3, 2, 1, HierarchyKey::CACHE_SOURCE);
        assert_eq!(key.packed(), 0x0302_0102);
        assert_eq!(key.template(), 3);
        assert_eq!(key.expansion(), 2);
        assert_eq!(key.platform(), 1);
        assert!(key.has(HierarchyKey::CACHE_SOURCE));
        assert!(!key.has(HierarchyKey::ASSUMED_EXISTS));
    }

    #[test]
    fn test_order_follows_template_then_expansion_then_platform() {
        let mut hierarchy = Hierarchy::new();
        hierarchy.insert(HierarchyKey::new(1, 0, 0, 0), "b".into());
        hierarchy.insert(HierarchyKey::new(0, 1, 0, 0), "a1".into());
        hierarchy.insert(HierarchyKey::new(0, 0, 2, 0), "a0p2".into());
        hierarchy.insert(HierarchyKey::new(0, 0, 1, HierarchyKey::ASSUMED_EXISTS), "a0p1".into());
        let order: Vec<_> = hierarchy.paths().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(order, vec!["a0p1", "a0p2", "a1", "b"]);
    }

    #[test]
    fn test_duplicate_paths_are_rejected() {
        let mut hierarchy = Hierarchy::new();
        assert!(hierarchy.insert(HierarchyKey::new(0, 0, 0, 0), "x".into()));
        assert!(!hierarchy.insert(HierarchyKey::new(1, 0, 0, 0), "x".into()));
        assert_eq!(hierarchy.len(), 1);
    }
}
