//! Branch registry for layered configuration.
//!
//! A [`ConfigContext`] resolves each branch's layer hierarchy, merges static,
//! dynamic, saved and command-line layers into one [`strata_core::ConfigFile`],
//! and persists runtime edits as a diff against the source layers.

pub mod branch;
pub mod context;
pub mod dynamic;
pub mod hierarchy;
pub mod overrides;
pub mod persist;
pub mod plugins;
pub mod resolver;
pub mod source_cache;
pub mod version;

pub use branch::{Branch, BuildOptions, LayerInfo, LayerKind, destination};
pub use context::ConfigContext;
pub use dynamic::{DynamicLayer, LayerOrigin, priority};
pub use hierarchy::{Hierarchy, HierarchyKey};
pub use overrides::CommandLineOverrides;
pub use persist::PersistOutcome;
pub use plugins::{Plugin, PluginRegistry};
pub use resolver::{PluginRoot, resolve_hierarchy, resolve_hierarchy_until, resolve_plugin_layers};
pub use source_cache::SourceCache;
pub use version::Migration;
