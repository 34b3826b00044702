//! Settings for the layered configuration engine itself: where the layer
//! roots live, which layer templates and expansions to resolve, and how
//! platforms inherit from each other.

pub mod layers;
pub mod paths;
pub mod platform;
pub mod settings;

pub use layers::{Expansion, ExpansionModes, LayerTemplate};
pub use platform::platform_ancestry;
pub use settings::{
    EngineSettings, MigrationSettings, PlatformInfo, PluginSettings, ReplayMethod, ResolveMode,
    RootSettings, RuntimeSettings,
};
