//! Layered configuration data model and merge engine.
//!
//! Layers are parsed into [`CommandStream`]s and applied in priority order onto
//! a [`ConfigFile`]. Nothing here knows about paths, branches, or persistence.

pub mod access;
pub mod diff;
pub mod error;
pub mod expand;
pub mod file;
pub mod parser;
pub mod section;
pub mod stream;
pub mod typed;
pub mod value;
pub mod writer;

pub use access::{AccessRecord, AccessTracker, SuppressGuard};
pub use diff::calculate_diff;
pub use error::{ConfigError, ParseDiagnostic};
pub use expand::MacroTable;
pub use file::ConfigFile;
pub use parser::{parse_stream, read_stream};
pub use section::Section;
pub use stream::{Command, CommandStream, LayerSource};
pub use typed::ConfigValueType;
pub use value::{ConfigValue, ValueOp};
pub use writer::{DIFF_METADATA, write_file, write_stream};
