use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect and edit layered configuration branches")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Target platform (defaults to the settings, then the host)
    #[arg(long, global = true)]
    pub platform: Option<String>,

    /// Engine settings file (defaults to STRATA_CONFIG or the user config dir)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Command-line override, e.g. `Game:[/Script/Engine.Player]:MaxHealth=200`
    #[arg(long = "ini", global = true, value_name = "BRANCH:[SECTION]:KEY=VALUE")]
    pub ini: Vec<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the fully merged branch
    Dump { branch: String },

    /// Read one key (expanded)
    Get {
        branch: String,
        section: String,
        key: String,

        /// Print every value of an array key
        #[arg(long)]
        array: bool,
    },

    /// Edit one key and save the branch
    Set {
        branch: String,
        section: String,
        key: String,
        value: String,

        /// How the value is applied
        #[arg(long, value_enum, default_value = "set")]
        mode: EditMode,
    },

    /// Remove every value of a key in the saved layer
    Unset {
        branch: String,
        section: String,
        key: String,
    },

    /// Discard saved edits of a key
    Reset {
        branch: String,
        section: String,
        key: String,
    },

    /// List the layers merged into a branch
    Layers { branch: String },

    /// List resolved layer paths
    Hierarchy {
        branch: String,

        /// Include paths that do not exist
        #[arg(long)]
        all: bool,
    },

    /// Show what saving the branch would write
    Diff { branch: String },

    /// Show or initialize engine settings
    Settings {
        #[command(subcommand)]
        cmd: SettingsCommands,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EditMode {
    Set,
    Add,
    AddUnique,
    Remove,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show effective engine settings
    Show,
    /// Write a commented settings template
    Init,
}
