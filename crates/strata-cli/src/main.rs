use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, SettingsCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Output to stderr; RUST_LOG wins over -v.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init()
        .ok();

    let format = cli.format;
    if let Commands::Settings { cmd } = &cli.command {
        return match cmd {
            SettingsCommands::Show => commands::handle_settings_show(&cli, format),
            SettingsCommands::Init => commands::handle_settings_init(),
        };
    }

    let ctx = commands::open_context(&cli)?;
    match cli.command {
        Commands::Dump { branch } => commands::handle_dump(&ctx, &branch, format),
        Commands::Get {
            branch,
            section,
            key,
            array,
        } => commands::handle_get(&ctx, &branch, &section, &key, array, format),
        Commands::Set {
            branch,
            section,
            key,
            value,
            mode,
        } => commands::handle_set(&ctx, &branch, &section, &key, &value, mode),
        Commands::Unset {
            branch,
            section,
            key,
        } => commands::handle_unset(&ctx, &branch, &section, &key),
        Commands::Reset {
            branch,
            section,
            key,
        } => commands::handle_reset(&ctx, &branch, &section, &key),
        Commands::Layers { branch } => commands::handle_layers(&ctx, &branch, format),
        Commands::Hierarchy { branch, all } => {
            commands::handle_hierarchy(&ctx, &branch, all, format)
        }
        Commands::Diff { branch } => commands::handle_diff(&ctx, &branch),
        Commands::Settings { .. } => Ok(()),
    }
}
