use anyhow::{Context, Result, bail};
use serde::Serialize;
use strata_cache::{ConfigContext, HierarchyKey, PersistOutcome};
use strata_config::EngineSettings;

use crate::cli::{Cli, EditMode, OutputFormat};

const INI_SWITCH: &str = "-ini:";

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let mut settings = match &cli.settings {
        Some(path) => EngineSettings::load_from(path)?,
        None => EngineSettings::load()?,
    };
    if let Some(platform) = &cli.platform {
        settings.runtime.platform = platform.clone();
    }
    Ok(settings)
}

pub(crate) fn open_context(cli: &Cli) -> Result<ConfigContext> {
    let settings = load_settings(cli)?;
    let switches: Vec<String> = cli.ini.iter().map(|s| ini_switch(s)).collect();
    tracing::debug!(
        platform = %settings.runtime.platform,
        overrides = switches.len(),
        "opening config context"
    );
    Ok(ConfigContext::with_overrides(settings, &switches))
}

/// Accept overrides with or without the leading `-ini:`.
fn ini_switch(arg: &str) -> String {
    if arg.starts_with(INI_SWITCH) {
        arg.to_string()
    } else {
        format!("{INI_SWITCH}{arg}")
    }
}

pub(crate) fn handle_dump(ctx: &ConfigContext, branch: &str, format: OutputFormat) -> Result<()> {
    let branch = ctx.branch(branch)?;
    match format {
        OutputFormat::Text => print!("{}", branch.dump()),
        OutputFormat::Json => {
            let json = branch.read(serde_json::to_string_pretty)?;
            println!("{json}");
        }
    }
    Ok(())
}

pub(crate) fn handle_get(
    ctx: &ConfigContext,
    branch: &str,
    section: &str,
    key: &str,
    array: bool,
    format: OutputFormat,
) -> Result<()> {
    if array {
        let Some(values) = ctx.get_array(branch, section, key) else {
            bail!("[{section}] {key} is not set in {branch}");
        };
        match format {
            OutputFormat::Text => values.iter().for_each(|v| println!("{v}")),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
        }
        return Ok(());
    }

    let Some(value) = ctx.get_string(branch, section, key) else {
        bail!("[{section}] {key} is not set in {branch}");
    };
    match format {
        OutputFormat::Text => println!("{value}"),
        OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
    }
    Ok(())
}

pub(crate) fn handle_set(
    ctx: &ConfigContext,
    branch: &str,
    section: &str,
    key: &str,
    value: &str,
    mode: EditMode,
) -> Result<()> {
    ctx.branch(branch)?;
    let changed = match mode {
        EditMode::Set => ctx.set_string(branch, section, key, value),
        EditMode::Add => ctx.add_to_section(branch, section, key, value),
        EditMode::AddUnique => ctx.add_unique_to_section(branch, section, key, value),
        EditMode::Remove => ctx.remove_from_section(branch, section, key, value),
    };
    save(ctx, branch, changed)
}

pub(crate) fn handle_unset(
    ctx: &ConfigContext,
    branch: &str,
    section: &str,
    key: &str,
) -> Result<()> {
    ctx.branch(branch)?;
    let changed = ctx.remove_key_from_section(branch, section, key);
    save(ctx, branch, changed)
}

pub(crate) fn handle_reset(
    ctx: &ConfigContext,
    branch: &str,
    section: &str,
    key: &str,
) -> Result<()> {
    ctx.branch(branch)?;
    let changed = ctx.reset_key_in_section(branch, section, key);
    save(ctx, branch, changed)
}

fn save(ctx: &ConfigContext, branch: &str, changed: bool) -> Result<()> {
    if !changed {
        eprintln!("No change.");
        return Ok(());
    }
    ctx.mark_boot_complete();
    let outcome = ctx
        .flush(branch)
        .with_context(|| format!("Failed to save branch '{branch}'"))?;
    let path = ctx
        .branch(branch)?
        .destination()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    match outcome {
        PersistOutcome::Written => eprintln!("Saved {path}"),
        PersistOutcome::Deleted => eprintln!("No saved edits remain; removed {path}"),
        PersistOutcome::Unchanged => eprintln!("{path} already up to date"),
        PersistOutcome::Suppressed => eprintln!("Saving is disabled for '{branch}'"),
    }
    Ok(())
}

pub(crate) fn handle_layers(ctx: &ConfigContext, branch: &str, format: OutputFormat) -> Result<()> {
    let layers = ctx.branch(branch)?.describe_layers();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layers)?),
        OutputFormat::Text => {
            for layer in &layers {
                let commands = layer
                    .commands
                    .map(|n| format!("{n} commands"))
                    .unwrap_or_else(|| "not retained".to_string());
                let kind = format!("{:?}", layer.kind);
                let mut line = format!("{kind:<12} {} ({commands})", layer.name);
                if let Some(tag) = &layer.tag {
                    line.push_str(&format!(" tag={tag}"));
                }
                if let Some(priority) = layer.priority {
                    line.push_str(&format!(" priority={priority}"));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct HierarchyRow {
    template: u8,
    expansion: u8,
    platform: u8,
    cache_source: bool,
    exists: bool,
    path: String,
}

pub(crate) fn handle_hierarchy(
    ctx: &ConfigContext,
    branch: &str,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let branch = ctx.branch(branch)?;
    let rows: Vec<HierarchyRow> = branch
        .hierarchy()
        .iter()
        .map(|(key, path)| HierarchyRow {
            template: key.template(),
            expansion: key.expansion(),
            platform: key.platform(),
            cache_source: key.has(HierarchyKey::CACHE_SOURCE),
            exists: path.is_file(),
            path: path.display().to_string(),
        })
        .filter(|row| all || row.exists)
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            for row in &rows {
                let marker = if row.exists { "+" } else { " " };
                println!(
                    "{marker} {:>2}.{}.{} {}",
                    row.template, row.expansion, row.platform, row.path
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_diff(ctx: &ConfigContext, branch: &str) -> Result<()> {
    match ctx.branch(branch)?.render_pending() {
        Some(text) => print!("{text}"),
        None => eprintln!("Nothing to save for '{branch}'."),
    }
    Ok(())
}

pub(crate) fn handle_settings_show(cli: &Cli, format: OutputFormat) -> Result<()> {
    let settings = load_settings(cli)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(&settings)?),
    }
    Ok(())
}

pub(crate) fn handle_settings_init() -> Result<()> {
    let path = EngineSettings::save_default_template()?;
    eprintln!("Wrote settings template to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_ini_switch_prefix_is_optional() {
        assert_eq!(ini_switch("Game:[S]:K=V"), "-ini:Game:[S]:K=V");
        assert_eq!(ini_switch("-ini:Game:[S]:K=V"), "-ini:Game:[S]:K=V");
    }

    #[test]
    fn test_context_honours_platform_and_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings_path = dir.path().join("strata.toml");
        let root = dir.path().to_string_lossy().replace('\\', "/");
        std::fs::write(
            &settings_path,
            format!(
                "[roots]\nengine_dir = \"{root}/Engine\"\nproject_dir = \"{root}/Project\"\n\
                 user_dir = \"{root}/Docs\"\nuser_settings_dir = \"{root}/Local\"\n\
                 app_settings_dir = \"{root}/Roaming\"\n"
            ),
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "strata",
            "get",
            "Game",
            "Core",
            "Foo",
            "--settings",
            settings_path.to_str().unwrap(),
            "--platform",
            "Windows",
            "--ini",
            "Game:[Core]:Foo=7",
        ])
        .unwrap();

        let ctx = open_context(&cli).unwrap();
        assert_eq!(ctx.platform(), "Windows");
        assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(7));
    }
}
