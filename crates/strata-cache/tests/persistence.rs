mod common;

use common::Fixture;
use strata_cache::{ConfigContext, PersistOutcome};
use strata_core::{ConfigError, DIFF_METADATA};

#[test]
fn test_saves_are_suppressed_until_boot_completes() {
    let fixture = Fixture::new().with_standard_layers();
    std::fs::remove_file(fixture.saved_path("Game")).unwrap();
    let ctx = fixture.context();

    assert!(ctx.set_int("Game", "Core", "Foo", 5));
    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Suppressed);
    assert!(fixture.read_saved("Game").is_none());

    ctx.mark_boot_complete();
    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Written);
    let saved = fixture.read_saved("Game").unwrap();
    assert!(saved.starts_with(DIFF_METADATA));
    assert!(saved.contains("[Core]\nFoo=5\n"));
    assert!(saved.ends_with("[CurrentIniVersion]\nVersion=0\n"));
    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Unchanged);
}

#[test]
fn test_saved_diff_holds_only_user_changes() {
    let fixture = Fixture::new().with_standard_layers();
    let ctx = fixture.context();
    ctx.mark_boot_complete();

    ctx.add_unique_to_section("Game", "Core", "Bar", "B");
    ctx.add_unique_to_section("Game", "Core", "Bar", "B");
    ctx.flush("Game").unwrap();

    let saved = fixture.read_saved("Game").unwrap();
    assert!(saved.contains("Foo=3"));
    assert_eq!(saved.matches("Bar=B").count(), 1);
    assert!(!saved.contains("Bar=A"));

    let reopened = fixture.context();
    assert_eq!(reopened.get_int("Game", "Core", "Foo"), Some(3));
    assert_eq!(
        reopened.get_array("Game", "Core", "Bar"),
        Some(vec!["A".to_string(), "B".to_string()])
    );
}

#[test]
fn test_resetting_every_edit_deletes_saved_file() {
    let fixture = Fixture::new().with_standard_layers();
    let ctx = fixture.context();
    ctx.mark_boot_complete();

    assert!(ctx.reset_key_in_section("Game", "Core", "Foo"));
    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(2));
    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Deleted);
    assert!(fixture.read_saved("Game").is_none());
}

#[test]
fn test_flush_all_writes_dirty_branches_only() {
    let fixture = Fixture::new().with_standard_layers();
    fixture.write("Engine/Config/BaseEngine.ini", "[Render]\nQuality=1\n");
    let ctx = fixture.context();
    ctx.mark_boot_complete();
    ctx.branch("Engine").unwrap();

    ctx.set_int("Game", "Core", "Foo", 11);
    assert_eq!(ctx.flush_all(), 1);
    assert!(fixture.read_saved("Engine").is_none());
    assert!(fixture.read_saved("Game").unwrap().contains("Foo=11"));
}

#[test]
fn test_unknown_branch_flush_is_an_error() {
    let fixture = Fixture::new();
    let ctx = fixture.context();
    assert!(matches!(ctx.flush("Nope"), Err(ConfigError::UnknownBranch(_))));
}

#[test]
fn test_newer_source_version_resets_saved_layer() {
    let fixture = Fixture::new();
    fixture.write(
        "Engine/Config/BaseGame.ini",
        "[CurrentIniVersion]\nVersion=2\n[Core]\nFoo=1\n",
    );
    fixture.write_saved(
        "Game",
        "[Core]\nFoo=3\n[Keep]\nValue=1\n[CurrentIniVersion]\nVersion=1\n",
    );
    let mut settings = fixture.settings.clone();
    settings.migration.preserve_sections = vec!["Keep".into()];
    let ctx = ConfigContext::new(settings);
    let branch = ctx.branch("Game").unwrap();

    assert_eq!(branch.saved_version(), 2);
    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(1));
    assert_eq!(ctx.get_int("Game", "Keep", "Value"), Some(1));
    let saved = branch.saved_layer();
    assert!(saved.commands().iter().all(|c| c.section == "Keep"));
    assert!(branch.is_dirty());

    ctx.mark_boot_complete();
    ctx.flush("Game").unwrap();
    let written = fixture.read_saved("Game").unwrap();
    assert!(!written.contains("Foo=3"));
    assert!(written.ends_with("Version=2\n"));
}

#[test]
fn test_version_reset_without_preserve_list_empties_saved_layer() {
    let fixture = Fixture::new();
    fixture.write(
        "Engine/Config/BaseGame.ini",
        "[CurrentIniVersion]\nVersion=2\n[Core]\nFoo=1\n",
    );
    fixture.write_saved("Game", "[Core]\nFoo=3\n[CurrentIniVersion]\nVersion=1\n");
    let ctx = fixture.context();
    let branch = ctx.branch("Game").unwrap();

    assert!(branch.saved_layer().is_empty());
    assert_eq!(branch.saved_version(), 2);
}

#[test]
fn test_older_source_version_keeps_saved_layer() {
    let fixture = Fixture::new();
    fixture.write(
        "Engine/Config/BaseGame.ini",
        "[CurrentIniVersion]\nVersion=2\n[Core]\nFoo=1\n",
    );
    fixture.write_saved("Game", "[Core]\nFoo=3\n[CurrentIniVersion]\nVersion=5\n");
    let ctx = fixture.context();
    let branch = ctx.branch("Game").unwrap();

    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(3));
    assert_eq!(branch.saved_version(), 5);
}

#[test]
fn test_sections_to_save_limits_persisted_sections() {
    let fixture = Fixture::new();
    fixture.write(
        "Engine/Config/BaseGame.ini",
        "[SectionsToSave]\n+Section=Keep\n[Keep]\nA=1\n[Other]\nB=1\n",
    );
    let ctx = fixture.context();
    ctx.mark_boot_complete();
    ctx.set_int("Game", "Keep", "A", 2);
    ctx.set_int("Game", "Other", "B", 2);
    ctx.flush("Game").unwrap();

    let saved = fixture.read_saved("Game").unwrap();
    assert!(saved.contains("[Keep]\nA=2"));
    assert!(!saved.contains("[Other]"));

    let branch = ctx.branch("Game").unwrap();
    branch.set_allow_full_section_save(true);
    ctx.flush("Game").unwrap();
    assert!(fixture.read_saved("Game").unwrap().contains("[Other]\nB=2"));
}

#[test]
fn test_no_persist_branch_is_never_written() {
    let fixture = Fixture::new().with_standard_layers();
    let ctx = fixture.context();
    ctx.branch("Game").unwrap().set_no_persist(true);
    ctx.mark_boot_complete();
    ctx.set_int("Game", "Core", "Foo", 8);

    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Suppressed);
    assert_eq!(fixture.read_saved("Game").unwrap(), "[Core]\nFoo=3\n");
}

#[test]
fn test_writes_disabled_never_touch_disk() {
    let mut fixture = Fixture::new().with_standard_layers();
    fixture.settings.runtime.writes_allowed = false;
    let ctx = fixture.context();
    ctx.mark_boot_complete();
    ctx.set_int("Game", "Core", "Foo", 8);

    assert_eq!(ctx.flush("Game").unwrap(), PersistOutcome::Suppressed);
    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(8));
}

#[test]
fn test_command_line_overrides_win_but_are_not_saved() {
    let fixture = Fixture::new().with_standard_layers();
    let ctx = ConfigContext::with_overrides(
        fixture.settings.clone(),
        &["-ini:Game:[Core]:Foo=9,[Core]:+Bar=Z"],
    );
    ctx.mark_boot_complete();

    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(9));
    assert_eq!(
        ctx.get_array("Game", "Core", "Bar"),
        Some(vec!["A".to_string(), "Z".to_string()])
    );

    ctx.set_int("Game", "Core", "Foo", 4);
    assert_eq!(ctx.get_int("Game", "Core", "Foo"), Some(9));
    ctx.flush("Game").unwrap();
    let saved = fixture.read_saved("Game").unwrap();
    assert!(saved.contains("Foo=4"));
    assert!(!saved.contains("Foo=9"));
    assert!(!saved.contains("Bar=Z"));
}
