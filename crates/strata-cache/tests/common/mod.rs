#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use strata_cache::ConfigContext;
use strata_config::EngineSettings;
use tempfile::TempDir;

pub const PLATFORM: &str = "Linux";

/// An engine/project tree in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub settings: EngineSettings,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let mut settings = EngineSettings::default();
        settings.roots.engine_dir = root.join("Engine");
        settings.roots.project_dir = root.join("Project");
        settings.roots.user_dir = Some(root.join("Docs"));
        settings.roots.user_settings_dir = Some(root.join("Local"));
        settings.roots.app_settings_dir = Some(root.join("Roaming"));
        settings.runtime.platform = PLATFORM.to_string();
        Self { dir, settings }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    pub fn saved_path(&self, branch: &str) -> PathBuf {
        self.settings
            .saved_config_dir(PLATFORM)
            .join(format!("{branch}.ini"))
    }

    pub fn write_saved(&self, branch: &str, text: &str) {
        let path = self.saved_path(branch);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    pub fn read_saved(&self, branch: &str) -> Option<String> {
        fs::read_to_string(self.saved_path(branch)).ok()
    }

    pub fn context(&self) -> ConfigContext {
        ConfigContext::new(self.settings.clone())
    }

    /// The layers used by most scenarios: engine base, project default and a
    /// saved override of `Foo`.
    pub fn with_standard_layers(self) -> Self {
        self.write("Engine/Config/BaseGame.ini", "[Core]\nFoo=1\n");
        self.write("Project/Config/DefaultGame.ini", "[Core]\nFoo=2\n+Bar=A\n");
        self.write_saved("Game", "[Core]\nFoo=3\n");
        self
    }
}
