use std::path::{Path, PathBuf};

/// XDG application name for the engine's own settings.
pub const APP_NAME: &str = "strata";
/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "STRATA_CONFIG";

fn project_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Settings file path: `$STRATA_CONFIG` if set, else `~/.config/strata/config.toml`.
pub fn settings_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    project_config_dir().map(|dir| dir.join("config.toml"))
}

/// `{USER}` root: the user's documents directory, or home when there is none.
pub fn default_user_dir() -> Option<PathBuf> {
    let user_dirs = directories::UserDirs::new()?;
    Some(
        user_dirs
            .document_dir()
            .unwrap_or_else(|| user_dirs.home_dir())
            .to_path_buf(),
    )
}

/// `{USERSETTINGS}` root.
pub fn default_user_settings_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf())
}

/// `{APPSETTINGS}` root.
pub fn default_app_settings_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Path rendered with forward slashes and a trailing `/`, the form macro
/// values and template roots are substituted in.
pub fn dir_with_slash(path: &Path) -> String {
    let mut text = path.to_string_lossy().replace('\\', "/");
    if !text.ends_with('/') {
        text.push('/');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_settings_path_honours_env() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var(CONFIG_ENV, "/tmp/strata-test/config.toml") };
        assert_eq!(
            settings_path(),
            Some(PathBuf::from("/tmp/strata-test/config.toml"))
        );
        unsafe { std::env::remove_var(CONFIG_ENV) };
        if let Some(path) = settings_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_dir_with_slash() {
        assert_eq!(dir_with_slash(Path::new("/a/b")), "/a/b/");
        assert_eq!(dir_with_slash(Path::new("/a/b/")), "/a/b/");
        assert_eq!(dir_with_slash(Path::new("C:\\x")), "C:/x/");
    }
}
