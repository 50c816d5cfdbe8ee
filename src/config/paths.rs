//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\noise-meter\
//!   macOS:   ~/Library/Application Support/noise-meter/
//!   Linux:   ~/.config/noise-meter/

use std::path::PathBuf;

/// Environment variable naming an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "NOISE_METER_CONFIG";

/// Resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "noise-meter";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
        }
    }

    /// Settings file to load: `$NOISE_METER_CONFIG` when set, otherwise the
    /// platform default.
    pub fn settings_path() -> PathBuf {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::new().settings_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.config_dir.ends_with("noise-meter"));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
    }
}
