//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\misojo\
//!   macOS:   ~/Library/Application Support/misojo/
//!   Linux:   ~/.config/misojo/
//!
//! Data dir (database + local blobs):
//!   Windows: %LOCALAPPDATA%\misojo\
//!   macOS:   ~/Library/Application Support/misojo/
//!   Linux:   ~/.local/share/misojo/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory holding the database and the local blob tree.
    pub data_dir: PathBuf,
    /// Full path to the SQLite unit store shared by every worker process.
    pub database_file: PathBuf,
    /// Root of the local blob store (sources, pages, tracks).
    pub blobs_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "misojo";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let database_file = data_dir.join("misojo.db");
        let blobs_dir = data_dir.join("blobs");

        Self {
            config_dir,
            settings_file,
            data_dir,
            database_file,
            blobs_dir,
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
        assert!(paths.data_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .database_file
            .file_name()
            .is_some_and(|n| n == "misojo.db"));
    }

    #[test]
    fn database_and_blobs_live_under_data_dir() {
        let paths = AppPaths::new();
        assert!(paths.database_file.starts_with(&paths.data_dir));
        assert!(paths.blobs_dir.starts_with(&paths.data_dir));
    }
}
