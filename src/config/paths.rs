//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\live-context\
//!   macOS:   ~/Library/Application Support/live-context/
//!   Linux:   ~/.config/live-context/
//!
//! Data dir (models):
//!   Windows: %LOCALAPPDATA%\live-context\
//!   macOS:   ~/Library/Application Support/live-context/
//!   Linux:   ~/.local/share/live-context/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "live-context";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            models_dir,
        }
    }

    /// Full path of a GGML model file under [`models_dir`](Self::models_dir).
    ///
    /// `model` is the bare name from [`SttConfig::model`], e.g. `"small"` →
    /// `<models_dir>/ggml-small.bin`.
    ///
    /// [`SttConfig::model`]: crate::config::SttConfig::model
    pub fn model_file(&self, model: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{model}.bin"))
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
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
    }

    #[test]
    fn model_file_uses_ggml_naming() {
        let paths = AppPaths::new();

        let p = paths.model_file("small");
        assert!(p.starts_with(&paths.models_dir));
        assert!(p.to_str().unwrap().ends_with("ggml-small.bin"));

        // Wired to the configured model name.
        let stt = crate::config::SttConfig::default();
        let p = paths.model_file(&stt.model);
        assert!(p.to_str().unwrap().ends_with("ggml-small.bin"));
    }
}
