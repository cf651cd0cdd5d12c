// Configuration management module
// TOML settings file plus the API credential taken from the environment

pub mod interactive;
pub mod settings;


use std::path::{Path, PathBuf};

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GeminiConfig, IndexingConfig, RetrievalConfig, StorageConfig, StorageMode,
};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    Config::config_dir()
}

/// Load variables from a `.env` file in the working directory or one of its parents, if one exists.
///
/// Values already present in the process environment win over the file, so an exported
/// `GEMINI_API_KEY` is never replaced by a stale key in `.env`.
#[inline]
pub fn load_dotenv() {
    report_dotenv(dotenv::dotenv());
}

/// Load variables from the `.env` file at `path`, keeping values already in the environment
#[inline]
pub fn load_dotenv_from(path: &Path) {
    report_dotenv(dotenv::from_path(path).map(|()| path.to_path_buf()));
}

fn report_dotenv(result: Result<PathBuf, dotenv::Error>) {
    match result {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }
}
