// Configuration management module
// Settings come from an optional TOML file overlaid by environment variables

pub mod settings;


use std::path::{Path, PathBuf};

pub use settings::{
    Config, ConfigError, GeminiConfig, IngestConfig, QdrantConfig, RetrievalConfig, ServerConfig,
    mask_secret,
};

pub const ENV_CONFIG_FILE: &str = "RAG_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "textbook-rag.toml";

/// Resolve the TOML file to read, if any.
///
/// An explicitly named file must exist; the default file is optional.
#[inline]
pub fn config_file_path<F>(lookup: F) -> Result<Option<PathBuf>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(ENV_CONFIG_FILE).filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_file() {
                Ok(Some(path))
            } else {
                Err(ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file not found: {}", path.display()),
                )))
            }
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            Ok(default.is_file().then(|| default.to_path_buf()))
        }
    }
}

/// Load configuration from the process environment
#[inline]
pub fn load() -> Result<Config, ConfigError> {
    let lookup = |name: &str| std::env::var(name).ok();
    let file = config_file_path(lookup)?;
    Config::from_sources(file.as_deref(), lookup)
}
