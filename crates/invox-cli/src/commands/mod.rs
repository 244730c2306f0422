//! Subcommands and the configuration loading they share.

pub mod batch;
pub mod config;
pub mod process;
pub mod records;

use std::path::{Path, PathBuf};

use invox_core::InvoxConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invox")
        .join("config.json")
}

/// The explicit `--config` path, or the default location.
pub fn resolve_config_path(config_path: Option<&str>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Load configuration and apply environment overrides.
///
/// An explicit path must exist; the default location falls back to
/// built-in defaults when absent.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvoxConfig> {
    let config = match config_path {
        Some(path) => read_config(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                read_config(&path)?
            } else {
                InvoxConfig::default()
            }
        }
    };

    Ok(config.with_env_overrides())
}

fn read_config(path: &Path) -> anyhow::Result<InvoxConfig> {
    InvoxConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))
}

/// Content type for a file, guessed from its extension.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
