pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, ContentType};

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(text, |caps: &regex::Captures| {
        let var_name = caps.get(1).unwrap().as_str();

        std::env::var(var_name).unwrap_or_else(|_| caps.get(0).unwrap().as_str().to_string())
    })
    .to_string()
}

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/recpub/config.yml
/// 3. /etc/recpub/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/recpub/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Per-run replacements for config values, taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// rclone remote name; a trailing ':' is accepted and dropped.
    pub remote: Option<String>,
    /// Proxy for the publish tool. An empty string disables the configured one.
    pub proxy: Option<String>,
}

impl Overrides {
    pub fn apply(&self, mut config: Config) -> Result<Config, ConfigError> {
        if let Some(remote) = &self.remote {
            let name = remote.trim().trim_end_matches(':');
            if name.is_empty() {
                return Err(ConfigError::Validation(
                    "--remote cannot be empty".to_string(),
                ));
            }
            config.remote.name = name.to_string();
        }

        if let Some(proxy) = &self.proxy {
            let proxy = proxy.trim();
            config.publish.proxy = (!proxy.is_empty()).then(|| proxy.to_string());
        }

        Ok(config)
    }
}

/// ~/.config/recpub/config.yml, when a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/recpub/config.yml"))
}
