use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parses and validates a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);

    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    expand_paths(&mut config);

    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    config.remote.mount_point = expand_tilde(&config.remote.mount_point);
    config.upload.local_cache_path = expand_tilde(&config.upload.local_cache_path);
    config.publish.executable = expand_tilde(&config.publish.executable);
    config.publish.cookie_file = expand_tilde(&config.publish.cookie_file);
    config.ledger.history_path = expand_tilde(&config.ledger.history_path);
    config.ledger.failed_path = expand_tilde(&config.ledger.failed_path);
    config.tools.rclone = expand_tilde(&config.tools.rclone);
    config.tools.ffmpeg = expand_tilde(&config.tools.ffmpeg);
    config.tools.ffprobe = expand_tilde(&config.tools.ffprobe);
    config.tools.fusermount = expand_tilde(&config.tools.fusermount);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_remote(&config.remote, &mut errors);
    validate_source(&config.source, &mut errors);
    validate_upload(&config.upload, &mut errors);

    if config.retry.attempts == 0 {
        errors.push("retry.attempts must be at least 1".to_string());
    }

    if config.cover.extract_time_sec < 0.0 {
        errors.push("cover.extract_time_sec cannot be negative".to_string());
    }
    if !(2..=31).contains(&config.cover.quality) {
        errors.push(format!(
            "cover.quality must be between 2 and 31, got {}",
            config.cover.quality
        ));
    }

    validate_template(
        "publish.description_template",
        &config.publish.description_template,
        &["streamer_name", "date"],
        &mut errors,
    );
    validate_template(
        "publish.source_template",
        &config.publish.source_template,
        &["room_id"],
        &mut errors,
    );

    if config.ledger.history_path == config.ledger.failed_path {
        errors.push("ledger.history_path and ledger.failed_path must differ".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_remote(remote: &RemoteConfig, errors: &mut Vec<String>) {
    if remote.name.trim().is_empty() {
        errors.push("remote.name cannot be empty".to_string());
    }
    if remote.name.ends_with(':') {
        errors.push(format!(
            "remote.name '{}' must not include the trailing ':'",
            remote.name
        ));
    }
    if remote.mount_point.as_os_str().is_empty() {
        errors.push("remote.mount_point cannot be empty".to_string());
    }
}

fn validate_source(source: &SourceConfig, errors: &mut Vec<String>) {
    if source.filename_prefix.is_empty() {
        errors.push("source.filename_prefix cannot be empty".to_string());
    }
    if source.extension.is_empty() || source.extension.starts_with('.') {
        errors.push(format!(
            "source.extension must be a bare extension like 'flv', got '{}'",
            source.extension
        ));
    }
}

fn validate_upload(upload: &UploadConfig, errors: &mut Vec<String>) {
    if upload.max_file_size_gb <= 0.0 {
        errors.push("upload.max_file_size_gb must be positive".to_string());
    }
    if upload.split_part_size_gb <= 0.0 {
        errors.push("upload.split_part_size_gb must be positive".to_string());
    }
    if upload.split_part_size_gb > upload.max_file_size_gb {
        errors.push(format!(
            "upload.split_part_size_gb ({}) cannot exceed upload.max_file_size_gb ({})",
            upload.split_part_size_gb, upload.max_file_size_gb
        ));
    }
    if upload.min_free_space_gb < 0.0 {
        errors.push("upload.min_free_space_gb cannot be negative".to_string());
    }
}

fn validate_template(context: &str, template: &str, allowed: &[&str], errors: &mut Vec<String>) {
    for reference in extract_placeholders(template) {
        if !allowed.contains(&reference.as_str()) {
            errors.push(format!(
                "{}: unknown placeholder '{{{}}}' (allowed: {})",
                context,
                reference,
                allowed
                    .iter()
                    .map(|a| format!("{{{}}}", a))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
    }
}

fn extract_placeholders(template: &str) -> Vec<String> {
    let re = Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").unwrap();
    re.captures_iter(template)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_placeholders() {
        let template = "{streamer_name} live on {date}";
        let refs = extract_placeholders(template);
        assert_eq!(refs, vec!["streamer_name", "date"]);
    }

    #[test]
    fn test_extract_no_placeholders() {
        let refs = extract_placeholders("static text");
        assert_eq!(refs, Vec::<String>::new());
    }

    #[test]
    fn test_unknown_placeholder_reported() {
        let mut errors = Vec::new();
        validate_template("ctx", "{room_id} by {streamer}", &["room_id"], &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("{streamer}"));
    }
}
