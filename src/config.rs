use crate::types::*;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const CONFIG_DIR_NAME: &str = ".toolstash";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub fn get_user_config_dir() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(CONFIG_DIR_NAME);
    Ok(path)
}

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = env::var("TOOLSTASH_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }
    let path = get_user_config_dir()?.join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Temp root for fresh installs: the runner's `RUNNER_TEMP`, else the OS temp dir.
pub fn get_temp_root() -> PathBuf {
    match env::var_os("RUNNER_TEMP") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => env::temp_dir(),
    }
}

/// Load settings from the config file (if any), then apply environment overrides.
pub fn load_settings() -> Result<ToolstashSettings> {
    let config_path = get_config_file_path()?;

    let mut settings = if config_path.exists() {
        let content = fs::read_to_string(&config_path).with_context(|| {
            format!("Could not read config file at {}", config_path.display())
        })?;
        serde_json::from_str(&content).with_context(|| "Could not parse config file as JSON")?
    } else {
        ToolstashSettings::default()
    };

    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn apply_env_overrides(settings: &mut ToolstashSettings) {
    if let Some(package) = non_empty_var("TOOLSTASH_PACKAGE") {
        settings.package = package;
    }

    if let Some(registry) =
        non_empty_var("TOOLSTASH_REGISTRY").or_else(|| non_empty_var("NPM_CONFIG_REGISTRY"))
    {
        settings.registry = registry;
    }

    if let Some(cache_dir) =
        non_empty_var("TOOLSTASH_CACHE_DIR").or_else(|| non_empty_var("RUNNER_TOOL_CACHE"))
    {
        settings.cache_dir = PathBuf::from(cache_dir);
    }

    if let Some(remote) = non_empty_var("TOOLSTASH_REMOTE_CACHE") {
        settings.remote_cache = Some(remote);
    }

    if let Some(token) = non_empty_var("TOOLSTASH_REMOTE_TOKEN") {
        settings.remote_token = Some(token);
    }

    if let Some(search_path) = non_empty_var("TOOLSTASH_PACKAGER_PATH") {
        settings.packager_path = Some(search_path);
    }
}
