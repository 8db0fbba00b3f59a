use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use command_channel::{ChannelConfig, DEFAULT_TIMEOUT};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "aegir.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub brewd_addr: String,
    pub brewd_timeout_ms: u64,
    pub brewd_linger: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            database_url: "sqlite://./data/aegir.db".into(),
            brewd_addr: "127.0.0.1:42069".into(),
            brewd_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            brewd_linger: false,
        }
    }
}

impl Settings {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            addr: self.brewd_addr.clone(),
            timeout: Duration::from_millis(self.brewd_timeout_ms),
            linger: self.brewd_linger,
        }
    }
}

/// Defaults, then the config file, then the environment.
///
/// An explicitly named file must exist; the default `aegir.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&file) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", file.display()))?,
        Err(err) if required => {
            return Err(err).with_context(|| format!("cannot read '{}'", file.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table: HashMap<String, toml::Value> = toml::from_str(raw)?;
    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => anyhow::bail!("'{key}' must be a scalar, got {}", other.type_str()),
        };
        apply_key(settings, &key, value)?;
    }
    Ok(())
}

// Prefixed names are read last so they win over the plain ones.
const ENV_KEYS: &[(&str, &str)] = &[
    ("SERVER_BIND", "bind_addr"),
    ("APP__BIND_ADDR", "bind_addr"),
    ("DATABASE_URL", "database_url"),
    ("APP__DATABASE_URL", "database_url"),
    ("BREWD_ADDR", "brewd_addr"),
    ("APP__BREWD_ADDR", "brewd_addr"),
    ("APP__BREWD_TIMEOUT_MS", "brewd_timeout_ms"),
    ("APP__BREWD_LINGER", "brewd_linger"),
];

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    for (env_key, key) in ENV_KEYS {
        if let Some(value) = lookup(env_key) {
            apply_key(settings, key, value).with_context(|| format!("invalid {env_key}"))?;
        }
    }
    Ok(())
}

fn apply_key(settings: &mut Settings, key: &str, value: String) -> anyhow::Result<()> {
    match key {
        "bind_addr" => settings.bind_addr = value,
        "database_url" => settings.database_url = value,
        "brewd_addr" => settings.brewd_addr = value,
        "brewd_timeout_ms" => {
            settings.brewd_timeout_ms = value
                .trim()
                .parse()
                .with_context(|| format!("brewd_timeout_ms must be milliseconds, got '{value}'"))?;
        }
        "brewd_linger" => {
            settings.brewd_linger = value
                .trim()
                .parse()
                .with_context(|| format!("brewd_linger must be true or false, got '{value}'"))?;
        }
        // Unknown keys are tolerated so one file can serve several tools.
        _ => {}
    }
    Ok(())
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
