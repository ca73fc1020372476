use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::warn;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    /// Buffered change events per feed subscriber before it is dropped as lagging.
    pub feed_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/bordados.db".into(),
            feed_capacity: 256,
        }
    }
}

pub fn load_settings() -> Settings {
    let file_contents = fs::read_to_string(SETTINGS_FILE).ok();
    resolve_settings(file_contents.as_deref(), |key| std::env::var(key).ok())
}

/// File values override defaults, environment values override the file.
pub(crate) fn resolve_settings(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
                    settings.server_bind = v.to_string();
                }
                if let Some(v) = file_cfg.get("database_url").and_then(toml::Value::as_str) {
                    settings.database_url = v.to_string();
                }
                if let Some(v) = file_cfg
                    .get("feed_capacity")
                    .and_then(toml::Value::as_integer)
                    .and_then(|v| usize::try_from(v).ok())
                {
                    settings.feed_capacity = v;
                }
            }
            Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unparsable settings file"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__FEED_CAPACITY") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.feed_capacity = parsed,
            Err(error) => warn!(%error, value = %v, "ignoring invalid APP__FEED_CAPACITY"),
        }
    }

    settings.feed_capacity = settings.feed_capacity.max(1);
    settings
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

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
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
    })?;

    Ok(())
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
