use std::{collections::HashMap, fs};

use client_core::{SessionSettings, DEFAULT_DELIVERY_DAYS};
use tracing::warn;

pub const SETTINGS_FILE: &str = "bordados.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub default_delivery_days: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            default_delivery_days: DEFAULT_DELIVERY_DAYS,
        }
    }
}

impl ClientSettings {
    pub fn session(&self) -> SessionSettings {
        SessionSettings {
            default_delivery_days: self.default_delivery_days,
        }
    }
}

pub fn load_settings() -> ClientSettings {
    let file_contents = fs::read_to_string(SETTINGS_FILE).ok();
    resolve_settings(file_contents.as_deref(), |key| std::env::var(key).ok())
}

/// File values override defaults, environment values override the file.
pub(crate) fn resolve_settings(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some(raw) = file_contents {
        match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("server_url").and_then(toml::Value::as_str) {
                    settings.server_url = v.to_string();
                }
                if let Some(v) = file_cfg
                    .get("default_delivery_days")
                    .and_then(toml::Value::as_integer)
                    .and_then(|v| u32::try_from(v).ok())
                {
                    settings.default_delivery_days = v;
                }
            }
            Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unparsable settings file"),
        }
    }

    if let Some(v) = env("APP__SERVER_URL").filter(|v| !v.trim().is_empty()) {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__DEFAULT_DELIVERY_DAYS") {
        match v.trim().parse::<u32>() {
            Ok(parsed) => settings.default_delivery_days = parsed,
            Err(error) => warn!(%error, value = %v, "ignoring invalid APP__DEFAULT_DELIVERY_DAYS"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
