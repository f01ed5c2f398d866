use std::fs;

use anyhow::{anyhow, Context, Result};
use client_core::{payment::DEFAULT_MERCHANT_NAME, DEFAULT_BUS_CAPACITY};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "quiz_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    /// Falls back to `api_base_url` when unset.
    pub payment_base_url: Option<String>,
    pub merchant_display_name: String,
    pub event_bus_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5002".into(),
            payment_base_url: None,
            merchant_display_name: DEFAULT_MERCHANT_NAME.into(),
            event_bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl Settings {
    pub fn payment_base_url(&self) -> &str {
        self.payment_base_url
            .as_deref()
            .unwrap_or(&self.api_base_url)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    payment_url: Option<String>,
    merchant_name: Option<String>,
    event_bus_capacity: Option<usize>,
}

pub fn load_settings() -> Result<Settings> {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    settings_from_sources(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the optional settings file, then environment variables.
pub fn settings_from_sources(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        let file_cfg: FileSettings =
            toml::from_str(raw).with_context(|| format!("invalid {SETTINGS_FILE}"))?;
        if let Some(v) = file_cfg.api_url {
            settings.api_base_url = v;
        }
        if let Some(v) = file_cfg.payment_url {
            settings.payment_base_url = Some(v);
        }
        if let Some(v) = file_cfg.merchant_name {
            settings.merchant_display_name = v;
        }
        if let Some(v) = file_cfg.event_bus_capacity {
            settings.event_bus_capacity = v;
        }
    }

    if let Some(v) = env("QUIZ_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__PAYMENT_URL") {
        settings.payment_base_url = Some(v);
    }

    if let Some(v) = env("APP__MERCHANT_NAME") {
        settings.merchant_display_name = v;
    }

    if let Some(v) = env("APP__EVENT_BUS_CAPACITY") {
        settings.event_bus_capacity = v
            .parse()
            .with_context(|| format!("APP__EVENT_BUS_CAPACITY is not a number: {v}"))?;
    }

    settings.api_base_url = normalize_url(&settings.api_base_url)?;
    settings.payment_base_url = settings
        .payment_base_url
        .as_deref()
        .map(normalize_url)
        .transpose()?;
    if settings.event_bus_capacity == 0 {
        return Err(anyhow!("event bus capacity must be at least 1"));
    }

    Ok(settings)
}

fn normalize_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim()).with_context(|| format!("invalid url '{raw}'"))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
