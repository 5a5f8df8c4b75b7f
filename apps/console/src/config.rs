use std::{collections::HashMap, fs, time::Duration};

use anyhow::{anyhow, Context};
use client_core::{ListOptions, DEFAULT_NOTICE_TTL, DEFAULT_SETTLE_DELAY};
use url::Url;

pub const SETTINGS_FILE: &str = "magellan.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Host serving the inventory API, e.g. `inventory.example.com`. A value
    /// with a scheme (`http://127.0.0.1:8080`) is used as-is.
    pub public_domain: Option<String>,
    pub api_base_path: String,
    pub token: Option<String>,
    pub settle_delay_ms: u64,
    pub notice_ttl_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            public_domain: None,
            api_base_path: "magellan-api/api".into(),
            token: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            notice_ttl_ms: DEFAULT_NOTICE_TTL.as_millis() as u64,
        }
    }
}

impl Settings {
    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        let domain = self
            .public_domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| {
                anyhow!("no public domain configured; set MAGELLAN_PUBLIC_DOMAIN or public_domain in {SETTINGS_FILE}")
            })?;
        let origin = if domain.contains("://") {
            domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{domain}")
        };
        let raw = format!("{origin}/{}", self.api_base_path.trim_matches('/'));
        Url::parse(&raw).with_context(|| format!("invalid api base url '{raw}'"))
    }

    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            notice_ttl: Duration::from_millis(self.notice_ttl_ms),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |name| std::env::var(name).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        tracing::warn!(file = SETTINGS_FILE, "ignoring unparsable settings file");
        return;
    };
    let text = |key: &str| file_cfg.get(key).and_then(toml::Value::as_str).map(str::to_string);
    let millis = |key: &str| {
        file_cfg
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    };

    if let Some(v) = text("public_domain") {
        settings.public_domain = Some(v);
    }
    if let Some(v) = text("api_base_path") {
        settings.api_base_path = v;
    }
    if let Some(v) = text("token") {
        settings.token = Some(v);
    }
    if let Some(v) = millis("settle_delay_ms") {
        settings.settle_delay_ms = v;
    }
    if let Some(v) = millis("notice_ttl_ms") {
        settings.notice_ttl_ms = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("MAGELLAN_PUBLIC_DOMAIN") {
        settings.public_domain = Some(v);
    }
    if let Some(v) = var("APP__PUBLIC_DOMAIN") {
        settings.public_domain = Some(v);
    }

    if let Some(v) = var("MAGELLAN_TOKEN") {
        settings.token = Some(v);
    }
    if let Some(v) = var("APP__TOKEN") {
        settings.token = Some(v);
    }

    if let Some(v) = var("APP__API_BASE_PATH") {
        settings.api_base_path = v;
    }

    if let Some(v) = var("APP__SETTLE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.settle_delay_ms = parsed;
        }
    }
    if let Some(v) = var("APP__NOTICE_TTL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.notice_ttl_ms = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
