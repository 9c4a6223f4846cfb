use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use clap::ValueEnum;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "controller.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Dedicated OS thread.
    Thread,
    /// Single tokio task on the demo runtime.
    Task,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub queue_kind: QueueKind,
    pub queue_label: String,
    pub log_filter: String,
    pub delivery_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_kind: QueueKind::Thread,
            queue_label: "demo".into(),
            log_filter: "info".into(),
            delivery_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    queue_kind: Option<QueueKind>,
    queue_label: Option<String>,
    log_filter: Option<String>,
    delivery_timeout_ms: Option<u64>,
}

/// Defaults, then the config file, then `APP__*` environment variables.
///
/// An explicit `path` must exist; the default `controller.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_PATH) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_PATH}'"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.queue_kind {
        settings.queue_kind = v;
    }
    if let Some(v) = file_cfg.queue_label {
        settings.queue_label = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.delivery_timeout_ms {
        settings.delivery_timeout_ms = v;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__QUEUE_KIND") {
        settings.queue_kind = QueueKind::from_str(&v, true)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("APP__QUEUE_KIND has unsupported value '{v}'"))?;
    }
    if let Some(v) = lookup("APP__QUEUE_LABEL") {
        settings.queue_label = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    } else if let Some(v) = lookup("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__DELIVERY_TIMEOUT_MS") {
        settings.delivery_timeout_ms = v
            .parse()
            .with_context(|| format!("APP__DELIVERY_TIMEOUT_MS must be milliseconds, got '{v}'"))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
