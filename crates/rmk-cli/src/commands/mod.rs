//! Command handler modules for rmk-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod pricing;
pub mod review;

use anyhow::{Context, Result};
use rmk_config::{
    report_unused_keys, ConfigService, DatabaseSettings, LoadedConfig, PricingSettings,
    UnusedKeyPolicy,
};
use rmk_pricing::Currency;
use sqlx::PgPool;
use std::fs;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load the `--config` layers, or an empty config when none were given.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let loaded = if paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        rmk_config::load_layered_yaml(&path_refs)?
    };
    let unused = report_unused_keys(
        ConfigService::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        tracing::warn!(keys = ?unused.unused_leaf_pointers, "unused config keys");
    }
    Ok(loaded)
}

pub fn pricing_settings(paths: &[String]) -> Result<PricingSettings> {
    PricingSettings::from_config(&load_config(paths)?.config_json)
}

/// `--currency` when given, otherwise the configured default.
pub fn currency(settings: &PricingSettings, code: Option<&str>) -> Result<Currency> {
    match code {
        Some(c) => settings.currency(c),
        None => Ok(settings.default_currency),
    }
}

pub async fn connect(paths: &[String]) -> Result<PgPool> {
    connect_with(&load_config(paths)?).await
}

/// Connect using the env var named by `/database/url_env`.
pub async fn connect_with(cfg: &LoadedConfig) -> Result<PgPool> {
    let url = DatabaseSettings::from_config(&cfg.config_json)?.require_url()?;
    rmk_db::connect(&url).await
}

/// Read a JSON document from a file. A UTF-8 BOM is tolerated.
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read file failed: {}", path))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = std::str::from_utf8(bytes).context("file must be UTF-8 text")?;
    serde_json::from_str(raw.trim()).with_context(|| format!("invalid JSON in {}", path))
}

pub fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_defaults_to_configured_value() {
        let s = PricingSettings::default();
        assert_eq!(currency(&s, None).unwrap(), s.default_currency);
        assert_eq!(currency(&s, Some("usd")).unwrap(), Currency::Usd);
        assert!(currency(&s, Some("JPY")).is_err());
    }

    #[test]
    fn read_json_file_strips_bom() {
        let path = std::env::temp_dir().join(format!("rmk-cli-bom-{}.json", std::process::id()));
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(br#"{"action":"reject","reason":"blurry photos"}"#);
        fs::write(&path, bytes).unwrap();

        let v: serde_json::Value = read_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(v["action"], "reject");
        let _ = fs::remove_file(path);
    }
}
