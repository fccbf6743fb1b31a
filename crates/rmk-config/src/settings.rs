//! Typed views over the effective config.
//!
//! Config YAML never holds secrets: the database URL is referenced by env
//! var NAME (`database.url_env`, default `RMK_DATABASE_URL`) and resolved
//! once at startup. Error messages mention the name, never the value.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use rmk_pricing::{Currency, DEFAULT_CURRENCY, SUPPORTED_CURRENCIES};

pub const ENV_DB_URL: &str = "RMK_DATABASE_URL";
pub const ENV_DAEMON_ADDR: &str = "RMK_DAEMON_ADDR";
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";

fn str_at<'a>(cfg: &'a Value, ptr: &str) -> Result<Option<&'a str>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => bail!("config {ptr} must be a string, got {other}"),
    }
}

fn bool_at(cfg: &Value, ptr: &str) -> Result<Option<bool>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("config {ptr} must be a boolean, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingSettings {
    pub default_currency: Currency,
    pub supported_currencies: Vec<Currency>,
    /// Log a warning when an offer is priced without any margin rule.
    pub warn_on_missing_margin: bool,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY,
            supported_currencies: SUPPORTED_CURRENCIES.to_vec(),
            warn_on_missing_margin: true,
        }
    }
}

impl PricingSettings {
    pub fn from_config(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();

        if let Some(arr) = cfg.pointer("/pricing/supported_currencies") {
            let items = arr
                .as_array()
                .ok_or_else(|| anyhow!("config /pricing/supported_currencies must be a list"))?;
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                let code = item
                    .as_str()
                    .ok_or_else(|| anyhow!("currency codes must be strings, got {item}"))?;
                let c = Currency::parse(code)
                    .with_context(|| format!("config /pricing/supported_currencies: {code}"))?;
                if !list.contains(&c) {
                    list.push(c);
                }
            }
            if list.is_empty() {
                bail!("config /pricing/supported_currencies must not be empty");
            }
            out.supported_currencies = list;
        }

        if let Some(code) = str_at(cfg, "/pricing/default_currency")? {
            out.default_currency = Currency::parse(code)
                .with_context(|| format!("config /pricing/default_currency: {code}"))?;
        }
        if !out.supported_currencies.contains(&out.default_currency) {
            bail!(
                "default currency {} is not in supported_currencies",
                out.default_currency
            );
        }

        if let Some(b) = bool_at(cfg, "/pricing/warn_on_missing_margin")? {
            out.warn_on_missing_margin = b;
        }
        Ok(out)
    }

    /// Parse and check a currency code against the configured whitelist.
    pub fn currency(&self, code: &str) -> Result<Currency> {
        let c = Currency::parse(code)?;
        if !self.supported_currencies.contains(&c) {
            bail!("currency {c} is not enabled");
        }
        Ok(c)
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Env var that holds the connection string.
    pub url_env: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: ENV_DB_URL.to_string(),
        }
    }
}

impl DatabaseSettings {
    pub fn from_config(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(name) = str_at(cfg, "/database/url_env")? {
            if name.trim().is_empty() {
                bail!("config /database/url_env must name an env var");
            }
            out.url_env = name.trim().to_string();
        }
        Ok(out)
    }

    /// `None` when the env var is unset or empty.
    pub fn resolve_url(&self) -> Option<String> {
        std::env::var(&self.url_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require_url(&self) -> Result<String> {
        self.resolve_url()
            .ok_or_else(|| anyhow!("missing env var {}", self.url_env))
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Postgres,
}

impl BackendKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "postgres" => Ok(BackendKind::Postgres),
            other => bail!("unknown daemon backend '{other}' (expected memory|postgres)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub addr: String,
    pub backend: BackendKind,
}

impl DaemonSettings {
    /// `RMK_DAEMON_ADDR` overrides `/daemon/addr`.
    pub fn from_config(cfg: &Value) -> Result<Self> {
        let addr = match std::env::var(ENV_DAEMON_ADDR) {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => str_at(cfg, "/daemon/addr")?
                .unwrap_or(DEFAULT_DAEMON_ADDR)
                .to_string(),
        };
        let backend = match str_at(cfg, "/daemon/backend")? {
            Some(s) => BackendKind::parse(s)?,
            None => BackendKind::Postgres,
        };
        Ok(Self { addr, backend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_defaults_when_section_missing() {
        let s = PricingSettings::from_config(&serde_json::json!({})).unwrap();
        assert_eq!(s, PricingSettings::default());
        assert_eq!(s.default_currency, Currency::Inr);
    }

    #[test]
    fn default_currency_must_be_supported() {
        let cfg = serde_json::json!({"pricing": {
            "default_currency": "GBP",
            "supported_currencies": ["INR", "USD"]
        }});
        assert!(PricingSettings::from_config(&cfg).is_err());
    }

    #[test]
    fn whitelist_restricts_currency_lookup() {
        let cfg = serde_json::json!({"pricing": {
            "default_currency": "usd",
            "supported_currencies": ["USD", "usd", "EUR"]
        }});
        let s = PricingSettings::from_config(&cfg).unwrap();
        assert_eq!(s.supported_currencies, vec![Currency::Usd, Currency::Eur]);
        assert!(s.currency("eur").is_ok());
        assert!(s.currency("INR").is_err());
    }

    #[test]
    fn backend_parse() {
        assert_eq!(BackendKind::parse("Memory").unwrap(), BackendKind::Memory);
        assert!(BackendKind::parse("sqlite").is_err());
    }

    #[test]
    fn database_env_name_is_configurable() {
        let cfg = serde_json::json!({"database": {"url_env": "CATALOG_DB"}});
        assert_eq!(DatabaseSettings::from_config(&cfg).unwrap().url_env, "CATALOG_DB");
    }
}
