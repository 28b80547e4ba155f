//! Layered settings loading.
//!
//! 1. Compiled [`GatewaySettings::default()`]
//! 2. `~/.onebridge/settings.json`, deep-merged over the defaults
//! 3. `ONEBRIDGE_*` environment variables
//!
//! Objects merge per key, arrays and scalars are replaced, and `null` in the
//! file leaves the default untouched. Environment values that fail to parse
//! are logged and ignored.

use std::path::{Path, PathBuf};

use onebridge_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::GatewaySettings;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "ONEBRIDGE_";

/// Default settings file location (`~/.onebridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".onebridge").join("settings.json")
}

/// Load from the default path with process environment overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with process environment overrides.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Load from `path`, resolving overrides through `lookup`.
///
/// A missing file yields defaults; unreadable or invalid JSON is an error.
pub fn load_settings_with_env<F>(path: &Path, lookup: F) -> Result<GatewaySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GatewaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ONEBRIDGE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(settings: &mut GatewaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("PORT", |s| s.parse::<u16>().ok()) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("WS_PATH", |s| s.starts_with('/').then(|| s.to_owned())) {
        settings.server.ws_path = v;
    }
    if let Some(v) = env.string("ACCESS_TOKEN") {
        settings.server.access_token = Some(v);
    }
    if let Some(v) = env.parsed("HANDSHAKE_TIMEOUT_MS", |s| parse_u64_range(s, 1, 600_000)) {
        settings.gateway.handshake_timeout_ms = v;
    }
    if let Some(v) = env.parsed("CALL_TIMEOUT_MS", |s| parse_u64_range(s, 1, 3_600_000)) {
        settings.gateway.call_timeout_ms = v;
    }
    if let Some(v) = env.parsed("ABANDON_CALLS_ON_DISCONNECT", parse_bool) {
        settings.gateway.abandon_calls_on_disconnect = v;
    }
    if let Some(v) = env.string("LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitively.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, suffix: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{suffix}");
        let val = (self.lookup)(&key)?;
        (!val.is_empty()).then_some((key, val))
    }

    fn string(&self, suffix: &str) -> Option<String> {
        self.raw(suffix).map(|(_, v)| v)
    }

    fn parsed<T>(&self, suffix: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let (key, val) = self.raw(suffix)?;
        let result = parse(val.trim());
        if result.is_none() {
            warn!(key = %key, value = %val, "invalid env override, ignoring");
        }
        result
    }
}
