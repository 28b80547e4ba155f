//! # onebridge-settings
//!
//! Layered configuration for the gateway:
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **User file**: `~/.onebridge/settings.json` (deep-merged over defaults)
//! 3. **Environment**: `ONEBRIDGE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    ENV_PREFIX, apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::{GatewaySettings, GatewayTuning, LoggingSettings, ServerSettings};
