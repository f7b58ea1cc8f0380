//! # relay-settings
//!
//! Configuration for the workflow session server, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `$RELAY_SETTINGS_PATH` or `~/.relay/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! Settings are loaded once at startup and handed to the server explicitly;
//! there is no global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::{LoggingSettings, RelaySettings, ServerSettings};
