//! # chatwire-settings
//!
//! Configuration with layered sources.
//!
//! Settings are resolved in priority order:
//! 1. **Compiled defaults** — [`ChatwireSettings::default()`]
//! 2. **User file** — `~/.chatwire/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `CHATWIRE_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
