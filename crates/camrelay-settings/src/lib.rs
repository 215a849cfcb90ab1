//! # camrelay-settings
//!
//! Configuration for the relay bridge and the pipeline worker.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `--config <path>` or `~/.camrelay/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `CAMRELAY_*` overrides (highest priority)
//!
//! Settings are loaded once at startup and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
