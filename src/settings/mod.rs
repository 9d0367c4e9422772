//! Settings for the resolver tool.
//!
//! Settings are loaded from multiple tiers with field-by-field merging:
//! 1. Defaults (embedded)
//! 2. Project (`./.conf-resolver/config.yaml`)
//! 3. User (`~/.conf-resolver/config.yaml`)
//! 4. Environment variables (`CONF_RESOLVER_*`)
//!
//! Higher tiers override lower tiers. Objects merge key by key; lists are
//! replaced.

pub mod loader;
pub mod merge;
pub mod types;

pub use loader::{SettingsError, SettingsLoader, SettingsPaths, SettingsTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::{OutputSettings, ResolverSettings, SearchSettings, Settings};
