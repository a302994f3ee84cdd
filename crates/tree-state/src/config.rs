//! Store configuration.
//!
//! Deserializable from any serde format; every field is optional.
//!
//! ```
//! use tree_state::StoreConfig;
//!
//! let config: StoreConfig = serde_json::from_str(
//!     r#"{"defaultSubscribeOptions": {"getDeepCopy": true}, "cache": {"name": "app"}}"#,
//! ).unwrap();
//! assert!(config.default_subscribe_options.get_deep_copy);
//! assert!(config.default_subscribe_options.get_initial_value);
//! assert_eq!(config.cache.name.as_deref(), Some("app"));
//! ```

use serde::{Deserialize, Serialize};

use crate::subscription::SubscribeOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Options used by `Store::subscribe`.
    pub default_subscribe_options: SubscribeOptions,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace inserted after the key prefix by key-value cache handlers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
