//! Layered config resolution.
//!
//! Each of the fixed config keys is resolved, in enumeration order, from
//! the first layer that has it: operator override record, then static
//! default. The VM's own override map is applied last and always wins.
//! Resolution is an explicit function of its inputs — no ambient global
//! lookups — so it is testable without a live settings source.

use std::collections::BTreeMap;

use crate::error::MinivirtError;
use crate::model::{CONFIG_KEYS, ConfigKey, Vm};
use crate::store::Store;

/// Process-wide static defaults, one per config key, looked up by the
/// uppercased key name (the convention of the settings file's `[defaults]`
/// table).
#[derive(Debug, Clone, Default)]
pub struct Settings {
    defaults: BTreeMap<String, String>,
}

impl Settings {
    pub fn new(defaults: BTreeMap<String, String>) -> Self {
        Settings { defaults }
    }

    /// Build from `(KEY, value)` pairs; keys are uppercased on insert.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Settings {
            defaults: pairs
                .iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v.to_string()))
                .collect(),
        }
    }

    pub fn default_for(&self, key: ConfigKey) -> Option<&str> {
        self.defaults
            .get(&key.as_str().to_ascii_uppercase())
            .map(String::as_str)
    }
}

/// Flatten the three config layers into the substitution map consumed by
/// template rendering. A key with neither an override record nor a static
/// default is an error — never a silent empty value.
pub fn resolve(
    vm: &Vm,
    store: &dyn Store,
    settings: &Settings,
) -> Result<BTreeMap<String, String>, MinivirtError> {
    let mut flat = BTreeMap::new();

    for key in CONFIG_KEYS {
        let value = match store.config_value(key) {
            Some(v) => v,
            None => settings
                .default_for(key)
                .map(str::to_string)
                .ok_or(MinivirtError::MissingConfigKey { key })?,
        };
        flat.insert(key.as_str().to_string(), value);
    }

    // VM-level overrides win over both layers.
    for (k, v) in &vm.config {
        flat.insert(k.clone(), v.clone());
    }

    Ok(flat)
}
