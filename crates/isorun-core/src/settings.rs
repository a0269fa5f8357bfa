//! Backend option registry.
//!
//! Backends declare their options (section, key, help text, default) at
//! registration time; the orchestrator may lay user-supplied values over
//! them. Consumers read the flattened `"section.key" -> value` map.

use std::collections::HashMap;

/// One registered backend option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    /// Configuration section, e.g. `"spawner.lxc"`.
    pub section: String,

    /// Key within the section, e.g. `"dist"`.
    pub key: String,

    /// Human-readable help text.
    pub help_msg: String,

    /// Default value used when no override is set.
    pub default: String,
}

impl OptionSpec {
    /// The flattened `section.key` name.
    pub fn full_key(&self) -> String {
        format!("{}.{}", self.section, self.key)
    }
}

/// Registry of declared options plus user overrides.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    specs: Vec<OptionSpec>,
    overrides: HashMap<String, String>,
}

impl Settings {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option with its default. Re-registering a key replaces
    /// the earlier declaration.
    pub fn register_option(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        help_msg: impl Into<String>,
        default: impl Into<String>,
    ) {
        let spec = OptionSpec {
            section: section.into(),
            key: key.into(),
            help_msg: help_msg.into(),
            default: default.into(),
        };
        self.specs.retain(|s| s.full_key() != spec.full_key());
        self.specs.push(spec);
    }

    /// Override a value by its flattened `section.key` name.
    pub fn set(&mut self, full_key: impl Into<String>, value: impl Into<String>) {
        self.overrides.insert(full_key.into(), value.into());
    }

    /// Look up a value by its flattened name: override first, then default.
    pub fn get(&self, full_key: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(full_key) {
            return Some(v.clone());
        }
        self.specs
            .iter()
            .find(|s| s.full_key() == full_key)
            .map(|s| s.default.clone())
    }

    /// The flattened `section.key -> value` map, overrides shadowing
    /// defaults.
    pub fn as_dict(&self) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = self
            .specs
            .iter()
            .map(|s| (s.full_key(), s.default.clone()))
            .collect();
        for (k, v) in &self.overrides {
            map.insert(k.clone(), v.clone());
        }
        map
    }

    /// All declared options.
    pub fn options(&self) -> &[OptionSpec] {
        &self.specs
    }
}
