//! Filter band lookup
//!
//! Band definitions live in a `BandRegistry` owned by the caller and passed
//! to whatever needs to resolve a filter name. There is no process-wide table.

use std::collections::HashMap;
use std::fmt;
use log::warn;

use crate::errors::{ObsError, ObsResult};

/// Canonical name of a filter band
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Band {
    name: String,
}

impl Band {
    /// Name given to filters that are not in the registry
    pub const UNKNOWN_NAME: &'static str = "UNKNOWN";

    pub fn new(name: &str) -> Self {
        Band { name: name.to_string() }
    }

    pub fn unknown() -> Self {
        Band::new(Self::UNKNOWN_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unknown(&self) -> bool {
        self.name == Self::UNKNOWN_NAME
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Table of known bands and their aliases
#[derive(Debug, Clone, Default)]
pub struct BandRegistry {
    /// Canonical names in definition order
    names: Vec<String>,
    /// Alias (including the canonical name itself) to canonical name
    aliases: HashMap<String, String>,
}

impl BandRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual ugrizy bands, each also known by its upper-case letter
    pub fn with_defaults() -> Self {
        let mut registry = BandRegistry::new();
        for name in ["u", "g", "r", "i", "z", "y"] {
            let upper = name.to_uppercase();
            // Alias sets are disjoint, so this cannot fail
            let _ = registry.define(name, &[upper.as_str()]);
        }
        registry
    }

    /// Add a band and its aliases
    ///
    /// Fails with `ConfigError` if the name or an alias already belongs to
    /// a different band.
    pub fn define(&mut self, name: &str, aliases: &[&str]) -> ObsResult<()> {
        for alias in std::iter::once(&name).chain(aliases.iter()) {
            if let Some(existing) = self.aliases.get(*alias) {
                if existing != name {
                    return Err(ObsError::ConfigError(format!(
                        "Filter alias {:?} already names band {:?}", alias, existing)));
                }
            }
        }

        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
        self.aliases.insert(name.to_string(), name.to_string());
        for alias in aliases {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
        Ok(())
    }

    /// Look up a filter name, returning None if it is not known
    pub fn lookup(&self, filter_name: &str) -> Option<Band> {
        self.aliases.get(filter_name.trim()).map(|name| Band::new(name))
    }

    /// Resolve a filter name, falling back to `Band::unknown()`
    pub fn resolve(&self, filter_name: &str) -> Band {
        match self.lookup(filter_name) {
            Some(band) => band,
            None => {
                warn!("Unknown filter {:?}; using {}", filter_name, Band::UNKNOWN_NAME);
                Band::unknown()
            }
        }
    }

    /// Canonical band names in definition order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}
