//! Engine configuration.

use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Upper bound of the in-process context cache. When exceeded,
    /// roughly one third of the oldest entries are evicted in bulk.
    pub cache_capacity: usize,

    /// Subjects that pass every capability check unconditionally when
    /// the elevated ("do anything") mode is requested.
    pub super_admins: Vec<i64>,

    /// Persistent guest account resolved for anonymous requests. Guest
    /// resolution is gated to low-risk read capabilities.
    pub guest_subject: Option<i64>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 2500,
            super_admins: Vec::new(),
            guest_subject: None,
        }
    }
}

impl AccessConfig {
    /// Load configuration from an optional YAML file with
    /// `ACCESSTREE_`-prefixed environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns the figment extraction error for malformed files or
    /// values of the wrong shape.
    pub fn load(file: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed("ACCESSTREE_")).extract()
    }
}
