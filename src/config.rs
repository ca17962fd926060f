use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;

/// Behaviour switches of a [`crate::model::Model`]. Every field has a
/// default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Reject links whose endpoints are not instances of the relation's
    /// init and fin classes.
    pub check_endpoint_classes: bool,
    /// Fail a `role01` read that resolves to more than one object instead
    /// of returning the first.
    pub strict_role01: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            check_endpoint_classes: true,
            strict_role01: true,
        }
    }
}

impl ModelConfig {
    /// Reads a config file; the format follows the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
