//! Settings Persistence
//!
//! The engine never interprets a node's stored configuration. It hands the
//! blob to a [`SettingsProvider`] when a widget is created and asks the
//! provider for a fresh blob before the widget goes away.

use std::collections::HashMap;

use serde_json::Value as Json;

use super::description::{Instance, WidgetDescription};
use crate::error::Result;

/// Loads and packs component configuration.
pub trait SettingsProvider {
    /// Configuration handed to the constructor of a `description` widget.
    fn load(&self, description: &WidgetDescription, stored: Option<&[u8]>) -> Result<Json>;

    /// Serialize the current configuration of a live widget.
    fn pack(&self, description: &WidgetDescription, instance: &dyn Instance) -> Result<Vec<u8>>;
}

/// MessagePack blobs over JSON-shaped settings.
///
/// Stored values are merged over per-type defaults: keys present in the blob
/// win, keys only present in the defaults are filled in. A stored value that
/// is not a map replaces the defaults outright.
#[derive(Debug, Default)]
pub struct MsgPackSettings {
    defaults: HashMap<String, Json>,
}

impl MsgPackSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register defaults for the component type named `name`.
    pub fn with_defaults(mut self, name: impl Into<String>, defaults: Json) -> Self {
        self.defaults.insert(name.into(), defaults);
        self
    }
}

impl SettingsProvider for MsgPackSettings {
    fn load(&self, description: &WidgetDescription, stored: Option<&[u8]>) -> Result<Json> {
        let defaults = self
            .defaults
            .get(description.name())
            .cloned()
            .unwrap_or(Json::Null);
        let Some(blob) = stored else {
            return Ok(defaults);
        };

        let stored: Json = rmp_serde::from_slice(blob)?;
        Ok(match (defaults, stored) {
            (Json::Object(mut merged), Json::Object(values)) => {
                merged.extend(values);
                Json::Object(merged)
            }
            (_, stored) => stored,
        })
    }

    fn pack(&self, _description: &WidgetDescription, instance: &dyn Instance) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&instance.settings())?)
    }
}
