use serde::Serialize;

use crate::patch::BASE;
use crate::properties::{parse_bool, split_list, Properties};

pub const LAYERS_CONF: &str = "layers.conf";
pub const DEFAULT_LAYERS_PATH: &str = "layers";
pub const DEFAULT_ADD_ONS_PATH: &str = "add-ons";

const LAYERS_PATH_KEY: &str = "layers.path";
const ADD_ONS_PATH_KEY: &str = "add-ons.path";
const LAYERS_KEY: &str = "layers";
const EXCLUDE_BASE_KEY: &str = "exclude.base.layer";

/// Model of one root's `layers.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayersConfig {
    configured: bool,
    layers_path: String,
    add_ons_path: String,
    layers: Vec<String>,
}

impl LayersConfig {
    /// The configuration of a root without a `layers.conf`.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            layers_path: DEFAULT_LAYERS_PATH.to_string(),
            add_ons_path: DEFAULT_ADD_ONS_PATH.to_string(),
            layers: vec![BASE.to_string()],
        }
    }

    pub fn from_properties(properties: &Properties) -> Self {
        let layers_path = properties
            .get(LAYERS_PATH_KEY)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LAYERS_PATH.to_string());
        let add_ons_path = properties
            .get(ADD_ONS_PATH_KEY)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ADD_ONS_PATH.to_string());
        let exclude_base = parse_bool(properties.get(EXCLUDE_BASE_KEY).map(String::as_str));

        let mut layers = properties
            .get(LAYERS_KEY)
            .map(|value| split_list(value))
            .unwrap_or_default();
        if !exclude_base && !layers.iter().any(|layer| layer == BASE) {
            layers.push(BASE.to_string());
        }

        Self {
            configured: true,
            layers_path,
            add_ons_path,
            layers,
        }
    }

    /// Whether the values came from an actual `layers.conf`.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn layers_path(&self) -> &str {
        &self.layers_path
    }

    pub fn add_ons_path(&self) -> &str {
        &self.add_ons_path
    }

    /// Active layer names in declaration order.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self::unconfigured()
    }
}
