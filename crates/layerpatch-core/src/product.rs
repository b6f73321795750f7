use serde::Serialize;

use crate::properties::Properties;

pub const PRODUCT_CONF: &str = "product.conf";
pub const UNKNOWN: &str = "unknown";

/// Identity descriptor read from `bin/product.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductConfig {
    pub name: String,
    pub version: String,
}

impl ProductConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn from_properties(properties: &Properties) -> Self {
        let field = |key: &str| {
            properties
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_string())
        };
        Self {
            name: field("name"),
            version: field("version"),
        }
    }
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }
}
