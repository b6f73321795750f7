mod layers_config;
mod patch;
mod product;
mod properties;

pub use layers_config::{LayersConfig, DEFAULT_ADD_ONS_PATH, DEFAULT_LAYERS_PATH, LAYERS_CONF};
pub use patch::{InvalidPatchId, PatchId, PatchType, TargetKind, BASE};
pub use product::{ProductConfig, PRODUCT_CONF, UNKNOWN};
pub use properties::{parse_properties, parse_bool, split_list, Properties};
