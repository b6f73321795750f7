use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use layerpatch_core::{parse_properties, ProductConfig, LAYERS_CONF, PRODUCT_CONF};

use crate::error::{PatchingError, Result};

pub const INSTALLATION_METADATA: &str = ".installation";
pub const PATCHES_DIR: &str = "patches";

/// The well-known directories of one installed distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledImage {
    home: PathBuf,
}

impl InstalledImage {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.home.join("modules")
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.home.join("bundles")
    }

    pub fn installation_metadata_dir(&self) -> PathBuf {
        self.home.join(INSTALLATION_METADATA)
    }

    pub fn patch_history_root(&self) -> PathBuf {
        self.installation_metadata_dir().join(PATCHES_DIR)
    }

    pub fn patch_history_dir(&self, patch_id: &str) -> PathBuf {
        self.patch_history_root().join(patch_id)
    }

    pub fn layers_conf_path(&self) -> PathBuf {
        self.modules_dir().join(LAYERS_CONF)
    }

    pub fn product_conf_path(&self) -> PathBuf {
        self.bin_dir().join(PRODUCT_CONF)
    }

    pub fn load_product_config(&self) -> Result<ProductConfig> {
        let path = self.product_conf_path();
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(ProductConfig::from_properties(&parse_properties(&raw))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ProductConfig::default()),
            Err(err) => Err(PatchingError::io(&path)(err)),
        }
    }
}
