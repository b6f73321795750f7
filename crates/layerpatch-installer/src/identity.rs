use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use layerpatch_core::{PatchId, ProductConfig, TargetKind};
use tracing::debug;

use crate::discovery::{process_roots, ResolvedRoots};
use crate::error::{PatchingError, Result};
use crate::layout::InstalledImage;
use crate::structure::DirectoryStructure;
use crate::target_info::TargetInfo;

/// The installation itself: the top-level named and versioned target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    version: String,
    info: TargetInfo,
}

impl Identity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn info(&self) -> &TargetInfo {
        &self.info
    }
}

/// A discovered layer or add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchableTarget {
    name: String,
    info: TargetInfo,
}

pub type Layer = PatchableTarget;
pub type AddOn = PatchableTarget;

impl PatchableTarget {
    fn load(kind: TargetKind, name: String, roots: ResolvedRoots) -> Result<Self> {
        let (module_root, bundle_root) = roots.into_parts();
        let structure = DirectoryStructure::for_target(kind, &name, module_root, bundle_root)?;
        let info = TargetInfo::load(structure)?;
        Ok(Self { name, info })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TargetKind {
        self.info.kind()
    }

    pub fn module_root(&self) -> Option<&Path> {
        self.info.directory_structure().module_root()
    }

    pub fn bundle_root(&self) -> Option<&Path> {
        self.info.directory_structure().bundle_root()
    }

    pub fn info(&self) -> &TargetInfo {
        &self.info
    }
}

/// Immutable snapshot of what is installed and which patches are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledIdentity {
    identity: Identity,
    layers: Vec<Layer>,
    add_ons: Vec<AddOn>,
    all_patches: Vec<PatchId>,
    image: InstalledImage,
    module_roots: Vec<PathBuf>,
    bundle_roots: Vec<PathBuf>,
}

impl InstalledIdentity {
    /// Discovers an installation through its default module and bundle
    /// roots, taking the identity descriptor from `bin/product.conf`.
    pub fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let image = InstalledImage::new(home);
        let product = image.load_product_config()?;
        let module_roots = vec![image.modules_dir()];
        let bundle_roots = vec![image.bundles_dir()];
        Self::discover(image, product, module_roots, bundle_roots)
    }

    pub fn discover(
        image: InstalledImage,
        product: ProductConfig,
        module_roots: Vec<PathBuf>,
        bundle_roots: Vec<PathBuf>,
    ) -> Result<Self> {
        let processed = process_roots(&module_roots, &bundle_roots)?;
        let (layers, add_ons) = processed.into_parts();

        let identity = Identity {
            name: product.name,
            version: product.version,
            info: TargetInfo::load(DirectoryStructure::for_identity(&image))?,
        };
        let layers = layers
            .into_iter()
            .map(|(name, roots)| PatchableTarget::load(TargetKind::Layer, name, roots))
            .collect::<Result<Vec<_>>>()?;
        let add_ons = add_ons
            .into_iter()
            .map(|(name, roots)| PatchableTarget::load(TargetKind::AddOn, name, roots))
            .collect::<Result<Vec<_>>>()?;
        let all_patches = collect_all_patches(&image, &identity, &layers, &add_ons)?;

        debug!(
            identity = %identity.name,
            version = %identity.version,
            layers = layers.len(),
            add_ons = add_ons.len(),
            patches = all_patches.len(),
            "discovered installation"
        );

        Ok(Self {
            identity,
            layers,
            add_ons,
            all_patches,
            image,
            module_roots,
            bundle_roots,
        })
    }

    /// Runs discovery again over the same roots.
    pub fn reload(&self) -> Result<Self> {
        let product = ProductConfig::new(&self.identity.name, &self.identity.version);
        Self::discover(
            self.image.clone(),
            product,
            self.module_roots.clone(),
            self.bundle_roots.clone(),
        )
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Layers in the order they were declared.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn add_ons(&self) -> &[AddOn] {
        &self.add_ons
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn add_on(&self, name: &str) -> Option<&AddOn> {
        self.add_ons.iter().find(|add_on| add_on.name == name)
    }

    /// Every patch id recorded anywhere in the installation, first seen first.
    pub fn all_installed_patches(&self) -> &[PatchId] {
        &self.all_patches
    }

    pub fn installed_image(&self) -> &InstalledImage {
        &self.image
    }

    pub fn module_roots(&self) -> &[PathBuf] {
        &self.module_roots
    }

    pub fn bundle_roots(&self) -> &[PathBuf] {
        &self.bundle_roots
    }
}

fn collect_all_patches(
    image: &InstalledImage,
    identity: &Identity,
    layers: &[Layer],
    add_ons: &[AddOn],
) -> Result<Vec<PatchId>> {
    let infos = std::iter::once(&identity.info)
        .chain(layers.iter().map(PatchableTarget::info))
        .chain(add_ons.iter().map(PatchableTarget::info));

    let mut seen = HashSet::new();
    let mut patches = Vec::new();
    let mut record = |id: PatchId| {
        if seen.insert(id.clone()) {
            patches.push(id);
        }
    };

    for info in infos {
        for id in info.cumulative_patch_id().into_iter().chain(info.patch_ids()) {
            record(id.clone());
        }
    }
    for id in patch_history_ids(&image.patch_history_root())? {
        record(id);
    }
    Ok(patches)
}

fn patch_history_ids(dir: &Path) -> Result<Vec<PatchId>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PatchingError::io(dir)(err)),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(PatchingError::io(dir))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            ids.push(PatchId::from(name));
        }
    }
    ids.sort();
    Ok(ids)
}
