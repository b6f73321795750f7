mod discovery;
mod error;
mod identity;
mod layout;
mod manager;
mod modification;
mod mutable;
mod refs;
mod structure;
mod target_info;

pub use discovery::{load_layers_config, process_roots, ProcessedLayers, ResolvedRoots, RootKind};
pub use error::{PatchingError, Result};
pub use identity::{AddOn, Identity, InstalledIdentity, Layer, PatchableTarget};
pub use layout::{InstalledImage, INSTALLATION_METADATA, PATCHES_DIR};
pub use manager::{InstallationManager, WritePermit};
pub use modification::{InstallationModification, InstallationState};
pub use mutable::MutableTarget;
pub use structure::{bundle_path, module_path, DirectoryStructure};
pub use target_info::TargetInfo;

#[cfg(test)]
mod tests;
