use std::path::{Path, PathBuf};

use layerpatch_core::{PatchId, TargetKind, BASE};

use crate::error::{PatchingError, Result};
use crate::layout::{InstalledImage, INSTALLATION_METADATA};
use crate::target_info::TargetInfo;

const CUMULATIVE: &str = "cumulative";
const REFERENCES: &str = "references";

/// Where one target keeps its patch metadata and overlay content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStructure {
    kind: TargetKind,
    metadata_dir: PathBuf,
    module_root: Option<PathBuf>,
    bundle_root: Option<PathBuf>,
}

impl DirectoryStructure {
    pub fn for_identity(image: &InstalledImage) -> Self {
        Self {
            kind: TargetKind::Identity,
            metadata_dir: image.installation_metadata_dir(),
            module_root: None,
            bundle_root: None,
        }
    }

    /// Metadata lives next to the module root, or the bundle root when the
    /// target only contributes bundles.
    pub fn for_target(
        kind: TargetKind,
        name: &str,
        module_root: Option<PathBuf>,
        bundle_root: Option<PathBuf>,
    ) -> Result<Self> {
        let metadata_dir = module_root
            .as_deref()
            .or(bundle_root.as_deref())
            .map(|root| root.join(INSTALLATION_METADATA))
            .ok_or_else(|| PatchingError::MissingRoot {
                kind,
                name: name.to_string(),
            })?;

        Ok(Self {
            kind,
            metadata_dir,
            module_root,
            bundle_root,
        })
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn module_root(&self) -> Option<&Path> {
        self.module_root.as_deref()
    }

    pub fn bundle_root(&self) -> Option<&Path> {
        self.bundle_root.as_deref()
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn installation_info_path(&self) -> PathBuf {
        self.metadata_dir.join(self.kind.info_file_name())
    }

    pub fn cumulative_link_path(&self) -> PathBuf {
        self.metadata_dir.join(CUMULATIVE)
    }

    /// One-off references are keyed by the cumulative baseline they sit on.
    pub fn cumulative_refs_path(&self, cumulative: Option<&PatchId>) -> PathBuf {
        let key = cumulative.map(PatchId::as_str).unwrap_or(BASE);
        self.metadata_dir.join(REFERENCES).join(key)
    }

    pub fn module_patch_dir(&self, patch_id: &PatchId) -> Option<PathBuf> {
        overlay_dir(self.kind, self.module_root.as_deref(), patch_id)
    }

    pub fn bundle_patch_dir(&self, patch_id: &PatchId) -> Option<PathBuf> {
        overlay_dir(self.kind, self.bundle_root.as_deref(), patch_id)
    }
}

fn overlay_dir(kind: TargetKind, root: Option<&Path>, patch_id: &PatchId) -> Option<PathBuf> {
    let overlays = kind.overlay_dir_name()?;
    root.map(|root| root.join(overlays).join(patch_id.as_str()))
}

/// Module search path for a target: existing one-off overlays, most recent
/// first, then the cumulative overlay, then the module root.
pub fn module_path(info: &TargetInfo) -> Vec<PathBuf> {
    let structure = info.directory_structure();
    search_path(info, structure.module_root(), |id| {
        structure.module_patch_dir(id)
    })
}

pub fn bundle_path(info: &TargetInfo) -> Vec<PathBuf> {
    let structure = info.directory_structure();
    search_path(info, structure.bundle_root(), |id| {
        structure.bundle_patch_dir(id)
    })
}

fn search_path(
    info: &TargetInfo,
    root: Option<&Path>,
    overlay: impl Fn(&PatchId) -> Option<PathBuf>,
) -> Vec<PathBuf> {
    let Some(root) = root else {
        return Vec::new();
    };

    let mut path: Vec<PathBuf> = info
        .patch_ids()
        .iter()
        .chain(info.cumulative_patch_id())
        .filter_map(overlay)
        .filter(|dir| dir.is_dir())
        .collect();
    path.push(root.to_path_buf());
    path
}
