use layerpatch_core::{PatchId, Properties, TargetKind};
use tracing::debug;

use crate::error::Result;
use crate::refs::{load_properties, read_ref, read_refs};
use crate::structure::DirectoryStructure;

/// Patch state of one target as last read from (or committed to) disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    cumulative_patch_id: Option<PatchId>,
    patch_ids: Vec<PatchId>,
    properties: Properties,
    structure: DirectoryStructure,
}

impl TargetInfo {
    pub fn load(structure: DirectoryStructure) -> Result<Self> {
        let properties = load_properties(&structure.installation_info_path())?;
        let cumulative_patch_id = read_ref(&structure.cumulative_link_path())?;
        let patch_ids = read_refs(&structure.cumulative_refs_path(cumulative_patch_id.as_ref()))?;
        debug!(
            kind = %structure.kind(),
            metadata = %structure.metadata_dir().display(),
            cumulative = ?cumulative_patch_id,
            one_offs = patch_ids.len(),
            "loaded target info"
        );

        Ok(Self {
            cumulative_patch_id,
            patch_ids,
            properties,
            structure,
        })
    }

    pub(crate) fn with_state(
        &self,
        cumulative_patch_id: Option<PatchId>,
        patch_ids: Vec<PatchId>,
    ) -> Self {
        Self {
            cumulative_patch_id,
            patch_ids,
            properties: self.properties.clone(),
            structure: self.structure.clone(),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.structure.kind()
    }

    pub fn cumulative_patch_id(&self) -> Option<&PatchId> {
        self.cumulative_patch_id.as_ref()
    }

    /// Applied one-off patches, most recent first.
    pub fn patch_ids(&self) -> &[PatchId] {
        &self.patch_ids
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn directory_structure(&self) -> &DirectoryStructure {
        &self.structure
    }

    pub fn is_applied(&self, patch_id: &PatchId) -> bool {
        self.cumulative_patch_id.as_ref() == Some(patch_id) || self.patch_ids.contains(patch_id)
    }
}
