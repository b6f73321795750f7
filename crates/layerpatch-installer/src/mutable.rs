use std::path::PathBuf;

use layerpatch_core::{PatchId, PatchType, Properties, TargetKind};
use tracing::debug;

use crate::error::{PatchingError, Result};
use crate::refs::{read_refs, write_ref, write_refs};
use crate::structure::DirectoryStructure;
use crate::target_info::TargetInfo;

/// Working copy of one target's patch stack.
///
/// Mutations only touch memory until [`MutableTarget::persist`]; the
/// wrapped [`TargetInfo`] is kept as loaded so [`MutableTarget::restore`]
/// can always write the pre-transaction state back.
#[derive(Debug, Clone)]
pub struct MutableTarget {
    original: TargetInfo,
    cumulative_patch_id: Option<PatchId>,
    patch_ids: Vec<PatchId>,
    displaced: Option<DisplacedRefs>,
}

/// A reference list overwritten by `persist` under a baseline other than
/// the original one.
#[derive(Debug, Clone)]
struct DisplacedRefs {
    path: PathBuf,
    previous: Vec<PatchId>,
}

impl MutableTarget {
    pub fn new(original: TargetInfo) -> Self {
        Self {
            cumulative_patch_id: original.cumulative_patch_id().cloned(),
            patch_ids: original.patch_ids().to_vec(),
            original,
            displaced: None,
        }
    }

    pub fn original(&self) -> &TargetInfo {
        &self.original
    }

    pub fn kind(&self) -> TargetKind {
        self.original.kind()
    }

    pub fn cumulative_patch_id(&self) -> Option<&PatchId> {
        self.cumulative_patch_id.as_ref()
    }

    pub fn patch_ids(&self) -> &[PatchId] {
        &self.patch_ids
    }

    pub fn properties(&self) -> &Properties {
        self.original.properties()
    }

    pub fn directory_structure(&self) -> &DirectoryStructure {
        self.original.directory_structure()
    }

    pub fn is_applied(&self, patch_id: &PatchId) -> bool {
        self.cumulative_patch_id.as_ref() == Some(patch_id) || self.patch_ids.contains(patch_id)
    }

    /// Whether the in-memory state differs from what was loaded.
    pub fn is_modified(&self) -> bool {
        self.cumulative_patch_id.as_ref() != self.original.cumulative_patch_id()
            || self.patch_ids != self.original.patch_ids()
    }

    pub fn apply(&mut self, patch_id: PatchId, patch_type: PatchType) -> Result<()> {
        patch_id
            .validate()
            .map_err(|err| PatchingError::InvalidState(err.to_string()))?;
        match patch_type {
            PatchType::Cumulative => {
                if !self.patch_ids.is_empty() {
                    return Err(PatchingError::InvalidState(format!(
                        "cannot apply cumulative patch '{patch_id}' while one-off patches are applied: {}",
                        join_ids(&self.patch_ids)
                    )));
                }
                self.cumulative_patch_id = Some(patch_id);
            }
            PatchType::OneOff => self.patch_ids.insert(0, patch_id),
        }
        Ok(())
    }

    /// Rolls back the most recent one-off, or the cumulative baseline once
    /// no one-offs remain. Rolling back the baseline leaves the cumulative
    /// marker in place; [`MutableTarget::clear_cumulative`] removes it.
    pub fn rollback(&mut self, patch_id: &PatchId) -> Result<()> {
        if self.patch_ids.first() == Some(patch_id) {
            self.patch_ids.remove(0);
            return Ok(());
        }
        if self.patch_ids.contains(patch_id) {
            return Err(PatchingError::InvalidState(format!(
                "cannot rollback '{patch_id}' before the more recent patch '{}'",
                self.patch_ids[0]
            )));
        }
        if self.patch_ids.is_empty() && self.cumulative_patch_id.as_ref() == Some(patch_id) {
            return Ok(());
        }
        Err(PatchingError::InvalidState(format!(
            "cannot rollback not-applied patch '{patch_id}'"
        )))
    }

    pub fn clear_cumulative(&mut self) -> Result<()> {
        if !self.patch_ids.is_empty() {
            return Err(PatchingError::InvalidState(format!(
                "cannot clear the cumulative baseline while one-off patches are applied: {}",
                join_ids(&self.patch_ids)
            )));
        }
        self.cumulative_patch_id = None;
        Ok(())
    }

    /// Snapshot of the current, possibly uncommitted, state.
    pub fn modified_state(&self) -> TargetInfo {
        self.original
            .with_state(self.cumulative_patch_id.clone(), self.patch_ids.clone())
    }

    /// Writes the current state. The reference list goes first so that a
    /// crash before the pointer moves leaves the previous state readable.
    pub fn persist(&mut self) -> Result<()> {
        let structure = self.original.directory_structure();
        let refs_path = structure.cumulative_refs_path(self.cumulative_patch_id.as_ref());
        let original_refs_path =
            structure.cumulative_refs_path(self.original.cumulative_patch_id());

        if refs_path != original_refs_path && self.displaced.is_none() {
            let previous = read_refs(&refs_path)?;
            self.displaced = Some(DisplacedRefs {
                path: refs_path.clone(),
                previous,
            });
        }

        write_refs(&refs_path, &self.patch_ids)?;
        write_ref(
            &structure.cumulative_link_path(),
            self.cumulative_patch_id.as_ref(),
        )?;
        debug!(
            kind = %self.kind(),
            metadata = %structure.metadata_dir().display(),
            cumulative = ?self.cumulative_patch_id,
            one_offs = self.patch_ids.len(),
            "persisted target"
        );
        Ok(())
    }

    /// Writes the originally loaded state back to disk.
    pub fn restore(&mut self) -> Result<()> {
        let structure = self.original.directory_structure();
        write_refs(
            &structure.cumulative_refs_path(self.original.cumulative_patch_id()),
            self.original.patch_ids(),
        )?;
        write_ref(
            &structure.cumulative_link_path(),
            self.original.cumulative_patch_id(),
        )?;
        if let Some(displaced) = self.displaced.take() {
            write_refs(&displaced.path, &displaced.previous)?;
        }
        debug!(
            kind = %self.kind(),
            metadata = %structure.metadata_dir().display(),
            "restored target"
        );
        Ok(())
    }
}

fn join_ids(ids: &[PatchId]) -> String {
    ids.iter()
        .map(PatchId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
