use std::collections::BTreeMap;
use std::sync::Arc;

use layerpatch_core::TargetKind;
use tracing::{info, warn};

use crate::error::{PatchingError, Result};
use crate::identity::InstalledIdentity;
use crate::manager::WritePermit;
use crate::mutable::MutableTarget;
use crate::target_info::TargetInfo;

/// Committed patch state of every layer and add-on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationState {
    layers: BTreeMap<String, TargetInfo>,
    add_ons: BTreeMap<String, TargetInfo>,
}

impl InstallationState {
    pub fn from_identity(identity: &InstalledIdentity) -> Self {
        Self {
            layers: identity
                .layers()
                .iter()
                .map(|layer| (layer.name().to_string(), layer.info().clone()))
                .collect(),
            add_ons: identity
                .add_ons()
                .iter()
                .map(|add_on| (add_on.name().to_string(), add_on.info().clone()))
                .collect(),
        }
    }

    pub fn layers(&self) -> &BTreeMap<String, TargetInfo> {
        &self.layers
    }

    pub fn add_ons(&self) -> &BTreeMap<String, TargetInfo> {
        &self.add_ons
    }

    pub fn layer(&self, name: &str) -> Option<&TargetInfo> {
        self.layers.get(name)
    }

    pub fn add_on(&self, name: &str) -> Option<&TargetInfo> {
        self.add_ons.get(name)
    }
}

/// One all-or-nothing change to the installation's patch state.
///
/// Holds the manager's write permit for its whole lifetime: no other
/// modification can start until this one is completed, cancelled or
/// dropped.
#[derive(Debug)]
pub struct InstallationModification<'a> {
    permit: WritePermit<'a>,
    name: String,
    version: String,
    identity: MutableTarget,
    layers: BTreeMap<String, MutableTarget>,
    add_ons: BTreeMap<String, MutableTarget>,
    unmodified: Arc<InstallationState>,
}

impl<'a> InstallationModification<'a> {
    pub(crate) fn new(
        permit: WritePermit<'a>,
        name: String,
        version: String,
        identity: TargetInfo,
        state: Arc<InstallationState>,
    ) -> Self {
        let working_copies = |targets: &BTreeMap<String, TargetInfo>| {
            targets
                .iter()
                .map(|(name, info)| (name.clone(), MutableTarget::new(info.clone())))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            permit,
            name,
            version,
            identity: MutableTarget::new(identity),
            layers: working_copies(state.layers()),
            add_ons: working_copies(state.add_ons()),
            unmodified: state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn identity(&mut self) -> &mut MutableTarget {
        &mut self.identity
    }

    /// The state this modification started from.
    pub fn unmodified_state(&self) -> &InstallationState {
        &self.unmodified
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn add_on_names(&self) -> impl Iterator<Item = &str> {
        self.add_ons.keys().map(String::as_str)
    }

    pub fn resolve(&mut self, name: &str, kind: TargetKind) -> Result<&mut MutableTarget> {
        let target = match kind {
            TargetKind::Identity => (name == self.name).then_some(&mut self.identity),
            TargetKind::Layer => self.layers.get_mut(name),
            TargetKind::AddOn => self.add_ons.get_mut(name),
        };
        target.ok_or_else(|| PatchingError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    /// Persists every modified target, layers and add-ons first and the
    /// identity last. When any write fails, every target written so far,
    /// the failing one included, is restored and the first error returned.
    pub fn complete(mut self) -> Result<Arc<InstallationState>> {
        if let Err(err) = self.persist_all() {
            info!(identity = %self.name, error = %err, "installation modification rolled back");
            return Err(err);
        }

        let state = Arc::new(InstallationState {
            layers: modified_states(&self.layers),
            add_ons: modified_states(&self.add_ons),
        });
        self.permit.replace_state(Arc::clone(&state));
        info!(
            identity = %self.name,
            cumulative = ?self.identity.cumulative_patch_id(),
            one_offs = self.identity.patch_ids().len(),
            "installation modification completed"
        );
        Ok(state)
    }

    /// Discards all in-memory changes without touching the disk.
    pub fn cancel(self) {
        info!(identity = %self.name, "installation modification cancelled");
    }

    fn persist_all(&mut self) -> Result<()> {
        let mut touched: Vec<&mut MutableTarget> = self
            .layers
            .values_mut()
            .chain(self.add_ons.values_mut())
            .chain(std::iter::once(&mut self.identity))
            .filter(|target| target.is_modified())
            .collect();

        for index in 0..touched.len() {
            if let Err(err) = touched[index].persist() {
                for target in touched[..=index].iter_mut().rev() {
                    if let Err(restore_err) = target.restore() {
                        warn!(
                            kind = %target.kind(),
                            metadata = %target.directory_structure().metadata_dir().display(),
                            error = %restore_err,
                            "failed to restore target after aborted modification"
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

fn modified_states(targets: &BTreeMap<String, MutableTarget>) -> BTreeMap<String, TargetInfo> {
    targets
        .iter()
        .map(|(name, target)| (name.clone(), target.modified_state()))
        .collect()
}
