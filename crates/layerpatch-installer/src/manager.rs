use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{PatchingError, Result};
use crate::identity::InstalledIdentity;
use crate::modification::{InstallationModification, InstallationState};
use crate::structure::DirectoryStructure;
use crate::target_info::TargetInfo;

/// Single-writer coordinator owning the installation's cached patch state.
#[derive(Debug)]
pub struct InstallationManager {
    installed_identity: RwLock<Arc<InstalledIdentity>>,
    state: RwLock<Arc<InstallationState>>,
    writable: AtomicBool,
    restart_required: AtomicBool,
}

impl InstallationManager {
    pub fn new(installed_identity: InstalledIdentity) -> Self {
        let state = InstallationState::from_identity(&installed_identity);
        Self {
            installed_identity: RwLock::new(Arc::new(installed_identity)),
            state: RwLock::new(Arc::new(state)),
            writable: AtomicBool::new(true),
            restart_required: AtomicBool::new(false),
        }
    }

    pub fn load(home: impl Into<PathBuf>) -> Result<Self> {
        InstalledIdentity::load(home).map(Self::new)
    }

    pub fn installed_identity(&self) -> Arc<InstalledIdentity> {
        let guard = self
            .installed_identity
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// The last committed state. Replaced wholesale on every commit.
    pub fn installation_state(&self) -> Arc<InstallationState> {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Opens a modification. Fails immediately instead of waiting when
    /// another modification is open or a restart is pending.
    pub fn modify_installation(&self) -> Result<InstallationModification<'_>> {
        if self.is_restart_required() {
            return Err(PatchingError::RestartRequired);
        }
        let permit = WritePermit::acquire(self)?;

        let installed = self.installed_identity();
        let identity = installed.identity();
        let identity_info =
            TargetInfo::load(DirectoryStructure::for_identity(installed.installed_image()))?;
        debug!(identity = %identity.name(), "opened installation modification");

        Ok(InstallationModification::new(
            permit,
            identity.name().to_string(),
            identity.version().to_string(),
            identity_info,
            self.installation_state(),
        ))
    }

    /// Rediscovers the installation from disk and resets the cached state.
    pub fn reload(&self) -> Result<()> {
        let _permit = WritePermit::acquire(self)?;
        let reloaded = self.installed_identity().reload()?;
        let state = InstallationState::from_identity(&reloaded);

        *self
            .installed_identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(reloaded);
        self.replace_state(Arc::new(state));
        info!("installation reloaded");
        Ok(())
    }

    pub fn is_restart_required(&self) -> bool {
        self.restart_required.load(Ordering::Acquire)
    }

    /// Returns `true` when this call set the flag.
    pub fn set_restart_required(&self) -> bool {
        !self.restart_required.swap(true, Ordering::AcqRel)
    }

    pub fn clear_restart_required(&self) {
        self.restart_required.store(false, Ordering::Release);
    }

    fn replace_state(&self, state: Arc<InstallationState>) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Proof of exclusive write access to an [`InstallationManager`].
///
/// Only obtainable by flipping the manager's writable flag; dropping the
/// permit flips it back.
pub struct WritePermit<'a> {
    manager: &'a InstallationManager,
}

impl<'a> WritePermit<'a> {
    fn acquire(manager: &'a InstallationManager) -> Result<Self> {
        manager
            .writable
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PatchingError::AlreadyModifying)?;
        Ok(Self { manager })
    }

    pub(crate) fn replace_state(&self, state: Arc<InstallationState>) {
        self.manager.replace_state(state);
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        self.manager.writable.store(true, Ordering::Release);
    }
}

impl fmt::Debug for WritePermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePermit").finish_non_exhaustive()
    }
}
