use std::io;
use std::path::{Path, PathBuf};

use layerpatch_core::TargetKind;
use thiserror::Error;

use crate::discovery::RootKind;

pub type Result<T, E = PatchingError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PatchingError {
    /// A `layers.conf` that contradicts the directories on disk.
    #[error("invalid layers configuration in {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("duplicate {root} root for {kind} '{name}'")]
    DuplicateLayer {
        kind: TargetKind,
        root: RootKind,
        name: String,
    },

    #[error("{kind} '{name}' has neither a module root nor a bundle root")]
    MissingRoot { kind: TargetKind, name: String },

    #[error("invalid patch state: {0}")]
    InvalidState(String),

    #[error("no such {kind}: '{name}'")]
    NotFound { kind: TargetKind, name: String },

    #[error("installation is already being modified")]
    AlreadyModifying,

    #[error("installation must be restarted before it can be modified again")]
    RestartRequired,

    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchingError {
    pub(crate) fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn config(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}
