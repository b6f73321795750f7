use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved id standing for "no cumulative patch applied".
pub const BASE: &str = "base";

/// Opaque, globally unique identifier of one patch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(String);

impl PatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Like [`PatchId::new`], but only accepts ids that [`PatchId::validate`]
    /// would.
    pub fn parse(id: impl Into<String>) -> Result<Self, InvalidPatchId> {
        let id = Self::new(id);
        id.validate()?;
        Ok(id)
    }

    pub fn is_base(&self) -> bool {
        self.0 == BASE
    }

    /// An id must fit on one line of a reference file and name exactly one
    /// directory entry.
    pub fn validate(&self) -> Result<(), InvalidPatchId> {
        let id = self.0.as_str();
        if id.is_empty() {
            return Err(InvalidPatchId::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(InvalidPatchId::Whitespace(id.to_string()));
        }
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(InvalidPatchId::NotAFileName(id.to_string()));
        }
        if id == BASE {
            return Err(InvalidPatchId::Reserved(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPatchId {
    #[error("patch id must not be empty")]
    Empty,

    #[error("patch id {0:?} contains whitespace")]
    Whitespace(String),

    #[error("patch id {0:?} is not a plain file name")]
    NotAFileName(String),

    #[error("patch id {0:?} is reserved")]
    Reserved(String),
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatchId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchType {
    Cumulative,
    OneOff,
}

impl PatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cumulative => "cumulative",
            Self::OneOff => "one-off",
        }
    }
}

/// The closed set of things patch state is tracked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Identity,
    Layer,
    AddOn,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Layer => "layer",
            Self::AddOn => "add-on",
        }
    }

    /// File name of the installation info properties inside a target's
    /// metadata directory.
    pub fn info_file_name(&self) -> &'static str {
        match self {
            Self::Identity => "identity.conf",
            Self::Layer => "layer.conf",
            Self::AddOn => "add-on.conf",
        }
    }

    /// Directory under a target root that holds per-patch overlay content.
    /// Identities have no module or bundle root of their own.
    pub fn overlay_dir_name(&self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::Layer => Some(".overlays"),
            Self::AddOn => Some("patches"),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
