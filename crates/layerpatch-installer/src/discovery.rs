use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use layerpatch_core::{parse_properties, LayersConfig, TargetKind, LAYERS_CONF};
use tracing::debug;

use crate::error::{PatchingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Module,
    Bundle,
}

impl RootKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roots resolved for one layer or add-on name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRoots {
    module_root: Option<PathBuf>,
    bundle_root: Option<PathBuf>,
}

impl ResolvedRoots {
    pub fn module_root(&self) -> Option<&Path> {
        self.module_root.as_deref()
    }

    pub fn bundle_root(&self) -> Option<&Path> {
        self.bundle_root.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<PathBuf>, Option<PathBuf>) {
        (self.module_root, self.bundle_root)
    }

    /// First write wins; `false` when a root of that kind was already set.
    fn set(&mut self, root_kind: RootKind, path: PathBuf) -> bool {
        let slot = match root_kind {
            RootKind::Module => &mut self.module_root,
            RootKind::Bundle => &mut self.bundle_root,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(path);
        true
    }
}

/// Layers and add-ons found across all roots, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedLayers {
    layers: Vec<(String, ResolvedRoots)>,
    add_ons: Vec<(String, ResolvedRoots)>,
}

impl ProcessedLayers {
    pub fn layers(&self) -> &[(String, ResolvedRoots)] {
        &self.layers
    }

    pub fn add_ons(&self) -> &[(String, ResolvedRoots)] {
        &self.add_ons
    }

    pub fn layer(&self, name: &str) -> Option<&ResolvedRoots> {
        find(&self.layers, name)
    }

    pub fn add_on(&self, name: &str) -> Option<&ResolvedRoots> {
        find(&self.add_ons, name)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Vec<(String, ResolvedRoots)>, Vec<(String, ResolvedRoots)>) {
        (self.layers, self.add_ons)
    }

    fn add_layer(&mut self, name: &str, path: PathBuf, root_kind: RootKind) -> Result<()> {
        register(&mut self.layers, TargetKind::Layer, name, path, root_kind)
    }

    fn add_add_on(&mut self, name: &str, path: PathBuf, root_kind: RootKind) -> Result<()> {
        register(&mut self.add_ons, TargetKind::AddOn, name, path, root_kind)
    }
}

fn find<'a>(entries: &'a [(String, ResolvedRoots)], name: &str) -> Option<&'a ResolvedRoots> {
    entries
        .iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, roots)| roots)
}

fn register(
    entries: &mut Vec<(String, ResolvedRoots)>,
    kind: TargetKind,
    name: &str,
    path: PathBuf,
    root_kind: RootKind,
) -> Result<()> {
    let index = match entries.iter().position(|(entry, _)| entry == name) {
        Some(index) => index,
        None => {
            entries.push((name.to_string(), ResolvedRoots::default()));
            entries.len() - 1
        }
    };

    debug!(%kind, name, root = %root_kind, path = %path.display(), "registering root");
    if !entries[index].1.set(root_kind, path) {
        return Err(PatchingError::DuplicateLayer {
            kind,
            root: root_kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Reads `<root>/layers.conf`, falling back to the unconfigured defaults
/// when the file does not exist.
pub fn load_layers_config(root: &Path) -> Result<LayersConfig> {
    let path = root.join(LAYERS_CONF);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(LayersConfig::from_properties(&parse_properties(&raw))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LayersConfig::unconfigured()),
        Err(err) => Err(PatchingError::io(&path)(err)),
    }
}

/// Resolves every layer and add-on reachable from the given roots. Module
/// roots are processed first, then bundle roots, each in the given order.
pub fn process_roots(module_roots: &[PathBuf], bundle_roots: &[PathBuf]) -> Result<ProcessedLayers> {
    let mut processed = ProcessedLayers::default();
    for root in module_roots {
        process_root(root, &mut processed, RootKind::Module)?;
    }
    for root in bundle_roots {
        process_root(root, &mut processed, RootKind::Bundle)?;
    }
    Ok(processed)
}

fn process_root(root: &Path, processed: &mut ProcessedLayers, root_kind: RootKind) -> Result<()> {
    let config = load_layers_config(root)?;
    let layers_dir = root.join(config.layers_path());

    if !layers_dir.is_dir() {
        if config.is_configured() && !config.layers().is_empty() {
            return Err(PatchingError::config(
                root.join(LAYERS_CONF),
                format!("layers directory {} does not exist", layers_dir.display()),
            ));
        }
        debug!(root = %root.display(), "root has no layers directory");
    } else {
        for layer in config.layers() {
            let layer_dir = layers_dir.join(layer);
            if !layer_dir.is_dir() {
                if config.is_configured() {
                    return Err(PatchingError::config(
                        root.join(LAYERS_CONF),
                        format!(
                            "layer '{layer}' is declared but {} does not exist",
                            layer_dir.display()
                        ),
                    ));
                }
                debug!(root = %root.display(), "root is not a layered root");
                return Ok(());
            }
            processed.add_layer(layer, layer_dir, root_kind)?;
        }
    }

    let add_ons_dir = root.join(config.add_ons_path());
    for (name, path) in list_subdirectories(&add_ons_dir)? {
        processed.add_add_on(&name, path, root_kind)?;
    }
    Ok(())
}

/// Immediate subdirectories sorted by name; a missing directory is empty.
fn list_subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PatchingError::io(dir)(err)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(PatchingError::io(dir))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        found.push((name, path));
    }
    found.sort();
    Ok(found)
}
