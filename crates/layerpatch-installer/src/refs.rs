use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use layerpatch_core::{parse_properties, PatchId, Properties};

use crate::error::{PatchingError, Result};

pub(crate) fn load_properties(path: &Path) -> Result<Properties> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_properties(&raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Properties::new()),
        Err(err) => Err(PatchingError::io(path)(err)),
    }
}

/// Reads a single-value reference file. A missing or blank file, or the
/// reserved `base` id, means no reference.
pub(crate) fn read_ref(path: &Path) -> Result<Option<PatchId>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(PatchingError::io(path)(err)),
    };

    let value = raw.lines().map(str::trim).find(|line| !line.is_empty());
    Ok(value.map(PatchId::from).filter(|id| !id.is_base()))
}

pub(crate) fn read_refs(path: &Path) -> Result<Vec<PatchId>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PatchingError::io(path)(err)),
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PatchId::from)
        .collect())
}

pub(crate) fn write_ref(path: &Path, value: Option<&PatchId>) -> Result<()> {
    match value {
        Some(id) => write_atomic(path, &format!("{id}\n")),
        None => remove_file_if_exists(path),
    }
}

pub(crate) fn write_refs(path: &Path, values: &[PatchId]) -> Result<()> {
    if values.is_empty() {
        return remove_file_if_exists(path);
    }

    let mut payload = String::new();
    for value in values {
        payload.push_str(value.as_str());
        payload.push('\n');
    }
    write_atomic(path, &payload)
}

/// Writes next to the destination and renames over it, so readers see
/// either the old or the new contents.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(PatchingError::io(parent))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, contents).map_err(PatchingError::io(&tmp))?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PatchingError::io(path)(err));
    }
    Ok(())
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PatchingError::io(path)(err)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
