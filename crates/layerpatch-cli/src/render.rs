use std::io::IsTerminal;
use std::path::Path;

use anstyle::{AnsiColor, Effects, Style};
use anyhow::{Context, Result};
use layerpatch_core::{PatchId, TargetKind};
use layerpatch_installer::{module_path, InstalledIdentity, PatchableTarget, TargetInfo};
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
    Json,
}

impl OutputStyle {
    pub(crate) fn detect(json: bool) -> Self {
        if json {
            Self::Json
        } else if std::io::stdout().is_terminal() {
            Self::Rich
        } else {
            Self::Plain
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstallationReport {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) home: String,
    pub(crate) identity: TargetReport,
    pub(crate) layers: Vec<TargetReport>,
    pub(crate) add_ons: Vec<TargetReport>,
    pub(crate) patches: Vec<PatchId>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TargetReport {
    pub(crate) name: String,
    pub(crate) kind: TargetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) module_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) bundle_root: Option<String>,
    pub(crate) cumulative_patch_id: Option<PatchId>,
    pub(crate) patch_ids: Vec<PatchId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) module_path: Vec<String>,
}

impl TargetReport {
    fn new(name: &str, info: &TargetInfo) -> Self {
        let structure = info.directory_structure();
        Self {
            name: name.to_string(),
            kind: info.kind(),
            module_root: structure.module_root().map(display_path),
            bundle_root: structure.bundle_root().map(display_path),
            cumulative_patch_id: info.cumulative_patch_id().cloned(),
            patch_ids: info.patch_ids().to_vec(),
            module_path: module_path(info)
                .iter()
                .map(|path| display_path(path))
                .collect(),
        }
    }

    fn from_target(target: &PatchableTarget) -> Self {
        Self::new(target.name(), target.info())
    }
}

impl InstallationReport {
    pub(crate) fn from_installed(installed: &InstalledIdentity) -> Self {
        let identity = installed.identity();
        Self {
            name: identity.name().to_string(),
            version: identity.version().to_string(),
            home: display_path(installed.installed_image().home()),
            identity: TargetReport::new(identity.name(), identity.info()),
            layers: installed
                .layers()
                .iter()
                .map(TargetReport::from_target)
                .collect(),
            add_ons: installed
                .add_ons()
                .iter()
                .map(TargetReport::from_target)
                .collect(),
            patches: installed.all_installed_patches().to_vec(),
        }
    }
}

pub(crate) fn render_info(report: &InstallationReport, style: OutputStyle) -> Result<String> {
    if style == OutputStyle::Json {
        return to_json(report);
    }

    let mut lines = vec![
        section(style, "identity"),
        format!("name: {}", report.name),
        format!("version: {}", report.version),
        format!("home: {}", report.home),
    ];
    lines.extend(patch_state_lines(&report.identity));
    lines.push(format!(
        "layers: {}  add-ons: {}",
        report.layers.len(),
        report.add_ons.len()
    ));
    Ok(lines.join("\n"))
}

pub(crate) fn render_layers(report: &InstallationReport, style: OutputStyle) -> Result<String> {
    if style == OutputStyle::Json {
        return to_json(&serde_json::json!({
            "layers": report.layers,
            "add_ons": report.add_ons,
        }));
    }

    let mut lines = vec![section(style, "layers")];
    lines.extend(report.layers.iter().flat_map(target_lines));
    lines.push(section(style, "add-ons"));
    lines.extend(report.add_ons.iter().flat_map(target_lines));
    Ok(lines.join("\n"))
}

pub(crate) fn render_history(report: &InstallationReport, style: OutputStyle) -> Result<String> {
    if style == OutputStyle::Json {
        return to_json(&serde_json::json!({ "patches": report.patches }));
    }

    if report.patches.is_empty() {
        return Ok("no patches recorded".to_string());
    }
    Ok(report
        .patches
        .iter()
        .map(PatchId::to_string)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn target_lines(target: &TargetReport) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", target.name, target.kind)];
    if let Some(root) = &target.module_root {
        lines.push(format!("  module root: {root}"));
    }
    if let Some(root) = &target.bundle_root {
        lines.push(format!("  bundle root: {root}"));
    }
    lines.extend(patch_state_lines(target).into_iter().map(|line| format!("  {line}")));
    lines
}

fn patch_state_lines(target: &TargetReport) -> Vec<String> {
    let cumulative = target
        .cumulative_patch_id
        .as_ref()
        .map(PatchId::to_string)
        .unwrap_or_else(|| "none".to_string());
    let one_offs = if target.patch_ids.is_empty() {
        "none".to_string()
    } else {
        target
            .patch_ids
            .iter()
            .map(PatchId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        format!("cumulative: {cumulative}"),
        format!("one-offs: {one_offs}"),
    ]
}

fn section(style: OutputStyle, title: &str) -> String {
    let line = format!("== {title} ==");
    match style {
        OutputStyle::Rich => colorize(section_style(), &line),
        _ => line,
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report")
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
