use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use turnaround_contracts::catalog::{Angle, ArtStyle, CameraModel, LensKind};
use turnaround_contracts::image::EncodedImage;
use turnaround_contracts::session::{AngleResult, Session};

pub fn control_panel(session: &Session, provider: &str) -> String {
    let selection = session.selection();
    let modifiers = &selection.modifiers;
    let mut out = String::new();

    let _ = writeln!(out, "Provider:  {provider}");
    let _ = writeln!(out, "API key:   {}", session.api_key_masked());
    let _ = writeln!(
        out,
        "Image:     {}",
        selection
            .image
            .as_ref()
            .map(describe_image)
            .unwrap_or_else(|| "(none uploaded)".to_string())
    );
    let _ = writeln!(
        out,
        "Angles:    {}/{} selected{}",
        selection.angles.len(),
        Angle::ALL.len(),
        if session.all_angles_selected() {
            " (all)"
        } else {
            ""
        }
    );
    for angle in Angle::ALL {
        let mark = if selection.angles.contains(angle) {
            "[x]"
        } else {
            "[ ]"
        };
        let _ = writeln!(out, "  {mark} {angle}");
    }
    let _ = writeln!(out, "Style:     {}", modifiers.style);
    let _ = writeln!(out, "Camera:    {}", modifiers.camera);
    let _ = writeln!(out, "Lens:      {}", modifiers.lens);
    let _ = writeln!(out, "Focal:     {}", or_dash(&modifiers.focal_length_mm, "mm"));
    let _ = writeln!(out, "Aperture:  {}", or_dash(&modifiers.aperture_f, ""));

    let submit = if session.is_busy() {
        "busy (generation in flight)".to_string()
    } else {
        match session.check_submit() {
            Ok(()) => "ready".to_string(),
            Err(err) => format!("disabled: {err}"),
        }
    };
    let _ = write!(out, "Generate:  {submit}");
    out
}

/// One row per submitted angle, always in canonical angle order.
pub fn result_grid(session: &Session) -> String {
    let rows = session.grid();
    if rows.is_empty() {
        return "No results yet.".to_string();
    }
    let width = rows
        .iter()
        .map(|(angle, _)| angle.label().chars().count())
        .max()
        .unwrap_or(0);
    rows.iter()
        .map(|(angle, result)| {
            let status = match result {
                AngleResult::Pending => "… generating".to_string(),
                AngleResult::Done(image) => format!("✓ {}", describe_image(image)),
                AngleResult::Failed(message) => format!("✗ error: {message}"),
            };
            format!("{:<width$}  {status}", angle.label())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn catalog_listing() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Angles:");
    for angle in Angle::ALL {
        let _ = writeln!(out, "  {angle} ({})", angle.slug());
    }
    let _ = writeln!(out, "Styles:  {}", labels(ArtStyle::ALL.iter().map(|v| v.label())));
    let _ = writeln!(out, "Cameras: {}", labels(CameraModel::ALL.iter().map(|v| v.label())));
    let _ = write!(out, "Lenses:  {}", labels(LensKind::ALL.iter().map(|v| v.label())));
    out
}

/// Writes every finished image to `dir` as `NN-<angle-slug>.<ext>`, where
/// `NN` is the angle's canonical position.
pub fn save_results(session: &Session, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::new();
    for (angle, result) in session.grid() {
        let AngleResult::Done(image) = result else {
            continue;
        };
        let index = Angle::ALL
            .iter()
            .position(|candidate| *candidate == angle)
            .unwrap_or(0)
            + 1;
        let path = dir.join(format!(
            "{index:02}-{}.{}",
            angle.slug(),
            image.file_extension()
        ));
        let bytes = image
            .decode()
            .with_context(|| format!("{angle} image payload is corrupt"))?;
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn describe_image(image: &EncodedImage) -> String {
    format!("{} ({} bytes)", image.mime_type(), image.byte_len())
}

fn or_dash(value: &str, unit: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "-".to_string();
    }
    format!("{trimmed}{unit}")
}

fn labels<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
