use serde::Serialize;

use crate::catalog::{generic_base_sentence, Angle, ArtStyle, CameraModel, LensKind};

/// Stylistic modifiers applied on top of an angle's base sentence.
///
/// `focal_length_mm` and `aperture_f` are free-form; they are interpolated
/// verbatim (trimmed) and never validated as numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptModifiers {
    pub style: ArtStyle,
    pub camera: CameraModel,
    pub lens: LensKind,
    pub focal_length_mm: String,
    pub aperture_f: String,
}

impl PromptModifiers {
    pub fn is_default(&self) -> bool {
        self.style.is_default()
            && self.camera.is_default()
            && self.lens.is_default()
            && self.focal_length_mm.trim().is_empty()
            && self.aperture_f.trim().is_empty()
    }
}

/// Builds the generation prompt for `angle_name`.
///
/// Clause order is fixed: style, camera, lens, focal length, aperture. A clause
/// is only appended when its value differs from the neutral default.
pub fn compose_prompt(angle_name: &str, modifiers: &PromptModifiers) -> String {
    let mut prompt = match Angle::from_label(angle_name) {
        Ok(angle) => angle.base_sentence(),
        Err(_) => generic_base_sentence(angle_name),
    };
    for clause in modifier_clauses(modifiers) {
        prompt.push(' ');
        prompt.push_str(&clause);
    }
    prompt
}

impl Angle {
    pub fn prompt(self, modifiers: &PromptModifiers) -> String {
        compose_prompt(self.label(), modifiers)
    }
}

fn modifier_clauses(modifiers: &PromptModifiers) -> Vec<String> {
    let mut clauses = Vec::new();
    if !modifiers.style.is_default() {
        clauses.push(format!("Render the image in {} style.", modifiers.style));
    }
    if !modifiers.camera.is_default() {
        clauses.push(format!(
            "Make it look as if it was shot on a {} camera.",
            modifiers.camera
        ));
    }
    if !modifiers.lens.is_default() {
        clauses.push(format!("Use a {} lens.", modifiers.lens));
    }
    let focal = modifiers.focal_length_mm.trim();
    if !focal.is_empty() {
        clauses.push(format!("Use a focal length of {focal}mm."));
    }
    let aperture = modifiers.aperture_f.trim();
    if !aperture.is_empty() {
        clauses.push(format!("Use an aperture of f/{aperture}."));
    }
    clauses
}
