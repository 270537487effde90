use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Angle, ArtStyle, CameraModel, LensKind};
use crate::image::EncodedImage;
use crate::prompt::PromptModifiers;

pub const GENERIC_FAILURE_MESSAGE: &str = "Image generation failed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Enter an API key before generating.")]
    MissingApiKey,
    #[error("Upload a character image before generating.")]
    MissingImage,
    #[error("Select at least one angle before generating.")]
    NoAnglesSelected,
}

/// Lifecycle of one angle within a single submission batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AngleResult {
    Pending,
    Done(EncodedImage),
    Failed(String),
}

impl AngleResult {
    /// Failure with `message`, or the generic message when it is blank.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return AngleResult::Failed(GENERIC_FAILURE_MESSAGE.to_string());
        }
        AngleResult::Failed(trimmed.to_string())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AngleResult::Pending)
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            AngleResult::Pending => "pending",
            AngleResult::Done(_) => "done",
            AngleResult::Failed(_) => "failed",
        }
    }
}

/// Keyed by angle; iteration follows the canonical angle order.
pub type ResultMap = BTreeMap<Angle, AngleResult>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub api_key: String,
    pub image: Option<EncodedImage>,
    pub angles: BTreeSet<Angle>,
    pub modifiers: PromptModifiers,
}

/// Identifies one submission; results carrying an older token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct AngleJob {
    pub angle: Angle,
    pub prompt: String,
}

/// Everything a batch needs once it leaves the session: no borrow of the
/// session is held while requests are in flight.
#[derive(Debug, Clone)]
pub struct GenerationBatch {
    pub token: GenerationToken,
    pub api_key: String,
    pub source_image: EncodedImage,
    pub jobs: Vec<AngleJob>,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub token: GenerationToken,
    pub results: Vec<(Angle, AngleResult)>,
}

impl BatchOutcome {
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, result)| matches!(result, AngleResult::Failed(_)))
            .count()
    }
}

/// Session-scoped state container. All mutation goes through the methods
/// below; nothing here performs I/O.
#[derive(Debug, Default)]
pub struct Session {
    selection: Selection,
    results: ResultMap,
    busy: bool,
    current_token: Option<GenerationToken>,
    next_token: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn results(&self) -> &ResultMap {
        &self.results
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn current_token(&self) -> Option<GenerationToken> {
        self.current_token
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.selection.api_key = key.into().trim().to_string();
    }

    pub fn has_api_key(&self) -> bool {
        !self.selection.api_key.is_empty()
    }

    /// Display form of the key: never more than the last four characters.
    pub fn api_key_masked(&self) -> String {
        let key = &self.selection.api_key;
        if key.is_empty() {
            return "(not set)".to_string();
        }
        let count = key.chars().count();
        if count <= 8 {
            return "•".repeat(count);
        }
        let tail: String = key.chars().skip(count - 4).collect();
        format!("{}{tail}", "•".repeat(count - 4))
    }

    /// Replaces the uploaded image and discards every previous result.
    pub fn set_image(&mut self, image: EncodedImage) {
        self.selection.image = Some(image);
        self.results.clear();
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        self.selection.image.as_ref()
    }

    /// Returns whether the angle is selected after the toggle.
    pub fn toggle_angle(&mut self, angle: Angle) -> bool {
        if self.selection.angles.remove(&angle) {
            return false;
        }
        self.selection.angles.insert(angle);
        true
    }

    pub fn select_angle(&mut self, angle: Angle) {
        self.selection.angles.insert(angle);
    }

    pub fn deselect_angle(&mut self, angle: Angle) {
        self.selection.angles.remove(&angle);
    }

    pub fn all_angles_selected(&self) -> bool {
        Angle::ALL
            .iter()
            .all(|angle| self.selection.angles.contains(angle))
    }

    /// Clears the selection when every angle is selected, otherwise selects
    /// them all.
    pub fn toggle_all_angles(&mut self) {
        if self.all_angles_selected() {
            self.selection.angles.clear();
        } else {
            self.selection.angles = Angle::ALL.iter().copied().collect();
        }
    }

    pub fn set_style(&mut self, style: ArtStyle) {
        self.selection.modifiers.style = style;
    }

    pub fn set_camera(&mut self, camera: CameraModel) {
        self.selection.modifiers.camera = camera;
    }

    pub fn set_lens(&mut self, lens: LensKind) {
        self.selection.modifiers.lens = lens;
    }

    pub fn set_focal_length(&mut self, value: impl Into<String>) {
        self.selection.modifiers.focal_length_mm = value.into();
    }

    pub fn set_aperture(&mut self, value: impl Into<String>) {
        self.selection.modifiers.aperture_f = value.into();
    }

    pub fn reset_modifiers(&mut self) {
        self.selection.modifiers = PromptModifiers::default();
    }

    pub fn check_submit(&self) -> Result<(), SubmitError> {
        if !self.has_api_key() {
            return Err(SubmitError::MissingApiKey);
        }
        if self.selection.image.is_none() {
            return Err(SubmitError::MissingImage);
        }
        if self.selection.angles.is_empty() {
            return Err(SubmitError::NoAnglesSelected);
        }
        Ok(())
    }

    /// Whether the submit control is enabled.
    pub fn can_submit(&self) -> bool {
        !self.busy && self.check_submit().is_ok()
    }

    /// Starts a submission: every selected angle becomes `Pending`, the
    /// session turns busy, and a fresh token supersedes any batch still in
    /// flight. Refusals leave the session untouched.
    pub fn begin_generation(&mut self) -> Result<GenerationBatch, SubmitError> {
        self.check_submit()?;
        let source_image = match self.selection.image.clone() {
            Some(image) => image,
            None => return Err(SubmitError::MissingImage),
        };

        self.next_token += 1;
        let token = GenerationToken(self.next_token);
        let jobs: Vec<AngleJob> = self
            .selection
            .angles
            .iter()
            .map(|angle| AngleJob {
                angle: *angle,
                prompt: angle.prompt(&self.selection.modifiers),
            })
            .collect();

        self.results = jobs
            .iter()
            .map(|job| (job.angle, AngleResult::Pending))
            .collect();
        self.busy = true;
        self.current_token = Some(token);

        Ok(GenerationBatch {
            token,
            api_key: self.selection.api_key.clone(),
            source_image,
            jobs,
        })
    }

    /// Merges a settled batch in one step and clears the busy flag, returning
    /// how many results landed in the map. Results whose slot is gone (the
    /// image was replaced mid-flight) are dropped. Outcomes from a superseded
    /// batch are ignored entirely and `None` is returned.
    pub fn complete_generation(&mut self, outcome: BatchOutcome) -> Option<usize> {
        if self.current_token != Some(outcome.token) {
            return None;
        }
        let mut merged = 0;
        for (angle, result) in outcome.results {
            if let Some(slot) = self.results.get_mut(&angle) {
                *slot = result;
                merged += 1;
            }
        }
        self.busy = false;
        self.current_token = None;
        Some(merged)
    }

    /// Canonical-order rows for the result grid.
    pub fn grid(&self) -> Vec<(Angle, &AngleResult)> {
        self.results
            .iter()
            .map(|(angle, result)| (*angle, result))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> EncodedImage {
        EncodedImage::from_bytes("image/png", b"\x89PNG\r\n\x1a\n").unwrap()
    }

    fn ready_session(angles: &[Angle]) -> Session {
        let mut session = Session::new();
        session.set_api_key("sk-test-key-123456");
        session.set_image(png());
        for angle in angles {
            session.select_angle(*angle);
        }
        session
    }

    fn done(angle: Angle) -> (Angle, AngleResult) {
        (angle, AngleResult::Done(png()))
    }

    #[test]
    fn upload_clears_previous_results() {
        let mut session = ready_session(&[Angle::SideView]);
        let batch = session.begin_generation().unwrap();
        session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![done(Angle::SideView)],
        });
        assert_eq!(session.results().len(), 1);

        session.set_image(png());
        assert!(session.results().is_empty());
        assert!(session.image().is_some_and(|image| !image.is_empty()));
    }

    #[test]
    fn submit_refused_without_preconditions() {
        let mut session = Session::new();
        assert_eq!(session.begin_generation().unwrap_err(), SubmitError::MissingApiKey);

        session.set_api_key("   ");
        assert_eq!(session.check_submit(), Err(SubmitError::MissingApiKey));

        session.set_api_key("key");
        assert_eq!(session.begin_generation().unwrap_err(), SubmitError::MissingImage);

        session.set_image(png());
        assert_eq!(
            session.begin_generation().unwrap_err(),
            SubmitError::NoAnglesSelected
        );
        assert!(session.results().is_empty());
        assert!(!session.is_busy());
        assert_eq!(session.current_token(), None);
    }

    #[test]
    fn refused_submit_keeps_previous_results() {
        let mut session = ready_session(&[Angle::CloseUp]);
        let batch = session.begin_generation().unwrap();
        session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![(Angle::CloseUp, AngleResult::failed("boom"))],
        });
        session.deselect_angle(Angle::CloseUp);

        assert_eq!(
            session.begin_generation().unwrap_err(),
            SubmitError::NoAnglesSelected
        );
        assert_eq!(
            session.results().get(&Angle::CloseUp),
            Some(&AngleResult::Failed("boom".to_string()))
        );
    }

    #[test]
    fn begin_marks_every_selected_angle_pending() {
        let mut session = ready_session(&[Angle::BackView, Angle::FrontView, Angle::CloseUp]);
        let batch = session.begin_generation().unwrap();

        assert!(session.is_busy());
        assert!(!session.can_submit());
        assert_eq!(session.results().len(), 3);
        assert!(session.results().values().all(AngleResult::is_pending));
        assert_eq!(batch.jobs.len(), 3);
        assert_eq!(batch.api_key, "sk-test-key-123456");
        assert_eq!(
            batch.jobs[0].prompt,
            Angle::FrontView.prompt(&PromptModifiers::default())
        );
    }

    #[test]
    fn complete_merges_mixed_outcomes_and_clears_busy() {
        let mut session = ready_session(&[Angle::SideView, Angle::LowAngle]);
        let batch = session.begin_generation().unwrap();
        let merged = session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![
                (Angle::LowAngle, AngleResult::failed("")),
                done(Angle::SideView),
            ],
        });

        assert_eq!(merged, Some(2));
        assert!(!session.is_busy());
        assert!(session.can_submit());
        assert_eq!(session.results().len(), 2);
        assert!(matches!(
            session.results()[&Angle::SideView],
            AngleResult::Done(_)
        ));
        assert_eq!(
            session.results()[&Angle::LowAngle],
            AngleResult::Failed(GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn stale_outcome_is_discarded() {
        let mut session = ready_session(&[Angle::SideView]);
        let first = session.begin_generation().unwrap();
        let second = session.begin_generation().unwrap();
        assert_ne!(first.token, second.token);

        let merged = session.complete_generation(BatchOutcome {
            token: first.token,
            results: vec![done(Angle::SideView)],
        });
        assert_eq!(merged, None);
        assert!(session.is_busy());
        assert!(session.results()[&Angle::SideView].is_pending());

        let merged = session.complete_generation(BatchOutcome {
            token: second.token,
            results: vec![done(Angle::SideView)],
        });
        assert_eq!(merged, Some(1));
        assert!(!session.is_busy());
    }

    #[test]
    fn results_for_unsubmitted_angles_are_ignored() {
        let mut session = ready_session(&[Angle::SideView]);
        let batch = session.begin_generation().unwrap();
        let merged = session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![done(Angle::SideView), done(Angle::DutchAngle)],
        });
        assert_eq!(merged, Some(1));
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn upload_while_busy_drops_the_in_flight_results() {
        let mut session = ready_session(&[Angle::SideView, Angle::CloseUp]);
        let batch = session.begin_generation().unwrap();
        session.set_image(png());
        assert!(session.results().is_empty());
        assert!(session.is_busy());

        let merged = session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![done(Angle::SideView), done(Angle::CloseUp)],
        });
        assert_eq!(merged, Some(0));
        assert!(!session.is_busy());
        assert!(session.results().is_empty());
    }

    #[test]
    fn grid_follows_canonical_order() {
        let mut session = ready_session(&[]);
        for angle in [Angle::DutchAngle, Angle::SideView, Angle::FrontView, Angle::CloseUp] {
            session.toggle_angle(angle);
        }
        let batch = session.begin_generation().unwrap();
        session.complete_generation(BatchOutcome {
            token: batch.token,
            results: vec![
                done(Angle::CloseUp),
                done(Angle::DutchAngle),
                done(Angle::FrontView),
                done(Angle::SideView),
            ],
        });
        let order: Vec<Angle> = session.grid().into_iter().map(|(angle, _)| angle).collect();
        assert_eq!(
            order,
            vec![Angle::FrontView, Angle::SideView, Angle::CloseUp, Angle::DutchAngle]
        );
    }

    #[test]
    fn toggle_all_alternates_between_empty_and_full() {
        let mut session = Session::new();
        session.toggle_all_angles();
        assert!(session.all_angles_selected());

        session.toggle_all_angles();
        assert!(session.selection().angles.is_empty());

        session.toggle_all_angles();
        assert_eq!(session.selection().angles.len(), Angle::ALL.len());
    }

    #[test]
    fn toggle_all_from_partial_selects_everything() {
        let mut session = Session::new();
        session.toggle_angle(Angle::CloseUp);
        session.toggle_all_angles();
        assert!(session.all_angles_selected());
    }

    #[test]
    fn toggle_angle_flips_membership() {
        let mut session = Session::new();
        assert!(session.toggle_angle(Angle::HighAngle));
        assert!(!session.toggle_angle(Angle::HighAngle));
        assert!(session.selection().angles.is_empty());
    }

    #[test]
    fn api_key_is_masked_for_display() {
        let mut session = Session::new();
        assert_eq!(session.api_key_masked(), "(not set)");
        session.set_api_key("short");
        assert_eq!(session.api_key_masked(), "•••••");
        session.set_api_key("  AIzaSyExample1234  ");
        assert_eq!(session.api_key_masked(), format!("{}1234", "•".repeat(13)));
    }

    #[test]
    fn modifiers_update_and_reset() {
        let mut session = Session::new();
        session.set_style(ArtStyle::Anime);
        session.set_camera(CameraModel::SonyA7rV);
        session.set_lens(LensKind::Macro);
        session.set_focal_length("50");
        session.set_aperture("2.8");
        assert!(!session.selection().modifiers.is_default());

        session.reset_modifiers();
        assert!(session.selection().modifiers.is_default());
    }
}
