use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Result};
use serde_json::json;
use turnaround_contracts::events::{payload, EventWriter};
use turnaround_contracts::session::{
    BatchOutcome, GenerationBatch, GenerationToken, Session, SubmitError,
};

pub mod encoder;
pub mod orchestrator;
pub mod providers;

pub use encoder::{encode_image_file, mime_for_path, EncodeError};
pub use orchestrator::run_batch;
pub use providers::{
    default_provider_registry, DryrunProvider, GeminiProvider, GenerateCall, ImageProvider,
    ImageProviderRegistry, ProviderSettings,
};

pub const DEFAULT_PROVIDER: &str = "gemini";

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub provider: String,
    pub provider_settings: ProviderSettings,
    /// Defaults to `turnaround-<session id>.jsonl` in the system temp dir.
    pub events_path: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            provider_settings: ProviderSettings::default(),
            events_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    /// The file could not be read; the event log has the details and the
    /// session is unchanged.
    ReadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSummary {
    pub token: GenerationToken,
    pub total: usize,
    pub failed: usize,
    /// `false` when the batch was superseded and its outcome ignored.
    pub merged: bool,
    /// Results with no slot left to fill, because the image was replaced
    /// while the batch ran.
    pub dropped: usize,
}

/// Owns one interactive session: the state container, the provider used for
/// generation and the event log.
pub struct Studio {
    session_id: String,
    session: Session,
    provider: Arc<dyn ImageProvider>,
    events: EventWriter,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Result<Self> {
        let registry = default_provider_registry(&config.provider_settings)?;
        let provider = registry.get(&config.provider).ok_or_else(|| {
            anyhow!(
                "unknown provider '{}' (available: {})",
                config.provider,
                registry.names().join(", ")
            )
        })?;
        let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
        let events_path = config
            .events_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("turnaround-{session_id}.jsonl")));
        let events = EventWriter::new(events_path, session_id.clone());
        let studio = Self::with_provider(session_id, provider, events);
        studio.events.emit(
            "session_started",
            payload(json!({
                "provider": studio.provider.name(),
                "model": config.provider_settings.model,
            })),
        )?;
        Ok(studio)
    }

    pub fn with_provider(
        session_id: impl Into<String>,
        provider: Arc<dyn ImageProvider>,
        events: EventWriter,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            session: Session::new(),
            provider,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Selection updates (key, angles, modifiers) go straight to the session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Encodes `path` and makes it the uploaded image, discarding all previous
    /// results. Non-image files are refused with an error for the user; read
    /// failures are only logged.
    pub fn upload_image(&mut self, path: &Path) -> Result<UploadOutcome, EncodeError> {
        match encode_image_file(path) {
            Ok(image) => {
                self.events.emit_best_effort(
                    "image_uploaded",
                    payload(json!({
                        "path": path.display().to_string(),
                        "mime_type": image.mime_type(),
                        "bytes": image.byte_len(),
                        "cleared_results": self.session.results().len(),
                    })),
                );
                self.session.set_image(image);
                Ok(UploadOutcome::Accepted)
            }
            Err(err @ EncodeError::Read { .. }) => {
                self.events.emit_best_effort(
                    "image_read_failed",
                    payload(json!({
                        "path": path.display().to_string(),
                        "error": format!("{:#}", anyhow::Error::new(err)),
                    })),
                );
                Ok(UploadOutcome::ReadFailed)
            }
            Err(err) => {
                self.events.emit_best_effort(
                    "image_rejected",
                    payload(json!({
                        "path": path.display().to_string(),
                        "error": err.to_string(),
                    })),
                );
                Err(err)
            }
        }
    }

    pub fn begin_generation(&mut self) -> Result<GenerationBatch, SubmitError> {
        match self.session.begin_generation() {
            Ok(batch) => {
                self.events.emit_best_effort(
                    "generation_started",
                    payload(json!({
                        "token": batch.token.value(),
                        "provider": self.provider.name(),
                        "angles": batch.jobs.iter().map(|job| job.angle).collect::<Vec<_>>(),
                        "modifiers": self.session.selection().modifiers,
                    })),
                );
                Ok(batch)
            }
            Err(err) => {
                self.events.emit_best_effort(
                    "generation_refused",
                    payload(json!({ "reason": err.to_string() })),
                );
                Err(err)
            }
        }
    }

    pub fn complete_generation(&mut self, outcome: BatchOutcome) -> GenerationSummary {
        let token = outcome.token;
        let total = outcome.results.len();
        let failed = outcome.failed_count();
        let applied = self.session.complete_generation(outcome);
        let (event_type, dropped) = match applied {
            Some(applied) => ("generation_finished", total - applied),
            None => ("generation_discarded", total),
        };
        self.events.emit_best_effort(
            event_type,
            payload(json!({
                "token": token.value(),
                "angles": total,
                "failed": failed,
                "dropped": dropped,
            })),
        );
        GenerationSummary {
            token,
            total,
            failed,
            merged: applied.is_some(),
            dropped,
        }
    }

    /// Submits the current selection and blocks until every angle settles.
    pub fn generate(&mut self) -> Result<GenerationSummary, SubmitError> {
        let batch = self.begin_generation()?;
        let outcome = run_batch(&batch, self.provider.as_ref(), &self.events);
        Ok(self.complete_generation(outcome))
    }

    /// Submits the current selection and runs the batch on a worker thread.
    /// The session stays `Pending`/busy until the outcome received on the
    /// returned channel is passed to [`complete_generation`](Self::complete_generation).
    pub fn spawn_generation(&mut self) -> Result<mpsc::Receiver<BatchOutcome>, SubmitError> {
        let batch = self.begin_generation()?;
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let outcome = run_batch(&batch, provider.as_ref(), &events);
            let _ = tx.send(outcome);
        });
        Ok(rx)
    }
}
