use std::any::Any;
use std::thread;
use std::time::Instant;

use serde_json::json;
use turnaround_contracts::events::{payload, EventWriter};
use turnaround_contracts::session::{AngleResult, BatchOutcome, GenerationBatch};

use crate::providers::{error_chain_text, GenerateCall, ImageProvider};

const FAILURE_MESSAGE_MAX_CHARS: usize = 600;

/// Runs every job of `batch` on its own scoped thread and waits for all of
/// them. Each angle settles independently; a failure or panic in one never
/// affects its siblings. Results come back in job order.
pub fn run_batch(
    batch: &GenerationBatch,
    provider: &dyn ImageProvider,
    events: &EventWriter,
) -> BatchOutcome {
    let started = Instant::now();
    let results = thread::scope(|scope| {
        let handles: Vec<_> = batch
            .jobs
            .iter()
            .map(|job| {
                let handle = scope.spawn(move || {
                    let call = GenerateCall {
                        api_key: &batch.api_key,
                        source_image: &batch.source_image,
                        prompt: &job.prompt,
                    };
                    match provider.generate(&call) {
                        Ok(image) => AngleResult::Done(image),
                        Err(err) => AngleResult::failed(error_chain_text(
                            &err,
                            FAILURE_MESSAGE_MAX_CHARS,
                        )),
                    }
                });
                (job.angle, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(angle, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|panic| AngleResult::failed(panic_message(&*panic)));
                (angle, result)
            })
            .collect::<Vec<_>>()
    });

    for (angle, result) in &results {
        let mut row = payload(json!({
            "token": batch.token.value(),
            "angle": angle,
            "status": result.status_label(),
        }));
        match result {
            AngleResult::Done(image) => {
                row.insert("mime_type".to_string(), json!(image.mime_type()));
                row.insert("bytes".to_string(), json!(image.byte_len()));
            }
            AngleResult::Failed(message) => {
                row.insert("error".to_string(), json!(message));
            }
            AngleResult::Pending => {}
        }
        events.emit_best_effort("angle_finished", row);
    }

    let outcome = BatchOutcome {
        token: batch.token,
        results,
    };
    events.emit_best_effort(
        "generation_settled",
        payload(json!({
            "token": batch.token.value(),
            "provider": provider.name(),
            "angles": outcome.results.len(),
            "failed": outcome.failed_count(),
            "elapsed_s": started.elapsed().as_secs_f64(),
        })),
    );
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        return format!("generation worker panicked: {text}");
    }
    if let Some(text) = panic.downcast_ref::<String>() {
        return format!("generation worker panicked: {text}");
    }
    "generation worker panicked".to_string()
}
