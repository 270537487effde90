use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::Result;
use turnaround_contracts::catalog::Angle;
use turnaround_contracts::commands::{parse_command, SessionCommand, SESSION_HELP_COMMANDS};
use turnaround_contracts::session::BatchOutcome;
use turnaround_engine::{GenerationSummary, Studio, UploadOutcome};

use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive session state: the studio, the batch currently in flight and
/// where replies are written.
pub struct ChatSession<W> {
    studio: Studio,
    in_flight: Option<mpsc::Receiver<BatchOutcome>>,
    save_dir: Option<PathBuf>,
    out: W,
}

impl<W: Write> ChatSession<W> {
    pub fn new(studio: Studio, save_dir: Option<PathBuf>, out: W) -> Self {
        Self {
            studio,
            in_flight: None,
            save_dir,
            out,
        }
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }

    /// Merges a finished batch if there is one, then runs `line`.
    pub fn handle_line(&mut self, line: &str) -> Result<Flow> {
        self.poll(false)?;
        self.dispatch(parse_command(line))
    }

    pub fn dispatch(&mut self, command: SessionCommand) -> Result<Flow> {
        match command {
            SessionCommand::Noop => {}
            SessionCommand::Help => {
                writeln!(self.out, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?
            }
            SessionCommand::Quit => return Ok(Flow::Quit),
            SessionCommand::SetApiKey(key) => {
                self.studio.session_mut().set_api_key(key);
                writeln!(self.out, "API key set: {}", self.studio.session().api_key_masked())?;
            }
            SessionCommand::Upload(path) => self.upload(Path::new(&path))?,
            SessionCommand::ToggleAngles(angles) => {
                for angle in angles {
                    let selected = self.studio.session_mut().toggle_angle(angle);
                    let state = if selected { "selected" } else { "deselected" };
                    writeln!(self.out, "{angle}: {state}")?;
                }
            }
            SessionCommand::ToggleAllAngles => {
                self.studio.session_mut().toggle_all_angles();
                writeln!(
                    self.out,
                    "{} of {} angles selected",
                    self.studio.session().selection().angles.len(),
                    Angle::ALL.len()
                )?;
            }
            SessionCommand::SetStyle(style) => {
                self.studio.session_mut().set_style(style);
                writeln!(self.out, "Style set to {style}")?;
            }
            SessionCommand::SetCamera(camera) => {
                self.studio.session_mut().set_camera(camera);
                writeln!(self.out, "Camera set to {camera}")?;
            }
            SessionCommand::SetLens(lens) => {
                self.studio.session_mut().set_lens(lens);
                writeln!(self.out, "Lens set to {lens}")?;
            }
            SessionCommand::SetFocalLength(value) => {
                self.studio.session_mut().set_focal_length(value.clone());
                writeln!(self.out, "Focal length {}", describe_free_text(&value, "mm"))?;
            }
            SessionCommand::SetAperture(value) => {
                self.studio.session_mut().set_aperture(value.clone());
                writeln!(self.out, "Aperture {}", describe_free_text(&value, ""))?;
            }
            SessionCommand::ResetModifiers => {
                self.studio.session_mut().reset_modifiers();
                writeln!(self.out, "Style, camera, lens, focal length and aperture reset")?;
            }
            SessionCommand::Generate => self.generate()?,
            SessionCommand::Wait => {
                if self.in_flight.is_none() {
                    writeln!(self.out, "Nothing is generating.")?;
                } else {
                    self.poll(true)?;
                }
            }
            SessionCommand::Status => writeln!(
                self.out,
                "{}",
                render::control_panel(self.studio.session(), self.studio.provider_name())
            )?,
            SessionCommand::Grid => {
                writeln!(self.out, "{}", render::result_grid(self.studio.session()))?
            }
            SessionCommand::Save(dir) => self.save(dir)?,
            SessionCommand::Catalog => writeln!(self.out, "{}", render::catalog_listing())?,
            SessionCommand::Invalid { command, message } => {
                writeln!(self.out, "/{command}: {message}")?
            }
            SessionCommand::Unknown(raw) => {
                writeln!(self.out, "Unknown input '{raw}'. Type /help for commands.")?
            }
        }
        Ok(Flow::Continue)
    }

    /// Merges a settled batch into the session. With `block`, waits for it.
    pub fn poll(&mut self, block: bool) -> Result<()> {
        let Some(rx) = self.in_flight.as_ref() else {
            return Ok(());
        };
        let received = if block {
            rx.recv().ok()
        } else {
            match rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(mpsc::TryRecvError::Empty) => return Ok(()),
                Err(mpsc::TryRecvError::Disconnected) => None,
            }
        };
        self.in_flight = None;
        let Some(outcome) = received else {
            writeln!(self.out, "Generation worker stopped without reporting results.")?;
            return Ok(());
        };
        let summary = self.studio.complete_generation(outcome);
        if let Some(line) = summary_line(&summary) {
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out, "{}", render::result_grid(self.studio.session()))?;
        Ok(())
    }

    fn generate(&mut self) -> Result<()> {
        if self.studio.session().is_busy() {
            writeln!(self.out, "A generation is already running; /wait for it to finish.")?;
            return Ok(());
        }
        match self.studio.spawn_generation() {
            Ok(rx) => {
                self.in_flight = Some(rx);
                writeln!(self.out, "{}", render::result_grid(self.studio.session()))?;
            }
            Err(err) => writeln!(self.out, "{err}")?,
        }
        Ok(())
    }

    fn upload(&mut self, path: &Path) -> Result<()> {
        match self.studio.upload_image(path) {
            Ok(UploadOutcome::Accepted) => {
                let description = self
                    .studio
                    .session()
                    .image()
                    .map(|image| format!("{}, {} bytes", image.mime_type(), image.byte_len()))
                    .unwrap_or_default();
                writeln!(
                    self.out,
                    "Uploaded {} ({description}). Previous results cleared.",
                    path.display()
                )?;
            }
            Ok(UploadOutcome::ReadFailed) => writeln!(
                self.out,
                "Could not read {}; the previous image is kept.",
                path.display()
            )?,
            Err(err) => writeln!(self.out, "Upload refused: {err}")?,
        }
        Ok(())
    }

    fn save(&mut self, dir: Option<String>) -> Result<()> {
        let Some(dir) = dir.map(PathBuf::from).or_else(|| self.save_dir.clone()) else {
            writeln!(self.out, "/save requires a directory (or start the session with --out)")?;
            return Ok(());
        };
        match render::save_results(self.studio.session(), &dir) {
            Ok(written) if written.is_empty() => writeln!(self.out, "No finished images to save.")?,
            Ok(written) => {
                for path in written {
                    writeln!(self.out, "Saved {}", path.display())?;
                }
            }
            Err(err) => writeln!(self.out, "Save failed: {err:#}")?,
        }
        Ok(())
    }
}

fn summary_line(summary: &GenerationSummary) -> Option<String> {
    if !summary.merged {
        return None;
    }
    if summary.dropped > 0 {
        return Some(format!(
            "Generation finished after the image changed; {} of {} results discarded.",
            summary.dropped, summary.total
        ));
    }
    Some(format!(
        "Generation finished: {} succeeded, {} failed.",
        summary.total - summary.failed,
        summary.failed
    ))
}

fn describe_free_text(value: &str, unit: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "cleared".to_string();
    }
    format!("set to {trimmed}{unit}")
}
