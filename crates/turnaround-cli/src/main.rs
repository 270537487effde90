use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use turnaround_contracts::catalog::{Angle, ArtStyle, CameraModel, LensKind};
use turnaround_contracts::prompt::{compose_prompt, PromptModifiers};
use turnaround_contracts::session::Session;
use turnaround_engine::providers::{DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};
use turnaround_engine::{ProviderSettings, Studio, StudioConfig, UploadOutcome, DEFAULT_PROVIDER};

use crate::chat::{ChatSession, Flow};

mod chat;
mod render;

#[derive(Debug, Parser)]
#[command(
    name = "turnaround",
    version,
    about = "Generate new camera angles of a character from one reference image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session driven by slash commands.
    Chat(ChatArgs),
    /// Upload, generate and print the result grid in one go.
    Run(RunArgs),
    /// List angles, styles, cameras and lenses.
    Catalog,
    /// Print the prompt that would be sent for one angle.
    Prompt(PromptArgs),
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,
    #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
    model: String,
    #[arg(long, default_value = DEFAULT_GEMINI_API_BASE)]
    api_base: String,
    /// Per-request timeout in seconds; requests wait indefinitely when unset.
    #[arg(long)]
    request_timeout: Option<f64>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ModifierArgs {
    #[arg(long, default_value = "Original", value_parser = parse_style)]
    style: ArtStyle,
    #[arg(long, default_value = "None", value_parser = parse_camera)]
    camera: CameraModel,
    #[arg(long, default_value = "None", value_parser = parse_lens)]
    lens: LensKind,
    #[arg(long, default_value = "")]
    focal_length: String,
    #[arg(long, default_value = "")]
    aperture: String,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    provider: ProviderArgs,
    /// Default directory for `/save`.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long = "angle", value_parser = parse_angle)]
    angles: Vec<Angle>,
    #[arg(long, conflicts_with = "angles")]
    all_angles: bool,
    #[command(flatten)]
    modifiers: ModifierArgs,
    #[arg(long)]
    api_key: String,
    #[command(flatten)]
    provider: ProviderArgs,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PromptArgs {
    /// Angle name; names outside the catalog use the generic template.
    #[arg(long)]
    angle: String,
    #[command(flatten)]
    modifiers: ModifierArgs,
}

fn parse_angle(raw: &str) -> Result<Angle, String> {
    Angle::from_label(raw).map_err(|err| err.to_string())
}

fn parse_style(raw: &str) -> Result<ArtStyle, String> {
    ArtStyle::from_label(raw).map_err(|err| err.to_string())
}

fn parse_camera(raw: &str) -> Result<CameraModel, String> {
    CameraModel::from_label(raw).map_err(|err| err.to_string())
}

fn parse_lens(raw: &str) -> Result<LensKind, String> {
    LensKind::from_label(raw).map_err(|err| err.to_string())
}

impl ProviderArgs {
    fn studio_config(&self) -> Result<StudioConfig> {
        let request_timeout = match self.request_timeout {
            Some(seconds) => match Duration::try_from_secs_f64(seconds) {
                Ok(timeout) if !timeout.is_zero() => Some(timeout),
                _ => bail!("--request-timeout must be a positive number, got {seconds}"),
            },
            None => None,
        };
        Ok(StudioConfig {
            provider: self.provider.trim().to_ascii_lowercase(),
            provider_settings: ProviderSettings {
                api_base: self.api_base.clone(),
                model: self.model.clone(),
                request_timeout,
            },
            events_path: self.events.clone(),
        })
    }
}

impl ModifierArgs {
    fn to_modifiers(&self) -> PromptModifiers {
        PromptModifiers {
            style: self.style,
            camera: self.camera,
            lens: self.lens,
            focal_length_mm: self.focal_length.clone(),
            aperture_f: self.aperture.clone(),
        }
    }

    fn apply(&self, session: &mut Session) {
        session.set_style(self.style);
        session.set_camera(self.camera);
        session.set_lens(self.lens);
        session.set_focal_length(self.focal_length.clone());
        session.set_aperture(self.aperture.clone());
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("turnaround error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
        Command::Catalog => {
            println!("{}", render::catalog_listing());
            Ok(0)
        }
        Command::Prompt(args) => {
            println!("{}", compose_prompt(&args.angle, &args.modifiers.to_modifiers()));
            Ok(0)
        }
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut studio = Studio::new(args.provider.studio_config()?)?;
    let session = studio.session_mut();
    session.set_api_key(args.api_key.clone());
    if args.all_angles {
        session.toggle_all_angles();
    }
    for angle in &args.angles {
        session.select_angle(*angle);
    }
    args.modifiers.apply(session);

    match studio.upload_image(&args.image)? {
        UploadOutcome::Accepted => {}
        UploadOutcome::ReadFailed => bail!("failed reading {}", args.image.display()),
    }

    let summary = studio.generate()?;
    println!("{}", render::result_grid(studio.session()));
    if let Some(out) = args.out.as_deref() {
        print_saved(&render::save_results(studio.session(), out)?);
    }
    eprintln!("Events: {}", studio.events().path().display());
    Ok(if summary.failed > 0 { 2 } else { 0 })
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let studio = Studio::new(args.provider.studio_config()?)?;
    let mut chat = ChatSession::new(studio, args.out, io::stdout());
    println!(
        "Turnaround session started ({}). Type /help for commands.",
        chat.studio().provider_name()
    );
    println!("Events: {}", chat.studio().events().path().display());

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        chat.poll(false)?;
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            // Scripted sessions end on EOF; let an in-flight batch finish first.
            if chat.is_generating() {
                chat.poll(true)?;
            }
            break;
        }
        if chat.handle_line(&line)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn print_saved(paths: &[PathBuf]) {
    for path in paths {
        println!("Saved {}", path.display());
    }
}
