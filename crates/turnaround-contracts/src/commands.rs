use crate::catalog::{Angle, ArtStyle, CameraModel, LabelError, LensKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Help,
    Quit,
    Key,
    Upload,
    Angle,
    AllAngles,
    Style,
    Camera,
    Lens,
    Focal,
    Aperture,
    Reset,
    Generate,
    Wait,
    Status,
    Grid,
    Save,
    Catalog,
}

#[derive(Clone, Copy, Debug)]
struct CommandSpec {
    command: &'static str,
    action: Action,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec { command: "help", action: Action::Help },
    CommandSpec { command: "quit", action: Action::Quit },
    CommandSpec { command: "exit", action: Action::Quit },
    CommandSpec { command: "key", action: Action::Key },
    CommandSpec { command: "upload", action: Action::Upload },
    CommandSpec { command: "angle", action: Action::Angle },
    CommandSpec { command: "all", action: Action::AllAngles },
    CommandSpec { command: "style", action: Action::Style },
    CommandSpec { command: "camera", action: Action::Camera },
    CommandSpec { command: "lens", action: Action::Lens },
    CommandSpec { command: "focal", action: Action::Focal },
    CommandSpec { command: "aperture", action: Action::Aperture },
    CommandSpec { command: "reset", action: Action::Reset },
    CommandSpec { command: "generate", action: Action::Generate },
    CommandSpec { command: "wait", action: Action::Wait },
    CommandSpec { command: "status", action: Action::Status },
    CommandSpec { command: "grid", action: Action::Grid },
    CommandSpec { command: "save", action: Action::Save },
    CommandSpec { command: "catalog", action: Action::Catalog },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/key <api-key>",
    "/upload <path>",
    "/angle <name>...",
    "/all",
    "/style <name>",
    "/camera <name>",
    "/lens <name>",
    "/focal [mm]",
    "/aperture [f]",
    "/reset",
    "/generate",
    "/wait",
    "/status",
    "/grid",
    "/save [dir]",
    "/catalog",
    "/quit",
];

/// One line of interactive input, resolved against the option catalogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Noop,
    Help,
    Quit,
    SetApiKey(String),
    Upload(String),
    ToggleAngles(Vec<Angle>),
    ToggleAllAngles,
    SetStyle(ArtStyle),
    SetCamera(CameraModel),
    SetLens(LensKind),
    SetFocalLength(String),
    SetAperture(String),
    ResetModifiers,
    Generate,
    Wait,
    Status,
    Grid,
    Save(Option<String>),
    Catalog,
    Invalid { command: String, message: String },
    Unknown(String),
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn single_arg(arg: &str) -> String {
    split_args(arg).join(" ")
}

/// Accepts either several slug/quoted names (`side-view "Close-up"`) or one
/// unquoted multi-word label (`Side view`).
fn parse_angles(arg: &str) -> Result<Vec<Angle>, LabelError> {
    let parts = split_args(arg);
    if parts.is_empty() {
        return Angle::from_label("").map(|angle| vec![angle]);
    }
    let individually: Result<Vec<Angle>, LabelError> =
        parts.iter().map(|part| Angle::from_label(part)).collect();
    match individually {
        Ok(angles) => Ok(angles),
        Err(err) => Angle::from_label(&parts.join(" "))
            .map(|angle| vec![angle])
            .map_err(|_| err),
    }
}

fn invalid(command: &str, err: LabelError) -> SessionCommand {
    SessionCommand::Invalid {
        command: command.to_string(),
        message: err.to_string(),
    }
}

pub fn parse_command(text: &str) -> SessionCommand {
    let raw = text.trim();
    if raw.is_empty() {
        return SessionCommand::Noop;
    }
    let Some(slash_tail) = raw.strip_prefix('/') else {
        return SessionCommand::Unknown(raw.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    let Some(spec) = COMMANDS.iter().find(|spec| spec.command == command) else {
        return SessionCommand::Unknown(raw.to_string());
    };

    match spec.action {
        Action::Help => SessionCommand::Help,
        Action::Quit => SessionCommand::Quit,
        // Keys are taken verbatim; shell-style unquoting could mangle them.
        Action::Key => SessionCommand::SetApiKey(arg.to_string()),
        Action::Upload => {
            let path = single_arg(arg);
            if path.is_empty() {
                return SessionCommand::Invalid {
                    command,
                    message: "/upload requires a path".to_string(),
                };
            }
            SessionCommand::Upload(path)
        }
        Action::Angle => match parse_angles(arg) {
            Ok(angles) => SessionCommand::ToggleAngles(angles),
            Err(err) => invalid(&command, err),
        },
        Action::AllAngles => SessionCommand::ToggleAllAngles,
        Action::Style => ArtStyle::from_label(&single_arg(arg))
            .map(SessionCommand::SetStyle)
            .unwrap_or_else(|err| invalid(&command, err)),
        Action::Camera => CameraModel::from_label(&single_arg(arg))
            .map(SessionCommand::SetCamera)
            .unwrap_or_else(|err| invalid(&command, err)),
        Action::Lens => LensKind::from_label(&single_arg(arg))
            .map(SessionCommand::SetLens)
            .unwrap_or_else(|err| invalid(&command, err)),
        Action::Focal => SessionCommand::SetFocalLength(arg.to_string()),
        Action::Aperture => SessionCommand::SetAperture(arg.to_string()),
        Action::Reset => SessionCommand::ResetModifiers,
        Action::Generate => SessionCommand::Generate,
        Action::Wait => SessionCommand::Wait,
        Action::Status => SessionCommand::Status,
        Action::Grid => SessionCommand::Grid,
        Action::Save => {
            let dir = single_arg(arg);
            SessionCommand::Save(if dir.is_empty() { None } else { Some(dir) })
        }
        Action::Catalog => SessionCommand::Catalog,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_command("   \n"), SessionCommand::Noop);
    }

    #[test]
    fn plain_text_is_unknown() {
        assert_eq!(
            parse_command("make it blue"),
            SessionCommand::Unknown("make it blue".to_string())
        );
        assert_eq!(
            parse_command("/teleport now"),
            SessionCommand::Unknown("/teleport now".to_string())
        );
    }

    #[test]
    fn key_is_kept_verbatim() {
        assert_eq!(
            parse_command("/key  sk-'abc\"def  "),
            SessionCommand::SetApiKey("sk-'abc\"def".to_string())
        );
    }

    #[test]
    fn upload_accepts_quoted_paths() {
        assert_eq!(
            parse_command("/upload \"/tmp/my hero.png\""),
            SessionCommand::Upload("/tmp/my hero.png".to_string())
        );
        assert!(matches!(
            parse_command("/upload"),
            SessionCommand::Invalid { .. }
        ));
    }

    #[test]
    fn angle_accepts_slugs_quotes_and_bare_labels() {
        assert_eq!(
            parse_command("/angle side-view close-up"),
            SessionCommand::ToggleAngles(vec![Angle::SideView, Angle::CloseUp])
        );
        assert_eq!(
            parse_command("/angle \"Bird's-eye view\" back_view"),
            SessionCommand::ToggleAngles(vec![Angle::BirdsEyeView, Angle::BackView])
        );
        assert_eq!(
            parse_command("/angle Three-quarter view"),
            SessionCommand::ToggleAngles(vec![Angle::ThreeQuarterView])
        );
    }

    #[test]
    fn unknown_labels_are_invalid() {
        let SessionCommand::Invalid { command, message } = parse_command("/style vaporwave") else {
            panic!("expected invalid command");
        };
        assert_eq!(command, "style");
        assert!(message.contains("Unknown style 'vaporwave'"));
        assert!(matches!(parse_command("/angle"), SessionCommand::Invalid { .. }));
    }

    #[test]
    fn picker_commands_resolve_labels() {
        assert_eq!(parse_command("/style Oil painting"), SessionCommand::SetStyle(ArtStyle::OilPainting));
        assert_eq!(parse_command("/camera \"Leica M11\""), SessionCommand::SetCamera(CameraModel::LeicaM11));
        assert_eq!(parse_command("/lens none"), SessionCommand::SetLens(LensKind::None));
    }

    #[test]
    fn focal_and_aperture_allow_clearing() {
        assert_eq!(parse_command("/focal 85"), SessionCommand::SetFocalLength("85".to_string()));
        assert_eq!(parse_command("/focal"), SessionCommand::SetFocalLength(String::new()));
        assert_eq!(parse_command("/aperture 1.4"), SessionCommand::SetAperture("1.4".to_string()));
    }

    #[test]
    fn no_arg_commands() {
        assert_eq!(parse_command("/ALL"), SessionCommand::ToggleAllAngles);
        assert_eq!(parse_command("/generate"), SessionCommand::Generate);
        assert_eq!(parse_command("/wait"), SessionCommand::Wait);
        assert_eq!(parse_command("/exit"), SessionCommand::Quit);
        assert_eq!(parse_command("/save"), SessionCommand::Save(None));
        assert_eq!(
            parse_command("/save out/dir"),
            SessionCommand::Save(Some("out/dir".to_string()))
        );
    }
}
