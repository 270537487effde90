use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}'. Expected one of: {expected}")]
pub struct LabelError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

fn slug(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .filter_map(|ch| match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            ' ' | '-' | '_' => Some('-'),
            _ => None,
        })
        .collect()
}

/// Declares a closed, ordered option list. Declaration order is the canonical
/// order used everywhere (pickers, `Ord`, result grid).
macro_rules! catalog_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal, default = $default:ident {
            $($variant:ident => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Slug form of the label, e.g. `"birds-eye-view"`.
            pub fn slug(self) -> String {
                slug(self.label())
            }

            pub fn from_label(raw: &str) -> Result<Self, LabelError> {
                let wanted = slug(raw);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|item| !wanted.is_empty() && item.slug() == wanted)
                    .ok_or_else(|| LabelError {
                        kind: $kind,
                        value: raw.trim().to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|item| item.label())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }

            pub fn is_default(self) -> bool {
                self == $name::$default
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }
    };
}

catalog_enum! {
    /// Camera-perspective preset. Drives both the prompt text and the order of
    /// the result grid.
    Angle, "angle", default = FrontView {
        FrontView => "Front view",
        ThreeQuarterView => "Three-quarter view",
        SideView => "Side view",
        BackView => "Back view",
        CloseUp => "Close-up",
        FullBody => "Full body",
        LowAngle => "Low angle",
        HighAngle => "High angle",
        BirdsEyeView => "Bird's-eye view",
        WormsEyeView => "Worm's-eye view",
        OverTheShoulder => "Over-the-shoulder",
        DutchAngle => "Dutch angle",
    }
}

catalog_enum! {
    ArtStyle, "style", default = Original {
        Original => "Original",
        Photorealistic => "Photorealistic",
        Anime => "Anime",
        Cartoon => "Cartoon",
        ComicBook => "Comic book",
        Watercolor => "Watercolor",
        OilPainting => "Oil painting",
        PencilSketch => "Pencil sketch",
        PixelArt => "Pixel art",
        Render3d => "3D render",
        Cyberpunk => "Cyberpunk",
        FantasyArt => "Fantasy art",
    }
}

catalog_enum! {
    CameraModel, "camera", default = None {
        None => "None",
        CanonEosR5 => "Canon EOS R5",
        NikonZ9 => "Nikon Z9",
        SonyA7rV => "Sony A7R V",
        FujifilmXT5 => "Fujifilm X-T5",
        LeicaM11 => "Leica M11",
        HasselbladX2d => "Hasselblad X2D",
        ArriAlexa35 => "ARRI Alexa 35",
        RedKomodo => "RED Komodo",
        Iphone15Pro => "iPhone 15 Pro",
    }
}

catalog_enum! {
    LensKind, "lens", default = None {
        None => "None",
        WideAngle => "Wide-angle",
        UltraWide => "Ultra-wide",
        Standard => "Standard",
        Telephoto => "Telephoto",
        Macro => "Macro",
        Fisheye => "Fisheye",
        TiltShift => "Tilt-shift",
        Anamorphic => "Anamorphic",
    }
}

const IDENTITY_SUFFIX: &str =
    "Keep the character's identity, face, hairstyle, outfit and colors consistent with the reference image.";

impl Angle {
    /// Canonical base sentence for this angle, before any modifier clauses.
    pub fn base_sentence(self) -> String {
        let lead = match self {
            Angle::FrontView => {
                "Generate a front view of the character, facing the camera directly."
            }
            Angle::ThreeQuarterView => {
                "Generate a three-quarter view of the character, turned about 45 degrees from the camera."
            }
            Angle::SideView => "Generate a side view of the character in full profile.",
            Angle::BackView => "Generate a back view of the character, seen from directly behind.",
            Angle::CloseUp => {
                "Generate a close-up shot of the character's face and shoulders."
            }
            Angle::FullBody => {
                "Generate a full body shot of the character, head to toe in frame."
            }
            Angle::LowAngle => {
                "Generate a low angle shot of the character, with the camera looking up at them."
            }
            Angle::HighAngle => {
                "Generate a high angle shot of the character, with the camera looking down at them."
            }
            Angle::BirdsEyeView => {
                "Generate a bird's-eye view of the character, seen from directly above."
            }
            Angle::WormsEyeView => {
                "Generate a worm's-eye view of the character, seen from ground level looking straight up."
            }
            Angle::OverTheShoulder => {
                "Generate an over-the-shoulder shot framed from behind the character's shoulder."
            }
            Angle::DutchAngle => {
                "Generate a Dutch angle shot of the character with the camera tilted on its roll axis."
            }
        };
        format!("{lead} {IDENTITY_SUFFIX}")
    }
}

/// Base sentence for angle names outside the enumeration.
pub fn generic_base_sentence(angle_name: &str) -> String {
    format!(
        "Generate a {} of the character. {IDENTITY_SUFFIX}",
        angle_name.trim()
    )
}
