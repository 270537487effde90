use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use turnaround_contracts::image::{is_image_media_type, EncodedImage};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{} is not an image file (detected type {mime_type})", path.display())]
    NotAnImage { path: PathBuf, mime_type: String },
    #[error("failed reading {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is empty", path.display())]
    Empty { path: PathBuf },
}

/// Declared media type of a file, taken from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Reads `path` and encodes it. The media type check happens before any I/O,
/// so non-image files are never read.
pub fn encode_image_file(path: &Path) -> Result<EncodedImage, EncodeError> {
    let mime_type = mime_for_path(path);
    if !is_image_media_type(mime_type) {
        return Err(EncodeError::NotAnImage {
            path: path.to_path_buf(),
            mime_type: mime_type.to_string(),
        });
    }
    let bytes = fs::read(path).map_err(|source| EncodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(EncodeError::Empty {
            path: path.to_path_buf(),
        });
    }
    encode_image_bytes(path, mime_type, &bytes)
}

pub fn encode_image_bytes(
    path: &Path,
    declared_mime: &str,
    bytes: &[u8],
) -> Result<EncodedImage, EncodeError> {
    EncodedImage::from_bytes(declared_mime, bytes).map_err(|_| EncodeError::NotAnImage {
        path: path.to_path_buf(),
        mime_type: declared_mime.to_string(),
    })
}
