use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("not a data URI")]
    NotDataUri,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("media type '{0}' is not an image type")]
    NotAnImage(String),
    #[error("image payload is not valid base64: {0}")]
    InvalidPayload(String),
}

/// Self-contained textual image: a media type plus the base64 payload.
///
/// The same value is used for previews (`to_data_uri`) and as the provider
/// request payload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    data: String,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl EncodedImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Result<Self, ImageError> {
        let mime_type = normalize_media_type(mime_type);
        if !is_image_media_type(&mime_type) {
            return Err(ImageError::NotAnImage(mime_type));
        }
        Ok(Self {
            mime_type,
            data: BASE64.encode(bytes),
        })
    }

    /// Accepts an already base64-encoded payload, e.g. an inline image part of
    /// a provider response.
    pub fn from_base64(mime_type: &str, data: &str) -> Result<Self, ImageError> {
        let mime_type = normalize_media_type(mime_type);
        if !is_image_media_type(&mime_type) {
            return Err(ImageError::NotAnImage(mime_type));
        }
        let data: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
        BASE64
            .decode(data.as_bytes())
            .map_err(|err| ImageError::InvalidPayload(err.to_string()))?;
        Ok(Self { mime_type, data })
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, ImageError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or(ImageError::NotDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageError::NotDataUri)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(ImageError::NotBase64)?;
        Self::from_base64(mime_type, payload)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, ImageError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| ImageError::InvalidPayload(err.to_string()))
    }

    /// Decoded size in bytes, computed from the base64 length.
    pub fn byte_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4) * 3 - padding.min(2)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "png",
        }
    }
}

fn normalize_media_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_image_media_type(mime_type: &str) -> bool {
    normalize_media_type(mime_type)
        .strip_prefix("image/")
        .map(|subtype| !subtype.is_empty())
        .unwrap_or(false)
}
