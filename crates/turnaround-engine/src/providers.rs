use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use turnaround_contracts::image::EncodedImage;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

const DRYRUN_DEFAULT_SIZE: u32 = 256;
const DRYRUN_MAX_SIZE: u32 = 1024;

/// One external generation call: the user's key, the uploaded image and the
/// composed prompt for a single angle.
#[derive(Debug, Clone, Copy)]
pub struct GenerateCall<'a> {
    pub api_key: &'a str,
    pub source_image: &'a EncodedImage,
    pub prompt: &'a str,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, call: &GenerateCall<'_>) -> Result<EncodedImage>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    /// Shared handle, so a batch can outlive the borrow of the registry.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base: String,
    pub model: String,
    /// `None` waits indefinitely for a response.
    pub request_timeout: Option<Duration>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

pub fn default_provider_registry(settings: &ProviderSettings) -> Result<ImageProviderRegistry> {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(GeminiProvider::new(settings)?);
    Ok(providers)
}

/// Offline provider: answers every call with a flat PNG whose colour is
/// derived from the prompt, sized like the source image.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, call: &GenerateCall<'_>) -> Result<EncodedImage> {
        if call.api_key.trim().is_empty() {
            bail!("dryrun provider requires an API key");
        }
        let (width, height) = call
            .source_image
            .decode()
            .ok()
            .and_then(|bytes| image::load_from_memory(&bytes).ok())
            .map(|source| source.dimensions())
            .map(|(w, h)| (w.clamp(1, DRYRUN_MAX_SIZE), h.clamp(1, DRYRUN_MAX_SIZE)))
            .unwrap_or((DRYRUN_DEFAULT_SIZE, DRYRUN_DEFAULT_SIZE));
        let (r, g, b) = color_from_prompt(call.prompt);
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("dryrun PNG encode failed")?;
        EncodedImage::from_bytes("image/png", &png).context("dryrun produced an invalid image")
    }
}

pub struct GeminiProvider {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: settings.api_base.trim().trim_end_matches('/').to_string(),
            model: settings.model.trim().to_string(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(call: &GenerateCall<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": call.source_image.mime_type(),
                            "data": call.source_image.base64_data(),
                        }
                    },
                    { "text": call.prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    /// First inline image of the response, or an error describing why there
    /// is none (prompt block, safety finish reason, text-only answer).
    fn extract_image(response_payload: &Value) -> Result<EncodedImage> {
        if let Some(reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the request: {reason}");
        }

        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut finish_reasons = Vec::new();
        let mut texts = Vec::new();

        for candidate in &candidates {
            if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
                finish_reasons.push(reason.to_string());
            }
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    texts.push(text.trim().to_string());
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                return EncodedImage::from_base64(mime_type, data)
                    .context("Gemini returned an unreadable image");
            }
        }

        if let Some(reason) = finish_reasons
            .iter()
            .find(|reason| reason.as_str() != "STOP")
        {
            bail!("Gemini returned no images (finish reason {reason})");
        }
        let text = texts.join(" ");
        if !text.trim().is_empty() {
            bail!("Gemini returned no images: {}", truncate_text(text.trim(), 240));
        }
        bail!("Gemini returned no images")
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, call: &GenerateCall<'_>) -> Result<EncodedImage> {
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", call.api_key)
            .json(&Self::build_payload(call))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::extract_image(&response_payload)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            api_error_message(&body).unwrap_or_else(|| truncate_text(&body, 512))
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// `error.message` of a Google-style error body.
fn api_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(err.to_string().trim(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
    use serde_json::json;

    use super::*;

    fn png_of(width: u32, height: u32) -> EncodedImage {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        EncodedImage::from_bytes("image/png", &bytes).unwrap()
    }

    #[test]
    fn registry_lists_builtin_providers() -> anyhow::Result<()> {
        let registry = default_provider_registry(&ProviderSettings::default())?;
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
        Ok(())
    }

    #[test]
    fn dryrun_matches_source_dimensions_and_is_deterministic() -> anyhow::Result<()> {
        let source = png_of(40, 24);
        let call = GenerateCall {
            api_key: "key",
            source_image: &source,
            prompt: "side view",
        };
        let first = DryrunProvider.generate(&call)?;
        let second = DryrunProvider.generate(&call)?;
        assert_eq!(first, second);

        let decoded = image::load_from_memory(&first.decode()?)?;
        assert_eq!(decoded.dimensions(), (40, 24));

        let other = DryrunProvider.generate(&GenerateCall {
            prompt: "back view",
            ..call
        })?;
        assert_ne!(first, other);
        Ok(())
    }

    #[test]
    fn dryrun_falls_back_to_default_size_for_undecodable_source() -> anyhow::Result<()> {
        let source = EncodedImage::from_bytes("image/png", b"not really a png")?;
        let out = DryrunProvider.generate(&GenerateCall {
            api_key: "key",
            source_image: &source,
            prompt: "p",
        })?;
        let decoded = image::load_from_memory(&out.decode()?)?;
        assert_eq!(decoded.dimensions(), (DRYRUN_DEFAULT_SIZE, DRYRUN_DEFAULT_SIZE));
        Ok(())
    }

    #[test]
    fn dryrun_rejects_blank_key() {
        let source = png_of(2, 2);
        let err = DryrunProvider
            .generate(&GenerateCall {
                api_key: " ",
                source_image: &source,
                prompt: "p",
            })
            .unwrap_err();
        assert!(err.to_string().contains("requires an API key"));
    }

    #[test]
    fn gemini_endpoint_and_payload_shape() -> anyhow::Result<()> {
        let provider = GeminiProvider::new(&ProviderSettings {
            api_base: "https://example.test/v1beta/".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            request_timeout: None,
        })?;
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );

        let source = EncodedImage::from_bytes("image/jpeg", b"abc")?;
        let payload = GeminiProvider::build_payload(&GenerateCall {
            api_key: "secret",
            source_image: &source,
            prompt: "Generate a side view",
        });
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("YWJj"));
        assert_eq!(parts[1]["text"], json!("Generate a side view"));
        assert!(!payload.to_string().contains("secret"));
        Ok(())
    }

    #[test]
    fn gemini_extracts_first_inline_image() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here you go"},
                    {"inlineData": {"mimeType": "image/webp", "data": "YWJj"}},
                    {"inlineData": {"mimeType": "image/png", "data": "ZGVm"}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let image = GeminiProvider::extract_image(&payload)?;
        assert_eq!(image.mime_type(), "image/webp");
        assert_eq!(image.decode()?, b"abc".to_vec());
        Ok(())
    }

    #[test]
    fn gemini_reports_blocks_and_missing_images() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert_eq!(
            GeminiProvider::extract_image(&blocked).unwrap_err().to_string(),
            "Gemini blocked the request: SAFETY"
        );

        let safety = json!({"candidates": [{"finishReason": "IMAGE_SAFETY"}]});
        assert_eq!(
            GeminiProvider::extract_image(&safety).unwrap_err().to_string(),
            "Gemini returned no images (finish reason IMAGE_SAFETY)"
        );

        let text_only = json!({"candidates": [{
            "content": {"parts": [{"text": "I can't edit this image."}]},
            "finishReason": "STOP"
        }]});
        assert_eq!(
            GeminiProvider::extract_image(&text_only).unwrap_err().to_string(),
            "Gemini returned no images: I can't edit this image."
        );

        assert_eq!(
            GeminiProvider::extract_image(&json!({})).unwrap_err().to_string(),
            "Gemini returned no images"
        );
    }

    #[test]
    fn api_error_message_reads_google_error_body() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body).as_deref(), Some("API key not valid."));
        assert_eq!(api_error_message("<html>"), None);
    }

    #[test]
    fn error_chain_text_joins_distinct_causes() {
        let err = anyhow::anyhow!("connection refused").context("Gemini request failed (x)");
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed (x) | caused by: connection refused"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn error_chain_text_of_blank_error_is_empty() {
        let err = anyhow::Error::msg("  \n ");
        assert_eq!(error_chain_text(&err, 200), "");
    }
}
