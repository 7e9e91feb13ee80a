// Vision solver client for the Tencent Hunyuan chat-completions API.
//
// The clipboard image is normalized to RGB, re-encoded as JPEG, embedded as
// a base64 data URL, and sent with a fixed answering prompt. Every failure
// mode is folded into `SolveError`, whose `Display` text is broadcast
// verbatim to viewers; nothing escapes this boundary as a panic or an
// unhandled error.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clipboard::CapturedImage;
use crate::config::Credentials;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const HUNYUAN_API_URL: &str = "https://api.hunyuan.cloud.tencent.com/v1/chat/completions";

/// Answering prompt sent with every image. Asks for a compact, phone-screen
/// sized answer so the viewer page stays readable.
const ANSWER_PROMPT: &str = "You are a senior interviewer. Answer the question \
shown in the image. For multiple choice, state the answer option and the key \
concept only. For short-answer questions, give the answer first, then a brief \
explanation. For coding questions, give a one-line approach, concise code, and \
the key points. Keep the whole answer short enough to fit on one phone screen, \
in Markdown.";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Solver failure. The `Display` output is shown directly to viewers.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(
        "API credentials are not configured; set TENCENT_SECRET_ID and TENCENT_SECRET_KEY"
    )]
    MissingCredentials,

    #[error("failed to encode clipboard image: {0}")]
    Encode(String),

    #[error("AI provider error: {0}")]
    Api(String),

    #[error("network error calling AI provider: {0}")]
    Network(String),

    #[error("unexpected response from AI provider: {0}")]
    MalformedResponse(String),
}

// ---------------------------------------------------------------------------
// Solver trait
// ---------------------------------------------------------------------------

/// The opaque "solve this image" capability the cycle controller depends on.
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, image: &CapturedImage) -> Result<String, SolveError>;
}

// ---------------------------------------------------------------------------
// HunyuanSolver
// ---------------------------------------------------------------------------

/// Concrete solver backed by the Hunyuan vision model.
pub struct HunyuanSolver {
    http: reqwest::Client,
    credentials: Credentials,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl HunyuanSolver {
    pub fn new(credentials: Credentials, model: String, max_tokens: u32) -> Self {
        Self::with_endpoint(credentials, model, max_tokens, HUNYUAN_API_URL.to_string())
    }

    /// Build a solver pointed at a non-default endpoint (tests, gateways).
    pub fn with_endpoint(
        credentials: Credentials,
        model: String,
        max_tokens: u32,
        endpoint: String,
    ) -> Self {
        HunyuanSolver {
            http: reqwest::Client::new(),
            credentials,
            model,
            max_tokens,
            endpoint,
        }
    }
}

#[async_trait]
impl Solver for HunyuanSolver {
    async fn solve(&self, image: &CapturedImage) -> Result<String, SolveError> {
        // Credential check happens before any encoding or network I/O.
        if !self.credentials.configured() {
            return Err(SolveError::MissingCredentials);
        }
        let key = self
            .credentials
            .secret_key
            .as_deref()
            .ok_or(SolveError::MissingCredentials)?;

        info!(
            width = image.width,
            height = image.height,
            model = %self.model,
            "sending clipboard image to solver"
        );

        let jpeg = encode_jpeg(image)?;
        debug!(bytes = jpeg.len(), "clipboard image encoded as JPEG");

        let body = build_request_body(&self.model, self.max_tokens, &jpeg);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SolveError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SolveError::Network(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .as_ref()
                .and_then(extract_api_error)
                .unwrap_or_else(|| text.chars().take(200).collect());
            warn!(%status, "solver API call failed: {detail}");
            return Err(SolveError::Api(format!("status {status}: {detail}")));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| SolveError::MalformedResponse(e.to_string()))?;

        let answer = extract_answer(&parsed).ok_or_else(|| {
            SolveError::MalformedResponse("response contained no answer text".to_string())
        })?;

        info!(chars = answer.len(), "solver answer received");
        Ok(answer)
    }
}

// ---------------------------------------------------------------------------
// Image encoding
// ---------------------------------------------------------------------------

/// Re-encode raw RGBA pixels as JPEG, dropping alpha: the JPEG encoder only
/// accepts RGB-equivalent color.
pub fn encode_jpeg(image: &CapturedImage) -> Result<Vec<u8>, SolveError> {
    let rgba = image::RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
        .ok_or_else(|| {
            SolveError::Encode(format!(
                "buffer of {} bytes does not match {}x{} RGBA",
                image.rgba.len(),
                image.width,
                image.height
            ))
        })?;

    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut jpeg = Vec::new();
    rgb.write_to(
        &mut std::io::Cursor::new(&mut jpeg),
        image::ImageFormat::Jpeg,
    )
    .map_err(|e| SolveError::Encode(e.to_string()))?;

    Ok(jpeg)
}

// ---------------------------------------------------------------------------
// Request/response JSON helpers
// ---------------------------------------------------------------------------

/// Build the chat-completions request body with the image as a JPEG data URL.
pub(crate) fn build_request_body(model: &str, max_tokens: u32, jpeg: &[u8]) -> Value {
    let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg));
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": ANSWER_PROMPT },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]
        }]
    })
}

/// Extract the primary answer text from a chat-completions response.
///
/// Expected shape: `{ "choices": [ { "message": { "content": "..." } } ] }`
pub(crate) fn extract_answer(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract a provider-reported error message.
///
/// Expected shape: `{ "error": { "message": "..." } }`
pub(crate) fn extract_api_error(v: &Value) -> Option<String> {
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
