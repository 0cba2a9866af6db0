use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use super::{
    ConversationContext, FidelityChecker, GenerativeTransformService, ImagePayload,
    TransformReply, TurnRole,
};
use crate::config::{non_empty_env, PipelineConfig};
use crate::error::truncate_text;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shared HTTP plumbing for the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: api_key.into(),
            http: HttpClient::new(),
            transport_retries: config.transport_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    pub fn from_env(config: &PipelineConfig) -> Result<Self> {
        let Some(api_key) = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
        else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        Ok(Self::new(api_key, config))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn generate(&self, model: &str, payload: &Value, timeout: Duration) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let response = self.post_with_transport_retries(&endpoint, payload, timeout)?;
        response_json_or_error("Gemini", response)
    }

    /// Retries connect-level failures while the caller's `timeout` budget
    /// lasts. A timed-out request is never retried.
    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0usize;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("Gemini request exceeded its {}ms budget ({endpoint})", timeout.as_millis());
            }
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", self.api_key.as_str())])
                .timeout(remaining)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= self.transport_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    let backoff = self.retry_backoff.mul_f64(attempt as f64);
                    if Instant::now() + backoff >= deadline {
                        return Err(err);
                    }
                    thread::sleep(backoff);
                }
            }
        }
    }
}

pub struct GeminiTransformService {
    client: GeminiClient,
    model: String,
}

impl GeminiTransformService {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl GenerativeTransformService for GeminiTransformService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn converse(
        &self,
        context: &mut ConversationContext,
        images: &[ImagePayload],
        instruction: &str,
        timeout: Duration,
    ) -> Result<TransformReply> {
        let payload = build_transform_payload(context, images, instruction);
        let response = self
            .client
            .generate(&self.model, &payload, timeout)
            .context("Gemini transform turn failed")?;
        let reply = extract_reply(&response)?;
        context.push_user(instruction, images);
        context.push_model(&reply);
        Ok(reply)
    }
}

pub struct GeminiFidelityChecker {
    client: GeminiClient,
    model: String,
}

impl GeminiFidelityChecker {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl FidelityChecker for GeminiFidelityChecker {
    fn name(&self) -> &str {
        "gemini"
    }

    fn assess(
        &self,
        original: &ImagePayload,
        candidate: &ImagePayload,
        assertion: &str,
        timeout: Duration,
    ) -> Result<String> {
        let payload = build_check_payload(original, candidate, assertion);
        let response = self
            .client
            .generate(&self.model, &payload, timeout)
            .context("Gemini fidelity check failed")?;
        let reply = extract_reply(&response)?;
        match reply.text {
            Some(text) => Ok(text),
            None => bail!("Gemini returned no text for fidelity check"),
        }
    }
}

fn image_part(image: &ImagePayload) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64.encode(&image.bytes),
        }
    })
}

fn build_transform_payload(
    context: &ConversationContext,
    images: &[ImagePayload],
    instruction: &str,
) -> Value {
    let mut contents = Vec::new();
    for turn in context.turns() {
        let mut parts = turn.images.iter().map(image_part).collect::<Vec<_>>();
        if let Some(text) = turn.text.as_deref().filter(|text| !text.is_empty()) {
            parts.push(json!({ "text": text }));
        }
        if parts.is_empty() {
            continue;
        }
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        };
        contents.push(json!({ "role": role, "parts": parts }));
    }

    let mut parts = images.iter().map(image_part).collect::<Vec<_>>();
    parts.push(json!({ "text": instruction }));
    contents.push(json!({ "role": "user", "parts": parts }));

    json!({
        "contents": contents,
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
        },
    })
}

fn build_check_payload(original: &ImagePayload, candidate: &ImagePayload, assertion: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": "ORIGINAL image:" },
                image_part(original),
                { "text": "EDITED image:" },
                image_part(candidate),
                { "text": assertion },
            ],
        }],
        "generationConfig": {
            "responseModalities": ["TEXT"],
            "temperature": 0.0,
        },
    })
}

/// Collects all text parts (newline-joined) and the first inline image.
fn extract_reply(response_payload: &Value) -> Result<TransformReply> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut texts = Vec::new();
    let mut image = None;

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    texts.push(text.trim().to_string());
                }
                continue;
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
            if data.is_empty() || image.is_some() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            image = Some(ImagePayload::new(bytes, mime_type));
        }
    }

    Ok(TransformReply {
        text: if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        },
        image,
    })
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
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                !reqwest_err.is_timeout() && (reqwest_err.is_connect() || reqwest_err.is_request())
            })
            .unwrap_or(false)
    })
}
