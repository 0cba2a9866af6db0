use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::ImageReader;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

use crate::services::ImagePayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    Url(String),
    Path(PathBuf),
}

impl ImageInput {
    /// `http(s)://` values become URLs, everything else a local path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            ImageInput::Url(trimmed.to_string())
        } else {
            ImageInput::Path(PathBuf::from(trimmed))
        }
    }

    pub fn label(&self) -> String {
        match self {
            ImageInput::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            ImageInput::Url(url) => url.clone(),
            ImageInput::Path(path) => path.to_string_lossy().to_string(),
        }
    }
}

/// Decoded view of the run's original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub payload: ImagePayload,
    pub width: u32,
    pub height: u32,
}

pub fn resolve_input(input: &ImageInput, timeout: Duration) -> Result<SourceImage> {
    let (bytes, declared_mime) = match input {
        ImageInput::Bytes(bytes) => (bytes.clone(), None),
        ImageInput::Path(path) => (
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?,
            None,
        ),
        ImageInput::Url(url) => fetch_url(url, timeout)?,
    };
    source_from_bytes(bytes, declared_mime)
}

pub fn source_from_bytes(bytes: Vec<u8>, declared_mime: Option<String>) -> Result<SourceImage> {
    if bytes.is_empty() {
        bail!("image input is empty");
    }
    let format = image::guess_format(&bytes).context("unrecognized image format")?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes.as_slice()), format)
        .into_dimensions()
        .context("failed to read image dimensions")?;
    let mime_type = declared_mime
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or_else(|| format.to_mime_type().to_string());
    Ok(SourceImage {
        payload: ImagePayload::new(bytes, mime_type),
        width,
        height,
    })
}

fn fetch_url(url: &str, timeout: Duration) -> Result<(Vec<u8>, Option<String>)> {
    let response = HttpClient::new()
        .get(url)
        .timeout(timeout)
        .send()
        .with_context(|| format!("image download failed ({url})"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("image download failed ({url}): HTTP {}", status.as_u16());
    }
    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        });
    let bytes = response
        .bytes()
        .with_context(|| format!("image download body read failed ({url})"))?;
    Ok((bytes.to_vec(), mime))
}
