//! Contracts for the three external collaborators and their implementations.

use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub mod dryrun;
pub mod gemini;
pub mod store;

pub use dryrun::{DryrunFidelityChecker, DryrunTransformService};
pub use gemini::{GeminiClient, GeminiFidelityChecker, GeminiTransformService};
pub use store::LocalImageStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: Option<String>,
    pub images: Vec<ImagePayload>,
}

/// Multi-turn history shared by the turns of one transform attempt.
///
/// Services append both the user turn and their reply, so a later turn is
/// conditioned on everything exchanged before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn push_user(&mut self, text: &str, images: &[ImagePayload]) {
        self.turns.push(ConversationTurn {
            role: TurnRole::User,
            text: Some(text.to_string()),
            images: images.to_vec(),
        });
    }

    pub fn push_model(&mut self, reply: &TransformReply) {
        self.turns.push(ConversationTurn {
            role: TurnRole::Model,
            text: reply.text.clone(),
            images: reply.image.iter().cloned().collect(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformReply {
    pub text: Option<String>,
    pub image: Option<ImagePayload>,
}

pub trait GenerativeTransformService: Send + Sync {
    fn name(&self) -> &str;

    /// Sends `instruction` (plus `images`) as the next user turn of `context`.
    fn converse(
        &self,
        context: &mut ConversationContext,
        images: &[ImagePayload],
        instruction: &str,
        timeout: Duration,
    ) -> Result<TransformReply>;
}

pub trait FidelityChecker: Send + Sync {
    fn name(&self) -> &str;

    fn assess(
        &self,
        original: &ImagePayload,
        candidate: &ImagePayload,
        assertion: &str,
        timeout: Duration,
    ) -> Result<String>;
}

/// Durable storage for the caller's chosen image. Never used inside a run.
pub trait ImageStore: Send + Sync {
    fn store(&self, image: &ImagePayload, metadata: &Map<String, Value>) -> Result<String>;
}
