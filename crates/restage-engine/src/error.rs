//! Error taxonomy for a pipeline run.
//!
//! Only `InvalidDimension`, `Input`, `Configuration`, `Artifact`, `Invariant`
//! and `TotalFailure` ever leave [`crate::Pipeline::run`]. `Generation` is
//! contained at the attempt level and `CheckExecution` at the check level.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Image geometry cannot produce a non-empty editable region.
    #[error("invalid image dimensions {width}x{height}: {reason}")]
    InvalidDimension {
        width: u32,
        height: u32,
        reason: String,
    },

    /// A transform turn returned no usable payload or the call failed.
    #[error("generation failed on turn {turn}: {message}")]
    Generation { turn: u8, message: String },

    /// The fidelity checker failed or timed out on one check.
    #[error("check '{check}' could not be executed: {message}")]
    CheckExecution { check: String, message: String },

    /// No attempt produced a scorable result.
    #[error("all {attempts} attempt(s) failed: {message}")]
    TotalFailure { attempts: u32, message: String },

    /// The input image could not be fetched or decoded.
    #[error("input image unusable: {0}")]
    Input(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The run directory could not be created. Later write failures are
    /// collected in `PipelineResult::artifact_issues` instead.
    #[error("failed to write run artifacts: {0}")]
    Artifact(String),

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl PipelineError {
    pub fn generation(turn: u8, message: impl Into<String>) -> Self {
        Self::Generation {
            turn,
            message: message.into(),
        }
    }

    pub fn check_execution(check: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::CheckExecution {
            check: check.into(),
            message: error_chain_text(err, 512),
        }
    }

    /// Errors that end the run immediately instead of costing one attempt.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Generation { .. } | PipelineError::CheckExecution { .. }
        )
    }
}

/// Flattens an `anyhow` chain into one line, skipping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
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
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
