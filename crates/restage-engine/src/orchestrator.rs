//! Bounded generate → verify → retry loop.
//!
//! Attempts run strictly in order. Attempt `k` sees the failures of attempts
//! `1..k` and nothing else; the best attempt only changes on a strictly
//! higher score, so ties stay with the earliest attempt.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use restage_contracts::catalog::{CheckResult, DesignStyle, RoomType};
use restage_contracts::events::EventWriter;
use restage_contracts::runs::feedback::{FailureFeedback, FeedbackLog};
use restage_contracts::runs::receipts::{write_receipt, AttemptReceipt, RECEIPT_SCHEMA_VERSION};
use serde_json::{json, Value};

use crate::cancel::CancellationToken;
use crate::error::{error_chain_text, PipelineError};
use crate::input::SourceImage;
use crate::mask::build_mask_with_ratio;
use crate::services::ImagePayload;
use crate::transform::TransformSession;
use crate::verify::VerificationChain;

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub attempt_number: u32,
    /// `None` when the transform produced nothing to verify.
    pub edited_image: Option<ImagePayload>,
    pub layout_description: String,
    pub layout_instruction: String,
    pub check_results: Vec<CheckResult>,
    pub score: u32,
    pub fully_passed: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

impl Attempt {
    pub fn is_scorable(&self) -> bool {
        self.edited_image.is_some()
    }

    pub fn failed_check(&self) -> Option<&CheckResult> {
        self.check_results.iter().find(|result| !result.passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running { attempt: u32 },
    Succeeded,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Succeeded,
    Exhausted,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Succeeded => "succeeded",
            StopReason::Exhausted => "exhausted",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOutcome {
    pub attempts: Vec<Attempt>,
    pub best_attempt_number: u32,
    pub feedback: Vec<FailureFeedback>,
    pub stop_reason: StopReason,
    /// Journal, receipt and image writes that failed during the run.
    pub artifact_issues: Vec<String>,
}

pub struct RetryOrchestrator<'a> {
    transform: TransformSession<'a>,
    verification: VerificationChain<'a>,
    events: &'a EventWriter,
    margin_ratio: f64,
    run_dir: Option<PathBuf>,
    artifact_issues: RefCell<Vec<String>>,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        transform: TransformSession<'a>,
        verification: VerificationChain<'a>,
        events: &'a EventWriter,
        margin_ratio: f64,
    ) -> Self {
        Self {
            transform,
            verification,
            events,
            margin_ratio,
            run_dir: None,
            artifact_issues: RefCell::new(Vec::new()),
        }
    }

    /// Persist attempt images, receipts and `feedback.jsonl` under `run_dir`.
    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(run_dir.into());
        self
    }

    pub fn run(
        &self,
        source: &SourceImage,
        room_type: RoomType,
        design_style: DesignStyle,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorOutcome, PipelineError> {
        if max_attempts == 0 {
            return Err(PipelineError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut feedback = match self.run_dir.as_ref() {
            Some(dir) => FeedbackLog::with_journal(dir.join("feedback.jsonl"), self.events.run_id()),
            None => FeedbackLog::new(),
        };
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut best: Option<usize> = None;
        let mut state = LoopState::Running { attempt: 1 };

        while let LoopState::Running { attempt } = state {
            if cancel.is_cancelled() {
                self.emit("run_cancelled", json!({ "before_attempt": attempt }));
                state = LoopState::Cancelled;
                break;
            }
            self.emit(
                "attempt_started",
                json!({ "attempt": attempt, "corrections": feedback.len() }),
            );

            let (record, cancelled) =
                self.run_attempt(attempt, source, room_type, design_style, &feedback, cancel)?;
            if let Err(err) = self.persist_attempt(&record, room_type, design_style) {
                self.note_issue(err.to_string());
            }

            if record.is_scorable()
                && best
                    .map(|idx| record.score > attempts[idx].score)
                    .unwrap_or(true)
            {
                best = Some(attempts.len());
            }

            if !record.fully_passed {
                for result in record.check_results.iter().filter(|result| !result.passed) {
                    let entry = FailureFeedback::from_check(attempt, result);
                    if let Err(err) = feedback.record(entry.clone()) {
                        self.note_issue(artifact_error(&err).to_string());
                    }
                    self.emit(
                        "feedback_recorded",
                        json!({
                            "attempt": entry.attempt_number,
                            "check_name": entry.check_name,
                            "outcome_label": entry.outcome_label,
                            "justification": entry.justification,
                        }),
                    );
                }
            }

            state = if record.fully_passed {
                LoopState::Succeeded
            } else if cancelled {
                LoopState::Cancelled
            } else if attempt >= max_attempts {
                LoopState::Exhausted
            } else {
                LoopState::Running {
                    attempt: attempt + 1,
                }
            };
            attempts.push(record);

            let best_number = best.map(|idx| attempts[idx].attempt_number);
            if let Some(record) = attempts.last() {
                self.emit(
                    "attempt_finished",
                    json!({
                        "attempt": record.attempt_number,
                        "score": record.score,
                        "fully_passed": record.fully_passed,
                        "error": record.error,
                        "best_attempt": best_number,
                        "duration_ms": record.duration.as_millis() as u64,
                    }),
                );
            }
        }

        let stop_reason = match state {
            LoopState::Succeeded => StopReason::Succeeded,
            LoopState::Cancelled => StopReason::Cancelled,
            LoopState::Exhausted | LoopState::Running { .. } => StopReason::Exhausted,
        };

        let Some(best_idx) = best else {
            let message = attempts
                .iter()
                .rev()
                .find_map(|attempt| attempt.error.clone())
                .unwrap_or_else(|| "cancelled before any attempt completed".to_string());
            return Err(PipelineError::TotalFailure {
                attempts: attempts.len() as u32,
                message,
            });
        };

        Ok(OrchestratorOutcome {
            best_attempt_number: attempts[best_idx].attempt_number,
            attempts,
            feedback: feedback.entries().to_vec(),
            stop_reason,
            artifact_issues: self.artifact_issues.take(),
        })
    }

    fn run_attempt(
        &self,
        attempt: u32,
        source: &SourceImage,
        room_type: RoomType,
        design_style: DesignStyle,
        feedback: &FeedbackLog,
        cancel: &CancellationToken,
    ) -> Result<(Attempt, bool), PipelineError> {
        let started = Instant::now();
        let mask = build_mask_with_ratio(source.width, source.height, self.margin_ratio)?;

        let output = match self.transform.run(
            &source.payload,
            &mask,
            room_type,
            design_style,
            feedback.entries(),
        ) {
            Ok(output) => output,
            Err(err) if !err.is_fatal() => {
                self.emit(
                    "transform_failed",
                    json!({ "attempt": attempt, "error": err.to_string() }),
                );
                let record = Attempt {
                    attempt_number: attempt,
                    edited_image: None,
                    layout_description: String::new(),
                    layout_instruction: String::new(),
                    check_results: Vec::new(),
                    score: 0,
                    fully_passed: false,
                    error: Some(err.to_string()),
                    duration: started.elapsed(),
                };
                return Ok((record, false));
            }
            Err(err) => return Err(err),
        };
        self.emit(
            "transform_completed",
            json!({
                "attempt": attempt,
                "layout_description": output.layout_description,
                "image_bytes": output.edited_image.bytes.len(),
                "editable_area": mask.editable_area(),
            }),
        );

        let outcome = self.verification.run_checks(
            &source.payload,
            &output.edited_image,
            room_type,
            cancel,
        )?;
        for result in &outcome.results {
            self.emit(
                "check_completed",
                json!({
                    "attempt": attempt,
                    "check_id": result.check_id,
                    "name": result.name,
                    "outcome_label": result.outcome_label,
                    "passed": result.passed,
                    "justification": result.justification,
                }),
            );
        }

        let record = Attempt {
            attempt_number: attempt,
            edited_image: Some(output.edited_image),
            layout_description: output.layout_description,
            layout_instruction: output.layout_instruction,
            check_results: outcome.results,
            score: outcome.score,
            fully_passed: outcome.passed,
            error: None,
            duration: started.elapsed(),
        };
        Ok((record, outcome.cancelled))
    }

    fn persist_attempt(
        &self,
        record: &Attempt,
        room_type: RoomType,
        design_style: DesignStyle,
    ) -> Result<(), PipelineError> {
        let Some(dir) = self.run_dir.as_deref() else {
            return Ok(());
        };
        let image_path = match record.edited_image.as_ref() {
            Some(image) => Some(write_attempt_image(dir, record.attempt_number, image)?),
            None => None,
        };
        let receipt = AttemptReceipt {
            schema_version: RECEIPT_SCHEMA_VERSION,
            run_id: self.events.run_id().to_string(),
            attempt_number: record.attempt_number,
            room_type,
            design_style,
            layout_instruction: record.layout_instruction.clone(),
            layout_description: record.layout_description.clone(),
            image_path: image_path.map(|path| path.to_string_lossy().to_string()),
            image_sha256: record.edited_image.as_ref().map(ImagePayload::sha256_hex),
            image_mime_type: record
                .edited_image
                .as_ref()
                .map(|image| image.mime_type.clone()),
            check_results: record.check_results.clone(),
            score: record.score,
            total_checks: self.verification.total_checks(room_type),
            fully_passed: record.fully_passed,
            error: record.error.clone(),
            duration_ms: record.duration.as_millis() as u64,
        };
        let path = dir.join(format!("attempt-{:02}.json", record.attempt_number));
        write_receipt(&path, &receipt).map_err(|err| artifact_error(&err))
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.events.emit_json(event_type, payload) {
            self.note_issue(format!("{event_type} event: {}", artifact_error(&err)));
        }
    }

    /// Artifact writes never end a run once it has started; their failures
    /// are reported on the outcome instead.
    fn note_issue(&self, issue: String) {
        self.artifact_issues.borrow_mut().push(issue);
    }
}

fn write_attempt_image(
    dir: &Path,
    attempt_number: u32,
    image: &ImagePayload,
) -> Result<PathBuf, PipelineError> {
    let path = dir.join(format!(
        "attempt-{:02}.{}",
        attempt_number,
        image.extension()
    ));
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, &image.bytes))
        .map_err(|err| PipelineError::Artifact(format!("{}: {err}", path.display())))?;
    Ok(path)
}

fn artifact_error(err: &anyhow::Error) -> PipelineError {
    PipelineError::Artifact(error_chain_text(err, 512))
}
