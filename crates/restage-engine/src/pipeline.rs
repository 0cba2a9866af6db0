//! Entry point: one [`Pipeline::run`] call per image.
//!
//! A `Pipeline` holds only immutable collaborators and configuration, so one
//! instance can serve concurrent runs; every run gets its own id, journal
//! and feedback log.

use std::path::{Path, PathBuf};
use std::time::Instant;

use restage_contracts::catalog::{CheckCatalog, DesignStyle, RoomType};
use restage_contracts::events::{now_utc_iso, EventPayload, EventWriter};
use restage_contracts::runs::summary::write_summary;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::aggregate::{aggregate, PipelineResult, RunMeta};
use crate::cancel::CancellationToken;
use crate::config::{PipelineConfig, DEFAULT_MAX_ATTEMPTS};
use crate::error::{error_chain_text, PipelineError};
use crate::input::{resolve_input, ImageInput};
use crate::orchestrator::RetryOrchestrator;
use crate::services::{FidelityChecker, GenerativeTransformService};
use crate::transform::TransformSession;
use crate::verify::VerificationChain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub image_input: ImageInput,
    pub room_type: RoomType,
    pub design_style: DesignStyle,
    pub max_attempts: u32,
}

impl PipelineRequest {
    pub fn new(image_input: ImageInput, room_type: RoomType, design_style: DesignStyle) -> Self {
        Self {
            image_input,
            room_type,
            design_style,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

pub struct Pipeline {
    transform: Box<dyn GenerativeTransformService>,
    checker: Box<dyn FidelityChecker>,
    catalog: CheckCatalog,
    config: PipelineConfig,
    runs_root: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(
        transform: Box<dyn GenerativeTransformService>,
        checker: Box<dyn FidelityChecker>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transform,
            checker,
            catalog: CheckCatalog::default(),
            config,
            runs_root: None,
        }
    }

    /// Each run writes its artifacts to `<root>/<run_id>/`.
    pub fn with_runs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runs_root = Some(root.into());
        self
    }

    pub fn run(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let started_at = now_utc_iso();
        let run_id = Uuid::new_v4().to_string();
        let run_dir = self.runs_root.as_ref().map(|root| root.join(&run_id));
        if let Some(dir) = run_dir.as_ref() {
            std::fs::create_dir_all(dir)
                .map_err(|err| PipelineError::Artifact(format!("{}: {err}", dir.display())))?;
        }
        let events = match run_dir.as_ref() {
            Some(dir) => EventWriter::new(dir.join("events.jsonl"), run_id.clone()),
            None => EventWriter::disabled(run_id.clone()),
        };

        // Once the run directory exists, journal and summary write failures
        // are reported on the result and never end the run.
        let mut artifact_issues = Vec::new();
        note(
            &mut artifact_issues,
            &events,
            "run_started",
            json!({
                "image": request.image_input.label(),
                "room_type": request.room_type,
                "design_style": request.design_style,
                "max_attempts": request.max_attempts,
                "transform_service": self.transform.name(),
                "fidelity_checker": self.checker.name(),
                "run_dir": run_dir.as_ref().map(|dir| dir.to_string_lossy().to_string()),
            }),
        );

        match self.run_inner(request, cancel, &events, run_dir.as_deref(), started, started_at) {
            Ok(mut result) => {
                artifact_issues.append(&mut result.artifact_issues);
                let payload = json!({
                    "status": if result.warning { "warning" } else { "passed" },
                    "best_attempt": result.best_attempt.attempt_number,
                    "best_score": result.best_attempt.score,
                    "total_checks": result.total_checks,
                    "total_attempts": result.total_attempts_made,
                    "stop_reason": result.stop_reason.as_str(),
                    "elapsed_ms": result.elapsed.as_millis() as u64,
                    "artifact_issues": artifact_issues.len(),
                });
                note(&mut artifact_issues, &events, "run_finished", payload);
                result.artifact_issues = artifact_issues;
                Ok(result)
            }
            Err(err) => {
                // Journal failures must not mask the original error.
                let _ = emit(
                    &events,
                    "run_finished",
                    json!({
                        "status": "failed",
                        "error": err.to_string(),
                        "elapsed_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                Err(err)
            }
        }
    }

    fn run_inner(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
        events: &EventWriter,
        run_dir: Option<&Path>,
        started: Instant,
        started_at: String,
    ) -> Result<PipelineResult, PipelineError> {
        let source = resolve_input(&request.image_input, self.config.check_timeout)
            .map_err(|err| PipelineError::Input(error_chain_text(&err, 512)))?;
        let cancel = match self.config.deadline {
            Some(deadline) => cancel.limited_to(deadline),
            None => cancel.clone(),
        };

        let mut orchestrator = RetryOrchestrator::new(
            TransformSession::new(self.transform.as_ref(), self.config.generation_timeout),
            VerificationChain::new(
                self.checker.as_ref(),
                &self.catalog,
                self.config.check_timeout,
            ),
            events,
            self.config.margin_ratio,
        );
        if let Some(dir) = run_dir {
            orchestrator = orchestrator.with_run_dir(dir);
        }
        let outcome = orchestrator.run(
            &source,
            request.room_type,
            request.design_style,
            request.max_attempts,
            &cancel,
        )?;

        let mut result = aggregate(
            outcome,
            started.elapsed(),
            RunMeta {
                run_id: events.run_id().to_string(),
                room_type: request.room_type,
                design_style: request.design_style,
                total_checks: self.catalog.total_checks(request.room_type) as u32,
                started_at,
                finished_at: now_utc_iso(),
            },
        )?;

        if let Some(dir) = run_dir {
            let mut extra = EventPayload::new();
            extra.insert("image".to_string(), Value::String(request.image_input.label()));
            extra.insert(
                "source_dimensions".to_string(),
                json!([source.width, source.height]),
            );
            let path = dir.join("summary.json");
            if let Err(err) = write_summary(&path, &result.to_run_summary(), Some(&extra)) {
                result.artifact_issues.push(format!(
                    "{}: {}",
                    path.display(),
                    error_chain_text(&err, 512)
                ));
            }
        }
        Ok(result)
    }
}

fn emit(events: &EventWriter, event_type: &str, payload: Value) -> Result<(), PipelineError> {
    events
        .emit_json(event_type, payload)
        .map(|_| ())
        .map_err(|err| PipelineError::Artifact(error_chain_text(&err, 512)))
}

fn note(issues: &mut Vec<String>, events: &EventWriter, event_type: &str, payload: Value) {
    if let Err(err) = emit(events, event_type, payload) {
        issues.push(format!("{event_type} event: {err}"));
    }
}
