use std::time::Duration;

use restage_contracts::catalog::{DesignStyle, RoomType};
use restage_contracts::runs::feedback::FailureFeedback;
use restage_contracts::runs::summary::{AttemptRow, RunSummary};

use crate::error::PipelineError;
use crate::orchestrator::{Attempt, OrchestratorOutcome, StopReason};

/// Identity of a finished run, carried into its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMeta {
    pub run_id: String,
    pub room_type: RoomType,
    pub design_style: DesignStyle,
    pub total_checks: u32,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub run_id: String,
    pub room_type: RoomType,
    pub design_style: DesignStyle,
    pub best_attempt: Attempt,
    pub all_attempts: Vec<Attempt>,
    pub feedback: Vec<FailureFeedback>,
    pub total_attempts_made: u32,
    pub total_checks: u32,
    pub elapsed: Duration,
    /// Set when the best attempt did not pass every check.
    pub warning: bool,
    pub stop_reason: StopReason,
    pub started_at: String,
    pub finished_at: String,
    /// Artifact writes that failed after the run started. The result is
    /// still complete; only the on-disk record of it is partial.
    pub artifact_issues: Vec<String>,
}

impl PipelineResult {
    pub fn to_run_summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
            room_type: self.room_type,
            design_style: self.design_style,
            total_attempts: self.total_attempts_made,
            best_attempt_number: self.best_attempt.attempt_number,
            best_score: self.best_attempt.score,
            total_checks: self.total_checks,
            fully_passed: self.best_attempt.fully_passed,
            warning: self.warning,
            stop_reason: self.stop_reason.as_str().to_string(),
            elapsed_ms: self.elapsed.as_millis() as u64,
            attempts: self
                .all_attempts
                .iter()
                .map(|attempt| AttemptRow {
                    attempt_number: attempt.attempt_number,
                    score: attempt.score,
                    fully_passed: attempt.fully_passed,
                    failed_check: attempt.failed_check().map(|result| result.name.clone()),
                    error: attempt.error.clone(),
                })
                .collect(),
        }
    }
}

/// Packages the orchestrator's attempts into the caller-facing result.
pub fn aggregate(
    outcome: OrchestratorOutcome,
    elapsed: Duration,
    meta: RunMeta,
) -> Result<PipelineResult, PipelineError> {
    if outcome.attempts.is_empty() {
        return Err(PipelineError::Invariant(
            "aggregate called without attempts".to_string(),
        ));
    }
    let best_attempt = outcome
        .attempts
        .iter()
        .find(|attempt| attempt.attempt_number == outcome.best_attempt_number)
        .filter(|attempt| attempt.is_scorable())
        .cloned()
        .ok_or_else(|| {
            PipelineError::Invariant(format!(
                "best attempt {} is not a scorable attempt of this run",
                outcome.best_attempt_number
            ))
        })?;

    Ok(PipelineResult {
        run_id: meta.run_id,
        room_type: meta.room_type,
        design_style: meta.design_style,
        warning: !best_attempt.fully_passed,
        best_attempt,
        total_attempts_made: outcome.attempts.len() as u32,
        all_attempts: outcome.attempts,
        feedback: outcome.feedback,
        total_checks: meta.total_checks,
        elapsed,
        stop_reason: outcome.stop_reason,
        started_at: meta.started_at,
        finished_at: meta.finished_at,
        artifact_issues: outcome.artifact_issues,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use restage_contracts::catalog::{CheckCatalog, CheckResult, DesignStyle, RoomType};

    use super::{aggregate, RunMeta};
    use crate::error::PipelineError;
    use crate::orchestrator::{Attempt, OrchestratorOutcome, StopReason};
    use crate::services::ImagePayload;

    fn meta() -> RunMeta {
        RunMeta {
            run_id: "run-agg".to_string(),
            room_type: RoomType::Bedroom,
            design_style: DesignStyle::Coastal,
            total_checks: 5,
            started_at: "2026-10-15T00:00:00Z".to_string(),
            finished_at: "2026-10-15T00:01:00Z".to_string(),
        }
    }

    fn attempt(number: u32, score: u32, passed: bool) -> Attempt {
        let catalog = CheckCatalog::default();
        let checks = catalog.for_room(RoomType::Bedroom).unwrap_or_default();
        let mut results = checks
            .iter()
            .take(score as usize)
            .map(|check| CheckResult::passed(check, check.positive_label.clone()))
            .collect::<Vec<_>>();
        if !passed {
            let failing = &checks[score as usize];
            results.push(CheckResult::failed(failing, "different", "moved a wall"));
        }
        Attempt {
            attempt_number: number,
            edited_image: Some(ImagePayload::png(vec![number as u8])),
            layout_description: format!("layout {number}"),
            layout_instruction: String::new(),
            check_results: results,
            score,
            fully_passed: passed,
            error: None,
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn partial_best_sets_the_warning() -> anyhow::Result<()> {
        let outcome = OrchestratorOutcome {
            attempts: vec![attempt(1, 2, false), attempt(2, 3, false)],
            best_attempt_number: 2,
            feedback: Vec::new(),
            stop_reason: StopReason::Exhausted,
            artifact_issues: Vec::new(),
        };
        let result = aggregate(outcome, Duration::from_secs(4), meta())?;
        assert!(result.warning);
        assert_eq!(result.best_attempt.attempt_number, 2);
        assert_eq!(result.total_attempts_made, 2);
        let summary = result.to_run_summary();
        assert!((summary.score_pct() - 60.0).abs() < 1e-9);
        assert_eq!(summary.best_score, 3);
        assert_eq!(summary.stop_reason, "exhausted");
        assert_eq!(summary.attempts[0].failed_check.as_deref(), Some("Floorplan shape"));
        assert_eq!(summary.elapsed_ms, 4000);
        Ok(())
    }

    #[test]
    fn full_pass_has_no_warning() -> anyhow::Result<()> {
        let outcome = OrchestratorOutcome {
            attempts: vec![attempt(1, 5, true)],
            best_attempt_number: 1,
            feedback: Vec::new(),
            stop_reason: StopReason::Succeeded,
            artifact_issues: vec!["attempt-01.json: disk full".to_string()],
        };
        let result = aggregate(outcome, Duration::ZERO, meta())?;
        assert!(!result.warning);
        assert!(result.to_run_summary().fully_passed);
        assert_eq!(result.artifact_issues, vec!["attempt-01.json: disk full".to_string()]);
        Ok(())
    }

    #[test]
    fn missing_attempts_or_best_are_invariant_errors() {
        let empty = OrchestratorOutcome {
            attempts: Vec::new(),
            best_attempt_number: 1,
            feedback: Vec::new(),
            stop_reason: StopReason::Exhausted,
            artifact_issues: Vec::new(),
        };
        assert!(matches!(
            aggregate(empty, Duration::ZERO, meta()),
            Err(PipelineError::Invariant(_))
        ));

        let dangling = OrchestratorOutcome {
            attempts: vec![attempt(1, 1, false)],
            best_attempt_number: 4,
            feedback: Vec::new(),
            stop_reason: StopReason::Exhausted,
            artifact_issues: Vec::new(),
        };
        assert!(matches!(
            aggregate(dangling, Duration::ZERO, meta()),
            Err(PipelineError::Invariant(_))
        ));
    }
}
