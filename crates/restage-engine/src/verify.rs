//! Ordered, short-circuiting fidelity checks for one edited image.
//!
//! Checks run from coarse (walls, openings, shape) to fine (clearance,
//! camera, room specifics). The first failing check ends the chain, so the
//! score is the number of leading checks passed.

use std::time::Duration;

use restage_contracts::catalog::{CheckCatalog, CheckDefinition, CheckResult, RoomType};
use restage_contracts::catalog::checks::normalize_label;

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::services::{FidelityChecker, ImagePayload};

const ANSWER_MARKER: &str = "exactly one word: ";
const ANSWER_END: &str = ". On the second line";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub results: Vec<CheckResult>,
    pub score: u32,
    pub passed: bool,
    pub total_checks: u32,
    pub cancelled: bool,
}

pub struct VerificationChain<'a> {
    checker: &'a dyn FidelityChecker,
    catalog: &'a CheckCatalog,
    timeout: Duration,
}

impl<'a> VerificationChain<'a> {
    pub fn new(
        checker: &'a dyn FidelityChecker,
        catalog: &'a CheckCatalog,
        timeout: Duration,
    ) -> Self {
        Self {
            checker,
            catalog,
            timeout,
        }
    }

    /// Size of the room's check table, 0 when the room has none.
    pub fn total_checks(&self, room_type: RoomType) -> u32 {
        self.catalog
            .for_room(room_type)
            .map(|checks| checks.len() as u32)
            .unwrap_or_default()
    }

    pub fn run_checks(
        &self,
        original: &ImagePayload,
        edited: &ImagePayload,
        room_type: RoomType,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome, PipelineError> {
        let checks = self
            .catalog
            .for_room(room_type)
            .filter(|checks| !checks.is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(format!("no fidelity checks configured for {room_type}"))
            })?;
        let total_checks = checks.len() as u32;
        let mut results = Vec::with_capacity(checks.len());
        let mut cancelled = false;

        for check in checks {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let result = self.run_one(check, original, edited);
            let passed = result.passed;
            results.push(result);
            if !passed {
                break;
            }
        }

        let score = results.iter().take_while(|result| result.passed).count() as u32;
        Ok(VerificationOutcome {
            passed: !cancelled && score == total_checks,
            results,
            score,
            total_checks,
            cancelled,
        })
    }

    fn run_one(
        &self,
        check: &CheckDefinition,
        original: &ImagePayload,
        edited: &ImagePayload,
    ) -> CheckResult {
        let prompt = assertion_prompt(check);
        match self.checker.assess(original, edited, &prompt, self.timeout) {
            Ok(response) => evaluate_response(check, &response),
            Err(err) => {
                let failure = PipelineError::check_execution(check.name.clone(), &err);
                CheckResult::failed(check, "error", failure.to_string())
            }
        }
    }
}

pub fn assertion_prompt(check: &CheckDefinition) -> String {
    format!(
        "You compare an ORIGINAL room photo with an EDITED version of it.\nCheck: {}\nAssertion: {}\n\
Answer on the first line with {ANSWER_MARKER}{} or {}{ANSWER_END}, give a one-sentence \
justification (required when the answer is {}).",
        check.name, check.assertion, check.positive_label, check.negative_label, check.negative_label
    )
}

/// Recovers the `(positive, negative)` labels offered by [`assertion_prompt`].
pub fn answer_options(prompt: &str) -> Option<(String, String)> {
    let start = prompt.find(ANSWER_MARKER)? + ANSWER_MARKER.len();
    let rest = &prompt[start..];
    let end = rest.find(ANSWER_END)?;
    let (positive, negative) = rest[..end].split_once(" or ")?;
    Some((positive.trim().to_string(), negative.trim().to_string()))
}

/// Splits a two-line checker reply into `(outcome_label, justification)`.
pub fn parse_check_response(response: &str) -> (String, Option<String>) {
    let mut lines = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let Some(first) = lines.next() else {
        return (String::new(), None);
    };
    let first = strip_prefix_ignore_case(first, "answer:").unwrap_or(first);
    let mut words = first.split_whitespace();
    let label = words.next().map(normalize_label).unwrap_or_default();

    let inline_rest = words.collect::<Vec<_>>().join(" ");
    let inline_rest = inline_rest
        .trim_start_matches(|ch: char| !ch.is_alphanumeric())
        .to_string();
    let mut justification = lines.collect::<Vec<_>>().join(" ");
    if justification.is_empty() {
        justification = inline_rest;
    }
    let justification = strip_prefix_ignore_case(&justification, "justification:")
        .unwrap_or(&justification)
        .trim()
        .to_string();

    (
        label,
        if justification.is_empty() {
            None
        } else {
            Some(justification)
        },
    )
}

pub fn evaluate_response(check: &CheckDefinition, response: &str) -> CheckResult {
    let (label, justification) = parse_check_response(response);
    if check.is_positive(&label) {
        return CheckResult::passed(check, label);
    }
    let justification = if label == normalize_label(&check.negative_label) {
        justification.unwrap_or_else(|| "checker gave no justification".to_string())
    } else {
        format!(
            "unrecognized checker answer: {}",
            response.lines().next().unwrap_or_default().trim()
        )
    };
    CheckResult::failed(check, label, justification)
}

fn strip_prefix_ignore_case<'s>(value: &'s str, prefix: &str) -> Option<&'s str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(value[prefix.len()..].trim_start())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::bail;
    use restage_contracts::catalog::{CheckCatalog, RoomType};

    use super::{answer_options, assertion_prompt, parse_check_response, VerificationChain};
    use crate::cancel::CancellationToken;
    use crate::services::{FidelityChecker, ImagePayload};

    /// Answers from a queue and remembers which checks were asked.
    struct QueueChecker {
        answers: Mutex<Vec<anyhow::Result<String>>>,
        asked: Mutex<Vec<String>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl QueueChecker {
        fn new(answers: Vec<anyhow::Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                asked: Mutex::new(Vec::new()),
                cancel_after: None,
            }
        }

        fn passing(count: usize) -> Self {
            Self::new((0..count).map(|_| Ok("same\nlooks identical".to_string())).collect())
        }
    }

    impl FidelityChecker for QueueChecker {
        fn name(&self) -> &str {
            "queue"
        }

        fn assess(
            &self,
            _original: &ImagePayload,
            _candidate: &ImagePayload,
            assertion: &str,
            _timeout: Duration,
        ) -> anyhow::Result<String> {
            let mut asked = self.asked.lock().unwrap();
            asked.push(assertion.to_string());
            if let Some((limit, token)) = self.cancel_after.as_ref() {
                if asked.len() >= *limit {
                    token.cancel();
                }
            }
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                bail!("no scripted answer");
            }
            let (positive, negative) = answer_options(assertion).unwrap_or_default();
            let answer = answers.remove(0)?;
            Ok(answer
                .replace("same", &positive)
                .replace("different", &negative))
        }
    }

    fn images() -> (ImagePayload, ImagePayload) {
        (ImagePayload::png(vec![1]), ImagePayload::png(vec![2]))
    }

    #[test]
    fn all_checks_passing_scores_the_full_list() -> anyhow::Result<()> {
        let catalog = CheckCatalog::default();
        let checker = QueueChecker::passing(5);
        let chain = VerificationChain::new(&checker, &catalog, Duration::from_secs(1));
        let (original, edited) = images();
        let outcome =
            chain.run_checks(&original, &edited, RoomType::LivingRoom, &CancellationToken::new())?;
        assert!(outcome.passed);
        assert_eq!(outcome.score, 5);
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.results.iter().all(|result| result.justification.is_none()));
        assert!(outcome.results.iter().all(|result| result.passed));
        Ok(())
    }

    #[test]
    fn chain_stops_at_first_failure() -> anyhow::Result<()> {
        let catalog = CheckCatalog::default();
        let checker = QueueChecker::new(vec![
            Ok("same\nok".to_string()),
            Ok("same\nok".to_string()),
            Ok("different\nthe bay window became a flat wall".to_string()),
            Ok("same\nnever asked".to_string()),
        ]);
        let chain = VerificationChain::new(&checker, &catalog, Duration::from_secs(1));
        let (original, edited) = images();
        let outcome =
            chain.run_checks(&original, &edited, RoomType::Outdoor, &CancellationToken::new())?;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.total_checks, 7);
        let failure = outcome.results.last().unwrap();
        assert!(!failure.passed);
        assert_eq!(failure.check_id, 3);
        assert_eq!(failure.name, "Floorplan shape");
        assert_eq!(failure.outcome_label, "different");
        assert_eq!(
            failure.justification.as_deref(),
            Some("the bay window became a flat wall")
        );
        assert_eq!(checker.asked.lock().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn checker_errors_fail_the_check_and_stop_the_chain() -> anyhow::Result<()> {
        let catalog = CheckCatalog::default();
        let checker = QueueChecker::new(vec![
            Ok("same\nok".to_string()),
            Err(anyhow::anyhow!("operation timed out")),
        ]);
        let chain = VerificationChain::new(&checker, &catalog, Duration::from_secs(1));
        let (original, edited) = images();
        let outcome =
            chain.run_checks(&original, &edited, RoomType::Bedroom, &CancellationToken::new())?;
        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.results.len(), 2);
        let failure = &outcome.results[1];
        assert!(!failure.passed);
        assert_eq!(failure.outcome_label, "error");
        assert!(failure
            .justification
            .as_deref()
            .unwrap_or_default()
            .contains("operation timed out"));
        Ok(())
    }

    #[test]
    fn cancellation_between_checks_ends_the_chain() -> anyhow::Result<()> {
        let catalog = CheckCatalog::default();
        let token = CancellationToken::new();
        let mut checker = QueueChecker::passing(5);
        checker.cancel_after = Some((2, token.clone()));
        let chain = VerificationChain::new(&checker, &catalog, Duration::from_secs(1));
        let (original, edited) = images();
        let outcome = chain.run_checks(&original, &edited, RoomType::Bedroom, &token)?;
        assert!(outcome.cancelled);
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.results.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_room_table_is_a_configuration_error() {
        let catalog = CheckCatalog::new(Some(indexmap_for_bedroom_only()));
        let checker = QueueChecker::passing(1);
        let chain = VerificationChain::new(&checker, &catalog, Duration::from_secs(1));
        let (original, edited) = images();
        let err = chain
            .run_checks(&original, &edited, RoomType::Kitchen, &CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("kitchen"));
    }

    fn indexmap_for_bedroom_only(
    ) -> indexmap::IndexMap<RoomType, Vec<restage_contracts::catalog::CheckDefinition>> {
        let defaults = CheckCatalog::default();
        let mut map = indexmap::IndexMap::new();
        map.insert(
            RoomType::Bedroom,
            defaults.for_room(RoomType::Bedroom).unwrap_or_default().to_vec(),
        );
        map
    }

    #[test]
    fn prompt_advertises_the_check_vocabulary() {
        let catalog = CheckCatalog::default();
        let check = &catalog.for_room(RoomType::Bedroom).unwrap()[3];
        let prompt = assertion_prompt(check);
        assert!(prompt.contains("Check: Circulation clearance"));
        assert_eq!(
            answer_options(&prompt),
            Some(("clear".to_string(), "hindered".to_string()))
        );
        assert_eq!(answer_options("no options here"), None);
    }

    #[test]
    fn responses_tolerate_formatting_noise() {
        assert_eq!(
            parse_check_response("**Different**\nThe door moved left."),
            ("different".to_string(), Some("The door moved left.".to_string()))
        );
        assert_eq!(
            parse_check_response("Answer: same"),
            ("same".to_string(), None)
        );
        assert_eq!(
            parse_check_response("hindered - the sofa blocks the hallway"),
            (
                "hindered".to_string(),
                Some("the sofa blocks the hallway".to_string())
            )
        );
        assert_eq!(
            parse_check_response("\n\nDifferent.\n\nJustification: ceiling is lower\n"),
            ("different".to_string(), Some("ceiling is lower".to_string()))
        );
        assert_eq!(parse_check_response("   "), (String::new(), None));
    }

    #[test]
    fn unrecognized_answers_fail_with_explanation() {
        let catalog = CheckCatalog::default();
        let check = &catalog.for_room(RoomType::Bedroom).unwrap()[0];
        let result = super::evaluate_response(check, "maybe\nhard to tell");
        assert!(!result.passed);
        assert_eq!(result.outcome_label, "maybe");
        assert_eq!(
            result.justification.as_deref(),
            Some("unrecognized checker answer: maybe")
        );
        let bare = super::evaluate_response(check, "different");
        assert_eq!(
            bare.justification.as_deref(),
            Some("checker gave no justification")
        );
    }
}
