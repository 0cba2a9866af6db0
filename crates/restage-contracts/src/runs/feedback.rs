use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CheckResult;
use crate::events::now_utc_iso;

/// One failed check, carried forward as corrective context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureFeedback {
    pub attempt_number: u32,
    pub check_name: String,
    pub outcome_label: String,
    pub justification: String,
}

impl FailureFeedback {
    pub fn from_check(attempt_number: u32, result: &CheckResult) -> Self {
        Self {
            attempt_number,
            check_name: result.name.clone(),
            outcome_label: result.outcome_label.clone(),
            justification: result
                .justification
                .clone()
                .unwrap_or_else(|| format!("outcome was '{}'", result.outcome_label)),
        }
    }
}

/// Append-only list of failures for one pipeline run.
///
/// Entries are never removed or reordered. When a journal path is set each
/// entry is also appended to it as a JSON line.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLog {
    entries: Vec<FailureFeedback>,
    journal: Option<PathBuf>,
    run_id: String,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            journal: Some(path.into()),
            run_id: run_id.into(),
        }
    }

    /// The entry is kept even when the journal append fails; the error only
    /// reports the lost journal line.
    pub fn record(&mut self, feedback: FailureFeedback) -> anyhow::Result<()> {
        let journal_line = match self.journal.as_ref() {
            Some(path) => {
                let mut payload = Map::new();
                payload.insert("ts".to_string(), Value::String(now_utc_iso()));
                payload.insert("run_id".to_string(), Value::String(self.run_id.clone()));
                if let Value::Object(fields) = serde_json::to_value(&feedback)? {
                    payload.extend(fields);
                }
                Some((path.clone(), payload))
            }
            None => None,
        };
        self.entries.push(feedback);
        if let Some((path, payload)) = journal_line {
            append_jsonl(&path, &payload)?;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[FailureFeedback] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn append_jsonl(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    use std::io::Write;
    file.write_all(serde_json::to_string(payload)?.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
