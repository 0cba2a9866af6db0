//! Run journal: one compact JSON object per line in `events.jsonl`.
//!
//! Every event carries `type`, `run_id` and `ts`; caller fields are merged
//! after those and win on conflict.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug)]
enum Sink {
    Discard,
    File(PathBuf),
}

#[derive(Debug)]
struct Journal {
    run_id: String,
    sink: Sink,
    /// Serializes appends from clones on other threads.
    append: Mutex<()>,
}

/// Cheap to clone; clones share one journal.
#[derive(Debug, Clone)]
pub struct EventWriter {
    journal: Arc<Journal>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self::with_sink(Sink::File(path.into()), run_id.into())
    }

    /// Builds events and returns them without recording anything.
    pub fn disabled(run_id: impl Into<String>) -> Self {
        Self::with_sink(Sink::Discard, run_id.into())
    }

    fn with_sink(sink: Sink, run_id: String) -> Self {
        Self {
            journal: Arc::new(Journal {
                run_id,
                sink,
                append: Mutex::new(()),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.journal.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert("run_id".to_string(), Value::from(self.journal.run_id.as_str()));
        event.insert("ts".to_string(), Value::from(now_utc_iso()));
        event.extend(payload);
        let event = Value::Object(event);
        self.record(&event)?;
        Ok(event)
    }

    /// Like [`EventWriter::emit`] for a `json!` payload; a non-object
    /// payload is kept under `data`.
    pub fn emit_json(&self, event_type: &str, payload: Value) -> anyhow::Result<Value> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => EventPayload::new(),
            other => EventPayload::from_iter([("data".to_string(), other)]),
        };
        self.emit(event_type, payload)
    }

    fn record(&self, event: &Value) -> anyhow::Result<()> {
        let _guard = self
            .journal
            .append
            .lock()
            .map_err(|_| anyhow::anyhow!("event journal lock poisoned"))?;
        match &self.journal.sink {
            Sink::Discard => {}
            Sink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut line = serde_json::to_string(event)?;
                line.push('\n');
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut file| file.write_all(line.as_bytes()))
                    .with_context(|| format!("failed appending to {}", path.display()))?;
            }
        }
        Ok(())
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
