use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{DesignStyle, RoomType};
use crate::events::now_utc_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRow {
    pub attempt_number: u32,
    pub score: u32,
    pub fully_passed: bool,
    pub failed_check: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub room_type: RoomType,
    pub design_style: DesignStyle,
    pub total_attempts: u32,
    pub best_attempt_number: u32,
    pub best_score: u32,
    pub total_checks: u32,
    pub fully_passed: bool,
    pub warning: bool,
    pub stop_reason: String,
    pub elapsed_ms: u64,
    pub attempts: Vec<AttemptRow>,
}

impl RunSummary {
    pub fn score_pct(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        f64::from(self.best_score) / f64::from(self.total_checks) * 100.0
    }

    /// The summary fields plus `score_pct`, with `extra` merged last.
    pub fn to_json(
        &self,
        extra: Option<&Map<String, Value>>,
    ) -> anyhow::Result<Map<String, Value>> {
        let mut payload = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.insert("score_pct".to_string(), Value::from(self.score_pct()));
        if let Some(extra) = extra {
            for (key, value) in extra {
                payload.insert(key.clone(), value.clone());
            }
        }
        Ok(payload)
    }
}

pub fn write_summary(
    path: &Path,
    summary: &RunSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = summary.to_json(extra)?;
    payload
        .entry("ts".to_string())
        .or_insert_with(|| Value::String(now_utc_iso()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{write_summary, AttemptRow, RunSummary};
    use crate::catalog::{DesignStyle, RoomType};

    fn summary() -> RunSummary {
        RunSummary {
            run_id: "run-123".to_string(),
            started_at: "2026-02-19T00:00:00+00:00".to_string(),
            finished_at: "2026-02-19T00:10:00+00:00".to_string(),
            room_type: RoomType::Outdoor,
            design_style: DesignStyle::Coastal,
            total_attempts: 2,
            best_attempt_number: 2,
            best_score: 4,
            total_checks: 7,
            fully_passed: false,
            warning: true,
            stop_reason: "exhausted".to_string(),
            elapsed_ms: 600_000,
            attempts: vec![
                AttemptRow {
                    attempt_number: 1,
                    score: 2,
                    fully_passed: false,
                    failed_check: Some("Floorplan shape".to_string()),
                    error: None,
                },
                AttemptRow {
                    attempt_number: 2,
                    score: 4,
                    fully_passed: false,
                    failed_check: Some("Camera pose".to_string()),
                    error: None,
                },
            ],
        }
    }

    #[test]
    fn write_summary_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");

        let mut extra = Map::new();
        extra.insert("best_image_url".to_string(), json!("file:///tmp/best.png"));
        write_summary(&path, &summary(), Some(&extra))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["run_id"], json!("run-123"));
        assert_eq!(parsed["room_type"], json!("outdoor"));
        assert_eq!(parsed["best_attempt_number"], json!(2));
        assert_eq!(parsed["attempts"][0]["failed_check"], json!("Floorplan shape"));
        assert_eq!(parsed["best_image_url"], json!("file:///tmp/best.png"));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());
        let pct = parsed["score_pct"].as_f64().unwrap_or_default();
        assert!((pct - 57.142857).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn json_view_carries_score_pct_and_lets_extras_win() -> anyhow::Result<()> {
        let mut extra = Map::new();
        extra.insert("best_image".to_string(), json!("file:///tmp/best.png"));
        extra.insert("stop_reason".to_string(), json!("cancelled"));
        let payload = summary().to_json(Some(&extra))?;
        assert_eq!(payload["best_image"], json!("file:///tmp/best.png"));
        assert_eq!(payload["stop_reason"], json!("cancelled"));
        assert_eq!(payload["score_pct"].as_f64(), Some(summary().score_pct()));
        assert!(payload.get("ts").is_none());
        Ok(())
    }

    #[test]
    fn score_pct_is_zero_without_checks() {
        let mut summary = summary();
        summary.total_checks = 0;
        assert_eq!(summary.score_pct(), 0.0);
    }
}
