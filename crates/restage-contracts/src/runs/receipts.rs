use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{CheckResult, DesignStyle, RoomType};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Per-attempt record written next to the attempt's image.
///
/// Image bytes are never embedded; only their path and SHA-256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptReceipt {
    pub schema_version: u64,
    pub run_id: String,
    pub attempt_number: u32,
    pub room_type: RoomType,
    pub design_style: DesignStyle,
    pub layout_instruction: String,
    #[serde(default)]
    pub layout_description: String,
    pub image_path: Option<String>,
    pub image_sha256: Option<String>,
    pub image_mime_type: Option<String>,
    #[serde(default)]
    pub check_results: Vec<CheckResult>,
    pub score: u32,
    pub total_checks: u32,
    pub fully_passed: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub fn write_receipt(path: &Path, receipt: &AttemptReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(receipt)?)?;
    Ok(())
}
