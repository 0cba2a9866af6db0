//! One generation attempt: a layout-description turn followed by an image
//! edit turn in the same conversation.

use std::fmt::Write as _;
use std::time::Duration;

use restage_contracts::catalog::{DesignStyle, RoomType};
use restage_contracts::runs::feedback::FailureFeedback;

use crate::error::{error_chain_text, PipelineError};
use crate::mask::RegionMask;
use crate::services::{ConversationContext, GenerativeTransformService, ImagePayload};

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub edited_image: ImagePayload,
    pub layout_description: String,
    pub layout_instruction: String,
}

pub struct TransformSession<'a> {
    service: &'a dyn GenerativeTransformService,
    timeout: Duration,
}

impl<'a> TransformSession<'a> {
    pub fn new(service: &'a dyn GenerativeTransformService, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn run(
        &self,
        original: &ImagePayload,
        mask: &RegionMask,
        room_type: RoomType,
        design_style: DesignStyle,
        corrections: &[FailureFeedback],
    ) -> Result<TransformOutput, PipelineError> {
        let layout_instruction = build_layout_instruction(room_type, design_style, mask, corrections);
        let mask_png = mask
            .to_png()
            .map_err(|err| PipelineError::Invariant(error_chain_text(&err, 256)))?;
        let mut context = ConversationContext::new();

        let described = self
            .service
            .converse(
                &mut context,
                &[original.clone(), ImagePayload::png(mask_png)],
                &layout_instruction,
                self.timeout,
            )
            .map_err(|err| PipelineError::generation(1, error_chain_text(&err, 512)))?;
        let layout_description = described
            .text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| PipelineError::generation(1, "no layout description returned"))?;

        let edited = self
            .service
            .converse(
                &mut context,
                &[],
                &build_edit_instruction(room_type, design_style),
                self.timeout,
            )
            .map_err(|err| PipelineError::generation(2, error_chain_text(&err, 512)))?;
        let edited_image = edited
            .image
            .filter(|image| !image.bytes.is_empty())
            .ok_or_else(|| PipelineError::generation(2, "no edited image returned"))?;

        Ok(TransformOutput {
            edited_image,
            layout_description,
            layout_instruction,
        })
    }
}

pub fn build_layout_instruction(
    room_type: RoomType,
    design_style: DesignStyle,
    mask: &RegionMask,
    corrections: &[FailureFeedback],
) -> String {
    let template = room_type.template();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are staging a photo of a {}. {}",
        template.room_label, template.layout_brief
    );
    let _ = writeln!(
        out,
        "Design style: {}. {}",
        design_style.display_name(),
        design_style.description()
    );
    let _ = writeln!(
        out,
        "The second image is a mask: furniture and decor may only be added inside the white \
({}). Black areas must stay pixel-identical.",
        mask.describe()
    );
    out.push_str(
        "Never change walls, doors, windows, floor outline or the camera viewpoint. \
Describe the planned layout in words only; do not produce an image yet.",
    );
    out.push_str(&corrections_block(corrections));
    out
}

pub fn build_edit_instruction(room_type: RoomType, design_style: DesignStyle) -> String {
    format!(
        "{} Apply the {} style. Return the edited photo with the same size and framing as the \
original.",
        room_type.template().edit_brief,
        design_style.display_name()
    )
}

/// Empty when there is nothing to correct.
pub fn corrections_block(corrections: &[FailureFeedback]) -> String {
    if corrections.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nPrevious attempts were rejected by quality review:\n");
    for entry in corrections {
        let _ = writeln!(
            out,
            "- Attempt {}: check '{}' failed because: {}",
            entry.attempt_number, entry.check_name, entry.justification
        );
    }
    out.push_str("Do not repeat any of these specific issues in this attempt.");
    out
}
