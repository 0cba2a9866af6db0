use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba};
use sha2::{Digest, Sha256};

use super::{
    ConversationContext, FidelityChecker, GenerativeTransformService, ImagePayload,
    TransformReply, TurnRole,
};
use crate::verify::answer_options;

/// Offline transform service.
///
/// Turn 1 (with images) answers with a canned layout description; turn 2
/// (text only) tints the editable region of the first image in the
/// conversation, using the second image as the mask when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunTransformService;

impl GenerativeTransformService for DryrunTransformService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn converse(
        &self,
        context: &mut ConversationContext,
        images: &[ImagePayload],
        instruction: &str,
        _timeout: Duration,
    ) -> Result<TransformReply> {
        let reply = if !images.is_empty() {
            TransformReply {
                text: Some(format!(
                    "Dryrun layout: {}",
                    instruction.lines().next().unwrap_or_default().trim()
                )),
                image: None,
            }
        } else {
            let Some(source) = context
                .turns()
                .iter()
                .find(|turn| turn.role == TurnRole::User && !turn.images.is_empty())
            else {
                bail!("dryrun edit turn has no source image in context");
            };
            let edited = tint_editable_region(
                &source.images[0],
                source.images.get(1),
                color_from_text(instruction),
            )?;
            TransformReply {
                text: Some("Dryrun edit applied.".to_string()),
                image: Some(edited),
            }
        };
        context.push_user(instruction, images);
        context.push_model(&reply);
        Ok(reply)
    }
}

/// Offline checker that approves every assertion except the named checks.
#[derive(Debug, Clone, Default)]
pub struct DryrunFidelityChecker {
    rejected_checks: Vec<String>,
}

impl DryrunFidelityChecker {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn rejecting(check_names: &[&str]) -> Self {
        Self {
            rejected_checks: check_names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl FidelityChecker for DryrunFidelityChecker {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn assess(
        &self,
        _original: &ImagePayload,
        _candidate: &ImagePayload,
        assertion: &str,
        _timeout: Duration,
    ) -> Result<String> {
        let Some((positive, negative)) = answer_options(assertion) else {
            bail!("dryrun checker could not find answer options in assertion");
        };
        let rejected = self
            .rejected_checks
            .iter()
            .find(|name| assertion.contains(&format!("Check: {name}")));
        Ok(match rejected {
            Some(name) => format!("{negative}\nDryrun rejects '{name}' by configuration."),
            None => format!("{positive}\nDryrun approves."),
        })
    }
}

fn tint_editable_region(
    source: &ImagePayload,
    mask: Option<&ImagePayload>,
    (r, g, b): (u8, u8, u8),
) -> Result<ImagePayload> {
    let mut image = image::load_from_memory(&source.bytes)
        .context("dryrun could not decode source image")?
        .to_rgba8();
    let mask = match mask {
        Some(mask) => Some(
            image::load_from_memory(&mask.bytes)
                .context("dryrun could not decode mask image")?,
        ),
        None => None,
    };

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let editable = match mask.as_ref() {
            Some(mask) if mask.in_bounds(x, y) => mask.get_pixel(x, y).0[0] > 127,
            Some(_) => false,
            None => true,
        };
        if editable {
            let Rgba([pr, pg, pb, pa]) = *pixel;
            *pixel = Rgba([blend(pr, r), blend(pg, g), blend(pb, b), pa]);
        }
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .context("dryrun could not encode edited image")?;
    Ok(ImagePayload::png(out.into_inner()))
}

fn blend(base: u8, tint: u8) -> u8 {
    ((u16::from(base) + u16::from(tint)) / 2) as u8
}

fn color_from_text(text: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(text.as_bytes());
    (digest[0], digest[1], digest[2])
}
