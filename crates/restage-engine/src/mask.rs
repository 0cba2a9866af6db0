use std::io::Cursor;

use anyhow::Context;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::config::DEFAULT_MARGIN_RATIO;
use crate::error::PipelineError;

const EDITABLE: Luma<u8> = Luma([255]);
const PRESERVED: Luma<u8> = Luma([0]);

/// Editable interior / preserved border partition of an image.
///
/// The editable region spans `[margin_x, width - margin_x)` horizontally and
/// `[margin_y, height - margin_y)` vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMask {
    pub width: u32,
    pub height: u32,
    pub margin_x: u32,
    pub margin_y: u32,
}

pub fn build_mask(width: u32, height: u32) -> Result<RegionMask, PipelineError> {
    build_mask_with_ratio(width, height, DEFAULT_MARGIN_RATIO)
}

pub fn build_mask_with_ratio(
    width: u32,
    height: u32,
    ratio: f64,
) -> Result<RegionMask, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidDimension {
        width,
        height,
        reason,
    };
    if width == 0 || height == 0 {
        return Err(invalid("dimensions must be positive".to_string()));
    }
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(invalid(format!("margin ratio {ratio} is not usable")));
    }

    let margin_x = (ratio * f64::from(width)).floor() as u32;
    let margin_y = (ratio * f64::from(height)).floor() as u32;
    if u64::from(margin_x) * 2 >= u64::from(width) || u64::from(margin_y) * 2 >= u64::from(height)
    {
        return Err(invalid(format!(
            "margins {margin_x}x{margin_y} leave no editable interior"
        )));
    }

    Ok(RegionMask {
        width,
        height,
        margin_x,
        margin_y,
    })
}

impl RegionMask {
    /// `(x0, y0, x1, y1)` with exclusive upper bounds.
    pub fn editable_bounds(&self) -> (u32, u32, u32, u32) {
        (
            self.margin_x,
            self.margin_y,
            self.width - self.margin_x,
            self.height - self.margin_y,
        )
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        let (x0, y0, x1, y1) = self.editable_bounds();
        (x0..x1).contains(&x) && (y0..y1).contains(&y)
    }

    pub fn editable_area(&self) -> u64 {
        let (x0, y0, x1, y1) = self.editable_bounds();
        u64::from(x1 - x0) * u64::from(y1 - y0)
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.contains(x, y) {
                EDITABLE
            } else {
                PRESERVED
            }
        })
    }

    pub fn to_png(&self) -> anyhow::Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(self.to_gray_image())
            .write_to(&mut out, ImageFormat::Png)
            .context("failed to encode region mask")?;
        Ok(out.into_inner())
    }

    pub fn describe(&self) -> String {
        let (x0, y0, x1, y1) = self.editable_bounds();
        format!(
            "editable region x {x0}..{x1}, y {y0}..{y1} of a {}x{} image",
            self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{build_mask, build_mask_with_ratio, RegionMask};
    use crate::error::PipelineError;

    #[test]
    fn margins_follow_the_fifteen_percent_rule() -> anyhow::Result<()> {
        let mask = build_mask(100, 50)?;
        assert_eq!(mask.margin_x, 15);
        assert_eq!(mask.margin_y, 7);
        assert_eq!(mask.editable_bounds(), (15, 7, 85, 43));
        assert!(mask.contains(15, 7));
        assert!(mask.contains(84, 42));
        assert!(!mask.contains(85, 42));
        assert!(!mask.contains(14, 20));
        assert!(!mask.contains(50, 43));
        Ok(())
    }

    #[test]
    fn interior_is_non_empty_and_smaller_than_the_image() -> anyhow::Result<()> {
        for (width, height) in [(7, 7), (8, 13), (640, 480), (1024, 1536), (4000, 3000)] {
            let mask = build_mask(width, height)?;
            assert_eq!(mask.margin_x, width * 15 / 100);
            assert_eq!(mask.margin_y, height * 15 / 100);
            assert!(mask.editable_area() > 0);
            assert!(mask.editable_area() < u64::from(width) * u64::from(height));
        }
        Ok(())
    }

    #[test]
    fn tiny_images_keep_the_whole_frame_editable() -> anyhow::Result<()> {
        let mask = build_mask(1, 3)?;
        assert_eq!((mask.margin_x, mask.margin_y), (0, 0));
        assert_eq!(mask.editable_area(), 3);
        Ok(())
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let err = build_mask(0, 10).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidDimension { width: 0, height: 10, .. }
        ));
        assert!(build_mask(10, 0).is_err());
    }

    #[test]
    fn oversized_ratio_is_rejected() {
        assert!(matches!(
            build_mask_with_ratio(100, 100, 0.5),
            Err(PipelineError::InvalidDimension { .. })
        ));
        assert!(build_mask_with_ratio(100, 100, -0.1).is_err());
        assert!(build_mask_with_ratio(100, 100, 0.49).is_ok());
    }

    #[test]
    fn gray_rendering_marks_editable_pixels_white() -> anyhow::Result<()> {
        let mask: RegionMask = build_mask(20, 20)?;
        let image = mask.to_gray_image();
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(10, 10).0, [255]);
        let white = image.pixels().filter(|pixel| pixel.0 == [255]).count() as u64;
        assert_eq!(white, mask.editable_area());

        let png = mask.to_png()?;
        let decoded = image::load_from_memory(&png)?;
        assert_eq!((decoded.width(), decoded.height()), (20, 20));
        Ok(())
    }
}
