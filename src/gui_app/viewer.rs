//! Fit-scaling math for the photo canvas.
//!
//! The photo is drawn fit-scaled and centered inside the canvas. Pointer
//! coordinates are mapped back to true image pixels through the same
//! transform, so click targeting and the drawn overlay always agree no
//! matter how the canvas is sized.

use crate::compositor::OverlayRaster;
use crate::masks::Dimensions;

/// Screen placement of the photo inside the canvas: uniform scale (screen
/// pixels per image pixel) plus the centered top-left offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl FitTransform {
    pub fn compute(dimensions: Dimensions, bounds_width: f32, bounds_height: f32) -> Option<Self> {
        if dimensions.width == 0
            || dimensions.height == 0
            || bounds_width <= 0.0
            || bounds_height <= 0.0
        {
            return None;
        }

        let scale_x = bounds_width / dimensions.width as f32;
        let scale_y = bounds_height / dimensions.height as f32;
        let scale = scale_x.min(scale_y);

        let rendered_w = dimensions.width as f32 * scale;
        let rendered_h = dimensions.height as f32 * scale;

        Some(Self {
            scale,
            offset_x: (bounds_width - rendered_w) / 2.0,
            offset_y: (bounds_height - rendered_h) / 2.0,
        })
    }

    pub fn rendered_size(&self, dimensions: Dimensions) -> (f32, f32) {
        (
            dimensions.width as f32 * self.scale,
            dimensions.height as f32 * self.scale,
        )
    }

    /// Map an on-screen cursor position to a true image pixel. Returns
    /// `None` when the cursor falls outside the fitted photo. Rounds to the
    /// nearest pixel and clamps to the image bounds, dividing by the same
    /// scale factor used for drawing.
    pub fn to_image_pixel(
        &self,
        dimensions: Dimensions,
        cursor_x: f32,
        cursor_y: f32,
    ) -> Option<(u32, u32)> {
        let (rendered_w, rendered_h) = self.rendered_size(dimensions);
        let rel_x = cursor_x - self.offset_x;
        let rel_y = cursor_y - self.offset_y;
        if rel_x < 0.0 || rel_y < 0.0 || rel_x > rendered_w || rel_y > rendered_h {
            return None;
        }

        let x = (rel_x / self.scale).round() as u32;
        let y = (rel_y / self.scale).round() as u32;
        Some((
            x.min(dimensions.width.saturating_sub(1)),
            y.min(dimensions.height.saturating_sub(1)),
        ))
    }
}

/// Alpha-blend the overlay onto a copy of the base photo at true
/// resolution. Used for PNG export so the saved file matches the canvas.
pub fn flatten_onto(base_rgba: &[u8], overlay: &OverlayRaster, dimensions: Dimensions) -> Vec<u8> {
    let mut out = base_rgba.to_vec();
    if out.len() != dimensions.pixel_count() * 4 || overlay.pixels.len() != out.len() {
        log::warn!(
            "overlay not flattened: base {} bytes, overlay {} bytes, expected {}",
            out.len(),
            overlay.pixels.len(),
            dimensions.pixel_count() * 4
        );
        return out;
    }

    for (dst, src) in out.chunks_exact_mut(4).zip(overlay.pixels.chunks_exact(4)) {
        let alpha = src[3] as u16;
        if alpha == 0 {
            continue;
        }
        for c in 0..3 {
            let blended = (src[c] as u16 * alpha + dst[c] as u16 * (255 - alpha)) / 255;
            dst[c] = blended as u8;
        }
        dst[3] = 255;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_centers_a_wide_photo_vertically() {
        let dims = Dimensions::new(200, 100);
        let fit = FitTransform::compute(dims, 400.0, 400.0).expect("no transform");
        assert_eq!(fit.scale, 2.0);
        assert_eq!(fit.offset_x, 0.0);
        assert_eq!(fit.offset_y, 100.0);
    }

    #[test]
    fn pixel_mapping_is_independent_of_canvas_size() {
        let dims = Dimensions::new(200, 100);
        let small = FitTransform::compute(dims, 100.0, 100.0).expect("no transform");
        let large = FitTransform::compute(dims, 800.0, 800.0).expect("no transform");

        // The same physical image point, expressed in each canvas's screen
        // coordinates, must resolve to the same true pixel.
        let target = (120u32, 40u32);
        let small_cursor = (
            small.offset_x + target.0 as f32 * small.scale,
            small.offset_y + target.1 as f32 * small.scale,
        );
        let large_cursor = (
            large.offset_x + target.0 as f32 * large.scale,
            large.offset_y + target.1 as f32 * large.scale,
        );

        assert_eq!(
            small.to_image_pixel(dims, small_cursor.0, small_cursor.1),
            Some(target)
        );
        assert_eq!(
            large.to_image_pixel(dims, large_cursor.0, large_cursor.1),
            Some(target)
        );
    }

    #[test]
    fn cursor_outside_the_photo_maps_to_none() {
        let dims = Dimensions::new(100, 100);
        let fit = FitTransform::compute(dims, 300.0, 100.0).expect("no transform");
        // Letterbox margin left of the photo.
        assert_eq!(fit.to_image_pixel(dims, 10.0, 50.0), None);
        assert!(fit.to_image_pixel(dims, 150.0, 50.0).is_some());
    }

    #[test]
    fn mapping_rounds_and_clamps_to_bounds() {
        let dims = Dimensions::new(10, 10);
        let fit = FitTransform::compute(dims, 20.0, 20.0).expect("no transform");
        // 19.9 / 2.0 rounds to 10, clamped onto the last pixel.
        assert_eq!(fit.to_image_pixel(dims, 19.9, 19.9), Some((9, 9)));
        assert_eq!(fit.to_image_pixel(dims, 5.0, 5.0), Some((3, 3)));
    }

    #[test]
    fn flatten_blends_overlay_over_base() {
        let dims = Dimensions::new(1, 1);
        let overlay = OverlayRaster {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };
        let flat = flatten_onto(&[0, 0, 255, 255], &overlay, dims);
        assert_eq!(flat, vec![255, 0, 0, 255]);

        let transparent = OverlayRaster {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 0],
        };
        let flat = flatten_onto(&[0, 0, 255, 255], &transparent, dims);
        assert_eq!(flat, vec![0, 0, 255, 255]);
    }

    #[test]
    fn flatten_ignores_mismatched_buffers() {
        let dims = Dimensions::new(2, 2);
        let overlay = OverlayRaster {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };
        // Overlay raster does not match the base resolution: the base comes
        // back unblended rather than partially painted.
        let base = [9u8, 8, 7, 255];
        assert_eq!(flatten_onto(&base, &overlay, dims), base.to_vec());
    }
}
