//! Overlay compositor.
//!
//! Produces one RGBA raster at the photo's true resolution from the mask
//! store, the selection state and the show-all flag. Pure: identical inputs
//! yield byte-identical output, so a raster can be rebuilt on any state
//! change without caring about the previous contents.

use crate::masks::MaskStore;
use crate::selection::{Rgb, SelectionState};

/// Alpha for regions the backend has already painted.
pub const ALPHA_APPLIED: u8 = 180;
/// Alpha for regions in the pending selection.
pub const ALPHA_PENDING: u8 = 128;
/// Alpha for regions visible only because show-all is on.
pub const ALPHA_SHOW_ALL: u8 = 80;

/// Finished overlay raster, RGBA8 row-major at true resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl OverlayRaster {
    fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }
}

/// Deterministic tint for a region shown only under show-all. A fixed
/// integer mix of the index keeps colors stable across redraws while staying
/// distinguishable between neighboring indices.
pub fn region_tint(index: usize) -> Rgb {
    let mut h = (index as u64).wrapping_add(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    [(h >> 16) as u8, (h >> 8) as u8, h as u8]
}

/// Rasterize every visible region into a single overlay.
///
/// Visible regions are drawn largest-area first so that smaller, more
/// specific regions overwrite them where bitmaps overlap. State precedence
/// per region: applied color beats pending color beats show-all tint.
/// Regions whose bitmap failed to decode are skipped.
pub fn composite_overlay(
    store: &MaskStore,
    selection: &SelectionState,
    show_all: bool,
    active_color: Rgb,
) -> OverlayRaster {
    let dimensions = store.dimensions();
    let mut raster = OverlayRaster::transparent(dimensions.width, dimensions.height);
    if dimensions.pixel_count() == 0 {
        return raster;
    }

    let mut visible: Vec<(usize, u64)> = store
        .iter()
        .filter(|(index, _)| {
            show_all || selection.is_pending(*index) || selection.applied_color(*index).is_some()
        })
        .map(|(index, mask)| (index, mask.area))
        .collect();

    // Stable sort: equal areas keep index order.
    visible.sort_by(|a, b| b.1.cmp(&a.1));

    for (index, _) in visible {
        let Some(mask) = store.get(index) else {
            continue;
        };
        if !mask.is_decoded(dimensions) {
            continue;
        }

        let (color, alpha) = if let Some(applied) = selection.applied_color(index) {
            (applied, ALPHA_APPLIED)
        } else if selection.is_pending(index) {
            (active_color, ALPHA_PENDING)
        } else {
            (region_tint(index), ALPHA_SHOW_ALL)
        };

        for (pixel, &member) in raster
            .pixels
            .chunks_exact_mut(4)
            .zip(mask.membership.iter())
        {
            if member != 0 {
                pixel[0] = color[0];
                pixel[1] = color[1];
                pixel[2] = color[2];
                pixel[3] = alpha;
            }
        }
    }

    raster
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::{Dimensions, MaskStore, RegionMask};
    use crate::selection::ClickModifier;

    fn mask(dimensions: Dimensions, members: &[(u32, u32)]) -> RegionMask {
        let mut membership = vec![0u8; dimensions.pixel_count()];
        for &(x, y) in members {
            membership[(y * dimensions.width + x) as usize] = 1;
        }
        RegionMask {
            membership,
            area: members.len() as u64,
            bbox: [0.0; 4],
            point_coords: Vec::new(),
        }
    }

    fn pixel(raster: &OverlayRaster, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * raster.width + x) * 4) as usize;
        raster.pixels[idx..idx + 4].try_into().expect("bad index")
    }

    fn two_region_store() -> (MaskStore, Dimensions) {
        let dims = Dimensions::new(3, 1);
        let mut store = MaskStore::default();
        store.load(
            vec![
                // Region 0 covers all three pixels, region 1 only the middle.
                mask(dims, &[(0, 0), (1, 0), (2, 0)]),
                mask(dims, &[(1, 0)]),
            ],
            dims,
        );
        (store, dims)
    }

    #[test]
    fn empty_store_gives_empty_raster() {
        let raster = composite_overlay(
            &MaskStore::default(),
            &SelectionState::new(),
            true,
            [255, 0, 0],
        );
        assert!(raster.pixels.is_empty());
    }

    #[test]
    fn unselected_regions_are_invisible_without_show_all() {
        let (store, _) = two_region_store();
        let raster = composite_overlay(&store, &SelectionState::new(), false, [255, 0, 0]);
        assert!(raster.pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn pending_region_uses_active_color_at_pending_alpha() {
        let (store, _) = two_region_store();
        let mut selection = SelectionState::new();
        selection.resolve_click(&[1], ClickModifier::Replace);

        let raster = composite_overlay(&store, &selection, false, [10, 20, 30]);
        assert_eq!(pixel(&raster, 1, 0), [10, 20, 30, ALPHA_PENDING]);
        assert_eq!(pixel(&raster, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn smaller_region_wins_where_bitmaps_overlap() {
        let (store, _) = two_region_store();
        let mut selection = SelectionState::new();
        selection.resolve_click(&[0], ClickModifier::Replace);
        selection.commit([200, 0, 0]);
        selection.resolve_click(&[1], ClickModifier::Replace);

        let raster = composite_overlay(&store, &selection, false, [0, 0, 250]);
        // Overlapping middle pixel belongs to the smaller region 1.
        assert_eq!(pixel(&raster, 1, 0), [0, 0, 250, ALPHA_PENDING]);
        assert_eq!(pixel(&raster, 0, 0), [200, 0, 0, ALPHA_APPLIED]);
        assert_eq!(pixel(&raster, 2, 0), [200, 0, 0, ALPHA_APPLIED]);
    }

    #[test]
    fn show_all_renders_every_region_with_stable_tints() {
        let (store, _) = two_region_store();
        let raster = composite_overlay(&store, &SelectionState::new(), true, [255, 0, 0]);

        let tint0 = region_tint(0);
        let tint1 = region_tint(1);
        assert_eq!(pixel(&raster, 0, 0), [tint0[0], tint0[1], tint0[2], ALPHA_SHOW_ALL]);
        assert_eq!(pixel(&raster, 1, 0), [tint1[0], tint1[1], tint1[2], ALPHA_SHOW_ALL]);
        assert_ne!(tint0, tint1);
    }

    #[test]
    fn compositing_is_deterministic() {
        let (store, _) = two_region_store();
        let mut selection = SelectionState::new();
        selection.resolve_click(&[0], ClickModifier::Replace);

        let first = composite_overlay(&store, &selection, true, [1, 2, 3]);
        let second = composite_overlay(&store, &selection, true, [1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn undecoded_region_is_skipped_not_fatal() {
        let dims = Dimensions::new(2, 1);
        let mut store = MaskStore::default();
        store.load(
            vec![
                RegionMask {
                    membership: Vec::new(),
                    area: 100,
                    bbox: [0.0; 4],
                    point_coords: Vec::new(),
                },
                mask(dims, &[(0, 0)]),
            ],
            dims,
        );

        let raster = composite_overlay(&store, &SelectionState::new(), true, [255, 0, 0]);
        let tint1 = region_tint(1);
        assert_eq!(pixel(&raster, 0, 0), [tint1[0], tint1[1], tint1[2], ALPHA_SHOW_ALL]);
        assert_eq!(pixel(&raster, 1, 0), [0, 0, 0, 0]);
    }
}
