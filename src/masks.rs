//! Region mask store: the decoded masks returned for the current photo.
//!
//! Masks arrive as base64 PNG bitmaps at the photo's true resolution. They
//! are decoded up front into row-major membership buffers so compositing is
//! a plain synchronous loop. A region whose bitmap cannot be decoded keeps
//! its position with an empty buffer; indices are the identity used by the
//! selection state and the backend, so they must never shift.

use crate::api::MaskPayload;
use crate::datauri::decode_base64_payload;

/// Luma values above this count as mask membership.
pub const MEMBERSHIP_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MaskError {
    #[error("segmentation payload is not valid base64: {0}")]
    BadPayload(String),

    #[error("segmentation bitmap failed to decode: {0}")]
    BadBitmap(String),

    #[error("bitmap is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    DimensionMismatch {
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
}

/// True pixel resolution of the uploaded photo and of every mask bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// One region mask, immutable once decoded.
#[derive(Debug, Clone)]
pub struct RegionMask {
    /// Row-major, one byte per pixel, 1 = inside the region. Empty when the
    /// bitmap failed to decode; such a region is skipped by the compositor.
    pub membership: Vec<u8>,
    pub area: u64,
    pub bbox: [f64; 4],
    pub point_coords: Vec<[f64; 2]>,
}

impl RegionMask {
    pub fn decode(payload: &MaskPayload, dimensions: Dimensions) -> Result<Self, MaskError> {
        let bytes = decode_base64_payload(&payload.segmentation)
            .map_err(|err| MaskError::BadPayload(err.to_string()))?;
        let bitmap = image::load_from_memory(&bytes)
            .map_err(|err| MaskError::BadBitmap(err.to_string()))?
            .to_luma8();

        let (got_w, got_h) = bitmap.dimensions();
        if got_w != dimensions.width || got_h != dimensions.height {
            return Err(MaskError::DimensionMismatch {
                got_w,
                got_h,
                want_w: dimensions.width,
                want_h: dimensions.height,
            });
        }

        let membership = bitmap
            .into_raw()
            .into_iter()
            .map(|luma| u8::from(luma > MEMBERSHIP_THRESHOLD))
            .collect();

        Ok(Self {
            membership,
            area: payload.area,
            bbox: payload.bbox,
            point_coords: payload.point_coords.clone(),
        })
    }

    /// Placeholder for an undecodable bitmap; keeps the index alive.
    fn undecoded(payload: &MaskPayload) -> Self {
        Self {
            membership: Vec::new(),
            area: payload.area,
            bbox: payload.bbox,
            point_coords: payload.point_coords.clone(),
        }
    }

    pub fn is_decoded(&self, dimensions: Dimensions) -> bool {
        self.membership.len() == dimensions.pixel_count()
    }

    pub fn contains(&self, x: u32, y: u32, dimensions: Dimensions) -> bool {
        if x >= dimensions.width || y >= dimensions.height {
            return false;
        }
        let idx = (y as usize) * dimensions.width as usize + x as usize;
        self.membership.get(idx).copied().unwrap_or(0) != 0
    }
}

/// Ordered collection of the current photo's regions. Replaced wholesale on
/// every upload, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct MaskStore {
    regions: Vec<RegionMask>,
    dimensions: Dimensions,
}

impl MaskStore {
    /// Decode every payload and replace the store contents atomically. A
    /// region that fails to decode is kept as an empty placeholder so the
    /// remaining regions keep their server-side indices.
    pub fn from_payloads(payloads: &[MaskPayload], dimensions: Dimensions) -> Self {
        let regions = payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| match RegionMask::decode(payload, dimensions) {
                Ok(mask) => mask,
                Err(err) => {
                    log::warn!("mask {index} skipped: {err}");
                    RegionMask::undecoded(payload)
                }
            })
            .collect();

        Self {
            regions,
            dimensions,
        }
    }

    pub fn load(&mut self, regions: Vec<RegionMask>, dimensions: Dimensions) {
        self.regions = regions;
        self.dimensions = dimensions;
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.dimensions = Dimensions::default();
    }

    pub fn get(&self, index: usize) -> Option<&RegionMask> {
        self.regions.get(index)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RegionMask)> {
        self.regions.iter().enumerate()
    }
}
