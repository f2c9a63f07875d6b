use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::BoundingBox;

pub const DEFAULT_MIN_FACE_SIZE: u32 = 30;
const DEFAULT_CELL_SIZE: u32 = 4;
const MIN_CELL_SKIN_FRACTION: f32 = 0.5;
const MIN_REGION_FILL: f32 = 0.45;
const MIN_ASPECT: f32 = 0.7;
const MAX_ASPECT: f32 = 2.2;
/// Regions covering more of the frame than this are background, not faces.
const MAX_FRAME_COVERAGE: f32 = 0.8;

/// Classical CPU face detector based on skin-tone regions.
///
/// Pixels are classified as skin in YCbCr space, aggregated into a coarse cell
/// grid, and 4-connected groups of skin cells become candidate faces. Candidates
/// are kept when they are large enough, roughly face-shaped (height/width) and
/// mostly filled. Regions spanning most of the frame or touching all four
/// edges are treated as background. The reported confidence is the region
/// fill ratio.
pub struct SkinRegionBackend {
    min_face_size: u32,
    cell_size: u32,
}

impl SkinRegionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_face_size(mut self, min_face_size: u32) -> Self {
        self.min_face_size = min_face_size.max(1);
        self
    }

    fn skin_cells(&self, image: &RgbImage) -> GrayImage {
        let cell = self.cell_size;
        let cols = image.width().div_ceil(cell);
        let rows = image.height().div_ceil(cell);
        let mut skin = vec![0u32; (cols * rows) as usize];
        let mut total = vec![0u32; (cols * rows) as usize];

        for (x, y, pixel) in image.enumerate_pixels() {
            let idx = ((y / cell) * cols + x / cell) as usize;
            total[idx] += 1;
            if is_skin(pixel[0], pixel[1], pixel[2]) {
                skin[idx] += 1;
            }
        }

        GrayImage::from_fn(cols, rows, |col, row| {
            let idx = (row * cols + col) as usize;
            let (s, t) = (skin[idx], total[idx]);
            if t > 0 && s as f32 / t as f32 >= MIN_CELL_SKIN_FRACTION {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn region_to_box(&self, region: &Region, image: &RgbImage) -> Option<BoundingBox> {
        let cell = self.cell_size;
        let x = region.min_col as u32 * cell;
        let y = region.min_row as u32 * cell;
        let x2 = ((region.max_col as u32 + 1) * cell).min(image.width());
        let y2 = ((region.max_row as u32 + 1) * cell).min(image.height());
        let width = x2.saturating_sub(x);
        let height = y2.saturating_sub(y);
        if width < self.min_face_size || height < self.min_face_size {
            return None;
        }

        let (img_w, img_h) = image.dimensions();
        let spans_frame = x == 0 && y == 0 && x2 == img_w && y2 == img_h;
        let coverage = (width as f32 * height as f32) / (img_w as f32 * img_h as f32);
        if spans_frame || coverage > MAX_FRAME_COVERAGE {
            return None;
        }

        let aspect = height as f32 / width as f32;
        if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
            return None;
        }

        let grid_cells =
            (region.max_col - region.min_col + 1) * (region.max_row - region.min_row + 1);
        let fill = region.cells as f32 / grid_cells as f32;
        if fill < MIN_REGION_FILL {
            return None;
        }

        Some(BoundingBox::new(x, y, width, height, fill.min(1.0)))
    }
}

impl Default for SkinRegionBackend {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

impl FaceDetectorBackend for SkinRegionBackend {
    fn name(&self) -> &'static str {
        "skin"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let mask = self.skin_cells(image);
        let boxes = connected_regions(&mask)
            .iter()
            .filter_map(|region| self.region_to_box(region, image))
            .collect();
        Ok(boxes)
    }
}

#[derive(Clone, Copy)]
struct Region {
    min_col: usize,
    min_row: usize,
    max_col: usize,
    max_row: usize,
    cells: usize,
}

/// 4-connected components of set cells, in order of their first cell in scan
/// order.
fn connected_regions(mask: &GrayImage) -> Vec<Region> {
    let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut regions: Vec<Option<Region>> = vec![None; count];

    for (col, row, label) in labels.enumerate_pixels() {
        let Some(slot) = (label[0] as usize).checked_sub(1) else {
            continue;
        };
        let (col, row) = (col as usize, row as usize);
        let region = regions[slot].get_or_insert(Region {
            min_col: col,
            min_row: row,
            max_col: col,
            max_row: row,
            cells: 0,
        });
        region.cells += 1;
        region.min_col = region.min_col.min(col);
        region.max_col = region.max_col.max(col);
        region.min_row = region.min_row.min(row);
        region.max_row = region.max_row.max(row);
    }
    regions.into_iter().flatten().collect()
}

/// Chai & Ngan skin chroma range in YCbCr, ignoring very dark pixels.
fn is_skin(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    y > 40.0 && (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}
