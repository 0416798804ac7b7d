// THEORY:
// The `raster` module turns polygons into label grids. A `LabelRaster` is a
// single-channel image whose pixel value is a class label (0 = unclassified),
// laid out so that pixel `(x, y)` is histogram bin `(x, y)`.
//
// Key architectural principles:
// 1.  **Scan Conversion**: `rasterize` is a classic active-edge-table fill. Cell
//     centres sit on integer coordinates; each row gathers the crossings of the
//     edges spanning it (half-open in y so shared vertices are counted once),
//     sorts them, and fills the spans with non-zero winding. The polygon outline
//     is stamped afterwards so boundary cells always belong to the polygon.
// 2.  **Rebuild, Never Patch**: Every call builds a brand-new grid. Callers wrap
//     the result in an `Arc` and swap it in, so readers never see a half-written
//     raster.
// 3.  **Image Interop**: Because the grid is an `image::GrayImage`, label maps can
//     be written straight to PNG for inspection or export.

use crate::core_modules::polygon::{Polygon, PolygonSet, Vertex};
use crate::error::Result;
use image::{GrayImage, ImageEncoder, Luma};
use std::path::Path;

/// A `width` x `height` grid of class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRaster {
    image: GrayImage,
}

impl LabelRaster {
    /// An all-zero (unclassified) raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// The label at bin `(x, y)`. Panics outside the grid, like slice indexing.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }

    pub fn set(&mut self, x: u32, y: u32, label: u8) {
        self.image.put_pixel(x, y, Luma([label]));
    }

    /// Stamps `label` on the cells `x0..=x1` of row `y`.
    fn fill_span(&mut self, y: u32, x0: u32, x1: u32, label: u8) {
        for x in x0..=x1 {
            self.image.put_pixel(x, y, Luma([label]));
        }
    }

    /// Raw labels in row-major order (`index = y * width + x`).
    pub fn labels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Number of cells carrying a nonzero label.
    pub fn covered_cells(&self) -> usize {
        self.image.as_raw().iter().filter(|&&l| l > 0).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Writes the labels as an 8-bit greyscale PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(
            self.image.as_raw(),
            self.width(),
            self.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(())
    }
}

/// One non-horizontal polygon edge in the active edge table.
struct Edge {
    /// First row the edge spans.
    y_top: i32,
    /// First row past the edge (exclusive).
    y_bottom: i32,
    /// x at `y_top`.
    x_top: f64,
    /// dx per row.
    slope: f64,
    /// +1 for downward edges, -1 for upward ones.
    winding: i32,
}

impl Edge {
    fn from_segment(a: Vertex, b: Vertex) -> Option<Self> {
        if a.y == b.y {
            return None;
        }
        let (top, bottom, winding) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
        Some(Self {
            y_top: top.y,
            y_bottom: bottom.y,
            x_top: top.x as f64,
            slope: (bottom.x - top.x) as f64 / (bottom.y - top.y) as f64,
            winding,
        })
    }

    fn x_at(&self, y: i32) -> f64 {
        self.x_top + (y - self.y_top) as f64 * self.slope
    }
}

/// Stamps `label` into every cell covered by the committed polygons of `polygons`.
pub fn rasterize(polygons: &PolygonSet, width: u32, height: u32, label: u8) -> LabelRaster {
    let mut raster = LabelRaster::new(width, height);
    if width == 0 || height == 0 {
        return raster;
    }
    for polygon in polygons.committed() {
        fill_polygon(&mut raster, polygon, label);
        stroke_polygon(&mut raster, polygon, label);
    }
    raster
}

/// Non-zero scan-line fill of one polygon's interior.
fn fill_polygon(raster: &mut LabelRaster, polygon: &Polygon, label: u8) {
    let mut edges: Vec<Edge> = polygon
        .edges()
        .filter_map(|(a, b)| Edge::from_segment(a, b))
        .collect();
    if edges.is_empty() {
        return;
    }
    edges.sort_by_key(|e| e.y_top);

    let max_row = raster.height() as i32 - 1;
    let max_col = raster.width() as i32 - 1;
    let first_row = edges[0].y_top.max(0);
    let last_row = edges
        .iter()
        .map(|e| e.y_bottom - 1)
        .max()
        .unwrap_or(first_row)
        .min(max_row);

    let mut next_edge = 0;
    let mut active: Vec<&Edge> = Vec::new();
    let mut crossings: Vec<(f64, i32)> = Vec::new();

    for y in first_row..=last_row {
        // --- 1. Update the active edge table ---
        while next_edge < edges.len() && edges[next_edge].y_top <= y {
            active.push(&edges[next_edge]);
            next_edge += 1;
        }
        active.retain(|e| e.y_bottom > y);
        if active.is_empty() {
            continue;
        }

        // --- 2. Sorted crossings for this row ---
        crossings.clear();
        crossings.extend(active.iter().map(|e| (e.x_at(y), e.winding)));
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        // --- 3. Fill spans where the winding number is nonzero ---
        let mut winding = 0;
        let mut span_start = 0.0;
        for &(x, w) in &crossings {
            let was_inside = winding != 0;
            winding += w;
            if !was_inside && winding != 0 {
                span_start = x;
            } else if was_inside && winding == 0 {
                let x0 = (span_start.ceil() as i32).max(0);
                let x1 = (x.floor() as i32).min(max_col);
                if x0 <= x1 {
                    raster.fill_span(y as u32, x0 as u32, x1 as u32, label);
                }
            }
        }
    }
}

/// Stamps the outline so boundary cells are always included.
fn stroke_polygon(raster: &mut LabelRaster, polygon: &Polygon, label: u8) {
    let (width, height) = (raster.width() as i32, raster.height() as i32);
    for (a, b) in polygon.edges() {
        let (dx, dy) = ((b.x - a.x) as i64, (b.y - a.y) as i64);
        let steps = dx.abs().max(dy.abs()).max(1);
        for i in 0..=steps {
            let x = lerp_round(a.x as i64, dx, i, steps);
            let y = lerp_round(a.y as i64, dy, i, steps);
            if (0..width).contains(&x) && (0..height).contains(&y) {
                raster.set(x as u32, y as u32, label);
            }
        }
    }
}

/// `start + delta * i / steps`, rounded half up in exact integer arithmetic so an
/// edge stamps the same cells whichever direction it is walked.
fn lerp_round(start: i64, delta: i64, i: i64, steps: i64) -> i32 {
    let numerator = start * steps + delta * i;
    (2 * numerator + steps).div_euclid(2 * steps) as i32
}
