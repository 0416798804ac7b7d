// THEORY:
// The `bin_mask` module turns the union raster into a classifier over continuous
// values. `BinGeometry` is the affine map between channel-value space and
// histogram bins; `BinMask` pairs a geometry with a raster snapshot and the
// channel pair the histogram was built from.
//
// Key architectural principles:
// 1.  **Clamp-Floor Lookup**: A sample maps to `floor((v - min) / step)`, clamped
//     into the grid. Values below the range land in the first bin, values above
//     it in the last. Classification never rejects a value.
// 2.  **Histogram Semantics for Occupancy**: The selection overlay follows the
//     histogram's own binning instead: values outside `[min, max]` are dropped,
//     and `max` itself falls into the last bin.
// 3.  **Immutable Snapshots**: A `BinMask` never changes. A rebuilt union produces
//     a new mask via `with_raster`, and in-flight classifications keep the old one.
// 4.  **Fixed Channel Pair**: A mask only classifies samples of its own channel
//     pair; anything else is a `ChannelMismatch`, never a silent remap.

use crate::core_modules::raster::LabelRaster;
use crate::error::{RegionError, Result};
use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A single-channel `f32` image holding one band's values.
pub type BandImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The identifiers of the two channels spanning the histogram, x first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPair(pub [String; 2]);

impl ChannelPair {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self([x.into(), y.into()])
    }

    pub fn x(&self) -> &str {
        &self.0[0]
    }

    pub fn y(&self) -> &str {
        &self.0[1]
    }
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x(), self.y())
    }
}

/// Maps channel values to histogram bins and back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinGeometry {
    pub x_min: f64,
    pub x_max: f64,
    pub x_step: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub y_step: f64,
    /// Number of bins along x.
    pub width: u32,
    /// Number of bins along y.
    pub height: u32,
}

impl BinGeometry {
    /// Builds a geometry from explicit values and checks it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x_min: f64,
        x_max: f64,
        x_step: f64,
        y_min: f64,
        y_max: f64,
        y_step: f64,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let geometry = Self {
            x_min,
            x_max,
            x_step,
            y_min,
            y_max,
            y_step,
            width,
            height,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Derives the grid size from the value ranges and bin steps.
    pub fn from_bounds(x_min: f64, x_max: f64, x_step: f64, y_min: f64, y_max: f64, y_step: f64) -> Result<Self> {
        let bins = |min: f64, max: f64, step: f64| -> Result<u32> {
            if !(step > 0.0) || !(max > min) {
                return Err(RegionError::InvalidGeometry(format!(
                    "range [{min}, {max}] with step {step} has no bins"
                )));
            }
            // Tolerate ranges that are a whole number of steps up to float noise.
            Ok(((max - min) / step - 1e-9).ceil().max(1.0) as u32)
        };
        let width = bins(x_min, x_max, x_step)?;
        let height = bins(y_min, y_max, y_step)?;
        Self::new(x_min, x_max, x_step, y_min, y_max, y_step, width, height)
    }

    /// Equal-width bins over `[min, max]` on each axis.
    pub fn from_range(x_range: (f64, f64), y_range: (f64, f64), width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RegionError::InvalidGeometry("grid has no bins".into()));
        }
        Self::new(
            x_range.0,
            x_range.1,
            (x_range.1 - x_range.0) / width as f64,
            y_range.0,
            y_range.1,
            (y_range.1 - y_range.0) / height as f64,
            width,
            height,
        )
    }

    /// From histogram bin edges (`bins + 1` ascending values per axis).
    pub fn from_edges(x_edges: &[f64], y_edges: &[f64]) -> Result<Self> {
        let axis = |edges: &[f64]| -> Result<(f64, f64, f64, u32)> {
            match edges {
                [first, second, ..] => {
                    let last = edges[edges.len() - 1];
                    Ok((*first, last, second - first, (edges.len() - 1) as u32))
                }
                _ => Err(RegionError::InvalidGeometry(format!(
                    "need at least two bin edges, got {}",
                    edges.len()
                ))),
            }
        };
        let (x_min, x_max, x_step, width) = axis(x_edges)?;
        let (y_min, y_max, y_step, height) = axis(y_edges)?;
        Self::new(x_min, x_max, x_step, y_min, y_max, y_step, width, height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RegionError::InvalidGeometry(format!(
                "grid is {}x{}",
                self.width, self.height
            )));
        }
        if !(self.x_step > 0.0) || !(self.y_step > 0.0) {
            return Err(RegionError::InvalidGeometry(format!(
                "steps must be positive, got x_step={} y_step={}",
                self.x_step, self.y_step
            )));
        }
        if !self.x_min.is_finite() || !self.y_min.is_finite() {
            return Err(RegionError::InvalidGeometry("minimum values must be finite".into()));
        }
        Ok(())
    }

    /// Clamp-floor bin column of `vx`.
    pub fn bin_x(&self, vx: f64) -> u32 {
        clamp_floor((vx - self.x_min) / self.x_step, self.width)
    }

    /// Clamp-floor bin row of `vy`.
    pub fn bin_y(&self, vy: f64) -> u32 {
        clamp_floor((vy - self.y_min) / self.y_step, self.height)
    }

    pub fn bin_of(&self, vx: f64, vy: f64) -> (u32, u32) {
        (self.bin_x(vx), self.bin_y(vy))
    }

    /// The continuous values at the lower edge of bin `(bx, by)`.
    pub fn bin_value(&self, bx: i32, by: i32) -> (f64, f64) {
        (
            self.x_min + bx as f64 * self.x_step,
            self.y_min + by as f64 * self.y_step,
        )
    }

    /// Histogram-style binning: `None` outside `[min, max]`, `max` goes to the
    /// last bin.
    pub fn histogram_bin(&self, vx: f64, vy: f64) -> Option<(u32, u32)> {
        let bx = histogram_index(vx, self.x_min, self.x_max, self.x_step, self.width)?;
        let by = histogram_index(vy, self.y_min, self.y_max, self.y_step, self.height)?;
        Some((bx, by))
    }

    /// A 0/1 raster of the bins hit by the selected samples.
    pub fn occupancy(&self, xs: &[f64], ys: &[f64], selected: &[bool]) -> Result<LabelRaster> {
        if xs.len() != ys.len() {
            return Err(RegionError::ShapeMismatch { left: xs.len(), right: ys.len() });
        }
        if xs.len() != selected.len() {
            return Err(RegionError::ShapeMismatch {
                left: xs.len(),
                right: selected.len(),
            });
        }
        let mut overlay = LabelRaster::new(self.width, self.height);
        for ((&vx, &vy), _) in xs.iter().zip(ys).zip(selected).filter(|(_, s)| **s) {
            if let Some((bx, by)) = self.histogram_bin(vx, vy) {
                overlay.set(bx, by, 1);
            }
        }
        Ok(overlay)
    }
}

fn clamp_floor(scaled: f64, bins: u32) -> u32 {
    let last = bins.saturating_sub(1) as f64;
    // NaN falls through `clamp` unchanged and casts to 0.
    scaled.floor().clamp(0.0, last) as u32
}

fn histogram_index(v: f64, min: f64, max: f64, step: f64, bins: u32) -> Option<u32> {
    if !(v >= min && v <= max) {
        return None;
    }
    let index = ((v - min) / step).floor() as u32;
    Some(index.min(bins.saturating_sub(1)))
}

/// A classifier over continuous two-channel samples.
#[derive(Debug, Clone)]
pub struct BinMask {
    geometry: BinGeometry,
    channels: ChannelPair,
    raster: Arc<LabelRaster>,
}

impl BinMask {
    /// Fails when the raster does not have the geometry's dimensions.
    pub fn new(geometry: BinGeometry, channels: ChannelPair, raster: Arc<LabelRaster>) -> Result<Self> {
        check_dimensions(&geometry, &raster)?;
        Ok(Self {
            geometry,
            channels,
            raster,
        })
    }

    /// The same mask over a swapped-in raster.
    pub fn with_raster(&self, raster: Arc<LabelRaster>) -> Result<Self> {
        check_dimensions(&self.geometry, &raster)?;
        Ok(Self {
            geometry: self.geometry,
            channels: self.channels.clone(),
            raster,
        })
    }

    pub fn geometry(&self) -> &BinGeometry {
        &self.geometry
    }

    pub fn channels(&self) -> &ChannelPair {
        &self.channels
    }

    pub fn raster(&self) -> &Arc<LabelRaster> {
        &self.raster
    }

    /// The label of a single sample.
    pub fn classify_pair(&self, vx: f64, vy: f64) -> u8 {
        let (bx, by) = self.geometry.bin_of(vx, vy);
        self.raster.get(bx, by)
    }

    /// Labels for paired sample arrays.
    pub fn classify(&self, xs: &[f64], ys: &[f64]) -> Result<Vec<u8>> {
        if xs.len() != ys.len() {
            return Err(RegionError::ShapeMismatch { left: xs.len(), right: ys.len() });
        }
        Ok(xs.iter().zip(ys).map(|(&vx, &vy)| self.classify_pair(vx, vy)).collect())
    }

    /// Like `classify`, but only for samples of this mask's channel pair.
    pub fn classify_for(&self, channels: &ChannelPair, xs: &[f64], ys: &[f64]) -> Result<Vec<u8>> {
        self.check_channels(channels)?;
        self.classify(xs, ys)
    }

    /// Classifies two co-registered band images into a label image.
    pub fn classify_image(&self, x_band: &BandImage, y_band: &BandImage) -> Result<GrayImage> {
        if x_band.dimensions() != y_band.dimensions() {
            return Err(RegionError::ShapeMismatch {
                left: x_band.as_raw().len(),
                right: y_band.as_raw().len(),
            });
        }
        let (width, height) = x_band.dimensions();
        let labels = x_band
            .as_raw()
            .iter()
            .zip(y_band.as_raw())
            .map(|(&vx, &vy)| self.classify_pair(vx as f64, vy as f64))
            .collect();
        GrayImage::from_raw(width, height, labels).ok_or(RegionError::ShapeMismatch {
            left: (width * height) as usize,
            right: x_band.as_raw().len(),
        })
    }

    pub fn check_channels(&self, channels: &ChannelPair) -> Result<()> {
        if channels != &self.channels {
            return Err(RegionError::ChannelMismatch {
                expected: self.channels.clone(),
                found: channels.clone(),
            });
        }
        Ok(())
    }
}

fn check_dimensions(geometry: &BinGeometry, raster: &LabelRaster) -> Result<()> {
    if raster.dimensions() != (geometry.width, geometry.height) {
        return Err(RegionError::InvalidGeometry(format!(
            "raster is {}x{}, geometry expects {}x{}",
            raster.width(),
            raster.height(),
            geometry.width,
            geometry.height
        )));
    }
    Ok(())
}
