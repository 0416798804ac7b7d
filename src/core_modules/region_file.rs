// THEORY:
// The region file is how an analyst's classes outlive a session. It records the
// channel pair, the bin geometry the polygons were drawn under, and one polygon
// list per class layer (layer 1 first). Vertices are stored as bin indices, so
// loading under a different geometry maps every vertex through value space:
// saved bin -> saved lower-edge value -> current bin.
//
// Key architectural principles:
// 1.  **All or Nothing**: A file for a different channel pair is rejected before
//     anything is touched. Otherwise the whole polygon state is replaced at once.
// 2.  **Forgiving Input**: A missing or unparsable file is not an error, it simply
//     is not there (`read` returns `None`). Layers beyond the session's class
//     count are ignored, and polygons that collapse below three vertices after
//     remapping are dropped.
// 3.  **Human-Readable Output**: Files are written as pretty JSON with four-space
//     indentation so they diff and hand-edit well.

use crate::core_modules::bin_mask::{BinGeometry, ChannelPair};
use crate::core_modules::polygon::{Polygon, PolygonSet, Vertex};
use crate::core_modules::region_model::RegionModel;
use crate::error::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The on-disk region document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFile {
    pub channels: ChannelPair,
    pub x_min: f64,
    pub x_max: f64,
    pub x_step: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub y_step: f64,
    /// One entry per class layer, starting at layer 1.
    pub polygons: Vec<PolygonSet>,
}

impl RegionFile {
    /// Snapshots the committed polygons of every class layer.
    pub fn capture(channels: &ChannelPair, geometry: &BinGeometry, model: &RegionModel) -> Self {
        let polygons = model
            .layers()
            .iter()
            .skip(1)
            .map(|layer| PolygonSet::from_polygons(layer.polygons().committed().cloned().collect()))
            .collect();
        Self {
            channels: channels.clone(),
            x_min: geometry.x_min,
            x_max: geometry.x_max,
            x_step: geometry.x_step,
            y_min: geometry.y_min,
            y_max: geometry.y_max,
            y_step: geometry.y_step,
            polygons,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the file, appending `.json` when the path lacks it. Returns the
    /// path actually written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_json_extension(path.as_ref());
        std::fs::write(&path, self.to_json()?)?;
        log::info!(
            "region for {} saved to {} ({} layers)",
            self.channels,
            path.display(),
            self.polygons.len()
        );
        Ok(path)
    }

    /// Reads a region file. Missing and malformed files yield `None`.
    pub fn read(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("no region file at {}: {err}", path.display());
                return None;
            }
        };
        match Self::from_json(&json) {
            Ok(file) => Some(file),
            Err(err) => {
                log::warn!("ignoring malformed region file {}: {err}", path.display());
                None
            }
        }
    }

    /// Maps the stored polygons into `current`, one set per class layer.
    ///
    /// Fails with `ChannelMismatch` when the file belongs to another channel pair.
    pub fn remap_into(
        self,
        channels: &ChannelPair,
        current: &BinGeometry,
        class_count: usize,
    ) -> Result<Vec<PolygonSet>> {
        if &self.channels != channels {
            return Err(RegionError::ChannelMismatch {
                expected: channels.clone(),
                found: self.channels,
            });
        }
        if self.polygons.len() > class_count {
            log::warn!(
                "region file has {} layers, ignoring all past the first {class_count}",
                self.polygons.len()
            );
        }
        let same_grid = self.x_min == current.x_min
            && self.x_step == current.x_step
            && self.y_min == current.y_min
            && self.y_step == current.y_step;

        let remap = |v: Vertex| -> Vertex {
            if same_grid {
                return v.clamped(current.width, current.height);
            }
            Vertex::new(
                current.bin_x(self.x_min + v.x as f64 * self.x_step) as i32,
                current.bin_y(self.y_min + v.y as f64 * self.y_step) as i32,
            )
        };

        let mut sets: Vec<PolygonSet> = self
            .polygons
            .iter()
            .take(class_count)
            .map(|set| {
                let polygons = set
                    .iter()
                    .map(|p| Polygon::new(p.vertices.iter().copied().map(remap).collect()))
                    .filter(Polygon::is_committed)
                    .collect();
                PolygonSet::from_polygons(polygons)
            })
            .collect();
        sets.resize_with(class_count, PolygonSet::new);
        Ok(sets)
    }
}

fn with_json_extension(path: &Path) -> PathBuf {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}
