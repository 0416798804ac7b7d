// THEORY:
// One display colour per layer, index 0 included (the "unclassified" colour of
// the union view). The table is fixed-size: it is created for a known layer count
// and only ever has its slots overwritten, so a label can always be looked up.
//
// The JSON wire form is `{"colors": [[r, g, b], ...]}`. Loading is forgiving
// the way an analyst's preferences file should be: a missing or unreadable file
// leaves the table alone, and surplus entries are ignored.

use crate::core_modules::raster::LabelRaster;
use crate::error::{RegionError, Result};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Black, then red, green, blue, cyan, magenta, yellow.
pub const DEFAULT_PALETTE: [[u8; 3]; 7] = [
    [0, 0, 0],
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
];

#[derive(Debug, Serialize, Deserialize)]
struct ColorFile {
    colors: Vec<[u8; 3]>,
}

/// Layer-indexed RGB colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    colors: Vec<Rgb<u8>>,
}

impl ColorTable {
    /// A table for `layer_count` layers; the number of colours must match.
    pub fn new(colors: Vec<Rgb<u8>>, layer_count: usize) -> Result<Self> {
        if colors.len() != layer_count {
            return Err(RegionError::InvalidColorTable(format!(
                "{} colours for {} layers",
                colors.len(),
                layer_count
            )));
        }
        Ok(Self { colors })
    }

    /// The default palette sized for `layer_count` layers. Past the seventh
    /// layer the class colours repeat; black stays reserved for layer 0.
    pub fn default_for(layer_count: usize) -> Self {
        let classes = &DEFAULT_PALETTE[1..];
        let colors = (0..layer_count)
            .map(|i| match i {
                0 => Rgb(DEFAULT_PALETTE[0]),
                _ => Rgb(classes[(i - 1) % classes.len()]),
            })
            .collect();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, layer: usize) -> Option<Rgb<u8>> {
        self.colors.get(layer).copied()
    }

    /// Overwrites one slot; out-of-range layers are ignored.
    pub fn set(&mut self, layer: usize, color: Rgb<u8>) -> bool {
        match self.colors.get_mut(layer) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    pub fn colors(&self) -> &[Rgb<u8>] {
        &self.colors
    }

    /// Paints each cell of a label raster with its layer colour.
    pub fn colorize(&self, raster: &LabelRaster) -> RgbImage {
        let fallback = Rgb(DEFAULT_PALETTE[0]);
        RgbImage::from_fn(raster.width(), raster.height(), |x, y| {
            self.get(raster.get(x, y) as usize).unwrap_or(fallback)
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let file = ColorFile {
            colors: self.colors.iter().map(|c| c.0).collect(),
        };
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        file.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Applies the entries of a colour JSON document slot by slot.
    pub fn apply_json(&mut self, json: &str) -> Result<()> {
        let file: ColorFile = serde_json::from_str(json)?;
        if file.colors.len() > self.colors.len() {
            log::warn!(
                "colour file has {} entries, ignoring all past the first {}",
                file.colors.len(),
                self.colors.len()
            );
        }
        for (slot, color) in self.colors.iter_mut().zip(file.colors) {
            *slot = Rgb(color);
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads colours from `path`. Returns whether the table changed; a missing
    /// or malformed file is reported at `warn` and leaves the table as it was.
    pub fn load(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) => {
                log::warn!("no colour file at {}: {err}", path.display());
                return false;
            }
        };
        match self.apply_json(&json) {
            Ok(()) => {
                log::info!("colours loaded from {}", path.display());
                true
            }
            Err(err) => {
                log::warn!("ignoring colour file {}: {err}", path.display());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette_reserves_black_for_the_union() {
        let table = ColorTable::default_for(9);
        assert_eq!(table.len(), 9);
        assert_eq!(table.get(0), Some(Rgb([0, 0, 0])));
        assert_eq!(table.get(1), Some(Rgb([255, 0, 0])));
        assert_eq!(table.get(6), Some(Rgb([255, 255, 0])));
        assert_eq!(table.get(7), Some(Rgb([255, 0, 0])));
        assert_eq!(table.get(9), None);
    }

    #[test]
    fn new_requires_one_colour_per_layer() {
        assert!(ColorTable::new(vec![Rgb([1, 2, 3])], 3).is_err());
        assert!(ColorTable::new(vec![Rgb([1, 2, 3]); 3], 3).is_ok());
    }

    #[test]
    fn json_round_trips_exactly() {
        let mut table = ColorTable::default_for(4);
        table.set(2, Rgb([12, 34, 56]));
        let json = table.to_json().unwrap();
        assert!(json.starts_with("{\n    \"colors\": [\n        [\n            0,"));

        let mut reloaded = ColorTable::new(vec![Rgb([9, 9, 9]); 4], 4).unwrap();
        reloaded.apply_json(&json).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn extra_entries_are_ignored_and_short_files_fill_a_prefix() {
        let mut table = ColorTable::default_for(2);
        table
            .apply_json(r#"{"colors": [[1, 1, 1], [2, 2, 2], [3, 3, 3]]}"#)
            .unwrap();
        assert_eq!(table.colors(), &[Rgb([1, 1, 1]), Rgb([2, 2, 2])]);

        let mut table = ColorTable::default_for(3);
        table.apply_json(r#"{"colors": [[7, 7, 7]]}"#).unwrap();
        assert_eq!(table.get(0), Some(Rgb([7, 7, 7])));
        assert_eq!(table.get(2), Some(Rgb([0, 255, 0])));
    }

    #[test]
    fn missing_or_malformed_files_leave_the_table_alone() {
        let mut table = ColorTable::default_for(3);
        let before = table.clone();
        assert!(!table.load(std::env::temp_dir().join("band_regions_no_such_colors.json")));

        let path = std::env::temp_dir().join("band_regions_bad_colors.json");
        std::fs::write(&path, "{ not json").expect("Error Saving File.");
        assert!(!table.load(&path));
        assert_eq!(table, before);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn colorize_paints_labels() {
        let mut raster = LabelRaster::new(2, 1);
        raster.set(1, 0, 2);
        let image = ColorTable::default_for(3).colorize(&raster);
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([0, 255, 0]));
    }
}
