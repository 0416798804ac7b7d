// THEORY:
// The `session` module is the top-level, synchronous API of the engine. A
// `RegionSession` bundles everything one classification session needs: the
// layered polygon model, the editor, the colour table, the current classifier
// snapshot, and the optional sample set used for the selection overlay.
//
// Key architectural principles:
// 1.  **Single Owner**: A session is plain owned state with `&mut self` methods.
//     It is driven either directly (tests, batch tools) or from the
//     `SessionActor`, which owns it on one tokio task.
// 2.  **Published Snapshots**: Every mutation that changes the union raster
//     publishes a fresh `Arc<BinMask>` on a `watch` channel. Readers classify
//     against whatever snapshot they hold; nothing is ever mutated under them.
// 3.  **Fixed Frame**: Channel pair, bin geometry and class count are fixed when
//     the session is created. Region files for another channel pair are refused.

use crate::core_modules::bin_mask::{BandImage, BinGeometry, BinMask, ChannelPair};
use crate::core_modules::colors::ColorTable;
use crate::core_modules::editor::{EditOutcome, Editor, EditorCommand};
use crate::core_modules::handles::DEFAULT_HANDLE_RADIUS;
use crate::core_modules::polygon::Vertex;
use crate::core_modules::raster::LabelRaster;
use crate::core_modules::region_file::RegionFile;
use crate::core_modules::region_model::{RegionModel, UNION_LAYER};
use crate::error::{RegionError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Labels are bytes, so at most 255 classes fit next to the unclassified 0.
pub const MAX_CLASSES: usize = u8::MAX as usize;

fn default_handle_radius() -> i32 {
    DEFAULT_HANDLE_RADIUS
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_debounce_interval_ms() -> u64 {
    100
}

/// Configuration for a `RegionSession`, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// The two channels spanning the histogram.
    pub channels: ChannelPair,
    pub geometry: BinGeometry,
    /// Number of user classes (K). The session has K + 1 layers.
    pub class_count: usize,
    /// Hit radius for grabbing handles, in bins.
    #[serde(default = "default_handle_radius")]
    pub handle_radius: i32,
    /// How long a release waits for a possible double click.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Quiet period before a threshold change is applied.
    #[serde(default = "default_debounce_interval_ms")]
    pub debounce_interval_ms: u64,
}

impl SessionConfig {
    pub fn new(channels: ChannelPair, geometry: BinGeometry, class_count: usize) -> Self {
        Self {
            channels,
            geometry,
            class_count,
            handle_radius: default_handle_radius(),
            settle_delay_ms: default_settle_delay_ms(),
            debounce_interval_ms: default_debounce_interval_ms(),
        }
    }

    /// Reads a JSON configuration file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CLASSES).contains(&self.class_count) {
            return Err(RegionError::InvalidConfig(format!(
                "class_count must be between 1 and {MAX_CLASSES}, got {}",
                self.class_count
            )));
        }
        if self.handle_radius < 0 {
            return Err(RegionError::InvalidConfig(format!(
                "handle_radius must not be negative, got {}",
                self.handle_radius
            )));
        }
        self.geometry.validate()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }
}

/// The result of asking a session to load a region file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Polygons were replaced and every layer rebuilt.
    Loaded,
    /// The file was missing or unreadable; nothing changed.
    NoFile,
}

/// Per-pixel samples for the selection overlay: two channel values and a score
/// that is compared against the threshold.
#[derive(Debug, Clone, Default)]
struct SampleSet {
    xs: Vec<f64>,
    ys: Vec<f64>,
    scores: Vec<f64>,
}

/// One interactive classification session.
pub struct RegionSession {
    config: SessionConfig,
    model: RegionModel,
    editor: Editor,
    colors: ColorTable,
    mask: Arc<BinMask>,
    mask_tx: watch::Sender<Arc<BinMask>>,
    samples: Option<SampleSet>,
    threshold: Option<f64>,
    overlay_tx: watch::Sender<Arc<LabelRaster>>,
}

impl RegionSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry;
        let model = RegionModel::new(geometry.width, geometry.height, config.class_count);
        let mask = Arc::new(BinMask::new(geometry, config.channels.clone(), model.union_raster())?);
        let (mask_tx, _) = watch::channel(Arc::clone(&mask));
        let (overlay_tx, _) = watch::channel(Arc::new(LabelRaster::new(geometry.width, geometry.height)));
        log::info!(
            "session for {} with {} classes on a {}x{} grid",
            config.channels,
            config.class_count,
            geometry.width,
            geometry.height
        );
        Ok(Self {
            editor: Editor::new(config.handle_radius),
            colors: ColorTable::default_for(model.layer_count()),
            config,
            model,
            mask,
            mask_tx,
            samples: None,
            threshold: None,
            overlay_tx,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn model(&self) -> &RegionModel {
        &self.model
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut ColorTable {
        &mut self.colors
    }

    /// The current classifier snapshot.
    pub fn mask(&self) -> Arc<BinMask> {
        Arc::clone(&self.mask)
    }

    /// Receives a new snapshot after every change of the union raster.
    pub fn subscribe_mask(&self) -> watch::Receiver<Arc<BinMask>> {
        self.mask_tx.subscribe()
    }

    /// Receives the selection overlay after every applied threshold.
    pub fn subscribe_overlay(&self) -> watch::Receiver<Arc<LabelRaster>> {
        self.overlay_tx.subscribe()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Feeds one editor command through the model and republishes on change.
    pub fn apply(&mut self, command: EditorCommand) -> EditOutcome {
        let outcome = self.editor.apply(&mut self.model, command);
        if outcome.is_changed() {
            self.publish_mask();
        }
        outcome
    }

    fn publish_mask(&mut self) {
        match self.mask.with_raster(self.model.union_raster()) {
            Ok(mask) => {
                self.mask = Arc::new(mask);
                self.mask_tx.send_replace(Arc::clone(&self.mask));
            }
            Err(err) => log::error!("union raster no longer matches the session grid: {err}"),
        }
    }

    /// Classifies paired samples against the current snapshot.
    pub fn classify(&self, xs: &[f64], ys: &[f64]) -> Result<Vec<u8>> {
        self.mask.classify(xs, ys)
    }

    /// Classifies two band images and writes the labels as a greyscale PNG.
    pub fn export_labels(&self, x_band: &BandImage, y_band: &BandImage, path: impl AsRef<Path>) -> Result<()> {
        let labels = LabelRaster::from_image(self.mask.classify_image(x_band, y_band)?);
        labels.save_png(path.as_ref())?;
        log::info!("classified {}x{} pixels into {}", labels.width(), labels.height(), path.as_ref().display());
        Ok(())
    }

    /// The channel values at the lower edge of a bin, for status readouts.
    pub fn value_at(&self, bin: Vertex) -> (f64, f64) {
        self.config.geometry.bin_value(bin.x, bin.y)
    }

    /// Replaces the sample set used by the selection overlay.
    pub fn set_samples(&mut self, xs: Vec<f64>, ys: Vec<f64>, scores: Vec<f64>) -> Result<()> {
        if xs.len() != ys.len() {
            return Err(RegionError::ShapeMismatch { left: xs.len(), right: ys.len() });
        }
        if xs.len() != scores.len() {
            return Err(RegionError::ShapeMismatch {
                left: xs.len(),
                right: scores.len(),
            });
        }
        log::debug!("{} samples loaded for the selection overlay", xs.len());
        self.samples = Some(SampleSet { xs, ys, scores });
        if let Some(threshold) = self.threshold {
            self.apply_threshold(threshold)?;
        }
        Ok(())
    }

    /// Recomputes the overlay of samples whose score is above `threshold`.
    pub fn apply_threshold(&mut self, threshold: f64) -> Result<Arc<LabelRaster>> {
        self.threshold = Some(threshold);
        let geometry = &self.config.geometry;
        let overlay = match &self.samples {
            Some(samples) => {
                let selected: Vec<bool> = samples.scores.iter().map(|&s| s > threshold).collect();
                geometry.occupancy(&samples.xs, &samples.ys, &selected)?
            }
            None => LabelRaster::new(geometry.width, geometry.height),
        };
        let overlay = Arc::new(overlay);
        log::debug!("threshold {threshold} selects {} bins", overlay.covered_cells());
        self.overlay_tx.send_replace(Arc::clone(&overlay));
        Ok(overlay)
    }

    /// Saves every class layer's committed polygons. Returns the path written.
    pub fn save_region(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        RegionFile::capture(&self.config.channels, &self.config.geometry, &self.model).write(path)
    }

    /// Loads a region file, replacing all polygons.
    ///
    /// A missing or malformed file is `NoFile`; a file for another channel pair
    /// is an error. In both cases the session is left untouched.
    pub fn load_region(&mut self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        let Some(file) = RegionFile::read(path.as_ref()) else {
            return Ok(LoadOutcome::NoFile);
        };
        let sets = file.remap_into(&self.config.channels, &self.config.geometry, self.config.class_count)?;
        self.model.replace_all_polygons(sets);
        self.editor.apply(&mut self.model, EditorCommand::SelectLayer(UNION_LAYER));
        self.publish_mask();
        log::info!(
            "region loaded from {}: {} union cells",
            path.as_ref().display(),
            self.model.union_raster().covered_cells()
        );
        Ok(LoadOutcome::Loaded)
    }
}
