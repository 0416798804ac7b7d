// THEORY:
// This file is the main entry point for the `band_regions` library crate.
//
// The crate turns hand-drawn polygons over a two-channel histogram into a
// classifier. An analyst draws class regions (one layer per class) with the
// `Editor`; every edit rasterizes the affected layer, recomputes the union of all
// classes, and publishes a new `BinMask` that maps any continuous sample pair to
// a class label.
//
// The public surface is the `RegionSession` facade with its `SessionConfig`, the
// `SessionActor` for driving a session from async code (timers included), and the
// `ParallelClassifier` for bulk classification. The building blocks live in
// `core_modules` and are public for callers that want to compose them directly.

pub mod core_modules;
pub mod error;
pub mod parallel_classifier;
pub mod session;
pub mod session_actor;

pub use crate::core_modules::bin_mask::{BandImage, BinGeometry, BinMask, ChannelPair};
pub use crate::core_modules::colors::ColorTable;
pub use crate::core_modules::editor::{EditOutcome, Editor, EditorCommand, EditorState};
pub use crate::core_modules::polygon::{Polygon, PolygonSet, Vertex};
pub use crate::core_modules::raster::LabelRaster;
pub use crate::core_modules::region_file::RegionFile;
pub use crate::error::{RegionError, Result};
pub use crate::parallel_classifier::ParallelClassifier;
pub use crate::session::{LoadOutcome, RegionSession, SessionConfig};
pub use crate::session_actor::{SessionActor, SessionHandle, SessionMessage};
