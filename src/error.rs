// THEORY:
// Every failure the engine can report lives in one enum. Most of the engine
// cannot fail at all: editing misses, degenerate polygons and missing files
// are ordinary control flow. What remains are genuine rejections (a region or
// sample set recorded against a different channel pair), malformed inputs
// handed over by a caller, and I/O at the persistence boundary.

use crate::core_modules::bin_mask::ChannelPair;

/// Errors surfaced by the classification engine.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// A region file or sample set belongs to a different pair of channels.
    #[error("channel mismatch: session uses {expected}, input uses {found}")]
    ChannelMismatch {
        expected: ChannelPair,
        found: ChannelPair,
    },

    /// Paired inputs do not have the same shape.
    #[error("shape mismatch: {left} values against {right} values")]
    ShapeMismatch { left: usize, right: usize },

    /// Bin geometry cannot describe a usable grid.
    #[error("invalid bin geometry: {0}")]
    InvalidGeometry(String),

    /// Session configuration is out of range.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// A color table does not have one entry per layer.
    #[error("invalid color table: {0}")]
    InvalidColorTable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// A classification worker panicked or was cancelled.
    #[error("classification worker failed: {0}")]
    WorkerFailed(String),

    /// The session actor is gone.
    #[error("session actor has shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, RegionError>;
