// THEORY:
// Classifying a full scene means millions of independent lookups against one
// immutable `BinMask`. The `ParallelClassifier` splits the samples into
// contiguous slices, classifies each slice on the blocking pool, and stitches the
// results back together in order.
//
// Every worker shares the same `Arc<BinMask>` snapshot, so edits landing while a
// classification is running cannot tear it: the whole batch sees one raster.

use crate::core_modules::bin_mask::BinMask;
use crate::error::{RegionError, Result};
use futures::future::join_all;
use std::sync::Arc;

/// Below this many samples per worker, splitting costs more than it saves.
const MIN_SLICE_LEN: usize = 4096;

#[derive(Debug, Clone)]
pub struct ParallelClassifier {
    workers: usize,
    min_slice_len: usize,
}

impl ParallelClassifier {
    /// One worker per logical CPU.
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get())
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            min_slice_len: MIN_SLICE_LEN,
        }
    }

    /// Overrides the smallest slice handed to a worker.
    pub fn min_slice_len(mut self, len: usize) -> Self {
        self.min_slice_len = len.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Classifies `xs`/`ys` against `mask`; the output is in input order.
    pub async fn classify(&self, mask: Arc<BinMask>, xs: Arc<[f64]>, ys: Arc<[f64]>) -> Result<Vec<u8>> {
        if xs.len() != ys.len() {
            return Err(RegionError::ShapeMismatch { left: xs.len(), right: ys.len() });
        }
        let len = xs.len();
        let slice_len = len.div_ceil(self.workers).max(self.min_slice_len);

        // --- 1. Fan out one blocking task per slice ---
        let tasks = (0..len).step_by(slice_len).map(|start| {
            let end = (start + slice_len).min(len);
            let (mask, xs, ys) = (Arc::clone(&mask), Arc::clone(&xs), Arc::clone(&ys));
            tokio::task::spawn_blocking(move || mask.classify(&xs[start..end], &ys[start..end]))
        });

        // --- 2. Join in slice order and concatenate ---
        let mut labels = Vec::with_capacity(len);
        for joined in join_all(tasks).await {
            let slice = joined.map_err(|err| RegionError::WorkerFailed(err.to_string()))??;
            labels.extend_from_slice(&slice);
        }
        log::debug!("classified {len} samples in slices of {slice_len}");
        Ok(labels)
    }
}

impl Default for ParallelClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::bin_mask::{BinGeometry, ChannelPair};
    use crate::core_modules::polygon::{Polygon, PolygonSet};
    use crate::core_modules::raster::rasterize;

    fn mask() -> Arc<BinMask> {
        let geometry = BinGeometry::from_range((0.0, 1.0), (0.0, 1.0), 64, 64).unwrap();
        let set = PolygonSet::from_polygons(vec![Polygon::from(vec![(5, 5), (50, 10), (30, 60)])]);
        let raster = Arc::new(rasterize(&set, 64, 64, 3));
        Arc::new(BinMask::new(geometry, ChannelPair::new("04", "08"), raster).unwrap())
    }

    fn samples(n: usize) -> (Vec<f64>, Vec<f64>) {
        let xs = (0..n).map(|i| (i * 37 % 1000) as f64 / 1000.0).collect();
        let ys = (0..n).map(|i| (i * 91 % 1000) as f64 / 1000.0).collect();
        (xs, ys)
    }

    #[tokio::test]
    async fn parallel_matches_sequential() {
        let mask = mask();
        let (xs, ys) = samples(10_000);
        let expected = mask.classify(&xs, &ys).unwrap();
        assert!(expected.contains(&3) && expected.contains(&0));

        let classifier = ParallelClassifier::with_workers(4).min_slice_len(100);
        let labels = classifier.classify(mask, xs.into(), ys.into()).await.unwrap();
        assert_eq!(labels, expected);
    }

    #[tokio::test]
    async fn empty_input_gives_empty_output() {
        let labels = ParallelClassifier::new()
            .classify(mask(), Vec::new().into(), Vec::new().into())
            .await
            .unwrap();
        assert!(labels.is_empty());
    }

    #[tokio::test]
    async fn unequal_lengths_are_rejected() {
        let err = ParallelClassifier::new()
            .classify(mask(), vec![0.5, 0.5].into(), vec![0.5].into())
            .await
            .unwrap_err();
        assert!(matches!(err, RegionError::ShapeMismatch { .. }));
    }
}
