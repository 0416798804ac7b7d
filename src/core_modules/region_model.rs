// THEORY:
// The `RegionModel` is the owner of all per-layer state. It holds `K + 1`
// layers: layer 0 is the synthesized union view used for classification, layers
// `1..=K` are the analyst's classes.
//
// Key architectural principles:
// 1.  **Derived State Is Rebuilt, Not Patched**: A layer's handles and raster are
//     pure functions of its polygons. `rebuild_layer` recomputes both from scratch,
//     then recomputes the union.
// 2.  **Ordered Union**: The union raster starts at zero and visits the class
//     layers in ascending order, each overwriting the cells it covers with its own
//     index. Where classes overlap the highest index wins. This order is policy.
// 3.  **Snapshot Publishing**: Rasters are held behind `Arc`s and replaced whole.
//     Anyone holding a previous `Arc` keeps a complete, consistent grid.

use crate::core_modules::handles::{Handle, build_handles};
use crate::core_modules::polygon::PolygonSet;
use crate::core_modules::raster::{LabelRaster, rasterize};
use std::sync::Arc;

/// Index of the synthesized union layer.
pub const UNION_LAYER: usize = 0;

/// One class (or the union view) with its polygons and derived state.
#[derive(Debug, Clone)]
pub struct Layer {
    polygons: PolygonSet,
    raster: Arc<LabelRaster>,
    handles: Vec<Handle>,
}

impl Layer {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            polygons: PolygonSet::new(),
            raster: Arc::new(LabelRaster::new(width, height)),
            handles: Vec::new(),
        }
    }

    pub fn polygons(&self) -> &PolygonSet {
        &self.polygons
    }

    pub fn raster(&self) -> &Arc<LabelRaster> {
        &self.raster
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }
}

/// All layers of a classification session.
#[derive(Debug, Clone)]
pub struct RegionModel {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}

impl RegionModel {
    /// Creates `class_count + 1` empty layers on a `width` x `height` grid.
    pub fn new(width: u32, height: u32, class_count: usize) -> Self {
        let layers = (0..=class_count).map(|_| Layer::empty(width, height)).collect();
        Self { width, height, layers }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `K + 1`, counting the union layer.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// `K`, the number of user classes.
    pub fn class_count(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The classification lookup table.
    pub fn union_raster(&self) -> Arc<LabelRaster> {
        Arc::clone(&self.layers[UNION_LAYER].raster)
    }

    /// Mutable polygons of a class layer. The union layer is never edited directly.
    pub(crate) fn polygons_mut(&mut self, index: usize) -> Option<&mut PolygonSet> {
        if index == UNION_LAYER {
            return None;
        }
        self.layers.get_mut(index).map(|layer| &mut layer.polygons)
    }

    /// Recomputes handles and raster of one layer, then the union.
    pub fn rebuild_layer(&mut self, index: usize) {
        if index != UNION_LAYER {
            let Some(layer) = self.layers.get_mut(index) else {
                return;
            };
            layer.handles = build_handles(&layer.polygons, index);
            layer.raster = Arc::new(rasterize(&layer.polygons, self.width, self.height, index as u8));
            log::debug!(
                "layer {index} rebuilt: {} polygons, {} cells",
                layer.polygons.len(),
                layer.raster.covered_cells()
            );
        }
        self.recompute_union();
    }

    /// Rebuilds every class layer (highest index first), then the union once.
    pub fn rebuild_all(&mut self) {
        for index in (1..self.layers.len()).rev() {
            let layer = &mut self.layers[index];
            layer.handles = build_handles(&layer.polygons, index);
            layer.raster = Arc::new(rasterize(&layer.polygons, self.width, self.height, index as u8));
        }
        self.recompute_union();
    }

    /// Replaces the polygons of every class layer at once. Missing trailing
    /// layers become empty; extra sets are ignored.
    pub fn replace_all_polygons(&mut self, sets: Vec<PolygonSet>) {
        let mut sets = sets.into_iter();
        for layer in self.layers.iter_mut().skip(1) {
            let mut polygons = sets.next().unwrap_or_default();
            polygons.retain_committed();
            layer.polygons = polygons;
        }
        self.rebuild_all();
    }

    /// Builds a fresh union raster and swaps it in.
    fn recompute_union(&mut self) {
        self.layers[UNION_LAYER].raster = Arc::new(union_of(&self.layers[1..], self.width, self.height));
    }
}

/// Ascending-index overlay of the class rasters; `classes[0]` is layer 1.
fn union_of(classes: &[Layer], width: u32, height: u32) -> LabelRaster {
    let mut union = LabelRaster::new(width, height);
    for (offset, layer) in classes.iter().enumerate() {
        let label = (offset + 1) as u8;
        for y in 0..height {
            for x in 0..width {
                if layer.raster.get(x, y) > 0 {
                    union.set(x, y, label);
                }
            }
        }
    }
    union
}
