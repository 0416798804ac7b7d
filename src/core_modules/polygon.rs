// THEORY:
// The `polygon` module is the pure data layer of the editor. A `Vertex` is a
// cell address on the histogram grid, a `Polygon` is an ordered ring of vertices,
// and a `PolygonSet` is the ordered list of polygons belonging to one class layer.
//
// Key architectural principles:
// 1.  **Dumb Containers**: Nothing here knows about rasters, handles or editing
//     modes. The types only expose the small set of mutations the `Editor` needs
//     (append, replace, insert, remove) and never derive state of their own.
// 2.  **Commit Threshold**: A polygon only "counts" once it has three vertices.
//     Shorter rings are works in progress: they are kept in the set while the
//     analyst is drawing, skipped by the rasterizer, and discarded by the editor
//     whenever drawing stops.
// 3.  **Wire Shape**: The serde representation is exactly the nested-array form of
//     the region file: a vertex is `[x, y]`, a polygon is a list of vertices, a set
//     is a list of polygons.

use serde::{Deserialize, Serialize};

/// The minimum number of vertices for a polygon to be committed.
pub const MIN_COMMITTED_VERTICES: usize = 3;

/// A cell address on the histogram grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance, kept in integers so hit-testing is exact.
    pub fn distance_squared(&self, other: &Vertex) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }

    /// The integer midpoint of a segment, rounded towards negative infinity.
    pub fn midpoint(&self, other: &Vertex) -> Vertex {
        Vertex {
            x: (self.x + other.x).div_euclid(2),
            y: (self.y + other.y).div_euclid(2),
        }
    }

    /// Pulls the vertex inside a `width` x `height` grid.
    pub fn clamped(&self, width: u32, height: u32) -> Vertex {
        Vertex {
            x: self.x.clamp(0, width.saturating_sub(1) as i32),
            y: self.y.clamp(0, height.saturating_sub(1) as i32),
        }
    }
}

impl From<[i32; 2]> for Vertex {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Vertex> for [i32; 2] {
    fn from(v: Vertex) -> Self {
        [v.x, v.y]
    }
}

impl From<(i32, i32)> for Vertex {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// An ordered ring of vertices. The closing edge from the last vertex back to
/// the first is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub vertices: Vec<Vertex>,
}

impl Polygon {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// A committed polygon takes part in rasterization and persistence.
    pub fn is_committed(&self) -> bool {
        self.vertices.len() >= MIN_COMMITTED_VERTICES
    }

    /// Iterates the edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

impl From<Vec<(i32, i32)>> for Polygon {
    fn from(points: Vec<(i32, i32)>) -> Self {
        Self::new(points.into_iter().map(Vertex::from).collect())
    }
}

/// The ordered polygons of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolygonSet {
    polygons: Vec<Polygon>,
}

impl PolygonSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Polygon> {
        self.polygons.iter()
    }

    /// Only the polygons that are rasterized and saved.
    pub fn committed(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons.iter().filter(|p| p.is_committed())
    }

    pub fn get(&self, index: usize) -> Option<&Polygon> {
        self.polygons.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Polygon> {
        self.polygons.get_mut(index)
    }

    pub fn last(&self) -> Option<&Polygon> {
        self.polygons.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Polygon> {
        self.polygons.last_mut()
    }

    pub fn push(&mut self, polygon: Polygon) {
        self.polygons.push(polygon);
    }

    pub fn remove(&mut self, index: usize) -> Option<Polygon> {
        (index < self.polygons.len()).then(|| self.polygons.remove(index))
    }

    /// Drops the trailing polygon if it never reached the commit threshold.
    /// Returns whether anything was discarded.
    pub fn discard_incomplete_last(&mut self) -> bool {
        match self.polygons.last() {
            Some(last) if !last.is_committed() => {
                self.polygons.pop();
                true
            }
            _ => false,
        }
    }

    /// Removes every work-in-progress polygon. Used when polygons arrive from
    /// outside the editor.
    pub fn retain_committed(&mut self) {
        self.polygons.retain(Polygon::is_committed);
    }

    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(Polygon::len).sum()
    }
}

impl From<Vec<Polygon>> for PolygonSet {
    fn from(polygons: Vec<Polygon>) -> Self {
        Self::from_polygons(polygons)
    }
}
