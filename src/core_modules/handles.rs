// THEORY:
// Handles are the grab points the analyst can hit with the pointer. Every vertex
// of every polygon yields a vertex handle, and every edge yields a handle at its
// midpoint; grabbing an edge handle is how new vertices get inserted.
//
// The handle list is derived data: it is rebuilt from the `PolygonSet` after
// every mutation and never edited directly. Its order (polygon order, then
// vertex order, vertex handle before the edge handle that starts at it) is what
// makes nearest-handle ties deterministic.

use crate::core_modules::polygon::{PolygonSet, Vertex};

/// Default hit radius in bins.
pub const DEFAULT_HANDLE_RADIUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Sits exactly on a vertex.
    Vertex,
    /// Sits on the midpoint of the edge from `vertex` to the next vertex.
    EdgeMidpoint,
}

/// An editable control point and the polygon element it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Position of the handle on the grid.
    pub position: Vertex,
    /// The layer owning the polygon.
    pub layer: usize,
    /// Index of the polygon inside the layer's `PolygonSet`.
    pub polygon: usize,
    /// For vertex handles, the vertex itself; for edge handles, the edge's start.
    pub vertex: usize,
    pub kind: HandleKind,
}

/// Derives the handle list of one layer.
pub fn build_handles(polygons: &PolygonSet, layer: usize) -> Vec<Handle> {
    let mut handles = Vec::with_capacity(polygons.vertex_count() * 2);
    for (polygon_index, polygon) in polygons.iter().enumerate() {
        let n = polygon.len();
        for (i, vertex) in polygon.vertices.iter().enumerate() {
            let next = polygon.vertices[(i + 1) % n];
            handles.push(Handle {
                position: *vertex,
                layer,
                polygon: polygon_index,
                vertex: i,
                kind: HandleKind::Vertex,
            });
            handles.push(Handle {
                position: vertex.midpoint(&next),
                layer,
                polygon: polygon_index,
                vertex: i,
                kind: HandleKind::EdgeMidpoint,
            });
        }
    }
    handles
}

/// Finds the handle closest to `at`, or `None` when the closest one is farther
/// than `radius`. Ties go to the handle that comes first in the list.
pub fn find_nearest(handles: &[Handle], at: Vertex, radius: i32) -> Option<Handle> {
    let mut best: Option<(i64, &Handle)> = None;
    for handle in handles {
        let d = handle.position.distance_squared(&at);
        if best.is_none_or(|(best_d, _)| d < best_d) {
            best = Some((d, handle));
        }
    }
    let radius = radius as i64;
    best.filter(|(d, _)| *d <= radius * radius).map(|(_, h)| *h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::polygon::Polygon;

    fn square_set() -> PolygonSet {
        PolygonSet::from_polygons(vec![Polygon::from(vec![(10, 10), (20, 10), (20, 20), (10, 20)])])
    }

    #[test]
    fn two_handles_per_vertex_in_polygon_order() {
        let handles = build_handles(&square_set(), 2);
        assert_eq!(handles.len(), 8);
        assert_eq!(handles[0].kind, HandleKind::Vertex);
        assert_eq!(handles[0].position, Vertex::new(10, 10));
        assert_eq!(handles[1].kind, HandleKind::EdgeMidpoint);
        assert_eq!(handles[1].position, Vertex::new(15, 10));
        assert_eq!(handles[7].position, Vertex::new(10, 15));
        assert!(handles.iter().all(|h| h.layer == 2 && h.polygon == 0));
    }

    #[test]
    fn empty_handle_list_never_matches() {
        let handles = build_handles(&PolygonSet::new(), 1);
        assert!(handles.is_empty());
        assert_eq!(find_nearest(&handles, Vertex::new(0, 0), DEFAULT_HANDLE_RADIUS), None);
        assert_eq!(find_nearest(&handles, Vertex::new(100, 100), i32::MAX / 2), None);
    }

    #[test]
    fn nearest_respects_the_radius() {
        let handles = build_handles(&square_set(), 1);
        let hit = find_nearest(&handles, Vertex::new(12, 11), DEFAULT_HANDLE_RADIUS).unwrap();
        assert_eq!(hit.kind, HandleKind::Vertex);
        assert_eq!(hit.vertex, 0);

        // (15, 15) is exactly 5 away from all four edge midpoints: inside the radius.
        assert!(find_nearest(&handles, Vertex::new(15, 15), DEFAULT_HANDLE_RADIUS).is_some());
        assert_eq!(find_nearest(&handles, Vertex::new(30, 30), DEFAULT_HANDLE_RADIUS), None);
    }

    #[test]
    fn ties_go_to_the_earliest_handle() {
        let handles = build_handles(&square_set(), 1);
        let hit = find_nearest(&handles, Vertex::new(15, 15), DEFAULT_HANDLE_RADIUS).unwrap();
        assert_eq!(hit.kind, HandleKind::EdgeMidpoint);
        assert_eq!(hit.vertex, 0);
        assert_eq!(hit.position, Vertex::new(15, 10));
    }
}
