// THEORY:
// The `Editor` is the interactive heart of the engine: a small, explicit state
// machine that turns pointer and keyboard intents into polygon mutations.
//
// Key architectural principles:
// 1.  **Two States**: In `Default` the pointer grabs existing handles (move a
//     vertex, pull a new vertex out of an edge, double-click to delete). In `Add`
//     every click appends a vertex to the polygon being drawn and dragging
//     rubber-bands its last vertex.
// 2.  **Commands In, Outcomes Out**: All input arrives as an `EditorCommand`; every
//     transition is handled in one place and reports an `EditOutcome`. No UI
//     toolkit is needed to drive or test it.
// 3.  **Deferred Release**: A button release cannot yet tell a single click from
//     the first half of a double click. `Release` therefore mutates nothing and
//     asks the caller to deliver `Settle` after a short delay. A `DoubleClick`
//     arriving in between raises a suppression flag that swallows the pending
//     settle, so the delete wins over a spurious move.
// 4.  **Rebuild After Every Mutation**: Each mutating transition ends with
//     `RegionModel::rebuild_layer`, which refreshes handles, raster and union.
// 5.  **Silent Misses**: Nothing here can fail. A click with no handle in reach,
//     or a command that does not apply in the current state, is a no-op.

use crate::core_modules::handles::{Handle, HandleKind, find_nearest};
use crate::core_modules::polygon::{Polygon, Vertex};
use crate::core_modules::region_model::{RegionModel, UNION_LAYER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorState {
    /// Grab, move and delete existing geometry.
    #[default]
    Default,
    /// Draw a new polygon on the active layer.
    Add,
}

/// Pointer and keyboard intents, in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    /// Switch the active layer (tab).
    SelectLayer(usize),
    /// Start drawing a new polygon on the active layer.
    BeginPolygon,
    /// Button press.
    Click(Vertex),
    /// Pointer motion with the button held.
    Drag(Vertex),
    /// Button release; answered with `EditOutcome::SettleRequested`.
    Release(Vertex),
    /// The delayed completion of a release.
    Settle(Vertex),
    DoubleClick(Vertex),
    /// Stop drawing and go back to `Default`.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing changed.
    Unchanged,
    /// The given layer and the union were rebuilt.
    Changed { layer: usize },
    /// The caller should deliver `EditorCommand::Settle` with this point once the
    /// settle delay has passed.
    SettleRequested(Vertex),
}

impl EditOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, EditOutcome::Changed { .. })
    }
}

/// Interactive polygon editing state.
#[derive(Debug, Clone)]
pub struct Editor {
    state: EditorState,
    /// The layer being edited; 0 means the read-only union view.
    active_layer: usize,
    /// The handle grabbed by the last click in `Default`.
    drag_target: Option<Handle>,
    /// A `SettleRequested` has been handed out and not yet answered.
    settle_pending: bool,
    /// Raised by a double click while a settle is pending; swallows it.
    suppress_settle: bool,
    /// Hit radius for nearest-handle search, in bins.
    handle_radius: i32,
}

impl Editor {
    pub fn new(handle_radius: i32) -> Self {
        Self {
            state: EditorState::Default,
            active_layer: UNION_LAYER,
            drag_target: None,
            settle_pending: false,
            suppress_settle: false,
            handle_radius,
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn active_layer(&self) -> usize {
        self.active_layer
    }

    pub fn drag_target(&self) -> Option<Handle> {
        self.drag_target
    }

    /// Applies one command to `model`.
    pub fn apply(&mut self, model: &mut RegionModel, command: EditorCommand) -> EditOutcome {
        log::debug!("editor {:?} on layer {}: {:?}", self.state, self.active_layer, command);
        let (width, height) = (model.width(), model.height());
        let clamp = |v: Vertex| v.clamped(width, height);
        match command {
            EditorCommand::SelectLayer(layer) => self.select_layer(model, layer),
            EditorCommand::BeginPolygon => self.begin_polygon(model),
            EditorCommand::Click(at) => {
                if !self.settle_pending {
                    self.suppress_settle = false;
                }
                self.click(model, clamp(at))
            }
            EditorCommand::Drag(at) => self.apply_motion(model, clamp(at)),
            EditorCommand::Release(at) => {
                if self.suppress_settle {
                    EditOutcome::Unchanged
                } else {
                    self.settle_pending = true;
                    EditOutcome::SettleRequested(at)
                }
            }
            EditorCommand::Settle(at) => {
                self.settle_pending = false;
                if self.suppress_settle {
                    self.suppress_settle = false;
                    EditOutcome::Unchanged
                } else {
                    self.apply_motion(model, clamp(at))
                }
            }
            EditorCommand::DoubleClick(at) => self.double_click(model, clamp(at)),
            EditorCommand::Finish => self.finish(model),
        }
    }

    fn select_layer(&mut self, model: &mut RegionModel, layer: usize) -> EditOutcome {
        if layer >= model.layer_count() {
            return EditOutcome::Unchanged;
        }
        self.finish(model);
        self.active_layer = layer;
        self.drag_target = None;
        model.rebuild_layer(layer);
        EditOutcome::Changed { layer }
    }

    fn begin_polygon(&mut self, model: &mut RegionModel) -> EditOutcome {
        let layer = self.active_layer;
        let Some(polygons) = model.polygons_mut(layer) else {
            return EditOutcome::Unchanged;
        };
        self.state = EditorState::Add;
        self.drag_target = None;
        polygons.discard_incomplete_last();
        polygons.push(Polygon::default());
        model.rebuild_layer(layer);
        EditOutcome::Changed { layer }
    }

    fn finish(&mut self, model: &mut RegionModel) -> EditOutcome {
        self.state = EditorState::Default;
        let layer = self.active_layer;
        let discarded = model
            .polygons_mut(layer)
            .is_some_and(|polygons| polygons.discard_incomplete_last());
        if discarded {
            model.rebuild_layer(layer);
            EditOutcome::Changed { layer }
        } else {
            EditOutcome::Unchanged
        }
    }

    fn click(&mut self, model: &mut RegionModel, at: Vertex) -> EditOutcome {
        let layer = self.active_layer;
        if layer == UNION_LAYER {
            return EditOutcome::Unchanged;
        }
        match self.state {
            EditorState::Default => {
                self.drag_target = model
                    .layer(layer)
                    .and_then(|l| find_nearest(l.handles(), at, self.handle_radius));
                EditOutcome::Unchanged
            }
            EditorState::Add => {
                let Some(polygons) = model.polygons_mut(layer) else {
                    return EditOutcome::Unchanged;
                };
                match polygons.last_mut() {
                    Some(polygon) => polygon.vertices.push(at),
                    None => polygons.push(Polygon::new(vec![at])),
                }
                model.rebuild_layer(layer);
                EditOutcome::Changed { layer }
            }
        }
    }

    /// Shared by `Drag` and `Settle`: move the grabbed vertex, promote a grabbed
    /// edge, or rubber-band the polygon being drawn.
    fn apply_motion(&mut self, model: &mut RegionModel, at: Vertex) -> EditOutcome {
        let layer = self.active_layer;
        let Some(polygons) = model.polygons_mut(layer) else {
            return EditOutcome::Unchanged;
        };
        match self.state {
            EditorState::Default => {
                let Some(target) = self.drag_target.filter(|t| t.layer == layer) else {
                    return EditOutcome::Unchanged;
                };
                let Some(polygon) = polygons.get_mut(target.polygon) else {
                    self.drag_target = None;
                    return EditOutcome::Unchanged;
                };
                if target.vertex >= polygon.len() {
                    self.drag_target = None;
                    return EditOutcome::Unchanged;
                }
                match target.kind {
                    HandleKind::Vertex => polygon.vertices[target.vertex] = at,
                    HandleKind::EdgeMidpoint => {
                        polygon.vertices.insert(target.vertex + 1, at);
                        self.drag_target = Some(Handle {
                            position: at,
                            vertex: target.vertex + 1,
                            kind: HandleKind::Vertex,
                            ..target
                        });
                    }
                }
            }
            EditorState::Add => match polygons.last_mut().and_then(|p| p.vertices.last_mut()) {
                Some(last) => *last = at,
                None => return EditOutcome::Unchanged,
            },
        }
        model.rebuild_layer(layer);
        EditOutcome::Changed { layer }
    }

    fn double_click(&mut self, model: &mut RegionModel, at: Vertex) -> EditOutcome {
        // Only a release still waiting for its settle can be cancelled.
        self.suppress_settle = self.settle_pending;
        self.drag_target = None;
        let layer = self.active_layer;
        if self.state != EditorState::Default || layer == UNION_LAYER {
            return EditOutcome::Unchanged;
        }
        let Some(hit) = model
            .layer(layer)
            .and_then(|l| find_nearest(l.handles(), at, self.handle_radius))
        else {
            return EditOutcome::Unchanged;
        };
        let Some(polygons) = model.polygons_mut(layer) else {
            return EditOutcome::Unchanged;
        };
        match hit.kind {
            HandleKind::Vertex => {
                let Some(polygon) = polygons.get_mut(hit.polygon) else {
                    return EditOutcome::Unchanged;
                };
                polygon.vertices.remove(hit.vertex);
                if !polygon.is_committed() {
                    polygons.remove(hit.polygon);
                }
            }
            HandleKind::EdgeMidpoint => {
                polygons.remove(hit.polygon);
            }
        }
        model.rebuild_layer(layer);
        EditOutcome::Changed { layer }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(crate::core_modules::handles::DEFAULT_HANDLE_RADIUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::polygon::PolygonSet;

    fn v(x: i32, y: i32) -> Vertex {
        Vertex::new(x, y)
    }

    fn run(editor: &mut Editor, model: &mut RegionModel, commands: &[EditorCommand]) {
        for command in commands {
            editor.apply(model, *command);
        }
    }

    /// A 40x40 model with layer 1 active and a committed square on it.
    fn square_session() -> (Editor, RegionModel) {
        let mut model = RegionModel::new(40, 40, 2);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Click(v(10, 10)),
                EditorCommand::Click(v(20, 10)),
                EditorCommand::Click(v(20, 20)),
                EditorCommand::Click(v(10, 20)),
                EditorCommand::Finish,
            ],
        );
        (editor, model)
    }

    fn polygons(model: &RegionModel, layer: usize) -> &PolygonSet {
        model.layer(layer).unwrap().polygons()
    }

    #[test]
    fn drawing_commits_a_polygon_and_rasterizes_it() {
        let (editor, model) = square_session();
        assert_eq!(editor.state(), EditorState::Default);
        assert_eq!(polygons(&model, 1).len(), 1);
        assert_eq!(polygons(&model, 1).get(0).unwrap().len(), 4);
        assert_eq!(model.layer(1).unwrap().raster().get(15, 15), 1);
        assert_eq!(model.union_raster().get(15, 15), 1);
        assert_eq!(model.union_raster().get(30, 30), 0);
    }

    #[test]
    fn finishing_with_two_vertices_drops_the_polygon() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Click(v(1, 1)),
                EditorCommand::Click(v(5, 5)),
                EditorCommand::Finish,
            ],
        );
        assert!(polygons(&model, 1).is_empty());
        assert_eq!(model.union_raster().covered_cells(), 0);
    }

    #[test]
    fn begin_polygon_discards_an_incomplete_previous_one() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Click(v(1, 1)),
                EditorCommand::BeginPolygon,
            ],
        );
        assert_eq!(polygons(&model, 1).len(), 1);
        assert!(polygons(&model, 1).get(0).unwrap().is_empty());
        assert_eq!(editor.state(), EditorState::Add);
    }

    #[test]
    fn begin_polygon_on_the_union_layer_is_ignored() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        assert_eq!(editor.apply(&mut model, EditorCommand::BeginPolygon), EditOutcome::Unchanged);
        assert_eq!(editor.state(), EditorState::Default);
    }

    #[test]
    fn drag_in_add_mode_rubber_bands_the_last_vertex() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Drag(v(3, 3)),
                EditorCommand::Click(v(1, 1)),
                EditorCommand::Click(v(5, 1)),
                EditorCommand::Drag(v(6, 2)),
                EditorCommand::Drag(v(7, 3)),
            ],
        );
        let polygon = polygons(&model, 1).get(0).unwrap();
        assert_eq!(polygon.vertices, vec![v(1, 1), v(7, 3)]);
    }

    #[test]
    fn clicked_vertex_follows_the_drag() {
        let (mut editor, mut model) = square_session();
        editor.apply(&mut model, EditorCommand::Click(v(11, 9)));
        assert_eq!(editor.drag_target().unwrap().kind, HandleKind::Vertex);
        editor.apply(&mut model, EditorCommand::Drag(v(5, 5)));
        editor.apply(&mut model, EditorCommand::Drag(v(6, 4)));
        let polygon = polygons(&model, 1).get(0).unwrap();
        assert_eq!(polygon.vertices[0], v(6, 4));
        assert_eq!(polygon.len(), 4);
    }

    #[test]
    fn dragging_an_edge_handle_inserts_exactly_one_vertex() {
        let (mut editor, mut model) = square_session();
        editor.apply(&mut model, EditorCommand::Click(v(15, 11)));
        assert_eq!(editor.drag_target().unwrap().kind, HandleKind::EdgeMidpoint);
        editor.apply(&mut model, EditorCommand::Drag(v(15, 6)));
        editor.apply(&mut model, EditorCommand::Drag(v(15, 4)));
        let polygon = polygons(&model, 1).get(0).unwrap();
        assert_eq!(polygon.vertices, vec![v(10, 10), v(15, 4), v(20, 10), v(20, 20), v(10, 20)]);
        assert_eq!(model.layer(1).unwrap().handles().len(), 10);
    }

    #[test]
    fn release_requests_a_settle_that_applies_the_move() {
        let (mut editor, mut model) = square_session();
        editor.apply(&mut model, EditorCommand::Click(v(20, 20)));
        let outcome = editor.apply(&mut model, EditorCommand::Release(v(22, 23)));
        assert_eq!(outcome, EditOutcome::SettleRequested(v(22, 23)));
        assert_eq!(polygons(&model, 1).get(0).unwrap().vertices[2], v(20, 20));

        let outcome = editor.apply(&mut model, EditorCommand::Settle(v(22, 23)));
        assert_eq!(outcome, EditOutcome::Changed { layer: 1 });
        assert_eq!(polygons(&model, 1).get(0).unwrap().vertices[2], v(22, 23));
    }

    #[test]
    fn double_click_on_vertex_deletes_it_and_suppresses_the_pending_settle() {
        let (mut editor, mut model) = square_session();
        editor.apply(&mut model, EditorCommand::Click(v(20, 20)));
        let first = editor.apply(&mut model, EditorCommand::Release(v(20, 20)));
        let EditOutcome::SettleRequested(pending) = first else {
            panic!("release should defer");
        };
        editor.apply(&mut model, EditorCommand::DoubleClick(v(20, 20)));
        assert_eq!(
            editor.apply(&mut model, EditorCommand::Release(v(20, 20))),
            EditOutcome::Unchanged
        );
        assert_eq!(
            editor.apply(&mut model, EditorCommand::Settle(pending)),
            EditOutcome::Unchanged
        );

        let polygon = polygons(&model, 1).get(0).unwrap();
        assert_eq!(polygon.vertices, vec![v(10, 10), v(20, 10), v(10, 20)]);

        // The flag is consumed: the next release settles normally.
        editor.apply(&mut model, EditorCommand::Click(v(10, 10)));
        assert!(matches!(
            editor.apply(&mut model, EditorCommand::Release(v(12, 12))),
            EditOutcome::SettleRequested(_)
        ));
    }

    #[test]
    fn double_click_without_a_pending_settle_does_not_swallow_later_releases() {
        let (mut editor, mut model) = square_session();
        assert_eq!(
            editor.apply(&mut model, EditorCommand::DoubleClick(v(35, 35))),
            EditOutcome::Unchanged
        );
        let mut grab = v(20, 20);
        for to in [v(25, 25), v(27, 27), v(29, 29)] {
            editor.apply(&mut model, EditorCommand::Click(grab));
            editor.apply(&mut model, EditorCommand::Drag(v(22, 22)));
            let outcome = editor.apply(&mut model, EditorCommand::Release(to));
            assert_eq!(outcome, EditOutcome::SettleRequested(to));
            editor.apply(&mut model, EditorCommand::Settle(to));
            grab = to;
        }
        assert_eq!(polygons(&model, 1).get(0).unwrap().vertices[2], v(29, 29));
    }

    #[test]
    fn finish_reports_whether_a_polygon_was_dropped() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        editor.apply(&mut model, EditorCommand::SelectLayer(1));
        editor.apply(&mut model, EditorCommand::BeginPolygon);
        editor.apply(&mut model, EditorCommand::Click(v(3, 3)));
        assert_eq!(editor.apply(&mut model, EditorCommand::Finish), EditOutcome::Changed { layer: 1 });
        assert_eq!(editor.apply(&mut model, EditorCommand::Finish), EditOutcome::Unchanged);
        assert_eq!(editor.state(), EditorState::Default);
    }

    #[test]
    fn deleting_a_vertex_of_a_triangle_removes_the_polygon() {
        let mut model = RegionModel::new(20, 20, 1);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Click(v(2, 2)),
                EditorCommand::Click(v(2, 12)),
                EditorCommand::Click(v(12, 2)),
                EditorCommand::Finish,
                EditorCommand::DoubleClick(v(2, 12)),
            ],
        );
        assert!(polygons(&model, 1).is_empty());
        assert_eq!(model.union_raster().covered_cells(), 0);
    }

    #[test]
    fn double_click_on_edge_deletes_the_whole_polygon() {
        let (mut editor, mut model) = square_session();
        let outcome = editor.apply(&mut model, EditorCommand::DoubleClick(v(20, 15)));
        assert_eq!(outcome, EditOutcome::Changed { layer: 1 });
        assert!(polygons(&model, 1).is_empty());
    }

    #[test]
    fn misses_are_silent() {
        let (mut editor, mut model) = square_session();
        let before = polygons(&model, 1).clone();
        assert_eq!(editor.apply(&mut model, EditorCommand::Click(v(35, 35))), EditOutcome::Unchanged);
        assert!(editor.drag_target().is_none());
        assert_eq!(editor.apply(&mut model, EditorCommand::Drag(v(1, 1))), EditOutcome::Unchanged);
        assert_eq!(
            editor.apply(&mut model, EditorCommand::DoubleClick(v(35, 35))),
            EditOutcome::Unchanged
        );
        assert_eq!(polygons(&model, 1), &before);
    }

    #[test]
    fn pointer_positions_are_clamped_to_the_grid() {
        let (mut editor, mut model) = square_session();
        editor.apply(&mut model, EditorCommand::Click(v(10, 10)));
        editor.apply(&mut model, EditorCommand::Drag(v(-7, 99)));
        assert_eq!(polygons(&model, 1).get(0).unwrap().vertices[0], v(0, 39));
    }

    #[test]
    fn switching_layers_finishes_the_polygon_in_progress() {
        let mut model = RegionModel::new(20, 20, 2);
        let mut editor = Editor::default();
        run(
            &mut editor,
            &mut model,
            &[
                EditorCommand::SelectLayer(1),
                EditorCommand::BeginPolygon,
                EditorCommand::Click(v(1, 1)),
                EditorCommand::SelectLayer(2),
            ],
        );
        assert!(polygons(&model, 1).is_empty());
        assert_eq!(editor.active_layer(), 2);
        assert_eq!(editor.state(), EditorState::Default);
        assert_eq!(editor.apply(&mut model, EditorCommand::SelectLayer(9)), EditOutcome::Unchanged);
    }
}
