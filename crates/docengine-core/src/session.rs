//! Interaction session state machine: move, vertex-drag, edge-drag,
//! resize, rotate, and point-by-point draft authoring.
//!
//! A session snapshots per-entity initial geometry once in
//! `begin_transform` (reusing [`EntitySnapshot`], the same capture type
//! history entries use) and recomputes the live state from that
//! snapshot plus the current cursor position on every `update_transform`
//! call, rather than integrating incremental deltas. That makes ticks
//! idempotent: replaying the same cursor position twice lands on the
//! same geometry. A session is a short-lived, un-grouped analog of a
//! history entry — it keeps its own before-state so `cancel_transform`
//! can restore it directly, while the caller is expected to wrap the
//! whole gesture in a real [`crate::history::HistoryEngine`] entry for
//! undo/redo.
//!
//! Polyline point-pool growth during a drag is not compacted here; the
//! caller should call [`crate::entity_store::EntityStore::compact_point_pool`]
//! once after `commit_transform`, the same way it already does after
//! applying a command buffer.

use crate::constants::MIN_RESIZE_EXTENT;
use crate::entity_store::EntityStore;
use crate::geometry;
use crate::history::EntitySnapshot;
use crate::ident::EntityId;
use crate::protocol::SelectionModifier;
use crate::record::EntityKind;
use crate::text::TextStore;
use docengine_geom::{Aabb, HandleCorner, Vec2, EPSILON};

/// Small screen-space threshold below which a completed gesture commits
/// no change at all, so an accidental micro-drag does not pollute undo.
const DRAG_THRESHOLD_PX: f32 = 3.0;

/// What kind of transform a session is driving.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransformMode {
    /// Translate every selected entity.
    Move,
    /// Move a single vertex of a line-like entity.
    VertexDrag,
    /// Translate a single line-like entity via an edge-handle grab.
    EdgeDrag,
    /// Resize a single rect/circle/polygon entity.
    Resize,
    /// Rotate the selected entities around their shared bounds center.
    Rotate,
    /// Author a new entity point by point.
    Draft,
}

/// Candidate-source priority, ascending. Distance decides the winner
/// first; this only breaks exact ties.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SnapPriority {
    Endpoint,
    Midpoint,
    Center,
    NearestEdge,
    Grid,
}

/// Snap-candidate configuration. Owned by the document engine, not the
/// session, and passed to `update_transform` each tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SnapPolicy {
    pub enabled: bool,
    pub grid_enabled: bool,
    pub grid_size: f32,
    pub tolerance_px: f32,
    pub endpoint: bool,
    pub midpoint: bool,
    pub center: bool,
    /// Snap to the nearest point along any other entity's edges, not
    /// just its endpoints/midpoints.
    pub nearest: bool,
}

impl Default for SnapPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            grid_enabled: false,
            grid_size: 10.0,
            tolerance_px: 6.0,
            endpoint: true,
            midpoint: true,
            center: true,
            nearest: false,
        }
    }
}

/// Wire op code a committed per-entity record carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum TransformOpCode {
    Move = 0,
    VertexSet = 1,
    Resize = 2,
    Rotate = 3,
    SideResize = 4,
}

/// One entity's committed transform, ready for the caller to translate
/// into history/event records.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransformRecord {
    pub id: EntityId,
    pub op: TransformOpCode,
    pub payload: [f32; 4],
}

/// The result of `commit_transform`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformCommit {
    /// The gesture changed nothing (below the drag threshold, or no
    /// live targets).
    None,
    /// Ordinary per-entity transform records.
    Entities(Vec<TransformRecord>),
    /// A draft entity's accumulated waypoints. The caller is responsible
    /// for turning these into a normal upsert, since draft authoring has
    /// no op code of its own in the fixed transform set.
    Draft {
        kind: Option<EntityKind>,
        points: Vec<Vec2>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct TransformTarget {
    id: EntityId,
    before: EntitySnapshot,
    text_anchor: Option<Vec2>,
    text_rotation: Option<f32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ResizeHandle {
    Corner(HandleCorner),
    Side(Side),
}

fn resize_handle_from_index(index: u32) -> Option<ResizeHandle> {
    match index {
        0..=3 => HandleCorner::from_index(index as u8).map(ResizeHandle::Corner),
        4 => Some(ResizeHandle::Side(Side::Top)),
        5 => Some(ResizeHandle::Side(Side::Right)),
        6 => Some(ResizeHandle::Side(Side::Bottom)),
        7 => Some(ResizeHandle::Side(Side::Left)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct ActiveTransform {
    mode: TransformMode,
    targets: Vec<TransformTarget>,
    specific_id: Option<EntityId>,
    handle_or_vertex_index: u32,
    start_world: Vec2,
    start_screen: Vec2,
    last_screen: Vec2,
    view_xy: Vec2,
    view_scale: f32,
    view_size: Vec2,
    selection_aabb: Option<Aabb>,
    pivot: Vec2,
    duplicate_ids: Vec<(EntityId, EntityId)>,
    draft_kind: Option<EntityKind>,
    draft_points: Vec<Vec2>,
    last_snap: Option<Vec2>,
    last_move_delta: Vec2,
    last_vertex_point: Vec2,
    last_resize_aabb: Option<Aabb>,
    last_resize_op: Option<TransformOpCode>,
    last_rotate_delta_rad: f32,
}

impl ActiveTransform {
    fn specific_target(&self) -> Option<&TransformTarget> {
        match self.specific_id {
            Some(id) => self
                .targets
                .iter()
                .find(|t| t.id == id)
                .or_else(|| self.targets.first()),
            None => self.targets.first(),
        }
    }
}

#[derive(Debug, Clone)]
enum SessionPhase {
    Idle,
    Active(ActiveTransform),
}

/// Drives exactly one in-progress transform gesture at a time.
#[derive(Debug, Clone)]
pub struct InteractionSession {
    state: SessionPhase,
}

impl Default for InteractionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionPhase::Idle,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionPhase::Active(_))
    }

    /// Opens a new gesture. Returns `false` (no-op) if a gesture is
    /// already active or no target could be captured.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_transform(
        &mut self,
        store: &mut EntityStore,
        text: &mut TextStore,
        ids: &[EntityId],
        mode: TransformMode,
        specific_id: Option<EntityId>,
        handle_or_vertex_index: u32,
        start_screen_xy: Vec2,
        view_xy: Vec2,
        view_scale: f32,
        view_size: Vec2,
        modifiers: SelectionModifier,
    ) -> bool {
        if self.is_active() {
            return false;
        }
        let view_scale = if view_scale.abs() <= EPSILON { 1.0 } else { view_scale };

        let mut working_ids = ids.to_vec();
        let mut duplicate_ids = Vec::new();
        if matches!(mode, TransformMode::Move) && modifiers.has(SelectionModifier::ALT) {
            let mut clones = Vec::with_capacity(working_ids.len());
            for &id in &working_ids {
                if let Some(clone_id) = clone_entity(store, text, id) {
                    duplicate_ids.push((id, clone_id));
                    clones.push(clone_id);
                }
            }
            working_ids = clones;
        }

        let targets: Vec<TransformTarget> = working_ids
            .iter()
            .filter_map(|&id| capture_target(store, text, id))
            .collect();

        let draft_kind = if matches!(mode, TransformMode::Draft) {
            EntityKind::from_tag(handle_or_vertex_index)
        } else {
            None
        };

        if targets.is_empty() && !matches!(mode, TransformMode::Draft) {
            for (_, clone_id) in &duplicate_ids {
                store.delete(*clone_id);
                text.delete(*clone_id);
            }
            return false;
        }

        let selection_aabb = compute_targets_aabb(&targets);
        let pivot = selection_aabb.map_or(Vec2::ZERO, |aabb| aabb.center());
        let start_world = screen_to_world(start_screen_xy, view_xy, view_scale, view_size);
        let start_screen = clamp_to_viewport(start_screen_xy, view_size);

        self.state = SessionPhase::Active(ActiveTransform {
            mode,
            targets,
            specific_id,
            handle_or_vertex_index,
            start_world,
            start_screen,
            last_screen: start_screen,
            view_xy,
            view_scale,
            view_size,
            selection_aabb,
            pivot,
            duplicate_ids,
            draft_kind,
            draft_points: if matches!(mode, TransformMode::Draft) {
                vec![start_world]
            } else {
                Vec::new()
            },
            last_snap: None,
            last_move_delta: Vec2::ZERO,
            last_vertex_point: start_world,
            last_resize_aabb: None,
            last_resize_op: None,
            last_rotate_delta_rad: 0.0,
        });
        true
    }

    /// Recomputes the live preview from the session's snapshot and the
    /// current cursor position. Returns `false` if no gesture is active.
    pub fn update_transform(
        &mut self,
        store: &mut EntityStore,
        text: &mut TextStore,
        cur_screen_xy: Vec2,
        modifiers: SelectionModifier,
        snap: &SnapPolicy,
    ) -> bool {
        let SessionPhase::Active(active) = &mut self.state else {
            return false;
        };
        let cur_screen = clamp_to_viewport(cur_screen_xy, active.view_size);
        active.last_screen = cur_screen;
        let cur_world = screen_to_world(cur_screen, active.view_xy, active.view_scale, active.view_size);
        let tol_world = snap.tolerance_px / active.view_scale;
        let exclude: Vec<EntityId> = active.targets.iter().map(|t| t.id).collect();

        match active.mode {
            TransformMode::Move | TransformMode::EdgeDrag => {
                let mut delta = cur_world.sub(&active.start_world);
                if modifiers.has(SelectionModifier::SHIFT) {
                    delta = axis_lock(delta);
                }
                active.last_snap = None;
                if snap.enabled && !modifiers.has(SelectionModifier::CTRL) {
                    if let Some((adjustment, candidate)) =
                        snap_move_delta(store, text, &exclude, active.selection_aabb, delta, snap, tol_world)
                    {
                        delta = delta.add(&adjustment);
                        active.last_snap = Some(candidate);
                    }
                }
                active.last_move_delta = delta;
                apply_move(store, text, &active.targets, delta);
            }
            TransformMode::VertexDrag => {
                let mut point = cur_world;
                if modifiers.has(SelectionModifier::SHIFT) {
                    point = snap_vertex_45(active.start_world, point);
                }
                active.last_snap = None;
                if snap.enabled && !modifiers.has(SelectionModifier::CTRL) {
                    if let Some((snapped, _)) = snap_world_point(store, text, &exclude, point, snap, tol_world) {
                        point = snapped;
                        active.last_snap = Some(snapped);
                    }
                }
                active.last_vertex_point = point;
                let target = active.specific_target().cloned();
                apply_vertex_drag(store, target.as_ref(), active.handle_or_vertex_index, point);
            }
            TransformMode::Resize => {
                let mut cursor = cur_world;
                active.last_snap = None;
                if snap.enabled && !modifiers.has(SelectionModifier::CTRL) {
                    if let Some((snapped, _)) = snap_world_point(store, text, &exclude, cursor, snap, tol_world) {
                        cursor = snapped;
                        active.last_snap = Some(snapped);
                    }
                }
                let target = active.specific_target().cloned();
                let result = apply_resize(store, target.as_ref(), active.handle_or_vertex_index, cursor);
                active.last_resize_aabb = result.map(|(aabb, _)| aabb);
                active.last_resize_op = result.map(|(_, op)| op);
            }
            TransformMode::Rotate => {
                let pivot = active.pivot;
                let start_vec = active.start_world.sub(&pivot);
                let cur_vec = cur_world.sub(&pivot);
                if start_vec.length_squared() > EPSILON && cur_vec.length_squared() > EPSILON {
                    let start_angle = start_vec.y().atan2(start_vec.x());
                    let cur_angle = cur_vec.y().atan2(cur_vec.x());
                    let mut delta_rad = cur_angle - start_angle;
                    if modifiers.has(SelectionModifier::SHIFT) {
                        delta_rad = snap_45(delta_rad);
                    }
                    active.last_rotate_delta_rad = delta_rad;
                    apply_rotate(store, text, &active.targets, pivot, delta_rad);
                }
            }
            TransformMode::Draft => {
                if let Some(last) = active.draft_points.last_mut() {
                    *last = cur_world;
                }
            }
        }
        true
    }

    /// Freezes the current rubber-band point and starts a new one. Only
    /// meaningful in [`TransformMode::Draft`].
    pub fn add_draft_vertex(&mut self, screen_xy: Vec2) -> bool {
        let SessionPhase::Active(active) = &mut self.state else {
            return false;
        };
        if !matches!(active.mode, TransformMode::Draft) {
            return false;
        }
        let world = screen_to_world(screen_xy, active.view_xy, active.view_scale, active.view_size);
        active.draft_points.push(world);
        true
    }

    /// The last snap target the most recent `update_transform` landed
    /// on, for overlay feedback. `None` while idle or unsnapped.
    #[must_use]
    pub fn active_snap(&self) -> Option<Vec2> {
        match &self.state {
            SessionPhase::Active(active) => active.last_snap,
            SessionPhase::Idle => None,
        }
    }

    /// Finalizes the gesture, returning its committed records and
    /// returning the session to idle. Entities are left at the preview
    /// state `update_transform` last wrote; a sub-threshold drag is
    /// reverted first so no spurious history entry results.
    pub fn commit_transform(&mut self, store: &mut EntityStore, text: &mut TextStore) -> TransformCommit {
        let SessionPhase::Active(active) = std::mem::replace(&mut self.state, SessionPhase::Idle) else {
            return TransformCommit::None;
        };

        if matches!(active.mode, TransformMode::Draft) {
            if active.draft_kind.is_none() || active.draft_points.len() < 2 {
                return TransformCommit::None;
            }
            return TransformCommit::Draft {
                kind: active.draft_kind,
                points: active.draft_points,
            };
        }

        let moved_px = active.last_screen.distance(&active.start_screen);
        if moved_px < DRAG_THRESHOLD_PX {
            revert(store, text, &active);
            return TransformCommit::None;
        }

        let records = match active.mode {
            TransformMode::Move | TransformMode::EdgeDrag => active
                .targets
                .iter()
                .map(|t| TransformRecord {
                    id: t.id,
                    op: TransformOpCode::Move,
                    payload: [active.last_move_delta.x(), active.last_move_delta.y(), 0.0, 0.0],
                })
                .collect(),
            TransformMode::VertexDrag => active
                .specific_target()
                .map(|t| {
                    vec![TransformRecord {
                        id: t.id,
                        op: TransformOpCode::VertexSet,
                        payload: [
                            active.handle_or_vertex_index as f32,
                            active.last_vertex_point.x(),
                            active.last_vertex_point.y(),
                            0.0,
                        ],
                    }]
                })
                .unwrap_or_default(),
            TransformMode::Resize => {
                match (active.specific_target(), active.last_resize_aabb, active.last_resize_op) {
                    (Some(t), Some(aabb), Some(op)) => vec![TransformRecord {
                        id: t.id,
                        op,
                        payload: [aabb.min().x(), aabb.min().y(), aabb.width(), aabb.height()],
                    }],
                    _ => Vec::new(),
                }
            }
            TransformMode::Rotate => {
                let degrees = active.last_rotate_delta_rad.to_degrees();
                active
                    .targets
                    .iter()
                    .map(|t| TransformRecord {
                        id: t.id,
                        op: TransformOpCode::Rotate,
                        payload: [degrees, 0.0, 0.0, 0.0],
                    })
                    .collect()
            }
            TransformMode::Draft => unreachable!("handled above"),
        };

        if records.is_empty() {
            revert(store, text, &active);
            return TransformCommit::None;
        }

        if !active.duplicate_ids.is_empty() {
            let new_selection: Vec<EntityId> = active.duplicate_ids.iter().map(|&(_, clone_id)| clone_id).collect();
            store.set_selection_raw(new_selection);
        }

        TransformCommit::Entities(records)
    }

    /// Abandons the gesture, restoring every target's pre-gesture state
    /// and deleting any duplicate created for an Alt-drag clone. Records
    /// no history.
    pub fn cancel_transform(&mut self, store: &mut EntityStore, text: &mut TextStore) -> bool {
        let SessionPhase::Active(active) = std::mem::replace(&mut self.state, SessionPhase::Idle) else {
            return false;
        };
        revert(store, text, &active);
        true
    }
}

fn revert(store: &mut EntityStore, text: &mut TextStore, active: &ActiveTransform) {
    for target in &active.targets {
        target.before.restore(store, text, target.id);
        if let Some(anchor) = target.text_anchor {
            text.set_position(target.id, anchor);
        }
        if let Some(rotation) = target.text_rotation {
            text.set_rotation(target.id, rotation);
        }
    }
    for &(_, clone_id) in &active.duplicate_ids {
        store.delete(clone_id);
        text.delete(clone_id);
    }
}

fn capture_target(store: &EntityStore, text: &mut TextStore, id: EntityId) -> Option<TransformTarget> {
    let before = EntitySnapshot::capture(store, text, id)?;
    let is_text = matches!(before, EntitySnapshot::Text(..));
    let text_anchor = if is_text { text.position(id) } else { None };
    let text_rotation = if is_text { text.rotation(id) } else { None };
    Some(TransformTarget {
        id,
        before,
        text_anchor,
        text_rotation,
    })
}

fn clone_entity(store: &mut EntityStore, text: &mut TextStore, id: EntityId) -> Option<EntityId> {
    let snapshot = EntitySnapshot::capture(store, text, id)?;
    let new_id = store.allocate_id();
    snapshot.restore(store, text, new_id);
    if let EntitySnapshot::Text(..) = snapshot {
        if let Some(position) = text.position(id) {
            text.set_position(new_id, position);
        }
        if let Some(rotation) = text.rotation(id) {
            text.set_rotation(new_id, rotation);
        }
    }
    Some(new_id)
}

fn compute_targets_aabb(targets: &[TransformTarget]) -> Option<Aabb> {
    targets
        .iter()
        .filter_map(|t| snapshot_aabb(&t.before).or_else(|| t.text_anchor.map(|p| Aabb::new(p, p))))
        .reduce(|a, b| a.union(&b))
}

fn snapshot_aabb(snapshot: &EntitySnapshot) -> Option<Aabb> {
    match snapshot {
        EntitySnapshot::Rect(row, _) => Some(Aabb::new(
            Vec2::new(row.x, row.y),
            Vec2::new(row.x + row.w, row.y + row.h),
        )),
        EntitySnapshot::Line(row, _) | EntitySnapshot::Arrow(row, _) => {
            Some(Aabb::new(Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)))
        }
        EntitySnapshot::Polyline(_, points, _) => Aabb::from_points(points),
        EntitySnapshot::Circle(row, _) | EntitySnapshot::Polygon(row, _) => Some(geometry::ellipse_aabb(row)),
        EntitySnapshot::Text(..) => None,
    }
}

fn clamp_to_viewport(screen: Vec2, view_size: Vec2) -> Vec2 {
    if view_size.x() <= 0.0 || view_size.y() <= 0.0 {
        return screen;
    }
    Vec2::new(
        screen.x().clamp(0.0, view_size.x()),
        screen.y().clamp(0.0, view_size.y()),
    )
}

fn screen_to_world(screen: Vec2, view_xy: Vec2, view_scale: f32, view_size: Vec2) -> Vec2 {
    let clamped = clamp_to_viewport(screen, view_size);
    view_xy.add(&clamped.scale(1.0 / view_scale))
}

fn axis_lock(delta: Vec2) -> Vec2 {
    if delta.x().abs() >= delta.y().abs() {
        Vec2::new(delta.x(), 0.0)
    } else {
        Vec2::new(0.0, delta.y())
    }
}

fn snap_45(radians: f32) -> f32 {
    let step = std::f32::consts::FRAC_PI_4;
    (radians / step).round() * step
}

fn snap_vertex_45(start: Vec2, point: Vec2) -> Vec2 {
    let delta = point.sub(&start);
    let len = delta.length();
    if len <= EPSILON {
        return start;
    }
    let angle = snap_45(delta.y().atan2(delta.x()));
    start.add(&Vec2::new(angle.cos(), angle.sin()).scale(len))
}

// -- snap candidate collection -------------------------------------------

fn push_shape_points(aabb: &Aabb, vertices: Option<&[Vec2]>, policy: &SnapPolicy, out: &mut Vec<(Vec2, SnapPriority)>) {
    match vertices {
        Some(points) => {
            if policy.endpoint {
                out.extend(points.iter().map(|&p| (p, SnapPriority::Endpoint)));
            }
            if policy.midpoint {
                out.extend(points.windows(2).map(|w| (w[0].lerp(&w[1], 0.5), SnapPriority::Midpoint)));
            }
        }
        None => {
            let corners = [
                aabb.min(),
                Vec2::new(aabb.max().x(), aabb.min().y()),
                aabb.max(),
                Vec2::new(aabb.min().x(), aabb.max().y()),
            ];
            if policy.endpoint {
                out.extend(corners.iter().map(|&p| (p, SnapPriority::Endpoint)));
            }
            if policy.midpoint {
                for i in 0..4 {
                    out.push((corners[i].lerp(&corners[(i + 1) % 4], 0.5), SnapPriority::Midpoint));
                }
            }
        }
    }
    if policy.center {
        out.push((aabb.center(), SnapPriority::Center));
    }
}

fn closest_point_on_segment(point: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b.sub(&a);
    let len_sq = ab.length_squared();
    if len_sq <= EPSILON {
        return a;
    }
    let t = point.sub(&a).dot(&ab) / len_sq;
    a.add(&ab.scale(t.clamp(0.0, 1.0)))
}

fn collect_nearest_edge_candidates(
    store: &EntityStore,
    exclude: &[EntityId],
    target: Vec2,
    tol: f32,
    out: &mut Vec<(Vec2, SnapPriority)>,
) {
    for &id in store.draw_order() {
        if exclude.contains(&id) {
            continue;
        }
        let Some(vertices) = geometry::entity_vertices(store, id) else {
            continue;
        };
        for window in vertices.windows(2) {
            let closest = closest_point_on_segment(target, window[0], window[1]);
            if target.distance(&closest) <= tol {
                out.push((closest, SnapPriority::NearestEdge));
            }
        }
    }
}

fn push_grid_candidate(target: Vec2, policy: &SnapPolicy, out: &mut Vec<(Vec2, SnapPriority)>) {
    if !policy.grid_enabled || policy.grid_size <= EPSILON {
        return;
    }
    let grid_point = Vec2::new(
        (target.x() / policy.grid_size).round() * policy.grid_size,
        (target.y() / policy.grid_size).round() * policy.grid_size,
    );
    out.push((grid_point, SnapPriority::Grid));
}

fn best_candidate(candidates: &[(Vec2, SnapPriority)], target: Vec2, tol: f32) -> Option<(Vec2, SnapPriority)> {
    candidates
        .iter()
        .map(|&(p, prio)| (p, prio, target.distance(&p)))
        .filter(|&(_, _, d)| d <= tol)
        .min_by(|a, b| a.2.total_cmp(&b.2).then(a.1.cmp(&b.1)))
        .map(|(p, prio, _)| (p, prio))
}

/// Single-point snap used by vertex-drag and resize: `target` is the
/// one point being moved, matched directly against other entities'
/// endpoint/midpoint/center/nearest-edge points plus the grid.
fn snap_world_point(
    store: &EntityStore,
    text: &TextStore,
    exclude: &[EntityId],
    target: Vec2,
    policy: &SnapPolicy,
    tol_world: f32,
) -> Option<(Vec2, SnapPriority)> {
    let mut candidates = Vec::new();
    for &id in store.draw_order() {
        if exclude.contains(&id) {
            continue;
        }
        let vertices = geometry::entity_vertices(store, id);
        if let Some(aabb) = geometry::entity_aabb(store, text, id) {
            push_shape_points(&aabb, vertices.as_deref(), policy, &mut candidates);
        }
    }
    if policy.nearest {
        collect_nearest_edge_candidates(store, exclude, target, tol_world, &mut candidates);
    }
    push_grid_candidate(target, policy, &mut candidates);
    best_candidate(&candidates, target, tol_world)
}

/// Move snap: matches the dragged selection's own endpoint/midpoint/
/// center reference points (translated by the unsnapped delta) against
/// the same categories of point on other entities, picking whichever
/// (own, candidate) pair is closest within tolerance. Returns the extra
/// adjustment to add to the unsnapped delta, and the candidate point hit.
fn snap_move_delta(
    store: &EntityStore,
    text: &TextStore,
    exclude: &[EntityId],
    selection_aabb: Option<Aabb>,
    unsnapped_delta: Vec2,
    policy: &SnapPolicy,
    tol_world: f32,
) -> Option<(Vec2, Vec2)> {
    let aabb = selection_aabb?;
    let moved = Aabb::new(aabb.min().add(&unsnapped_delta), aabb.max().add(&unsnapped_delta));
    let mut own_points = Vec::new();
    push_shape_points(&moved, None, policy, &mut own_points);
    if own_points.is_empty() {
        return None;
    }

    let mut candidates = Vec::new();
    for &id in store.draw_order() {
        if exclude.contains(&id) {
            continue;
        }
        let vertices = geometry::entity_vertices(store, id);
        if let Some(other_aabb) = geometry::entity_aabb(store, text, id) {
            push_shape_points(&other_aabb, vertices.as_deref(), policy, &mut candidates);
        }
    }

    let mut best: Option<(f32, SnapPriority, Vec2, Vec2)> = None;
    for &(own_point, _) in &own_points {
        for &(cand_point, cand_prio) in &candidates {
            let dist = own_point.distance(&cand_point);
            if dist > tol_world {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_dist, best_prio, _, _)) => {
                    dist < *best_dist || (dist == *best_dist && cand_prio < *best_prio)
                }
            };
            if better {
                best = Some((dist, cand_prio, own_point, cand_point));
            }
        }
        if policy.grid_enabled && policy.grid_size > EPSILON {
            let grid_point = Vec2::new(
                (own_point.x() / policy.grid_size).round() * policy.grid_size,
                (own_point.y() / policy.grid_size).round() * policy.grid_size,
            );
            let dist = own_point.distance(&grid_point);
            if dist <= tol_world {
                let better = match &best {
                    None => true,
                    Some((best_dist, best_prio, _, _)) => {
                        dist < *best_dist || (dist == *best_dist && SnapPriority::Grid < *best_prio)
                    }
                };
                if better {
                    best = Some((dist, SnapPriority::Grid, own_point, grid_point));
                }
            }
        }
    }

    best.map(|(_, _, own_point, candidate)| (candidate.sub(&own_point), candidate))
}

// -- applying a live preview ----------------------------------------------

fn apply_move(store: &mut EntityStore, text: &mut TextStore, targets: &[TransformTarget], delta: Vec2) {
    for target in targets {
        match &target.before {
            EntitySnapshot::Rect(row, header) => {
                let mut r = *row;
                r.x += delta.x();
                r.y += delta.y();
                store.upsert_rect(target.id, r, *header);
            }
            EntitySnapshot::Line(row, header) => {
                let mut r = *row;
                r.ax += delta.x();
                r.ay += delta.y();
                r.bx += delta.x();
                r.by += delta.y();
                store.upsert_line(target.id, r, *header);
            }
            EntitySnapshot::Arrow(row, header) => {
                let mut r = *row;
                r.ax += delta.x();
                r.ay += delta.y();
                r.bx += delta.x();
                r.by += delta.y();
                store.upsert_arrow(target.id, r, *header);
            }
            EntitySnapshot::Polyline(row, points, header) => {
                let moved: Vec<Vec2> = points.iter().map(|p| p.add(&delta)).collect();
                let (offset, count) = store.push_points(&moved);
                let mut r = *row;
                r.offset = offset;
                r.count = count;
                store.upsert_polyline(target.id, r, *header);
            }
            EntitySnapshot::Circle(row, header) => {
                let mut r = *row;
                r.cx += delta.x();
                r.cy += delta.y();
                store.upsert_circle(target.id, r, *header);
            }
            EntitySnapshot::Polygon(row, header) => {
                let mut r = *row;
                r.cx += delta.x();
                r.cy += delta.y();
                store.upsert_polygon(target.id, r, *header);
            }
            EntitySnapshot::Text(_, header) => {
                if let Some(anchor) = target.text_anchor {
                    text.set_position(target.id, anchor.add(&delta));
                    store.set_header(target.id, *header);
                }
            }
        }
    }
}

fn apply_vertex_drag(
    store: &mut EntityStore,
    target: Option<&TransformTarget>,
    handle_or_vertex_index: u32,
    point: Vec2,
) {
    let Some(target) = target else { return };
    match &target.before {
        EntitySnapshot::Line(row, header) => {
            let mut r = *row;
            if handle_or_vertex_index == 0 {
                r.ax = point.x();
                r.ay = point.y();
            } else {
                r.bx = point.x();
                r.by = point.y();
            }
            store.upsert_line(target.id, r, *header);
        }
        EntitySnapshot::Arrow(row, header) => {
            let mut r = *row;
            if handle_or_vertex_index == 0 {
                r.ax = point.x();
                r.ay = point.y();
            } else {
                r.bx = point.x();
                r.by = point.y();
            }
            store.upsert_arrow(target.id, r, *header);
        }
        EntitySnapshot::Polyline(row, points, header) => {
            let mut pts = points.clone();
            let idx = handle_or_vertex_index as usize;
            if let Some(p) = pts.get_mut(idx) {
                *p = point;
            }
            let (offset, count) = store.push_points(&pts);
            let mut r = *row;
            r.offset = offset;
            r.count = count;
            store.upsert_polyline(target.id, r, *header);
        }
        _ => {}
    }
}

fn resize_from_anchor(anchor: Vec2, cursor: Vec2, min_extent: f32) -> Aabb {
    let mut dx = cursor.x() - anchor.x();
    let mut dy = cursor.y() - anchor.y();
    if dx.abs() < min_extent {
        dx = min_extent * dx.signum();
    }
    if dy.abs() < min_extent {
        dy = min_extent * dy.signum();
    }
    Aabb::new(anchor, Vec2::new(anchor.x() + dx, anchor.y() + dy))
}

fn side_resize(original: Aabb, side: Side, cursor: Vec2, min_extent: f32) -> Aabb {
    match side {
        Side::Left => Aabb::new(
            Vec2::new(cursor.x().min(original.max().x() - min_extent), original.min().y()),
            Vec2::new(original.max().x(), original.max().y()),
        ),
        Side::Right => Aabb::new(
            Vec2::new(original.min().x(), original.min().y()),
            Vec2::new(cursor.x().max(original.min().x() + min_extent), original.max().y()),
        ),
        Side::Top => Aabb::new(
            Vec2::new(original.min().x(), original.min().y()),
            Vec2::new(original.max().x(), cursor.y().max(original.min().y() + min_extent)),
        ),
        Side::Bottom => Aabb::new(
            Vec2::new(original.min().x(), cursor.y().min(original.max().y() - min_extent)),
            Vec2::new(original.max().x(), original.max().y()),
        ),
    }
}

/// Resizes the single `target` entity toward `cursor`, returning the
/// resulting AABB and which op code it corresponds to. Line-like kinds
/// have no resize handles and are intentionally a no-op.
fn apply_resize(
    store: &mut EntityStore,
    target: Option<&TransformTarget>,
    handle_or_vertex_index: u32,
    cursor: Vec2,
) -> Option<(Aabb, TransformOpCode)> {
    let target = target?;
    let original_aabb = match &target.before {
        EntitySnapshot::Rect(row, _) => Aabb::new(Vec2::new(row.x, row.y), Vec2::new(row.x + row.w, row.y + row.h)),
        EntitySnapshot::Circle(row, _) | EntitySnapshot::Polygon(row, _) => geometry::ellipse_aabb(row),
        _ => return None,
    };
    let handle = resize_handle_from_index(handle_or_vertex_index)?;
    let (new_aabb, op) = match handle {
        ResizeHandle::Corner(corner) => {
            let anchor = corner.opposite().point_on(&original_aabb);
            (resize_from_anchor(anchor, cursor, MIN_RESIZE_EXTENT), TransformOpCode::Resize)
        }
        ResizeHandle::Side(side) => (
            side_resize(original_aabb, side, cursor, MIN_RESIZE_EXTENT),
            TransformOpCode::SideResize,
        ),
    };

    match target.before.clone() {
        EntitySnapshot::Rect(row, header) => {
            let mut r = row;
            r.x = new_aabb.min().x();
            r.y = new_aabb.min().y();
            r.w = new_aabb.width();
            r.h = new_aabb.height();
            store.upsert_rect(target.id, r, header);
        }
        EntitySnapshot::Circle(row, header) => {
            let mut r = row;
            let center = new_aabb.center();
            r.cx = center.x();
            r.cy = center.y();
            r.rx = new_aabb.width() / 2.0;
            r.ry = new_aabb.height() / 2.0;
            r.scale = 1.0;
            store.upsert_circle(target.id, r, header);
        }
        EntitySnapshot::Polygon(row, header) => {
            let mut r = row;
            let center = new_aabb.center();
            r.cx = center.x();
            r.cy = center.y();
            r.rx = new_aabb.width() / 2.0;
            r.ry = new_aabb.height() / 2.0;
            r.scale = 1.0;
            store.upsert_polygon(target.id, r, header);
        }
        _ => {}
    }

    Some((new_aabb, op))
}

fn apply_rotate(
    store: &mut EntityStore,
    text: &mut TextStore,
    targets: &[TransformTarget],
    pivot: Vec2,
    delta_rad: f32,
) {
    for target in targets {
        match &target.before {
            EntitySnapshot::Rect(row, header) => {
                let center = Vec2::new(row.x + row.w / 2.0, row.y + row.h / 2.0);
                let new_center = pivot.add(&center.sub(&pivot).rotate(delta_rad));
                let mut r = *row;
                r.x = new_center.x() - row.w / 2.0;
                r.y = new_center.y() - row.h / 2.0;
                store.upsert_rect(target.id, r, *header);
            }
            EntitySnapshot::Line(row, header) => {
                let a = Vec2::new(row.ax, row.ay).sub(&pivot).rotate(delta_rad).add(&pivot);
                let b = Vec2::new(row.bx, row.by).sub(&pivot).rotate(delta_rad).add(&pivot);
                let mut r = *row;
                r.ax = a.x();
                r.ay = a.y();
                r.bx = b.x();
                r.by = b.y();
                store.upsert_line(target.id, r, *header);
            }
            EntitySnapshot::Arrow(row, header) => {
                let a = Vec2::new(row.ax, row.ay).sub(&pivot).rotate(delta_rad).add(&pivot);
                let b = Vec2::new(row.bx, row.by).sub(&pivot).rotate(delta_rad).add(&pivot);
                let mut r = *row;
                r.ax = a.x();
                r.ay = a.y();
                r.bx = b.x();
                r.by = b.y();
                store.upsert_arrow(target.id, r, *header);
            }
            EntitySnapshot::Polyline(row, points, header) => {
                let rotated: Vec<Vec2> = points
                    .iter()
                    .map(|p| p.sub(&pivot).rotate(delta_rad).add(&pivot))
                    .collect();
                let (offset, count) = store.push_points(&rotated);
                let mut r = *row;
                r.offset = offset;
                r.count = count;
                store.upsert_polyline(target.id, r, *header);
            }
            EntitySnapshot::Circle(row, header) => {
                let center = Vec2::new(row.cx, row.cy).sub(&pivot).rotate(delta_rad).add(&pivot);
                let mut r = *row;
                r.cx = center.x();
                r.cy = center.y();
                r.rotation += delta_rad;
                store.upsert_circle(target.id, r, *header);
            }
            EntitySnapshot::Polygon(row, header) => {
                let center = Vec2::new(row.cx, row.cy).sub(&pivot).rotate(delta_rad).add(&pivot);
                let mut r = *row;
                r.cx = center.x();
                r.cy = center.y();
                r.rotation += delta_rad;
                store.upsert_polygon(target.id, r, *header);
            }
            EntitySnapshot::Text(_, _) => {
                if let Some(anchor) = target.text_anchor {
                    let new_anchor = anchor.sub(&pivot).rotate(delta_rad).add(&pivot);
                    text.set_position(target.id, new_anchor);
                }
                if let Some(rotation) = target.text_rotation {
                    text.set_rotation(target.id, rotation + delta_rad);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntityFlags, EntityHeader, RectRow, Rgba};

    fn rect_row(x: f32, y: f32, w: f32, h: f32) -> RectRow {
        RectRow {
            x,
            y,
            w,
            h,
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::TRANSPARENT,
            stroke_enabled: 0,
            stroke_width: 0.0,
            _pad: [0; 2],
        }
    }

    fn header() -> EntityHeader {
        EntityHeader {
            layer_id: 1,
            flags: EntityFlags::DEFAULT,
        }
    }

    #[test]
    fn move_gesture_translates_and_commits_a_record() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(0.0, 0.0, 10.0, 10.0), header());

        let snap = SnapPolicy {
            enabled: false,
            ..SnapPolicy::default()
        };
        assert!(session.begin_transform(
            &mut store,
            &mut text,
            &[id],
            TransformMode::Move,
            Some(id),
            0,
            Vec2::ZERO,
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        ));
        session.update_transform(&mut store, &mut text, Vec2::new(20.0, 5.0), SelectionModifier(0), &snap);
        let commit = session.commit_transform(&mut store, &mut text);
        match commit {
            TransformCommit::Entities(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].op, TransformOpCode::Move);
                assert_eq!(records[0].payload[0], 20.0);
            }
            other => panic!("expected entity records, got {other:?}"),
        }
        assert_eq!(store.get_rect(id).unwrap().x, 20.0);
    }

    #[test]
    fn sub_threshold_move_commits_nothing_and_reverts() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(0.0, 0.0, 10.0, 10.0), header());

        let snap = SnapPolicy {
            enabled: false,
            ..SnapPolicy::default()
        };
        session.begin_transform(
            &mut store,
            &mut text,
            &[id],
            TransformMode::Move,
            Some(id),
            0,
            Vec2::ZERO,
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        );
        session.update_transform(&mut store, &mut text, Vec2::new(1.0, 0.0), SelectionModifier(0), &snap);
        let commit = session.commit_transform(&mut store, &mut text);
        assert!(matches!(commit, TransformCommit::None));
        assert_eq!(store.get_rect(id).unwrap().x, 0.0);
    }

    #[test]
    fn cancel_restores_original_geometry() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(0.0, 0.0, 10.0, 10.0), header());

        let snap = SnapPolicy {
            enabled: false,
            ..SnapPolicy::default()
        };
        session.begin_transform(
            &mut store,
            &mut text,
            &[id],
            TransformMode::Move,
            Some(id),
            0,
            Vec2::ZERO,
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        );
        session.update_transform(&mut store, &mut text, Vec2::new(50.0, 50.0), SelectionModifier(0), &snap);
        assert_eq!(store.get_rect(id).unwrap().x, 50.0);
        assert!(session.cancel_transform(&mut store, &mut text));
        assert_eq!(store.get_rect(id).unwrap().x, 0.0);
        assert!(!session.is_active());
    }

    #[test]
    fn move_snaps_touching_rect_corner_to_corner() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();
        let moving = store.allocate_id();
        let anchor = store.allocate_id();
        store.upsert_rect(moving, rect_row(0.0, 0.0, 10.0, 10.0), header());
        store.upsert_rect(anchor, rect_row(30.0, 0.0, 10.0, 10.0), header());

        let snap = SnapPolicy {
            enabled: true,
            grid_enabled: false,
            endpoint: true,
            midpoint: false,
            center: false,
            nearest: false,
            tolerance_px: 5.0,
            ..SnapPolicy::default()
        };
        session.begin_transform(
            &mut store,
            &mut text,
            &[moving],
            TransformMode::Move,
            Some(moving),
            0,
            Vec2::ZERO,
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        );
        session.update_transform(&mut store, &mut text, Vec2::new(19.0, 0.0), SelectionModifier(0), &snap);
        let commit = session.commit_transform(&mut store, &mut text);
        assert!(matches!(commit, TransformCommit::Entities(_)));
        assert_eq!(store.get_rect(moving).unwrap().x, 20.0);
    }

    #[test]
    fn resize_floors_extent_at_min_resize_extent() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(0.0, 0.0, 10.0, 10.0), header());

        let snap = SnapPolicy {
            enabled: false,
            ..SnapPolicy::default()
        };
        session.begin_transform(
            &mut store,
            &mut text,
            &[id],
            TransformMode::Resize,
            Some(id),
            HandleCorner::TopRight.index() as u32,
            Vec2::new(10.0, 10.0),
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        );
        // Drag the top-right handle almost onto the bottom-left anchor.
        session.update_transform(&mut store, &mut text, Vec2::new(0.0005, 0.0005), SelectionModifier(0), &snap);
        let commit = session.commit_transform(&mut store, &mut text);
        assert!(matches!(commit, TransformCommit::Entities(_)));
        let row = store.get_rect(id).unwrap();
        assert!(row.w >= MIN_RESIZE_EXTENT);
        assert!(row.h >= MIN_RESIZE_EXTENT);
    }

    #[test]
    fn draft_commits_accumulated_points() {
        let mut store = EntityStore::new();
        let mut text = TextStore::new();
        let mut session = InteractionSession::new();

        session.begin_transform(
            &mut store,
            &mut text,
            &[],
            TransformMode::Draft,
            None,
            EntityKind::Polyline.tag(),
            Vec2::new(0.0, 0.0),
            Vec2::ZERO,
            1.0,
            Vec2::new(800.0, 600.0),
            SelectionModifier(0),
        );
        session.update_transform(&mut store, &mut text, Vec2::new(10.0, 0.0), SelectionModifier(0), &SnapPolicy::default());
        session.add_draft_vertex(Vec2::new(10.0, 0.0));
        session.update_transform(&mut store, &mut text, Vec2::new(10.0, 10.0), SelectionModifier(0), &SnapPolicy::default());
        let commit = session.commit_transform(&mut store, &mut text);
        match commit {
            TransformCommit::Draft { kind, points } => {
                assert_eq!(kind, Some(EntityKind::Polyline));
                assert_eq!(points.len(), 3);
                assert_eq!(points[1], Vec2::new(10.0, 0.0));
                assert_eq!(points[2], Vec2::new(10.0, 10.0));
            }
            other => panic!("expected draft commit, got {other:?}"),
        }
    }
}
