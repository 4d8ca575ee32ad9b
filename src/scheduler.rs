//! The scheduler state machine: converts camera motion into tile requests,
//! pairs arriving payloads, and promotes complete pairs to GPU-ready tiles.
//!
//! This is the crate's core (spec §2 budgets it at 40%). It is grounded in
//! the overall shape of the teacher's `tile_system::scheduler`, but that
//! module's actual bodies are stubs (`schedule_tile_loads`,
//! `schedule_tile_downloads`, `update_tile_priorities` are all `// ...` in
//! the teacher) — the state machine implemented here, the pairing
//! integration, and the reduce/expire bookkeeping are a full implementation
//! of the lifecycle only sketched there.

use std::collections::HashSet;

use bytes::Bytes;

use crate::config::SchedulerConfig;
use crate::error::SchedulerMetrics;
use crate::events::{CancelTileRequest, EventSinks, TileExpired, TileRequested};
use crate::pairing::{Insert, PairingBuffer};
use crate::quadtree::QuadTreeNode;
use crate::status::{NodeData, TileStatus};
use crate::tile_id::{Bounds, TileId};
use crate::visibility::{self, CameraState};

/// A fully materialized tile, both payloads present, ready for the GPU
/// manager to consume (spec §3 "Ready tile"). Ownership of the byte buffers
/// transfers to whoever drains it.
#[derive(Debug, Clone)]
pub struct ReadyTile {
    pub tile_id: TileId,
    pub bounds: Bounds,
    pub height_map_bytes: Bytes,
    pub orthophoto_bytes: Bytes,
}

/// The tile scheduler. Single-threaded and cooperative (spec §5): every
/// method call runs to completion before the next, no internal locking.
pub struct TileScheduler {
    root: QuadTreeNode<NodeData>,
    camera: Option<CameraState>,
    enabled: bool,
    config: SchedulerConfig,
    pairing: PairingBuffer,
    sinks: EventSinks,
    metrics: SchedulerMetrics,
    ready_tiles: Vec<ReadyTile>,
    /// The externally-tracked GPU tile set (spec §3/§6): ids the scheduler
    /// believes are currently resident on the GPU. Updated only when a ready
    /// tile or an expiration is emitted.
    gpu_tile_set: HashSet<TileId>,
}

impl TileScheduler {
    pub fn new(config: SchedulerConfig, sinks: EventSinks) -> Self {
        tracing::info!(max_zoom = config.max_zoom, "tile scheduler constructed");
        Self {
            root: QuadTreeNode::new(NodeData::uninitialised(TileId::ROOT)),
            camera: None,
            enabled: true,
            config,
            pairing: PairingBuffer::new(),
            sinks,
            metrics: SchedulerMetrics::default(),
            ready_tiles: Vec::new(),
            gpu_tile_set: HashSet::new(),
        }
    }

    /// Recomputes the desired frontier for the new camera state, requesting
    /// newly-needed tiles and expiring/cancelling ones that fell out of
    /// view. A no-op while disabled (spec §6 `set_enabled`).
    pub fn update_camera(&mut self, camera: CameraState) {
        self.camera = Some(camera);
        if !self.enabled {
            return;
        }
        let mut ctx = UpdateCtx {
            camera,
            config: &self.config,
            pairing: &mut self.pairing,
            sinks: &self.sinks,
            metrics: &mut self.metrics,
            gpu_tile_set: &mut self.gpu_tile_set,
        };
        update_node(&mut self.root, &mut ctx);
        self.check_invariants();
    }

    /// Enables or disables scheduling. While disabled, `update_camera` does
    /// not touch the tree; in-flight tiles already requested are left alone.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
    }

    /// Removes and returns all tiles that have completed pairing since the
    /// last drain, handing ownership of their payloads to the caller.
    pub fn drain_ready_tiles(&mut self) -> Vec<ReadyTile> {
        std::mem::take(&mut self.ready_tiles)
    }

    /// A heightmap payload has arrived for `id`.
    pub fn receive_height_tile(&mut self, id: TileId, payload: Bytes) {
        let Some(node) = find_node_mut(&mut self.root, id) else {
            tracing::warn!(%id, "height tile arrived for an id no longer in the tree");
            self.metrics.record_stale_payload();
            return;
        };
        if !matches!(node.data().status, TileStatus::InTransit | TileStatus::WaitingForSiblings) {
            tracing::warn!(%id, status = ?node.data().status, "duplicate height tile arrival");
            self.metrics.record_duplicate_arrival();
            return;
        }

        match self.pairing.insert_height(id, payload) {
            Insert::StillWaiting => {
                node.data_mut().status = TileStatus::WaitingForSiblings;
            }
            Insert::Paired(height, ortho) => {
                node.data_mut().status = TileStatus::OnGpu;
                self.gpu_tile_set.insert(id);
                let ready = ReadyTile {
                    tile_id: id,
                    bounds: id.bounds(),
                    height_map_bytes: height,
                    orthophoto_bytes: ortho,
                };
                self.sinks.tile_ready.send(ready.clone()).ok();
                self.ready_tiles.push(ready);
            }
        }
        self.check_invariants();
    }

    /// An orthophoto payload has arrived for `id`.
    pub fn receive_ortho_tile(&mut self, id: TileId, payload: Bytes) {
        let Some(node) = find_node_mut(&mut self.root, id) else {
            tracing::warn!(%id, "ortho tile arrived for an id no longer in the tree");
            self.metrics.record_stale_payload();
            return;
        };
        if !matches!(node.data().status, TileStatus::InTransit | TileStatus::WaitingForSiblings) {
            tracing::warn!(%id, status = ?node.data().status, "duplicate ortho tile arrival");
            self.metrics.record_duplicate_arrival();
            return;
        }

        match self.pairing.insert_ortho(id, payload) {
            Insert::StillWaiting => {
                node.data_mut().status = TileStatus::WaitingForSiblings;
            }
            Insert::Paired(height, ortho) => {
                node.data_mut().status = TileStatus::OnGpu;
                self.gpu_tile_set.insert(id);
                let ready = ReadyTile {
                    tile_id: id,
                    bounds: id.bounds(),
                    height_map_bytes: height,
                    orthophoto_bytes: ortho,
                };
                self.sinks.tile_ready.send(ready.clone()).ok();
                self.ready_tiles.push(ready);
            }
        }
        self.check_invariants();
    }

    /// The height load service reported that `id` has no data. Sticky until
    /// the node is dropped by reduction and later refined again.
    pub fn notify_unavailable_height(&mut self, id: TileId) {
        self.mark_unavailable(id);
        self.check_invariants();
    }

    /// The ortho load service reported that `id` has no data.
    pub fn notify_unavailable_ortho(&mut self, id: TileId) {
        self.mark_unavailable(id);
        self.check_invariants();
    }

    fn mark_unavailable(&mut self, id: TileId) {
        let Some(node) = find_node_mut(&mut self.root, id) else {
            tracing::warn!(%id, "unavailable notice arrived for an id no longer in the tree");
            self.metrics.record_stale_payload();
            return;
        };
        if !matches!(node.data().status, TileStatus::InTransit | TileStatus::WaitingForSiblings) {
            tracing::warn!(%id, status = ?node.data().status, "duplicate or stale unavailable notice");
            self.metrics.record_duplicate_arrival();
            return;
        }
        self.pairing.discard(id);
        node.data_mut().status = TileStatus::Unavailable;
    }

    /// Verifies the invariants of spec §3/§4.3 hold after a mutation:
    /// internal (non-leaf) nodes carry only `Uninitialised`/`OnGpu` status,
    /// and the pairing buffer never holds both halves of the same tile.
    /// Debug builds treat a violation as fatal (spec §7); release builds log
    /// it, count it, and reduce the offending piece of state back into a
    /// consistent shape rather than propagating the corruption.
    fn check_invariants(&mut self) {
        let structural_violation = find_structural_violation(&self.root);
        let pairing_violation = self.pairing.overlapping_id();
        let gpu_set_violation = self.find_gpu_tile_set_violation();

        if structural_violation.is_none() && pairing_violation.is_none() && gpu_set_violation.is_none() {
            return;
        }

        if cfg!(debug_assertions) {
            if let Some(id) = structural_violation {
                panic!("tile scheduler invariant violated: internal node {id} has a leaf-only status");
            }
            if let Some(id) = pairing_violation {
                panic!("tile scheduler invariant violated: pairing buffer holds both halves for {id}");
            }
            if let Some(id) = gpu_set_violation {
                panic!("tile scheduler invariant violated: on-gpu tile set disagrees with tree for {id}");
            }
        }

        if let Some(id) = structural_violation {
            tracing::error!(%id, "invariant violated: internal node has a leaf-only status; reducing its subtree");
            self.metrics.record_invariant_violation_recovered();
            if let Some(node) = find_node_mut(&mut self.root, id) {
                node.remove_children();
                node.data_mut().status = TileStatus::Uninitialised;
            }
        }
        if let Some(id) = pairing_violation {
            tracing::error!(%id, "invariant violated: pairing buffer held both halves; discarding");
            self.metrics.record_invariant_violation_recovered();
            self.pairing.discard(id);
        }
        if let Some(id) = gpu_set_violation {
            tracing::error!(%id, "invariant violated: on-gpu tile set disagrees with the tree; dropping stale entry");
            self.metrics.record_invariant_violation_recovered();
            self.gpu_tile_set.remove(&id);
        }
    }

    /// Spec §3/§8: "the set of OnGpu nodes in the tree equals the externally
    /// tracked GPU tile set". Returns an id present in `gpu_tile_set` whose
    /// tree node is absent or not actually `OnGpu`, if any (the reverse
    /// direction — an `OnGpu` node missing from the set — cannot happen since
    /// the set is only ever populated alongside the status transition).
    fn find_gpu_tile_set_violation(&self) -> Option<TileId> {
        self.gpu_tile_set
            .iter()
            .find(|&&id| !matches!(find_node(&self.root, id), Some(node) if node.data().status == TileStatus::OnGpu))
            .copied()
    }

    pub fn number_of_tiles_in_transit(&self) -> usize {
        self.count_with_status(|s| s == TileStatus::InTransit)
    }

    pub fn number_of_waiting_height_tiles(&self) -> usize {
        self.pairing.count_waiting_for_height()
    }

    pub fn number_of_waiting_ortho_tiles(&self) -> usize {
        self.pairing.count_waiting_for_ortho()
    }

    /// The set of TileIds the scheduler believes are currently on the GPU
    /// (spec §3/§6: "GPU tile set").
    pub fn gpu_tiles(&self) -> &HashSet<TileId> {
        &self.gpu_tile_set
    }

    fn count_with_status(&self, pred: impl Fn(TileStatus) -> bool + Copy) -> usize {
        fn visit(node: &QuadTreeNode<NodeData>, pred: impl Fn(TileStatus) -> bool + Copy, count: &mut usize) {
            if pred(node.data().status) {
                *count += 1;
            }
            if let Some(children) = node.children() {
                for child in children {
                    visit(child, pred, count);
                }
            }
        }
        let mut count = 0;
        visit(&self.root, pred, &mut count);
        count
    }
}

struct UpdateCtx<'a> {
    camera: CameraState,
    config: &'a SchedulerConfig,
    pairing: &'a mut PairingBuffer,
    sinks: &'a EventSinks,
    metrics: &'a mut SchedulerMetrics,
    gpu_tile_set: &'a mut HashSet<TileId>,
}

fn update_node(node: &mut QuadTreeNode<NodeData>, ctx: &mut UpdateCtx<'_>) {
    let id = node.data().id;
    if node.data().status == TileStatus::Unavailable {
        return;
    }

    let bounds = id.bounds();
    let wants_refine = id.zoom < ctx.config.max_zoom
        && visibility::should_refine(&ctx.camera, &bounds, ctx.config.visibility_threshold);

    if wants_refine {
        if !node.has_children() {
            // This TileId is about to stop being a leaf, so whatever status
            // it held (spec §3: non-internal statuses are leaf-only) must be
            // retired first, same as a reduce-driven removal would.
            match node.data().status {
                TileStatus::OnGpu => {
                    ctx.gpu_tile_set.remove(&id);
                    ctx.sinks.tile_expired.send(TileExpired::Height(id)).ok();
                    ctx.sinks.tile_expired.send(TileExpired::Ortho(id)).ok();
                    tracing::debug!(%id, "expired on-gpu tile ahead of refine");
                }
                TileStatus::InTransit | TileStatus::WaitingForSiblings => {
                    ctx.pairing.discard(id);
                    ctx.sinks
                        .cancel_tile_request
                        .send(CancelTileRequest::Height(id))
                        .ok();
                    ctx.sinks
                        .cancel_tile_request
                        .send(CancelTileRequest::Ortho(id))
                        .ok();
                    tracing::debug!(%id, "cancelled in-flight tile ahead of refine");
                }
                TileStatus::Uninitialised | TileStatus::Unavailable => {}
            }
            node.data_mut().status = TileStatus::Uninitialised;
            let children_data = id.subtiles().map(NodeData::uninitialised);
            node.add_children(children_data);
        }
        for child in node.children_mut().unwrap() {
            update_node(child, ctx);
        }
        return;
    }

    if node.has_children() {
        let all_droppable = node
            .children()
            .unwrap()
            .iter()
            .all(|c| c.data().status != TileStatus::OnGpu);

        if all_droppable {
            for child in node.children().unwrap() {
                expire_subtree(child, ctx);
            }
            node.remove_children();
        } else {
            for child in node.children_mut().unwrap() {
                update_node(child, ctx);
            }
            return;
        }
    }

    if node.data().status == TileStatus::Uninitialised {
        ctx.sinks
            .tile_requested
            .send(TileRequested::Height(id))
            .ok();
        ctx.sinks.tile_requested.send(TileRequested::Ortho(id)).ok();
        tracing::debug!(%id, "requested tile");
        node.data_mut().status = TileStatus::InTransit;
    }
}

/// Recursively cancels/expires a subtree being collapsed by reduction. Every
/// node visited loses its buffered pairing state (if any) and, if it had an
/// outstanding request, gets a `TileExpired`/`CancelTileRequest` pair.
fn expire_subtree(node: &QuadTreeNode<NodeData>, ctx: &mut UpdateCtx<'_>) {
    let id = node.data().id;
    match node.data().status {
        TileStatus::OnGpu => {
            ctx.gpu_tile_set.remove(&id);
            ctx.sinks.tile_expired.send(TileExpired::Height(id)).ok();
            ctx.sinks.tile_expired.send(TileExpired::Ortho(id)).ok();
            tracing::debug!(%id, "expired on-gpu tile");
        }
        TileStatus::InTransit | TileStatus::WaitingForSiblings => {
            ctx.pairing.discard(id);
            ctx.sinks
                .cancel_tile_request
                .send(CancelTileRequest::Height(id))
                .ok();
            ctx.sinks
                .cancel_tile_request
                .send(CancelTileRequest::Ortho(id))
                .ok();
            tracing::debug!(%id, "cancelled in-flight tile");
        }
        TileStatus::Uninitialised | TileStatus::Unavailable => {}
    }
    if let Some(children) = node.children() {
        for child in children {
            expire_subtree(child, ctx);
        }
    }
}

/// Returns the id of the first internal node found whose status is not
/// `Uninitialised` or `OnGpu` (spec §3's invariant for internal nodes), or
/// `None` if the whole tree is consistent.
fn find_structural_violation(node: &QuadTreeNode<NodeData>) -> Option<TileId> {
    let children = node.children()?;
    if node.data().status.is_leaf_only() {
        return Some(node.data().id);
    }
    children.iter().find_map(find_structural_violation)
}

/// Walks from the root to the node identified by `id`, following the fixed
/// SW/SE/NW/NE child layout. Returns `None` if any ancestor along the path
/// has no children, i.e. `id` is not (or no longer) present in the tree.
fn find_node_mut(root: &mut QuadTreeNode<NodeData>, id: TileId) -> Option<&mut QuadTreeNode<NodeData>> {
    let mut node = root;
    for level in 1..=id.zoom {
        let shift = id.zoom - level;
        let ax = id.x >> shift;
        let ay = id.y >> shift;
        let index = (ax & 1) as usize + 2 * (ay & 1) as usize;
        node = &mut node.children_mut()?[index];
    }
    if node.data().id == id {
        Some(node)
    } else {
        None
    }
}

/// Read-only counterpart of [`find_node_mut`], used by the consistency
/// self-check where no mutation is needed.
fn find_node(root: &QuadTreeNode<NodeData>, id: TileId) -> Option<&QuadTreeNode<NodeData>> {
    let mut node = root;
    for level in 1..=id.zoom {
        let shift = id.zoom - level;
        let ax = id.x >> shift;
        let ay = id.y >> shift;
        let index = (ax & 1) as usize + 2 * (ay & 1) as usize;
        node = &node.children()?[index];
    }
    if node.data().id == id {
        Some(node)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use glam::DVec3;

    fn scheduler() -> (TileScheduler, EventBus) {
        let bus = EventBus::new();
        let scheduler = TileScheduler::new(SchedulerConfig::default(), bus.scheduler_sinks.clone());
        (scheduler, bus)
    }

    fn close_camera() -> CameraState {
        CameraState::new(DVec3::new(0.0, 0.0, 100.0), std::f64::consts::FRAC_PI_4, 1080.0)
    }

    /// Far enough that the root tile's projected screen-space size
    /// (~209px at this height) stays under the default 256px
    /// `visibility_threshold`, so `update_camera` leaves the root a single
    /// un-refined tile instead of recursing into children.
    fn far_camera() -> CameraState {
        CameraState::new(DVec3::new(0.0, 0.0, 250_000_000.0), std::f64::consts::FRAC_PI_4, 1080.0)
    }

    #[test]
    fn cold_start_requests_frontier_tiles_not_ancestors() {
        let (mut scheduler, bus) = scheduler();
        scheduler.update_camera(close_camera());

        let mut requested = Vec::new();
        while let Ok(ev) = bus.collaborator_requested.try_recv() {
            requested.push(ev);
        }
        assert!(!requested.is_empty());
        assert!(!requested.contains(&TileRequested::Height(TileId::ROOT)));
        assert!(scheduler.number_of_tiles_in_transit() > 0);
    }

    #[test]
    fn pairing_order_does_not_matter() {
        let (mut scheduler, _bus) = scheduler();
        scheduler.update_camera(far_camera());
        assert_eq!(scheduler.number_of_tiles_in_transit(), 1);

        scheduler.receive_ortho_tile(TileId::ROOT, Bytes::from_static(b"o"));
        assert_eq!(scheduler.number_of_waiting_ortho_tiles(), 1);
        scheduler.receive_height_tile(TileId::ROOT, Bytes::from_static(b"h"));

        assert_eq!(scheduler.gpu_tiles(), &HashSet::from([TileId::ROOT]));
        let ready = scheduler.drain_ready_tiles();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].tile_id, TileId::ROOT);
    }

    #[test]
    fn unavailable_tile_is_sticky_until_reduced() {
        let (mut scheduler, _bus) = scheduler();
        scheduler.update_camera(far_camera());
        scheduler.notify_unavailable_height(TileId::ROOT);

        scheduler.receive_ortho_tile(TileId::ROOT, Bytes::from_static(b"o"));
        assert!(scheduler.gpu_tiles().is_empty());
        assert_eq!(scheduler.metrics().duplicate_arrivals, 1);
    }

    #[test]
    fn refinement_creates_children_for_root() {
        let (mut scheduler, bus) = scheduler();
        scheduler.update_camera(close_camera());
        let mut saw_child_request = false;
        while let Ok(ev) = bus.collaborator_requested.try_recv() {
            if matches!(ev, TileRequested::Height(id) if id.zoom > 0) {
                saw_child_request = true;
            }
        }
        assert!(saw_child_request);
    }

    #[test]
    fn camera_move_away_cancels_in_transit_tiles_without_expiring_them() {
        let (mut scheduler, bus) = scheduler();
        scheduler.update_camera(close_camera());
        while bus.collaborator_requested.try_recv().is_ok() {}

        scheduler.update_camera(far_camera());

        let mut saw_cancel = false;
        while let Ok(_ev) = bus.collaborator_cancel.try_recv() {
            saw_cancel = true;
        }
        assert!(saw_cancel, "dropped in-transit children should be cancelled");
        assert!(
            bus.collaborator_expired.try_recv().is_err(),
            "tile_expired is only for OnGpu removals, not in-flight cancellation"
        );
        assert_eq!(scheduler.number_of_tiles_in_transit(), 1);
    }

    #[test]
    fn camera_move_away_expires_on_gpu_tiles() {
        let (mut scheduler, _bus) = scheduler();
        scheduler.update_camera(far_camera());
        scheduler.receive_height_tile(TileId::ROOT, Bytes::from_static(b"h"));
        scheduler.receive_ortho_tile(TileId::ROOT, Bytes::from_static(b"o"));
        assert_eq!(scheduler.gpu_tiles(), &HashSet::from([TileId::ROOT]));

        // Root no longer desired at all once the predicate always refines,
        // since max_zoom bounds where it eventually bottoms out as a leaf
        // again; use `set_enabled` off/on is not needed here, just a camera
        // that keeps refining well past zoom 0 so root itself is dropped in
        // favour of its (not yet on-gpu) children.
        scheduler.update_camera(close_camera());

        assert!(
            scheduler.gpu_tiles().is_empty(),
            "root should no longer be on-gpu once refined away"
        );
    }

    #[test]
    fn refining_an_on_gpu_tile_retires_it_before_children_are_added() {
        let (mut scheduler, bus) = scheduler();
        scheduler.update_camera(far_camera());
        scheduler.receive_height_tile(TileId::ROOT, Bytes::from_static(b"h"));
        scheduler.receive_ortho_tile(TileId::ROOT, Bytes::from_static(b"o"));
        assert_eq!(scheduler.gpu_tiles(), &HashSet::from([TileId::ROOT]));

        scheduler.update_camera(close_camera());

        let mut saw_root_expired = false;
        while let Ok(ev) = bus.collaborator_expired.try_recv() {
            if matches!(ev, TileExpired::Height(id) | TileExpired::Ortho(id) if id == TileId::ROOT) {
                saw_root_expired = true;
            }
        }
        assert!(saw_root_expired, "an on-gpu tile being refined must emit tile_expired first");
    }

    #[test]
    fn stale_arrival_after_reduction_is_counted_not_applied() {
        let (mut scheduler, _bus) = scheduler();
        scheduler.update_camera(close_camera());
        scheduler.update_camera(far_camera());

        let stale_id = TileId::new(1, 0, 0);
        scheduler.receive_height_tile(stale_id, Bytes::from_static(b"h"));
        assert_eq!(scheduler.metrics().stale_payloads, 1);
        assert!(scheduler.gpu_tiles().is_empty());
    }

    #[test]
    fn disabled_scheduler_ignores_camera_updates() {
        let (mut scheduler, bus) = scheduler();
        scheduler.set_enabled(false);
        scheduler.update_camera(close_camera());
        assert!(bus.collaborator_requested.try_recv().is_err());
        assert_eq!(scheduler.number_of_tiles_in_transit(), 0);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn corrupted_internal_status_is_fatal_in_debug() {
        let (mut scheduler, _bus) = scheduler();
        scheduler.root.add_children(TileId::ROOT.subtiles().map(NodeData::uninitialised));
        scheduler.root.data_mut().status = TileStatus::InTransit;
        scheduler.check_invariants();
    }

    #[test]
    fn idempotent_camera_update_emits_no_additional_events() {
        let (mut scheduler, bus) = scheduler();
        scheduler.update_camera(close_camera());
        while bus.collaborator_requested.try_recv().is_ok() {}
        while bus.collaborator_expired.try_recv().is_ok() {}
        while bus.collaborator_cancel.try_recv().is_ok() {}

        scheduler.update_camera(close_camera());

        assert!(bus.collaborator_requested.try_recv().is_err());
        assert!(bus.collaborator_expired.try_recv().is_err());
        assert!(bus.collaborator_cancel.try_recv().is_err());
    }
}
