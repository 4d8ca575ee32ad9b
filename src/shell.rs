//! Minimal adapter gluing a [`TileScheduler`] to a pair of load services.
//!
//! Not an application shell or event loop in its own right (both are out of
//! scope per the crate's purpose) — just the few lines required to turn the
//! scheduler's channel-based requests into calls against
//! `HeightTileLoadService`/`OrthoTileLoadService` and feed results back.
//! Grounded in the teacher's `tile_system::mod.rs`, which plays exactly this
//! connective role between its `TileScheduler` resource and its `TileLoader`/
//! `TileDownloadQueue` systems, generalized here from a Bevy system into a
//! plain async function anyone can run on their own runtime.

use std::sync::Arc;

use crate::error::LoadError;
use crate::events::{EventBus, LoadResult, TileRequested};
use crate::load_service::{HeightTileLoadService, OrthoTileLoadService};
use crate::scheduler::TileScheduler;
use crate::tile_id::TileId;

/// Runs `scheduler` to completion against the two load services, driven by
/// camera updates pushed through `camera_updates`. Returns when
/// `camera_updates` is closed and every in-flight request has settled.
///
/// Cancellation is best-effort (spec §5): a `CancelTileRequest` already
/// fetched before this function notices it simply completes and its result
/// is discarded on arrival, since the scheduler's own `receive_*` methods
/// treat stale ids as no-ops.
pub async fn drive_with_http_services<H, O>(
    mut scheduler: TileScheduler,
    bus: EventBus,
    camera_updates: crossbeam_channel::Receiver<crate::visibility::CameraState>,
    height_service: Arc<H>,
    ortho_service: Arc<O>,
) -> TileScheduler
where
    H: HeightTileLoadService + 'static,
    O: OrthoTileLoadService + 'static,
{
    let mut in_flight = tokio::task::JoinSet::new();

    loop {
        let mut idle = true;

        while let Ok(camera) = camera_updates.try_recv() {
            scheduler.update_camera(camera);
            idle = false;
        }

        while let Ok(request) = bus.collaborator_requested.try_recv() {
            idle = false;
            match request {
                TileRequested::Height(id) => spawn_height_fetch(&mut in_flight, height_service.clone(), id, bus.collaborator_load_result.clone()),
                TileRequested::Ortho(id) => spawn_ortho_fetch(&mut in_flight, ortho_service.clone(), id, bus.collaborator_load_result.clone()),
            }
        }

        while let Ok(event) = bus.scheduler_sources.load_result.try_recv() {
            idle = false;
            match event {
                LoadResult::Height(id, bytes) => scheduler.receive_height_tile(id, bytes),
                LoadResult::Ortho(id, bytes) => scheduler.receive_ortho_tile(id, bytes),
                LoadResult::HeightUnavailable(id) => scheduler.notify_unavailable_height(id),
                LoadResult::OrthoUnavailable(id) => scheduler.notify_unavailable_ortho(id),
            }
        }

        // Drain ready tiles and hand them to whatever owns the GPU tile
        // manager; this adapter has no GPU manager of its own (out of scope
        // per spec §1), so it just drains the channel to keep it from
        // growing unbounded.
        while bus.collaborator_ready_tile.try_recv().is_ok() {
            idle = false;
        }

        // Drain cancellation hints; this adapter has no way to abort a task
        // already spawned, so these are purely advisory (spec §5).
        while bus.collaborator_cancel.try_recv().is_ok() {
            idle = false;
        }

        if !in_flight.is_empty() {
            if in_flight.join_next().await.is_some() {
                idle = false;
            }
            continue;
        }

        if camera_updates_closed(&camera_updates) {
            break;
        }

        if idle {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    scheduler
}

fn camera_updates_closed(rx: &crossbeam_channel::Receiver<crate::visibility::CameraState>) -> bool {
    matches!(rx.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected))
}

fn spawn_height_fetch<H>(
    set: &mut tokio::task::JoinSet<()>,
    service: Arc<H>,
    id: TileId,
    result_tx: crossbeam_channel::Sender<LoadResult>,
) where
    H: HeightTileLoadService + 'static,
{
    set.spawn(async move {
        match service.load(id).await {
            Ok(bytes) => {
                result_tx.send(LoadResult::Height(id, bytes)).ok();
            }
            Err(LoadError::NotFound(id)) => {
                result_tx.send(LoadResult::HeightUnavailable(id)).ok();
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "height tile fetch failed, leaving in-flight for a future camera change to reduce out");
            }
        }
    });
}

fn spawn_ortho_fetch<O>(
    set: &mut tokio::task::JoinSet<()>,
    service: Arc<O>,
    id: TileId,
    result_tx: crossbeam_channel::Sender<LoadResult>,
) where
    O: OrthoTileLoadService + 'static,
{
    set.spawn(async move {
        match service.load(id).await {
            Ok(bytes) => {
                result_tx.send(LoadResult::Ortho(id, bytes)).ok();
            }
            Err(LoadError::NotFound(id)) => {
                result_tx.send(LoadResult::OrthoUnavailable(id)).ok();
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "ortho tile fetch failed, leaving in-flight for a future camera change to reduce out");
            }
        }
    });
}
