//! Typed event bus connecting the scheduler to its external collaborators.
//!
//! Spec §9 calls for "signals/slots -> typed event bus" in place of the Qt
//! signal/slot mechanism the original renderer used; the teacher repo
//! already made half of this move itself, from Qt signals to Bevy's ECS
//! `Event`/`EventWriter`/`EventReader`. This module completes the move: away
//! from Bevy's ECS entirely (out of scope per spec §1) and onto a plain
//! `crossbeam-channel`, the same channel primitive the teacher already uses
//! for its downloader-to-scheduler handoff (`tile_system::downloader`).

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};

use crate::scheduler::ReadyTile;
use crate::tile_id::TileId;

/// Emitted by the scheduler when a tile's data must be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileRequested {
    Height(TileId),
    Ortho(TileId),
}

/// Emitted by a load service once it has settled one way or another for a
/// tile. The `Tile*` variants feed `receive_height_tile`/`receive_ortho_tile`
/// (distinct from the scheduler's own `tile_ready(ready_tile)` output event,
/// spec §6, which fires once both halves of a pair have arrived — see
/// [`ReadyTile`]); the `*Unavailable` variants feed
/// `notify_unavailable_height`/`notify_unavailable_ortho`.
#[derive(Debug, Clone)]
pub enum LoadResult {
    Height(TileId, Bytes),
    Ortho(TileId, Bytes),
    HeightUnavailable(TileId),
    OrthoUnavailable(TileId),
}

/// Emitted by the scheduler when a tile leaves the desired frontier while
/// still in transit or buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileExpired {
    Height(TileId),
    Ortho(TileId),
}

/// Emitted alongside [`TileExpired`]; a best-effort hint a load service may
/// use to abandon an in-flight fetch (spec §5: "best-effort, not guaranteed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTileRequest {
    Height(TileId),
    Ortho(TileId),
}

/// The scheduler's outward-facing half of the bus: senders for everything it
/// produces (spec §4.4/§6: `tileRequested`, `tileReady`, `tileExpired`,
/// `cancelTileRequest`).
#[derive(Debug, Clone)]
pub struct EventSinks {
    pub tile_requested: Sender<TileRequested>,
    pub tile_ready: Sender<ReadyTile>,
    pub tile_expired: Sender<TileExpired>,
    pub cancel_tile_request: Sender<CancelTileRequest>,
}

/// The scheduler's inward-facing half: a receiver for what collaborators
/// send back.
#[derive(Debug, Clone)]
pub struct EventSources {
    pub load_result: Receiver<LoadResult>,
}

/// A matched sink/source pair plus the collaborator-side endpoints, so
/// wiring a scheduler up to load services is a single call instead of five
/// `crossbeam_channel::unbounded()` calls at every call site.
pub struct EventBus {
    pub scheduler_sinks: EventSinks,
    pub scheduler_sources: EventSources,
    pub collaborator_requested: Receiver<TileRequested>,
    pub collaborator_ready_tile: Receiver<ReadyTile>,
    pub collaborator_expired: Receiver<TileExpired>,
    pub collaborator_cancel: Receiver<CancelTileRequest>,
    pub collaborator_load_result: Sender<LoadResult>,
}

impl EventBus {
    /// Builds all five unbounded channels and splits them into the
    /// scheduler's view and the collaborators' view. Unbounded, matching
    /// spec §5 ("no internal parallelism... no timeouts at this layer") —
    /// backpressure is not this crate's concern.
    pub fn new() -> Self {
        let (requested_tx, requested_rx) = crossbeam_channel::unbounded();
        let (ready_tile_tx, ready_tile_rx) = crossbeam_channel::unbounded();
        let (load_result_tx, load_result_rx) = crossbeam_channel::unbounded();
        let (expired_tx, expired_rx) = crossbeam_channel::unbounded();
        let (cancel_tx, cancel_rx) = crossbeam_channel::unbounded();

        Self {
            scheduler_sinks: EventSinks {
                tile_requested: requested_tx,
                tile_ready: ready_tile_tx,
                tile_expired: expired_tx,
                cancel_tile_request: cancel_tx,
            },
            scheduler_sources: EventSources { load_result: load_result_rx },
            collaborator_requested: requested_rx,
            collaborator_ready_tile: ready_tile_rx,
            collaborator_expired: expired_rx,
            collaborator_cancel: cancel_rx,
            collaborator_load_result: load_result_tx,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_event_reaches_collaborator_side() {
        let bus = EventBus::new();
        bus.scheduler_sinks
            .tile_requested
            .send(TileRequested::Height(TileId::ROOT))
            .unwrap();
        assert_eq!(
            bus.collaborator_requested.try_recv().unwrap(),
            TileRequested::Height(TileId::ROOT)
        );
    }

    #[test]
    fn load_result_reaches_scheduler_side() {
        let bus = EventBus::new();
        bus.collaborator_load_result
            .send(LoadResult::Ortho(TileId::ROOT, Bytes::from_static(b"x")))
            .unwrap();
        match bus.scheduler_sources.load_result.try_recv().unwrap() {
            LoadResult::Ortho(id, payload) => {
                assert_eq!(id, TileId::ROOT);
                assert_eq!(payload, Bytes::from_static(b"x"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ready_tile_event_reaches_collaborator_side() {
        let bus = EventBus::new();
        bus.scheduler_sinks
            .tile_ready
            .send(ReadyTile {
                tile_id: TileId::ROOT,
                bounds: TileId::ROOT.bounds(),
                height_map_bytes: Bytes::from_static(b"h"),
                orthophoto_bytes: Bytes::from_static(b"o"),
            })
            .unwrap();
        let ready = bus.collaborator_ready_tile.try_recv().unwrap();
        assert_eq!(ready.tile_id, TileId::ROOT);
    }

    #[test]
    fn empty_channel_does_not_block() {
        let bus = EventBus::new();
        assert!(bus.collaborator_cancel.try_recv().is_err());
    }
}
