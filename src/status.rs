//! Per-tile status and the small node payload the quadtree stores.
//!
//! Generalized from the teacher's `TileState` enum (`tile_system::types`),
//! which modeled a single-payload tile (`NotLoaded`/`Loading`/`Failed`/
//! `Loaded`). This crate pairs two payloads per tile (height + ortho), so
//! the status gains a `WaitingForSiblings` state between "one half has
//! arrived" and "both halves are on the GPU" — see spec §4.3.

use crate::tile_id::TileId;

/// The state of a single tile as tracked by the scheduler.
///
/// Modeled as a tagged sum per spec §9 ("never as integer constants").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// Freshly created leaf; no request has been issued yet.
    Uninitialised,
    /// A load service reported this tile has no data. Terminal until the
    /// node is removed by reduction and its parent later refines again.
    Unavailable,
    /// Both fetch requests are outstanding; no payload has arrived.
    InTransit,
    /// One of (height, ortho) has arrived and is buffered; waiting on the
    /// other.
    WaitingForSiblings,
    /// Both payloads arrived, paired, and handed off to the GPU manager.
    OnGpu,
}

impl TileStatus {
    /// `Uninitialised`/`OnGpu` nodes are the only ones allowed to carry
    /// children (spec §3 invariants); this is the leaf-vs-internal test for
    /// the *status itself*, ignoring whatever the tree structurally holds.
    pub fn is_leaf_only(&self) -> bool {
        matches!(
            self,
            TileStatus::Unavailable | TileStatus::InTransit | TileStatus::WaitingForSiblings
        )
    }
}

/// The payload every quadtree node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeData {
    pub id: TileId,
    pub status: TileStatus,
}

impl NodeData {
    pub fn new(id: TileId, status: TileStatus) -> Self {
        Self { id, status }
    }

    pub fn uninitialised(id: TileId) -> Self {
        Self::new(id, TileStatus::Uninitialised)
    }
}
