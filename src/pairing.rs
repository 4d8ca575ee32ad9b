//! Pairing buffer: holds whichever half of a (height, ortho) pair has
//! arrived first, keyed by tile id, until its sibling shows up.
//!
//! Grounded in the teacher's `tile_system::cache` (two separate maps, one
//! per payload kind, indexed by tile id) but generalized per spec §3/§4.3:
//! the teacher cache is a single combined store keyed on a loaded
//! `TileState`, whereas this buffer only ever holds the *not yet paired*
//! half of a tile, and the two maps are an explicit invariant-bearing type
//! rather than incidental struct fields.

use std::collections::HashMap;

use bytes::Bytes;

use crate::tile_id::TileId;

/// Holds the first-arrived half of any in-flight (height, ortho) pair.
///
/// Invariant (spec §3): at steady state the two maps are disjoint — a tile
/// id is never a key of both `height` and `ortho` at once, since the moment
/// both halves are present the pair is taken out via [`PairingBuffer::take_pair`]
/// in the same call that inserts the second half.
#[derive(Debug, Default)]
pub struct PairingBuffer {
    height: HashMap<TileId, Bytes>,
    ortho: HashMap<TileId, Bytes>,
}

/// Outcome of inserting one half of a pair.
pub enum Insert {
    /// The sibling had already arrived; both payloads are returned and the
    /// tile is no longer held by the buffer.
    Paired(Bytes, Bytes),
    /// Still waiting on the sibling.
    StillWaiting,
}

impl PairingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly-arrived height payload for `id`. Returns `Paired` if
    /// an ortho payload for the same id was already buffered.
    pub fn insert_height(&mut self, id: TileId, payload: Bytes) -> Insert {
        if let Some(ortho) = self.ortho.remove(&id) {
            return Insert::Paired(payload, ortho);
        }
        self.height.insert(id, payload);
        Insert::StillWaiting
    }

    /// Record a newly-arrived ortho payload for `id`. Returns `Paired` if a
    /// height payload for the same id was already buffered.
    pub fn insert_ortho(&mut self, id: TileId, payload: Bytes) -> Insert {
        if let Some(height) = self.height.remove(&id) {
            return Insert::Paired(height, payload);
        }
        self.ortho.insert(id, payload);
        Insert::StillWaiting
    }

    /// `true` if either half of `id`'s pair is currently buffered.
    pub fn is_waiting(&self, id: TileId) -> bool {
        self.height.contains_key(&id) || self.ortho.contains_key(&id)
    }

    /// Drop any buffered half for `id`, e.g. on cancellation or expiration.
    /// Returns whether anything was actually removed.
    pub fn discard(&mut self, id: TileId) -> bool {
        let had_height = self.height.remove(&id).is_some();
        let had_ortho = self.ortho.remove(&id).is_some();
        had_height || had_ortho
    }

    /// Number of tiles whose height payload has arrived and is buffered,
    /// waiting on its ortho counterpart.
    pub fn count_waiting_for_height(&self) -> usize {
        self.height.len()
    }

    /// Number of tiles whose ortho payload has arrived and is buffered,
    /// waiting on its height counterpart.
    pub fn count_waiting_for_ortho(&self) -> usize {
        self.ortho.len()
    }

    /// A tile id held by both maps at once, if any. Structurally this should
    /// never happen (`insert_height`/`insert_ortho` always pair-and-remove
    /// rather than letting both sides accumulate) — exposed for the
    /// scheduler's consistency self-check (spec §4.3/§7) to verify that
    /// invariant rather than just assume it.
    pub fn overlapping_id(&self) -> Option<TileId> {
        self.height.keys().find(|id| self.ortho.contains_key(id)).copied()
    }
}
