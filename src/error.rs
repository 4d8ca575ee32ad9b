//! Load-service errors and the scheduler's internal counters.
//!
//! Per spec §7, no error the scheduler encounters internally (stale
//! payload, duplicate arrival, invariant violation) is ever propagated to a
//! caller; each is logged and counted instead. `LoadError` is the one error
//! type that *does* cross an API boundary, and it belongs to the
//! load-service collaborator, not the scheduler.

use thiserror::Error;

/// Errors a [`crate::load_service::HeightTileLoadService`] or
/// [`crate::load_service::OrthoTileLoadService`] implementation may return.
///
/// Grounded in the `abetterworld` example's use of `thiserror` for its
/// content-pipeline error boundary, rather than the teacher's own
/// hand-rolled `TileError` enum (plain `Debug + Clone`, no
/// `std::error::Error` impl) — a typed library error at an async-trait
/// boundary should compose with `?`, which requires `std::error::Error`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The server authoritatively reported that this tile does not exist
    /// (e.g. a persistent HTTP 404), as opposed to a transient failure.
    #[error("tile {0} not found")]
    NotFound(crate::tile_id::TileId),

    /// Fetching the tile failed after exhausting retries, for any other
    /// reason (network error, non-2xx status, decode failure upstream of
    /// this crate's boundary).
    #[error("failed to fetch tile {id}: {source}")]
    Fetch {
        id: crate::tile_id::TileId,
        #[source]
        source: anyhow::Error,
    },
}

/// Counters for conditions spec §7 says must be "counted in a metric"
/// rather than surfaced as an error. Deliberately a plain struct rather than
/// a dependency on an external metrics crate: three counters do not
/// justify pulling in one, and spec.md explicitly rules out persistence or
/// a byte budget for this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerMetrics {
    /// A payload arrived for a tile that is no longer in the desired
    /// frontier (it was already expired or reduced away).
    pub stale_payloads: u64,
    /// A payload arrived for a tile whose slot was already filled.
    pub duplicate_arrivals: u64,
    /// An invariant violation was detected and recovered from rather than
    /// panicking.
    pub invariant_violations_recovered: u64,
}

impl SchedulerMetrics {
    pub fn record_stale_payload(&mut self) {
        self.stale_payloads += 1;
    }

    pub fn record_duplicate_arrival(&mut self) {
        self.duplicate_arrivals += 1;
    }

    pub fn record_invariant_violation_recovered(&mut self) {
        self.invariant_violations_recovered += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_start_at_zero() {
        let metrics = SchedulerMetrics::default();
        assert_eq!(metrics.stale_payloads, 0);
        assert_eq!(metrics.duplicate_arrivals, 0);
        assert_eq!(metrics.invariant_violations_recovered, 0);
    }

    #[test]
    fn each_recorder_increments_only_its_own_counter() {
        let mut metrics = SchedulerMetrics::default();
        metrics.record_stale_payload();
        metrics.record_duplicate_arrival();
        metrics.record_duplicate_arrival();
        assert_eq!(metrics.stale_payloads, 1);
        assert_eq!(metrics.duplicate_arrivals, 2);
        assert_eq!(metrics.invariant_violations_recovered, 0);
    }

    #[test]
    fn not_found_display_includes_tile_id() {
        let err = LoadError::NotFound(crate::tile_id::TileId::new(3, 1, 2));
        assert_eq!(err.to_string(), "tile 3/1/2 not found");
    }
}
