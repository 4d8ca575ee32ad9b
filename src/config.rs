//! Scheduler configuration.
//!
//! Grounded in the pack's common convention of a small `serde`-derived
//! config struct (e.g. the WorldAtWar `geocoord`/`countries` crates, and the
//! teacher's own `resources::settings`) rather than hand-parsed flags or
//! environment variables scattered through the scheduler itself.

use serde::{Deserialize, Serialize};

/// URL template variants for tile servers, per spec §6. `z`/`x`/`y` name the
/// zoom/column/row; `_yPointingSouth` variants flip the row so that `y`
/// increases southward instead of the tree's native northward convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    Zxy,
    Zyx,
    ZxyYPointingSouth,
    ZyxYPointingSouth,
}

impl UrlPattern {
    /// Builds the path segment (zoom/col/row ordering applied, no base URL
    /// or extension) for `id` at `tiles_per_axis` tiles per axis.
    pub fn path_segment(&self, id: crate::tile_id::TileId) -> String {
        let flipped_y = || id.tiles_per_axis() - 1 - id.y;
        match self {
            UrlPattern::Zxy => format!("{}/{}/{}", id.zoom, id.x, id.y),
            UrlPattern::Zyx => format!("{}/{}/{}", id.zoom, id.y, id.x),
            UrlPattern::ZxyYPointingSouth => format!("{}/{}/{}", id.zoom, id.x, flipped_y()),
            UrlPattern::ZyxYPointingSouth => format!("{}/{}/{}", id.zoom, flipped_y(), id.x),
        }
    }
}

/// Endpoint configuration for a single load service (height or ortho).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub pattern: UrlPattern,
    pub extension: String,
}

impl EndpointConfig {
    pub fn url_for(&self, id: crate::tile_id::TileId) -> String {
        format!(
            "{}/{}.{}",
            self.base_url.trim_end_matches('/'),
            self.pattern.path_segment(id),
            self.extension
        )
    }
}

/// Tunables for a [`crate::scheduler::TileScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Screen-space pixel threshold above which a tile must be refined
    /// further (spec §4.2).
    pub visibility_threshold: f64,
    /// Deepest zoom level the scheduler will ever refine to, regardless of
    /// visibility.
    pub max_zoom: u8,
    pub height_endpoint: EndpointConfig,
    pub ortho_endpoint: EndpointConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 256.0,
            max_zoom: 18,
            height_endpoint: EndpointConfig {
                base_url: "https://alpinemaps.cg.tuwien.ac.at/tiles/height".to_string(),
                pattern: UrlPattern::Zxy,
                extension: "png".to_string(),
            },
            ortho_endpoint: EndpointConfig {
                base_url: "https://alpinemaps.cg.tuwien.ac.at/tiles/ortho".to_string(),
                pattern: UrlPattern::Zxy,
                extension: "jpeg".to_string(),
            },
        }
    }
}
