//! Tile identity and the small amount of spatial-reference-system algebra
//! the scheduler needs: ancestry, subtile enumeration, overlap testing and
//! the conversion of a [`TileId`] into its Web Mercator [`Bounds`].
//!
//! Ported from the zoom/xy identity in `srs.cpp` of the original renderer,
//! generalized from a C++ `glm::uvec2`-keyed struct to a plain Rust value
//! type with `Copy`/`Hash`/`Eq` derived instead of hand-rolled comparisons.

use glam::DVec2;

/// Semi-major axis of the sphere the original renderer projects onto, in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Full circumference of [`EARTH_RADIUS_M`], i.e. `C` in spec terms.
pub const EARTH_CIRCUMFERENCE_M: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS_M;

/// Fixed SW, SE, NW, NE child order: `dy` outer, `dx` inner.
pub const CHILD_OFFSETS: [(u32, u32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Identifies a single quadtree node: `(zoom, x, y)`. The root is `(0, 0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub const ROOT: TileId = TileId { zoom: 0, x: 0, y: 0 };

    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// A TileId is valid when `zoom < 100` (spec §3).
    pub const fn is_valid(&self) -> bool {
        self.zoom < 100
    }

    /// The four subtiles in fixed SW, SE, NW, NE order.
    pub fn subtiles(&self) -> [TileId; 4] {
        let zoom = self.zoom + 1;
        CHILD_OFFSETS.map(|(dx, dy)| TileId::new(zoom, self.x * 2 + dx, self.y * 2 + dy))
    }

    /// The parent tile, or `None` at the root.
    pub fn parent(&self) -> Option<TileId> {
        if self.zoom == 0 {
            None
        } else {
            Some(TileId::new(self.zoom - 1, self.x / 2, self.y / 2))
        }
    }

    /// Number of tiles along one axis at this zoom level (`2^zoom`).
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.zoom
    }

    /// The Web Mercator bounds of this tile, in meters.
    ///
    /// SW corner of the root is `(-C/2, -C/2)`; a tile's width at zoom `z`
    /// is `C / 2^z`.
    pub fn bounds(&self) -> Bounds {
        let tile_size = EARTH_CIRCUMFERENCE_M / self.tiles_per_axis() as f64;
        let origin = DVec2::splat(-EARTH_CIRCUMFERENCE_M / 2.0);
        let min = origin + DVec2::new(self.x as f64, self.y as f64) * tile_size;
        let max = min + DVec2::splat(tile_size);
        Bounds { min, max }
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Axis-aligned bounds in Web Mercator meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds {
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

/// `true` iff `a` and `b` cover the same ground, i.e. one is an ancestor of
/// (or equal to) the other. Ported from `srs::overlap` in the original
/// renderer: project the finer tile up to the coarser tile's zoom level by
/// integer-halving its coordinates, then compare.
pub fn overlap(a: TileId, b: TileId) -> bool {
    let (coarse, mut fine) = if a.zoom <= b.zoom { (a, b) } else { (b, a) };

    while fine.zoom != coarse.zoom {
        fine = TileId::new(fine.zoom - 1, fine.x / 2, fine.y / 2);
    }

    coarse == fine
}
