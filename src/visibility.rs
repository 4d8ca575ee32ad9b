//! Camera state and the visibility predicate that drives refinement.
//!
//! The original renderer derives this from a full `Camera` (view/projection
//! matrices, frustum planes — see `original_source/alpine_renderer/Camera.h`,
//! whose `clippingPlanes()` returns the six `geometry::Plane<double>` this
//! module's [`Plane`] stands in for). Per spec §1, camera matrix math is out
//! of scope here: this module takes the six planes and the handful of
//! scalars the screen-space/angular heuristic of spec §4.2 needs, rather
//! than the view/projection matrices they'd normally be extracted from.

use crate::tile_id::Bounds;
use glam::DVec3;

/// Rough bracket of Earth's surface elevation, meters, used to extrude a
/// tile's flat 2D bounds into the 3D AABB the frustum test needs (spec
/// §4.2: "a tile's 2D AABB extruded over the full terrain height range").
pub const TERRAIN_MIN_ELEVATION_M: f64 = -11_000.0;
pub const TERRAIN_MAX_ELEVATION_M: f64 = 9_000.0;

/// A single frustum clipping plane, `{normal, distance}` such that a point
/// `p` is on the inside (kept) half-space when `normal.dot(p) + distance >=
/// 0`. Stands in for `geometry::Plane<double>` from the original renderer's
/// `Camera::clippingPlanes()`, which this crate does not depend on (camera
/// math is out of scope per spec §1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// A plane every point is on the inside of; used to build a frustum that
    /// never culls, for callers that have not wired up real clipping planes.
    pub const fn always_inside() -> Self {
        Self {
            normal: DVec3::ZERO,
            distance: 1.0,
        }
    }

    fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// The minimal camera state the visibility predicate needs: eye position in
/// the same Web Mercator meters frame as [`crate::tile_id::TileId::bounds`],
/// a precomputed screen-space error threshold, and the six view frustum
/// clipping planes (spec §6 `update_camera`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Camera eye position, meters, same frame as tile bounds. Height above
    /// the ground plane drives the screen-space error estimate.
    pub eye: DVec3,
    /// Half the vertical field of view, in radians.
    pub fov_y_radians: f64,
    /// Viewport height in pixels.
    pub viewport_height_px: f64,
    /// The six view frustum clipping planes, camera space folded into world
    /// space by whoever owns the real camera.
    pub clipping_planes: [Plane; 6],
}

impl CameraState {
    pub fn new(eye: DVec3, fov_y_radians: f64, viewport_height_px: f64) -> Self {
        Self::with_frustum(
            eye,
            fov_y_radians,
            viewport_height_px,
            [Plane::always_inside(); 6],
        )
    }

    pub fn with_frustum(
        eye: DVec3,
        fov_y_radians: f64,
        viewport_height_px: f64,
        clipping_planes: [Plane; 6],
    ) -> Self {
        Self {
            eye,
            fov_y_radians,
            viewport_height_px,
            clipping_planes,
        }
    }

    /// Approximate screen-space size, in pixels, that a tile of the given
    /// [`Bounds`] would project to, given its distance from the camera.
    ///
    /// This is the angular/screen-space heuristic spec §4.2 calls for in
    /// place of true geometric-error LOD (explicitly a non-goal per §1):
    /// `pixel_size ~= (tile_width / distance) * (viewport_height / (2 *
    /// tan(fov_y / 2)))`.
    fn projected_pixel_size(&self, bounds: &Bounds) -> f64 {
        let center = bounds.center();
        let to_center = DVec3::new(center.x, center.y, 0.0) - self.eye;
        let distance = to_center.length().max(1.0);
        let projection_factor = self.viewport_height_px / (2.0 * (self.fov_y_radians / 2.0).tan());
        bounds.width().max(bounds.height()) / distance * projection_factor
    }
}

/// The eight corners of `bounds` extruded over the full terrain elevation
/// bracket (spec §4.2).
fn aabb_corners(bounds: &Bounds) -> [DVec3; 8] {
    let mut corners = [DVec3::ZERO; 8];
    let mut i = 0;
    for x in [bounds.min.x, bounds.max.x] {
        for y in [bounds.min.y, bounds.max.y] {
            for z in [TERRAIN_MIN_ELEVATION_M, TERRAIN_MAX_ELEVATION_M] {
                corners[i] = DVec3::new(x, y, z);
                i += 1;
            }
        }
    }
    corners
}

/// Conservative AABB/frustum test: `bounds` is culled only when some plane
/// has every extruded corner strictly on its outside. A tile straddling a
/// plane, or fully inside all six, is treated as visible (spec §4.2 point 1:
/// "point-in-polytope test against the 6 clipping planes").
pub fn intersects_frustum(bounds: &Bounds, clipping_planes: &[Plane; 6]) -> bool {
    let corners = aabb_corners(bounds);
    clipping_planes
        .iter()
        .all(|plane| corners.iter().any(|&c| plane.signed_distance(c) >= 0.0))
}

/// `true` when a node covering `bounds` must be refined further: it is
/// inside the view frustum and its projected screen-space size exceeds
/// `visibility_threshold` pixels. Mirrors the `should_refine` predicate of
/// spec §4.1/§4.2 (both conditions, in order — the frustum test short
/// circuits the cheaper of the two checks last).
pub fn should_refine(camera: &CameraState, bounds: &Bounds, visibility_threshold: f64) -> bool {
    intersects_frustum(bounds, &camera.clipping_planes)
        && camera.projected_pixel_size(bounds) > visibility_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_id::TileId;

    fn camera_at(height: f64) -> CameraState {
        CameraState::new(DVec3::new(0.0, 0.0, height), std::f64::consts::FRAC_PI_4, 1080.0)
    }

    #[test]
    fn closer_camera_refines_more() {
        let bounds = TileId::new(2, 2, 2).bounds();
        let near = camera_at(1_000.0);
        let far = camera_at(10_000_000.0);
        assert!(should_refine(&near, &bounds, 1.0));
        assert!(!should_refine(&far, &bounds, 1.0));
    }

    #[test]
    fn tile_fully_behind_a_clipping_plane_is_never_refined() {
        let bounds = TileId::new(2, 2, 2).bounds();
        let near = camera_at(1_000.0);
        // A plane whose inside half-space excludes every corner of `bounds`.
        let excluding_plane = Plane::new(DVec3::new(0.0, 0.0, 1.0), -1.0e9);
        let mut planes = near.clipping_planes;
        planes[0] = excluding_plane;
        let culled = CameraState { clipping_planes: planes, ..near };
        assert!(!should_refine(&culled, &bounds, 1.0));
    }

    #[test]
    fn intersects_frustum_true_for_unbounded_default_frustum() {
        let bounds = TileId::ROOT.bounds();
        let planes = [Plane::always_inside(); 6];
        assert!(intersects_frustum(&bounds, &planes));
    }
}
