//! Viewport-to-disc coordinate conversions and hit-testing.
//!
//! The pure functions here never touch state; `DiscGeometry` layers a
//! memoized center/radii computation on top, invalidated whenever the
//! viewport or the configuration version changes. Hit-testing always uses
//! the un-narrowed wedge shape: hit boundaries never shift under the
//! pressed-wedge animation.

use whorl_types::{DiscConfig, Point, SliceIndex, Viewport};

/// Angle of a point around a center via `atan2`, in degrees, `(-180, 180]`.
pub fn angle_from_point(point: Point, center: Point) -> f32 {
    (point.y - center.y).atan2(point.x - center.x).to_degrees()
}

/// Elliptical radius at an angle for semi-axes `rx`, `ry`.
///
/// Preserves proportional wedge shape on non-square viewports.
pub fn radius_at_angle(angle_deg: f32, rx: f32, ry: f32) -> f32 {
    let t = angle_deg.to_radians();
    (rx * ry) / ((ry * t.cos()).powi(2) + (rx * t.sin()).powi(2)).sqrt()
}

/// Wedge index under a point: normalize the angle to `[0, 360)`, subtract the
/// disc rotation, divide by the wedge width, floor.
pub fn slice_index_at_point(
    point: Point,
    center: Point,
    slice_count: usize,
    rotation_deg: f32,
) -> SliceIndex {
    let angle = angle_from_point(point, center).rem_euclid(360.0);
    let local = (angle - rotation_deg).rem_euclid(360.0);
    let step = 360.0 / slice_count as f32;
    let index = (local / step) as usize;
    // Floating-point edge: local fractionally below 360 can floor to count.
    SliceIndex::new(index.min(slice_count - 1))
}

/// Whether a point falls inside the gripper ring: distance within
/// `[inner_radius * ring_ratio, inner_radius]`.
pub fn is_within_ring(point: Point, center: Point, inner_radius: f32, ring_ratio: f32) -> bool {
    let d = point.distance(center);
    d >= inner_radius * ring_ratio && d <= inner_radius
}

/// Result of a full-disc hit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// Outside the disc, or inside the dead zone at the very center.
    Outside,
    /// Inside the rotation gripper ring.
    Gripper,
    /// On a wedge slice.
    Slice(SliceIndex),
}

#[derive(Debug, Clone, Copy)]
struct Derived {
    version: u64,
    center: Point,
    rx: f32,
    ry: f32,
}

/// Memoized disc geometry.
///
/// Center and radii are derived from the viewport and configuration; the
/// cache is keyed by the configuration version and dropped on resize.
#[derive(Debug)]
pub struct DiscGeometry {
    viewport: Viewport,
    derived: Option<Derived>,
}

impl DiscGeometry {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            derived: None,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Replace the viewport, dropping the derived cache if it changed.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            log::trace!(target: "geometry", "viewport {}x{}", viewport.width, viewport.height);
            self.viewport = viewport;
            self.derived = None;
        }
    }

    fn derived(&mut self, config: &DiscConfig, version: u64) -> Derived {
        match self.derived {
            Some(d) if d.version == version => d,
            _ => {
                let base = self.viewport.center();
                let d = Derived {
                    version,
                    center: Point::new(base.x + config.center_dx, base.y + config.center_dy),
                    rx: self.viewport.width * config.radius_pct,
                    ry: self.viewport.height * config.radius_pct,
                };
                self.derived = Some(d);
                d
            }
        }
    }

    /// Disc center for the current viewport and configuration.
    pub fn center(&mut self, config: &DiscConfig, version: u64) -> Point {
        self.derived(config, version).center
    }

    /// Disc semi-axes for the current viewport and configuration.
    pub fn radii(&mut self, config: &DiscConfig, version: u64) -> (f32, f32) {
        let d = self.derived(config, version);
        (d.rx, d.ry)
    }

    /// Classify a point against the un-narrowed disc: gripper ring, wedge
    /// slice, or outside (including the dead zone inside the gripper).
    pub fn hit(&mut self, config: &DiscConfig, version: u64, point: Point) -> Hit {
        let d = self.derived(config, version);
        let angle = angle_from_point(point, d.center);
        let edge = radius_at_angle(angle, d.rx, d.ry);
        let inner = edge * config.ring_pct;
        let dist = point.distance(d.center);
        if dist > edge {
            Hit::Outside
        } else if is_within_ring(point, d.center, inner, config.ring_ratio) {
            Hit::Gripper
        } else if dist > inner {
            Hit::Slice(slice_index_at_point(
                point,
                d.center,
                config.slice_count,
                config.rotation_deg,
            ))
        } else {
            Hit::Outside
        }
    }
}

/// Wrap an angular delta into `[-180, 180]`.
pub fn wrap_degrees(delta: f32) -> f32 {
    let d = delta.rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DiscConfig {
        DiscConfig::default()
    }

    #[test]
    fn angle_east_is_zero() {
        let c = Point::new(0.0, 0.0);
        assert_eq!(angle_from_point(Point::new(10.0, 0.0), c), 0.0);
    }

    #[test]
    fn angle_south_is_90() {
        // y grows downward, so "south" on screen is +90.
        let c = Point::new(0.0, 0.0);
        assert_eq!(angle_from_point(Point::new(0.0, 10.0), c), 90.0);
    }

    #[test]
    fn angle_north_is_minus_90() {
        let c = Point::new(0.0, 0.0);
        assert_eq!(angle_from_point(Point::new(0.0, -10.0), c), -90.0);
    }

    #[test]
    fn radius_on_circle_is_constant() {
        for deg in [0.0, 37.0, 90.0, 215.0] {
            let r = radius_at_angle(deg, 100.0, 100.0);
            assert!((r - 100.0).abs() < 1e-3);
        }
    }

    #[test]
    fn radius_on_ellipse_hits_axes() {
        assert!((radius_at_angle(0.0, 200.0, 100.0) - 200.0).abs() < 1e-3);
        assert!((radius_at_angle(90.0, 200.0, 100.0) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn slice_index_eight_slices_fifty_degrees() {
        // 8 slices, no rotation, point at 50 degrees -> floor(50/45) = 1.
        let c = Point::new(0.0, 0.0);
        let p = Point::new(50.0f32.to_radians().cos(), 50.0f32.to_radians().sin());
        assert_eq!(slice_index_at_point(p, c, 8, 0.0), SliceIndex::new(1));
    }

    #[test]
    fn slice_index_subtracts_rotation() {
        // Same point, disc rotated 45 degrees: local angle 5 -> slice 0.
        let c = Point::new(0.0, 0.0);
        let p = Point::new(50.0f32.to_radians().cos(), 50.0f32.to_radians().sin());
        assert_eq!(slice_index_at_point(p, c, 8, 45.0), SliceIndex::new(0));
    }

    #[test]
    fn slice_index_wraps_negative_local_angle() {
        // Point at 10 degrees, rotation 30: local -20 wraps to 340 -> slice 7.
        let c = Point::new(0.0, 0.0);
        let p = Point::new(10.0f32.to_radians().cos(), 10.0f32.to_radians().sin());
        assert_eq!(slice_index_at_point(p, c, 8, 30.0), SliceIndex::new(7));
    }

    #[test]
    fn slice_index_never_reaches_count() {
        let c = Point::new(0.0, 0.0);
        // Fractionally below a full turn.
        let p = Point::new(
            (-0.001f32).to_radians().cos(),
            (-0.001f32).to_radians().sin(),
        );
        assert!(slice_index_at_point(p, c, 8, 0.0).get() < 8);
    }

    #[test]
    fn ring_membership_bounds() {
        let c = Point::new(0.0, 0.0);
        assert!(is_within_ring(Point::new(50.0, 0.0), c, 100.0, 0.4));
        assert!(is_within_ring(Point::new(40.0, 0.0), c, 100.0, 0.4));
        assert!(is_within_ring(Point::new(100.0, 0.0), c, 100.0, 0.4));
        assert!(!is_within_ring(Point::new(39.0, 0.0), c, 100.0, 0.4));
        assert!(!is_within_ring(Point::new(101.0, 0.0), c, 100.0, 0.4));
    }

    #[test]
    fn hit_classifies_regions() {
        let mut geom = DiscGeometry::new(Viewport::new(1000.0, 1000.0));
        let config = cfg();
        // center (500,500), rx = ry = 450, gripper outer edge = 157.5.
        assert_eq!(geom.hit(&config, 0, Point::new(500.0, 500.0)), Hit::Outside);
        assert_eq!(geom.hit(&config, 0, Point::new(620.0, 500.0)), Hit::Gripper);
        assert!(matches!(
            geom.hit(&config, 0, Point::new(800.0, 500.0)),
            Hit::Slice(_)
        ));
        assert_eq!(geom.hit(&config, 0, Point::new(990.0, 500.0)), Hit::Outside);
    }

    #[test]
    fn hit_slice_tracks_rotation() {
        let mut geom = DiscGeometry::new(Viewport::new(1000.0, 1000.0));
        let mut config = cfg();
        config.slice_count = 8;
        let p = Point::new(800.0, 500.0); // angle 0 from center
        assert_eq!(geom.hit(&config, 0, p), Hit::Slice(SliceIndex::new(0)));
        config.rotation_deg = 44.0;
        // Version bump invalidates the cache; local angle -44 wraps to 316 -> slice 7.
        assert_eq!(geom.hit(&config, 1, p), Hit::Slice(SliceIndex::new(7)));
    }

    #[test]
    fn derived_cache_invalidated_by_version() {
        let mut geom = DiscGeometry::new(Viewport::new(1000.0, 1000.0));
        let mut config = cfg();
        let before = geom.center(&config, 0);
        config.center_dx = 100.0;
        // Same version: memoized value survives a config edit that skipped the store.
        assert_eq!(geom.center(&config, 0), before);
        let after = geom.center(&config, 1);
        assert_eq!(after.x, before.x + 100.0);
    }

    #[test]
    fn derived_cache_invalidated_by_resize() {
        let mut geom = DiscGeometry::new(Viewport::new(1000.0, 1000.0));
        let config = cfg();
        assert_eq!(geom.center(&config, 0), Point::new(500.0, 500.0));
        geom.set_viewport(Viewport::new(600.0, 400.0));
        assert_eq!(geom.center(&config, 0), Point::new(300.0, 200.0));
    }

    #[test]
    fn wrap_degrees_range() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(10.0), 10.0);
        assert_eq!(wrap_degrees(-10.0), -10.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
    }
}
