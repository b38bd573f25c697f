use serde::{Deserialize, Serialize};

/// Fewest slices the disc can be pinched down to.
pub const MIN_SLICE_COUNT: usize = 6;
/// Most slices the disc can be pinched up to.
pub const MAX_SLICE_COUNT: usize = 72;

/// Tunable parameters of the disc.
///
/// Supplied by the configuration provider, read by the geometry provider and
/// the gesture machine. Every mutation goes through the config store so the
/// geometry cache sees a version bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscConfig {
    /// Number of wedge slices, clamped to `[MIN_SLICE_COUNT, MAX_SLICE_COUNT]`.
    pub slice_count: usize,
    /// Disc rotation in degrees, normalized to `[0, 360)`.
    pub rotation_deg: f32,
    /// Continuous hold time before an Active note locks into a drone.
    pub drone_lock_ms: u64,
    /// Gripper inner edge as a fraction of its outer edge.
    pub ring_ratio: f32,
    /// Gripper outer edge as a fraction of the disc radius at that angle.
    pub ring_pct: f32,
    /// Pinch separation change per slice-count step, in pixels.
    pub pinch_step_px: f32,
    /// Disc semi-axes as a fraction of the viewport dimensions.
    pub radius_pct: f32,
    /// Disc center offset from the viewport center, in pixels.
    pub center_dx: f32,
    pub center_dy: f32,
}

impl DiscConfig {
    /// Clamp a candidate slice count to the fixed bounds.
    pub fn clamp_slice_count(count: i64) -> usize {
        count.clamp(MIN_SLICE_COUNT as i64, MAX_SLICE_COUNT as i64) as usize
    }

    /// Normalize a rotation angle to `[0, 360)`.
    pub fn normalize_rotation(deg: f32) -> f32 {
        deg.rem_euclid(360.0)
    }
}

impl Default for DiscConfig {
    fn default() -> Self {
        Self {
            slice_count: 12,
            rotation_deg: 0.0,
            drone_lock_ms: 1500,
            ring_ratio: 0.4,
            ring_pct: 0.35,
            pinch_step_px: 20.0,
            radius_pct: 0.45,
            center_dx: 0.0,
            center_dy: 0.0,
        }
    }
}
