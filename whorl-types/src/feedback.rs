use serde::{Deserialize, Serialize};

use crate::SliceIndex;

/// Render-facing lifecycle phase of a slice.
///
/// The engine owns the full tagged state; this is the tag alone, for
/// consumers that only draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotePhase {
    #[default]
    Idle,
    Pending,
    Active,
    Locked,
}

/// Fire-and-forget notifications for whoever draws the disc.
///
/// The core never depends on the consumer; events are queued by the gesture
/// machine and drained by the front end each loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualFeedback {
    /// A slice was pressed (wedge narrows toward its centroid).
    Press(SliceIndex),
    /// A pressed slice was released.
    Release(SliceIndex),
    /// A held note locked into a drone; carries a one-shot pulse.
    Lock(SliceIndex),
    /// A locked drone was released.
    Unlock(SliceIndex),
    /// The rotation gripper was grabbed.
    GripperActive,
    /// The rotation gripper was let go.
    GripperInactive,
    /// Slice count or rotation changed; re-render the disc.
    Render,
}
