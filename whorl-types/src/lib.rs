//! # whorl-types
//!
//! Shared type definitions for the whorl drone disc.
//! This crate contains data structures used across whorl-core and whorl-ui.

pub mod config;
mod feedback;
mod geom;
pub mod note;

pub use config::{DiscConfig, MAX_SLICE_COUNT, MIN_SLICE_COUNT};
pub use feedback::{NotePhase, VisualFeedback};
pub use geom::{Point, Viewport};
pub use note::{note_name, Degree};

/// Index of a wedge slice on the disc, in `[0, slice_count)`.
///
/// Identity is cyclic: rotating the disc changes which slice sits under a
/// point, never which note a slice plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SliceIndex(usize);

impl SliceIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SliceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
