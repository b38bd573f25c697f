//! # whorl-core
//!
//! Interaction core for the whorl drone disc: the geometry provider used for
//! hit-testing, the note lifecycle engine with its cancellable starts and
//! auto-lock timers, and the gesture state machine that drives both from raw
//! pointer events.
//!
//! Everything runs on a single-threaded cooperative event loop. The only
//! deferred work is the audio readiness round trip (queued request, answer on
//! a channel, generation-token check at resolution) and deadline-based timers
//! resolved by `tick`.

pub mod audio;
pub mod config;
pub mod geometry;
pub mod gesture;
pub mod notes;
