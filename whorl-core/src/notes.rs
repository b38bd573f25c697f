//! Per-slice note lifecycle: Idle -> Pending -> Active -> Locked.
//!
//! One tagged state per slice index, exclusively owned here. Starts are
//! cancellable: `start` queues a readiness request carrying a generation
//! token, and only the continuation holding the current token may advance to
//! Active. The auto-lock deadline lives inside the `Active` variant, so a
//! timer handle exists exactly while the state that armed it does; a stale
//! fire is structurally impossible and `tick` checks the current state
//! regardless.

use std::time::{Duration, Instant};

use whorl_types::{note_name, NotePhase, SliceIndex};

use crate::audio::Synth;

/// Generation token guarding a pending start against stale continuations.
pub type Generation = u64;

/// A queued readiness request produced by `start`, answered through
/// `resolve_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStart {
    pub index: SliceIndex,
    pub token: Generation,
}

/// Events the engine reports outward from `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    /// A held note crossed its auto-lock deadline and became a drone.
    Locked(SliceIndex),
}

#[derive(Debug, Clone)]
enum NoteState {
    Idle,
    Pending { token: Generation },
    Active { note: String, lock_at: Instant },
    Locked { note: String },
}

#[derive(Debug)]
struct NoteSlot {
    state: NoteState,
    /// Bumped on every start and on stop-while-pending; a Pending token that
    /// no longer matches is a cancelled epoch.
    generation: Generation,
}

impl NoteSlot {
    fn new() -> Self {
        Self {
            state: NoteState::Idle,
            generation: 0,
        }
    }
}

/// The note lifecycle engine: one slot per slice index.
///
/// Slots beyond the current slice count are retained (Idle) so generation
/// counters stay monotone across pinch resizes.
pub struct NoteEngine<S: Synth> {
    slots: Vec<NoteSlot>,
    slice_count: usize,
    synth: S,
    drone_lock: Duration,
    ready_requests: Vec<PendingStart>,
}

impl<S: Synth> NoteEngine<S> {
    pub fn new(synth: S, drone_lock: Duration, slice_count: usize) -> Self {
        let mut slots = Vec::with_capacity(slice_count);
        slots.resize_with(slice_count, NoteSlot::new);
        Self {
            slots,
            slice_count,
            synth,
            drone_lock,
            ready_requests: Vec::new(),
        }
    }

    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    pub fn set_drone_lock(&mut self, drone_lock: Duration) {
        self.drone_lock = drone_lock;
    }

    /// Resize the slice table. Slices falling off the end are force-stopped;
    /// their slots stay allocated so generations never repeat.
    pub fn set_slice_count(&mut self, count: usize) {
        if count < self.slice_count {
            for index in count..self.slice_count {
                self.stop(SliceIndex::new(index), true);
            }
        }
        if self.slots.len() < count {
            self.slots.resize_with(count, NoteSlot::new);
        }
        self.slice_count = count;
    }

    pub fn phase(&self, index: SliceIndex) -> NotePhase {
        match self.slots.get(index.get()).map(|s| &s.state) {
            Some(NoteState::Pending { .. }) => NotePhase::Pending,
            Some(NoteState::Active { .. }) => NotePhase::Active,
            Some(NoteState::Locked { .. }) => NotePhase::Locked,
            _ => NotePhase::Idle,
        }
    }

    /// Render-facing phases for every slice in `[0, slice_count)`.
    pub fn phases(&self) -> Vec<NotePhase> {
        (0..self.slice_count)
            .map(|i| self.phase(SliceIndex::new(i)))
            .collect()
    }

    pub fn is_locked(&self, index: SliceIndex) -> bool {
        self.phase(index) == NotePhase::Locked
    }

    pub fn synth(&self) -> &S {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut S {
        &mut self.synth
    }

    /// Request a note start. No-op unless the slice is Idle.
    ///
    /// Marks the slice Pending under a fresh generation token and queues a
    /// readiness request; the sound attacks only when `resolve_ready` later
    /// observes that same token. At most one Active transition and one
    /// attack per start epoch, however calls overlap.
    pub fn start(&mut self, index: SliceIndex) {
        let Some(slot) = self.slots.get_mut(index.get()) else {
            return;
        };
        if !matches!(slot.state, NoteState::Idle) {
            return;
        }
        slot.generation += 1;
        slot.state = NoteState::Pending {
            token: slot.generation,
        };
        self.ready_requests.push(PendingStart {
            index,
            token: slot.generation,
        });
    }

    /// Drain readiness requests queued by `start`, for routing to the audio
    /// subsystem.
    pub fn take_ready_requests(&mut self) -> Vec<PendingStart> {
        std::mem::take(&mut self.ready_requests)
    }

    /// Continuation of `start`: the audio subsystem answered.
    ///
    /// Advances to Active only when the slice is still Pending under the
    /// request's token and the token is still current. A cancelled epoch
    /// settles the slice back to Idle without a sound; anything else is a
    /// no-op.
    pub fn resolve_ready(&mut self, req: PendingStart, ok: bool, now: Instant) {
        let drone_lock = self.drone_lock;
        let Some(slot) = self.slots.get_mut(req.index.get()) else {
            return;
        };
        match slot.state {
            NoteState::Pending { token } if token == req.token => {
                if token != slot.generation {
                    // Cancelled while in flight: settle to Idle, no sound.
                    slot.state = NoteState::Idle;
                } else if ok {
                    let note = note_name(req.index);
                    self.synth.note_on(&note);
                    slot.state = NoteState::Active {
                        note,
                        lock_at: now + drone_lock,
                    };
                } else {
                    log::warn!(target: "notes", "audio unavailable, slice {} stays silent", req.index);
                    slot.state = NoteState::Idle;
                }
            }
            _ => {}
        }
    }

    /// Stop a slice. Locked slices ignore this unless `force` is set.
    ///
    /// Active releases the sound; Pending bumps the generation so the
    /// in-flight start resolves to silence; Idle is a no-op.
    pub fn stop(&mut self, index: SliceIndex, force: bool) {
        let Some(slot) = self.slots.get_mut(index.get()) else {
            return;
        };
        match &slot.state {
            NoteState::Locked { .. } if !force => {}
            NoteState::Locked { note } | NoteState::Active { note, .. } => {
                self.synth.note_off(note);
                slot.state = NoteState::Idle;
            }
            NoteState::Pending { .. } => {
                // The bump cancels the in-flight start; its continuation will
                // observe a stale token. Forced stops settle to Idle now
                // instead of waiting for the continuation.
                slot.generation += 1;
                if force {
                    slot.state = NoteState::Idle;
                }
            }
            NoteState::Idle => {}
        }
    }

    /// Promote a held note to a drone. Valid only from Active.
    pub fn lock(&mut self, index: SliceIndex) {
        let Some(slot) = self.slots.get_mut(index.get()) else {
            return;
        };
        if matches!(slot.state, NoteState::Active { .. }) {
            if let NoteState::Active { note, .. } =
                std::mem::replace(&mut slot.state, NoteState::Idle)
            {
                slot.state = NoteState::Locked { note };
            }
        }
    }

    /// Release a drone. Valid only from Locked; always stops the sound.
    pub fn unlock(&mut self, index: SliceIndex) {
        let Some(slot) = self.slots.get_mut(index.get()) else {
            return;
        };
        if let NoteState::Locked { note } = &slot.state {
            self.synth.note_off(note);
            slot.state = NoteState::Idle;
        }
    }

    /// Panic/recovery path: force every slice to Idle, releasing sounds and
    /// invalidating every in-flight start. Callable from any state.
    pub fn stop_all(&mut self) {
        for index in 0..self.slots.len() {
            self.stop(SliceIndex::new(index), true);
        }
        self.ready_requests.clear();
        self.synth.all_off();
    }

    /// Resolve auto-lock deadlines. An Active slice past its deadline
    /// becomes Locked and is reported; everything else is untouched.
    pub fn tick(&mut self, now: Instant) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let due = matches!(slot.state, NoteState::Active { lock_at, .. } if now >= lock_at);
            if due {
                if let NoteState::Active { note, .. } =
                    std::mem::replace(&mut slot.state, NoteState::Idle)
                {
                    slot.state = NoteState::Locked { note };
                    events.push(NoteEvent::Locked(SliceIndex::new(i)));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSynth;

    const LOCK: Duration = Duration::from_millis(1500);

    fn engine() -> NoteEngine<NullSynth> {
        NoteEngine::new(NullSynth::new(), LOCK, 8)
    }

    fn s(i: usize) -> SliceIndex {
        SliceIndex::new(i)
    }

    #[test]
    fn start_marks_pending_and_queues_request() {
        let mut eng = engine();
        eng.start(s(3));
        assert_eq!(eng.phase(s(3)), NotePhase::Pending);
        let reqs = eng.take_ready_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].index, s(3));
        assert!(eng.synth().attacks.is_empty());
    }

    #[test]
    fn double_start_queues_one_request() {
        let mut eng = engine();
        eng.start(s(3));
        eng.start(s(3));
        assert_eq!(eng.take_ready_requests().len(), 1);
    }

    #[test]
    fn resolve_current_token_attacks_once() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(0));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        assert_eq!(eng.phase(s(0)), NotePhase::Active);
        assert_eq!(eng.synth().attacks, vec!["C3".to_string()]);
        // A duplicate answer for the same epoch is a no-op.
        eng.resolve_ready(req, true, now);
        assert_eq!(eng.synth().attacks.len(), 1);
    }

    #[test]
    fn stop_while_pending_cancels_in_flight_start() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(2));
        let req = eng.take_ready_requests()[0];
        eng.stop(s(2), false);
        eng.resolve_ready(req, true, now);
        assert_eq!(eng.phase(s(2)), NotePhase::Idle);
        assert!(eng.synth().attacks.is_empty());
    }

    #[test]
    fn resolve_unavailable_settles_idle_silently() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(1));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, false, now);
        assert_eq!(eng.phase(s(1)), NotePhase::Idle);
        assert!(eng.synth().attacks.is_empty());
    }

    #[test]
    fn stop_active_releases_sound() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(0));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.stop(s(0), false);
        assert_eq!(eng.phase(s(0)), NotePhase::Idle);
        assert_eq!(eng.synth().releases, vec!["C3".to_string()]);
    }

    #[test]
    fn auto_lock_fires_at_deadline() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(4));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        assert!(eng.tick(now + LOCK - Duration::from_millis(1)).is_empty());
        let events = eng.tick(now + LOCK);
        assert_eq!(events, vec![NoteEvent::Locked(s(4))]);
        assert_eq!(eng.phase(s(4)), NotePhase::Locked);
        // The sound keeps going: no release on lock.
        assert!(eng.synth().releases.is_empty());
    }

    #[test]
    fn stop_before_deadline_prevents_lock() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(4));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.stop(s(4), false);
        assert!(eng.tick(now + LOCK * 2).is_empty());
        assert_eq!(eng.phase(s(4)), NotePhase::Idle);
    }

    #[test]
    fn explicit_lock_cancels_deadline() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(5));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.lock(s(5));
        assert_eq!(eng.phase(s(5)), NotePhase::Locked);
        // No second lock event from the old deadline.
        assert!(eng.tick(now + LOCK * 2).is_empty());
    }

    #[test]
    fn lock_outside_active_is_noop() {
        let mut eng = engine();
        eng.lock(s(0));
        assert_eq!(eng.phase(s(0)), NotePhase::Idle);
        eng.start(s(0));
        eng.lock(s(0));
        assert_eq!(eng.phase(s(0)), NotePhase::Pending);
    }

    #[test]
    fn locked_ignores_stop_without_force() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(0));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.lock(s(0));
        eng.stop(s(0), false);
        assert_eq!(eng.phase(s(0)), NotePhase::Locked);
        eng.stop(s(0), true);
        assert_eq!(eng.phase(s(0)), NotePhase::Idle);
        assert_eq!(eng.synth().releases, vec!["C3".to_string()]);
    }

    #[test]
    fn locked_start_and_lock_are_noops() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(0));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.lock(s(0));
        eng.start(s(0));
        eng.lock(s(0));
        assert_eq!(eng.phase(s(0)), NotePhase::Locked);
        assert!(eng.take_ready_requests().is_empty());
    }

    #[test]
    fn unlock_releases_drone() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(7));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.lock(s(7));
        eng.unlock(s(7));
        assert_eq!(eng.phase(s(7)), NotePhase::Idle);
        assert_eq!(eng.synth().releases, vec!["C4".to_string()]);
        // Unlock from anything but Locked is a no-op.
        eng.unlock(s(7));
        assert_eq!(eng.synth().releases.len(), 1);
    }

    #[test]
    fn stop_all_sweeps_every_state() {
        let mut eng = engine();
        let now = Instant::now();
        // One Active, one Locked, one Pending.
        eng.start(s(0));
        eng.start(s(1));
        eng.start(s(2));
        let reqs = eng.take_ready_requests();
        eng.resolve_ready(reqs[0], true, now);
        eng.resolve_ready(reqs[1], true, now);
        eng.lock(s(1));
        let in_flight = reqs[2];

        eng.stop_all();
        for i in 0..8 {
            assert_eq!(eng.phase(s(i)), NotePhase::Idle);
        }
        assert!(eng.synth().sounding().is_empty());
        // A readiness answer scheduled before the sweep resolves as a no-op.
        eng.resolve_ready(in_flight, true, now);
        assert_eq!(eng.phase(s(2)), NotePhase::Idle);
        assert_eq!(eng.synth().attacks.len(), 2);
        // Deadlines died with their states.
        assert!(eng.tick(now + LOCK * 2).is_empty());
    }

    #[test]
    fn generation_survives_resize() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(7));
        let first = eng.take_ready_requests()[0];
        eng.stop(s(7), false);
        eng.set_slice_count(6);
        eng.set_slice_count(8);
        eng.resolve_ready(first, true, now);
        assert_eq!(eng.phase(s(7)), NotePhase::Idle);
        assert!(eng.synth().attacks.is_empty());
        // A fresh start on the regrown slice uses a new token.
        eng.start(s(7));
        let second = eng.take_ready_requests()[0];
        assert_ne!(second.token, first.token);
    }

    #[test]
    fn shrink_stops_sounding_slices() {
        let mut eng = engine();
        let now = Instant::now();
        eng.start(s(7));
        let req = eng.take_ready_requests()[0];
        eng.resolve_ready(req, true, now);
        eng.set_slice_count(6);
        assert!(eng.synth().sounding().is_empty());
        assert_eq!(eng.slice_count(), 6);
    }
}
