//! The gesture state machine: one ephemeral session for the current
//! multi-touch interaction.
//!
//! The session is a single tagged variant, so being simultaneously in two
//! gestures is unrepresentable. The machine owns the note engine, the
//! geometry cache, and the config store; it emits visual feedback into a
//! queue the front end drains. Hit-testing goes through the geometry
//! provider by point query, never through an event's original target.

use std::time::{Duration, Instant};

use whorl_types::{DiscConfig, NotePhase, Point, SliceIndex, Viewport, VisualFeedback};

use crate::audio::Synth;
use crate::config::ConfigStore;
use crate::geometry::{self, DiscGeometry, Hit};
use crate::notes::{NoteEngine, NoteEvent, PendingStart};

/// One touch point in an event's touch list.
///
/// The id is stable for a touch's lifetime; front ends with a single pointer
/// always use id 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: u64,
    pub point: Point,
}

impl Touch {
    pub fn new(id: u64, point: Point) -> Self {
        Self { id, point }
    }
}

/// The current gesture, for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Idle,
    SliceDrag,
    Rotate,
    Pinch,
}

#[derive(Debug)]
enum GestureSession {
    Idle,
    SliceDrag {
        /// Slices currently pressed by this gesture.
        pressed: Vec<SliceIndex>,
        /// Last slice visited; None after dragging off the disc.
        last: Option<SliceIndex>,
    },
    Rotate {
        last_angle: f32,
        /// Slice under the finger during a rotate-sweep.
        over_slice: Option<SliceIndex>,
    },
    Pinch {
        /// Touch separation the next slice-count step is measured from.
        baseline: f32,
    },
}

#[derive(Debug, Clone, Copy)]
struct KeyHold {
    index: SliceIndex,
    release_at: Instant,
}

/// Gesture state machine driving the note lifecycle engine.
pub struct GestureMachine<S: Synth> {
    session: GestureSession,
    notes: NoteEngine<S>,
    geometry: DiscGeometry,
    config: ConfigStore,
    visual: Vec<VisualFeedback>,
    key_holds: Vec<KeyHold>,
    key_release: Duration,
}

impl<S: Synth> GestureMachine<S> {
    pub fn new(synth: S, config: DiscConfig, key_release: Duration, viewport: Viewport) -> Self {
        let store = ConfigStore::new(config);
        let drone_lock = Duration::from_millis(store.get().drone_lock_ms);
        let slice_count = store.get().slice_count;
        Self {
            session: GestureSession::Idle,
            notes: NoteEngine::new(synth, drone_lock, slice_count),
            geometry: DiscGeometry::new(viewport),
            config: store,
            visual: Vec::new(),
            key_holds: Vec::new(),
            key_release,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn config(&self) -> &DiscConfig {
        self.config.get()
    }

    pub fn config_version(&self) -> u64 {
        self.config.version()
    }

    pub fn slice_count(&self) -> usize {
        self.config.get().slice_count
    }

    pub fn rotation_deg(&self) -> f32 {
        self.config.get().rotation_deg
    }

    pub fn gesture_kind(&self) -> GestureKind {
        match self.session {
            GestureSession::Idle => GestureKind::Idle,
            GestureSession::SliceDrag { .. } => GestureKind::SliceDrag,
            GestureSession::Rotate { .. } => GestureKind::Rotate,
            GestureSession::Pinch { .. } => GestureKind::Pinch,
        }
    }

    pub fn phases(&self) -> Vec<NotePhase> {
        self.notes.phases()
    }

    pub fn notes(&self) -> &NoteEngine<S> {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut NoteEngine<S> {
        &mut self.notes
    }

    /// Drain queued visual feedback for the front end.
    pub fn drain_visual(&mut self) -> Vec<VisualFeedback> {
        std::mem::take(&mut self.visual)
    }

    /// Drain readiness requests for routing to the audio subsystem.
    pub fn take_ready_requests(&mut self) -> Vec<PendingStart> {
        self.notes.take_ready_requests()
    }

    /// Feed an audio readiness answer back into the engine.
    pub fn resolve_ready(&mut self, req: PendingStart, ok: bool, now: Instant) {
        self.notes.resolve_ready(req, ok, now);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.geometry.set_viewport(viewport);
    }

    pub fn set_drone_lock_ms(&mut self, ms: u64) {
        self.config.set_drone_lock_ms(ms);
        self.notes.set_drone_lock(Duration::from_millis(ms));
    }

    /// Step the slice count directly (scroll wheel, settings).
    pub fn adjust_slice_count(&mut self, delta: i64) {
        let current = self.config.get().slice_count;
        let applied = self.config.set_slice_count(current as i64 + delta);
        if applied != current {
            self.notes.set_slice_count(applied);
            self.visual.push(VisualFeedback::Render);
        }
    }

    // ── Pointer events ────────────────────────────────────────────

    /// A new touch landed. `touches` is the full current touch list with the
    /// newest touch last.
    pub fn pointer_down(&mut self, touches: &[Touch]) {
        // Two touches inside the gripper ring begin a pinch, whatever was
        // happening before.
        if touches.len() >= 2 {
            let (a, b) = (touches[0].point, touches[1].point);
            if self.hit(a) == Hit::Gripper && self.hit(b) == Hit::Gripper {
                self.abandon_session();
                self.session = GestureSession::Pinch {
                    baseline: a.distance(b),
                };
                return;
            }
        }
        let Some(touch) = touches.last() else {
            return;
        };
        let point = touch.point;
        match self.hit(point) {
            Hit::Slice(index) if self.notes.is_locked(index) => {
                // Tapping a locked drone releases it; the event is consumed.
                self.notes.unlock(index);
                self.visual.push(VisualFeedback::Unlock(index));
            }
            Hit::Gripper => {
                self.abandon_session();
                let angle = geometry::angle_from_point(point, self.center());
                self.session = GestureSession::Rotate {
                    last_angle: angle,
                    over_slice: None,
                };
                self.visual.push(VisualFeedback::GripperActive);
            }
            Hit::Slice(index) => {
                if let GestureSession::SliceDrag { pressed, last } = &mut self.session {
                    // An additional finger on another slice: chord.
                    if !pressed.contains(&index) {
                        pressed.push(index);
                    }
                    *last = Some(index);
                } else {
                    self.abandon_session();
                    self.session = GestureSession::SliceDrag {
                        pressed: vec![index],
                        last: Some(index),
                    };
                }
                self.press_slice(index);
            }
            Hit::Outside => {}
        }
    }

    /// Touches moved. `touches` is the full current touch list.
    pub fn pointer_move(&mut self, touches: &[Touch]) {
        match self.session {
            GestureSession::Pinch { baseline } => {
                if touches.len() < 2 {
                    return;
                }
                let separation = touches[0].point.distance(touches[1].point);
                let delta = separation - baseline;
                let step = self.config.get().pinch_step_px;
                let slice_delta = (delta / step).round() as i64;
                if slice_delta == 0 {
                    return;
                }
                // Spreading the fingers widens the wedges: fewer slices.
                let current = self.config.get().slice_count as i64;
                let applied = self.config.set_slice_count(current - slice_delta);
                if applied as i64 != current {
                    self.notes.set_slice_count(applied);
                    self.visual.push(VisualFeedback::Render);
                    // Re-baseline so repeated small moves never accumulate.
                    self.session = GestureSession::Pinch {
                        baseline: separation,
                    };
                }
            }
            GestureSession::Rotate {
                last_angle,
                over_slice,
            } => {
                let Some(touch) = touches.first() else {
                    return;
                };
                let point = touch.point;
                let angle = geometry::angle_from_point(point, self.center());
                let delta = geometry::wrap_degrees(angle - last_angle);
                if delta != 0.0 {
                    self.config.rotate_by(delta);
                    self.visual.push(VisualFeedback::Render);
                }
                // Sweep: the finger may pass over slices while rotating.
                let over = match self.hit(point) {
                    Hit::Slice(index) => Some(index),
                    _ => None,
                };
                if over != over_slice {
                    if let Some(prev) = over_slice {
                        self.release_slice(prev);
                    }
                    if let Some(next) = over {
                        self.press_slice(next);
                    }
                }
                self.session = GestureSession::Rotate {
                    last_angle: angle,
                    over_slice: over,
                };
            }
            GestureSession::SliceDrag { .. } => self.drag_move(touches),
            GestureSession::Idle => {}
        }
    }

    /// A touch lifted. `remaining` is the touch list after the lift.
    ///
    /// A pinch losing one finger continues as a rotation or drag under the
    /// survivor; any other lift is the global release.
    pub fn pointer_up(&mut self, remaining: &[Touch]) {
        if matches!(self.session, GestureSession::Pinch { .. }) && remaining.len() == 1 {
            let point = remaining[0].point;
            self.session = GestureSession::Idle;
            match self.hit(point) {
                Hit::Gripper => {
                    let angle = geometry::angle_from_point(point, self.center());
                    self.session = GestureSession::Rotate {
                        last_angle: angle,
                        over_slice: None,
                    };
                    self.visual.push(VisualFeedback::GripperActive);
                }
                Hit::Slice(index) if !self.notes.is_locked(index) => {
                    self.session = GestureSession::SliceDrag {
                        pressed: vec![index],
                        last: Some(index),
                    };
                    self.press_slice(index);
                }
                _ => {}
            }
            return;
        }
        self.release_all();
    }

    /// Touch/pointer context lost; same as the global release.
    pub fn pointer_cancel(&mut self) {
        self.release_all();
    }

    /// Global release: every pressed slice stops (locked drones survive),
    /// session bookkeeping resets, the gripper deactivates. Unconditional
    /// and idempotent; duplicate or unmatched calls are safe.
    pub fn release_all(&mut self) {
        let session = std::mem::replace(&mut self.session, GestureSession::Idle);
        match session {
            GestureSession::SliceDrag { pressed, .. } => {
                for index in pressed {
                    self.release_slice(index);
                }
            }
            GestureSession::Rotate { over_slice, .. } => {
                if let Some(index) = over_slice {
                    self.release_slice(index);
                }
            }
            GestureSession::Pinch { .. } | GestureSession::Idle => {}
        }
        self.visual.push(VisualFeedback::GripperInactive);
    }

    // ── Keyboard path ─────────────────────────────────────────────

    /// Keyboard play: start now, stop after a fixed short hold. Bypasses the
    /// pointer session entirely. A repeat while held extends the hold.
    pub fn key_press(&mut self, index: SliceIndex, now: Instant) {
        if index.get() >= self.config.get().slice_count || self.notes.is_locked(index) {
            return;
        }
        self.press_slice(index);
        let release_at = now + self.key_release;
        if let Some(hold) = self.key_holds.iter_mut().find(|h| h.index == index) {
            hold.release_at = release_at;
        } else {
            self.key_holds.push(KeyHold { index, release_at });
        }
    }

    // ── Deferred work ─────────────────────────────────────────────

    /// Resolve scheduled keyboard releases and auto-lock deadlines.
    pub fn tick(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.key_holds.retain(|hold| {
            if now >= hold.release_at {
                due.push(hold.index);
                false
            } else {
                true
            }
        });
        for index in due {
            self.release_slice(index);
        }
        for event in self.notes.tick(now) {
            match event {
                NoteEvent::Locked(index) => self.visual.push(VisualFeedback::Lock(index)),
            }
        }
    }

    /// Panic/recovery path: silence everything, reset the session.
    /// Invoked on focus loss, visibility loss, or the escape key.
    pub fn stop_all(&mut self) {
        log::debug!(target: "gesture", "stop_all");
        self.session = GestureSession::Idle;
        self.key_holds.clear();
        self.notes.stop_all();
        self.visual.push(VisualFeedback::GripperInactive);
        self.visual.push(VisualFeedback::Render);
    }

    // ── Internals ─────────────────────────────────────────────────

    fn hit(&mut self, point: Point) -> Hit {
        self.geometry
            .hit(self.config.get(), self.config.version(), point)
    }

    fn center(&mut self) -> Point {
        self.geometry
            .center(self.config.get(), self.config.version())
    }

    /// Start a slice and light it up. Locked slices are left alone.
    fn press_slice(&mut self, index: SliceIndex) {
        if self.notes.is_locked(index) {
            return;
        }
        self.notes.start(index);
        self.visual.push(VisualFeedback::Press(index));
    }

    /// Stop a slice and dim it. Locked drones survive.
    fn release_slice(&mut self, index: SliceIndex) {
        if self.notes.is_locked(index) {
            return;
        }
        self.notes.stop(index, false);
        self.visual.push(VisualFeedback::Release(index));
    }

    /// Drop the current session, releasing whatever it pressed. Used when a
    /// gesture converts into another; emits no gripper feedback.
    fn abandon_session(&mut self) {
        let session = std::mem::replace(&mut self.session, GestureSession::Idle);
        match session {
            GestureSession::SliceDrag { pressed, .. } => {
                for index in pressed {
                    self.release_slice(index);
                }
            }
            GestureSession::Rotate { over_slice, .. } => {
                if let Some(index) = over_slice {
                    self.release_slice(index);
                }
            }
            GestureSession::Pinch { .. } | GestureSession::Idle => {}
        }
    }

    /// Drag moved: re-resolve the slice under the pointer by point query.
    fn drag_move(&mut self, touches: &[Touch]) {
        let Some(touch) = touches.first() else {
            return;
        };
        let point = touch.point;
        match self.hit(point) {
            Hit::Gripper => {
                // Entering the ring converts the drag into a rotation.
                self.abandon_session();
                let angle = geometry::angle_from_point(point, self.center());
                self.session = GestureSession::Rotate {
                    last_angle: angle,
                    over_slice: None,
                };
                self.visual.push(VisualFeedback::GripperActive);
            }
            Hit::Slice(index) => {
                let GestureSession::SliceDrag { pressed, last } = &mut self.session else {
                    return;
                };
                if *last == Some(index) {
                    return;
                }
                let prev = *last;
                *last = Some(index);
                if let Some(p) = prev {
                    if let Some(pos) = pressed.iter().position(|&i| i == p) {
                        pressed.remove(pos);
                    }
                }
                if !pressed.contains(&index) {
                    pressed.push(index);
                }
                if let Some(p) = prev {
                    self.release_slice(p);
                }
                self.press_slice(index);
            }
            Hit::Outside => {
                let GestureSession::SliceDrag { pressed, last } = &mut self.session else {
                    return;
                };
                let released = std::mem::take(pressed);
                *last = None;
                for index in released {
                    self.release_slice(index);
                }
            }
        }
    }
}
