//! Terminal rendering of the disc: the visual feedback sink.
//!
//! Slice phases are drawn from the engine's phase table each frame; the
//! drained feedback events only carry what the table cannot: gripper state
//! and one-shot lock pulses.

use std::time::{Duration, Instant};

use ratatui::layout::Position;
use ratatui::style::{Color, Modifier, Style};
use ratatui::Frame;

use whorl_core::audio::Synth;
use whorl_core::geometry::{DiscGeometry, Hit};
use whorl_core::gesture::{GestureKind, GestureMachine};
use whorl_types::{note_name, NotePhase, Point, SliceIndex, Viewport, VisualFeedback};

/// How long a lock pulse stays highlighted.
const PULSE: Duration = Duration::from_millis(300);

/// Terminal cells are roughly twice as tall as wide; rows are stretched by
/// this factor so the disc renders round.
pub const CELL_ASPECT: f32 = 2.0;

pub struct DiscView {
    geometry: DiscGeometry,
    gripper_active: bool,
    pulses: Vec<(SliceIndex, Instant)>,
}

impl DiscView {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            geometry: DiscGeometry::new(viewport),
            gripper_active: false,
            pulses: Vec::new(),
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.geometry.set_viewport(viewport);
    }

    /// Consume one drained feedback event.
    pub fn apply(&mut self, feedback: VisualFeedback, now: Instant) {
        match feedback {
            VisualFeedback::Lock(index) => self.pulses.push((index, now)),
            VisualFeedback::GripperActive => self.gripper_active = true,
            VisualFeedback::GripperInactive => self.gripper_active = false,
            // Press/release/unlock and config changes are drawn from the
            // phase table on the next frame.
            _ => {}
        }
    }

    /// Whether a lock pulse is still fading (keeps frames coming).
    pub fn has_live_pulse(&self, now: Instant) -> bool {
        self.pulses
            .iter()
            .any(|(_, at)| now.duration_since(*at) < PULSE)
    }

    pub fn render<S: Synth>(
        &mut self,
        frame: &mut Frame,
        machine: &GestureMachine<S>,
        focus: usize,
        now: Instant,
    ) {
        self.pulses.retain(|(_, at)| now.duration_since(*at) < PULSE);
        let area = frame.area();
        if area.height < 2 {
            return;
        }
        let phases = machine.phases();
        let config = machine.config();
        let version = machine.config_version();
        let focus = focus % phases.len().max(1);
        let disc_rows = area.height - 1;

        let buf = frame.buffer_mut();
        for row in 0..disc_rows {
            for col in 0..area.width {
                let point = Point::new(col as f32, row as f32 * CELL_ASPECT);
                let (ch, style) = match self.geometry.hit(config, version, point) {
                    Hit::Outside => (' ', Style::default()),
                    Hit::Gripper => {
                        if self.gripper_active {
                            ('▒', Style::default().fg(Color::Cyan))
                        } else {
                            ('░', Style::default().fg(Color::DarkGray))
                        }
                    }
                    Hit::Slice(index) => self.slice_cell(index, &phases, focus),
                };
                if let Some(cell) = buf.cell_mut(Position::new(area.x + col, area.y + row)) {
                    cell.set_char(ch);
                    cell.set_style(style);
                }
            }
        }

        let status = status_line(machine, focus);
        buf.set_string(
            area.x,
            area.y + area.height - 1,
            status,
            Style::default().fg(Color::Gray),
        );
    }

    fn slice_cell(&self, index: SliceIndex, phases: &[NotePhase], focus: usize) -> (char, Style) {
        let phase = phases.get(index.get()).copied().unwrap_or_default();
        let (ch, mut style) = match phase {
            NotePhase::Idle => ('·', Style::default().fg(Color::DarkGray)),
            NotePhase::Pending => ('○', Style::default().fg(Color::Yellow)),
            NotePhase::Active => ('●', Style::default().fg(Color::Green)),
            NotePhase::Locked => ('◆', Style::default().fg(Color::Magenta)),
        };
        if self.pulses.iter().any(|(i, _)| *i == index) {
            style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
        }
        if index.get() == focus {
            style = style.add_modifier(Modifier::BOLD);
        }
        (ch, style)
    }
}

fn status_line<S: Synth>(machine: &GestureMachine<S>, focus: usize) -> String {
    let drones = machine
        .phases()
        .iter()
        .filter(|p| **p == NotePhase::Locked)
        .count();
    let gesture = match machine.gesture_kind() {
        GestureKind::Idle => "",
        GestureKind::SliceDrag => " drag",
        GestureKind::Rotate => " rotate",
        GestureKind::Pinch => " pinch",
    };
    format!(
        " whorl  {} slices  rot {:>5.1}  drones {}  focus {}{}  [enter] play  [esc] stop  [q] quit",
        machine.slice_count(),
        machine.rotation_deg(),
        drones,
        note_name(SliceIndex::new(focus)),
        gesture,
    )
}
