//! Event loop: poll input, route readiness requests, tick deferred work,
//! drain feedback, render.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use whorl_core::audio::{
    AudioFeedback, AudioHandle, NullSynth, OscSynth, ServerStatus, SynthBackend,
};
use whorl_core::config::Config;
use whorl_core::gesture::{GestureMachine, Touch};
use whorl_types::{Point, SliceIndex, Viewport};

use crate::view::{DiscView, CELL_ASPECT};

pub type Backend = CrosstermBackend<io::Stdout>;

/// Top-level runtime that owns the machine, the audio handle, and the view.
pub struct AppRuntime {
    machine: GestureMachine<SynthBackend>,
    audio: AudioHandle,
    audio_ok: bool,
    view: DiscView,
    focus: usize,
    render_needed: bool,
    last_render: Instant,
}

impl AppRuntime {
    pub fn new(cols: u16, rows: u16) -> Self {
        let config = Config::load();
        let (audio_ok, synth) = match config.osc_addr().parse() {
            Ok(addr) => match OscSynth::connect(addr) {
                Ok(s) => (true, SynthBackend::Osc(s)),
                Err(e) => {
                    log::warn!(target: "audio", "osc socket unavailable: {}", e);
                    (false, SynthBackend::Silent(NullSynth::new()))
                }
            },
            Err(e) => {
                log::warn!(target: "audio", "bad osc_addr in config: {}", e);
                (false, SynthBackend::Silent(NullSynth::new()))
            }
        };
        let viewport = viewport_for(cols, rows);
        let key_release = Duration::from_millis(config.key_release_ms());
        Self {
            machine: GestureMachine::new(synth, config.disc(), key_release, viewport),
            audio: AudioHandle::new(),
            audio_ok,
            view: DiscView::new(viewport),
            focus: 0,
            render_needed: true,
            last_render: Instant::now(),
        }
    }

    /// Main event loop.
    pub fn run(&mut self, terminal: &mut Terminal<Backend>) -> io::Result<()> {
        loop {
            if self.process_events()? {
                break;
            }
            let now = Instant::now();
            self.pump_audio(now);
            self.machine.tick(now);
            self.drain_feedback(now);
            self.maybe_render(terminal, now)?;
        }
        // Quitting is a lost interaction context like any other.
        self.machine.stop_all();
        Ok(())
    }

    /// Process input events. Returns true if the app should quit.
    fn process_events(&mut self) -> io::Result<bool> {
        let mut budget = 16u8;
        while budget > 0 && event::poll(Duration::from_millis(2))? {
            budget -= 1;
            self.render_needed = true;
            match event::read()? {
                Event::Key(key)
                    if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) =>
                {
                    match key.code {
                        KeyCode::Char('q') => return Ok(true),
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(true)
                        }
                        KeyCode::Esc => self.machine.stop_all(),
                        KeyCode::Left | KeyCode::Char('h') => self.move_focus(-1),
                        KeyCode::Right | KeyCode::Char('l') => self.move_focus(1),
                        KeyCode::Enter | KeyCode::Char(' ') => {
                            self.machine
                                .key_press(SliceIndex::new(self.focus), Instant::now());
                        }
                        _ => {}
                    }
                }
                Event::Mouse(mouse) => self.handle_mouse(mouse),
                Event::Resize(w, h) => {
                    let viewport = viewport_for(w, h);
                    self.machine.set_viewport(viewport);
                    self.view.set_viewport(viewport);
                }
                Event::FocusLost => self.machine.stop_all(),
                _ => {}
            }
        }
        Ok(false)
    }

    /// Map the terminal's single pointer onto the touch interface.
    fn handle_mouse(&mut self, mouse: event::MouseEvent) {
        let point = Point::new(mouse.column as f32, mouse.row as f32 * CELL_ASPECT);
        let touches = [Touch::new(0, point)];
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.machine.pointer_down(&touches),
            MouseEventKind::Drag(MouseButton::Left) => self.machine.pointer_move(&touches),
            MouseEventKind::Up(MouseButton::Left) => self.machine.pointer_up(&[]),
            // No second finger in a terminal; the wheel steps the count.
            MouseEventKind::ScrollUp => self.machine.adjust_slice_count(1),
            MouseEventKind::ScrollDown => self.machine.adjust_slice_count(-1),
            _ => {}
        }
    }

    fn move_focus(&mut self, delta: i64) {
        let count = self.machine.slice_count() as i64;
        self.focus = (self.focus as i64 + delta).rem_euclid(count) as usize;
    }

    /// Route readiness requests and feed the answers back.
    fn pump_audio(&mut self, now: Instant) {
        for req in self.machine.take_ready_requests() {
            self.audio.ensure_ready(req);
        }
        // The OSC socket either came up at startup or never will.
        if self.audio.status() == ServerStatus::Starting {
            self.audio.server_online(self.audio_ok);
        }
        while let Some(feedback) = self.audio.try_recv() {
            match feedback {
                AudioFeedback::Ready(req) => self.machine.resolve_ready(req, true, now),
                AudioFeedback::Unavailable(req) => self.machine.resolve_ready(req, false, now),
            }
        }
    }

    fn drain_feedback(&mut self, now: Instant) {
        let feedback = self.machine.drain_visual();
        if !feedback.is_empty() {
            self.render_needed = true;
        }
        for event in feedback {
            self.view.apply(event, now);
        }
    }

    fn maybe_render(&mut self, terminal: &mut Terminal<Backend>, now: Instant) -> io::Result<()> {
        let wanted = self.render_needed || self.view.has_live_pulse(now);
        if !wanted || now.duration_since(self.last_render) < Duration::from_millis(33) {
            return Ok(());
        }
        terminal.draw(|frame| self.view.render(frame, &self.machine, self.focus, now))?;
        self.render_needed = false;
        self.last_render = now;
        Ok(())
    }
}

fn viewport_for(cols: u16, rows: u16) -> Viewport {
    // Bottom row is the status line; rows are stretched for cell aspect.
    Viewport::new(cols as f32, rows.saturating_sub(1) as f32 * CELL_ASPECT)
}

/// Public entry point.
pub fn run(terminal: &mut Terminal<Backend>) -> io::Result<()> {
    let size = terminal.size()?;
    AppRuntime::new(size.width, size.height).run(terminal)
}
