//! Sound handoff and audio-subsystem readiness.
//!
//! The synth is one shared resource keyed by note name, with independent
//! attack/release per note identity. Readiness is the event-loop rendering of
//! the cancellable asynchronous start: the engine queues a `PendingStart`,
//! the runtime routes it through `AudioHandle`, and the answer comes back on
//! a channel to be checked against the generation token.

use std::net::{SocketAddr, UdpSocket};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rosc::{encoder, OscMessage, OscPacket, OscType};

use crate::notes::PendingStart;

/// Sound producer keyed by note name.
///
/// The note string from `whorl_types::note_name` is the sole handoff; the
/// synth never sees slice indices or gesture state.
pub trait Synth {
    /// Begin sounding a note. Attacking an already-sounding name is the
    /// synth's problem to de-duplicate; the engine never does it.
    fn note_on(&mut self, note: &str);
    /// Release a sounding note.
    fn note_off(&mut self, note: &str);
    /// Panic path: silence everything.
    fn all_off(&mut self);
}

/// Synth that records attacks and releases instead of sounding them.
/// Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct NullSynth {
    pub attacks: Vec<String>,
    pub releases: Vec<String>,
    sounding: Vec<String>,
}

impl NullSynth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes currently sounding, in attack order.
    pub fn sounding(&self) -> &[String] {
        &self.sounding
    }
}

impl Synth for NullSynth {
    fn note_on(&mut self, note: &str) {
        self.attacks.push(note.to_string());
        self.sounding.push(note.to_string());
    }

    fn note_off(&mut self, note: &str) {
        self.releases.push(note.to_string());
        if let Some(pos) = self.sounding.iter().position(|n| n == note) {
            self.sounding.remove(pos);
        }
    }

    fn all_off(&mut self) {
        self.sounding.clear();
    }
}

/// OSC client for an external synthesis server.
///
/// Fire-and-forget UDP sends; a lost datagram degrades to a missed attack or
/// release, never an error surfaced to the gesture handler.
pub struct OscSynth {
    socket: UdpSocket,
    server_addr: SocketAddr,
}

impl OscSynth {
    pub fn connect(server_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            server_addr,
        })
    }

    fn send(&self, addr: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        match encoder::encode(&packet) {
            Ok(buf) => {
                let _ = self.socket.send_to(&buf, self.server_addr);
            }
            Err(e) => {
                log::warn!(target: "audio", "failed to encode {}: {}", addr, e);
            }
        }
    }
}

impl Synth for OscSynth {
    fn note_on(&mut self, note: &str) {
        self.send("/whorl/note_on", vec![OscType::String(note.to_string())]);
    }

    fn note_off(&mut self, note: &str) {
        self.send("/whorl/note_off", vec![OscType::String(note.to_string())]);
    }

    fn all_off(&mut self) {
        self.send("/whorl/all_off", vec![]);
    }
}

/// Synth selected at startup: OSC when the socket came up, silent otherwise.
pub enum SynthBackend {
    Osc(OscSynth),
    Silent(NullSynth),
}

impl Synth for SynthBackend {
    fn note_on(&mut self, note: &str) {
        match self {
            SynthBackend::Osc(s) => s.note_on(note),
            SynthBackend::Silent(s) => s.note_on(note),
        }
    }

    fn note_off(&mut self, note: &str) {
        match self {
            SynthBackend::Osc(s) => s.note_off(note),
            SynthBackend::Silent(s) => s.note_off(note),
        }
    }

    fn all_off(&mut self) {
        match self {
            SynthBackend::Osc(s) => s.all_off(),
            SynthBackend::Silent(s) => s.all_off(),
        }
    }
}

/// Audio server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// Readiness answers from the audio subsystem to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFeedback {
    /// The subsystem is up; the pending start may advance.
    Ready(PendingStart),
    /// The subsystem is unavailable; the pending start resolves to silence.
    Unavailable(PendingStart),
}

/// Owns the server status and answers readiness requests.
///
/// Requests arriving while the server is starting are parked and flushed by
/// `server_online`. Answers always travel through the channel, even when the
/// server is already up, so resolution is a distinct loop iteration from the
/// request and cancellation can slip in between.
pub struct AudioHandle {
    status: ServerStatus,
    waiting: Vec<PendingStart>,
    tx: Sender<AudioFeedback>,
    rx: Receiver<AudioFeedback>,
}

impl Default for AudioHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHandle {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            status: ServerStatus::Stopped,
            waiting: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Route a queued readiness request.
    pub fn ensure_ready(&mut self, req: PendingStart) {
        match self.status {
            ServerStatus::Running => {
                let _ = self.tx.send(AudioFeedback::Ready(req));
            }
            ServerStatus::Starting => self.waiting.push(req),
            ServerStatus::Stopped => {
                log::debug!(target: "audio", "readiness requested, starting server");
                self.status = ServerStatus::Starting;
                self.waiting.push(req);
            }
            ServerStatus::Error => {
                let _ = self.tx.send(AudioFeedback::Unavailable(req));
            }
        }
    }

    /// The server came up (or failed to); flush parked requests.
    pub fn server_online(&mut self, ok: bool) {
        self.status = if ok {
            ServerStatus::Running
        } else {
            log::warn!(target: "audio", "audio server unavailable");
            ServerStatus::Error
        };
        for req in self.waiting.drain(..) {
            let answer = if ok {
                AudioFeedback::Ready(req)
            } else {
                AudioFeedback::Unavailable(req)
            };
            let _ = self.tx.send(answer);
        }
    }

    /// Drain one readiness answer, if any.
    pub fn try_recv(&mut self) -> Option<AudioFeedback> {
        self.rx.try_recv().ok()
    }
}
