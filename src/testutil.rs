//! Fakes shared by the unit tests: an engine that records what it is asked
//! to do, MIDI ports driven by hand, and a backend that pulls audio on its
//! own thread the way an output device would.

use crate::audio::{AudioFormat, AudioOutputError, AudioStream, SynthSource};
use crate::catalog::{Catalog, CatalogLoadError, Preset};
use crate::engine::{ControlMessage, EngineError, EngineHandle, SynthEngine};
use crate::midi::{DeviceOpenError, Dispatcher, InputConnection, InputPort};
use crate::session::Backend;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Left channel level while a note sounds.
pub const FAKE_LEFT_LEVEL: f32 = 0.25;
/// Right channel level while a note sounds.
pub const FAKE_RIGHT_LEVEL: f32 = 0.5;
/// Frames a released note keeps sounding for.
pub const RELEASE_FRAMES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Control(ControlMessage),
    Render { frames: usize, audible_frames: usize },
    Marker(String),
}

#[derive(Default)]
struct LogState {
    events: Vec<EngineEvent>,
    held: BTreeSet<(u8, u8)>,
    /// (bank, program) per channel.
    programs: [(u8, u8); 16],
    /// (channel, key, bank, program) for every note that started.
    sounded: Vec<(u8, u8, u8, u8)>,
    release_remaining: usize,
}

/// Shared record of everything a [`FakeEngine`] was asked to do.
#[derive(Clone, Default)]
pub struct EngineLog(Arc<Mutex<LogState>>);

impl EngineLog {
    fn state(&self) -> MutexGuard<'_, LogState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, marker: impl Into<String>) {
        self.state().events.push(EngineEvent::Marker(marker.into()));
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.state().events.clone()
    }

    pub fn position(&self, event: &EngineEvent) -> Option<usize> {
        self.state().events.iter().position(|e| e == event)
    }

    pub fn control_messages(&self) -> Vec<ControlMessage> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Control(message) => Some(*message),
                _ => None,
            })
            .collect()
    }

    pub fn render_calls(&self) -> Vec<usize> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Render { frames, .. } => Some(*frames),
                _ => None,
            })
            .collect()
    }

    pub fn held_notes(&self) -> BTreeSet<(u8, u8)> {
        self.state().held.clone()
    }

    pub fn sounded(&self) -> Vec<(u8, u8, u8, u8)> {
        self.state().sounded.clone()
    }
}

/// An engine that sounds a constant level while any note is held, with a
/// short release tail after the last note stops.
pub struct FakeEngine {
    log: EngineLog,
    process_delay: Duration,
    render_delay: Duration,
    panic_on_key: Option<u8>,
}

impl FakeEngine {
    pub fn new(log: EngineLog) -> Self {
        Self {
            log,
            process_delay: Duration::ZERO,
            render_delay: Duration::ZERO,
            panic_on_key: None,
        }
    }
}

impl SynthEngine for FakeEngine {
    fn process(&mut self, message: ControlMessage) {
        if let ControlMessage::NoteOn { key, .. } = message {
            if Some(key) == self.panic_on_key {
                panic!("fake engine asked to play key {}", key);
            }
        }
        if !self.process_delay.is_zero() {
            thread::sleep(self.process_delay);
        }

        let mut state = self.log.state();
        state.events.push(EngineEvent::Control(message));
        match message {
            ControlMessage::BankSelectMsb { channel, value } => {
                state.programs[channel as usize].0 = value
            }
            ControlMessage::ProgramChange { channel, program } => {
                state.programs[channel as usize].1 = program
            }
            ControlMessage::NoteOn { channel, key, .. } => {
                let (bank, program) = state.programs[channel as usize];
                state.held.insert((channel, key));
                state.sounded.push((channel, key, bank, program));
            }
            ControlMessage::NoteOff { channel, key } => {
                if state.held.remove(&(channel, key)) && state.held.is_empty() {
                    state.release_remaining = RELEASE_FRAMES;
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        if !self.render_delay.is_zero() {
            thread::sleep(self.render_delay);
        }

        let mut state = self.log.state();
        let audible = if state.held.is_empty() {
            let audible = state.release_remaining.min(left.len());
            state.release_remaining -= audible;
            audible
        } else {
            left.len()
        };

        left[..audible].fill(FAKE_LEFT_LEVEL);
        right[..audible].fill(FAKE_RIGHT_LEVEL);
        left[audible..].fill(0.0);
        right[audible..].fill(0.0);
        state.events.push(EngineEvent::Render {
            frames: left.len(),
            audible_frames: audible,
        });
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.log.mark("engine dropped");
    }
}

/// Returns a handle whose engine lock is poisoned.
pub fn poisoned_engine() -> EngineHandle {
    let mut engine = FakeEngine::new(EngineLog::default());
    engine.panic_on_key = Some(0);
    let handle = EngineHandle::new(engine);
    let poisoner = handle.clone();
    let _ = thread::spawn(move || {
        let _ = poisoner.send(ControlMessage::NoteOn {
            channel: 0,
            key: 0,
            velocity: 1,
        });
    })
    .join();
    handle
}

/// Plays events into a [`MockPort`] as if they came from hardware.
#[derive(Clone)]
pub struct MockKeys(Arc<Mutex<Option<Dispatcher>>>);

impl MockKeys {
    /// Delivers raw MIDI bytes. Returns false if the port is not connected.
    pub fn press(&self, raw: &[u8]) -> bool {
        let target = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match target.as_ref() {
            Some(dispatcher) => {
                dispatcher.dispatch(raw);
                true
            }
            None => false,
        }
    }
}

/// A MIDI input port driven by [`MockKeys`].
pub struct MockPort {
    name: String,
    keys: MockKeys,
    fail: bool,
    log: Option<EngineLog>,
}

impl MockPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keys: MockKeys(Arc::new(Mutex::new(None))),
            fail: false,
            log: None,
        }
    }

    /// A port that refuses to connect.
    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// Records open and close markers in `log`.
    pub fn with_log(mut self, log: EngineLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn keys(&self) -> MockKeys {
        self.keys.clone()
    }
}

impl fmt::Display for MockPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl InputPort for MockPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(
        self: Box<Self>,
        dispatcher: Dispatcher,
    ) -> Result<Box<dyn InputConnection>, DeviceOpenError> {
        if self.fail {
            return Err(DeviceOpenError::Connect {
                device: self.name.clone(),
                reason: "mock failure".to_string(),
            });
        }
        *self.keys.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);
        if let Some(log) = &self.log {
            log.mark(format!("input opened: {}", self.name));
        }
        Ok(Box::new(MockConnection {
            name: self.name,
            keys: self.keys,
            log: self.log,
        }))
    }
}

struct MockConnection {
    name: String,
    keys: MockKeys,
    log: Option<EngineLog>,
}

impl InputConnection for MockConnection {
    fn close(self: Box<Self>) {
        self.keys
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(log) = &self.log {
            log.mark(format!("input closed: {}", self.name));
        }
    }
}

/// Time between fake device callbacks.
const CALLBACK_PERIOD: Duration = Duration::from_millis(2);

/// Pulls one block per callback from a [`SynthSource`] on its own thread.
struct FakeAudioStream {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    log: EngineLog,
}

impl FakeAudioStream {
    fn start(
        mut source: SynthSource,
        block_samples: usize,
        callback_times: Arc<Mutex<Vec<Duration>>>,
        log: EngineLog,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        log.mark("audio started");
        let thread = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let started = Instant::now();
                    for _ in 0..block_samples {
                        if source.next().is_none() {
                            return;
                        }
                    }
                    callback_times
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(started.elapsed());
                    thread::sleep(CALLBACK_PERIOD);
                }
            })
        };
        Self {
            stop,
            thread: Some(thread),
            log,
        }
    }
}

impl AudioStream for FakeAudioStream {
    fn stop(mut self: Box<Self>) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.log.mark("audio stopped");
    }
}

/// A backend with an in-memory catalog, hand-driven MIDI ports and a fake
/// audio device.
pub struct FakeBackend {
    log: EngineLog,
    presets: Option<Vec<Preset>>,
    ports: Vec<MockPort>,
    midi_available: bool,
    process_delay: Duration,
    render_delay: Duration,
    panic_on_key: Option<u8>,
    callback_times: Arc<Mutex<Vec<Duration>>>,
}

impl FakeBackend {
    pub fn new(log: EngineLog, presets: Vec<Preset>) -> Self {
        Self {
            log,
            presets: Some(presets),
            ports: Vec::new(),
            midi_available: true,
            process_delay: Duration::ZERO,
            render_delay: Duration::ZERO,
            panic_on_key: None,
            callback_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A backend whose bank file does not exist.
    pub fn missing_catalog(log: EngineLog) -> Self {
        Self {
            presets: None,
            ..Self::new(log, Vec::new())
        }
    }

    pub fn with_ports(mut self, ports: Vec<MockPort>) -> Self {
        self.ports = ports;
        self
    }

    /// Makes MIDI enumeration fail.
    pub fn without_midi(mut self) -> Self {
        self.midi_available = false;
        self
    }

    pub fn with_delays(mut self, process: Duration, render: Duration) -> Self {
        self.process_delay = process;
        self.render_delay = render;
        self
    }

    /// Makes the engine panic when asked to play `key`.
    pub fn panic_on_key(mut self, key: u8) -> Self {
        self.panic_on_key = Some(key);
        self
    }

    /// Durations of every audio callback, in order.
    pub fn callback_times(&self) -> Arc<Mutex<Vec<Duration>>> {
        self.callback_times.clone()
    }
}

impl Backend for FakeBackend {
    fn load_catalog(&mut self) -> Result<Catalog, CatalogLoadError> {
        match self.presets.clone() {
            Some(presets) => Catalog::new(presets),
            None => Err(CatalogLoadError::NotFound(PathBuf::from("missing.sf2"))),
        }
    }

    fn create_engine(&mut self, _format: AudioFormat) -> Result<Box<dyn SynthEngine>, EngineError> {
        Ok(Box::new(FakeEngine {
            log: self.log.clone(),
            process_delay: self.process_delay,
            render_delay: self.render_delay,
            panic_on_key: self.panic_on_key,
        }))
    }

    fn start_audio(
        &mut self,
        source: SynthSource,
    ) -> Result<Box<dyn AudioStream>, AudioOutputError> {
        let block_samples = source.block_len();
        Ok(Box::new(FakeAudioStream::start(
            source,
            block_samples,
            self.callback_times.clone(),
            self.log.clone(),
        )))
    }

    fn input_ports(&mut self) -> Result<Vec<Box<dyn InputPort>>, DeviceOpenError> {
        if !self.midi_available {
            return Err(DeviceOpenError::Connect {
                device: "MIDI subsystem".to_string(),
                reason: "unavailable".to_string(),
            });
        }
        Ok(self
            .ports
            .drain(..)
            .map(|port| Box::new(port) as Box<dyn InputPort>)
            .collect())
    }
}
