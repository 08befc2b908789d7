//! Session lifecycle.
//!
//! A [`Session`] owns everything that runs while the synthesizer is live and
//! enforces the order things start and stop in:
//!
//! ```text
//! Uninitialized -> CatalogLoaded -> EngineReady -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! Startup loads the catalog, builds the engine and puts every channel on the
//! initial preset before the audio output starts, and only then opens MIDI
//! inputs. Shutdown runs in reverse: inputs first, then audio, then the
//! engine is released.

use crate::audio::{
    AudioFormat, AudioOutputError, AudioStream, RenderBridge, RodioStream, SynthSource,
};
use crate::catalog::{Catalog, CatalogLoadError, InstrumentBank, Preset};
use crate::config::AudioConfig;
use crate::engine::{
    create_synthesizer, initial_preset_messages, ControlMessage, EngineError, EngineHandle,
    RenderError, SynthEngine,
};
use crate::midi::{list_input_ports, DeviceOpenError, DeviceSession, InputPort};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, span, warn, Level};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    CatalogLoaded,
    EngineReady,
    Running,
    ShuttingDown,
    Stopped,
    /// Startup was aborted. Only shutdown is possible from here.
    Failed,
}

/// Errors that halt the session at a transition.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogLoadError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    AudioOutput(#[from] AudioOutputError),
    /// A transition was requested from the wrong state.
    #[error("cannot {action} while the session is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
}

/// Why [`Session::wait`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A stop was requested through a [`StopHandle`].
    StopRequested,
    /// The audio path failed and has stopped producing sound.
    AudioFault(RenderError),
}

/// The preset chosen for every channel at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPreset {
    pub preset: Preset,
    /// True when the requested bank/program had no exact match.
    pub fallback: bool,
}

/// A test note played between starting audio and opening MIDI inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Audition {
    pub key: u8,
    pub velocity: u8,
    pub hold: Duration,
}

impl Default for Audition {
    /// Middle C, held for one second.
    fn default() -> Self {
        Self {
            key: 60,
            velocity: 100,
            hold: Duration::from_secs(1),
        }
    }
}

/// Which MIDI inputs came up.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Devices that are now listening, in enumeration order.
    pub started: Vec<String>,
    /// Devices that failed to open, with the reason.
    pub failed: Vec<(String, DeviceOpenError)>,
}

/// The outside world a session drives.
pub trait Backend {
    /// Loads the instrument catalog.
    fn load_catalog(&mut self) -> Result<Catalog, CatalogLoadError>;

    /// Creates the synthesis engine for the loaded catalog.
    fn create_engine(&mut self, format: AudioFormat) -> Result<Box<dyn SynthEngine>, EngineError>;

    /// Starts pulling audio from `source` on the output device.
    fn start_audio(
        &mut self,
        source: SynthSource,
    ) -> Result<Box<dyn AudioStream>, AudioOutputError>;

    /// Lists every available MIDI input.
    fn input_ports(&mut self) -> Result<Vec<Box<dyn InputPort>>, DeviceOpenError>;
}

/// Requests a running session to stop. Cloneable and usable from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Sender<()>);

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.0.try_send(());
    }
}

/// A live synthesizer session.
pub struct Session<B: Backend> {
    backend: B,
    config: AudioConfig,
    state: SessionState,
    catalog: Option<Catalog>,
    engine: Option<EngineHandle>,
    audio: Option<Box<dyn AudioStream>>,
    devices: Vec<DeviceSession>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    fault_tx: Sender<RenderError>,
    fault_rx: Receiver<RenderError>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, config: AudioConfig) -> Self {
        let (stop_tx, stop_rx) = unbounded();
        let (fault_tx, fault_rx) = unbounded();
        Self {
            backend,
            config,
            state: SessionState::Uninitialized,
            catalog: None,
            engine: None,
            audio: None,
            devices: Vec::new(),
            stop_tx,
            stop_rx,
            fault_tx,
            fault_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the catalog once it has been loaded.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Names of the MIDI inputs currently listening.
    pub fn devices(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name()).collect()
    }

    /// Loads the instrument catalog.
    ///
    /// A failure here is terminal: the session moves to
    /// [`SessionState::Failed`] without touching any device.
    pub fn load_catalog(&mut self) -> Result<&Catalog, SessionError> {
        self.expect_state(SessionState::Uninitialized, "load the catalog")?;

        match self.backend.load_catalog() {
            Ok(catalog) => {
                self.state = SessionState::CatalogLoaded;
                Ok(self.catalog.insert(catalog))
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e.into())
            }
        }
    }

    /// Builds the engine and puts all 16 channels on the selected preset.
    ///
    /// When no preset matches `bank`/`program` exactly, the first preset in
    /// the catalog is used instead and the fallback is logged.
    pub fn prepare_engine(&mut self, bank: u8, program: u8) -> Result<InitialPreset, SessionError> {
        self.expect_state(SessionState::CatalogLoaded, "prepare the engine")?;
        let catalog = self
            .catalog
            .as_ref()
            .ok_or(SessionError::InvalidTransition {
                action: "prepare the engine",
                state: self.state,
            })?;

        let resolution = catalog.resolve(bank, program);
        let initial = InitialPreset {
            preset: resolution.preset.clone(),
            fallback: resolution.fallback,
        };
        if initial.fallback {
            warn!(
                bank,
                program,
                default_bank = initial.preset.bank,
                default_program = initial.preset.program,
                "No preset at the requested bank and program, reverting to default."
            );
        }

        let engine = match self.backend.create_engine(self.config.format()) {
            Ok(engine) => EngineHandle::from_boxed(engine),
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };
        for message in initial_preset_messages(&initial.preset) {
            if let Err(e) = engine.send(message) {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        }

        info!(preset = %initial.preset, "Applied initial preset to all channels.");
        self.engine = Some(engine);
        self.state = SessionState::EngineReady;
        Ok(initial)
    }

    /// Starts audio output, then subscribes to every MIDI input.
    ///
    /// If `audition` is given, the test note is played after audio is up and
    /// before any input is opened. A device that fails to open is skipped and
    /// reported; it does not stop the others or the audio.
    pub fn start(&mut self, audition: Option<Audition>) -> Result<StartReport, SessionError> {
        self.expect_state(SessionState::EngineReady, "start")?;
        let engine = self.engine.clone().ok_or(SessionError::InvalidTransition {
            action: "start",
            state: self.state,
        })?;

        let block_frames = self.config.block_frames();
        let bridge = RenderBridge::new(engine.clone(), self.config.format(), block_frames);
        let source = SynthSource::new(bridge, block_frames, self.fault_tx.clone());
        match self.backend.start_audio(source) {
            Ok(audio) => self.audio = Some(audio),
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        }
        self.state = SessionState::Running;

        if let Some(audition) = audition {
            play_audition(&engine, audition)?;
        }

        let mut report = StartReport::default();
        let ports = match self.backend.input_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(err = %e, "Unable to list MIDI inputs, continuing without them.");
                Vec::new()
            }
        };
        for port in ports {
            let name = port.name().to_string();
            match DeviceSession::start(port, engine.clone()) {
                Ok(session) => {
                    self.devices.push(session);
                    report.started.push(name);
                }
                Err(e) => {
                    warn!(device = name, err = %e, "Unable to open MIDI input, skipping it.");
                    report.failed.push((name, e));
                }
            }
        }

        info!(
            inputs = report.started.len(),
            failed = report.failed.len(),
            "Session running."
        );
        Ok(report)
    }

    /// Returns a handle that makes [`wait`](Self::wait) return.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop_tx.clone())
    }

    /// Blocks until a stop is requested or the audio path fails.
    pub fn wait(&self) -> SessionEvent {
        select! {
            recv(self.stop_rx) -> _ => SessionEvent::StopRequested,
            recv(self.fault_rx) -> fault => match fault {
                Ok(e) => SessionEvent::AudioFault(e),
                Err(_) => SessionEvent::StopRequested,
            },
        }
    }

    /// Stops every MIDI input, then the audio output, then releases the
    /// engine. Safe to call from any state, and more than once.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        let span = span!(Level::INFO, "shutdown");
        let _enter = span.enter();
        self.state = SessionState::ShuttingDown;

        for device in self.devices.drain(..) {
            device.stop();
        }
        if let Some(audio) = self.audio.take() {
            audio.stop();
        }
        self.engine = None;

        self.state = SessionState::Stopped;
        info!("Session stopped.");
    }

    fn expect_state(
        &self,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidTransition {
                action,
                state: self.state,
            });
        }
        Ok(())
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn play_audition(engine: &EngineHandle, audition: Audition) -> Result<(), EngineError> {
    info!(key = audition.key, "Playing test note.");
    engine.send(ControlMessage::NoteOn {
        channel: 0,
        key: audition.key,
        velocity: audition.velocity,
    })?;
    thread::sleep(audition.hold);
    engine.send(ControlMessage::NoteOff {
        channel: 0,
        key: audition.key,
    })
}

/// The real backend: rustysynth, rodio and midir.
pub struct LiveBackend {
    path: PathBuf,
    bank: Option<InstrumentBank>,
}

impl LiveBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bank: None,
        }
    }
}

impl Backend for LiveBackend {
    fn load_catalog(&mut self) -> Result<Catalog, CatalogLoadError> {
        let bank = InstrumentBank::load(&self.path)?;
        let catalog = bank.catalog().clone();
        self.bank = Some(bank);
        Ok(catalog)
    }

    fn create_engine(&mut self, format: AudioFormat) -> Result<Box<dyn SynthEngine>, EngineError> {
        let bank = self
            .bank
            .as_ref()
            .ok_or_else(|| EngineError::Create("no SoundFont loaded".to_string()))?;
        Ok(Box::new(create_synthesizer(bank, format.sample_rate)?))
    }

    fn start_audio(
        &mut self,
        source: SynthSource,
    ) -> Result<Box<dyn AudioStream>, AudioOutputError> {
        Ok(Box::new(RodioStream::start(source)?))
    }

    fn input_ports(&mut self) -> Result<Vec<Box<dyn InputPort>>, DeviceOpenError> {
        list_input_ports()
    }
}
