//! Audio output through rodio.
//!
//! [`SynthSource`] is the pull side: rodio's mixer calls `next` on the audio
//! thread and the source refills itself one block at a time from the
//! [`RenderBridge`].

use super::bridge::RenderBridge;
use crate::engine::RenderError;
use crossbeam_channel::Sender;
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Errors from opening the output device.
#[derive(Debug, Error)]
pub enum AudioOutputError {
    /// No default output device, or it refused the stream.
    #[error("failed to open audio output: {0}")]
    Open(#[from] rodio::StreamError),
    /// The device opened but would not start playing.
    #[error("failed to start audio playback: {0}")]
    Play(#[from] rodio::PlayError),
}

/// A running audio output. Stopping it ends the render callbacks.
pub trait AudioStream {
    /// Stops playback and releases the device.
    fn stop(self: Box<Self>);
}

/// Audio source that generates samples from the synthesizer.
/// Implements rodio's Source trait for playback.
pub struct SynthSource {
    bridge: RenderBridge,
    /// Interleaved block, refilled when exhausted.
    buffer: Vec<f32>,
    /// Position of the next sample in `buffer`.
    pos: usize,
    /// Where render failures are reported.
    faults: Sender<RenderError>,
    failed: bool,
}

impl SynthSource {
    pub fn new(bridge: RenderBridge, block_frames: usize, faults: Sender<RenderError>) -> Self {
        let len = block_frames.max(1) * bridge.format().channels as usize;
        Self {
            bridge,
            buffer: vec![0.0; len],
            pos: len, // Start at end to trigger first render
            faults,
            failed: false,
        }
    }

    /// Samples rendered per engine call.
    pub fn block_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Iterator for SynthSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.failed {
            return None;
        }

        if self.pos >= self.buffer.len() {
            // A failed render ends the stream. There is no silent fallback.
            if let Err(e) = self.bridge.render(&mut self.buffer) {
                error!(err = %e, "Render failed, stopping audio output.");
                let _ = self.faults.try_send(e);
                self.failed = true;
                return None;
            }
            self.pos = 0;
        }

        let sample = self.buffer[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for SynthSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        self.bridge.format().channels
    }

    fn sample_rate(&self) -> u32 {
        self.bridge.format().sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Infinite stream
    }
}

/// Playback on the default output device.
pub struct RodioStream {
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    _handle: OutputStreamHandle,
}

impl RodioStream {
    /// Opens the default output device and starts pulling from `source`.
    pub fn start(source: SynthSource) -> Result<Self, AudioOutputError> {
        let (stream, handle) = OutputStream::try_default()?;
        let format = source.bridge.format();
        handle.play_raw(source)?;
        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Audio output started."
        );
        Ok(Self {
            _stream: stream,
            _handle: handle,
        })
    }
}

impl AudioStream for RodioStream {
    fn stop(self: Box<Self>) {
        // Dropping the stream stops the device callback and drops the source
        // along with its engine handle.
        drop(self);
        info!("Audio output stopped.");
    }
}
