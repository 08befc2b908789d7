//! Render bridge between the synthesis engine and the output pull model.
//!
//! The output subsystem asks for a number of bytes (or samples) whenever its
//! buffers run low. The bridge renders exactly that much audio from the
//! engine and hands it back in the negotiated layout: interleaved stereo,
//! 32-bit float, native endian.

use crate::engine::{EngineHandle, RenderError};
use std::mem;

/// Number of output channels. The bridge always produces stereo.
pub const CHANNELS: u16 = 2;

/// Size of one sample in bytes.
const BYTES_PER_SAMPLE: usize = mem::size_of::<f32>();

/// The fixed output format of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count, always [`CHANNELS`].
    pub channels: u16,
}

impl AudioFormat {
    /// Stereo float output at the given sample rate.
    pub fn stereo_float(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS,
        }
    }

    /// Bytes in one interleaved frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }
}

/// Pulls rendered audio out of the engine on behalf of the output device.
///
/// Owned by the audio callback. Scratch buffers are sized for one block up
/// front; a request larger than that grows them once.
pub struct RenderBridge {
    engine: EngineHandle,
    format: AudioFormat,
    left: Vec<f32>,
    right: Vec<f32>,
    /// Interleaved scratch used by the byte path.
    interleaved: Vec<f32>,
}

impl RenderBridge {
    /// Creates a bridge for the given engine and format.
    ///
    /// # Arguments
    ///
    /// * `engine` - Handle to the session's engine
    /// * `format` - The negotiated output format, fixed for the session
    /// * `block_frames` - Expected frames per request, used to presize buffers
    pub fn new(engine: EngineHandle, format: AudioFormat, block_frames: usize) -> Self {
        Self {
            engine,
            format,
            left: vec![0.0; block_frames],
            right: vec![0.0; block_frames],
            interleaved: vec![0.0; block_frames * CHANNELS as usize],
        }
    }

    /// Returns the output format this bridge produces.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Renders interleaved stereo samples into `out`.
    ///
    /// Renders `out.len() / 2` frames and returns the number of samples
    /// written, which is always `out.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Misaligned`] if `out` does not hold whole frames,
    /// or [`RenderError::Poisoned`] if the engine is unusable.
    pub fn render(&mut self, out: &mut [f32]) -> Result<usize, RenderError> {
        let channels = self.format.channels as usize;
        if out.len() % channels != 0 {
            return Err(RenderError::Misaligned(out.len()));
        }
        let frames = out.len() / channels;
        self.render_frames(frames)?;

        for (frame, (l, r)) in out
            .chunks_exact_mut(channels)
            .zip(self.left.iter().zip(self.right.iter()))
        {
            frame[0] = *l;
            frame[1] = *r;
        }
        Ok(out.len())
    }

    /// Fills a byte buffer with rendered audio.
    ///
    /// Computes `frames = buf.len() / bytes_per_frame`, renders that many
    /// frames and packs them as native-endian `f32`. Always returns
    /// `buf.len()`; a trailing partial frame is filled with silence.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, RenderError> {
        let bytes_per_frame = self.format.bytes_per_frame();
        let frames = buf.len() / bytes_per_frame;
        let samples = frames * self.format.channels as usize;

        let mut interleaved = mem::take(&mut self.interleaved);
        if interleaved.len() < samples {
            interleaved.resize(samples, 0.0);
        }
        let result = self.render(&mut interleaved[..samples]);
        if result.is_ok() {
            let (body, tail) = buf.split_at_mut(frames * bytes_per_frame);
            for (bytes, sample) in body
                .chunks_exact_mut(BYTES_PER_SAMPLE)
                .zip(interleaved.iter())
            {
                bytes.copy_from_slice(&sample.to_ne_bytes());
            }
            tail.fill(0);
        }
        self.interleaved = interleaved;

        result.map(|_| buf.len())
    }

    fn render_frames(&mut self, frames: usize) -> Result<(), RenderError> {
        if self.left.len() < frames {
            self.left.resize(frames, 0.0);
            self.right.resize(frames, 0.0);
        }
        self.engine
            .render(&mut self.left[..frames], &mut self.right[..frames])
    }
}
