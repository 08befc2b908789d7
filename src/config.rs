//! Command-line configuration.

use crate::audio::AudioFormat;
use clap::{crate_version, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// Default requested output latency in milliseconds.
pub const DEFAULT_LATENCY_MS: u64 = 50;
/// Default number of buffers the latency is split across.
pub const DEFAULT_BUFFERS: u32 = 2;

#[derive(Parser, Debug)]
#[clap(
    version = crate_version!(),
    about = "Plays SoundFont instruments live from every connected MIDI input."
)]
pub struct Cli {
    /// Path to the SoundFont (.sf2) to load.
    pub soundfont: PathBuf,

    /// Initial bank number. Prompted for when omitted.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=127))]
    pub bank: Option<u8>,

    /// Initial program number. Prompted for when omitted.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=127))]
    pub program: Option<u8>,

    /// Output sample rate in Hz.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Requested output latency in milliseconds. Lower is more responsive but
    /// more likely to underrun.
    #[arg(long, default_value_t = DEFAULT_LATENCY_MS)]
    pub latency_ms: u64,

    /// Number of buffers the latency is divided into.
    #[arg(long, default_value_t = DEFAULT_BUFFERS)]
    pub buffers: u32,

    /// Skip the test note played after the instrument is selected.
    #[arg(long)]
    pub no_test_note: bool,
}

impl Cli {
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate: self.sample_rate,
            latency: Duration::from_millis(self.latency_ms),
            buffers: self.buffers,
        }
    }
}

/// Output configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Requested output latency.
    pub latency: Duration,
    /// Number of buffers the latency is split across.
    pub buffers: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            latency: Duration::from_millis(DEFAULT_LATENCY_MS),
            buffers: DEFAULT_BUFFERS,
        }
    }
}

impl AudioConfig {
    /// The negotiated output format.
    pub fn format(&self) -> AudioFormat {
        AudioFormat::stereo_float(self.sample_rate)
    }

    /// Frames rendered per engine call: the latency divided across the
    /// buffers, never less than one frame.
    pub fn block_frames(&self) -> usize {
        let total = self.sample_rate as u128 * self.latency.as_micros() / 1_000_000;
        let per_buffer = total / self.buffers.max(1) as u128;
        (per_buffer as usize).max(1)
    }
}
