//! GameCube DSP-HLE voice mixer
//!
//! A sample-accurate re-implementation of the fixed-function DSP audio
//! firmware used by a family of GameCube titles. Each output block, the
//! engine walks an array of per-voice parameter blocks living in emulated
//! memory, decodes each voice's source (PCM16, AFC-compressed or raw
//! streamed audio), resamples it to the host mixing rate with the
//! firmware's exact fixed-point interpolation, applies the volume ramp
//! engine and accumulates everything into the caller's stereo buffer.
//!
//! # Features
//! - Bit-exact parameter-block marshalling (big-endian words, word-swapped
//!   32-bit fields, partial write-back)
//! - AFC block codec (9 compressed bytes to 16 samples, 4-bit and 2-bit
//!   variants) with predictor-history rollback at block boundaries
//! - Incremental linear resampler with persisted 4-sample history
//! - Both firmware volume engines: six ramped mix buses, and the panned
//!   mode driven by an equal-power pan-law table
//! - Saturating stereo merge on top of existing buffer content
//!
//! # Crate feature flags
//! - `export-wav` (opt-in): dump mixed buffers to WAV files (enables the
//!   optional `hound` dep)
//!
//! # Quick start
//! ```no_run
//! use dsphle::{EmulatedMemory, MixerConfig, VoiceMixer};
//!
//! let mut mem = EmulatedMemory::new(0x20000, 0x20000);
//! let cfg = MixerConfig {
//!     sample_rate: 44_100,
//!     num_voices: 64,
//!     voice_pbs_addr: 0x1000,
//!     ..MixerConfig::default()
//! };
//! let mut mixer = VoiceMixer::new(cfg).unwrap();
//! mixer.set_sync_flags([0xFFFF; 16]);
//!
//! // `out` already holds audio from another source; voices are added on top.
//! let mut out = vec![0i16; 2 * 1024];
//! mixer.mix_into(&mut mem, &mut out);
//! ```

#![warn(missing_docs)]

pub mod afc;
#[cfg(feature = "export-wav")]
pub mod export;
pub mod memory;
pub mod mixer;
pub mod params;
pub mod resampler;
pub mod voice;

/// Error type for mixer configuration and export operations.
///
/// The decode/mix core itself has no error paths: by firmware contract all
/// of its failure modes degrade silently (unknown formats render silence,
/// exhausted streams key the voice off, accumulator overflow saturates).
/// Errors only exist at the configuration boundary and in optional export.
#[derive(thiserror::Error, Debug)]
pub enum DspError {
    /// Invalid mixer configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error writing an audio file
    #[error("Audio file write error: {0}")]
    Export(String),

    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for mixer operations
pub type Result<T> = std::result::Result<T, DspError>;

// Public API exports
pub use afc::{decode_block, AFC_COEF_TABLE};
pub use memory::{DspMemory, EmulatedMemory, ARAM_MASK, RAM_MASK};
pub use mixer::{MixerConfig, VoiceMixer};
pub use params::VoiceParams;
