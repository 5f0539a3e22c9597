//! Voice mixer front end
//!
//! [`VoiceMixer`] owns the scratch buffers and lookup tables shared by all
//! voices and drives the per-block pipeline: walk the parameter-block
//! array, gate each slot on its sync flag, decode, resample, run the
//! volume engine into the 32-bit stereo accumulators, write the mutated
//! block half back, then merge the accumulators into the caller's
//! interleaved 16-bit buffer with saturation.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::memory::DspMemory;
use crate::params::{VoiceParams, PB_SIZE};
use crate::resampler::{self, HISTORY_LEN};
use crate::voice::{self, PAN_TABLE_LEN};
use crate::{DspError, Result};

/// Sync-flag words; each holds 16 voice-enable bits.
pub const SYNC_FLAG_WORDS: usize = 16;

/// Upper bound on stereo frames mixed per call.
const MAX_BLOCK_FRAMES: usize = 256 * 1024 - 8;

/// Mixer configuration.
///
/// Serializable so hosts can carry it in their own config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Host output rate in Hz.
    pub sample_rate: u32,
    /// Number of voice slots walked per block.
    pub num_voices: usize,
    /// Main-RAM address of the first parameter block; slots are contiguous
    /// 0x180-byte records.
    pub voice_pbs_addr: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            num_voices: 64,
            voice_pbs_addr: 0,
        }
    }
}

impl MixerConfig {
    /// Maximum voice slots addressable by the sync-flag words.
    pub const MAX_VOICES: usize = SYNC_FLAG_WORDS * 16;

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DspError::Config("sample_rate must be non-zero".into()));
        }
        if self.num_voices == 0 || self.num_voices > Self::MAX_VOICES {
            return Err(DspError::Config(format!(
                "num_voices must be 1..={}, got {}",
                Self::MAX_VOICES,
                self.num_voices
            )));
        }
        Ok(())
    }
}

/// The per-block voice mixing engine.
pub struct VoiceMixer {
    config: MixerConfig,
    sync_flags: [u16; SYNC_FLAG_WORDS],
    afc_coefs: [i16; 32],
    pan_table: [i16; PAN_TABLE_LEN],
    /// 32-bit stereo accumulators.
    left: Vec<i32>,
    right: Vec<i32>,
    /// Post-resample voice buffer, input to the volume engines.
    voice_buf: Vec<i32>,
    /// Decoder staging area; the first [`HISTORY_LEN`] slots are the
    /// resampler's lookback window.
    staging: Vec<i16>,
}

impl VoiceMixer {
    /// Build a mixer with the default coefficient and pan tables.
    pub fn new(config: MixerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sync_flags: [0; SYNC_FLAG_WORDS],
            afc_coefs: crate::afc::AFC_COEF_TABLE,
            pan_table: voice::default_pan_table(),
            left: Vec::new(),
            right: Vec::new(),
            voice_buf: Vec::new(),
            staging: Vec::new(),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Replace the voice-enable flag words. Voice `i` is gated by bit
    /// `15 - (i & 15)` of word `(i >> 4) & 15`.
    pub fn set_sync_flags(&mut self, flags: [u16; SYNC_FLAG_WORDS]) {
        self.sync_flags = flags;
    }

    /// Replace the AFC predictor coefficient table (titles may ship their
    /// own in the microcode image).
    pub fn set_afc_coefs(&mut self, coefs: [i16; 32]) {
        self.afc_coefs = coefs;
    }

    /// Replace the complex-mode pan-law table.
    pub fn set_pan_table(&mut self, table: [i16; PAN_TABLE_LEN]) {
        self.pan_table = table;
    }

    fn voice_enabled(&self, index: usize) -> bool {
        let flags = self.sync_flags[(index >> 4) & 0xF];
        flags & (1 << (15 - (index & 0xF))) != 0
    }

    /// Mix one block of all enabled voices on top of `out`.
    ///
    /// `out` is interleaved stereo; existing content is kept and voices are
    /// added with saturation, so an upstream music stream can already be in
    /// the buffer. Mutated parameter-block halves are written back to RAM.
    pub fn mix_into<M: DspMemory>(&mut self, mem: &mut M, out: &mut [i16]) {
        let size = (out.len() / 2).min(MAX_BLOCK_FRAMES);
        if size == 0 {
            return;
        }

        self.left.clear();
        self.left.resize(size, 0);
        self.right.clear();
        self.right.resize(size, 0);

        for i in 0..self.config.num_voices {
            if !self.voice_enabled(i) {
                continue;
            }
            let addr = self
                .config
                .voice_pbs_addr
                .wrapping_add(i as u32 * PB_SIZE);
            let mut pb = VoiceParams::read(mem.ram(), addr);
            if pb.status == 0 || pb.key_off != 0 {
                continue;
            }
            debug!("voice {i}: format {:#06x}, ratio {:#06x}", pb.format, pb.ratio);
            self.render_add_voice(mem, &mut pb, size);
            pb.write_back(mem.ram_mut(), addr);
        }

        for i in 0..size {
            let l = (out[2 * i] as i32).saturating_add(self.left[i]);
            let r = (out[2 * i + 1] as i32).saturating_add(self.right[i]);
            out[2 * i] = l.clamp(-32768, 32767) as i16;
            out[2 * i + 1] = r.clamp(-32768, 32767) as i16;
        }
    }

    /// Decode, resample and volume-mix a single voice into the stereo
    /// accumulators.
    fn render_add_voice<M: DspMemory>(&mut self, mem: &M, pb: &mut VoiceParams, size: usize) {
        self.voice_buf.clear();
        self.voice_buf.resize(size, 0);

        if pb.is_blank != 0 {
            // Constant-sample voice: no decode, no resample, and the reset
            // flag is left alone.
            let sample = pb.fixed_sample as i16 as i32;
            for slot in self.voice_buf.iter_mut() {
                *slot = sample;
            }
        } else {
            let ratio = resampler::convert_ratio(pb.ratio, self.config.sample_rate);
            let in_size = resampler::size_for_resampling(pb.cur_sample_frac, size, ratio);

            // Staging holds the lookback window, the decoded source run and
            // a little slack for the interpolation's forward reach.
            self.staging.clear();
            self.staging.resize(HISTORY_LEN + in_size.max(size) + 8, 0);

            match pb.format {
                voice::FORMAT_AFC_LOW | voice::FORMAT_AFC => {
                    if pb.format == voice::FORMAT_AFC_LOW {
                        warn!("2-bit AFC voice, rarely exercised");
                    }
                    voice::decode_afc(
                        mem,
                        &self.afc_coefs,
                        pb,
                        &mut self.staging[HISTORY_LEN..HISTORY_LEN + in_size],
                    );
                    self.resample_voice(pb, size);
                }
                voice::FORMAT_PCM16 => {
                    voice::decode_pcm16(
                        mem,
                        pb,
                        &mut self.staging[HISTORY_LEN..HISTORY_LEN + in_size],
                    );
                    self.resample_voice(pb, size);
                }
                voice::FORMAT_PCM8 => {
                    // Recognized but not implemented by the firmware build
                    // this reproduces; stages silence, copied through.
                    warn!("PCM8 voice requested, rendering silence");
                    resampler::resample(
                        pb,
                        size,
                        &mut self.staging,
                        &mut self.voice_buf,
                        false,
                        self.config.sample_rate,
                    );
                }
                voice::FORMAT_RAW_A | voice::FORMAT_RAW_B => {
                    voice::decode_raw(mem, pb, &mut self.staging[HISTORY_LEN..], in_size, size);
                    self.resample_voice(pb, size);
                }
                0x0000..=0x0003 | 0x0006 | 0x000C => {
                    // Synth voices (waveform generators) live in a different
                    // firmware unit; silence here.
                    warn!("synth voice format {:#06x} not rendered", pb.format);
                }
                other => {
                    error!("unknown voice format {other:#06x}, rendering silence");
                }
            }

            pb.needs_reset = 0;
        }

        if pb.filter_enable != 0 {
            voice::filter_voice_buffer(&mut self.voice_buf);
        }

        if pb.volume_mode != 0 {
            voice::mix_complex(
                pb,
                &self.voice_buf,
                &mut self.left,
                &mut self.right,
                size,
                &self.pan_table,
            );
        } else {
            voice::mix_simple(pb, &self.voice_buf, &mut self.left, &mut self.right, size);
        }
    }

    fn resample_voice(&mut self, pb: &mut VoiceParams, size: usize) {
        resampler::resample(
            pb,
            size,
            &mut self.staging,
            &mut self.voice_buf,
            true,
            self.config.sample_rate,
        );
    }
}
