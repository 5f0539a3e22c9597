//! Voice parameter block marshalling
//!
//! Each voice slot is a 384-byte record in main RAM, laid out as 192
//! big-endian 16-bit words. 32-bit fields are stored with their two words
//! in reverse order, so reading applies a byteswap per word plus a
//! word-swap per 32-bit field. Write-back persists only the first 256
//! bytes of the record; everything past that boundary is read-only by
//! firmware contract even if the render pass mutated it locally.
//!
//! The firmware addresses most of the block as raw register words. Here
//! the words the voice pipeline actually touches are named fields; all
//! remaining words are carried in an opaque backing array so a
//! read/write-back cycle reproduces them exactly.

use crate::memory::{read_u16, RAM_MASK};

/// Bytes per voice slot.
pub const PB_SIZE: u32 = 0x180;

/// 16-bit words per voice slot.
pub const PB_WORDS: usize = 0xC0;

/// Words persisted by write-back (the first 256 bytes).
pub const PB_WRITEBACK_WORDS: usize = 0x80;

/// Number of ramped mix buses in simple volume mode.
pub const NUM_MIX_BUSES: usize = 6;

/// Word offsets of the named fields within a block.
mod off {
    pub const STATUS: usize = 0x00;
    pub const KEY_OFF: usize = 0x01;
    pub const RATIO: usize = 0x02;
    pub const NEEDS_RESET: usize = 0x04;
    pub const REACHED_END: usize = 0x05;
    pub const IS_BLANK: usize = 0x06;
    /// Six buses of 4 words each: {dest, target, current, pad}.
    pub const BUSES: usize = 0x08;
    pub const PAN: usize = 0x28;
    pub const VOLUME: usize = 0x29;
    pub const VOL_CURRENT: usize = 0x2A;
    pub const VOL_TARGET: usize = 0x2B;
    pub const VOLUME_MODE: usize = 0x2C;
    pub const CUR_SAMPLE_FRAC: usize = 0x30;
    pub const CUR_BLOCK: usize = 0x32;
    pub const FIXED_SAMPLE: usize = 0x33;
    pub const RESTART_POS: usize = 0x34;
    pub const STREAM_PENDING: usize = 0x36;
    pub const CUR_ADDR: usize = 0x38;
    pub const REM_LENGTH: usize = 0x3A;
    pub const RESAMPLER_OLD: usize = 0x3C;
    pub const YN2: usize = 0x66;
    pub const YN1: usize = 0x67;
    // Read-only half.
    pub const STREAM_LIMIT: usize = 0x8B;
    pub const FORMAT: usize = 0x90;
    pub const REPEAT_MODE: usize = 0x91;
    pub const LOOP_YN1: usize = 0x94;
    pub const LOOP_YN2: usize = 0x95;
    pub const STOP_ON_SILENCE: usize = 0x97;
    pub const FILTER_ENABLE: usize = 0x9A;
    pub const LOOP_START_POS: usize = 0xA0;
    pub const LENGTH: usize = 0xA2;
    pub const START_ADDR: usize = 0xA4;
    pub const STREAM_ADDR: usize = 0xA6;
}

/// One ramped mix bus of the simple volume engine.
///
/// `dest` selects the destination buffer (zero disables the bus); the gain
/// ramps from `current` toward `target` over the first 64 samples of a
/// call, and the reached gain is persisted back into `current`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixBus {
    /// Destination buffer selector; 0 = bus disabled.
    pub dest: u16,
    /// Ramp target gain.
    pub target: u16,
    /// Current gain (updated after each call).
    pub current: u16,
}

/// In-process view of one voice's parameter block.
///
/// Field widths and update order match the firmware register layout; the
/// u16 "flags" really are whole words in the block, not packed bits.
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// 1 = voice active, 0 = slot unused.
    pub status: u16,
    /// 1 = voice has stopped producing audio.
    pub key_off: u16,
    /// Raw playback-rate ratio, 4.12 fixed point (0x1000 = 1.0).
    pub ratio: u16,
    /// Forces decoder re-initialization on the next render.
    pub needs_reset: u16,
    /// End-of-stream marker, meaningful only while a restart/stop decision
    /// is pending.
    pub reached_end: u16,
    /// 1 = constant-sample voice; decode and resample are skipped.
    pub is_blank: u16,
    /// Simple-mode mix buses (bus 0 = left, bus 1 = right).
    pub buses: [MixBus; NUM_MIX_BUSES],
    /// Packed pan word for complex mode; both halves are 7-bit pan-law inputs.
    pub pan: u16,
    /// Complex-mode volume.
    pub volume: u16,
    /// Complex-mode current gain.
    pub vol_current: u16,
    /// Complex-mode target gain.
    pub vol_target: u16,
    /// 0 = simple bus ramps, anything else = complex/panned mode.
    pub volume_mode: u16,
    /// Fractional part of the resampler cursor.
    pub cur_sample_frac: u16,
    /// AFC compressed-block counter.
    pub cur_block: u16,
    /// Sample value emitted by blank voices.
    pub fixed_sample: u16,
    /// Restart position; the high half doubles as the raw-stream running
    /// offset.
    pub restart_pos: u32,
    /// Raw-stream decoder scratch (pending first-stage read size).
    pub stream_pending: u16,
    /// Current source address.
    pub cur_addr: u32,
    /// Remaining length; decoders clamp to zero instead of underflowing.
    pub rem_length: u32,
    /// Last four consumed input samples, the resampler's lookback window.
    pub resampler_old: [u16; 4],
    /// AFC predictor history (older sample).
    pub yn2: u16,
    /// AFC predictor history (most recent sample).
    pub yn1: u16,
    /// Raw-stream end bound (read-only half).
    pub stream_limit: u16,
    /// Source format code; selects the decoder.
    pub format: u16,
    /// 1 = loop at loop_start_pos, 0 = one-shot.
    pub repeat_mode: u16,
    /// Predictor history reload value for AFC loop restart.
    pub loop_yn1: u16,
    /// Predictor history reload value for AFC loop restart.
    pub loop_yn2: u16,
    /// Key the voice off once its ramp targets decay to zero.
    pub stop_on_silence: u16,
    /// Enables the in-place voice-buffer filter hook.
    pub filter_enable: u16,
    /// Loop start position in samples.
    pub loop_start_pos: u32,
    /// Total source length in samples.
    pub length: u32,
    /// Source start address.
    pub start_addr: u32,
    /// Auxiliary stream base address (raw decoder; mutated locally on loop
    /// restart, never persisted).
    pub stream_addr: u32,
    /// Full backing words, byteswapped but otherwise as read. Carries every
    /// offset not named above so write-back round-trips exactly.
    raw: [u16; PB_WORDS],
}

#[inline]
fn u32_at(raw: &[u16; PB_WORDS], off: usize) -> u32 {
    ((raw[off] as u32) << 16) | raw[off + 1] as u32
}

#[inline]
fn put_u32(raw: &mut [u16; PB_WORDS], off: usize, value: u32) {
    raw[off] = (value >> 16) as u16;
    raw[off + 1] = value as u16;
}

impl VoiceParams {
    /// Load a parameter block from main RAM at `addr`.
    pub fn read(ram: &[u8], addr: u32) -> Self {
        let mut raw = [0u16; PB_WORDS];
        for (i, word) in raw.iter_mut().enumerate() {
            *word = read_u16(ram, addr.wrapping_add(2 * i as u32), RAM_MASK);
        }
        Self::from_words(raw)
    }

    /// Build the named view over a block of already-byteswapped words.
    pub fn from_words(raw: [u16; PB_WORDS]) -> Self {
        let mut buses = [MixBus::default(); NUM_MIX_BUSES];
        for (n, bus) in buses.iter_mut().enumerate() {
            let base = off::BUSES + n * 4;
            bus.dest = raw[base];
            bus.target = raw[base + 1];
            bus.current = raw[base + 2];
        }
        Self {
            status: raw[off::STATUS],
            key_off: raw[off::KEY_OFF],
            ratio: raw[off::RATIO],
            needs_reset: raw[off::NEEDS_RESET],
            reached_end: raw[off::REACHED_END],
            is_blank: raw[off::IS_BLANK],
            buses,
            pan: raw[off::PAN],
            volume: raw[off::VOLUME],
            vol_current: raw[off::VOL_CURRENT],
            vol_target: raw[off::VOL_TARGET],
            volume_mode: raw[off::VOLUME_MODE],
            cur_sample_frac: raw[off::CUR_SAMPLE_FRAC],
            cur_block: raw[off::CUR_BLOCK],
            fixed_sample: raw[off::FIXED_SAMPLE],
            restart_pos: u32_at(&raw, off::RESTART_POS),
            stream_pending: raw[off::STREAM_PENDING],
            cur_addr: u32_at(&raw, off::CUR_ADDR),
            rem_length: u32_at(&raw, off::REM_LENGTH),
            resampler_old: [
                raw[off::RESAMPLER_OLD],
                raw[off::RESAMPLER_OLD + 1],
                raw[off::RESAMPLER_OLD + 2],
                raw[off::RESAMPLER_OLD + 3],
            ],
            yn2: raw[off::YN2],
            yn1: raw[off::YN1],
            stream_limit: raw[off::STREAM_LIMIT],
            format: raw[off::FORMAT],
            repeat_mode: raw[off::REPEAT_MODE],
            loop_yn1: raw[off::LOOP_YN1],
            loop_yn2: raw[off::LOOP_YN2],
            stop_on_silence: raw[off::STOP_ON_SILENCE],
            filter_enable: raw[off::FILTER_ENABLE],
            loop_start_pos: u32_at(&raw, off::LOOP_START_POS),
            length: u32_at(&raw, off::LENGTH),
            start_addr: u32_at(&raw, off::START_ADDR),
            stream_addr: u32_at(&raw, off::STREAM_ADDR),
            raw,
        }
    }

    /// Persist the block back to main RAM at `addr`.
    ///
    /// Only the first [`PB_WRITEBACK_WORDS`] words are written; the
    /// read-only half keeps whatever the game last stored there.
    pub fn write_back(&self, ram: &mut [u8], addr: u32) {
        let words = self.to_words();
        for (i, word) in words.iter().enumerate().take(PB_WRITEBACK_WORDS) {
            let a = (addr.wrapping_add(2 * i as u32) & RAM_MASK) as usize;
            ram[a..a + 2].copy_from_slice(&word.to_be_bytes());
        }
    }

    /// Fold the named fields back over the backing words.
    pub fn to_words(&self) -> [u16; PB_WORDS] {
        let mut raw = self.raw;
        raw[off::STATUS] = self.status;
        raw[off::KEY_OFF] = self.key_off;
        raw[off::RATIO] = self.ratio;
        raw[off::NEEDS_RESET] = self.needs_reset;
        raw[off::REACHED_END] = self.reached_end;
        raw[off::IS_BLANK] = self.is_blank;
        for (n, bus) in self.buses.iter().enumerate() {
            let base = off::BUSES + n * 4;
            raw[base] = bus.dest;
            raw[base + 1] = bus.target;
            raw[base + 2] = bus.current;
        }
        raw[off::PAN] = self.pan;
        raw[off::VOLUME] = self.volume;
        raw[off::VOL_CURRENT] = self.vol_current;
        raw[off::VOL_TARGET] = self.vol_target;
        raw[off::VOLUME_MODE] = self.volume_mode;
        raw[off::CUR_SAMPLE_FRAC] = self.cur_sample_frac;
        raw[off::CUR_BLOCK] = self.cur_block;
        raw[off::FIXED_SAMPLE] = self.fixed_sample;
        put_u32(&mut raw, off::RESTART_POS, self.restart_pos);
        raw[off::STREAM_PENDING] = self.stream_pending;
        put_u32(&mut raw, off::CUR_ADDR, self.cur_addr);
        put_u32(&mut raw, off::REM_LENGTH, self.rem_length);
        for i in 0..4 {
            raw[off::RESAMPLER_OLD + i] = self.resampler_old[i];
        }
        raw[off::YN2] = self.yn2;
        raw[off::YN1] = self.yn1;
        raw
    }

    /// Raw-stream running offset: the high half of `restart_pos`.
    #[inline]
    pub fn stream_offset(&self) -> u16 {
        (self.restart_pos >> 16) as u16
    }

    /// Store the raw-stream running offset.
    #[inline]
    pub fn set_stream_offset(&mut self, offset: u16) {
        self.restart_pos = (self.restart_pos & 0xFFFF) | ((offset as u32) << 16);
    }
}
