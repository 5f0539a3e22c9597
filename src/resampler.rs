//! Incremental fixed-point resampler
//!
//! Voices are authored against a 32 kHz reference rate; the mixer runs at
//! whatever the host output rate is. The per-voice 4.12 playback ratio is
//! rescaled into a 16.16 time step, and output samples are produced by
//! linear interpolation over the staged source samples with a 15-bit
//! fractional weight. The fractional cursor and the last four consumed
//! input samples persist in the parameter block, so a voice resumes
//! mid-fraction on the next call.
//!
//! The interpolation arithmetic reproduces the hardware's truncation
//! exactly; it is not a "clean" floating-point lerp.

use crate::params::VoiceParams;

/// Native rate voices are authored for.
pub const REFERENCE_RATE: u32 = 32000;

/// Sample slots reserved at the front of the staging buffer for the
/// interpolation lookback window.
pub const HISTORY_LEN: usize = 4;

/// Rescale a voice's raw 4.12 ratio into the 16.16 mixing time step.
///
/// A raw ratio of 0x1000 plays at the reference rate; the factor between
/// the reference and the configured output rate is folded in here, so the
/// interpolation loop never sees the host rate. The float product is
/// truncated the way the reference arithmetic does.
#[inline]
pub fn convert_ratio(raw_ratio: u16, out_rate: u32) -> u32 {
    let factor = REFERENCE_RATE as f32 / out_rate as f32;
    let ratio = (raw_ratio as u32) << 16;
    ((ratio as f32 * factor * 16.0) as u64 >> 16) as u32
}

/// Source samples that must be staged to produce `out_size` output samples
/// at `ratio`, given the current fractional cursor.
#[inline]
pub fn size_for_resampling(frac: u16, out_size: usize, ratio: u32) -> usize {
    ((frac as u64 + out_size as u64 * ratio as u64) >> 16) as usize
}

/// Resample `size` output samples from the staging buffer into `out`.
///
/// `buf` is the full staging slice: its first [`HISTORY_LEN`] entries are
/// the lookback slots (seeded here from the parameter block), decoded
/// source samples follow. With `do_resample` false the staged samples are
/// copied through unchanged (decoders that already emit at output rate).
pub fn resample(
    pb: &mut VoiceParams,
    size: usize,
    buf: &mut [i16],
    out: &mut [i32],
    do_resample: bool,
    out_rate: u32,
) {
    if !do_resample {
        for (dst, src) in out[..size].iter_mut().zip(&buf[HISTORY_LEN..]) {
            *dst = *src as i32;
        }
        return;
    }

    for i in 0..HISTORY_LEN {
        buf[i] = pb.resampler_old[i] as i16;
    }

    let ratio = convert_ratio(pb.ratio, out_rate);
    let in_size = size_for_resampling(pb.cur_sample_frac, size, ratio);

    let mut position = pb.cur_sample_frac as u32;
    for slot in out[..size].iter_mut() {
        let int_pos = (position >> 16) as usize;
        let frac = ((position & 0xFFFF) >> 1) as i32;
        // int_pos indexes the source stream; +1/+2 land on the two samples
        // around the cursor once the 4-slot history prefix is accounted for.
        *slot = ((buf[int_pos + 1] as i32) * (frac ^ 0x7FFF) + (buf[int_pos + 2] as i32) * frac)
            >> 15;
        position = position.wrapping_add(ratio);
    }

    // Save the last four *consumed* input samples and the residual fraction.
    for i in 0..HISTORY_LEN {
        pb.resampler_old[i] = buf[in_size + i] as u16;
    }
    pb.cur_sample_frac = (position & 0xFFFF) as u16;
}
