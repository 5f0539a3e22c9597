//! Per-voice decoding and envelope mixing
//!
//! Three source decoders feed the staging buffer: linear PCM16 and
//! AFC-compressed audio stream out of ARAM, raw streamed audio comes from
//! main RAM. Each decoder is an incremental state machine over the voice's
//! parameter block; position, remaining length and loop state live in the
//! block and survive across mixer calls.
//!
//! The firmware re-enters its loop-handling code through a shared restart
//! label; here every decoder runs an explicit four-state machine instead:
//! Decoding, EndReached, Restarting, Silenced.
//!
//! The second half of this module is the volume stage: the six ramped mix
//! buses of simple mode and the pan-law driven complex mode, both
//! accumulating into the 32-bit stereo buses with the hardware's exact
//! multiply-and-shift.

use log::warn;

use crate::afc;
use crate::memory::{read_i16, DspMemory, ARAM_MASK, RAM_MASK};
use crate::params::VoiceParams;

/// AFC, 2-bit residuals (32:5 compression).
pub const FORMAT_AFC_LOW: u16 = 0x0005;
/// 8-bit PCM; recognized but renders silence.
pub const FORMAT_PCM8: u16 = 0x0008;
/// AFC, 4-bit residuals (32:9 compression).
pub const FORMAT_AFC: u16 = 0x0009;
/// Linear 16-bit PCM.
pub const FORMAT_PCM16: u16 = 0x0010;
/// Raw streamed 16-bit audio (variant A).
pub const FORMAT_RAW_A: u16 = 0x0020;
/// Raw streamed 16-bit audio from main RAM; used for music streaming.
pub const FORMAT_RAW_B: u16 = 0x0021;

/// Entries in the pan-law lookup table (7-bit index).
pub const PAN_TABLE_LEN: usize = 0x80;

/// Decoder control states, replacing the firmware's shared restart label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Streaming samples into the output buffer.
    Decoding,
    /// Source exhausted; a restart/stop decision is pending.
    EndReached,
    /// Loop restart: rewind to the loop start and keep filling.
    Restarting,
    /// One-shot end: zero-fill the remainder and key the voice off.
    Silenced,
}

/// Re-derive the sample counters from the restart position.
fn reset_sample_counters(pb: &mut VoiceParams) {
    pb.rem_length = pb.length.wrapping_sub(pb.restart_pos);
    pb.cur_addr = pb.start_addr.wrapping_add(pb.restart_pos << 1);
    pb.reached_end = 0;
}

/// Decode linear PCM16 samples from ARAM.
///
/// Fills `out` completely unless the stream ends one-shot, in which case
/// the remainder is zeroed and the voice keyed off. A loop restart is
/// handled within the same call.
pub fn decode_pcm16<M: DspMemory>(mem: &M, pb: &mut VoiceParams, out: &mut [i16]) {
    let real_size = out.len();
    if pb.key_off != 0 {
        return;
    }
    if pb.needs_reset != 0 {
        reset_sample_counters(pb);
        pb.resampler_old = [0; 4];
    }

    let mut inpos: u32 = 0;
    let mut outpos = 0usize;
    let mut state = if pb.reached_end != 0 {
        DecodeState::EndReached
    } else {
        DecodeState::Decoding
    };

    loop {
        match state {
            DecodeState::EndReached => {
                pb.reached_end = 0;
                state = if pb.repeat_mode == 0 {
                    DecodeState::Silenced
                } else {
                    DecodeState::Restarting
                };
            }
            DecodeState::Silenced => {
                for s in &mut out[outpos..] {
                    *s = 0;
                }
                pb.key_off = 1;
                pb.rem_length = 0;
                // Park the cursor as if playback ran off the end.
                pb.cur_addr = pb
                    .start_addr
                    .wrapping_add(pb.restart_pos << 1)
                    .wrapping_add(pb.length);
                return;
            }
            DecodeState::Restarting => {
                pb.restart_pos = pb.loop_start_pos;
                reset_sample_counters(pb);
                inpos = 0;
                state = DecodeState::Decoding;
            }
            DecodeState::Decoding => {
                while outpos < real_size {
                    out[outpos] =
                        read_i16(mem.aram(), pb.cur_addr.wrapping_add(inpos << 1), ARAM_MASK);
                    outpos += 1;
                    inpos += 1;
                    if inpos.wrapping_add(pb.cur_addr.wrapping_sub(pb.start_addr) >> 1)
                        >= pb.length
                    {
                        pb.reached_end = 1;
                        break;
                    }
                }
                if pb.reached_end != 0 {
                    state = DecodeState::EndReached;
                    continue;
                }
                break;
            }
        }
    }

    if pb.rem_length < inpos {
        pb.rem_length = 0;
        pb.reached_end = 1;
    } else {
        pb.rem_length -= inpos;
    }
    pb.cur_addr = pb.cur_addr.wrapping_add(inpos << 1);
}

/// Loop restart for AFC is not wired up: the restart address arithmetic
/// inherited from the PCM16 path does not hold for 9-byte blocks, so the
/// end of stream always takes the one-shot path.
const AFC_LOOP_SUPPORTED: bool = false;

/// Pull one AFC block from ARAM at the cursor and advance it.
fn afc_step<M: DspMemory>(
    mem: &M,
    coefs: &[i16; 32],
    pb: &mut VoiceParams,
    outbuf: &mut [i16; afc::SAMPLES_PER_BLOCK],
) {
    let base = (pb.cur_addr & ARAM_MASK) as usize;
    let src = &mem.aram()[base..base + afc::BLOCK_BYTES as usize];
    let mut yn1 = pb.yn1 as i16;
    let mut yn2 = pb.yn2 as i16;
    afc::decode_block(coefs, src, outbuf, &mut yn2, &mut yn1, pb.format);
    pb.yn1 = yn1 as u16;
    pb.yn2 = yn2 as u16;
    pb.cur_addr = pb.cur_addr.wrapping_add(afc::BLOCK_BYTES);
    pb.cur_block = pb.cur_block.wrapping_add(1);
}

/// Decode AFC-compressed samples from ARAM.
///
/// Blocks decode 16 samples at a time; the position within the staged
/// block is the rolling sample position modulo 16. A block that is only
/// partially consumed when `out` fills up is rolled back (predictor
/// history, cursor and block counter) so the next call re-decodes it from
/// identical state.
pub fn decode_afc<M: DspMemory>(
    mem: &M,
    coefs: &[i16; 32],
    pb: &mut VoiceParams,
    out: &mut [i16],
) {
    let real_size = out.len();
    if pb.needs_reset != 0 {
        pb.cur_block = 0;
        pb.yn2 = 0;
        pb.yn1 = 0;
        pb.rem_length = pb.length;
        pb.cur_addr = pb.start_addr;
        pb.reached_end = 0;
        pb.cur_sample_frac = 0;
        pb.resampler_old = [0; 4];
    }
    if pb.key_off != 0 {
        return;
    }

    let mut outbuf = [0i16; afc::SAMPLES_PER_BLOCK];
    let mut sample_count = 0usize;

    loop {
        if pb.reached_end != 0 {
            pb.reached_end = 0;
            if !AFC_LOOP_SUPPORTED || pb.repeat_mode == 0 {
                pb.key_off = 1;
                pb.rem_length = 0;
                pb.cur_addr = pb
                    .start_addr
                    .wrapping_add(pb.restart_pos)
                    .wrapping_add(pb.length);
                for s in &mut out[sample_count..] {
                    *s = 0;
                }
                return;
            } else {
                pb.restart_pos = pb.loop_start_pos;
                pb.rem_length = pb.length.wrapping_sub(pb.restart_pos);
                pb.cur_addr = pb.start_addr.wrapping_add(pb.restart_pos << 1);
                pb.yn1 = pb.loop_yn1;
                pb.yn2 = pb.loop_yn2;
            }
        }

        // Stage the block under the cursor. A snapshot is taken before
        // every decode so a partial block can be re-decoded next call.
        let mut snap = (pb.yn1, pb.yn2, pb.cur_addr, pb.cur_block);
        afc_step(mem, coefs, pb, &mut outbuf);

        let mut sample_position = pb.length.wrapping_sub(pb.rem_length);
        let mut ended = false;
        while sample_count < real_size {
            out[sample_count] = outbuf[(sample_position & 15) as usize];
            sample_count += 1;
            sample_position = sample_position.wrapping_add(1);

            pb.rem_length = pb.rem_length.saturating_sub(1);
            if pb.rem_length == 0 {
                pb.reached_end = 1;
                ended = true;
                break;
            }

            if sample_position & 15 == 0 {
                snap = (pb.yn1, pb.yn2, pb.cur_addr, pb.cur_block);
                afc_step(mem, coefs, pb, &mut outbuf);
            }
        }
        if ended {
            continue;
        }

        // The last staged block was not fully consumed; back off to the
        // state captured before it was decoded.
        let (yn1, yn2, addr, block) = snap;
        pb.yn1 = yn1;
        pb.yn2 = yn2;
        pb.cur_addr = addr;
        pb.cur_block = block;
        break;
    }

    pb.needs_reset = 0;
}

/// Read `size` big-endian samples from main RAM at the stream cursor.
///
/// The running offset is the high half of `restart_pos`, advanced here.
fn read_audio<M: DspMemory>(mem: &M, pb: &mut VoiceParams, size: usize, out: &mut [i16]) {
    if size == 0 {
        return;
    }
    let addr = pb.start_addr.wrapping_add((pb.stream_offset() as u32) << 1);
    for (i, slot) in out.iter_mut().enumerate().take(size) {
        *slot = read_i16(mem.ram(), addr.wrapping_add(2 * i as u32), RAM_MASK);
    }
    pb.set_stream_offset(pb.stream_offset().wrapping_add(size as u16));
}

/// Decode raw streamed 16-bit audio from main RAM.
///
/// `real_size` is the resampler's input requirement; `out_size` the
/// requested output size, which the firmware's loop handling uses for the
/// second-stage read. The accumulator sequence below reproduces the
/// firmware arithmetic literally, signed-overflow loop trigger included;
/// its intent is only partially recovered, so it must not be "cleaned up".
pub fn decode_raw<M: DspMemory>(
    mem: &M,
    pb: &mut VoiceParams,
    out: &mut [i16],
    real_size: usize,
    out_size: usize,
) {
    if pb.stop_on_silence != 0 || pb.rem_length < real_size as u32 {
        warn!("raw stream end (remaining {})", pb.rem_length);
        pb.rem_length = 0;
        pb.key_off = 1;
    }
    pb.rem_length = pb.rem_length.wrapping_sub(real_size as u32);

    let mut acc0 = (pb.stream_limit as u64) << 16;
    let acc1 = (pb.stream_offset() as u64) << 16;
    acc0 = acc0.wrapping_sub(acc1);
    pb.stream_pending = (acc0 >> 16) as u16;
    acc0 = acc0.wrapping_sub((real_size as u64) << 16);

    if (acc0 as i64) < 0 {
        // Stream boundary inside this request: read what is left, rewind
        // the offset, swap the base to the loop start, read the rest.
        let first = pb.stream_pending as usize;
        read_audio(mem, pb, first, out);

        let mut acc = (out_size as u32) << 16;
        acc = acc.wrapping_sub((pb.stream_pending as u32) << 16);

        pb.set_stream_offset(0);
        pb.start_addr = pb.loop_start_pos;
        read_audio(mem, pb, (acc >> 16) as usize, out);
        return;
    }

    read_audio(mem, pb, real_size, out);
}

/// Equal-power pan curve over a 7-bit index, Q15 output.
///
/// The hardware loads this table from its microcode image; titles that
/// ship their own curve can inject it through the mixer.
pub fn default_pan_table() -> [i16; PAN_TABLE_LEN] {
    let mut table = [0i16; PAN_TABLE_LEN];
    for (i, v) in table.iter_mut().enumerate() {
        let theta = std::f32::consts::FRAC_PI_2 * i as f32 / (PAN_TABLE_LEN - 1) as f32;
        *v = (32767.0 * theta.sin()) as i16;
    }
    table
}

/// In-place voice-buffer filter hook.
///
/// Recognized via the block's filter-enable word; the filter itself is an
/// extension point with no required behavior at this boundary.
pub fn filter_voice_buffer(_buf: &mut [i32]) {}

/// Ramped multiply-accumulate of one voice buffer into one mix bus.
///
/// The gain ramp advances by `delta` on even sample indices within the
/// first 64 samples only. Buses without a realized accumulator still
/// advance the ramp so the reached gain persists. Returns the final ramp.
fn ramped_multiply_add(
    accum: Option<&mut [i32]>,
    src: &[i32],
    mut ramp: u32,
    delta: i32,
    size: usize,
) -> u32 {
    match accum {
        Some(accum) => {
            for i in 0..size {
                let value = src[i] as i64 as u64;
                accum[i] =
                    accum[i].wrapping_add((value.wrapping_mul(ramp as u64) >> 29) as i32);
                if i & 1 == 0 && i < 64 {
                    ramp = ramp.wrapping_add(delta as u32);
                }
            }
        }
        None => {
            for i in 0..size {
                if i & 1 == 0 && i < 64 {
                    ramp = ramp.wrapping_add(delta as u32);
                }
            }
        }
    }
    ramp
}

/// Simple volume mode: six independent ramped buses.
///
/// Only buses 0 and 1 are realized as left/right; the others compute and
/// persist their ramps with no output. Reached gains are written back into
/// each bus's current-gain word.
pub(crate) fn mix_simple(
    pb: &mut VoiceParams,
    src: &[i32],
    left: &mut [i32],
    right: &mut [i32],
    size: usize,
) {
    if pb.stop_on_silence != 0 {
        let mut sum: u32 = 0;
        for bus in &mut pb.buses {
            bus.target = bus.current >> 1;
            sum += bus.target as u32;
        }
        if sum == 0 {
            pb.key_off = 1;
        }
    }

    for (count, bus) in pb.buses.iter_mut().enumerate() {
        let mix = bus.dest != 0;
        let delta = ((bus.target as i32) - (bus.current as i32)) << 11;
        let mut ramp = (bus.current as u32) << 16;
        if mix {
            let accum = match count {
                0 => Some(&mut left[..size]),
                1 => Some(&mut right[..size]),
                _ => None,
            };
            ramp = ramped_multiply_add(accum, src, ramp, delta, size);
            if size < 32 {
                ramp = ramp.wrapping_add(delta.wrapping_mul(size as i32 - 32) as u32);
            }
        }
        bus.current = (ramp >> 16) as u16;
    }
}

/// Complex (panned) volume mode.
///
/// Two 7-bit pan inputs index the pan-law table; four cross-faded gain
/// coefficients and their ramp deltas are derived in the firmware's exact
/// 16-bit truncating sequence. Eight ramp slots exist; only the first two
/// feed realized buses (left/right).
pub(crate) fn mix_complex(
    pb: &mut VoiceParams,
    src: &[i32],
    left: &mut [i32],
    right: &mut [i32],
    size: usize,
    pan_table: &[i16; PAN_TABLE_LEN],
) {
    if pb.stop_on_silence != 0 {
        pb.vol_target = pb.vol_current >> 1;
        if pb.vol_target == 0 {
            pb.key_off = 1;
        }
    }

    let ax0l = ((pb.pan >> 8) & 0x7F) as usize;
    let ax0h = (pb.pan & 0x7F) as usize;
    let ax1l = ax0l ^ 0x7F;
    let ax1h = ax0h ^ 0x7F;
    let g0l = pan_table[ax0l] as i32;
    let g0h = pan_table[ax0h] as i32;
    let g1l = pan_table[ax1l] as i32;
    let g1h = pan_table[ax1h] as i32;

    // 16-bit working registers; every store truncates like the hardware.
    let mut b = [0i16; 20];
    b[0] = ((g1l * g1h) >> 16) as i16;
    b[1] = ((g0l * g1h) >> 16) as i16;
    b[2] = ((g0h * g1l) >> 16) as i16;
    b[3] = ((g0l * g0h) >> 16) as i16;

    let vol_current = pb.vol_current as i16 as i32;
    let volume = pb.volume as i16 as i32;
    for i in 0..4 {
        b[i + 4] = (((b[i] as i32) * vol_current) >> 16) as i16;
    }

    let prod = (vol_current * volume * 2) >> 16;
    for i in 0..4 {
        b[i + 8] = (b[i + 4] as i32).wrapping_mul(prod) as i16;
    }

    let diff = (pb.vol_target as i16 as i32) - vol_current;
    pb.vol_current = pb.vol_target;

    for i in 0..4 {
        // Unsigned reinterpretation of the base coefficient, as the
        // firmware's multiply does.
        b[i + 0xC] = (((b[i] as u16 as i32) * diff) >> 16) as i16;
    }
    for i in 0..4 {
        b[i + 0x10] = (b[i + 0xC] as i32).wrapping_mul(pb.volume as i32) as i16;
    }

    // Eight ramp slots map to eight firmware buses; left and right are the
    // two realized here. The per-slot delta never advances the ramp within
    // a block in this mode.
    for count in 0..2 {
        let value = b[4 + count] as i32;
        let _delta = (b[0xC + count] as i32) << 11;
        let ramp = value.wrapping_shl(16);

        let accum: &mut [i32] = if count == 0 { left } else { right };
        for (i, slot) in accum.iter_mut().enumerate().take(size) {
            let audio = src[i] as i64 as u64;
            *slot = slot.wrapping_add((audio.wrapping_mul(ramp as i64 as u64) >> 29) as i32);
        }
    }
}
