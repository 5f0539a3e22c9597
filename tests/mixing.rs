//! End-to-end mixing scenarios over emulated memory.
//!
//! These drive the full pipeline the way a host would: parameter blocks
//! seeded in RAM, sample data in ARAM, several blocks mixed in sequence
//! with state carried through write-back.

use dsphle::params::{PB_SIZE, VoiceParams};
use dsphle::{DspMemory, EmulatedMemory, MixerConfig, VoiceMixer};

const PBS_ADDR: u32 = 0x1000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn store_word(mem: &mut EmulatedMemory, voice: u32, word_off: usize, value: u16) {
    let addr = PBS_ADDR + voice * PB_SIZE + 2 * word_off as u32;
    mem.load_ram(addr, &value.to_be_bytes());
}

fn store_u32(mem: &mut EmulatedMemory, voice: u32, word_off: usize, value: u32) {
    store_word(mem, voice, word_off, (value >> 16) as u16);
    store_word(mem, voice, word_off + 1, value as u16);
}

fn read_pb(mem: &EmulatedMemory, voice: u32) -> VoiceParams {
    VoiceParams::read(mem.ram(), PBS_ADDR + voice * PB_SIZE)
}

/// Activate a voice slot with one flat-gain bus (0 = left, 1 = right).
fn activate(mem: &mut EmulatedMemory, voice: u32, bus: usize, gain: u16) {
    store_word(mem, voice, 0x00, 1); // status
    store_word(mem, voice, 0x08 + bus * 4, 0x0D00); // bus dest
    store_word(mem, voice, 0x09 + bus * 4, gain); // target
    store_word(mem, voice, 0x0A + bus * 4, gain); // current
}

fn load_pcm16(mem: &mut EmulatedMemory, addr: u32, samples: &[i16]) {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    mem.load_aram(addr, &bytes);
}

/// One AFC block with coefficient index 0 and the given 4-bit residuals.
fn load_afc_block(mem: &mut EmulatedMemory, addr: u32, residuals: &[i8; 16], scale: u8) {
    let mut block = [0u8; 9];
    block[0] = scale << 4;
    for i in 0..8 {
        block[1 + i] =
            (((residuals[2 * i] as u8) & 0x0F) << 4) | ((residuals[2 * i + 1] as u8) & 0x0F);
    }
    mem.load_aram(addr, &block);
}

fn mixer_at_32k(num_voices: usize) -> VoiceMixer {
    let mut mixer = VoiceMixer::new(MixerConfig {
        sample_rate: 32_000,
        num_voices,
        voice_pbs_addr: PBS_ADDR,
    })
    .unwrap();
    mixer.set_sync_flags([0xFFFF; 16]);
    mixer
}

#[test]
fn test_four_voice_block() {
    init_logging();
    let mut mem = EmulatedMemory::new(0x10000, 0x10000);

    // Voice 0: blank, constant 100 into the left bus at a flat 0x4000 gain
    // (the ramp engine doubles the sample at that gain).
    activate(&mut mem, 0, 0, 0x4000);
    store_word(&mut mem, 0, 0x06, 1); // is_blank
    store_word(&mut mem, 0, 0x33, 100); // fixed_sample

    // Voice 1: PCM16 at unity ratio into the right bus. Negative samples
    // pass the resampler bit-exact; it carries a fixed 3-sample latency
    // from the lookback window.
    activate(&mut mem, 1, 1, 0x4000);
    store_word(&mut mem, 1, 0x02, 0x1000); // ratio
    store_word(&mut mem, 1, 0x04, 1); // needs_reset
    store_word(&mut mem, 1, 0x90, 0x0010); // format
    store_u32(&mut mem, 1, 0xA2, 64); // length
    store_u32(&mut mem, 1, 0xA4, 0x2000); // start_addr
    load_pcm16(&mut mem, 0x2000, &[-1000; 64]);

    // Voice 2: slot present but inactive.

    // Voice 3: AFC one-shot, 16 samples of +16 into the left bus. Positive
    // samples lose one LSB in the interpolation, so they arrive as 15.
    activate(&mut mem, 3, 0, 0x4000);
    store_word(&mut mem, 3, 0x02, 0x1000);
    store_word(&mut mem, 3, 0x04, 1);
    store_word(&mut mem, 3, 0x90, 0x0009);
    store_u32(&mut mem, 3, 0xA2, 16);
    store_u32(&mut mem, 3, 0xA4, 0x3000);
    load_afc_block(&mut mem, 0x3000, &[1; 16], 4);

    let mut mixer = mixer_at_32k(4);
    let mut out = vec![0i16; 64];
    mixer.mix_into(&mut mem, &mut out);

    for (i, frame) in out.chunks(2).enumerate() {
        // Left: blank (200) plus the AFC voice (30) while its 16 samples
        // are in flight behind the 3-sample latency.
        let afc = if (3..19).contains(&i) { 30 } else { 0 };
        assert_eq!(frame[0], 200 + afc, "left frame {i}");
        // Right: PCM16, -2000 after the latency gap.
        let pcm = if i < 3 { 0 } else { -2000 };
        assert_eq!(frame[1], pcm, "right frame {i}");
    }

    // Write-back: the PCM16 voice consumed 32 of its 64 samples, the AFC
    // one-shot ran out and keyed itself off.
    let pb1 = read_pb(&mem, 1);
    assert_eq!(pb1.rem_length, 32);
    assert_eq!(pb1.cur_addr, 0x2000 + 2 * 32);
    assert_eq!(pb1.key_off, 0);
    let pb3 = read_pb(&mem, 3);
    assert_eq!(pb3.key_off, 1);

    // Second block: the keyed-off AFC voice is skipped; PCM16 continues
    // with a warm history, so the latency gap is gone.
    let mut out2 = vec![0i16; 64];
    mixer.mix_into(&mut mem, &mut out2);
    for (i, frame) in out2.chunks(2).enumerate() {
        assert_eq!(frame[0], 200, "left frame {i}");
        assert_eq!(frame[1], -2000, "right frame {i}");
    }
}

#[test]
fn test_mixed_formats_over_128_frames() {
    init_logging();
    let mut mem = EmulatedMemory::new(0x10000, 0x10000);

    // Voice 0: blank, constant 100 into the left bus.
    activate(&mut mem, 0, 0, 0x4000);
    store_word(&mut mem, 0, 0x06, 1);
    store_word(&mut mem, 0, 0x33, 100);

    // Voice 1: PCM16 looping at half ratio into the right bus; 128 output
    // frames consume 64 source samples, wrapping the 48-sample loop once.
    activate(&mut mem, 1, 1, 0x4000);
    store_word(&mut mem, 1, 0x02, 0x0800);
    store_word(&mut mem, 1, 0x04, 1);
    store_word(&mut mem, 1, 0x90, 0x0010);
    store_word(&mut mem, 1, 0x91, 1); // repeat
    store_u32(&mut mem, 1, 0xA0, 0); // loop_start_pos
    store_u32(&mut mem, 1, 0xA2, 48);
    store_u32(&mut mem, 1, 0xA4, 0x2000);
    load_pcm16(&mut mem, 0x2000, &[-600; 48]);

    // Voice 2: AFC at unity into the right bus, long stream; 128 outputs
    // pull 9 blocks, the 9th only staged and rolled back.
    activate(&mut mem, 2, 1, 0x4000);
    store_word(&mut mem, 2, 0x02, 0x1000);
    store_word(&mut mem, 2, 0x04, 1);
    store_word(&mut mem, 2, 0x90, 0x0009);
    store_u32(&mut mem, 2, 0xA2, 1000);
    store_u32(&mut mem, 2, 0xA4, 0x3000);
    for n in 0..9 {
        load_afc_block(&mut mem, 0x3000 + n * 9, &[1; 16], 4);
    }

    // Voice 3: slot present but status 0; its block must stay untouched.
    store_word(&mut mem, 3, 0x38, 0xBEEF);

    let mut mixer = mixer_at_32k(4);
    let mut out = vec![0i16; 256];
    mixer.mix_into(&mut mem, &mut out);

    // Steady state after the resampler latency: blank contributes 200
    // left; right carries PCM16 (-1200) plus AFC (+30; positive samples
    // lose one LSB in the interpolation, 16 -> 15, doubled by the gain).
    for (i, frame) in out.chunks(2).enumerate().skip(8) {
        assert_eq!(frame[0], 200, "left frame {i}");
        assert_eq!(frame[1], -1170, "right frame {i}");
    }

    // PCM16 looped once: 48 + 16 samples consumed, so the cursor sits 16
    // samples past the loop start with 32 left in this pass.
    let pb1 = read_pb(&mem, 1);
    assert_eq!(pb1.rem_length, 32);
    assert_eq!(pb1.cur_addr, 0x2000 + 2 * 16);
    assert_eq!(pb1.key_off, 0);

    // AFC: 128 samples consumed; the 9th block was staged but not
    // consumed, so the cursor rolled back to it.
    let pb2 = read_pb(&mem, 2);
    assert_eq!(pb2.rem_length, 1000 - 128);
    assert_eq!(pb2.cur_addr, 0x3000 + 8 * 9);
    assert_eq!(pb2.yn1 as i16, 16);
    assert_eq!(pb2.key_off, 0);

    // The inactive slot was never written back.
    let pb3 = read_pb(&mem, 3);
    assert_eq!(pb3.cur_addr, 0xBEEF << 16);
}

#[test]
fn test_pcm16_loop_streams_seamlessly() {
    init_logging();
    let mut mem = EmulatedMemory::new(0x10000, 0x10000);

    activate(&mut mem, 0, 1, 0x4000);
    store_word(&mut mem, 0, 0x02, 0x1000); // unity ratio
    store_word(&mut mem, 0, 0x04, 1); // needs_reset
    store_word(&mut mem, 0, 0x90, 0x0010); // format
    store_word(&mut mem, 0, 0x91, 1); // repeat_mode: loop
    store_u32(&mut mem, 0, 0xA0, 0); // loop_start_pos
    store_u32(&mut mem, 0, 0xA2, 16); // length
    store_u32(&mut mem, 0, 0xA4, 0x2000);
    load_pcm16(&mut mem, 0x2000, &[-500; 16]);

    let mut mixer = mixer_at_32k(1);
    for block in 0..4 {
        let mut out = vec![0i16; 64];
        mixer.mix_into(&mut mem, &mut out);
        for (i, frame) in out.chunks(2).enumerate() {
            let expect = if block == 0 && i < 3 { 0 } else { -1000 };
            assert_eq!(frame[1], expect, "block {block} frame {i}");
        }
    }
    // A looping voice never keys off.
    assert_eq!(read_pb(&mem, 0).key_off, 0);
}

#[test]
fn test_stop_on_silence_decays_to_key_off() {
    init_logging();
    let mut mem = EmulatedMemory::new(0x100, 0x10000);

    activate(&mut mem, 0, 0, 0x4000);
    store_word(&mut mem, 0, 0x06, 1); // is_blank
    store_word(&mut mem, 0, 0x33, 1000); // fixed_sample
    store_word(&mut mem, 0, 0x97, 1); // stop_on_silence

    let mut mixer = mixer_at_32k(1);

    // Each 128-frame block halves the gain target and completes the ramp,
    // so the gain decays 0x4000 -> 0x2000 -> ... -> 0 and the voice keys
    // itself off.
    let mut blocks = 0;
    loop {
        let mut out = vec![0i16; 256];
        mixer.mix_into(&mut mem, &mut out);
        blocks += 1;
        let pb = read_pb(&mem, 0);
        if pb.key_off != 0 {
            break;
        }
        assert!(blocks < 32, "voice failed to decay");
    }

    // Silent from here on: keyed-off voices are skipped entirely.
    let mut out = vec![0i16; 256];
    mixer.mix_into(&mut mem, &mut out);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_half_rate_voice_consumes_half_the_source() {
    init_logging();
    let mut mem = EmulatedMemory::new(0x10000, 0x10000);

    activate(&mut mem, 0, 0, 0x4000);
    store_word(&mut mem, 0, 0x02, 0x0800); // ratio 0.5
    store_word(&mut mem, 0, 0x04, 1);
    store_word(&mut mem, 0, 0x90, 0x0010);
    store_u32(&mut mem, 0, 0xA2, 256);
    store_u32(&mut mem, 0, 0xA4, 0x2000);
    load_pcm16(&mut mem, 0x2000, &[-800; 256]);

    let mut mixer = mixer_at_32k(1);
    let mut out = vec![0i16; 128];
    mixer.mix_into(&mut mem, &mut out);

    // 64 output frames at half rate consume 32 source samples.
    let pb = read_pb(&mem, 0);
    assert_eq!(pb.rem_length, 256 - 32);
    assert_eq!(pb.cur_sample_frac, 0);
}
