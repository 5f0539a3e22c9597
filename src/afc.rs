//! AFC block codec
//!
//! AFC is the block-based ADPCM variant consumed by the voice pipeline:
//! each compressed block is 9 bytes (one header byte plus 8 data bytes)
//! and always expands to 16 signed 16-bit samples. The header carries a
//! scale exponent in the high nibble and a predictor-coefficient index in
//! the low nibble; prediction runs over the two most recent output
//! samples.
//!
//! Two variants exist, selected by the voice format code: format 9 packs
//! 4-bit residuals (32:9 compression), format 5 packs 2-bit residuals and
//! leaves the last four data bytes unused.

/// Compressed bytes per AFC block.
pub const BLOCK_BYTES: u32 = 9;

/// Samples produced per AFC block.
pub const SAMPLES_PER_BLOCK: usize = 16;

/// Default predictor coefficient table (16 pairs, 4.11 fixed point).
///
/// This is the table the format's standard tooling bakes into sample
/// banks; titles may supply their own through the decoding context.
pub const AFC_COEF_TABLE: [i16; 32] = [
    0x0000, 0x0000, 0x0800, 0x0000, 0x0000, 0x0800, 0x0400, 0x0400,
    0x1000, -0x0800, 0x0E00, -0x0600, 0x0C00, -0x0400, 0x1200, -0x0A00,
    0x1068, -0x08C8, 0x12C0, -0x08FC, 0x1400, -0x0C00, 0x0800, -0x0800,
    0x0400, -0x0400, -0x0400, 0x0400, -0x0400, 0x0000, -0x0800, 0x0000,
];

/// Decode one 9-byte block into 16 samples.
///
/// `yn2`/`yn1` are the predictor history registers (older / most recent
/// sample), updated in place so the caller can carry them across blocks or
/// roll them back when a block is only partially consumed. `format`
/// selects the residual width: 9 for 4-bit, 5 for 2-bit.
pub fn decode_block(
    coefs: &[i16; 32],
    src: &[u8],
    out: &mut [i16; SAMPLES_PER_BLOCK],
    yn2: &mut i16,
    yn1: &mut i16,
    format: u16,
) {
    let delta = 1i32 << (src[0] >> 4);
    let idx = (src[0] & 0x0F) as usize;
    let coef1 = coefs[idx * 2] as i32;
    let coef2 = coefs[idx * 2 + 1] as i32;

    let mut nibbles = [0i32; SAMPLES_PER_BLOCK];
    if format == 5 {
        // 2-bit residuals: 4 samples per data byte, scaled up two extra bits.
        for i in 0..4 {
            let byte = src[1 + i];
            for j in 0..4 {
                let mut v = ((byte >> (6 - 2 * j)) & 0x03) as i32;
                if v > 1 {
                    v -= 4;
                }
                nibbles[i * 4 + j] = v << 13;
            }
        }
    } else {
        // 4-bit residuals: 2 samples per data byte.
        for i in 0..8 {
            let byte = src[1 + i];
            let hi = (byte >> 4) as i32;
            let lo = (byte & 0x0F) as i32;
            nibbles[i * 2] = (if hi > 7 { hi - 16 } else { hi }) << 11;
            nibbles[i * 2 + 1] = (if lo > 7 { lo - 16 } else { lo }) << 11;
        }
    }

    let mut hist1 = *yn1 as i32;
    let mut hist2 = *yn2 as i32;
    for (n, slot) in nibbles.iter().zip(out.iter_mut()) {
        let sample = ((delta * n + coef1 * hist1 + coef2 * hist2) >> 11).clamp(-32768, 32767);
        *slot = sample as i16;
        hist2 = hist1;
        hist1 = sample;
    }
    *yn1 = hist1 as i16;
    *yn2 = hist2 as i16;
}
