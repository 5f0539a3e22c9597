//! WAV export of mixed audio
//!
//! Only available with the `export-wav` feature. Useful for dumping mixer
//! output to disk when debugging a title's voice setup.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{DspError, Result};

/// Write interleaved stereo 16-bit samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, sample_rate: u32, interleaved: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(path, spec).map_err(|e| DspError::Export(e.to_string()))?;
    for &sample in interleaved {
        writer
            .write_sample(sample)
            .map_err(|e| DspError::Export(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| DspError::Export(e.to_string()))
}
