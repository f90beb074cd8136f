use std::io::Cursor;

use anyhow::{Context, Result};

use crate::types::AudioSignal;

/// Encode a signal as 16-bit mono PCM WAV bytes.
pub fn encode_wav(signal: &AudioSignal) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("Failed to start WAV stream")?;
    for &sample in signal.samples() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .context("Failed to write audio sample")?;
    }
    writer.finalize().context("Failed to finalize WAV stream")?;

    Ok(cursor.into_inner())
}
