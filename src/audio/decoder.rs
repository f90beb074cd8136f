use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::resample;
use crate::comparison::{ComparisonError, Result};
use crate::config::AnalysisConfig;
use crate::types::AudioSignal;

/// Decode an in-memory audio stream to a mono signal at the canonical analysis rate.
///
/// Any container/codec symphonia understands is accepted. Channels are averaged,
/// and the result is resampled to `config.sample_rate` so that two signals loaded
/// with the same config share one frame grid.
pub fn load(bytes: &[u8], config: &AnalysisConfig) -> Result<AudioSignal> {
    if bytes.is_empty() {
        return Err(ComparisonError::Decode("audio stream is empty".into()));
    }

    let (samples, source_rate) = decode_mono(bytes.to_vec())?;
    let duration = samples.len() as f64 / source_rate as f64;
    if duration < config.min_duration_secs {
        return Err(ComparisonError::Decode(format!(
            "audio lasts {:.3}s, shorter than the {:.3}s minimum",
            duration, config.min_duration_secs
        )));
    }

    let samples = if source_rate == config.sample_rate {
        samples
    } else {
        resample::linear_resample(&samples, source_rate, config.sample_rate)
            .map_err(|err| ComparisonError::Decode(err.to_string()))?
    };
    debug!(
        source_rate,
        target_rate = config.sample_rate,
        samples = samples.len(),
        "decoded audio stream"
    );
    Ok(AudioSignal::from_samples(samples, config.sample_rate))
}

fn decode_mono(bytes: Vec<u8>) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probe_result = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| decode_error("unrecognised audio format", err))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ComparisonError::Decode("no audio tracks found".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| ComparisonError::Decode("sample rate not specified".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| decode_error("unsupported codec", err))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(decode_error("failed to read packet", err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(reason, "skipping corrupt audio packet");
                continue;
            }
            Err(err) => return Err(decode_error("failed to decode packet", err)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        mix_to_mono(interleaved.samples(), channels, &mut mono);
    }

    Ok((mono, sample_rate))
}

/// Average interleaved frames into one channel.
fn mix_to_mono(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    if channels == 1 {
        output.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    output.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

fn decode_error(context: &str, err: SymphoniaError) -> ComparisonError {
    ComparisonError::Decode(format!("{context}: {err}"))
}
