use anyhow::{ensure, Result};
use aus::spectrum;
use aus::WindowType;
use ndarray::Array2;

pub(crate) const PITCH_CLASSES: usize = 12;

/// Frame-major chroma matrix, one row per STFT frame.
///
/// Each row holds the spectral power folded onto the twelve pitch classes
/// (C = 0, A = 9) and is scaled so its strongest class is 1. Rows from
/// silent frames stay zero.
pub(crate) fn chromagram(
    samples: &[f32],
    sample_rate: u32,
    frame_length: usize,
    hop_length: usize,
    fmin: f64,
    fmax: f64,
) -> Result<Array2<f64>> {
    ensure!(!samples.is_empty(), "cannot compute chroma of an empty signal");
    ensure!(hop_length > 0, "hop_length must be positive");

    let pad = frame_length / 2;
    let mut audio = vec![0.0; samples.len() + 2 * pad];
    for (slot, &sample) in audio[pad..].iter_mut().zip(samples) {
        *slot = sample as f64;
    }

    let stft = spectrum::rstft(&audio, frame_length, hop_length, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let freqs = spectrum::rfftfreq(frame_length, sample_rate);
    let classes: Vec<Option<usize>> = freqs
        .iter()
        .map(|&freq| pitch_class(freq, fmin, fmax))
        .collect();

    let mut chroma = Array2::<f64>::zeros((magnitude.len(), PITCH_CLASSES));
    for (mut row, bins) in chroma.rows_mut().into_iter().zip(&magnitude) {
        for (value, class) in bins.iter().zip(&classes) {
            if let Some(class) = class {
                row[*class] += value * value;
            }
        }
        let peak = row.fold(0.0_f64, |acc, &v| acc.max(v));
        if peak > 0.0 {
            row.mapv_inplace(|v| v / peak);
        }
    }
    Ok(chroma)
}

fn pitch_class(freq: f64, fmin: f64, fmax: f64) -> Option<usize> {
    if !(fmin..=fmax).contains(&freq) {
        return None;
    }
    let midi = (69.0 + 12.0 * (freq / 440.0).log2()).round() as i64;
    Some(midi.rem_euclid(PITCH_CLASSES as i64) as usize)
}
