use crate::config::AnalysisConfig;

use super::frames::{fill_frame, frame_count, frame_rms};

/// Resolved YIN search parameters, all in samples.
#[derive(Debug, Clone)]
pub(crate) struct YinParams {
    frame_length: usize,
    hop_length: usize,
    min_period: usize,
    max_period: usize,
    threshold: f64,
    silence_rms: f64,
    sample_rate: f64,
}

impl YinParams {
    pub(crate) fn from_config(config: &AnalysisConfig) -> Self {
        let half = config.frame_length - config.frame_length / 2;
        Self {
            frame_length: config.frame_length,
            hop_length: config.hop_length,
            min_period: config.min_period().max(2),
            max_period: config.max_period().min(half.saturating_sub(1)),
            threshold: config.yin_threshold,
            silence_rms: config.silence_rms,
            sample_rate: config.sample_rate as f64,
        }
    }
}

/// Per-frame fundamental frequency in Hz, `NaN` where the frame is unpitched.
///
/// Frame `i` is centered on sample `i * hop_length`, matching the energy frames,
/// so the returned contour never skips an index.
pub(crate) fn yin_contour(samples: &[f32], params: &YinParams) -> Vec<f64> {
    let mut window = vec![0.0; params.frame_length];
    let mut difference = vec![0.0; params.max_period + 1];
    let mut normalized = vec![0.0; params.max_period + 1];
    (0..frame_count(samples.len(), params.hop_length))
        .map(|index| {
            fill_frame(samples, index, params.hop_length, &mut window);
            estimate_frame(&window, params, &mut difference, &mut normalized)
        })
        .collect()
}

fn estimate_frame(
    window: &[f64],
    params: &YinParams,
    difference: &mut [f64],
    normalized: &mut [f64],
) -> f64 {
    if params.min_period >= params.max_period || frame_rms(window) < params.silence_rms {
        return f64::NAN;
    }
    let integration = window.len() / 2;
    difference_function(window, integration, difference);
    if !cumulative_mean_normalize(difference, normalized) {
        return f64::NAN;
    }
    match absolute_threshold(normalized, params) {
        Some(tau) => params.sample_rate / parabolic_refine(normalized, tau),
        None => f64::NAN,
    }
}

/// d(tau) = sum over the integration window of (x[j] - x[j + tau])^2.
fn difference_function(window: &[f64], integration: usize, difference: &mut [f64]) {
    difference[0] = 0.0;
    for tau in 1..difference.len() {
        difference[tau] = window[..integration]
            .iter()
            .zip(&window[tau..tau + integration])
            .map(|(a, b)| {
                let delta = a - b;
                delta * delta
            })
            .sum();
    }
}

/// Returns false when the difference function is identically zero.
fn cumulative_mean_normalize(difference: &[f64], normalized: &mut [f64]) -> bool {
    normalized[0] = 1.0;
    let mut running = 0.0;
    for tau in 1..difference.len() {
        running += difference[tau];
        normalized[tau] = if running > 0.0 {
            difference[tau] * tau as f64 / running
        } else {
            1.0
        };
    }
    running > 0.0
}

/// First dip under the threshold, walked down to its local minimum.
fn absolute_threshold(normalized: &[f64], params: &YinParams) -> Option<usize> {
    let mut tau = params.min_period;
    while tau <= params.max_period {
        if normalized[tau] < params.threshold {
            while tau < params.max_period && normalized[tau + 1] < normalized[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }
    None
}

fn parabolic_refine(normalized: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= normalized.len() {
        return tau as f64;
    }
    let (left, centre, right) = (normalized[tau - 1], normalized[tau], normalized[tau + 1]);
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() < f64::EPSILON {
        return tau as f64;
    }
    let shift = (0.5 * (left - right) / denominator).clamp(-1.0, 1.0);
    tau as f64 + shift
}
