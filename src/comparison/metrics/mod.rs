use ndarray::Zip;

use crate::comparison::{ComparisonError, Result};
use crate::types::{AlignedPair, ComparisonResult};

/// Pitch difference (Hz) at which the pitch half of the composite reaches zero.
const PITCH_TOLERANCE_HZ: f64 = 50.0;
/// RMS energy difference at which the timing half of the composite reaches zero.
const TIMING_TOLERANCE: f64 = 0.1;
const PITCH_WEIGHT: f64 = 0.6;
const TIMING_WEIGHT: f64 = 0.4;

/// Reduces aligned feature pairs to scalar differences.
#[derive(Debug, Clone, Default)]
pub struct Scorer {}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, pitch: &AlignedPair, energy: &AlignedPair) -> Result<ComparisonResult> {
        let pitch_difference = pitch_difference(pitch)?;
        let timing_difference = timing_difference(energy)?;
        let dropped = pitch.dropped_frames().max(energy.dropped_frames());
        Ok(ComparisonResult {
            pitch_difference,
            timing_difference,
            composite_score: Some(composite_score(pitch_difference, timing_difference)),
            chroma_difference: None,
            length_difference_seconds: dropped as f64 * pitch.hop_seconds(),
        })
    }

    /// Mean absolute per-bin difference between two aligned chromagrams.
    pub fn score_chroma(&self, chroma: &AlignedPair) -> Result<f64> {
        let mut total = 0.0;
        let mut count = 0usize;
        Zip::from(chroma.student().frames())
            .and(chroma.reference().frames())
            .for_each(|&a, &b| {
                if a.is_finite() && b.is_finite() {
                    total += (a - b).abs();
                    count += 1;
                }
            });
        if count == 0 {
            return Err(ComparisonError::InsufficientData(
                "no comparable chroma bins".into(),
            ));
        }
        Ok(total / count as f64)
    }
}

/// Weighted 0 to 100 score, non-increasing in both differences.
pub fn composite_score(pitch_difference: f64, timing_difference: f64) -> f64 {
    let pitch_band = 1.0 - (pitch_difference / PITCH_TOLERANCE_HZ).clamp(0.0, 1.0);
    let timing_band = 1.0 - (timing_difference / TIMING_TOLERANCE).clamp(0.0, 1.0);
    (100.0 * (PITCH_WEIGHT * pitch_band + TIMING_WEIGHT * timing_band)).clamp(0.0, 100.0)
}

fn pitch_difference(pair: &AlignedPair) -> Result<f64> {
    let (total, voiced) = pair
        .student()
        .values()
        .iter()
        .zip(pair.reference().values())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .fold((0.0, 0usize), |(total, voiced), (a, b)| {
            (total + (a - b).abs(), voiced + 1)
        });
    if voiced == 0 {
        return Err(ComparisonError::InsufficientData(format!(
            "no frame among {} has a pitch in both recordings",
            pair.len()
        )));
    }
    Ok(total / voiced as f64)
}

fn timing_difference(pair: &AlignedPair) -> Result<f64> {
    if pair.is_empty() {
        return Err(ComparisonError::InsufficientData(
            "no aligned energy frames".into(),
        ));
    }
    let total: f64 = pair
        .student()
        .values()
        .iter()
        .zip(pair.reference().values())
        .map(|(a, b)| (a - b).abs())
        .sum();
    Ok(total / pair.len() as f64)
}
