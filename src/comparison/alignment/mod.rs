use tracing::debug;

use crate::comparison::{ComparisonError, Result};
use crate::types::{AlignedPair, FeatureSequence};

const HOP_TOLERANCE_SECS: f64 = 1e-9;

/// Puts a student and a reference sequence on one frame grid.
///
/// This is plain truncation to the shorter sequence, after nearest-frame
/// regridding when the two hops differ. It is not time warping, so a singer who
/// starts late is compared against the wrong frames.
#[derive(Debug, Clone, Default)]
pub struct Aligner {}

impl Aligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn align(
        &self,
        student: &FeatureSequence,
        reference: &FeatureSequence,
    ) -> Result<AlignedPair> {
        check_sequence("student", student)?;
        check_sequence("reference", reference)?;
        if student.kind() != reference.kind() {
            return Err(ComparisonError::Alignment(format!(
                "cannot align {:?} against {:?}",
                student.kind(),
                reference.kind()
            )));
        }
        if student.width() != reference.width() {
            return Err(ComparisonError::Alignment(format!(
                "feature widths differ ({} vs {})",
                student.width(),
                reference.width()
            )));
        }

        let regridded;
        let reference = if (student.hop_seconds() - reference.hop_seconds()).abs()
            > HOP_TOLERANCE_SECS
        {
            regridded = regrid(reference, student)?;
            &regridded
        } else {
            reference
        };

        let frames = student.len().min(reference.len());
        let dropped_frames = student.len().max(reference.len()) - frames;
        debug!(
            kind = ?student.kind(),
            student_frames = student.len(),
            reference_frames = reference.len(),
            frames,
            dropped_frames,
            "aligned feature sequences"
        );
        Ok(AlignedPair::new(
            student.truncated(frames),
            reference.truncated(frames),
            dropped_frames,
        ))
    }
}

fn check_sequence(role: &str, sequence: &FeatureSequence) -> Result<()> {
    if sequence.is_empty() {
        return Err(ComparisonError::Alignment(format!(
            "{role} sequence has no frames"
        )));
    }
    if sequence.sample_rate() == 0 || sequence.hop_length() == 0 {
        return Err(ComparisonError::Alignment(format!(
            "{role} sequence has a zero sample rate or hop"
        )));
    }
    Ok(())
}

/// Resample `source` onto the hop grid of `target` by nearest frame.
///
/// Values are copied, never interpolated, so `NaN` pitch frames survive.
fn regrid(source: &FeatureSequence, target: &FeatureSequence) -> Result<FeatureSequence> {
    // both hops scaled to one integer unit so the frame count is exact
    let source_span = source.hop_length() as u64 * target.sample_rate() as u64;
    let target_span = target.hop_length() as u64 * source.sample_rate() as u64;
    let frames = (source.len() as u64 * source_span / target_span) as usize;
    if frames == 0 {
        return Err(ComparisonError::Alignment(format!(
            "{:.3}s of reference frames is shorter than one {:.3}s hop",
            source.len() as f64 * source.hop_seconds(),
            target.hop_seconds()
        )));
    }
    let step = target_span as f64 / source_span as f64;
    let last = source.len() - 1;
    let rows: Vec<usize> = (0..frames)
        .map(|k| ((k as f64 * step).round() as usize).min(last))
        .collect();
    Ok(source.with_rows(&rows, target.hop_length(), target.sample_rate()))
}
