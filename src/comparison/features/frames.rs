/// Number of centered frames covering `len` samples at stride `hop`.
pub(crate) fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Fill `window` with the frame centered on sample `index * hop`.
///
/// Positions outside the signal read as zero.
pub(crate) fn fill_frame(samples: &[f32], index: usize, hop: usize, window: &mut [f64]) {
    let start = (index * hop) as isize - (window.len() / 2) as isize;
    for (offset, slot) in window.iter_mut().enumerate() {
        let position = start + offset as isize;
        *slot = if position >= 0 && (position as usize) < samples.len() {
            samples[position as usize] as f64
        } else {
            0.0
        };
    }
}

pub(crate) fn frame_rms(window: &[f64]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    (window.iter().map(|v| v * v).sum::<f64>() / window.len() as f64).sqrt()
}
