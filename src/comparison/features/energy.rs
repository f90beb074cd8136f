use super::frames::{fill_frame, frame_count, frame_rms};

/// Centered short-time RMS energy, one value per hop.
pub(crate) fn rms_energy(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f64> {
    let mut window = vec![0.0; frame_length];
    (0..frame_count(samples.len(), hop_length))
        .map(|index| {
            fill_frame(samples, index, hop_length, &mut window);
            frame_rms(&window)
        })
        .collect()
}
