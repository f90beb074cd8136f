use approx::assert_relative_eq;
use singalyzer::comparison::alignment::Aligner;
use singalyzer::comparison::metrics::{composite_score, Scorer};
use singalyzer::comparison::ComparisonError;
use singalyzer::types::{AlignedPair, FeatureKind, FeatureSequence};

#[test]
fn identical_performances_score_perfectly() {
    let pitch = aligned(FeatureKind::Pitch, contour(), contour());
    let energy = aligned(FeatureKind::Energy, vec![0.3; 8], vec![0.3; 8]);
    let result = Scorer::new().score(&pitch, &energy).expect("score");

    assert_relative_eq!(result.pitch_difference, 0.0);
    assert_relative_eq!(result.timing_difference, 0.0);
    assert_relative_eq!(result.composite_score.expect("composite"), 100.0, epsilon = 1e-9);
    assert_relative_eq!(result.length_difference_seconds, 0.0);
}

#[test]
fn differences_are_non_negative_and_symmetric() {
    let student = vec![440.0, 450.0, f64::NAN, 460.0, 470.0, 430.0, 420.0, 410.0];
    let reference = contour();
    let energy_a = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.4, 0.3, 0.2];
    let energy_b = vec![0.2; 8];

    let forward = Scorer::new()
        .score(
            &aligned(FeatureKind::Pitch, student.clone(), reference.clone()),
            &aligned(FeatureKind::Energy, energy_a.clone(), energy_b.clone()),
        )
        .expect("forward");
    let backward = Scorer::new()
        .score(
            &aligned(FeatureKind::Pitch, reference, student),
            &aligned(FeatureKind::Energy, energy_b, energy_a),
        )
        .expect("backward");

    assert!(forward.pitch_difference >= 0.0);
    assert!(forward.timing_difference >= 0.0);
    assert_relative_eq!(forward.pitch_difference, backward.pitch_difference, epsilon = 1e-12);
    assert_relative_eq!(forward.timing_difference, backward.timing_difference, epsilon = 1e-12);
}

#[test]
fn scoring_the_same_pair_twice_is_stable() {
    let pitch = aligned(FeatureKind::Pitch, vec![300.0, 310.0, 300.0], vec![305.0; 3]);
    let energy = aligned(FeatureKind::Energy, vec![0.1, 0.2, 0.3], vec![0.3, 0.2, 0.1]);
    let scorer = Scorer::new();
    let first = scorer.score(&pitch, &energy).expect("first");
    let second = scorer.score(&pitch, &energy).expect("second");
    assert_eq!(first, second);
    assert_relative_eq!(first.pitch_difference, 5.0, epsilon = 1e-12);
    assert_relative_eq!(first.timing_difference, 0.4 / 3.0, epsilon = 1e-12);
}

#[test]
fn no_shared_voiced_frame_is_insufficient_data() {
    let pitch = aligned(
        FeatureKind::Pitch,
        vec![440.0, f64::NAN, 440.0],
        vec![f64::NAN, 440.0, f64::NAN],
    );
    let energy = aligned(FeatureKind::Energy, vec![0.1; 3], vec![0.1; 3]);
    let err = Scorer::new().score(&pitch, &energy).unwrap_err();
    assert!(matches!(err, ComparisonError::InsufficientData(_)), "{err}");

    let silent = aligned(FeatureKind::Pitch, vec![f64::NAN; 4], vec![f64::NAN; 4]);
    let energy = aligned(FeatureKind::Energy, vec![0.0; 4], vec![0.0; 4]);
    assert!(matches!(
        Scorer::new().score(&silent, &energy),
        Err(ComparisonError::InsufficientData(_))
    ));
}

#[test]
fn composite_is_bounded_and_monotone() {
    let pitch_steps = [0.0, 1.0, 5.0, 12.5, 25.0, 49.0, 50.0, 80.0, 1_000.0];
    let timing_steps = [0.0, 0.001, 0.01, 0.05, 0.099, 0.1, 0.5, 10.0];
    for &timing in &timing_steps {
        let mut previous = f64::INFINITY;
        for &pitch in &pitch_steps {
            let score = composite_score(pitch, timing);
            assert!((0.0..=100.0).contains(&score), "score {score} out of range");
            assert!(score <= previous, "score rose as pitch difference grew");
            previous = score;
        }
    }
    for &pitch in &pitch_steps {
        let mut previous = f64::INFINITY;
        for &timing in &timing_steps {
            let score = composite_score(pitch, timing);
            assert!(score <= previous, "score rose as timing difference grew");
            previous = score;
        }
    }
}

#[test]
fn length_difference_uses_the_larger_truncation() {
    let pitch = aligned(FeatureKind::Pitch, vec![440.0; 50], vec![440.0; 40]);
    let energy = aligned(FeatureKind::Energy, vec![0.1; 50], vec![0.1; 43]);
    let result = Scorer::new().score(&pitch, &energy).expect("score");
    assert_relative_eq!(
        result.length_difference_seconds,
        10.0 * 512.0 / 22_050.0,
        epsilon = 1e-12
    );
}

fn contour() -> Vec<f64> {
    vec![440.0, 445.0, 450.0, 455.0, 460.0, 455.0, 450.0, 445.0]
}

fn aligned(kind: FeatureKind, student: Vec<f64>, reference: Vec<f64>) -> AlignedPair {
    Aligner::new()
        .align(
            &FeatureSequence::scalar(kind, student, 512, 22_050),
            &FeatureSequence::scalar(kind, reference, 512, 22_050),
        )
        .expect("align")
}
