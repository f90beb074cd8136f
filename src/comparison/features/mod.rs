mod chroma;
mod energy;
mod frames;
mod pitch;

use std::borrow::Cow;

use tracing::debug;

use crate::audio::resample;
use crate::comparison::{ComparisonError, Result};
use crate::config::AnalysisConfig;
use crate::types::{AudioSignal, FeatureKind, FeatureSequence};

use pitch::YinParams;

/// Every sequence extracted from one signal.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub pitch: FeatureSequence,
    pub energy: FeatureSequence,
    pub chroma: FeatureSequence,
}

/// Turns an [`AudioSignal`] into frame-indexed features.
///
/// Pitch and energy share one framing (centered, zero padded), so they always
/// have the same frame count for a given signal.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: AnalysisConfig,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn extract_pitch(&self, signal: &AudioSignal) -> Result<FeatureSequence> {
        let samples = self.prepare(signal)?;
        let contour = pitch::yin_contour(&samples, &YinParams::from_config(&self.config));
        debug!(
            frames = contour.len(),
            voiced = contour.iter().filter(|f| f.is_finite()).count(),
            "extracted pitch contour"
        );
        Ok(self.scalar(FeatureKind::Pitch, contour))
    }

    pub fn extract_energy(&self, signal: &AudioSignal) -> Result<FeatureSequence> {
        let samples = self.prepare(signal)?;
        let energy =
            energy::rms_energy(&samples, self.config.frame_length, self.config.hop_length);
        Ok(self.scalar(FeatureKind::Energy, energy))
    }

    pub fn extract_chroma(&self, signal: &AudioSignal) -> Result<FeatureSequence> {
        let samples = self.prepare(signal)?;
        let chroma = chroma::chromagram(
            &samples,
            self.config.sample_rate,
            self.config.frame_length,
            self.config.hop_length,
            self.config.fmin,
            self.config.fmax,
        )
        .map_err(|err| ComparisonError::InsufficientData(err.to_string()))?;
        Ok(FeatureSequence::new(
            FeatureKind::Chroma,
            chroma,
            self.config.hop_length,
            self.config.sample_rate,
        ))
    }

    pub fn extract(&self, signal: &AudioSignal) -> Result<FeatureSet> {
        Ok(FeatureSet {
            pitch: self.extract_pitch(signal)?,
            energy: self.extract_energy(signal)?,
            chroma: self.extract_chroma(signal)?,
        })
    }

    fn scalar(&self, kind: FeatureKind, values: Vec<f64>) -> FeatureSequence {
        FeatureSequence::scalar(kind, values, self.config.hop_length, self.config.sample_rate)
    }

    fn prepare<'a>(&self, signal: &'a AudioSignal) -> Result<Cow<'a, [f32]>> {
        self.config
            .validate()
            .map_err(|err| ComparisonError::Config(format!("{err:#}")))?;
        if signal.is_empty() {
            return Err(ComparisonError::InsufficientData(
                "signal has no samples".into(),
            ));
        }
        ensure_sample_rate(signal, self.config.sample_rate)
    }
}

fn ensure_sample_rate(signal: &AudioSignal, target_rate: u32) -> Result<Cow<'_, [f32]>> {
    if signal.sample_rate() == target_rate {
        Ok(Cow::Borrowed(signal.samples()))
    } else {
        resample::linear_resample(signal.samples(), signal.sample_rate(), target_rate)
            .map(Cow::Owned)
            .map_err(|err| {
                ComparisonError::Decode(format!(
                    "failed to resample audio from {} Hz to {} Hz: {err}",
                    signal.sample_rate(),
                    target_rate
                ))
            })
    }
}
