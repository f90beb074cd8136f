//! Decode → extract → align → score → render, for two in-memory recordings.

use tracing::warn;

use crate::audio;
use crate::comparison::alignment::Aligner;
use crate::comparison::features::FeatureExtractor;
use crate::comparison::metrics::Scorer;
use crate::comparison::pipeline::StageLog;
use crate::comparison::report::ReportRenderer;
use crate::comparison::{AtStage, Stage, StageResult};
use crate::config::AnalysisConfig;
use crate::types::{ComparisonArtifact, ComparisonResult, FeatureSequence};

/// Output of the network-free part of a comparison.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: ComparisonResult,
    /// `None` when rendering failed; the result still stands.
    pub chart: Option<ComparisonArtifact>,
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    extractor: FeatureExtractor,
    aligner: Aligner,
    scorer: Scorer,
    renderer: ReportRenderer,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(config),
            ..Self::default()
        }
    }

    pub fn with_renderer(self, renderer: ReportRenderer) -> Self {
        Self { renderer, ..self }
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.extractor.config()
    }

    pub fn renderer(&self) -> &ReportRenderer {
        &self.renderer
    }

    pub fn analyze(
        &self,
        student_bytes: &[u8],
        reference_bytes: &[u8],
        log: &mut StageLog,
    ) -> StageResult<Analysis> {
        log.enter(Stage::Decoding);
        let student = audio::load(student_bytes, self.config()).at_stage(Stage::Decoding)?;
        let reference = audio::load(reference_bytes, self.config()).at_stage(Stage::Decoding)?;

        log.enter(Stage::Extracting);
        let student_pitch = self.extractor.extract_pitch(&student).at_stage(Stage::Extracting)?;
        let reference_pitch = self
            .extractor
            .extract_pitch(&reference)
            .at_stage(Stage::Extracting)?;
        let student_energy = self.extractor.extract_energy(&student).at_stage(Stage::Extracting)?;
        let reference_energy = self
            .extractor
            .extract_energy(&reference)
            .at_stage(Stage::Extracting)?;
        let chroma = match (
            self.extractor.extract_chroma(&student),
            self.extractor.extract_chroma(&reference),
        ) {
            (Ok(student), Ok(reference)) => Some((student, reference)),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "chroma extraction failed; continuing without it");
                None
            }
        };

        log.enter(Stage::Aligning);
        let pitch = self
            .aligner
            .align(&student_pitch, &reference_pitch)
            .at_stage(Stage::Aligning)?;
        let energy = self
            .aligner
            .align(&student_energy, &reference_energy)
            .at_stage(Stage::Aligning)?;

        log.enter(Stage::Scoring);
        let result = self.scorer.score(&pitch, &energy).at_stage(Stage::Scoring)?;
        let result = result.with_chroma_difference(chroma.and_then(|(student, reference)| {
            self.chroma_difference(&student, &reference)
        }));

        log.enter(Stage::Rendering);
        let chart = match self.renderer.render(
            pitch.student(),
            pitch.reference(),
            Some((energy.student(), energy.reference())),
        ) {
            Ok(chart) => Some(chart),
            Err(err) => {
                warn!(error = %err, "chart rendering failed; result is delivered without it");
                None
            }
        };

        Ok(Analysis { result, chart })
    }

    fn chroma_difference(&self, student: &FeatureSequence, reference: &FeatureSequence) -> Option<f64> {
        let scored = self
            .aligner
            .align(student, reference)
            .and_then(|aligned| self.scorer.score_chroma(&aligned));
        match scored {
            Ok(difference) => Some(difference),
            Err(err) => {
                warn!(error = %err, "chroma comparison skipped");
                None
            }
        }
    }
}
