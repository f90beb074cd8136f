//! Core types for the singalyzer comparison pipeline

use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use reqwest::Url;
use serde::{Deserialize, Serialize, Serializer};

use crate::comparison::{ComparisonError, Result, Stage, StageError};

/// Decimal places applied to every metric when it leaves the process.
pub const SERIALIZED_DECIMALS: i32 = 2;

/// Mono audio at a known sample rate. Samples are normalized to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioSignal {
    pub fn from_samples(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Which analysis produced a [`FeatureSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Fundamental frequency in Hz, `NaN` where no pitch was detected.
    Pitch,
    /// Short-time root-mean-square energy.
    Energy,
    /// 12-bin pitch-class profile, C through B.
    Chroma,
}

/// Frame-indexed feature values.
///
/// Rows are analysis frames and columns are feature dimensions (one for pitch
/// and energy, twelve for chroma). Sequences taken from different signals only
/// become comparable through [`crate::comparison::alignment::Aligner`].
#[derive(Debug, Clone)]
pub struct FeatureSequence {
    kind: FeatureKind,
    frames: Array2<f64>,
    hop_length: usize,
    sample_rate: u32,
}

impl FeatureSequence {
    pub fn new(kind: FeatureKind, frames: Array2<f64>, hop_length: usize, sample_rate: u32) -> Self {
        Self {
            kind,
            frames,
            hop_length,
            sample_rate,
        }
    }

    /// Builds a one-value-per-frame sequence.
    pub fn scalar(kind: FeatureKind, values: Vec<f64>, hop_length: usize, sample_rate: u32) -> Self {
        let frames = Array1::from(values).insert_axis(Axis(1));
        Self::new(kind, frames, hop_length, sample_rate)
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn frames(&self) -> &Array2<f64> {
        &self.frames
    }

    /// First feature dimension of every frame; the whole sequence for scalar kinds.
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.frames.column(0)
    }

    pub fn len(&self) -> usize {
        self.frames.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.nrows() == 0
    }

    pub fn width(&self) -> usize {
        self.frames.ncols()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn hop_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.hop_length as f64 / self.sample_rate as f64
    }

    /// Frames whose every dimension is finite.
    pub fn valid_frames(&self) -> usize {
        self.frames
            .rows()
            .into_iter()
            .filter(|row| row.iter().all(|v| v.is_finite()))
            .count()
    }

    pub(crate) fn truncated(&self, frame_count: usize) -> Self {
        let end = frame_count.min(self.len());
        Self {
            kind: self.kind,
            frames: self.frames.slice(s![..end, ..]).to_owned(),
            hop_length: self.hop_length,
            sample_rate: self.sample_rate,
        }
    }

    pub(crate) fn with_rows(&self, rows: &[usize], hop_length: usize, sample_rate: u32) -> Self {
        Self {
            kind: self.kind,
            frames: self.frames.select(Axis(0), rows),
            hop_length,
            sample_rate,
        }
    }
}

/// Two feature sequences of equal frame count on the same hop grid.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    student: FeatureSequence,
    reference: FeatureSequence,
    dropped_frames: usize,
}

impl AlignedPair {
    pub(crate) fn new(
        student: FeatureSequence,
        reference: FeatureSequence,
        dropped_frames: usize,
    ) -> Self {
        debug_assert_eq!(student.len(), reference.len());
        Self {
            student,
            reference,
            dropped_frames,
        }
    }

    pub fn student(&self) -> &FeatureSequence {
        &self.student
    }

    pub fn reference(&self) -> &FeatureSequence {
        &self.reference
    }

    pub fn kind(&self) -> FeatureKind {
        self.student.kind()
    }

    pub fn len(&self) -> usize {
        self.student.len()
    }

    pub fn is_empty(&self) -> bool {
        self.student.is_empty()
    }

    /// Trailing frames discarded from the longer input during truncation.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn hop_seconds(&self) -> f64 {
        self.student.hop_seconds()
    }
}

/// Scalar outcome of one comparison, at full precision.
///
/// Rounding to [`SERIALIZED_DECIMALS`] happens only in the `Serialize` impl.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// Mean absolute pitch difference in Hz over frames where both voices are pitched.
    #[serde(serialize_with = "serialize_rounded")]
    pub pitch_difference: f64,
    /// Mean absolute RMS energy difference over all aligned frames.
    #[serde(serialize_with = "serialize_rounded")]
    pub timing_difference: f64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rounded_opt"
    )]
    pub composite_score: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rounded_opt"
    )]
    pub chroma_difference: Option<f64>,
    /// Duration of the frames truncated away from the longer recording.
    #[serde(serialize_with = "serialize_rounded")]
    pub length_difference_seconds: f64,
}

impl ComparisonResult {
    pub fn with_chroma_difference(self, chroma_difference: Option<f64>) -> Self {
        Self {
            chroma_difference,
            ..self
        }
    }
}

/// Rendered output handed to an artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonArtifact {
    pub bytes: Vec<u8>,
    pub suggested_name: String,
    pub content_type: &'static str,
}

/// Comparison request exactly as it arrives, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComparisonRequest {
    #[serde(default, alias = "student_url")]
    pub student_audio_url: Option<String>,
    #[serde(default, alias = "reference_url", alias = "professor_url")]
    pub reference_audio_url: Option<String>,
    #[serde(default, alias = "student_email")]
    pub requester_id: Option<String>,
    #[serde(default, alias = "webhook_url")]
    pub callback_url: Option<String>,
}

/// One request or a batch of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRequestBatch {
    Many(Vec<RawComparisonRequest>),
    One(RawComparisonRequest),
}

impl RawRequestBatch {
    pub fn into_requests(self) -> Vec<RawComparisonRequest> {
        match self {
            Self::Many(requests) => requests,
            Self::One(request) => vec![request],
        }
    }
}

impl RawComparisonRequest {
    pub fn validate(self) -> Result<ComparisonRequest> {
        let student_audio_url = required(self.student_audio_url, "student_audio_url")?;
        let reference_audio_url = required(self.reference_audio_url, "reference_audio_url")?;
        let requester_id = required(self.requester_id, "requester_id")?;
        let callback_url = required(self.callback_url, "callback_url")?;
        let parsed = Url::parse(&callback_url).map_err(|err| {
            ComparisonError::InvalidRequest(format!("callback_url '{callback_url}': {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ComparisonError::InvalidRequest(format!(
                "callback_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(ComparisonRequest {
            student_audio_url,
            reference_audio_url,
            requester_id,
            callback_url,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ComparisonError::InvalidRequest(format!(
            "missing required field '{field}'"
        ))),
    }
}

/// A request whose required fields have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRequest {
    pub student_audio_url: String,
    pub reference_audio_url: String,
    pub requester_id: String,
    pub callback_url: String,
}

/// JSON body delivered to the requester's callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackPayload {
    /// Unique per run; also the directory the run's artifacts are stored under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub requester_id: String,
    pub student_audio_url: String,
    pub reference_audio_url: String,
    #[serde(flatten)]
    pub result: Option<ComparisonResult>,
    pub artifact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
}

impl CallbackPayload {
    pub fn success(
        request: &ComparisonRequest,
        result: ComparisonResult,
        artifact_url: Option<String>,
        report_url: Option<String>,
    ) -> Self {
        Self {
            run_id: None,
            requester_id: request.requester_id.clone(),
            student_audio_url: request.student_audio_url.clone(),
            reference_audio_url: request.reference_audio_url.clone(),
            result: Some(result),
            artifact_url,
            report_url,
            transcript_feedback: None,
            error: None,
            failed_stage: None,
        }
    }

    pub fn failure(request: &ComparisonRequest, failure: &StageError) -> Self {
        Self {
            run_id: None,
            requester_id: request.requester_id.clone(),
            student_audio_url: request.student_audio_url.clone(),
            reference_audio_url: request.reference_audio_url.clone(),
            result: None,
            artifact_url: None,
            report_url: None,
            transcript_feedback: None,
            error: Some(failure.source.to_string()),
            failed_stage: Some(failure.stage),
        }
    }

    pub fn with_run_id(self, run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..self
        }
    }

    pub fn with_transcript_feedback(self, transcript_feedback: Option<String>) -> Self {
        Self {
            transcript_feedback,
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_stage.is_none()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, SERIALIZED_DECIMALS))
}

fn serialize_rounded_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&round_to(*v, SERIALIZED_DECIMALS)),
        None => serializer.serialize_none(),
    }
}
