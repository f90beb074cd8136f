//! Staged orchestration of one comparison request, and batches of them.

use std::fmt::{Display, Formatter};
use std::panic;
use std::thread;

use anyhow::Context;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::comparison::analyzer::{Analysis, Analyzer};
use crate::comparison::report::ReportRenderer;
use crate::comparison::{AtStage, ComparisonError, Stage, StageError, StageResult};
use crate::config::AppConfig;
use crate::services::{slug, ArtifactStore, Fetcher, Notifier, Transcriber};
use crate::types::{CallbackPayload, ComparisonArtifact, ComparisonRequest, ComparisonResult};

/// Where a run is, or how it ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Fetching,
    Decoding,
    Extracting,
    Aligning,
    Scoring,
    Rendering,
    Publishing,
    Done,
    Failed(StageError),
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Fetching => Self::Fetching,
            Stage::Decoding => Self::Decoding,
            Stage::Extracting => Self::Extracting,
            Stage::Aligning => Self::Aligning,
            Stage::Scoring => Self::Scoring,
            Stage::Rendering => Self::Rendering,
            Stage::Publishing => Self::Publishing,
        }
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Failed(err) => write!(f, "Failed({})", err.stage),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Records every state a run passes through and logs each transition.
#[derive(Debug, Clone)]
pub struct StageLog {
    requester: String,
    history: Vec<PipelineState>,
}

impl StageLog {
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            history: Vec::new(),
        }
    }

    pub fn enter(&mut self, stage: Stage) {
        info!(requester = %self.requester, stage = %stage, "entering stage");
        self.history.push(stage.into());
    }

    pub fn fail(&mut self, failure: StageError) {
        error!(
            requester = %self.requester,
            stage = %failure.stage,
            error = %failure.source,
            "comparison failed"
        );
        self.history.push(PipelineState::Failed(failure));
    }

    pub fn finish(&mut self) {
        info!(requester = %self.requester, "comparison finished");
        self.history.push(PipelineState::Done);
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn state(&self) -> Option<&PipelineState> {
        self.history.last()
    }

    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}

/// Everything known about a request once its run has ended.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Fresh for every run; artifacts live under `{requester slug}/{run_id}/`.
    pub run_id: String,
    pub requester_id: String,
    pub history: Vec<PipelineState>,
    pub result: Option<ComparisonResult>,
    pub artifact_url: Option<String>,
    pub report_url: Option<String>,
    /// The payload handed to the notifier.
    pub payload: CallbackPayload,
    pub notified: bool,
    pub notify_error: Option<String>,
}

impl PipelineOutcome {
    pub fn state(&self) -> &PipelineState {
        static NOT_STARTED: PipelineState = PipelineState::Fetching;
        self.history.last().unwrap_or(&NOT_STARTED)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state(), PipelineState::Done)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self.state() {
            PipelineState::Failed(err) => Some(err.stage),
            _ => None,
        }
    }
}

struct Published {
    result: ComparisonResult,
    artifact_url: Option<String>,
    report_url: Option<String>,
    transcript: Option<String>,
}

/// Runs comparisons against injected collaborators.
#[derive(Debug)]
pub struct Pipeline<F, S, N> {
    analyzer: Analyzer,
    fetcher: F,
    store: S,
    notifier: N,
    transcriber: Option<Box<dyn Transcriber>>,
    max_workers: usize,
}

impl<F, S, N> Pipeline<F, S, N>
where
    F: Fetcher,
    S: ArtifactStore,
    N: Notifier,
{
    /// Fails when `config` does not validate.
    pub fn new(config: &AppConfig, fetcher: F, store: S, notifier: N) -> anyhow::Result<Self> {
        config.validate().context("invalid pipeline configuration")?;
        Ok(Self {
            analyzer: Analyzer::new(config.analysis.clone()),
            fetcher,
            store,
            notifier,
            transcriber: None,
            max_workers: config.max_workers.max(1),
        })
    }

    /// Adds transcript feedback from the student's recording to every report.
    pub fn with_transcriber(self, transcriber: impl Transcriber + 'static) -> Self {
        Self {
            transcriber: Some(Box::new(transcriber)),
            ..self
        }
    }

    pub fn with_renderer(self, renderer: ReportRenderer) -> Self {
        Self {
            analyzer: self.analyzer.with_renderer(renderer),
            ..self
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run one request to completion. The notifier is called exactly once.
    pub fn run(&self, request: &ComparisonRequest) -> PipelineOutcome {
        let run_id = Uuid::new_v4().simple().to_string();
        let mut log = StageLog::new(request.requester_id.clone());
        info!(requester = %request.requester_id, run_id = %run_id, "starting comparison");
        let (payload, published) = match self.execute(request, &run_id, &mut log) {
            Ok(published) => (
                CallbackPayload::success(
                    request,
                    published.result,
                    published.artifact_url.clone(),
                    published.report_url.clone(),
                )
                .with_transcript_feedback(published.transcript.clone()),
                Some(published),
            ),
            Err(failure) => {
                let payload = CallbackPayload::failure(request, &failure);
                log.fail(failure);
                (payload, None)
            }
        };
        let payload = payload.with_run_id(run_id.as_str());

        let notify_error = match self.notifier.notify(&request.callback_url, &payload) {
            Ok(()) => None,
            Err(err) => {
                error!(
                    requester = %request.requester_id,
                    callback = %request.callback_url,
                    error = %err,
                    "failed to deliver callback"
                );
                Some(err.to_string())
            }
        };
        if published.is_some() {
            log.finish();
        }

        let (result, artifact_url, report_url) = match published {
            Some(published) => (
                Some(published.result),
                published.artifact_url,
                published.report_url,
            ),
            None => (None, None, None),
        };
        PipelineOutcome {
            run_id,
            requester_id: request.requester_id.clone(),
            history: log.into_history(),
            result,
            artifact_url,
            report_url,
            payload,
            notified: notify_error.is_none(),
            notify_error,
        }
    }

    /// Run every request on its own worker thread, at most `max_workers` at a time.
    ///
    /// Outcomes come back in request order.
    pub fn run_batch(&self, requests: &[ComparisonRequest]) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for (chunk_index, chunk) in requests.chunks(self.max_workers).enumerate() {
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(chunk.len());
                for (offset, request) in chunk.iter().enumerate() {
                    let index = chunk_index * self.max_workers + offset;
                    let spawned = thread::Builder::new()
                        .name(format!("comparison-{index}"))
                        .spawn_scoped(scope, move || self.run(request));
                    match spawned {
                        Ok(handle) => handles.push(Ok(handle)),
                        Err(err) => {
                            warn!(error = %err, index, "failed to spawn worker; running inline");
                            handles.push(Err(request));
                        }
                    }
                }
                for handle in handles {
                    let outcome = match handle {
                        Ok(handle) => match handle.join() {
                            Ok(outcome) => outcome,
                            Err(payload) => panic::resume_unwind(payload),
                        },
                        Err(request) => self.run(request),
                    };
                    outcomes.push(outcome);
                }
            });
        }
        outcomes
    }

    fn execute(
        &self,
        request: &ComparisonRequest,
        run_id: &str,
        log: &mut StageLog,
    ) -> StageResult<Published> {
        log.enter(Stage::Fetching);
        let student = self
            .fetcher
            .fetch(&request.student_audio_url)
            .at_stage(Stage::Fetching)?;
        let reference = self
            .fetcher
            .fetch(&request.reference_audio_url)
            .at_stage(Stage::Fetching)?;

        let Analysis { result, chart } = self.analyzer.analyze(&student, &reference, log)?;
        let transcript = self.transcribe(request, &student);

        log.enter(Stage::Publishing);
        let prefix = format!("{}/{run_id}", slug(&request.requester_id));
        let artifact_url = chart
            .map(|chart| self.publish(&prefix, &chart))
            .transpose()
            .at_stage(Stage::Publishing)?;
        let summary = self
            .analyzer
            .renderer()
            .render_summary(request, &result, transcript.as_deref());
        let report_url = self.publish(&prefix, &summary).at_stage(Stage::Publishing)?;

        Ok(Published {
            result,
            artifact_url,
            report_url: Some(report_url),
            transcript,
        })
    }

    fn transcribe(&self, request: &ComparisonRequest, student: &[u8]) -> Option<String> {
        let transcriber = self.transcriber.as_ref()?;
        match transcriber.transcribe(student) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(
                    requester = %request.requester_id,
                    error = %err,
                    "transcription failed; report has no transcript feedback"
                );
                None
            }
        }
    }

    fn publish(
        &self,
        prefix: &str,
        artifact: &ComparisonArtifact,
    ) -> Result<String, ComparisonError> {
        let key = format!("{prefix}/{}", artifact.suggested_name);
        self.store.store(&artifact.bytes, &key, artifact.content_type)
    }
}
