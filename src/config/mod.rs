use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use reqwest::Url;
use serde::Deserialize;

/// Canonical analysis rate; both signals of a comparison are resampled to it.
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
/// C2
pub const DEFAULT_FMIN_HZ: f64 = 65.41;
/// C7
pub const DEFAULT_FMAX_HZ: f64 = 2093.0;

/// Parameters shared by decoding, feature extraction and alignment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    pub frame_length: usize,
    pub hop_length: usize,
    pub fmin: f64,
    pub fmax: f64,
    /// YIN absolute threshold on the cumulative mean normalized difference.
    pub yin_threshold: f64,
    /// Frames quieter than this RMS level carry no pitch.
    pub silence_rms: f64,
    pub min_duration_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_length: 2048,
            hop_length: 512,
            fmin: DEFAULT_FMIN_HZ,
            fmax: DEFAULT_FMAX_HZ,
            yin_threshold: 0.1,
            silence_rms: 1e-4,
            min_duration_secs: 0.05,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_rate > 0, "sample_rate must be positive");
        ensure!(self.hop_length > 0, "hop_length must be positive");
        ensure!(
            self.frame_length >= self.hop_length,
            "frame_length ({}) must be at least hop_length ({})",
            self.frame_length,
            self.hop_length
        );
        ensure!(
            self.fmin > 0.0 && self.fmin < self.fmax,
            "pitch band must satisfy 0 < fmin < fmax (got {} - {})",
            self.fmin,
            self.fmax
        );
        let nyquist = self.sample_rate as f64 / 2.0;
        ensure!(
            self.fmax <= nyquist,
            "fmax {} Hz exceeds the Nyquist frequency {} Hz",
            self.fmax,
            nyquist
        );
        ensure!(
            self.min_period() >= 2,
            "fmax {} Hz leaves fewer than two samples per period",
            self.fmax
        );
        ensure!(
            self.max_period() < self.frame_length - self.frame_length / 2,
            "frame_length {} is too short for fmin {} Hz",
            self.frame_length,
            self.fmin
        );
        ensure!(
            self.yin_threshold > 0.0 && self.yin_threshold < 1.0,
            "yin_threshold must lie in (0, 1)"
        );
        ensure!(self.silence_rms >= 0.0, "silence_rms must be non-negative");
        ensure!(
            self.min_duration_secs > 0.0,
            "min_duration_secs must be positive"
        );
        Ok(())
    }

    /// Shortest candidate period in samples.
    pub fn min_period(&self) -> usize {
        (self.sample_rate as f64 / self.fmax).floor() as usize
    }

    /// Longest candidate period in samples.
    pub fn max_period(&self) -> usize {
        (self.sample_rate as f64 / self.fmin).ceil() as usize
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate as f64
    }
}

/// Timeouts and limits for the network collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub fetch_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub notify_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
    pub max_download_bytes: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 60,
            upload_timeout_secs: 60,
            notify_timeout_secs: 15,
            transcribe_timeout_secs: 120,
            max_download_bytes: 100 * 1024 * 1024,
        }
    }
}

impl NetworkConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn transcribe_timeout(&self) -> Duration {
        Duration::from_secs(self.transcribe_timeout_secs)
    }
}

/// Speech-to-text endpoint used for the transcript section of the report.
///
/// The student's recording is POSTed as-is. Deepgram's `/v1/listen` and any
/// service answering `{"transcript": "..."}` are understood.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptionConfig {
    pub url: String,
    /// Sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub token: Option<String>,
}

/// Where rendered artifacts go.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Directory { root: PathBuf },
    Http { base_url: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Directory {
            root: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    /// No transcript feedback when unset.
    pub transcription: Option<TranscriptionConfig>,
    /// Upper bound on comparisons processed at the same time.
    pub max_workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            transcription: None,
            max_workers: 4,
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid by the JSON file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {:?}", path))?;
                Self::from_json(&raw)
                    .with_context(|| format!("invalid config file {:?}", path))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse config JSON")
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis
            .validate()
            .context("invalid analysis configuration")?;
        ensure!(self.max_workers > 0, "max_workers must be at least 1");
        if let StorageConfig::Http { base_url } = &self.storage {
            let url = Url::parse(base_url)
                .with_context(|| format!("invalid upload base URL '{}'", base_url))?;
            ensure!(
                matches!(url.scheme(), "http" | "https"),
                "upload base URL must use http or https"
            );
        }
        if let Some(transcription) = &self.transcription {
            let url = Url::parse(&transcription.url).with_context(|| {
                format!("invalid transcription URL '{}'", transcription.url)
            })?;
            ensure!(
                matches!(url.scheme(), "http" | "https"),
                "transcription URL must use http or https"
            );
        }
        Ok(())
    }
}
