use std::io::Read;

use anyhow::{ensure, Context, Result as AnyResult};
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use super::{ArtifactStore, Fetcher, Notifier, Transcriber};
use crate::comparison::{ComparisonError, Result};
use crate::config::{NetworkConfig, TranscriptionConfig};
use crate::types::CallbackPayload;

const USER_AGENT: &str = concat!("singalyzer/", env!("CARGO_PKG_VERSION"));

fn client(timeout: std::time::Duration) -> AnyResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Downloads audio over HTTP(S), refusing bodies above the configured limit.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(network: &NetworkConfig) -> AnyResult<Self> {
        Ok(Self {
            client: client(network.fetch_timeout())?,
            max_bytes: network.max_download_bytes,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ComparisonError::fetch(url, err))?;
        let response = check_status(response).map_err(|reason| ComparisonError::fetch(url, reason))?;
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(ComparisonError::fetch(
                    url,
                    format!("body of {length} bytes exceeds the {} byte limit", self.max_bytes),
                ));
            }
        }

        let mut bytes = Vec::new();
        response
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| ComparisonError::fetch(url, err))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(ComparisonError::fetch(
                url,
                format!("body exceeds the {} byte limit", self.max_bytes),
            ));
        }
        debug!(url, bytes = bytes.len(), "downloaded audio");
        Ok(bytes)
    }
}

/// PUTs artifacts to `{base_url}/{key}` and hands that URL back.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    client: Client,
    base_url: String,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str, network: &NetworkConfig) -> AnyResult<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("invalid upload base URL '{base_url}'"))?;
        ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "upload base URL must use http or https"
        );
        Ok(Self {
            client: client(network.upload_timeout())?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

impl ArtifactStore for HttpArtifactStore {
    fn store(&self, bytes: &[u8], key: &str, content_type: &str) -> Result<String> {
        let url = self.url_for(key);
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .map_err(|err| ComparisonError::Publish(format!("upload to {url} failed: {err}")))?;
        check_status(response)
            .map_err(|reason| ComparisonError::Publish(format!("upload to {url} failed: {reason}")))?;
        info!(url = %url, bytes = bytes.len(), "uploaded artifact");
        Ok(url)
    }
}

/// POSTs the callback payload as JSON. No retries.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(network: &NetworkConfig) -> AnyResult<Self> {
        Ok(Self {
            client: client(network.notify_timeout())?,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, callback_url: &str, payload: &CallbackPayload) -> Result<()> {
        let response = self
            .client
            .post(callback_url)
            .json(payload)
            .send()
            .map_err(|err| ComparisonError::Publish(format!("webhook delivery failed: {err}")))?;
        check_status(response)
            .map_err(|reason| ComparisonError::Publish(format!("webhook rejected payload: {reason}")))?;
        Ok(())
    }
}

/// POSTs the raw recording to a speech-to-text endpoint.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpTranscriber {
    pub fn new(config: &TranscriptionConfig, network: &NetworkConfig) -> AnyResult<Self> {
        let parsed = Url::parse(&config.url)
            .with_context(|| format!("invalid transcription URL '{}'", config.url))?;
        ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "transcription URL must use http or https"
        );
        Ok(Self {
            client: client(network.transcribe_timeout())?,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec());
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }
        let response = request
            .send()
            .map_err(|err| ComparisonError::Transcription(err.to_string()))?;
        let body: Value = check_status(response)
            .map_err(ComparisonError::Transcription)?
            .json()
            .map_err(|err| ComparisonError::Transcription(format!("unreadable response: {err}")))?;
        let transcript = transcript_text(&body).ok_or_else(|| {
            ComparisonError::Transcription("response carries no transcript".into())
        })?;
        debug!(words = transcript.split_whitespace().count(), "transcribed recording");
        Ok(transcript)
    }
}

/// Deepgram's first alternative, or a top-level `transcript` string.
fn transcript_text(body: &Value) -> Option<String> {
    body.pointer("/results/channels/0/alternatives/0/transcript")
        .or_else(|| body.get("transcript"))
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
}

fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(format!("server answered {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_keys_onto_base_url() {
        let store =
            HttpArtifactStore::new("https://uploads.example.com/bucket/", &NetworkConfig::default())
                .unwrap();
        assert_eq!(
            store.url_for("student-a/comparison.svg"),
            "https://uploads.example.com/bucket/student-a/comparison.svg"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(HttpArtifactStore::new("ftp://example.com", &NetworkConfig::default()).is_err());
        assert!(HttpArtifactStore::new("not a url", &NetworkConfig::default()).is_err());
    }

    #[test]
    fn reads_transcript_from_either_response_shape() {
        let deepgram = serde_json::json!({
            "metadata": {"duration": 3.2},
            "results": {"channels": [{"alternatives": [
                {"transcript": " amazing grace how sweet ", "confidence": 0.93}
            ]}]}
        });
        assert_eq!(
            transcript_text(&deepgram).as_deref(),
            Some("amazing grace how sweet")
        );
        let plain = serde_json::json!({"transcript": "do re mi"});
        assert_eq!(transcript_text(&plain).as_deref(), Some("do re mi"));
        assert_eq!(transcript_text(&serde_json::json!({"words": []})), None);
    }

    #[test]
    fn unreachable_transcriber_is_a_transcription_error() {
        let transcriber = HttpTranscriber::new(
            &TranscriptionConfig {
                url: "http://127.0.0.1:9/v1/listen".into(),
                token: Some("secret".into()),
            },
            &NetworkConfig {
                transcribe_timeout_secs: 2,
                ..NetworkConfig::default()
            },
        )
        .unwrap();
        let err = transcriber.transcribe(b"RIFF").unwrap_err();
        assert!(matches!(err, ComparisonError::Transcription(_)), "{err}");
    }

    #[test]
    fn unreachable_host_is_a_fetch_error() {
        let fetcher = HttpFetcher::new(&NetworkConfig {
            fetch_timeout_secs: 2,
            ..NetworkConfig::default()
        })
        .unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/missing.wav").unwrap_err();
        assert!(matches!(err, ComparisonError::Fetch { .. }));
    }
}
