//! Collaborators that move bytes in and out of a comparison.
//!
//! The pipeline only sees the traits below. Concrete implementations cover
//! plain HTTP and the local filesystem.

mod http;
mod local;

use std::fmt::Debug;

use anyhow::Result as AnyResult;

use crate::comparison::Result;
use crate::config::{AppConfig, StorageConfig};
use crate::types::CallbackPayload;

pub use http::{HttpArtifactStore, HttpFetcher, HttpTranscriber, WebhookNotifier};
pub use local::{DirectoryStore, LocalFetcher};

/// Retrieves the raw bytes behind an audio URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Persists a rendered artifact and returns a URL the requester can open.
///
/// `key` is a relative path such as `student-example-com/<run id>/comparison.svg`.
pub trait ArtifactStore: Send + Sync {
    fn store(&self, bytes: &[u8], key: &str, content_type: &str) -> Result<String>;
}

/// Delivers the final payload to the requester.
pub trait Notifier: Send + Sync {
    fn notify(&self, callback_url: &str, payload: &CallbackPayload) -> Result<()>;
}

/// Speech-to-text for the student's recording. Optional and best-effort.
pub trait Transcriber: Send + Sync + Debug {
    fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch(url)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for &T {
    fn store(&self, bytes: &[u8], key: &str, content_type: &str) -> Result<String> {
        (**self).store(bytes, key, content_type)
    }
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, callback_url: &str, payload: &CallbackPayload) -> Result<()> {
        (**self).notify(callback_url, payload)
    }
}

/// Routes `http(s)://` URLs to [`HttpFetcher`] and everything else to [`LocalFetcher`].
#[derive(Debug)]
pub struct UrlFetcher {
    http: HttpFetcher,
    local: LocalFetcher,
}

impl UrlFetcher {
    pub fn new(http: HttpFetcher, local: LocalFetcher) -> Self {
        Self { http, local }
    }

    pub fn from_config(config: &AppConfig) -> AnyResult<Self> {
        Ok(Self::new(
            HttpFetcher::new(&config.network)?,
            LocalFetcher::new(config.network.max_download_bytes),
        ))
    }
}

impl Fetcher for UrlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if is_http_url(url) {
            self.http.fetch(url)
        } else {
            self.local.fetch(url)
        }
    }
}

/// Store chosen by [`StorageConfig`].
#[derive(Debug)]
pub enum ConfiguredStore {
    Directory(DirectoryStore),
    Http(HttpArtifactStore),
}

impl ArtifactStore for ConfiguredStore {
    fn store(&self, bytes: &[u8], key: &str, content_type: &str) -> Result<String> {
        match self {
            Self::Directory(store) => store.store(bytes, key, content_type),
            Self::Http(store) => store.store(bytes, key, content_type),
        }
    }
}

pub fn store_from_config(config: &AppConfig) -> AnyResult<ConfiguredStore> {
    Ok(match &config.storage {
        StorageConfig::Directory { root } => ConfiguredStore::Directory(DirectoryStore::new(root)?),
        StorageConfig::Http { base_url } => {
            ConfiguredStore::Http(HttpArtifactStore::new(base_url, &config.network)?)
        }
    })
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Lowercase ASCII path segment built from a requester id.
pub fn slug(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "anonymous".to_string()
    } else {
        slug.to_string()
    }
}
