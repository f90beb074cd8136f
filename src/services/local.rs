use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use reqwest::Url;
use tracing::info;

use super::{ArtifactStore, Fetcher};
use crate::comparison::{ComparisonError, Result};

/// Reads audio from `file://` URLs or plain filesystem paths.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    max_bytes: u64,
}

impl LocalFetcher {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    fn resolve(url: &str) -> Result<PathBuf> {
        if url.starts_with("file:") {
            let parsed = Url::parse(url).map_err(|err| ComparisonError::fetch(url, err))?;
            parsed
                .to_file_path()
                .map_err(|_| ComparisonError::fetch(url, "not a local file URL"))
        } else if url.contains("://") {
            Err(ComparisonError::fetch(url, "unsupported URL scheme"))
        } else {
            Ok(PathBuf::from(url))
        }
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = Self::resolve(url)?;
        let file = fs::File::open(&path).map_err(|err| ComparisonError::fetch(url, err))?;
        let mut bytes = Vec::new();
        file.take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| ComparisonError::fetch(url, err))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(ComparisonError::fetch(
                url,
                format!("file exceeds the {} byte limit", self.max_bytes),
            ));
        }
        Ok(bytes)
    }
}

/// Writes artifacts below a root directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> AnyResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create artifact directory {:?}", root))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve artifact directory {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(ComparisonError::Publish(format!(
                "artifact key '{key}' must be a relative path without '..'"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl ArtifactStore for DirectoryStore {
    fn store(&self, bytes: &[u8], key: &str, _content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                ComparisonError::Publish(format!("failed to create {:?}: {err}", parent))
            })?;
        }
        fs::write(&path, bytes)
            .map_err(|err| ComparisonError::Publish(format!("failed to write {:?}: {err}", path)))?;
        let url = Url::from_file_path(&path)
            .map_err(|_| ComparisonError::Publish(format!("{:?} has no file URL", path)))?;
        info!(path = %path.display(), bytes = bytes.len(), "stored artifact");
        Ok(url.to_string())
    }
}
