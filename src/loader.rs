//! Dataset ingestion from a path, an uploaded buffer, or a URL.

use crate::dataset::{Dataset, parse_csv};
use dms_protocol::{DmsError, ErrorCode};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{fs, path::PathBuf, sync::Arc};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Path(PathBuf),
    Url(String),
    /// An in-memory file handed over by an uploader widget.
    Upload {
        name: String,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

impl DataSource {
    pub fn parse(path_or_url: &str) -> Self {
        let trimmed = path_or_url.trim();
        if is_url(trimmed) {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Upload { name, .. } => name.clone(),
        }
    }
}

fn is_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

/// Identity a loaded dataset is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKey {
    Url(String),
    /// SHA-1 of the raw bytes.
    Content(String),
}

impl SourceKey {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self::Content(format!("{:x}", Sha1::digest(bytes)))
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>, DmsError> {
    let load_err = |detail: String| DmsError::new(ErrorCode::Load, detail);
    let response = std::panic::catch_unwind(|| reqwest::blocking::get(url))
        .map_err(|_| load_err(format!("Could not fetch URL '{url}': networking backend panicked")))?
        .map_err(|e| load_err(format!("Could not fetch URL '{url}': {e}")))?;
    if !response.status().is_success() {
        return Err(load_err(format!(
            "Could not fetch URL '{url}': HTTP {}",
            response.status()
        )));
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| load_err(format!("Could not read URL response '{url}': {e}")))
}

fn read_source(source: &DataSource) -> Result<Vec<u8>, DmsError> {
    match source {
        DataSource::Path(path) => fs::read(path).map_err(|e| {
            DmsError::new(
                ErrorCode::Load,
                format!("Could not read file '{}': {e}", path.display()),
            )
        }),
        DataSource::Url(url) => fetch_url(url),
        DataSource::Upload { bytes, .. } => Ok(bytes.clone()),
    }
}

/// Reads and validates one source without caching.
pub fn load(source: &DataSource) -> Result<Dataset, DmsError> {
    let bytes = read_source(source)?;
    let dataset = parse_csv(&source.label(), &bytes)?;
    info!(
        "Loaded {} observation(s) from '{}'",
        dataset.len(),
        dataset.source()
    );
    Ok(dataset)
}

/// Session-owned cache of the current source's dataset.
///
/// Holds at most one entry: loading a source with a different identity
/// replaces it. Failed loads leave the cache untouched.
#[derive(Debug, Default)]
pub struct LoadCache {
    entry: Option<(SourceKey, Arc<Dataset>)>,
    hits: usize,
    misses: usize,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, source: &DataSource) -> Result<Arc<Dataset>, DmsError> {
        // URLs are keyed by their text, so a hit skips the network entirely.
        let (key, bytes) = match source {
            DataSource::Url(url) => (SourceKey::Url(url.clone()), None),
            _ => {
                let bytes = read_source(source)?;
                (SourceKey::for_bytes(&bytes), Some(bytes))
            }
        };

        if let Some(dataset) = self.lookup(&key) {
            self.hits += 1;
            debug!("Load cache hit for {key:?}");
            return Ok(dataset);
        }
        self.misses += 1;
        debug!("Load cache miss for {key:?}");

        let bytes = match bytes {
            Some(bytes) => bytes,
            None => read_source(source)?,
        };
        let dataset = Arc::new(parse_csv(&source.label(), &bytes)?);
        info!(
            "Loaded {} observation(s) from '{}'",
            dataset.len(),
            dataset.source()
        );
        self.entry = Some((key, Arc::clone(&dataset)));
        Ok(dataset)
    }

    fn lookup(&self, key: &SourceKey) -> Option<Arc<Dataset>> {
        self.entry
            .as_ref()
            .filter(|(k, _)| k == key)
            .map(|(_, dataset)| Arc::clone(dataset))
    }

    pub fn current_key(&self) -> Option<&SourceKey> {
        self.entry.as_ref().map(|(k, _)| k)
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
