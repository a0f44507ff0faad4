//! Suite document sources – local files, directories and remote URLs.

use crate::traits::{DocumentFetcher, FetchError};
use crate::types::SuiteDocument;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot recognize configuration structure in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("there are no yaml or yml files in {0}")]
    NoDocuments(PathBuf),

    #[error("remote configuration must be an http(s) url, got '{0}'")]
    NotHttp(String),

    #[error("cannot fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Parse one YAML suite document. `origin` only labels errors.
pub fn parse_document(text: &str, origin: &str) -> Result<SuiteDocument, SourceError> {
    serde_yaml::from_str(text).map_err(|source| SourceError::Parse {
        origin: origin.to_string(),
        source,
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// A file yields itself; a directory yields every `*.yaml`/`*.yml` below
/// it, depth first in file-name order.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let meta = std::fs::metadata(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            found.push(entry.into_path());
        }
    }

    if found.is_empty() {
        return Err(SourceError::NoDocuments(path.to_path_buf()));
    }
    Ok(found)
}

/// Path shown to users: relative to the working directory when possible.
fn display_path(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(Path::to_path_buf));
    match relative {
        Some(rel) => format!("./{}", rel.display()),
        None => path.display().to_string(),
    }
}

/// Discover and parse every document under `path`.
pub fn load_local(path: &Path) -> Result<Vec<SuiteDocument>, SourceError> {
    discover(path)?
        .into_iter()
        .map(|file| {
            let text = std::fs::read_to_string(&file).map_err(|source| SourceError::Read {
                path: file.clone(),
                source,
            })?;
            let mut doc = parse_document(&text, &file.display().to_string())?;
            doc.filename = Some(display_path(&file));
            tracing::debug!(file = %file.display(), cases = doc.cases.len(), "loaded document");
            Ok(doc)
        })
        .collect()
}

/// Fetch and parse a document from an `http(s)://` URL.
pub async fn load_remote(
    url: &str,
    fetcher: &dyn DocumentFetcher,
    timeout_ms: u64,
) -> Result<SuiteDocument, SourceError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SourceError::NotHttp(url.to_string()));
    }
    let text = fetcher
        .fetch_text(url, timeout_ms)
        .await
        .map_err(|source| SourceError::Fetch {
            url: url.to_string(),
            source,
        })?;
    let mut doc = parse_document(&text, url)?;
    doc.filename = Some(url.to_string());
    Ok(doc)
}
