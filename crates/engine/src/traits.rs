use crate::types::{ScriptRequest, ScriptRun};

/// Result type for script execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Infrastructure failures while running a script. A script that runs and
/// exits non-zero is not an error; it is a [`ScriptRun`] with that exit code.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("cannot prepare script file: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("cannot start interpreter '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("waiting for interpreter failed: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("http status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("timeout")]
    Timeout,
}

// ---------------------------------------------------------------------------
// Script execution
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run one script body to completion (or timeout) and capture it.
    async fn run(&self, request: &ScriptRequest) -> ExecResult<ScriptRun>;
}

// ---------------------------------------------------------------------------
// Remote documents
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// GET `url` and return the body as text.
    async fn fetch_text(&self, url: &str, timeout_ms: u64) -> Result<String, FetchError>;
}
