//! Engine context – holds the capability trait objects a run needs.

use crate::platform::ReqwestFetcher;
use crate::shell::BashRunner;
use crate::traits::*;

/// Central context passed to suite loading and scheduling.
///
/// Holds trait-object capabilities so callers (CLI / tests) can swap
/// implementations, e.g. a recording runner instead of real bash.
pub struct EngineContext {
    runner: Box<dyn ShellRunner>,
    fetcher: Box<dyn DocumentFetcher>,
}

impl EngineContext {
    pub fn new(runner: Box<dyn ShellRunner>, fetcher: Box<dyn DocumentFetcher>) -> Self {
        Self { runner, fetcher }
    }

    /// Real implementations: `shell` as interpreter, reqwest for remote
    /// documents.
    pub fn default_platform(shell: &str) -> Self {
        Self {
            runner: Box::new(BashRunner::new(shell)),
            fetcher: Box::new(ReqwestFetcher::new()),
        }
    }

    pub fn runner(&self) -> &dyn ShellRunner {
        self.runner.as_ref()
    }

    pub fn fetcher(&self) -> &dyn DocumentFetcher {
        self.fetcher.as_ref()
    }
}
