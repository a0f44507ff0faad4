//! Engine crate – the core of the `checkup` suite runner.
//!
//! Turns a suite document into an ordered arena of scenario instances
//! (loop expansion, environment resolution, hook validation), runs them one
//! at a time through a [`ShellRunner`], and scores the result. Terminal
//! rendering and process exit codes live in the CLI crate.

pub mod context;
pub mod env;
pub mod expand;
pub mod platform;
pub mod report;
pub mod scheduler;
pub mod score;
pub mod shell;
pub mod source;
pub mod suite;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use context::EngineContext;
pub use report::{ReportFormat, ReportSpec};
pub use scheduler::Scheduler;
pub use suite::{LoadOptions, Suite, SuiteError};
pub use traits::{DocumentFetcher, ShellRunner};
pub use types::{ExecStatus, ScenarioId, ScenarioInstance, SuiteDocument, SuiteSummary};
