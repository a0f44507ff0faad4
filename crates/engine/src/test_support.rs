//! In-memory `ShellRunner` double for engine tests.

use crate::traits::{ExecResult, ShellRunner};
use crate::types::{ScriptRequest, ScriptRun};
use std::collections::HashMap;
use std::sync::Mutex;

/// Records every request and answers from a table keyed by script body.
/// Unknown scripts succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    responses: HashMap<String, ScriptRun>,
    calls: Mutex<Vec<ScriptRequest>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, script: &str, exit_code: i32, output: &str) -> Self {
        let run = ScriptRun {
            output: output.to_string(),
            exit_code,
            ..Default::default()
        };
        self.responses.insert(script.to_string(), run);
        self
    }

    /// Answer `script` the way a runner reports an expired timeout.
    pub fn time_out(mut self, script: &str, timeout: u64) -> Self {
        let run = ScriptRun {
            output: format!("timed out after {}s", timeout),
            exit_code: crate::shell::TIMEOUT_EXIT_CODE,
            timed_out: true,
            ..Default::default()
        };
        self.responses.insert(script.to_string(), run);
        self
    }

    pub fn calls(&self) -> Vec<ScriptRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.script).collect()
    }
}

#[async_trait::async_trait]
impl ShellRunner for RecordingRunner {
    async fn run(&self, request: &ScriptRequest) -> ExecResult<ScriptRun> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(self
            .responses
            .get(&request.script)
            .cloned()
            .unwrap_or_default())
    }
}
