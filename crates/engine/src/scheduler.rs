//! Suite scheduler – run scheduled instances strictly in document order.
//!
//! Per instance: before-hooks, main script, debug script (only when the
//! main script failed), after-hooks. Hook and debug results are recorded on
//! the instance but never change its status.

use crate::score::score;
use crate::suite::Suite;
use crate::traits::ShellRunner;
use crate::types::*;
use chrono::Local;
use std::time::Instant;
use tracing::Instrument;

pub struct Scheduler<'a> {
    runner: &'a dyn ShellRunner,
}

impl<'a> Scheduler<'a> {
    pub fn new(runner: &'a dyn ShellRunner) -> Self {
        Self { runner }
    }

    /// Run every scheduled instance of `suite` and score the result.
    ///
    /// `on_finished` is called after each scheduled instance completes or
    /// is skipped.
    pub async fn run<F>(&self, suite: &mut Suite, on_finished: F) -> SuiteSummary
    where
        F: FnMut(&Suite, ScenarioId),
    {
        let span = tracing::info_span!(
            "suite",
            name = %suite.name,
            run_id = %uuid::Uuid::new_v4()
        );
        self.run_inner(suite, on_finished).instrument(span).await
    }

    async fn run_inner<F>(&self, suite: &mut Suite, mut on_finished: F) -> SuiteSummary
    where
        F: FnMut(&Suite, ScenarioId),
    {
        suite.started_at = Some(Local::now());
        let mut aborted_by: Option<String> = None;

        for id in suite.scheduled_ids() {
            if let Some(culprit) = aborted_by.clone() {
                if let Some(instance) = suite.get_mut(id) {
                    if !instance.is_skipped() {
                        instance.mark_skipped(SkipReason::FatalAbort { after: culprit });
                    }
                }
            } else {
                self.execute(suite, id).await;
                if let Some(instance) = suite.get(id) {
                    if instance.definition.fatal && instance.is_failed() {
                        tracing::warn!(
                            case = %instance.label(),
                            "fatal scenario failed, skipping the rest of the suite"
                        );
                        aborted_by = Some(display_name(instance));
                    }
                }
            }
            on_finished(suite, id);
        }

        suite.finished_at = Some(Local::now());
        let summary = score(suite);
        tracing::info!(
            total = summary.total,
            failed = summary.failed,
            skipped = summary.skipped,
            score = summary.score,
            "suite finished"
        );
        summary
    }

    async fn execute(&self, suite: &mut Suite, id: ScenarioId) {
        let Some(instance) = suite.get(id) else {
            return;
        };
        if instance.is_skipped() {
            tracing::info!(
                case = %instance.label(),
                reason = %instance.skip_reason.as_ref().map(ToString::to_string).unwrap_or_default(),
                "scenario skipped"
            );
            return;
        }

        let before = instance.definition.before.clone();
        let after = instance.definition.after.clone();
        let main_request = instance.main_request();
        let debug_request = instance.debug_request();
        tracing::info!(id, case = %instance.label(), "scenario started");

        let started = Instant::now();
        let before_runs = self.run_hooks(suite, &before).await;
        let main = self.invoke(&main_request).await;

        let debug = if !main.is_success() && !debug_request.script.trim().is_empty() {
            tracing::debug!(id, "running debug script");
            Some(self.invoke(&debug_request).await)
        } else {
            None
        };

        let after_runs = self.run_hooks(suite, &after).await;
        let duration = started.elapsed();

        if let Some(instance) = suite.get_mut(id) {
            instance.status = if main.is_success() {
                ExecStatus::Success
            } else {
                ExecStatus::Failed
            };
            tracing::info!(
                id,
                case = %instance.label(),
                exit_code = main.exit_code,
                elapsed_ms = duration.as_millis() as u64,
                "scenario finished"
            );
            instance.main = Some(main);
            instance.debug = debug;
            instance.before_runs = before_runs;
            instance.after_runs = after_runs;
            instance.duration = duration;
        }
    }

    async fn run_hooks(&self, suite: &Suite, names: &[String]) -> Vec<HookRun> {
        let mut runs = Vec::with_capacity(names.len());
        for name in names {
            let Some(hook) = suite.hook(name) else {
                tracing::warn!(hook = %name, "hook vanished after load, ignoring");
                continue;
            };
            let request = hook.main_request();
            tracing::debug!(hook = %name, "running hook");
            let run = self.invoke(&request).await;
            runs.push(HookRun {
                name: name.clone(),
                script: request.script,
                timeout: request.timeout,
                run,
            });
        }
        runs
    }

    /// Runner errors become a failed run so the suite keeps going.
    async fn invoke(&self, request: &ScriptRequest) -> ScriptRun {
        match self.runner.run(request).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(error = %e, "script could not be executed");
                ScriptRun::runner_error(e.to_string())
            }
        }
    }
}

fn display_name(instance: &ScenarioInstance) -> String {
    if !instance.label().is_empty() {
        instance.label().to_string()
    } else {
        instance
            .definition
            .hook_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", instance.id))
    }
}
