//! Suite – the per-document arena of scenario instances.
//!
//! Instances live in a `Vec` addressed by [`ScenarioId`]; hook names are
//! resolved once at load time into a name → id map, so an unknown hook is a
//! load error instead of a failure halfway through a run.

use crate::expand::expand;
use crate::traits::{ExecError, ShellRunner};
use crate::types::*;
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Only labels containing this substring are visible.
    pub filter: Option<String>,
    /// Working directory for scenarios without their own `workdir`.
    pub workdir: Option<PathBuf>,
    /// When non-zero, replaces every scenario and debug timeout.
    pub timeout_override: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("suite '{suite}': case '{case}' references unknown hook '{hook}'")]
    UnknownHook {
        suite: String,
        case: String,
        hook: String,
    },

    #[error("loop command for case '{case}' could not run: {source}")]
    Generator {
        case: String,
        #[source]
        source: ExecError,
    },
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub filename: Option<String>,
    pub custom_index: Option<String>,
    pub env: BTreeMap<String, String>,
    instances: Vec<ScenarioInstance>,
    hooks: HashMap<String, ScenarioId>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl Suite {
    /// Expand every definition of `document` and validate hook references.
    ///
    /// Loop generator commands run here, through `runner`.
    pub async fn load(
        document: SuiteDocument,
        options: &LoadOptions,
        runner: &dyn ShellRunner,
    ) -> Result<Self, SuiteError> {
        let SuiteDocument {
            name,
            filename,
            custom_index,
            env,
            cases,
        } = document;

        let mut suite = Suite {
            name,
            filename,
            custom_index: custom_index.filter(|t| !t.is_empty()),
            env,
            instances: Vec::new(),
            hooks: HashMap::new(),
            started_at: None,
            finished_at: None,
        };

        for definition in &cases {
            for instance in expand(definition, &suite.env, options, runner).await? {
                suite.push(instance);
            }
        }

        suite.validate_hooks()?;

        tracing::debug!(
            suite = %suite.name,
            instances = suite.instances.len(),
            hooks = suite.hooks.len(),
            "suite loaded"
        );
        Ok(suite)
    }

    fn push(&mut self, mut instance: ScenarioInstance) {
        let id = self.instances.len();
        instance.id = id;
        if let Some(name) = instance.definition.hook_name() {
            if self.hooks.contains_key(name) {
                tracing::debug!(hook = name, id, "duplicate scenario name, first one wins");
            } else {
                self.hooks.insert(name.to_string(), id);
            }
        }
        self.instances.push(instance);
    }

    fn validate_hooks(&self) -> Result<(), SuiteError> {
        for instance in &self.instances {
            let def = &instance.definition;
            for hook in def.before.iter().chain(def.after.iter()) {
                if !self.hooks.contains_key(hook) {
                    return Err(SuiteError::UnknownHook {
                        suite: self.name.clone(),
                        case: def.case.clone(),
                        hook: hook.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn instances(&self) -> &[ScenarioInstance] {
        &self.instances
    }

    pub fn get(&self, id: ScenarioId) -> Option<&ScenarioInstance> {
        self.instances.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: ScenarioId) -> Option<&mut ScenarioInstance> {
        self.instances.get_mut(id)
    }

    /// Instance a hook name refers to.
    pub fn hook_id(&self, name: &str) -> Option<ScenarioId> {
        self.hooks.get(name).copied()
    }

    pub fn hook(&self, name: &str) -> Option<&ScenarioInstance> {
        self.hook_id(name).and_then(|id| self.get(id))
    }

    /// Ids the scheduler walks, in document order.
    pub fn scheduled_ids(&self) -> Vec<ScenarioId> {
        self.instances
            .iter()
            .filter(|i| i.is_runnable())
            .map(|i| i.id)
            .collect()
    }

    /// Number of instances that are displayed and scored.
    pub fn visible_count(&self) -> usize {
        self.instances.iter().filter(|i| i.is_visible()).count()
    }
}
