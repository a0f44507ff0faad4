use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Authored document – what a suite YAML file deserializes into
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub custom_index: Option<String>,
    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cases: Vec<ScenarioDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Hook reference key. Never displayed.
    #[serde(default)]
    pub name: Option<String>,
    /// Display title. Empty means a silent task.
    #[serde(default)]
    pub case: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default, rename = "loop")]
    pub loop_spec: Option<LoopSpec>,
    /// Seconds; 0 means unbounded.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub debug: Option<DebugSpec>,
    /// Legacy shorthand for `debug.script`.
    #[serde(default, skip_serializing)]
    pub debug_script: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopSpec {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub command: Option<String>,
}

impl LoopSpec {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.command.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSpec {
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub timeout: u64,
}

impl ScenarioDefinition {
    /// The hook key, if the scenario has a non-empty name.
    pub fn hook_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn debug_script(&self) -> &str {
        self.debug.as_ref().map_or("", |d| d.script.as_str())
    }

    pub fn debug_timeout(&self) -> u64 {
        self.debug.as_ref().map_or(0, |d| d.timeout)
    }
}

/// Env mappings accept any YAML scalar and stringify it, so `PORT: 8080`
/// works the same as `PORT: "8080"`.
fn deserialize_env<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    let raw: Option<BTreeMap<String, Option<Scalar>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Some(Scalar::Str(s)) => s,
                Some(Scalar::Int(i)) => i.to_string(),
                Some(Scalar::Float(f)) => f.to_string(),
                Some(Scalar::Bool(b)) => b.to_string(),
                None => String::new(),
            };
            (k, value)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Runtime instances
// ---------------------------------------------------------------------------

/// Stable index of an instance inside its suite's arena.
pub type ScenarioId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    NotRun,
    Skipped,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SkipSetting,
    EmptyScript,
    FatalAbort { after: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SkipSetting => f.write_str("skip=true setting"),
            SkipReason::EmptyScript => f.write_str("empty script setting"),
            SkipReason::FatalAbort { after } => {
                write!(f, "aborted after fatal failure of '{}'", after)
            }
        }
    }
}

/// One script invocation as handed to a [`crate::traits::ShellRunner`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRequest {
    pub script: String,
    pub workdir: Option<PathBuf>,
    /// Seconds; 0 means unbounded.
    pub timeout: u64,
    /// Resolved `NAME=VALUE` entries.
    pub env: Vec<String>,
}

/// Captured result of one script invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptRun {
    pub output: String,
    pub exit_code: i32,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ScriptRun {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Record for an invocation the runner could not even start.
    pub fn runner_error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            exit_code: -1,
            timed_out: false,
            duration: Duration::ZERO,
        }
    }
}

/// A hook invocation recorded on the scenario that requested it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRun {
    pub name: String,
    pub script: String,
    pub timeout: u64,
    pub run: ScriptRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInstance {
    pub id: ScenarioId,
    /// Definition with the loop item already applied to `case` and `env`.
    pub definition: ScenarioDefinition,
    pub item: Option<String>,
    pub workdir: Option<PathBuf>,
    pub env: Vec<String>,
    pub visibility: Visibility,
    pub status: ExecStatus,
    pub skip_reason: Option<SkipReason>,
    pub main: Option<ScriptRun>,
    pub debug: Option<ScriptRun>,
    pub before_runs: Vec<HookRun>,
    pub after_runs: Vec<HookRun>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ScenarioInstance {
    pub fn label(&self) -> &str {
        &self.definition.case
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// Visible scenarios run; unnamed ones run too so they can act as
    /// silent setup steps.
    pub fn is_runnable(&self) -> bool {
        self.is_visible() || self.definition.hook_name().is_none()
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == ExecStatus::Skipped
    }

    pub fn output(&self) -> &str {
        self.main.as_ref().map_or("", |r| r.output.as_str())
    }

    pub fn main_request(&self) -> ScriptRequest {
        ScriptRequest {
            script: self.definition.script.clone(),
            workdir: self.workdir.clone(),
            timeout: self.definition.timeout,
            env: self.env.clone(),
        }
    }

    pub fn debug_request(&self) -> ScriptRequest {
        ScriptRequest {
            script: self.definition.debug_script().to_string(),
            workdir: self.workdir.clone(),
            timeout: self.definition.debug_timeout(),
            env: self.env.clone(),
        }
    }

    pub(crate) fn mark_skipped(&mut self, reason: SkipReason) {
        self.status = ExecStatus::Skipped;
        self.skip_reason = Some(reason);
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Weighted pass percentage, 0–100.
    pub score: f64,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl SuiteSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_accepts_scalars() {
        let yaml = r#"
name: demo
env:
  PORT: 8080
  RATIO: 0.5
  DEBUG: true
  EMPTY:
  HOST: localhost
cases: []
"#;
        let doc: SuiteDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.env["PORT"], "8080");
        assert_eq!(doc.env["RATIO"], "0.5");
        assert_eq!(doc.env["DEBUG"], "true");
        assert_eq!(doc.env["EMPTY"], "");
        assert_eq!(doc.env["HOST"], "localhost");
    }

    #[test]
    fn test_definition_defaults() {
        let yaml = r#"
cases:
  - case: minimal
    script: "true"
"#;
        let doc: SuiteDocument = serde_yaml::from_str(yaml).unwrap();
        let def = &doc.cases[0];
        assert_eq!(def.hook_name(), None);
        assert_eq!(def.weight, 0);
        assert_eq!(def.timeout, 0);
        assert!(def.loop_spec.is_none());
        assert_eq!(def.debug_script(), "");
    }

    #[test]
    fn test_loop_spec_is_empty() {
        assert!(LoopSpec::default().is_empty());
        let with_blank_command = LoopSpec {
            items: vec![],
            command: Some(String::new()),
        };
        assert!(with_blank_command.is_empty());
        let with_items = LoopSpec {
            items: vec!["a".into()],
            command: None,
        };
        assert!(!with_items.is_empty());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::SkipSetting.to_string(), "skip=true setting");
        assert_eq!(SkipReason::EmptyScript.to_string(), "empty script setting");
        let fatal = SkipReason::FatalAbort {
            after: "db is up".into(),
        };
        assert_eq!(fatal.to_string(), "aborted after fatal failure of 'db is up'");
    }
}
