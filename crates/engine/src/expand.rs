//! Scenario expansion – turn one authored definition into runtime instances.

use crate::env::resolve_env;
use crate::suite::{LoadOptions, SuiteError};
use crate::traits::ShellRunner;
use crate::types::*;
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Env key the loop item is bound to.
pub const ITEM_KEY: &str = "item";

fn item_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{item\}|\$item\b").expect("static regex"))
}

/// Case label for one loop item: substitute `$item` / `${item}` in place,
/// otherwise append the item.
pub fn item_label(case: &str, item: &str) -> String {
    if case.is_empty() {
        return String::new();
    }
    let re = item_ref();
    if re.is_match(case) {
        re.replace_all(case, NoExpand(item)).into_owned()
    } else {
        format!("{}, item => \"{}\"", case, item)
    }
}

/// Visible when labelled and matching the filter: a substring of the
/// authored label, before any loop item is substituted.
pub fn visibility_of(case: &str, filter: Option<&str>) -> Visibility {
    let matches = match filter {
        Some(f) if !f.is_empty() => case.contains(f),
        _ => true,
    };
    if !case.is_empty() && matches {
        Visibility::Visible
    } else {
        Visibility::Hidden
    }
}

/// Expand `definition` into zero or more instances, in loop-item order.
///
/// Ids are left at 0; the suite assigns them when it takes ownership.
pub async fn expand(
    definition: &ScenarioDefinition,
    suite_env: &BTreeMap<String, String>,
    options: &LoadOptions,
    runner: &dyn ShellRunner,
) -> Result<Vec<ScenarioInstance>, SuiteError> {
    let def = normalize(definition, options);
    let visibility = visibility_of(&def.case, options.filter.as_deref());

    let Some(loop_spec) = def.loop_spec.clone().filter(|spec| !spec.is_empty()) else {
        return Ok(vec![instantiate(def, None, visibility, suite_env, options)]);
    };

    let mut items = loop_spec.items.clone();
    if let Some(command) = loop_spec.command.as_deref().filter(|c| !c.is_empty()) {
        items.extend(generate_items(&def, command, suite_env, options, runner).await?);
    }

    tracing::debug!(case = %def.case, items = items.len(), "expanded loop");

    Ok(items
        .into_iter()
        .map(|item| {
            let mut derived = def.clone();
            derived.case = item_label(&def.case, &item);
            derived.env.insert(ITEM_KEY.to_string(), item.clone());
            derived.loop_spec = None;
            instantiate(derived, Some(item), visibility, suite_env, options)
        })
        .collect())
}

/// Apply load-time overrides that hold for every instance of a definition.
fn normalize(definition: &ScenarioDefinition, options: &LoadOptions) -> ScenarioDefinition {
    let mut def = definition.clone();

    if let Some(legacy) = def.debug_script.take() {
        let debug = def.debug.get_or_insert_with(DebugSpec::default);
        if debug.script.is_empty() {
            debug.script = legacy;
        }
    }

    if options.timeout_override > 0 {
        def.timeout = options.timeout_override;
        if let Some(ref mut debug) = def.debug {
            debug.timeout = options.timeout_override;
        }
    }
    def
}

async fn generate_items(
    def: &ScenarioDefinition,
    command: &str,
    suite_env: &BTreeMap<String, String>,
    options: &LoadOptions,
    runner: &dyn ShellRunner,
) -> Result<Vec<String>, SuiteError> {
    let request = ScriptRequest {
        script: command.to_string(),
        workdir: def.workdir.clone().or_else(|| options.workdir.clone()),
        timeout: def.timeout,
        env: resolve_env(suite_env, &def.env),
    };
    let run = runner
        .run(&request)
        .await
        .map_err(|source| SuiteError::Generator {
            case: def.case.clone(),
            source,
        })?;

    if run.timed_out {
        tracing::warn!(
            case = %def.case,
            timeout = request.timeout,
            "loop command timed out, no generated items"
        );
        return Ok(Vec::new());
    }

    if !run.is_success() {
        tracing::warn!(
            case = %def.case,
            exit_code = run.exit_code,
            "loop command failed, using its output as-is"
        );
    }

    Ok(run
        .output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn instantiate(
    mut def: ScenarioDefinition,
    item: Option<String>,
    visibility: Visibility,
    suite_env: &BTreeMap<String, String>,
    options: &LoadOptions,
) -> ScenarioInstance {
    if visibility == Visibility::Visible && def.weight == 0 {
        def.weight = 1;
    }

    let (status, skip_reason) = if def.skip {
        (ExecStatus::Skipped, Some(SkipReason::SkipSetting))
    } else if def.script.trim().is_empty() {
        (ExecStatus::Skipped, Some(SkipReason::EmptyScript))
    } else {
        (ExecStatus::NotRun, None)
    };

    ScenarioInstance {
        id: 0,
        workdir: def.workdir.clone().or_else(|| options.workdir.clone()),
        env: resolve_env(suite_env, &def.env),
        definition: def,
        item,
        visibility,
        status,
        skip_reason,
        main: None,
        debug: None,
        before_runs: Vec::new(),
        after_runs: Vec::new(),
        duration: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingRunner;
    use std::path::PathBuf;

    fn def(case: &str, script: &str) -> ScenarioDefinition {
        ScenarioDefinition {
            case: case.to_string(),
            script: script.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_item_label() {
        assert_eq!(item_label("svc $item is up", "nginx"), "svc nginx is up");
        assert_eq!(item_label("svc ${item} is up", "nginx"), "svc nginx is up");
        assert_eq!(item_label("svc is up", "nginx"), "svc is up, item => \"nginx\"");
        assert_eq!(item_label("$items left", "x"), "$items left, item => \"x\"");
        assert_eq!(item_label("cost $item", "$5"), "cost $5");
        assert_eq!(item_label("", "x"), "");
    }

    #[test]
    fn test_visibility() {
        assert_eq!(visibility_of("disk ok", None), Visibility::Visible);
        assert_eq!(visibility_of("disk ok", Some("disk")), Visibility::Visible);
        assert_eq!(visibility_of("disk ok", Some("user")), Visibility::Hidden);
        assert_eq!(visibility_of("", None), Visibility::Hidden);
        assert_eq!(visibility_of("disk ok", Some("")), Visibility::Visible);
    }

    #[tokio::test]
    async fn test_single_instance() {
        let runner = RecordingRunner::new();
        let mut d = def("t1", "true");
        d.env.insert("A".into(), "1".into());
        let suite_env: BTreeMap<String, String> = [("B".to_string(), "2".to_string())].into();
        let out = expand(&d, &suite_env, &LoadOptions::default(), &runner).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].env, vec!["B=2", "A=1"]);
        assert_eq!(out[0].definition.weight, 1);
        assert_eq!(out[0].status, ExecStatus::NotRun);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_static_items() {
        let runner = RecordingRunner::new();
        let mut d = def("check $item", "systemctl is-active $item");
        d.loop_spec = Some(LoopSpec {
            items: vec!["a".into(), "b".into(), "c".into()],
            command: None,
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        for (inst, item) in out.iter().zip(["a", "b", "c"]) {
            assert_eq!(inst.definition.env[ITEM_KEY], item);
            assert!(inst.env.contains(&format!("item={}", item)));
            assert!(inst.label().contains(item));
            assert_eq!(inst.item.as_deref(), Some(item));
            assert!(inst.definition.loop_spec.is_none());
        }
    }

    #[tokio::test]
    async fn test_generator_items_follow_static_items() {
        let runner = RecordingRunner::new().respond("list-things", 0, "x\n\ny\n");
        let mut d = def("thing", "test -n \"$item\"");
        d.env.insert("SCOPE".into(), "all".into());
        d.loop_spec = Some(LoopSpec {
            items: vec!["first".into()],
            command: Some("list-things".into()),
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        let items: Vec<_> = out.iter().filter_map(|i| i.item.clone()).collect();
        assert_eq!(items, vec!["first", "x", "y"]);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].script, "list-things");
        assert_eq!(calls[0].env, vec!["SCOPE=all"]);
    }

    #[tokio::test]
    async fn test_timed_out_generator_adds_no_items() {
        let runner = RecordingRunner::new().time_out("sleep 5\necho real", 1);
        let mut d = def("svc $item", "true");
        d.timeout = 1;
        d.loop_spec = Some(LoopSpec {
            items: vec!["static".into()],
            command: Some("sleep 5\necho real".into()),
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        let labels: Vec<_> = out.iter().map(|i| i.label()).collect();
        assert_eq!(labels, vec!["svc static"]);
        assert_eq!(runner.calls()[0].timeout, 1);
    }

    #[tokio::test]
    async fn test_timed_out_bash_generator_adds_no_items() {
        let runner = crate::shell::BashRunner::default();
        let mut d = def("svc $item", "true");
        d.timeout = 1;
        d.loop_spec = Some(LoopSpec {
            items: vec![],
            command: Some("sleep 5\necho real".into()),
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_failed_generator_output_is_still_used() {
        let runner = RecordingRunner::new().respond("partial-list", 1, "one\ntwo");
        let mut d = def("svc $item", "true");
        d.loop_spec = Some(LoopSpec {
            items: vec![],
            command: Some("partial-list".into()),
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        let labels: Vec<_> = out.iter().map(|i| i.label()).collect();
        assert_eq!(labels, vec!["svc one", "svc two"]);
    }

    #[tokio::test]
    async fn test_filter_matches_label_before_item_substitution() {
        let runner = RecordingRunner::new();
        let mut d = def("check $item", "true");
        d.loop_spec = Some(LoopSpec {
            items: vec!["one.service".into(), "two.service".into()],
            command: None,
        });

        let by_item = LoadOptions {
            filter: Some("one.service".into()),
            ..Default::default()
        };
        let out = expand(&d, &BTreeMap::new(), &by_item, &runner).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|i| i.visibility == Visibility::Hidden));

        let by_template = LoadOptions {
            filter: Some("check $item".into()),
            ..Default::default()
        };
        let out = expand(&d, &BTreeMap::new(), &by_template, &runner).await.unwrap();
        assert!(out.iter().all(|i| i.visibility == Visibility::Visible));
        assert_eq!(out[0].label(), "check one.service");
    }

    #[tokio::test]
    async fn test_empty_generator_yields_nothing() {
        let runner = RecordingRunner::new().respond("gen", 0, "");
        let mut d = def("thing", "true");
        d.loop_spec = Some(LoopSpec {
            items: vec![],
            command: Some("gen".into()),
        });
        let out = expand(&d, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_skip_and_empty_script() {
        let runner = RecordingRunner::new();
        let mut skipped = def("s", "true");
        skipped.skip = true;
        let out = expand(&skipped, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert_eq!(out[0].status, ExecStatus::Skipped);
        assert_eq!(out[0].skip_reason, Some(SkipReason::SkipSetting));

        let empty = def("e", "   ");
        let out = expand(&empty, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert_eq!(out[0].skip_reason, Some(SkipReason::EmptyScript));
    }

    #[tokio::test]
    async fn test_hidden_weight_untouched() {
        let runner = RecordingRunner::new();
        let hidden = def("", "true");
        let out = expand(&hidden, &BTreeMap::new(), &LoadOptions::default(), &runner)
            .await
            .unwrap();
        assert_eq!(out[0].visibility, Visibility::Hidden);
        assert_eq!(out[0].definition.weight, 0);
    }

    #[tokio::test]
    async fn test_overrides() {
        let runner = RecordingRunner::new();
        let mut d = def("t", "true");
        d.timeout = 5;
        d.debug_script = Some("journalctl".into());
        let options = LoadOptions {
            filter: None,
            workdir: Some(PathBuf::from("/srv")),
            timeout_override: 30,
        };
        let out = expand(&d, &BTreeMap::new(), &options, &runner).await.unwrap();
        let inst = &out[0];
        assert_eq!(inst.definition.timeout, 30);
        assert_eq!(inst.definition.debug_script(), "journalctl");
        assert_eq!(inst.definition.debug_timeout(), 30);
        assert_eq!(inst.workdir, Some(PathBuf::from("/srv")));

        let mut own_dir = def("t", "true");
        own_dir.workdir = Some(PathBuf::from("/opt"));
        let out = expand(&own_dir, &BTreeMap::new(), &options, &runner).await.unwrap();
        assert_eq!(out[0].workdir, Some(PathBuf::from("/opt")));
    }
}
