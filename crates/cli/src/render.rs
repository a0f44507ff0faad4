//! Console rendering of a suite run.
//!
//! Every method returns the lines it would print so the layout can be
//! tested without capturing stdout. Lines are built with ANSI colour and
//! passed through [`Console::finish`], which strips colour when `TERM` is
//! unset.

use checkup_engine::score::format_duration;
use checkup_engine::shell::explain_exit_code;
use checkup_engine::types::{HookRun, ScenarioInstance, ScriptRun};
use checkup_engine::{ScenarioId, Suite, SuiteSummary};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

const BLOCK_INDENT: &str = "     ";

pub struct Console {
    verbosity: u8,
    color: bool,
}

/// One script block: main, debug or a single hook.
struct Block<'a> {
    name: Option<String>,
    script: &'a str,
    run: Option<&'a ScriptRun>,
    timeout: u64,
    env: &'a [String],
}

impl Console {
    pub fn new(verbosity: u8) -> Self {
        let color = std::env::var("TERM").is_ok_and(|t| !t.is_empty());
        Self::with_color(verbosity, color)
    }

    pub fn with_color(verbosity: u8, color: bool) -> Self {
        Self { verbosity, color }
    }

    pub fn print(&self, lines: &[String]) {
        for line in lines {
            println!("{}", line);
        }
    }

    pub fn header(&self, suite: &Suite) -> Vec<String> {
        let file = suite
            .filename
            .as_deref()
            .map(|f| format!(", file: {}", f))
            .unwrap_or_default();
        let line = match suite.visible_count() {
            0 => format!("[ {} ], no tests to run{}", suite.name, file),
            1 => format!("[ {} ], 1 test{}", suite.name, file),
            n => format!("[ {} ], 1..{} tests{}", suite.name, n, file),
        };
        vec![self.finish(line)]
    }

    /// Dashed separator wide enough for the longest status line.
    pub fn rule(&self, suite: &Suite) -> String {
        let count = suite.visible_count();
        let widest = suite
            .instances()
            .iter()
            .filter(|i| i.is_visible())
            .enumerate()
            .map(|(n, i)| format!("   {}/{}  {}", n, count, i.label()).chars().count())
            .fold(30, usize::max);
        "-".repeat(widest + 7)
    }

    /// Status line plus detail blocks for one finished instance.
    ///
    /// `position` is the 1-based index among visible instances, `None` for
    /// silent tasks.
    pub fn scenario(&self, suite: &Suite, id: ScenarioId, position: Option<usize>) -> Vec<String> {
        let Some(instance) = suite.get(id) else {
            return Vec::new();
        };
        let silent = instance.label().is_empty();
        if !(instance.is_visible() || (silent && self.verbosity >= 3)) {
            return Vec::new();
        }

        let (symbol, color) = if instance.is_skipped() {
            ("-", CYAN)
        } else if instance.is_success() {
            ("✓", GREEN)
        } else {
            ("✗", RED)
        };

        let count = suite.visible_count();
        let position = position.unwrap_or(0);
        let title = match (&suite.custom_index, silent) {
            (_, true) => format!("{:>2}/{}  {}", "-", "-", "Silent task, not scored"),
            (Some(template), false) => format!(
                "{} {}",
                render_index(template, position as i64 - 1, count as i64),
                instance.label()
            ),
            (None, false) => format!("{:>2}/{}  {}", position, count, instance.label()),
        };

        let mut lines = Vec::new();
        if instance.is_skipped() {
            let reason = instance
                .skip_reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            lines.push(format!(
                "{}{} {}, skipping reason: {} {}",
                color, symbol, title, reason, RESET
            ));
            return self.finish_all(lines);
        }

        lines.push(format!(
            "{}{} {}, {}{}",
            color,
            symbol,
            title,
            format_duration(instance.duration),
            RESET
        ));
        lines.extend(self.details(suite, instance));
        self.finish_all(lines)
    }

    fn details(&self, suite: &Suite, instance: &ScenarioInstance) -> Vec<String> {
        let v = self.verbosity;
        let failed = instance.is_failed();
        let mut lines = Vec::new();

        if v >= 3 && !instance.before_runs.is_empty() {
            let title = format!("pre-tasks ({}):", instance.before_runs.len());
            lines.extend(self.block(&title, &hook_blocks(suite, &instance.before_runs), 2));
        }

        if !((v == 1 && failed) || v >= 2) {
            return lines;
        }

        let env: &[String] = if v >= 4 && failed { &instance.env } else { &[] };
        let main = Block {
            name: None,
            script: instance.definition.script.trim(),
            run: instance.main.as_ref(),
            timeout: instance.definition.timeout,
            env,
        };
        lines.extend(self.block("main script:", &[main], 0));

        if failed && v >= 3 {
            let script = instance.definition.debug_script().trim();
            if script.is_empty() {
                lines.extend(self.block("debug: script undefined", &[], 0));
            } else {
                let debug = Block {
                    name: None,
                    script,
                    run: instance.debug.as_ref(),
                    timeout: instance.definition.debug_timeout(),
                    env: &[],
                };
                lines.extend(self.block("debug:", &[debug], 0));
            }
        }

        if v >= 3 && !instance.after_runs.is_empty() {
            let title = format!("post-tasks ({}):", instance.after_runs.len());
            lines.extend(self.block(&title, &hook_blocks(suite, &instance.after_runs), 2));
        }

        lines
    }

    fn block(&self, title: &str, blocks: &[Block<'_>], extra_indent: usize) -> Vec<String> {
        let indent = format!("{}{}", BLOCK_INDENT, " ".repeat(extra_indent));
        let mut lines = vec![format!("{}{}", &BLOCK_INDENT[2..], title)];

        for block in blocks {
            if let Some(name) = &block.name {
                lines.push(format!("{}{}", &indent[2..], name));
            }

            lines.push(format!("{}script: >", indent));
            lines.extend(block.script.lines().map(|l| format!("  {}{}", indent, l)));

            let output = block.run.map_or("", |r| r.output.trim());
            if output.is_empty() {
                lines.push(format!("{}stdout: \"\" (output is empty)", indent));
            } else {
                lines.push(format!("{}stdout: >", indent));
                lines.extend(output.lines().map(|l| format!("  {}{}", indent, l)));
            }

            if block.timeout != 0 {
                lines.push(format!("{}timeout: {} sec", indent, block.timeout));
            }

            let code = block.run.map_or(0, |r| r.exit_code);
            let color = if code == 0 { GREEN } else { RED };
            lines.push(format!(
                "{}exit code: {} ({}{}{})",
                indent,
                code,
                color,
                explain_exit_code(code),
                RESET
            ));

            if !block.env.is_empty() {
                lines.push(format!("{}environment:", indent));
                lines.extend(block.env.iter().map(|e| format!("{}  {}", indent, e)));
            }

            lines.push(String::new());
        }

        if blocks.is_empty() {
            lines.push(String::new());
        }
        lines
    }

    pub fn summary(&self, summary: &SuiteSummary) -> Vec<String> {
        let mut lines = Vec::new();
        if summary.total > 0 {
            let mut failed = format!("{} tests failed", summary.failed);
            if summary.failed > 0 {
                failed = format!("{}{}{}", RED, failed, RESET);
            }
            let mut skipped = format!("{} tests skipped", summary.skipped);
            if summary.skipped > 0 {
                skipped = format!("{}{}{}", CYAN, skipped, RESET);
            }
            let line = format!(
                "{} (of {}) tests passed, {}, {}, rated as {:.2}%, spent {}",
                summary.successful,
                summary.total,
                failed,
                skipped,
                summary.score,
                format_duration(summary.duration)
            );
            if summary.has_failures() {
                lines.push(line);
            } else {
                lines.push(format!("{}{}{}", GREEN, line, RESET));
            }
        }
        lines.push(String::new());
        self.finish_all(lines)
    }

    fn finish_all(&self, lines: Vec<String>) -> Vec<String> {
        lines.into_iter().map(|l| self.finish(l)).collect()
    }

    /// Plain-terminal fallback: drop escape codes and spell out symbols.
    fn finish(&self, line: String) -> String {
        if self.color {
            return line;
        }
        ansi_escape()
            .replace_all(&line, "")
            .replace('✓', "success")
            .replace('✗', "FAILURE")
    }
}

fn hook_blocks<'a>(suite: &Suite, runs: &'a [HookRun]) -> Vec<Block<'a>> {
    let total = runs.len();
    runs.iter()
        .enumerate()
        .map(|(n, hook)| {
            let name = suite
                .hook(&hook.name)
                .and_then(|h| h.definition.hook_name())
                .unwrap_or(&hook.name)
                .trim()
                .to_string();
            Block {
                name: Some(format!("{}/{}: {}", n + 1, total, name)),
                script: hook.script.trim(),
                run: Some(&hook.run),
                timeout: hook.timeout,
                env: &[],
            }
        })
        .collect()
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b[^m]*m").expect("static regex"))
}

fn template_action() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").expect("static regex"))
}

/// Render a `custom_index` template. Supported actions: `{{ .TaskId }}`
/// (0-based), `{{ .TaskCount }}`, integer literals and `{{ add a b }}`.
/// Anything else is left as written.
pub fn render_index(template: &str, task_id: i64, task_count: i64) -> String {
    let value = |token: &str| -> Option<i64> {
        match token {
            ".TaskId" => Some(task_id),
            ".TaskCount" => Some(task_count),
            literal => literal.parse().ok(),
        }
    };

    template_action()
        .replace_all(template, |caps: &Captures| {
            let tokens: Vec<&str> = caps[1].split_whitespace().collect();
            let result = match tokens.as_slice() {
                ["add", a, b] => value(a).zip(value(b)).map(|(a, b)| a + b),
                [single] => value(single),
                _ => None,
            };
            result.map_or_else(|| caps[0].to_string(), |n| n.to_string())
        })
        .into_owned()
}
