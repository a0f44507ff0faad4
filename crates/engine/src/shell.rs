//! Shell runner – execute one scenario script under a bash wrapper.
//!
//! The wrapper defines bats-style assertion helpers (`run`,
//! `assert_success`, `assert_failure`, `assert_equal`, `assert_not_equal`,
//! `assert_output`) so scenario scripts can assert instead of checking
//! exit codes by hand.

use crate::env::split_entry;
use crate::traits::{ExecError, ExecResult, ShellRunner};
use crate::types::{ScriptRequest, ScriptRun};
use regex::Regex;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Exit code reported when a script exceeds its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const SCRIPT_FILE_NAME: &str = "scenario.sh";

const PREAMBLE: &str = r#"#!/usr/bin/env bash
exec 2>&1
set -e

output=""
status=0
lines=()

fail() {
  echo "$@"
  exit 1
}

skip() {
  [ $# -gt 0 ] && echo "$@"
  echo "SKIPPED BY SCRIPT"
  exit 0
}

run() {
  local saved_opts="$-"
  set +e
  local cmd
  if [ $# -eq 1 ]; then
    cmd="$1"
  else
    printf -v cmd '%q ' "$@"
    cmd="${cmd% }"
  fi
  output="$(bash -c "$cmd" 2>&1)"
  status=$?
  lines=()
  if [ -n "$output" ]; then
    mapfile -t lines <<< "$output"
  fi
  echo "(run, $(pwd)) => $cmd"
  echo "rc: $status"
  if [ "${#lines[@]}" -gt 1 ]; then
    echo "output: |"
    printf '%s\n' "$output" | sed 's/^/  /'
  else
    echo "output: '$output'"
  fi
  case "$saved_opts" in *e*) set -e ;; esac
  return 0
}

assert_success() {
  if [ $# -gt 0 ]; then run "$@"; fi
  if [ "${status:-0}" -ne 0 ]; then fail "assert_success: command exited with ${status}"; fi
  return 0
}

assert_failure() {
  if [ $# -gt 0 ]; then run "$@"; fi
  if [ "${status:-0}" -eq 0 ]; then fail "assert_failure: command exited with 0"; fi
  status=0
}

assert_equal() {
  if [ "x$1" != "x$2" ]; then fail "assert_equal: '$1' != '$2'"; fi
  return 0
}

assert_not_equal() {
  if [ "x$1" == "x$2" ]; then fail "assert_not_equal: '$1' == '$2'"; fi
  return 0
}

assert_output() {
  case "$1" in
    -p|--partial)
      [[ "$output" == *"$2"* ]] || fail "assert_output: output does not contain '$2'"
      ;;
    -e|--regexp)
      [[ "$output" =~ $2 ]] || fail "assert_output: output does not match /$2/"
      ;;
    *)
      [ "$output" == "$*" ] || fail "assert_output: output is not '$*'"
      ;;
  esac
  return 0
}

# --- scenario script ---
"#;

/// Embed a scenario body into the helper wrapper.
pub fn wrap_script(body: &str) -> String {
    format!("{}{}\nexit ${{status:-0}}\n", PREAMBLE, body)
}

/// Remove the `<script path>: line <n>: ` prefix bash puts on its own
/// error messages.
pub fn strip_line_prefixes(output: &str, script_path: &Path) -> String {
    let pattern = format!(
        r"(?m)^{}: line \d+: ",
        regex::escape(&script_path.display().to_string())
    );
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(output, "").into_owned(),
        Err(_) => output.to_string(),
    }
}

/// Short human explanation of a shell exit code.
pub fn explain_exit_code(code: i32) -> String {
    match code {
        0 => "success".into(),
        1 => "general error".into(),
        2 => "misuse of shell builtins".into(),
        TIMEOUT_EXIT_CODE => "timed out".into(),
        126 => "command cannot execute".into(),
        127 => "command not found".into(),
        130 => "terminated by Ctrl-C".into(),
        -1 => "runner error".into(),
        c if c > 128 && c <= 128 + 64 => format!("fatal signal {}", c - 128),
        _ => "failure".into(),
    }
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// SIGKILL the whole process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only takes integer arguments; the group was created by
    // `process_group(0)` at spawn, so its id equals the child's pid.
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

// ===========================================================================
// BashRunner
// ===========================================================================

/// Runs scripts through a real shell interpreter (default `bash`).
pub struct BashRunner {
    shell: String,
}

impl BashRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for BashRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait::async_trait]
impl ShellRunner for BashRunner {
    async fn run(&self, request: &ScriptRequest) -> ExecResult<ScriptRun> {
        if request.script.trim().is_empty() {
            return Ok(ScriptRun::default());
        }

        let start = Instant::now();

        // Removed when dropped, including on the error paths below.
        let dir = tempfile::Builder::new()
            .prefix("checkup-")
            .tempdir()
            .map_err(ExecError::Prepare)?;
        let script_path = dir.path().join(SCRIPT_FILE_NAME);
        std::fs::write(&script_path, wrap_script(&request.script)).map_err(ExecError::Prepare)?;

        let mut command = tokio::process::Command::new(&self.shell);
        command
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for entry in &request.env {
            let (key, value) = split_entry(entry);
            command.env(key, value);
        }
        if let Some(ref workdir) = request.workdir {
            command.current_dir(workdir);
        }
        // Own process group, so a timeout can take down everything the
        // script started, not just the interpreter.
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| ExecError::Spawn {
            shell: self.shell.clone(),
            source,
        })?;
        let pid = child.id();

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        let waited = if request.timeout > 0 {
            let limit = Duration::from_secs(request.timeout);
            match tokio::time::timeout(limit, &mut wait).await {
                Ok(result) => Some(result),
                Err(_) => {
                    kill_process_group(pid);
                    None
                }
            }
        } else {
            Some(wait.await)
        };

        let run = match waited {
            Some(result) => {
                let out = result.map_err(ExecError::Wait)?;
                let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&out.stderr));
                let code = exit_code(&out.status);
                let output = if code == 0 {
                    combined
                } else {
                    strip_line_prefixes(&combined, &script_path)
                };
                ScriptRun {
                    output: output.trim().to_string(),
                    exit_code: code,
                    timed_out: false,
                    duration: start.elapsed(),
                }
            }
            None => {
                tracing::warn!(timeout = request.timeout, "script timed out, killed");
                ScriptRun {
                    output: format!("timed out after {}s", request.timeout),
                    exit_code: TIMEOUT_EXIT_CODE,
                    timed_out: true,
                    duration: start.elapsed(),
                }
            }
        };

        tracing::debug!(
            exit_code = run.exit_code,
            elapsed_ms = run.duration.as_millis() as u64,
            "script finished"
        );
        Ok(run)
    }
}
