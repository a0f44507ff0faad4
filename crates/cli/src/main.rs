//! `checkup` – run declarative shell test suites and report weighted scores.
//!
//! Loads one or more suite documents (a file, a directory of YAML files, or
//! an HTTP(S) URL), runs them through the engine and renders the outcome on
//! the console. Exit status: 0 when nothing failed, 1 when any scenario
//! failed, 2 when the configuration could not be loaded.

mod logging;
mod render;
mod settings;

use anyhow::{bail, Context, Result};
use checkup_engine::report::render_json;
use checkup_engine::source::{load_local, load_remote};
use checkup_engine::{EngineContext, LoadOptions, ReportSpec, Scheduler, Suite, SuiteSummary};
use clap::{ArgAction, Args, Parser, Subcommand};
use render::Console;
use settings::Settings;
use std::path::PathBuf;
use std::process::ExitCode;

const SAMPLE_SUITE: &str = include_str!("sample.yaml");

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "checkup",
    version,
    about = "Run declarative shell test suites and report weighted scores"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, run and score suites.
    Run(RunArgs),

    /// Load suites and check hook references without running scenarios.
    Validate(SourceArgs),

    /// Print a sample suite document.
    Sample,
}

#[derive(Args)]
struct SourceArgs {
    /// Local suite file or directory of *.yaml / *.yml files.
    #[arg(short = 'c', long = "config", value_name = "PATH", required_unless_present = "remote")]
    config: Option<PathBuf>,

    /// Remote suite document (http:// or https://).
    #[arg(short = 'C', long = "remote", value_name = "URL")]
    remote: Option<String>,

    /// Only run cases whose label contains this text.
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Working directory for scenarios without their own `workdir`.
    #[arg(short = 'w', long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Timeout in seconds applied to every scenario and debug script.
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Write a report: json=<path> or junit=<path>.
    #[arg(short = 'o', long = "output", value_name = "FORMAT=PATH")]
    output: Option<String>,

    /// Increase console detail (-v … -vvvv).
    #[arg(short = 'v', action = ArgAction::Count, conflicts_with = "verbosity")]
    verbose: u8,

    /// Console detail level, 0–4.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4))]
    verbosity: Option<u8>,

    /// Print the JSON report to stdout instead of the console rendering.
    #[arg(long)]
    json: bool,
}

/// How a command finished when it did not error out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed,
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match settings::load_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: invalid settings: {}", e);
            return ExitCode::from(2);
        }
    };
    logging::init_logging(&settings.logging);

    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(args, &settings).await,
        Commands::Validate(args) => cmd_validate(args, &settings).await,
        Commands::Sample => {
            print!("{}", SAMPLE_SUITE);
            Ok(Outcome::Passed)
        }
    };

    match outcome {
        Ok(Outcome::Passed) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "checkup aborted");
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

async fn cmd_run(args: RunArgs, settings: &Settings) -> Result<Outcome> {
    let verbosity = effective_verbosity(args.verbose, args.verbosity, settings.verbosity);
    let report = args
        .output
        .as_deref()
        .or(settings.report.as_deref())
        .map(str::parse::<ReportSpec>)
        .transpose()
        .context("invalid report option")?;

    let ctx = EngineContext::default_platform(&settings.shell);
    let mut suites = load_suites(&args.source, settings, &ctx).await?;

    let scheduler = Scheduler::new(ctx.runner());
    let console = Console::new(verbosity);
    let mut outcome = Outcome::Passed;

    for (index, suite) in suites.iter_mut().enumerate() {
        let summary = if args.json {
            let summary = scheduler.run(suite, |_, _| {}).await;
            println!("{}", render_json(suite, &summary, verbosity)?);
            summary
        } else {
            run_with_console(&scheduler, &console, suite).await
        };

        if let Some(spec) = &report {
            match spec.write(index, suite, &summary, verbosity) {
                Ok(path) => tracing::info!(path = %path.display(), "report written"),
                Err(e) => {
                    tracing::error!(error = %e, suite = %suite.name, "report not written");
                    eprintln!("warning: {}", e);
                }
            }
        }

        if summary.has_failures() {
            outcome = Outcome::Failed;
        }
    }

    Ok(outcome)
}

async fn cmd_validate(args: SourceArgs, settings: &Settings) -> Result<Outcome> {
    let ctx = EngineContext::default_platform(&settings.shell);
    let suites = load_suites(&args, settings, &ctx).await?;

    for suite in &suites {
        let hooks = suite
            .instances()
            .iter()
            .filter(|i| i.definition.hook_name().is_some())
            .count();
        println!(
            "[ {} ] ok: {} scenarios, {} instances, {} named{}",
            suite.name,
            suite.visible_count(),
            suite.instances().len(),
            hooks,
            suite
                .filename
                .as_deref()
                .map(|f| format!(", file: {}", f))
                .unwrap_or_default()
        );
    }
    Ok(Outcome::Passed)
}

async fn run_with_console(
    scheduler: &Scheduler<'_>,
    console: &Console,
    suite: &mut Suite,
) -> SuiteSummary {
    console.print(&console.header(suite));

    let has_tests = suite.visible_count() > 0;
    if has_tests {
        println!("{}", console.rule(suite));
    }

    let mut position = 0;
    let summary = scheduler
        .run(suite, |suite, id| {
            let slot = match suite.get(id) {
                Some(instance) if instance.is_visible() => {
                    position += 1;
                    Some(position)
                }
                _ => None,
            };
            console.print(&console.scenario(suite, id, slot));
        })
        .await;

    if has_tests {
        println!("{}", console.rule(suite));
    }
    console.print(&console.summary(&summary));
    summary
}

// ===========================================================================
// Helpers
// ===========================================================================

/// Load and expand every requested document. Any failure aborts before a
/// single scenario runs.
async fn load_suites(
    source: &SourceArgs,
    settings: &Settings,
    ctx: &EngineContext,
) -> Result<Vec<Suite>> {
    if let Some(dir) = &source.workdir {
        if !dir.is_dir() {
            bail!("working directory {} does not exist", dir.display());
        }
    }

    let mut documents = Vec::new();
    if let Some(path) = &source.config {
        documents.extend(
            load_local(path).with_context(|| format!("cannot load {}", path.display()))?,
        );
    }
    if let Some(url) = &source.remote {
        let document = load_remote(url, ctx.fetcher(), settings.fetch_timeout_ms)
            .await
            .with_context(|| format!("cannot load {}", url))?;
        documents.push(document);
    }

    let options = LoadOptions {
        filter: source.filter.clone(),
        workdir: source.workdir.clone(),
        timeout_override: source.timeout.unwrap_or(settings.timeout),
    };

    let mut suites = Vec::with_capacity(documents.len());
    for document in documents {
        suites.push(Suite::load(document, &options, ctx.runner()).await?);
    }
    Ok(suites)
}

/// `--verbosity` wins, then `-v` repeats, then the configured default.
fn effective_verbosity(count: u8, explicit: Option<u8>, configured: u8) -> u8 {
    explicit
        .unwrap_or(if count > 0 { count } else { configured })
        .min(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkup_engine::source::parse_document;

    #[test]
    fn test_effective_verbosity() {
        assert_eq!(effective_verbosity(0, None, 0), 0);
        assert_eq!(effective_verbosity(2, None, 1), 2);
        assert_eq!(effective_verbosity(0, None, 3), 3);
        assert_eq!(effective_verbosity(0, Some(1), 3), 1);
        assert_eq!(effective_verbosity(9, None, 0), 4);
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "checkup", "run", "-c", "suites/", "-f", "nginx", "-t", "10", "-o", "junit=out.xml",
            "-vvv",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source.config, Some(PathBuf::from("suites/")));
        assert_eq!(args.source.filter.as_deref(), Some("nginx"));
        assert_eq!(args.source.timeout, Some(10));
        assert_eq!(args.output.as_deref(), Some("junit=out.xml"));
        assert_eq!(args.verbose, 3);
    }

    #[test]
    fn test_cli_requires_a_source() {
        assert!(Cli::try_parse_from(["checkup", "run"]).is_err());
        assert!(Cli::try_parse_from(["checkup", "run", "-C", "https://example.com/s.yaml"]).is_ok());
        assert!(Cli::try_parse_from(["checkup", "run", "-c", "a.yaml", "--verbosity", "7"]).is_err());
    }

    #[tokio::test]
    async fn test_sample_suite_loads() {
        let doc = parse_document(SAMPLE_SUITE, "sample.yaml").unwrap();
        let ctx = EngineContext::default_platform("bash");
        let suite = Suite::load(doc, &LoadOptions::default(), ctx.runner())
            .await
            .unwrap();
        assert_eq!(suite.name, "Sample Tests");
        // Two list items + two generated items replace their templates.
        assert!(suite.visible_count() >= 12);
        assert!(suite.hook("scratch-dir").is_some());
        assert!(suite.hook("scratch-cleanup").is_some());
    }

    #[tokio::test]
    async fn test_load_suites_reports_missing_path() {
        let settings = settings::load_settings_from(std::path::Path::new("/nonexistent")).unwrap();
        let ctx = EngineContext::default_platform("bash");
        let source = SourceArgs {
            config: Some(PathBuf::from("/nonexistent/suite.yaml")),
            remote: None,
            filter: None,
            workdir: None,
            timeout: None,
        };
        assert!(load_suites(&source, &settings, &ctx).await.is_err());
    }
}
