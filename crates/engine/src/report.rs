//! Report files – JSON results document and JUnit XML.

use crate::score::format_duration;
use crate::suite::Suite;
use crate::types::{ScenarioInstance, SuiteSummary};
use chrono::Local;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report spec must look like <format>=<path>, got '{0}'")]
    Malformed(String),

    #[error("unknown report format '{0}' (expected json or junit)")]
    UnknownFormat(String),

    #[error("cannot encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Junit,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "junit" => Ok(ReportFormat::Junit),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Parsed `<format>=<path>` output option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    pub format: ReportFormat,
    pub path: PathBuf,
}

impl FromStr for ReportSpec {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (format, path) = s
            .split_once('=')
            .filter(|(_, p)| !p.trim().is_empty())
            .ok_or_else(|| ReportError::Malformed(s.to_string()))?;
        Ok(ReportSpec {
            format: format.parse()?,
            path: PathBuf::from(path.trim()),
        })
    }
}

impl ReportSpec {
    /// Output path for the `index`-th suite (0-based) of a run: the first
    /// keeps `path`, later ones get `-2`, `-3`, … before the extension.
    pub fn path_for(&self, index: usize) -> PathBuf {
        if index == 0 {
            return self.path.clone();
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}-{}.{}", stem, index + 1, ext.to_string_lossy()),
            None => format!("{}-{}", stem, index + 1),
        };
        self.path.with_file_name(name)
    }

    pub fn render(
        &self,
        suite: &Suite,
        summary: &SuiteSummary,
        verbosity: u8,
    ) -> Result<String, ReportError> {
        match self.format {
            ReportFormat::Json => render_json(suite, summary, verbosity),
            ReportFormat::Junit => Ok(render_junit(suite, summary, verbosity)),
        }
    }

    /// Render and write the report for the `index`-th suite.
    pub fn write(
        &self,
        index: usize,
        suite: &Suite,
        summary: &SuiteSummary,
        verbosity: u8,
    ) -> Result<PathBuf, ReportError> {
        let body = self.render(suite, summary, verbosity)?;
        let path = self.path_for(index);
        write_file(&path, &body)?;
        Ok(path)
    }
}

fn write_file(path: &Path, body: &str) -> Result<(), ReportError> {
    std::fs::write(path, body).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    test_name: &'a str,
    tests: Vec<JsonTest<'a>>,
    summary: JsonSummary,
}

#[derive(Debug, Serialize)]
struct JsonTest<'a> {
    name: &'a str,
    status: bool,
    duration: String,
    stdout: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonSummary {
    success: usize,
    failed: usize,
    rating: f64,
    duration: String,
}

/// JSON carries stdout for failures above verbosity 1 and for everything
/// above verbosity 2.
fn json_stdout(instance: &ScenarioInstance, verbosity: u8) -> &str {
    if (verbosity > 1 && instance.is_failed()) || verbosity > 2 {
        instance.output()
    } else {
        ""
    }
}

pub fn render_json(
    suite: &Suite,
    summary: &SuiteSummary,
    verbosity: u8,
) -> Result<String, ReportError> {
    let tests = suite
        .instances()
        .iter()
        .filter(|i| i.is_visible())
        .map(|i| JsonTest {
            name: i.label(),
            status: i.is_success(),
            duration: format_duration(i.duration),
            stdout: json_stdout(i, verbosity),
        })
        .collect();

    let report = JsonReport {
        test_name: &suite.name,
        tests,
        summary: JsonSummary {
            success: summary.successful,
            failed: summary.failed,
            rating: summary.score,
            duration: format_duration(summary.duration),
        },
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

// ---------------------------------------------------------------------------
// JUnit XML
// ---------------------------------------------------------------------------

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters outright
            c if (c as u32) < 0x20 && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }
    out
}

fn seconds(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

pub fn render_junit(suite: &Suite, summary: &SuiteSummary, verbosity: u8) -> String {
    let timestamp = suite
        .started_at
        .unwrap_or_else(Local::now)
        .format("%Y-%m-%dT%H:%M:%S");
    let name = xml_escape(&suite.name);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(xml, "<testsuites time=\"{}\">", seconds(summary.duration));
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{}\" timestamp=\"{}\">",
        name,
        summary.total,
        summary.failed,
        summary.skipped,
        seconds(summary.duration),
        timestamp
    );

    for instance in suite.instances().iter().filter(|i| i.is_visible()) {
        let open = format!(
            "    <testcase classname=\"{}\" name=\"{}\" time=\"{}\"",
            name,
            xml_escape(instance.label()),
            seconds(instance.duration)
        );
        if instance.is_success() {
            let _ = writeln!(xml, "{}/>", open);
        } else if instance.is_skipped() {
            let reason = instance
                .skip_reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            let _ = writeln!(xml, "{}>", open);
            let _ = writeln!(xml, "      <skipped message=\"{}\"/>", xml_escape(&reason));
            let _ = writeln!(xml, "    </testcase>");
        } else {
            let text = if verbosity >= 1 {
                xml_escape(instance.output())
            } else {
                String::new()
            };
            let _ = writeln!(xml, "{}>", open);
            let _ = writeln!(xml, "      <failure type=\"failure\">{}</failure>", text);
            let _ = writeln!(xml, "    </testcase>");
        }
    }

    xml.push_str("  </testsuite>\n</testsuites>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::source::parse_document;
    use crate::suite::LoadOptions;
    use crate::test_support::RecordingRunner;

    const SUITE: &str = r#"
name: Report <Suite>
cases:
  - case: passes
    script: ok
  - case: fails & "quotes"
    script: bad
  - case: skipped one
    script: x
    skip: true
  - script: silent
"#;

    async fn finished() -> (Suite, SuiteSummary) {
        let runner = RecordingRunner::new().respond("bad", 1, "broken <output>");
        let doc = parse_document(SUITE, "report.yaml").unwrap();
        let mut suite = Suite::load(doc, &LoadOptions::default(), &runner)
            .await
            .unwrap();
        let summary = Scheduler::new(&runner).run(&mut suite, |_, _| {}).await;
        (suite, summary)
    }

    #[test]
    fn test_parse_report_spec() {
        let spec: ReportSpec = "json=out/report.json".parse().unwrap();
        assert_eq!(spec.format, ReportFormat::Json);
        assert_eq!(spec.path, PathBuf::from("out/report.json"));

        let spec: ReportSpec = "JUnit=results.xml".parse().unwrap();
        assert_eq!(spec.format, ReportFormat::Junit);

        assert!(matches!(
            "xml=out.xml".parse::<ReportSpec>(),
            Err(ReportError::UnknownFormat(_))
        ));
        assert!(matches!(
            "report.json".parse::<ReportSpec>(),
            Err(ReportError::Malformed(_))
        ));
        assert!(matches!(
            "json=".parse::<ReportSpec>(),
            Err(ReportError::Malformed(_))
        ));
    }

    #[test]
    fn test_path_for_later_suites() {
        let spec: ReportSpec = "json=out/report.json".parse().unwrap();
        assert_eq!(spec.path_for(0), PathBuf::from("out/report.json"));
        assert_eq!(spec.path_for(1), PathBuf::from("out/report-2.json"));
        let bare: ReportSpec = "junit=results".parse().unwrap();
        assert_eq!(bare.path_for(2), PathBuf::from("results-3"));
    }

    #[tokio::test]
    async fn test_json_report_shape() {
        let (suite, summary) = finished().await;
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&suite, &summary, 0).unwrap()).unwrap();
        assert_eq!(json["testName"], "Report <Suite>");
        let tests = json["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 3);
        assert_eq!(tests[0]["name"], "passes");
        assert_eq!(tests[0]["status"], true);
        assert_eq!(tests[1]["status"], false);
        assert_eq!(tests[1]["stdout"], "");
        assert_eq!(json["summary"]["success"], 1);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["summary"]["rating"], 50.0);
    }

    #[tokio::test]
    async fn test_json_stdout_by_verbosity() {
        let (suite, summary) = finished().await;
        let at = |v: u8| -> serde_json::Value {
            serde_json::from_str(&render_json(&suite, &summary, v).unwrap()).unwrap()
        };
        assert_eq!(at(1)["tests"][1]["stdout"], "");
        assert_eq!(at(2)["tests"][1]["stdout"], "broken <output>");
        assert_eq!(at(2)["tests"][0]["stdout"], "");
        assert_eq!(at(3)["tests"][1]["stdout"], "broken <output>");
    }

    #[tokio::test]
    async fn test_junit_report() {
        let (suite, summary) = finished().await;
        let xml = render_junit(&suite, &summary, 1);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("name=\"Report &lt;Suite&gt;\" tests=\"3\" failures=\"1\""));
        assert!(xml.contains("skipped=\"1\""));
        assert!(xml.contains("name=\"fails &amp; &quot;quotes&quot;\""));
        assert!(xml.contains("<failure type=\"failure\">broken &lt;output&gt;</failure>"));
        assert!(xml.contains("<skipped message=\"skip=true setting\"/>"));
        assert_eq!(xml.matches("<testcase ").count(), 3);

        let quiet = render_junit(&suite, &summary, 0);
        assert!(quiet.contains("<failure type=\"failure\"></failure>"));
    }

    #[tokio::test]
    async fn test_write_report_file() {
        let (suite, summary) = finished().await;
        let dir = tempfile::tempdir().unwrap();
        let spec = ReportSpec {
            format: ReportFormat::Junit,
            path: dir.path().join("junit.xml"),
        };
        let written = spec.write(1, &suite, &summary, 0).unwrap();
        assert_eq!(written, dir.path().join("junit-2.xml"));
        assert!(std::fs::read_to_string(written).unwrap().contains("<testsuites"));

        let unwritable = ReportSpec {
            format: ReportFormat::Json,
            path: dir.path().join("missing/dir/report.json"),
        };
        assert!(matches!(
            unwritable.write(0, &suite, &summary, 0),
            Err(ReportError::Write { .. })
        ));
    }

    #[test]
    fn test_xml_escape_drops_control_chars() {
        assert_eq!(xml_escape("a\u{1b}[31mb\n"), "a[31mb\n");
    }
}
