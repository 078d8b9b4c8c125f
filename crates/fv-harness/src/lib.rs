#![forbid(unsafe_code)]

//! Fixture-driven self-test harness.
//!
//! A testcase directory holds an `index.json` (array of file names) and
//! one JSON file per case. Each case carries literal FlowMD input plus an
//! expectation record of one of four kinds: `parser` (counts,
//! orientation, warning substrings), `highlight` (downstream node subset
//! and exact edge count), `csv` (row count of the edge-list export), and
//! `search` (query resolves to a specific node id). The runner produces a
//! JSON report suitable for writing to disk.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fv_core::FlowGraph;
use fv_highlight::HighlightEngine;
use fv_parser::parse;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Failure to load fixtures or persist the report. Expectation
/// mismatches are not errors; they land in the report as failed cases.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One fixture: literal FlowMD input plus an expectation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub description: String,
    pub input: String,
    #[serde(flatten)]
    pub kind: TestKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestKind {
    Parser {
        expected: ParserExpectations,
    },
    Highlight {
        target: String,
        expected: HighlightExpectations,
    },
    Csv {
        expected: CsvExpectations,
    },
    Search {
        query: String,
        expected: SearchExpectations,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParserExpectations {
    pub node_count: usize,
    pub edge_count: usize,
    pub orientation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings_contains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HighlightExpectations {
    /// Must be a subset of the downstream node set.
    pub highlighted_nodes: Vec<String>,
    /// Exact count of traversed edge keys.
    pub edge_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvExpectations {
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchExpectations {
    pub id: String,
}

/// Pass/fail record for one case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseOutcome {
    pub id: String,
    pub description: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate selftest report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: String,
    pub passed: usize,
    pub total: usize,
    pub results: Vec<CaseOutcome>,
}

impl Report {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Render the edge list the way the viewer's CSV export does: a
/// `source,target,line` header plus one row per edge. The row count is
/// therefore always `edge count + 1`.
#[must_use]
pub fn edges_csv(graph: &FlowGraph) -> String {
    let mut out = String::from("source,target,line\n");
    for edge in &graph.edges {
        out.push_str(&edge.source);
        out.push(',');
        out.push_str(&edge.target);
        out.push(',');
        out.push_str(&edge.line.to_string());
        out.push('\n');
    }
    out
}

/// Run a single case against the engine.
#[must_use]
pub fn run_case(case: &TestCase) -> CaseOutcome {
    let graph = match parse(&case.input) {
        Ok(graph) => graph,
        Err(error) => return failure(case, error.to_string()),
    };

    match &case.kind {
        TestKind::Parser { expected } => check_parser(case, &graph, expected),
        TestKind::Highlight { target, expected } => {
            let engine = HighlightEngine::new(&graph);
            let result = engine.downstream(target);
            let reached: BTreeSet<&str> = result.nodes.iter().map(String::as_str).collect();
            let covered = expected
                .highlighted_nodes
                .iter()
                .all(|node| reached.contains(node.as_str()));
            if covered && result.edges.len() == expected.edge_count {
                success(case)
            } else {
                failure(case, "Highlight expectations failed")
            }
        }
        TestKind::Csv { expected } => {
            if edges_csv(&graph).lines().count() == expected.rows {
                success(case)
            } else {
                failure(case, "CSV row expectation failed")
            }
        }
        TestKind::Search { query, expected } => match graph.find_node(query) {
            Some(node) if node.id == expected.id => success(case),
            _ => failure(case, "Search expectation failed"),
        },
    }
}

fn check_parser(case: &TestCase, graph: &FlowGraph, expected: &ParserExpectations) -> CaseOutcome {
    if graph.node_count() != expected.node_count
        || graph.edge_count() != expected.edge_count
        || graph.meta.orientation != expected.orientation
    {
        return failure(case, "Parser expectations failed");
    }

    for needle in &expected.warnings_contains {
        let found = graph
            .meta
            .warnings
            .iter()
            .any(|warning| warning.message.contains(needle));
        if !found {
            return failure(case, format!("Expected warning '{needle}' not found"));
        }
    }

    success(case)
}

fn success(case: &TestCase) -> CaseOutcome {
    CaseOutcome {
        id: case.id.clone(),
        description: case.description.clone(),
        success: true,
        message: None,
    }
}

fn failure(case: &TestCase, message: impl Into<String>) -> CaseOutcome {
    CaseOutcome {
        id: case.id.clone(),
        description: case.description.clone(),
        success: false,
        message: Some(message.into()),
    }
}

/// Run every case listed by `index.json` in `dir`, in index order.
///
/// # Errors
///
/// Fails only on unreadable or undecodable fixture files; failing
/// expectations are reported, not raised.
pub fn run_directory(dir: &Path) -> Result<Report, HarnessError> {
    let names: Vec<String> = load_json(&dir.join("index.json"))?;
    info!(cases = names.len(), "starting selftest");

    let mut results = Vec::with_capacity(names.len());
    for name in &names {
        let case: TestCase = load_json(&dir.join(name))?;
        let outcome = run_case(&case);
        debug!(id = %outcome.id, success = outcome.success, "case finished");
        results.push(outcome);
    }

    let passed = results.iter().filter(|outcome| outcome.success).count();
    info!(passed, total = results.len(), "selftest finished");

    Ok(Report {
        generated_at: timestamp_utc(),
        passed,
        total: results.len(),
        results,
    })
}

/// Write the report as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Propagates filesystem and encoding failures.
pub fn write_report(report: &Report, path: &Path) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| HarnessError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let body = serde_json::to_string_pretty(report).map_err(|source| HarnessError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, HarnessError> {
    let body = fs::read_to_string(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| HarnessError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn timestamp_utc() -> String {
    time::OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .ok()
        .and_then(|stamp| {
            stamp
                .format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(input: &str, kind: TestKind) -> TestCase {
        TestCase {
            id: "case".to_string(),
            description: "inline case".to_string(),
            input: input.to_string(),
            kind,
        }
    }

    #[test]
    fn parser_case_checks_counts_orientation_and_warnings() {
        let kind = TestKind::Parser {
            expected: ParserExpectations {
                node_count: 2,
                edge_count: 2,
                orientation: "TB".to_string(),
                warnings_contains: vec!["Cycle detected".to_string()],
            },
        };
        let outcome = run_case(&case("graph TB\nA-->B\nB-->A", kind));
        assert!(outcome.success, "{:?}", outcome.message);
    }

    #[test]
    fn parser_case_reports_missing_warning_substring() {
        let kind = TestKind::Parser {
            expected: ParserExpectations {
                node_count: 2,
                edge_count: 1,
                orientation: "TB".to_string(),
                warnings_contains: vec!["Cycle detected".to_string()],
            },
        };
        let outcome = run_case(&case("graph TB\nA-->B", kind));
        assert!(!outcome.success);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Expected warning 'Cycle detected' not found")
        );
    }

    #[test]
    fn highlight_case_requires_subset_and_exact_edge_count() {
        let kind = TestKind::Highlight {
            target: "B".to_string(),
            expected: HighlightExpectations {
                highlighted_nodes: vec!["B".to_string(), "C".to_string()],
                edge_count: 2,
            },
        };
        let outcome = run_case(&case("graph LR\nA-->B\nB-->C\nC-->D", kind));
        assert!(outcome.success, "{:?}", outcome.message);
    }

    #[test]
    fn csv_case_counts_header_plus_edges() {
        let kind = TestKind::Csv {
            expected: CsvExpectations { rows: 4 },
        };
        let outcome = run_case(&case("graph TB\nA-->B\nA-->C\nB-->C", kind));
        assert!(outcome.success, "{:?}", outcome.message);
    }

    #[test]
    fn search_case_resolves_by_label_substring() {
        let kind = TestKind::Search {
            query: "Payments".to_string(),
            expected: SearchExpectations {
                id: "svc1".to_string(),
            },
        };
        let outcome = run_case(&case("graph TB\nsvc1[Payments Service]\nsvc2[Ledger]", kind));
        assert!(outcome.success, "{:?}", outcome.message);
    }

    #[test]
    fn fatal_parse_error_fails_the_case_with_its_message() {
        let kind = TestKind::Parser {
            expected: ParserExpectations {
                node_count: 0,
                edge_count: 0,
                orientation: "TB".to_string(),
                warnings_contains: Vec::new(),
            },
        };
        let outcome = run_case(&case("no declaration here", kind));
        assert!(!outcome.success);
        assert!(
            outcome
                .message
                .as_deref()
                .is_some_and(|message| message.contains("graph/flowchart declaration"))
        );
    }

    #[test]
    fn edges_csv_row_count_tracks_edge_count() {
        let graph = parse("graph TB\nA-->B\nB-->C").expect("parse");
        let csv = edges_csv(&graph);
        assert_eq!(csv.lines().count(), graph.edge_count() + 1);
        assert!(csv.starts_with("source,target,line\n"));
        assert!(csv.contains("A,B,2"));
    }

    #[test]
    fn testcase_json_uses_the_fixture_format() {
        let body = r#"{
            "id": "t1",
            "description": "labels",
            "type": "parser",
            "input": "graph TD\nA-->B",
            "expected": {"nodeCount": 2, "edgeCount": 1, "orientation": "TD"}
        }"#;
        let case: TestCase = serde_json::from_str(body).expect("decode fixture");
        assert_eq!(
            case.kind,
            TestKind::Parser {
                expected: ParserExpectations {
                    node_count: 2,
                    edge_count: 1,
                    orientation: "TD".to_string(),
                    warnings_contains: Vec::new(),
                },
            }
        );
        assert!(run_case(&case).success);
    }

    #[test]
    fn run_directory_aggregates_and_report_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::write(
            root.join("index.json"),
            r#"["pass.json", "fail.json"]"#,
        )
        .expect("write index");
        std::fs::write(
            root.join("pass.json"),
            r#"{"id": "pass", "description": "ok", "type": "csv",
                "input": "graph TB\nA-->B", "expected": {"rows": 2}}"#,
        )
        .expect("write pass");
        std::fs::write(
            root.join("fail.json"),
            r#"{"id": "fail", "description": "bad rows", "type": "csv",
                "input": "graph TB\nA-->B", "expected": {"rows": 9}}"#,
        )
        .expect("write fail");

        let report = run_directory(root).expect("run directory");
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert!(!report.all_passed());
        assert_eq!(report.results[0].id, "pass");
        assert_eq!(report.results[1].id, "fail");

        let report_path = root.join("logs").join("report.json");
        write_report(&report, &report_path).expect("write report");
        let body = std::fs::read_to_string(&report_path).expect("read report");
        assert!(body.contains("\"generatedAt\""));
        let decoded: Report = serde_json::from_str(&body).expect("decode report");
        assert_eq!(decoded, report);
    }

    #[test]
    fn missing_fixture_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.json"), r#"["ghost.json"]"#).expect("write index");
        let error = run_directory(dir.path()).expect_err("ghost fixture");
        assert!(matches!(error, HarnessError::Io { .. }));
    }
}
