use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::data::{CheckFailure, ExecutionError, PerformanceReport, ResponseTimes, TestRunner};

/// Exit code k6 uses when thresholds were crossed but the run completed
const THRESHOLDS_CROSSED_EXIT: i32 = 99;
const STDERR_EXCERPT_CHARS: usize = 500;
const SUMMARY_FILE: &str = "k6_summary.json";

/// Runs scripts with the k6 binary and reads its summary export.
///
/// The child is killed when the returned future is dropped, so callers bound
/// the run with `tokio::time::timeout`.
pub struct K6Runner {
    binary: String,
}

impl K6Runner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn summary_path(script_path: &Path) -> PathBuf {
        script_path
            .parent()
            .map(|dir| dir.join(SUMMARY_FILE))
            .unwrap_or_else(|| PathBuf::from(SUMMARY_FILE))
    }
}

#[async_trait]
impl TestRunner for K6Runner {
    async fn execute(
        &self,
        script_path: &Path,
        virtual_users: u32,
        duration: Duration,
    ) -> Result<PerformanceReport, ExecutionError> {
        let summary_path = Self::summary_path(script_path);
        if summary_path.exists() {
            fs::remove_file(&summary_path)
                .map_err(|e| ExecutionError::Report(format!("{}: {}", summary_path.display(), e)))?;
        }

        debug!(binary = %self.binary, script = %script_path.display(), "spawning k6");
        let output = Command::new(&self.binary)
            .arg("run")
            .arg("--vus")
            .arg(virtual_users.to_string())
            .arg("--duration")
            .arg(format!("{}s", duration.as_secs().max(1)))
            .arg("--summary-export")
            .arg(&summary_path)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExecutionError::Spawn(format!("{}: {}", self.binary, e)))?;

        let code = output.status.code();
        let thresholds_passed = output.status.success();
        if !thresholds_passed && code == Some(THRESHOLDS_CROSSED_EXIT) {
            warn!("k6 thresholds were crossed");
        }

        if !summary_path.is_file() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecutionError::Failed {
                code,
                stderr: tail(&stderr, STDERR_EXCERPT_CHARS),
            });
        }
        if !thresholds_passed && code != Some(THRESHOLDS_CROSSED_EXIT) {
            warn!(?code, "k6 exited with an error but wrote a summary");
        }

        let content = fs::read_to_string(&summary_path)
            .map_err(|e| ExecutionError::Report(format!("{}: {}", summary_path.display(), e)))?;
        let mut report = parse_summary(&content)?;
        report.virtual_users = virtual_users;
        report.duration_secs = duration.as_secs();
        report.thresholds_passed = thresholds_passed;

        info!(
            requests = report.http_requests,
            checks_failed = report.checks_failed,
            "k6 run finished"
        );
        Ok(report)
    }
}

/// Parse k6's `--summary-export` JSON. Groups and checks may be keyed
/// objects (older exports) or arrays.
pub fn parse_summary(content: &str) -> Result<PerformanceReport, ExecutionError> {
    let summary: Value =
        serde_json::from_str(content).map_err(|e| ExecutionError::Report(e.to_string()))?;
    let metrics = summary
        .get("metrics")
        .ok_or_else(|| ExecutionError::Report("summary has no metrics".to_string()))?;

    let metric = |name: &str, field: &str| -> f64 {
        metrics
            .get(name)
            .and_then(|m| m.get(field))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };

    let response_times = ResponseTimes {
        min: metric("http_req_duration", "min"),
        max: metric("http_req_duration", "max"),
        avg: metric("http_req_duration", "avg"),
        med: metric("http_req_duration", "med"),
        p90: metric("http_req_duration", "p(90)"),
        p95: metric("http_req_duration", "p(95)"),
    };

    let mut errors = Vec::new();
    if let Some(root) = summary.get("root_group") {
        collect_failures(root, &mut errors);
    }

    Ok(PerformanceReport {
        response_times,
        checks_passed: metric("checks", "passes") as u64,
        checks_failed: metric("checks", "fails") as u64,
        http_requests: metric("http_reqs", "count") as u64,
        http_failure_rate: metric("http_req_failed", "value"),
        throughput: metric("http_reqs", "rate"),
        iterations: metric("iterations", "count") as u64,
        errors,
        ..PerformanceReport::default()
    })
}

fn children(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn collect_failures(group: &Value, out: &mut Vec<CheckFailure>) {
    for check in children(group.get("checks")) {
        let fails = check.get("fails").and_then(Value::as_u64).unwrap_or(0);
        if fails == 0 {
            continue;
        }
        let text = |field: &str| {
            check
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        out.push(CheckFailure {
            name: text("name"),
            path: text("path"),
            passes: check.get("passes").and_then(Value::as_u64).unwrap_or(0),
            fails,
        });
    }
    for child in children(group.get("groups")) {
        collect_failures(child, out);
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = r#"{
        "root_group": {
            "name": "", "path": "", "id": "d41d8cd98f00b204e9800998ecf8427e",
            "groups": {
                "1. Create User (POST /users/)": {
                    "name": "1. Create User (POST /users/)",
                    "path": "::1. Create User (POST /users/)",
                    "groups": {},
                    "checks": {
                        "User created 200/201": {
                            "name": "User created 200/201",
                            "path": "::1. Create User (POST /users/)::User created 200/201",
                            "passes": 2, "fails": 1
                        },
                        "Response has user_id": {
                            "name": "Response has user_id",
                            "path": "::1. Create User (POST /users/)::Response has user_id",
                            "passes": 3, "fails": 0
                        }
                    }
                }
            },
            "checks": {}
        },
        "metrics": {
            "http_req_duration": {"avg": 12.5, "min": 3.1, "med": 10.0, "max": 40.2, "p(90)": 30.0, "p(95)": 35.5},
            "http_reqs": {"count": 9, "rate": 2.25},
            "iterations": {"count": 3, "rate": 0.75},
            "checks": {"passes": 5, "fails": 1, "value": 0.83},
            "http_req_failed": {"passes": 1, "fails": 8, "value": 0.111}
        }
    }"#;

    #[test]
    fn parses_metrics_and_nested_failures() {
        let report = parse_summary(SUMMARY).unwrap();
        assert_eq!(report.response_times.p95, 35.5);
        assert_eq!(report.response_times.med, 10.0);
        assert_eq!(report.http_requests, 9);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.checks_passed, 5);
        assert_eq!(report.checks_failed, 1);
        assert!((report.throughput - 2.25).abs() < f64::EPSILON);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "User created 200/201");
        assert_eq!(report.errors[0].passes, 2);
    }

    #[test]
    fn array_shaped_groups_are_walked() {
        let content = r#"{
            "root_group": {"groups": [{"checks": [{"name": "ok", "path": "::g::ok", "passes": 0, "fails": 4}]}]},
            "metrics": {}
        }"#;
        let report = parse_summary(content).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].fails, 4);
        assert_eq!(report.http_requests, 0);
    }

    #[test]
    fn summary_without_metrics_is_rejected() {
        assert!(matches!(
            parse_summary(r#"{"root_group": {}}"#),
            Err(ExecutionError::Report(_))
        ));
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail(" ab ", 3), "ab");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("merged_k6_test.js");
        fs::write(&script, "export default function () {}").unwrap();

        let runner = K6Runner::new("/nonexistent/k6-binary");
        let err = runner
            .execute(&script, 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn(_)));
    }
}
