use serde::{Deserialize, Serialize};

/// Response-time distribution in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimes {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A check that failed at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub name: String,
    pub path: String,
    pub passes: u64,
    pub fails: u64,
}

/// Result of one load-test execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub virtual_users: u32,
    pub duration_secs: u64,
    pub response_times: ResponseTimes,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub http_requests: u64,
    /// Fraction of HTTP requests k6 counted as failed.
    pub http_failure_rate: f64,
    /// Requests per second.
    pub throughput: f64,
    pub iterations: u64,
    pub errors: Vec<CheckFailure>,
    pub thresholds_passed: bool,
}

impl PerformanceReport {
    /// Share of passing checks, or of non-failed requests when the script
    /// has no checks.
    pub fn success_rate(&self) -> f64 {
        let total = self.checks_passed + self.checks_failed;
        if total > 0 {
            self.checks_passed as f64 / total as f64
        } else {
            1.0 - self.http_failure_rate
        }
    }

    pub fn to_markdown(&self) -> String {
        let rt = &self.response_times;
        let mut out = String::new();
        out.push_str("## k6 Run Results\n\n");
        out.push_str(&format!(
            "Ran with {} virtual user(s) for {}s.\n\n",
            self.virtual_users, self.duration_secs
        ));

        out.push_str("### Response Times (ms)\n\n");
        out.push_str("| min | max | avg | med | p90 | p95 |\n");
        out.push_str("|----:|----:|----:|----:|----:|----:|\n");
        out.push_str(&format!(
            "| {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |\n\n",
            rt.min, rt.max, rt.avg, rt.med, rt.p90, rt.p95
        ));

        out.push_str("### Success Rate\n\n");
        out.push_str(&format!(
            "- Checks: {} passed, {} failed ({:.1}% success)\n",
            self.checks_passed,
            self.checks_failed,
            self.success_rate() * 100.0
        ));
        out.push_str(&format!(
            "- HTTP request failure rate: {:.1}%\n",
            self.http_failure_rate * 100.0
        ));
        out.push_str(&format!(
            "- Thresholds: {}\n\n",
            if self.thresholds_passed { "passed" } else { "crossed" }
        ));

        out.push_str("### Error Analysis\n\n");
        if self.errors.is_empty() {
            out.push_str("No failing checks.\n\n");
        } else {
            for failure in &self.errors {
                out.push_str(&format!(
                    "- `{}` ({}): {} of {} failed\n",
                    failure.name,
                    failure.path,
                    failure.fails,
                    failure.passes + failure.fails
                ));
            }
            out.push('\n');
        }

        out.push_str("### Throughput\n\n");
        out.push_str(&format!(
            "- {} request(s), {:.2} req/s\n- {} iteration(s)\n",
            self.http_requests, self.throughput, self.iterations
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_prefers_checks() {
        let report = PerformanceReport {
            checks_passed: 3,
            checks_failed: 1,
            http_failure_rate: 0.5,
            ..Default::default()
        };
        assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_falls_back_to_http_failures() {
        let report = PerformanceReport {
            http_failure_rate: 0.25,
            ..Default::default()
        };
        assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn markdown_lists_failing_checks() {
        let report = PerformanceReport {
            errors: vec![CheckFailure {
                name: "User created 200/201".into(),
                path: "::1. Create User::User created 200/201".into(),
                passes: 2,
                fails: 1,
            }],
            ..Default::default()
        };
        let md = report.to_markdown();
        assert!(md.contains("### Response Times (ms)"));
        assert!(md.contains("`User created 200/201`"));
        assert!(md.contains("1 of 3 failed"));
    }
}
