//! Console output for a run

use async_trait::async_trait;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use parking_lot::Mutex;
use spectest_core::target::logs_for_request;
use spectest_core::{
    LogStream, Plugin, PluginContext, Result, RunReport, SkippedTest, TargetProcess, TestCase,
    TestResult,
};
use std::sync::Arc;
use std::time::Instant;

/// Min, average, 95th percentile and max latency in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub min: u64,
    pub avg: f64,
    pub p95: u64,
    pub max: u64,
}

impl LatencySummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Option<Self> {
        let mut latencies: Vec<u64> = results.into_iter().map(|r| r.latency).collect();
        if latencies.is_empty() {
            return None;
        }
        latencies.sort_unstable();

        let n = latencies.len();
        // Nearest-rank percentile
        let rank = ((n as f64) * 0.95).ceil() as usize;
        Some(Self {
            min: latencies[0],
            avg: latencies.iter().sum::<u64>() as f64 / n as f64,
            p95: latencies[rank.clamp(1, n) - 1],
            max: latencies[n - 1],
        })
    }
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min {}ms; avg {:.2}ms; p95 {}ms; max {}ms",
            self.min, self.avg, self.p95, self.max
        )
    }
}

fn icon(result: &TestResult) -> &'static str {
    if result.timed_out {
        "⏰"
    } else if result.passed {
        "✓"
    } else {
        "✗"
    }
}

/// One-line verdict printed as each test finishes
pub fn result_line(result: &TestResult) -> String {
    let line = format!("[{}] {} ({}ms)", icon(result), result.test_name, result.latency);
    if result.passed {
        line.green().to_string()
    } else {
        line.red().to_string()
    }
}

/// Results table for one suite
pub fn suite_table(results: &[&TestResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Test", "Status", "Latency", "Details"]);

    for result in results {
        let status = if result.timed_out {
            Cell::new("TIMEOUT").fg(Color::Yellow)
        } else if result.passed {
            Cell::new("PASS").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        let details = result
            .error
            .clone()
            .or_else(|| (!result.warnings.is_empty()).then(|| result.warnings.join("; ")))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&result.test_name),
            status,
            Cell::new(format!("{}ms", result.latency)),
            Cell::new(details),
        ]);
    }
    table
}

/// Skipped tests grouped by suite, with the reason for each
pub fn skipped_lines(skipped: &[SkippedTest]) -> Vec<String> {
    if skipped.is_empty() {
        return Vec::new();
    }
    let mut groups: Vec<(&str, Vec<&SkippedTest>)> = Vec::new();
    for test in skipped {
        let suite = test.suite_name.as_deref().unwrap_or("unknown");
        match groups.iter_mut().find(|(name, _)| *name == suite) {
            Some((_, items)) => items.push(test),
            None => groups.push((suite, vec![test])),
        }
    }

    let mut lines = vec![format!("⏭  Skipped {} tests:", skipped.len())];
    for (suite, tests) in groups {
        lines.push(format!("  Suite: {suite}"));
        lines.extend(tests.iter().map(|t| format!("    - {} ({})", t.name, t.reason)));
    }
    lines
}

/// Latency summary and the snapshot notice, when there is something to say
pub fn footer_lines(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(latency) = LatencySummary::from_results(&report.results) {
        lines.push(format!("⏱  Latency: {latency}"));
    }
    if let Some(path) = &report.snapshot_saved {
        lines.push(format!("📸 Snapshot saved to {}", path.display()));
    }
    lines
}

struct ReporterState {
    base_url: String,
    verbose: bool,
    target: Option<Arc<dyn TargetProcess>>,
    started: Mutex<Option<Instant>>,
}

impl ReporterState {
    fn print_server_logs(&self, result: &TestResult) {
        let Some(target) = &self.target else {
            return;
        };
        let logs = target.logs();
        let matched = logs_for_request(&logs, result.request_id.as_deref());
        if matched.is_empty() {
            if let Some(id) = &result.request_id {
                println!("  No server logs found for request ID: {id}");
            }
            return;
        }
        for entry in matched {
            let line = format!("  {}: {}", entry.timestamp.to_rfc3339(), entry.message);
            match entry.stream {
                LogStream::Stderr => println!("{}", line.red()),
                LogStream::Stdout => println!("{line}"),
            }
        }
    }

    fn test_end(&self, result: &TestResult) {
        println!("{}", result_line(result));
        if !result.passed || self.verbose {
            if let Some(error) = &result.error {
                println!("{}", format!("  Test failure reason: {error}").red());
            }
            for warning in &result.warnings {
                println!("{}", format!("  Warning: {warning}").yellow());
            }
            self.print_server_logs(result);
        }
    }

    fn run_end(&self, report: &RunReport) {
        println!("\n{}", "📊 Test Summary:".bold());
        for (suite, results) in report.by_suite() {
            println!("\n🗂  Suite: {}", suite.bold());
            println!("{}", suite_table(&results));
        }

        for line in skipped_lines(&report.skipped) {
            println!("{}", line.dimmed());
        }

        println!("{}", "=".repeat(50));
        if let Some(started) = *self.started.lock() {
            println!(
                "⏱  Testing time: {:.2}s",
                started.elapsed().as_secs_f64()
            );
        }
        for line in footer_lines(report) {
            println!("{line}");
        }

        let (passed, total) = (report.passed(), report.total());
        if report.success() {
            println!("{}", format!("✓ {passed}/{total} tests passed!").green().bold());
        } else {
            println!("{}", format!("⚠ {passed}/{total} tests passed").yellow().bold());
        }
    }
}

/// Built-in plugin printing per-test verdicts and the final summary
pub struct ConsoleReporter {
    base_url: String,
    verbose: bool,
    target: Option<Arc<dyn TargetProcess>>,
}

impl ConsoleReporter {
    pub fn new(base_url: impl Into<String>, verbose: bool) -> Self {
        Self {
            base_url: base_url.into(),
            verbose,
            target: None,
        }
    }

    /// Print captured server output next to failing tests.
    pub fn with_target(mut self, target: Arc<dyn TargetProcess>) -> Self {
        self.target = Some(target);
        self
    }
}

#[async_trait]
impl Plugin for ConsoleReporter {
    fn name(&self) -> &str {
        "console-reporter"
    }

    async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
        let shared = Arc::new(ReporterState {
            base_url: self.base_url.clone(),
            verbose: self.verbose,
            target: self.target.clone(),
            started: Mutex::new(None),
        });

        let state = shared.clone();
        ctx.on_run_start(move || -> Result<()> {
            println!("🚀 Starting API tests against {}", state.base_url);
            println!("{}", "=".repeat(50));
            *state.started.lock() = Some(Instant::now());
            Ok(())
        });

        let state = shared.clone();
        ctx.on_test_end(move |_: &TestCase, result: &TestResult| -> Result<()> {
            state.test_end(result);
            Ok(())
        });

        let state = shared;
        ctx.on_run_end(move |report: &RunReport| -> Result<()> {
            state.run_end(report);
            Ok(())
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectest_core::{PluginHost, SkipReason};
    use std::path::PathBuf;

    fn result(name: &str, passed: bool, latency: u64) -> TestResult {
        TestResult {
            passed,
            error: (!passed).then(|| "Status mismatch: expected 200, got 500".to_string()),
            warnings: Vec::new(),
            latency,
            request_id: None,
            test_name: name.to_string(),
            operation_id: name.to_string(),
            suite_name: Some("users".to_string()),
            timed_out: false,
            request: None,
            response: None,
        }
    }

    #[test]
    fn test_latency_summary() {
        let results: Vec<TestResult> = (1..=20).map(|i| result("t", true, i * 10)).collect();
        let summary = LatencySummary::from_results(&results).unwrap();
        assert_eq!(summary.min, 10);
        assert_eq!(summary.max, 200);
        assert_eq!(summary.p95, 190);
        assert!((summary.avg - 105.0).abs() < f64::EPSILON);
        assert_eq!(
            summary.to_string(),
            "min 10ms; avg 105.00ms; p95 190ms; max 200ms"
        );

        assert!(LatencySummary::from_results(&[]).is_none());
        let single = LatencySummary::from_results(&[result("t", true, 7)]).unwrap();
        assert_eq!((single.min, single.p95, single.max), (7, 7, 7));
    }

    #[test]
    fn test_result_line() {
        let passed = result_line(&result("list users", true, 12));
        assert!(passed.contains("[✓] list users (12ms)"));

        let mut timed_out = result("slow", false, 100);
        timed_out.timed_out = true;
        assert!(result_line(&timed_out).contains("[⏰] slow (100ms)"));
    }

    #[test]
    fn test_suite_table_rows() {
        let ok = result("ok", true, 5);
        let bad = result("bad", false, 9);
        let rendered = suite_table(&[&ok, &bad]).to_string();
        assert!(rendered.contains("PASS"));
        assert!(rendered.contains("FAIL"));
        assert!(rendered.contains("Status mismatch"));
    }

    #[test]
    fn test_skipped_lines_grouped_with_reasons() {
        let mut a = TestCase::new("a", "/a");
        a.suite_name = Some("users".into());
        let b = TestCase::new("b", "/b");
        let skipped = vec![
            SkippedTest::new(&a, SkipReason::DependencyFailed("login".into())),
            SkippedTest::new(&b, SkipReason::Explicit),
        ];

        let lines = skipped_lines(&skipped);
        assert_eq!(
            lines,
            vec![
                "⏭  Skipped 2 tests:".to_string(),
                "  Suite: users".to_string(),
                "    - a (dependency 'login' failed)".to_string(),
                "  Suite: unknown".to_string(),
                "    - b (marked skip)".to_string(),
            ]
        );
        assert!(skipped_lines(&[]).is_empty());
    }

    #[test]
    fn test_snapshot_notice_only_when_saved() {
        let mut report = RunReport {
            results: vec![result("a", true, 4)],
            ..Default::default()
        };
        assert_eq!(
            footer_lines(&report),
            vec!["⏱  Latency: min 4ms; avg 4.00ms; p95 4ms; max 4ms"]
        );

        report.snapshot_saved = Some(PathBuf::from("out/snapshot.json"));
        assert_eq!(
            footer_lines(&report).last().map(String::as_str),
            Some("📸 Snapshot saved to out/snapshot.json")
        );
        assert!(footer_lines(&RunReport::default()).is_empty());
    }

    #[tokio::test]
    async fn test_registers_observers() {
        let mut host = PluginHost::new(vec![Arc::new(ConsoleReporter::new(
            "http://localhost:3000",
            false,
        ))]);
        host.setup().await.unwrap();

        host.run_start().await.unwrap();
        let report = RunReport {
            results: vec![result("a", true, 3)],
            duration_ms: 3,
            ..Default::default()
        };
        host.test_end(&TestCase::new("a", "/a"), &report.results[0])
            .await
            .unwrap();
        host.run_end(&report).await.unwrap();
    }
}
