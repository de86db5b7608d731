//! Run-all-and-report bookkeeping for scenario runs

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::info;

use crate::{Error, Result};

/// Longest error text printed in the summary
const SUMMARY_ERROR_CHARS: usize = 200;

/// Outcome of one scenario
#[derive(Clone, Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Collects scenario outcomes and prints a summary
///
/// Scenarios may record concurrently; a scenario that panics is recorded as
/// a failure instead of tearing down its siblings.
pub struct RunReport {
    title: String,
    results: Mutex<Vec<ScenarioResult>>,
}

impl RunReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Run one scenario and record its outcome. Returns whether it passed.
    pub async fn run<Fut>(&self, name: &str, scenario: Fut) -> bool
    where
        Fut: Future<Output = Result<()>>,
    {
        let start = Instant::now();
        let (passed, error) = match AssertUnwindSafe(scenario).catch_unwind().await {
            Ok(Ok(())) => (true, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                (false, Some(format!("PANIC: {msg}")))
            }
        };
        self.record(name, passed, start.elapsed(), error);
        passed
    }

    pub fn record(&self, name: &str, passed: bool, duration: Duration, error: Option<String>) {
        self.results().push(ScenarioResult {
            name: name.to_string(),
            passed,
            duration,
            error,
        });
    }

    /// Snapshot of the recorded outcomes, in completion order
    pub fn results_snapshot(&self) -> Vec<ScenarioResult> {
        self.results().clone()
    }

    /// Log the summary and fail if any scenario failed
    pub fn finish(&self) -> Result<()> {
        let results = self.results();
        let total: Duration = results.iter().map(|r| r.duration).sum();
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect();

        info!("========================================");
        info!("  {}", self.title.to_uppercase());
        info!("========================================");
        for r in results.iter() {
            let tag = if r.passed { "PASS" } else { "FAIL" };
            info!("  {tag}  {:40} {:.1}s", r.name, r.duration.as_secs_f64());
            if let Some(ref e) = r.error {
                let truncated: String = e.chars().take(SUMMARY_ERROR_CHARS).collect();
                info!("        -> {truncated}");
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed ({:.1}s total)",
            results.len() - failed.len(),
            failed.len(),
            total.as_secs_f64()
        );
        info!("========================================");

        if results.is_empty() {
            return Err(Error::command_failed(format!(
                "no scenarios ran in {}",
                self.title
            )));
        }
        if !failed.is_empty() {
            return Err(Error::command_failed(format!(
                "{} scenario(s) failed in {}: {}",
                failed.len(),
                self.title,
                failed.join(", ")
            )));
        }
        Ok(())
    }

    fn results(&self) -> MutexGuard<'_, Vec<ScenarioResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_passing_finishes_ok() {
        let report = RunReport::new("matrix");
        assert!(report.run("a", async { Ok(()) }).await);
        assert!(report.run("b", async { Ok(()) }).await);
        assert!(report.finish().is_ok());
        assert_eq!(report.results_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn failure_is_recorded_and_named() {
        let report = RunReport::new("matrix");
        report.run("good", async { Ok(()) }).await;
        let passed = report
            .run("bad", async { Err(Error::validation("boom")) })
            .await;
        assert!(!passed);

        let results = report.results_snapshot();
        let bad = results.iter().find(|r| r.name == "bad").unwrap();
        assert!(bad.error.as_deref().unwrap().contains("boom"));

        let err = report.finish().unwrap_err();
        assert!(err.to_string().contains("1 scenario(s) failed in matrix: bad"));
    }

    #[tokio::test]
    async fn panic_is_caught() {
        let report = RunReport::new("matrix");
        let passed = report
            .run("panics", async {
                if true {
                    panic!("reconciler exploded");
                }
                Ok(())
            })
            .await;
        assert!(!passed);
        let results = report.results_snapshot();
        assert_eq!(
            results[0].error.as_deref(),
            Some("PANIC: reconciler exploded")
        );
    }

    #[test]
    fn empty_report_is_an_error() {
        assert!(RunReport::new("matrix").finish().is_err());
    }
}
