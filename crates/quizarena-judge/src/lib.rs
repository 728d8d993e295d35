//! External judge client for QuizArena code battles.
//!
//! The coordinator treats code execution as a black box with bounded
//! latency and possible failure: submit code plus test cases, get back
//! pass/fail/timing per case. [`Judge0Client`] talks to a Judge0-style
//! HTTP API; [`SimJudge`] is a local stand-in for development; and
//! [`FallbackJudge`] chains the two so a judge outage degrades the match
//! instead of stalling it.

mod error;
mod judge0;
mod sim;

pub use error::JudgeError;
pub use judge0::{Judge0Client, Judge0Config};
pub use sim::SimJudge;

use quizarena_protocol::{TestCase, TestResult};

/// Output of running code once against a single stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: String,
    pub error: Option<String>,
    /// Execution time in seconds.
    pub time: f64,
    /// Peak memory in kilobytes.
    pub memory: u64,
}

/// Aggregate result of judging a submission against its test set.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeReport {
    pub passed: usize,
    pub total: usize,
    pub details: Vec<TestResult>,
}

impl JudgeReport {
    /// Mean per-test execution time, used for the accepted-speed bonus.
    pub fn avg_time(&self) -> f64 {
        if self.details.is_empty() {
            return 0.0;
        }
        self.details.iter().map(|d| d.time).sum::<f64>() / self.details.len() as f64
    }

    /// Total runtime across tests, used by the tie-break ladder.
    pub fn total_time(&self) -> f64 {
        self.details.iter().map(|d| d.time).sum()
    }
}

/// The abstract judge collaborator.
#[async_trait::async_trait]
pub trait JudgeClient: Send + Sync + 'static {
    /// Runs code once with the given stdin (the "Run" button).
    async fn run(
        &self,
        code: &str,
        language: &str,
        stdin: &str,
    ) -> Result<RunOutcome, JudgeError>;

    /// Judges code against the full test set (the "Submit" button).
    async fn run_test_cases(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
    ) -> Result<JudgeReport, JudgeError>;
}

/// Tries `primary`, falling back to `fallback` on any error. This is how
/// deployments compose the real judge with [`SimJudge`] so rounds keep
/// moving when the upstream API is down or rate-limited.
#[derive(Debug, Clone)]
pub struct FallbackJudge<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackJudge<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait::async_trait]
impl<P: JudgeClient, F: JudgeClient> JudgeClient for FallbackJudge<P, F> {
    async fn run(
        &self,
        code: &str,
        language: &str,
        stdin: &str,
    ) -> Result<RunOutcome, JudgeError> {
        match self.primary.run(code, language, stdin).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "judge unavailable, using fallback");
                self.fallback.run(code, language, stdin).await
            }
        }
    }

    async fn run_test_cases(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
    ) -> Result<JudgeReport, JudgeError> {
        match self.primary.run_test_cases(code, language, cases).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(error = %e, "judge unavailable, using fallback");
                self.fallback.run_test_cases(code, language, cases).await
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct DeadJudge;

    #[async_trait::async_trait]
    impl JudgeClient for DeadJudge {
        async fn run(&self, _: &str, _: &str, _: &str) -> Result<RunOutcome, JudgeError> {
            Err(JudgeError::Unavailable("offline".into()))
        }

        async fn run_test_cases(
            &self,
            _: &str,
            _: &str,
            _: &[TestCase],
        ) -> Result<JudgeReport, JudgeError> {
            Err(JudgeError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_fallback_judge_degrades_to_secondary() {
        let judge = FallbackJudge::new(DeadJudge, SimJudge::default());
        let cases = [TestCase {
            input: "1".into(),
            output: "1".into(),
        }];
        let report = judge.run_test_cases("print(1)", "python", &cases).await;
        assert!(report.is_ok(), "fallback must absorb primary failure");
    }

    #[test]
    fn test_judge_report_avg_time() {
        let report = JudgeReport {
            passed: 2,
            total: 2,
            details: vec![
                TestResult {
                    input: String::new(),
                    expected: String::new(),
                    output: String::new(),
                    passed: true,
                    error: None,
                    time: 0.1,
                },
                TestResult {
                    input: String::new(),
                    expected: String::new(),
                    output: String::new(),
                    passed: true,
                    error: None,
                    time: 0.3,
                },
            ],
        };
        assert!((report.avg_time() - 0.2).abs() < 1e-9);
        assert!((report.total_time() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_judge_report_avg_time_empty_is_zero() {
        let report = JudgeReport {
            passed: 0,
            total: 0,
            details: vec![],
        };
        assert_eq!(report.avg_time(), 0.0);
    }
}
