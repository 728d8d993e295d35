//! Judge0-style HTTP client.
//!
//! The upstream API takes base64-encoded source and stdin, returns a
//! token, and is polled until the submission leaves the queue. Poll
//! budget is 30 attempts at 1-second intervals; exceeding it is a
//! [`JudgeError::Timeout`], which callers treat as upstream-unavailable.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use quizarena_protocol::{TestCase, TestResult};

use crate::{JudgeClient, JudgeError, JudgeReport, RunOutcome};

/// Judge0 status ids. Anything ≥ 4 is a final verdict.
const STATUS_IN_QUEUE: u64 = 1;
const STATUS_PROCESSING: u64 = 2;
const STATUS_ACCEPTED: u64 = 3;
const STATUS_WRONG_ANSWER: u64 = 4;
const STATUS_TIME_LIMIT: u64 = 5;
const STATUS_COMPILATION_ERROR: u64 = 6;
const STATUS_RUNTIME_ERROR: u64 = 7;

/// Configuration for the Judge0 client.
#[derive(Debug, Clone)]
pub struct Judge0Config {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Maximum polls before giving up.
    pub poll_budget: u32,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl Default for Judge0Config {
    fn default() -> Self {
        Self {
            api_url: "https://judge0-ce.p.rapidapi.com".into(),
            api_key: None,
            poll_budget: 30,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP client for a Judge0-compatible execution service.
#[derive(Debug, Clone)]
pub struct Judge0Client {
    config: Judge0Config,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusField {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    #[serde(default)]
    status: StatusField,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    time: Option<String>,
    memory: Option<u64>,
}

impl Judge0Client {
    pub fn new(config: Judge0Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn language_id(language: &str) -> Result<u32, JudgeError> {
        match language.to_lowercase().as_str() {
            "python" => Ok(71),
            "c" => Ok(50),
            "cpp" => Ok(54),
            "java" => Ok(62),
            "javascript" => Ok(63),
            other => Err(JudgeError::UnsupportedLanguage(other.into())),
        }
    }

    fn auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req
                .header("X-RapidAPI-Key", key)
                .header("X-RapidAPI-Host", "judge0-ce.p.rapidapi.com"),
            None => req,
        }
    }

    async fn submit(
        &self,
        code: &str,
        language_id: u32,
        stdin: &str,
    ) -> Result<String, JudgeError> {
        let url = format!(
            "{}/submissions?base64_encoded=true&fields=*",
            self.config.api_url
        );
        let body = serde_json::json!({
            "source_code": BASE64.encode(code),
            "language_id": language_id,
            "stdin": if stdin.is_empty() { String::new() } else { BASE64.encode(stdin) },
        });

        let response = self
            .auth_headers(self.http.post(&url).json(&body))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| JudgeError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JudgeError::Unavailable(format!(
                "submit returned {}",
                response.status()
            )));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Unavailable(e.to_string()))?;
        match parsed.token {
            Some(token) => Ok(token),
            None => Err(JudgeError::Unavailable(
                parsed.error.unwrap_or_else(|| "no token in response".into()),
            )),
        }
    }

    /// Polls for the final verdict of a submitted token.
    async fn poll(&self, token: &str) -> Result<ResultResponse, JudgeError> {
        let url = format!(
            "{}/submissions/{token}?base64_encoded=true&fields=*",
            self.config.api_url
        );
        for _ in 0..self.config.poll_budget {
            let response = self
                .auth_headers(self.http.get(&url))
                .send()
                .await
                .map_err(|e| JudgeError::Unavailable(e.to_string()))?;
            let result: ResultResponse = response
                .json()
                .await
                .map_err(|e| JudgeError::Unavailable(e.to_string()))?;

            match result.status.id {
                Some(STATUS_IN_QUEUE) | Some(STATUS_PROCESSING) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                _ => return Ok(result),
            }
        }
        Err(JudgeError::Timeout(
            self.config.poll_budget as u64 * self.config.poll_interval.as_secs(),
        ))
    }

    /// Runs one (code, stdin) pair to a final verdict.
    async fn execute(
        &self,
        code: &str,
        language_id: u32,
        stdin: &str,
    ) -> Result<Verdict, JudgeError> {
        let token = self.submit(code, language_id, stdin).await?;
        let result = self.poll(&token).await?;

        let stdout = decode_field(result.stdout.as_deref());
        let stderr = decode_field(result.stderr.as_deref());
        let compile_output = decode_field(result.compile_output.as_deref());
        let time: f64 = result
            .time
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.0);
        let memory = result.memory.unwrap_or(0);

        let (output, error) = match result.status.id {
            Some(STATUS_ACCEPTED) => (stdout, None),
            Some(STATUS_WRONG_ANSWER) => (stdout, Some("Wrong answer".to_string())),
            Some(STATUS_TIME_LIMIT) => (stdout, Some("Time limit exceeded".to_string())),
            // The "Compilation error"/"Runtime error" prefixes are part
            // of the report contract: the battle engine derives the
            // submission status from them.
            Some(STATUS_COMPILATION_ERROR) => (
                String::new(),
                Some(if compile_output.is_empty() {
                    "Compilation error".to_string()
                } else {
                    format!("Compilation error: {compile_output}")
                }),
            ),
            Some(STATUS_RUNTIME_ERROR) => (
                stdout,
                Some(if stderr.is_empty() {
                    "Runtime error".to_string()
                } else {
                    format!("Runtime error: {stderr}")
                }),
            ),
            _ => (stdout, Some("Execution failed".to_string())),
        };

        Ok(Verdict {
            output,
            error,
            time,
            memory,
        })
    }
}

struct Verdict {
    output: String,
    error: Option<String>,
    time: f64,
    memory: u64,
}

/// Judge0 base64-encodes stdout/stderr/compile_output in responses.
/// Undecodable payloads fall back to the raw text.
fn decode_field(field: Option<&str>) -> String {
    let Some(raw) = field else {
        return String::new();
    };
    match BASE64.decode(raw.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

#[async_trait::async_trait]
impl JudgeClient for Judge0Client {
    async fn run(
        &self,
        code: &str,
        language: &str,
        stdin: &str,
    ) -> Result<RunOutcome, JudgeError> {
        let language_id = Self::language_id(language)?;
        let verdict = self.execute(code, language_id, stdin).await?;
        Ok(RunOutcome {
            output: verdict.output,
            error: verdict.error,
            time: verdict.time,
            memory: verdict.memory,
        })
    }

    async fn run_test_cases(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
    ) -> Result<JudgeReport, JudgeError> {
        let language_id = Self::language_id(language)?;
        let mut details = Vec::with_capacity(cases.len());
        let mut passed = 0;

        for case in cases {
            let verdict = self.execute(code, language_id, &case.input).await?;
            let expected = case.output.trim();
            let passed_test = verdict.error.is_none() && verdict.output == expected;
            if passed_test {
                passed += 1;
            }
            let error = match (&verdict.error, passed_test) {
                (Some(e), _) => Some(e.clone()),
                (None, false) => Some("Wrong answer".to_string()),
                (None, true) => None,
            };
            details.push(TestResult {
                input: case.input.clone(),
                expected: expected.to_string(),
                output: verdict.output,
                passed: passed_test,
                error,
                time: verdict.time,
            });
        }

        Ok(JudgeReport {
            passed,
            total: cases.len(),
            details,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
