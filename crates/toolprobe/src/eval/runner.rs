use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{info, warn};

use crate::driver::{ChatDriver, Transcript};
use crate::error::Error;
use crate::eval::{Outcome, TestCase, Verdict, Verifier};
use crate::llm::{LlmProvider, OnText};

/// Result of running a single test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub case_name: String,
    pub passed: bool,
    /// Rendered failure messages, in check order.
    pub failures: Vec<String>,
    /// Every expectation and whether it held. Empty when the case errored.
    pub outcomes: Vec<Outcome>,
    pub duration: Duration,
    /// Fault that stopped the case before it could be verified.
    pub error: Option<String>,
    /// Qualified names of the captured calls, in order.
    pub calls: Vec<String>,
    pub reply: String,
}

impl TestResult {
    fn verified(
        case: &TestCase,
        transcript: Transcript,
        verdict: Verdict,
        duration: Duration,
    ) -> Self {
        Self {
            case_name: case.name.clone(),
            passed: verdict.passed(),
            failures: verdict.failures.iter().map(ToString::to_string).collect(),
            outcomes: verdict.outcomes,
            duration,
            error: None,
            calls: transcript.call_names().into_iter().map(String::from).collect(),
            reply: transcript.reply,
        }
    }

    fn errored(case: &TestCase, error: String, duration: Duration) -> Self {
        Self {
            case_name: case.name.clone(),
            passed: false,
            failures: Vec::new(),
            outcomes: Vec::new(),
            duration,
            error: Some(error),
            calls: Vec::new(),
            reply: String::new(),
        }
    }
}

/// Progress hooks for a run. Every method defaults to doing nothing.
pub trait RunObserver: Send + Sync {
    fn case_started(&self, _case: &TestCase) {}

    /// A reply fragment of the case in progress.
    fn on_text(&self, _text: &str) {}

    fn case_finished(&self, _case: &TestCase, _result: &TestResult) {}
}

struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Runs test cases one after another, each in a fresh session.
pub struct TestRunner {
    verifier: Verifier,
    observer: Arc<dyn RunObserver>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunner {
    pub fn new() -> Self {
        Self {
            verifier: Verifier::standard(),
            observer: Arc::new(SilentObserver),
        }
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every case in order. `session` builds the driver for one case;
    /// it is called once per case so no state carries over.
    pub async fn run<P, F>(&self, cases: &[TestCase], mut session: F) -> Vec<TestResult>
    where
        P: LlmProvider,
        F: FnMut(&TestCase) -> Result<ChatDriver<P>, Error>,
    {
        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            results.push(self.run_case(case, &mut session).await);
        }
        results
    }

    /// Run one case. Faults of any kind, panics included, become a failed
    /// result instead of propagating.
    pub async fn run_case<P, F>(&self, case: &TestCase, session: &mut F) -> TestResult
    where
        P: LlmProvider,
        F: FnMut(&TestCase) -> Result<ChatDriver<P>, Error>,
    {
        self.observer.case_started(case);
        info!(case = %case.name, "running test case");
        let start = Instant::now();

        let result = match case.validate() {
            Err(e) => {
                warn!(case = %case.name, error = %e, "skipping invalid test case");
                TestResult::errored(case, e.to_string(), start.elapsed())
            }
            Ok(()) => match AssertUnwindSafe(self.execute(case, session))
                .catch_unwind()
                .await
            {
                Ok(Ok((transcript, verdict))) => {
                    let duration = start.elapsed();
                    TestResult::verified(case, transcript, verdict, duration)
                }
                Ok(Err(e)) => {
                    warn!(case = %case.name, error = %e, "test case faulted");
                    TestResult::errored(case, e.to_string(), start.elapsed())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(case = %case.name, panic = %message, "test case panicked");
                    TestResult::errored(case, format!("panic: {message}"), start.elapsed())
                }
            },
        };

        info!(
            case = %case.name,
            passed = result.passed,
            duration_ms = result.duration.as_millis() as u64,
            "test case finished"
        );
        self.observer.case_finished(case, &result);
        result
    }

    async fn execute<P, F>(
        &self,
        case: &TestCase,
        session: &mut F,
    ) -> Result<(Transcript, Verdict), Error>
    where
        P: LlmProvider,
        F: FnMut(&TestCase) -> Result<ChatDriver<P>, Error>,
    {
        let mut driver = session(case)?;
        let observer = Arc::clone(&self.observer);
        let on_text: Box<OnText> = Box::new(move |text: &str| observer.on_text(text));
        let transcript = driver.run_turn(&case.prompt, &*on_text).await?;
        let verdict = self.verifier.verify(case, &transcript);
        Ok((transcript, verdict))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    /// Cases that did not pass, errored ones included.
    pub failed: usize,
    /// Cases that stopped on a fault before verification.
    pub errors: usize,
    pub total_duration: Duration,
    pub mean_duration: Duration,
}

impl RunSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let errors = results.iter().filter(|r| r.error.is_some()).count();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let mean_duration = if total == 0 {
            Duration::ZERO
        } else {
            total_duration / total as u32
        };
        Self {
            total,
            passed,
            failed: total - passed,
            errors,
            total_duration,
            mean_duration,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: {} passed, {} failed out of {} tests",
            self.passed, self.failed, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::CompletionStream;
    use crate::llm::types::{CompletionRequest, StreamEvent};
    use crate::observer::CallObserver;
    use crate::tool::ToolRegistry;

    struct ReplyProvider(&'static str);

    impl LlmProvider for ReplyProvider {
        async fn stream(&self, _request: CompletionRequest) -> Result<CompletionStream, Error> {
            if self.0 == "panic" {
                panic!("provider exploded");
            }
            if self.0 == "fail" {
                return Err(Error::Api {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            let events = vec![Ok(StreamEvent::TextDelta(self.0.to_string()))];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn session(
        reply: &'static str,
    ) -> impl FnMut(&TestCase) -> Result<ChatDriver<ReplyProvider>, Error> {
        move |_case| {
            let observer = CallObserver::new();
            let registry = ToolRegistry::new(observer.attach());
            Ok(ChatDriver::new(Arc::new(ReplyProvider(reply)), registry, observer))
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl RunObserver for Recorder {
        fn case_started(&self, case: &TestCase) {
            self.events.lock().unwrap().push(format!("start {}", case.name));
        }

        fn on_text(&self, text: &str) {
            self.events.lock().unwrap().push(format!("text {text}"));
        }

        fn case_finished(&self, case: &TestCase, result: &TestResult) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {} {}", case.name, result.passed));
        }
    }

    #[tokio::test]
    async fn passing_case_produces_verified_result() {
        let runner = TestRunner::new();
        let cases = vec![TestCase::new("capital", "Capital of France?").require_keyword("paris")];
        let results = runner.run(&cases, session("Paris.")).await;
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.passed);
        assert!(r.failures.is_empty());
        assert!(r.error.is_none());
        assert_eq!(r.reply, "Paris.");
        assert_eq!(r.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn failing_case_lists_failures() {
        let runner = TestRunner::new();
        let cases = vec![
            TestCase::new("add", "5+3?")
                .require_tool("Math.Add")
                .require_keyword("8"),
        ];
        let results = runner.run(&cases, session("eight")).await;
        assert!(!results[0].passed);
        assert_eq!(
            results[0].failures,
            vec![
                "Expected tool 'Math.Add' was not called",
                "Response should contain '8' but does not",
            ]
        );
    }

    #[tokio::test]
    async fn transport_fault_is_recorded_and_run_continues() {
        let runner = TestRunner::new();
        let cases = vec![TestCase::new("a", "p"), TestCase::new("b", "p")];
        let results = runner.run(&cases, session("fail")).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(
            results[0].error.as_deref(),
            Some("API error (503): unavailable")
        );
        assert!(results[0].calls.is_empty());
    }

    #[tokio::test]
    async fn panic_is_caught() {
        let runner = TestRunner::new();
        let cases = vec![TestCase::new("boom", "p")];
        let results = runner.run(&cases, session("panic")).await;
        assert_eq!(
            results[0].error.as_deref(),
            Some("panic: provider exploded")
        );
    }

    #[tokio::test]
    async fn invalid_case_is_not_executed() {
        let runner = TestRunner::new();
        let cases = vec![
            TestCase::new("overlap", "p")
                .require_tool("Math.Add")
                .forbid_tool("Math.Add"),
        ];
        let mut built = 0;
        let results = runner
            .run(&cases, |case: &TestCase| {
                built += 1;
                session("x")(case)
            })
            .await;
        assert_eq!(built, 0);
        assert!(!results[0].passed);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap()
                .contains("both required and forbidden")
        );
    }

    #[tokio::test]
    async fn session_factory_error_is_recorded() {
        let runner = TestRunner::new();
        let cases = vec![TestCase::new("a", "p")];
        let results = runner
            .run(&cases, |_: &TestCase| -> Result<ChatDriver<ReplyProvider>, Error> {
                Err(Error::Config("no endpoint".into()))
            })
            .await;
        assert_eq!(
            results[0].error.as_deref(),
            Some("Configuration error: no endpoint")
        );
    }

    #[tokio::test]
    async fn observer_sees_lifecycle_and_fragments() {
        let recorder = Arc::new(Recorder::default());
        let runner = TestRunner::new().with_observer(recorder.clone());
        let cases = vec![TestCase::new("hello", "say hi")];
        runner.run(&cases, session("hi")).await;
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start hello", "text hi", "finish hello true"]
        );
    }

    #[test]
    fn summary_counts_and_durations() {
        let result = |passed: bool, error: Option<&str>, ms: u64| TestResult {
            case_name: "c".into(),
            passed,
            failures: Vec::new(),
            outcomes: Vec::new(),
            duration: Duration::from_millis(ms),
            error: error.map(String::from),
            calls: Vec::new(),
            reply: String::new(),
        };
        let summary = RunSummary::from_results(&[
            result(true, None, 100),
            result(false, None, 200),
            result(false, Some("down"), 300),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total_duration, Duration::from_millis(600));
        assert_eq!(summary.mean_duration, Duration::from_millis(200));
        assert!(!summary.all_passed());
        assert_eq!(
            summary.to_string(),
            "Summary: 1 passed, 2 failed out of 3 tests"
        );
    }

    #[test]
    fn empty_summary() {
        let summary = RunSummary::from_results(&[]);
        assert_eq!(summary.mean_duration, Duration::ZERO);
        assert!(summary.all_passed());
    }
}
