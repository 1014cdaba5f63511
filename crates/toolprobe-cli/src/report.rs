use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use toolprobe::{Expectation, HarnessConfig, RunObserver, RunSummary, TestCase, TestResult};

const RULE_WIDTH: usize = 80;

/// Prints run progress to stdout as cases start and finish.
pub struct ConsoleReporter {
    verbose: bool,
    /// Set once the case in progress has printed reply text.
    streamed: AtomicBool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            streamed: AtomicBool::new(false),
        }
    }

    pub fn header(&self, config: &HarnessConfig, cases: &[TestCase]) {
        if self.verbose {
            println!("=== VERBOSE MODE ENABLED ===\n");
            println!("Configuration:");
            println!("  Endpoint: {}", config.model.endpoint);
            println!("  Model: {}", config.model.model);
            println!("  Test Cases: {}\n", cases.len());
        }
        println!("Running {} test cases...\n", cases.len());
    }

    pub fn summary(&self, summary: &RunSummary) {
        println!("{summary}");
        if self.verbose {
            println!("Total Duration: {}ms", millis(summary.total_duration));
            println!(
                "Average Duration: {}ms per test",
                millis(summary.mean_duration)
            );
        }
    }

    fn details(&self, result: &TestResult) {
        println!("\n--- Detailed Results ---");
        println!("Duration: {}ms", millis(result.duration));
        println!("Function Calls: {}", result.calls.join(", "));
        println!("Full Response ({} chars):", result.reply.chars().count());
        println!("  {}", result.reply);
        if result.outcomes.is_empty() {
            return;
        }
        println!("Verification:");
        for outcome in &result.outcomes {
            let line = match (&outcome.expectation, outcome.held) {
                (Expectation::ToolCalled(name), true) => format!("Expected '{name}': ✓ CALLED"),
                (Expectation::ToolCalled(name), false) => {
                    format!("Expected '{name}': ✗ NOT CALLED")
                }
                (Expectation::ToolNotCalled(name), true) => {
                    format!("Forbidden '{name}': ✓ NOT CALLED")
                }
                (Expectation::ToolNotCalled(name), false) => {
                    format!("Forbidden '{name}': ✗ WAS CALLED")
                }
                (Expectation::ReplyContains(keyword), true) => {
                    format!("Response contains '{keyword}': ✓ YES")
                }
                (Expectation::ReplyContains(keyword), false) => {
                    format!("Response contains '{keyword}': ✗ NO")
                }
            };
            println!("  {line}");
        }
    }
}

impl RunObserver for ConsoleReporter {
    fn case_started(&self, case: &TestCase) {
        if self.verbose {
            let rule = "=".repeat(RULE_WIDTH);
            println!("{rule}");
            println!("TEST: {}", case.name);
            println!("{rule}");
            println!("Prompt: {}", case.prompt);
            println!("Expected Tools to Call: {}", case.required_tools.join(", "));
            println!(
                "Expected Tools NOT to Call: {}",
                case.forbidden_tools.join(", ")
            );
            println!(
                "Response Must Contain: {}",
                case.required_keywords.join(", ")
            );
            println!();
        }
        print!("Test: {}... ", case.name);
        let _ = std::io::stdout().flush();
    }

    fn on_text(&self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
        self.streamed.store(true, Ordering::Relaxed);
    }

    fn case_finished(&self, _case: &TestCase, result: &TestResult) {
        // The marker goes on its own line after streamed text.
        if self.streamed.swap(false, Ordering::Relaxed) {
            println!();
        }
        if result.passed {
            println!("✓ PASSED");
        } else {
            println!("✗ FAILED");
            if let Some(error) = &result.error {
                println!("  Error: {error}");
            }
            for failure in &result.failures {
                println!("  {failure}");
            }
        }

        if self.verbose {
            self.details(result);
        } else {
            println!("  Called: {}", result.calls.join(", "));
        }
        println!();
    }
}

fn millis(d: Duration) -> u128 {
    d.as_millis()
}
