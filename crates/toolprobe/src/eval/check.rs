use std::fmt;

use serde::Serialize;

use crate::driver::Transcript;
use crate::eval::TestCase;

/// One expectation of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "subject", rename_all = "snake_case")]
pub enum Expectation {
    ToolCalled(String),
    ToolNotCalled(String),
    ReplyContains(String),
}

/// Whether one expectation held for a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub expectation: Expectation,
    pub held: bool,
}

impl Outcome {
    pub fn failure(&self) -> Option<Failure> {
        if self.held {
            return None;
        }
        Some(match &self.expectation {
            Expectation::ToolCalled(name) => Failure::MissingTool(name.clone()),
            Expectation::ToolNotCalled(name) => Failure::ForbiddenToolCalled(name.clone()),
            Expectation::ReplyContains(keyword) => Failure::MissingKeyword(keyword.clone()),
        })
    }
}

/// An itemized mismatch between expectation and transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    MissingTool(String),
    ForbiddenToolCalled(String),
    MissingKeyword(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::MissingTool(name) => write!(f, "Expected tool '{name}' was not called"),
            Failure::ForbiddenToolCalled(name) => {
                write!(f, "Tool '{name}' was called but should not have been")
            }
            Failure::MissingKeyword(keyword) => {
                write!(f, "Response should contain '{keyword}' but does not")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Check trait
// ---------------------------------------------------------------------------

/// One verification predicate.
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    /// One outcome per expectation this check covers, in declaration order.
    fn evaluate(&self, case: &TestCase, transcript: &Transcript) -> Vec<Outcome>;
}

/// Every required tool appears at least once among the captured calls.
pub struct RequiredTools;

impl Check for RequiredTools {
    fn name(&self) -> &str {
        "required_tools"
    }

    fn evaluate(&self, case: &TestCase, transcript: &Transcript) -> Vec<Outcome> {
        case.required_tools
            .iter()
            .map(|name| Outcome {
                expectation: Expectation::ToolCalled(name.clone()),
                held: transcript.was_called(name),
            })
            .collect()
    }
}

/// No forbidden tool appears among the captured calls.
pub struct ForbiddenTools;

impl Check for ForbiddenTools {
    fn name(&self) -> &str {
        "forbidden_tools"
    }

    fn evaluate(&self, case: &TestCase, transcript: &Transcript) -> Vec<Outcome> {
        case.forbidden_tools
            .iter()
            .map(|name| Outcome {
                expectation: Expectation::ToolNotCalled(name.clone()),
                held: !transcript.was_called(name),
            })
            .collect()
    }
}

/// Every keyword is a case-insensitive substring of the reply.
pub struct RequiredKeywords;

impl Check for RequiredKeywords {
    fn name(&self) -> &str {
        "required_keywords"
    }

    fn evaluate(&self, case: &TestCase, transcript: &Transcript) -> Vec<Outcome> {
        let reply = transcript.reply.to_lowercase();
        case.required_keywords
            .iter()
            .map(|keyword| Outcome {
                expectation: Expectation::ReplyContains(keyword.clone()),
                held: reply.contains(&keyword.to_lowercase()),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcomes: Vec<Outcome>,
    pub failures: Vec<Failure>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs every check against a transcript. Checks never short-circuit, so a
/// verdict lists every violation.
pub struct Verifier {
    checks: Vec<Box<dyn Check>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Required tools, then forbidden tools, then keywords.
    pub fn standard() -> Self {
        Self::new()
            .check(RequiredTools)
            .check(ForbiddenTools)
            .check(RequiredKeywords)
    }

    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn verify(&self, case: &TestCase, transcript: &Transcript) -> Verdict {
        let outcomes: Vec<Outcome> = self
            .checks
            .iter()
            .flat_map(|c| c.evaluate(case, transcript))
            .collect();
        let failures = outcomes.iter().filter_map(Outcome::failure).collect();
        Verdict { outcomes, failures }
    }
}
