//! Tool-routing verification.
//!
//! A [`TestCase`] pairs a prompt with three expectation sets: tools that
//! must be called, tools that must not be, and keywords the reply must
//! contain. The [`TestRunner`] drives one turn per case in a fresh session
//! and hands the transcript to a [`Verifier`].
//!
//! ```rust,ignore
//! use toolprobe::eval::{TestCase, TestRunner, RunSummary};
//!
//! let cases = vec![
//!     TestCase::new("Simple Addition", "What is 5 + 3?")
//!         .require_tool("Math.Add")
//!         .forbid_tool("Math.Subtract")
//!         .require_keyword("8"),
//! ];
//!
//! let results = TestRunner::new()
//!     .run(&cases, |case| config.session(config.model_for(case)))
//!     .await;
//! println!("{}", RunSummary::from_results(&results));
//! ```

mod case;
mod catalog;
mod check;
mod runner;

pub use case::TestCase;
pub use catalog::default_cases;
pub use check::{
    Check, Expectation, Failure, ForbiddenTools, Outcome, RequiredKeywords, RequiredTools,
    Verdict, Verifier,
};
pub use runner::{RunObserver, RunSummary, TestResult, TestRunner};
