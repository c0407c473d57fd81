// src/engine/mod.rs
//
// In-memory test-delivery engine. One `TestSession` per active attempt,
// owned exclusively by the running attempt and discarded on teardown;
// the only durable artifact is the outcome snapshot flushed into a
// test result at completion.

pub mod answers;
pub mod navigator;
pub mod session;
pub mod timer;
pub mod view;

use std::fmt;

pub use answers::AnswerSheet;
pub use navigator::{ModuleNavigator, Position};
pub use session::{SessionOutcome, TestSession};
pub use timer::{ModuleDurations, ModuleTimer};
pub use view::SessionView;

/// Errors raised by engine transitions. These are student-facing and map
/// to 400-level responses at the handler boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// No module in the loaded test has any questions.
    EmptyTest,
    /// A jump or revisit index outside the current module.
    OutOfBounds,
    /// The action is not valid in the current position
    /// (e.g., answering from the review screen).
    WrongState,
    /// A multiple-choice answer that is not one of the question's labels.
    UnknownOption,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            EngineError::EmptyTest => "test has no questions",
            EngineError::OutOfBounds => "question index out of bounds",
            EngineError::WrongState => "action not available right now",
            EngineError::UnknownOption => "unknown answer option",
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for EngineError {}
