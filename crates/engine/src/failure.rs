//! Failure signaling from spec bodies
//!
//! Bodies return a [`StepResult`]. Returning `Err(Failure)` aborts the current
//! step only; the runner decides what happens to the rest of the spec.

use spectree_common::CodeLocation;

/// Outcome of one body invocation
pub type StepResult = Result<(), Failure>;

/// An explicit assertion failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub location: CodeLocation,
}

impl Failure {
    /// Failure located at the caller
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: CodeLocation::caller(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.location)
    }
}

/// Fail the current step
#[track_caller]
pub fn fail<T>(message: impl Into<String>) -> Result<T, Failure> {
    Err(Failure::new(message))
}

/// Fail the current step unless `condition` holds
#[track_caller]
pub fn ensure(condition: bool, message: impl Into<String>) -> StepResult {
    if condition {
        Ok(())
    } else {
        Err(Failure::new(message))
    }
}

/// Fail unless both values are equal
#[track_caller]
pub fn ensure_eq<T>(actual: T, expected: T) -> StepResult
where
    T: PartialEq + std::fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(Failure::new(format!(
            "expected {:?}, got {:?}",
            expected, actual
        )))
    }
}
