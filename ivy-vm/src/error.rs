//! Runtime interpreter error implementation.

use core::fmt;

/// Token signalling that an exception has been recorded in the raiser and
/// is unwinding toward the nearest matching `try` block.
///
/// The token is deliberately opaque. Everything about the exception (class,
/// message, user value) lives in the VM so that the catch machinery can
/// build the instance and traceback at the handler.
#[derive(Debug)]
#[must_use]
pub struct Raise(pub(crate) ());

/// Result of an operation that may raise a language-level exception.
pub type OpResult<T> = Result<T, Raise>;

/// An exception that escaped the outermost interpreter activation.
///
/// Host code is expected to read the formatted message and exit or report;
/// there is nothing left to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtError {
    /// Name of the raised exception class.
    pub class_name: String,
    /// The exception message.
    pub message: String,
    /// Formatted trace, oldest frame first.
    pub traceback: Vec<String>,
}

impl fmt::Display for UncaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback:")?;

        for line in &self.traceback {
            writeln!(f, "    {line}")?;
        }

        if self.message.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}

impl std::error::Error for UncaughtError {}
