//! Runtime error type with source-location tracking.
//!
//! [`EvalError`] wraps an error message together with an optional [`Span`]
//! so that diagnostics can point into the stage expression where a runtime
//! failure originated.

use fnk_syntax::error::Span;
use std::fmt;

/// A runtime evaluation error that carries an optional source [`Span`].
///
/// Use the [`bail_span!`] macro (or [`EvalError::new`]) to construct these
/// inside the evaluator.  The outer [`anyhow::Error`] wrapper is preserved
/// so that call-sites can keep using `Result<T>` without changing every
/// function signature.
#[derive(Debug, Clone)]
pub struct EvalError {
    /// Human-readable error description.
    pub message: String,
    /// Location inside the stage expression (if available).
    pub span: Option<Span>,
}

impl EvalError {
    /// Creates a new evaluation error with a span.
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Creates a new evaluation error with a span reference.
    pub fn spanned(message: impl Into<String>, span: &Span) -> Self {
        Self {
            message: message.into(),
            span: Some(*span),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Bail out of a function with an [`EvalError`] pointing at `span`.
///
/// The span argument may be a `Span` or a `&Span`, whichever the call
/// site has at hand.
///
/// # Usage
/// ```ignore
/// bail_span!(span, "variable '{}' not found", name);
/// ```
#[macro_export]
macro_rules! bail_span {
    ($span:expr, $($arg:tt)*) => {
        return Err(anyhow::anyhow!($crate::error::EvalError::new(
            format!($($arg)*),
            Some($crate::error::AsSpan::as_span(&$span)),
        )))
    };
}

/// Lets [`bail_span!`] accept spans by value or by reference.
pub trait AsSpan {
    fn as_span(&self) -> Span;
}

impl AsSpan for Span {
    fn as_span(&self) -> Span {
        *self
    }
}

impl AsSpan for &Span {
    fn as_span(&self) -> Span {
        **self
    }
}
