//! Source code representation and error management.

use std::{cell::RefCell, error::Error, fmt, ops::Range};

/// Represents source code.
pub struct Source<'a> {
    /// Original source code.
    pub content: &'a str,
    /// Accumulated errors.
    pub errors: ErrorReporter,
}

impl<'a> Source<'a> {
    /// Create a new `Source` with the specified `content`.
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            errors: ErrorReporter::new(),
        }
    }

    /// Returns `true` if `Source` has no accumulated errors. Returns `false` otherwise.
    pub fn has_no_errors(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(content: &'a str) -> Self {
        Source::new(content)
    }
}

/// The category of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected token, missing keyword or punctuation.
    Syntax,
    /// A binary operator character with no lowering.
    InvalidOperator,
    UnknownVariable,
    UnknownFunction,
    /// Call argument count differs from the callee's parameter count.
    ArityMismatch,
    /// A function with a body is defined again.
    Redefinition,
    /// A forward declaration and its definition disagree on the parameter count.
    PrototypeMismatch,
    /// The generated function failed structural verification.
    Verification,
    /// Any other failure reported by the IR backend.
    Backend,
}

/// Represents a compile time error.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    /// Byte range in the source. Errors found after parsing have no span.
    pub span: Option<Range<usize>>,
}

impl CompileError {
    /// Create a new error of `kind` with the specified `message` and no span.
    pub fn new(kind: ErrorKind, message: impl ToString) -> Self {
        Self {
            kind,
            message: message.to_string(),
            span: None,
        }
    }

    /// Create a new syntax error with the specified `message` and `span`.
    pub fn syntax(message: impl ToString, span: Range<usize>) -> Self {
        Self {
            kind: ErrorKind::Syntax,
            message: message.to_string(),
            span: Some(span),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{} at position {}", self.message, span.start),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for CompileError {}

/// Manages all the errors.
pub struct ErrorReporter {
    errors: RefCell<Vec<CompileError>>,
}

impl ErrorReporter {
    /// Create an empty `ErrorReporter`.
    pub fn new() -> Self {
        Self {
            errors: RefCell::new(Vec::new()),
        }
    }

    /// Adds an error to the `ErrorReporter`.
    /// This method uses the interior mutability pattern. This does not require mutability for ergonomics.
    pub fn add_error(&self, error: CompileError) {
        // This should be the only place where self.errors is borrowed mutably.
        self.errors.borrow_mut().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    /// Returns a copy of all the accumulated errors, in the order they were reported.
    pub fn errors(&self) -> Vec<CompileError> {
        self.errors.borrow().clone()
    }

    /// Returns `true` if at least one accumulated error is of the given `kind`.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.errors.borrow().iter().any(|error| error.kind == kind)
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors.borrow();
        for error in errors.iter() {
            writeln!(f, "ERROR: {}", error)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_display() {
        let source: Source = "FUNC f() RETURN x".into();
        assert!(source.has_no_errors());

        source
            .errors
            .add_error(CompileError::syntax("expected THEN", 4..8));
        source.errors.add_error(CompileError::new(
            ErrorKind::UnknownVariable,
            "Unknown variable name `x`",
        ));

        assert_eq!(source.errors.len(), 2);
        assert!(source.errors.contains(ErrorKind::UnknownVariable));
        assert!(!source.errors.contains(ErrorKind::Redefinition));
        assert_eq!(
            source.errors.to_string(),
            "ERROR: expected THEN at position 4\nERROR: Unknown variable name `x`\n"
        );
    }
}
