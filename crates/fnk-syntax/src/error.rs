use std::fmt;

/// Source location of a token or expression inside a stage expression
/// string. Stage expressions are single-line, so `line` is always 1 in
/// practice, but the field is kept so diagnostics stay uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(line: usize, col: usize, start: usize, end: usize) -> Self {
        Self { line, col, start, end }
    }

    pub fn merge(&self, other: &Span) -> Self {
        Self {
            line: self.line.min(other.line),
            col: if self.line == other.line { self.col.min(other.col) } else { self.col },
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LexError {
    UnexpectedChar { ch: char, span: Span, suggestion: Option<String> },
    UnterminatedString { span: Span },
    InvalidNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, suggestion, .. } => {
                write!(f, "unexpected character '{}'", ch)?;
                if let Some(s) = suggestion {
                    write!(f, " ({})", s)?;
                }
                Ok(())
            }
            LexError::UnterminatedString { .. } => {
                write!(f, "unterminated string literal")
            }
            LexError::InvalidNumber { text, .. } => {
                write!(f, "invalid number: '{}'", text)
            }
        }
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone)]
pub enum ParseError {
    UnexpectedToken { expected: String, found: String, span: Span },
    UnexpectedEof { expected: String },
    InvalidSyntax { message: String, span: Span },
    LexError(LexError),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } => None,
            ParseError::InvalidSyntax { span, .. } => Some(*span),
            ParseError::LexError(e) => Some(e.span()),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, .. } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            ParseError::UnexpectedEof { expected } => {
                write!(f, "unexpected end of expression, expected {}", expected)
            }
            ParseError::InvalidSyntax { message, .. } => {
                write!(f, "{}", message)
            }
            ParseError::LexError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::LexError(err)
    }
}

/// Renders a caret diagnostic pointing into the offending expression, for
/// CLI error reporting at configuration time.
pub fn format_error_with_source(error_msg: &str, source: &str, span: Option<Span>) -> String {
    let mut output = String::new();
    output.push_str(&format!("error: {}\n", error_msg));
    if let Some(span) = span {
        output.push_str(&format!("  | {}\n", source));
        output.push_str(&format!(
            "  | {}{}\n",
            " ".repeat(span.col.saturating_sub(1)),
            "^".repeat((span.end.saturating_sub(span.start)).max(1))
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_takes_outer_bounds() {
        let a = Span::new(1, 1, 0, 3);
        let b = Span::new(1, 5, 4, 9);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 9);
        assert_eq!(merged.col, 1);
    }

    #[test]
    fn format_points_at_span() {
        let src = "_ ** 2";
        let rendered =
            format_error_with_source("unexpected character '*'", src, Some(Span::new(1, 3, 2, 3)));
        assert!(rendered.contains("_ ** 2"));
        assert!(rendered.contains("^"));
    }
}
