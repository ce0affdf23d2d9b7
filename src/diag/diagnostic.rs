/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

/// A position in the source text. `column` and `length` are in bytes;
/// the renderer translates them to display columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        SourceLocation {
            line,
            column,
            length: 1,
        }
    }

    pub fn with_len(line: usize, column: usize, length: usize) -> Self {
        SourceLocation {
            line,
            column,
            length: length.max(1),
        }
    }
}

/// One diagnostic: severity, location, message, and the optional
/// `help:` suggestion and `try:` fix-it replacement lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
    pub help: Option<String>,
    pub fix: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            location,
            message: message.into(),
            help: None,
            fix: None,
        }
    }

    pub fn error(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, location, message)
    }

    pub fn warning(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, location, message)
    }

    pub fn note(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Note, location, message)
    }

    /// Attach a free-text suggestion.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach literal replacement code that would fix the error.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}
