pub mod diagnostic;
pub mod engine;

pub use diagnostic::{Diagnostic, Severity, SourceLocation};
pub use engine::{DiagnosticEngine, DiagnosticSink};
