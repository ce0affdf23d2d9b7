use std::io::Write;

use crate::diag::diagnostic::{Diagnostic, Severity};

// ANSI escapes, matching the rest of the toolchain's output.
pub mod color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
    pub const BOLD_GREEN: &str = "\x1b[1;32m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
    pub const BOLD_CYAN: &str = "\x1b[1;36m";
    pub const BOLD_WHITE: &str = "\x1b[1;37m";
}

/// Anything that can accept diagnostics. The lexer and parser report through
/// this so tests can capture messages instead of printing them.
pub trait DiagnosticSink {
    fn report(&mut self, diag: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diag: Diagnostic) {
        self.push(diag);
    }
}

/// Renders diagnostics in Clang style and keeps the error/warning tallies.
///
/// Diagnostics reported before the source-line cache is installed are queued
/// and flushed by `set_source`; the lexer reports while it is still filling
/// the cache, so its messages would otherwise have no source line to show.
pub struct DiagnosticEngine {
    filename: String,
    source_lines: Vec<String>,
    source_set: bool,
    colors: bool,
    error_count: usize,
    warning_count: usize,
    pending: Vec<Diagnostic>,
}

const GUTTER_WIDTH: usize = 5;
const TAB_WIDTH: usize = 4;

impl DiagnosticEngine {
    pub fn new(colors: bool) -> Self {
        DiagnosticEngine {
            filename: "<input>".to_string(),
            source_lines: Vec::new(),
            source_set: false,
            colors,
            error_count: 0,
            warning_count: 0,
            pending: Vec::new(),
        }
    }

    /// Install the source-line cache and file name, then flush anything
    /// reported before the source was known.
    pub fn set_source(&mut self, lines: Vec<String>, filename: impl Into<String>) {
        self.filename = filename.into();
        self.source_lines = lines;
        if self.source_lines.is_empty() {
            self.source_lines.push(String::new());
        }
        self.source_set = true;

        let queued = std::mem::take(&mut self.pending);
        let mut err = std::io::stderr().lock();
        for diag in &queued {
            let _ = self.render_to(diag, &mut err);
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    fn paint(&self, c: &'static str) -> &'static str {
        if self.colors {
            c
        } else {
            ""
        }
    }

    fn line_text(&self, line: usize) -> Option<&str> {
        if line >= 1 && line <= self.source_lines.len() {
            Some(&self.source_lines[line - 1])
        } else {
            None
        }
    }

    /// Write one diagnostic in the five-line format:
    /// header, source line, caret underline, help, fix-it.
    pub fn render_to(&self, diag: &Diagnostic, out: &mut dyn Write) -> std::io::Result<()> {
        let level_color = match diag.severity {
            Severity::Error => color::BOLD_RED,
            Severity::Warning => color::BOLD_YELLOW,
            Severity::Note => color::BOLD_CYAN,
        };

        writeln!(
            out,
            "{}{}:{}:{}: {}{}{}: {}{}{}",
            self.paint(color::BOLD_WHITE),
            self.filename,
            diag.location.line,
            diag.location.column,
            self.paint(level_color),
            diag.severity.label(),
            self.paint(color::RESET),
            self.paint(color::BOLD_WHITE),
            diag.message,
            self.paint(color::RESET),
        )?;

        if let Some(line) = self.line_text(diag.location.line) {
            // Source line, tabs expanded so the caret math below holds.
            write!(
                out,
                "{}{:>width$} | {}",
                self.paint(color::BLUE),
                diag.location.line,
                self.paint(color::RESET),
                width = GUTTER_WIDTH,
            )?;
            for ch in line.chars() {
                if ch == '\t' {
                    write!(out, "{}", " ".repeat(TAB_WIDTH))?;
                } else {
                    write!(out, "{}", ch)?;
                }
            }
            writeln!(out)?;

            // Caret underline.
            let lead = display_width(line, diag.location.column.saturating_sub(1));
            let span = span_width(line, diag.location.column, diag.location.length);
            writeln!(
                out,
                "{}{} | {}{}{}^{}{}",
                " ".repeat(GUTTER_WIDTH),
                self.paint(color::BLUE),
                self.paint(color::RESET),
                " ".repeat(lead),
                self.paint(color::BOLD_GREEN),
                "~".repeat(span.saturating_sub(1)),
                self.paint(color::RESET),
            )?;
        }

        if let Some(help) = &diag.help {
            writeln!(
                out,
                "{}{} | {}{}help: {}{}",
                " ".repeat(GUTTER_WIDTH),
                self.paint(color::BLUE),
                self.paint(color::RESET),
                self.paint(color::BOLD_GREEN),
                self.paint(color::RESET),
                help,
            )?;
        }

        if let Some(fix) = &diag.fix {
            writeln!(
                out,
                "{}{} | {}{}try:  {}{}{}{}",
                " ".repeat(GUTTER_WIDTH),
                self.paint(color::BLUE),
                self.paint(color::RESET),
                self.paint(color::CYAN),
                self.paint(color::RESET),
                self.paint(color::BOLD),
                fix,
                self.paint(color::RESET),
            )?;
        }

        writeln!(out)
    }

    /// `N errors and M warnings generated.` on stderr; silent when clean.
    pub fn print_summary(&self) {
        if self.error_count == 0 && self.warning_count == 0 {
            return;
        }

        let mut parts = String::new();
        if self.error_count > 0 {
            parts.push_str(&format!(
                "{}{} error{}{}",
                self.paint(color::BOLD_RED),
                self.error_count,
                if self.error_count > 1 { "s" } else { "" },
                self.paint(color::RESET),
            ));
        }
        if self.error_count > 0 && self.warning_count > 0 {
            parts.push_str(" and ");
        }
        if self.warning_count > 0 {
            parts.push_str(&format!(
                "{}{} warning{}{}",
                self.paint(color::BOLD_YELLOW),
                self.warning_count,
                if self.warning_count > 1 { "s" } else { "" },
                self.paint(color::RESET),
            ));
        }
        eprintln!("{} generated.", parts);
    }
}

impl DiagnosticSink for DiagnosticEngine {
    fn report(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Note => {}
        }

        if self.source_set {
            let mut err = std::io::stderr().lock();
            let _ = self.render_to(&diag, &mut err);
        } else {
            self.pending.push(diag);
        }
    }
}

/// Display columns occupied by the first `byte_count` bytes of `line`.
/// Tabs take four columns, ASCII one, 2-byte UTF-8 sequences one, and
/// 3/4-byte sequences two (CJK glyphs are usually double width).
fn display_width(line: &str, byte_count: usize) -> usize {
    let bytes = line.as_bytes();
    let end = byte_count.min(bytes.len());
    let mut width = 0;
    let mut i = 0;
    while i < end {
        let b = bytes[i];
        if b == b'\t' {
            width += TAB_WIDTH;
            i += 1;
        } else if b < 0x80 {
            width += 1;
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            width += 1;
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            width += 2;
            i += 3;
        } else if b & 0xF8 == 0xF0 {
            width += 2;
            i += 4;
        } else {
            // Stray continuation byte.
            width += 1;
            i += 1;
        }
    }
    width
}

/// Display width of the `length`-byte span starting at 1-based `column`.
fn span_width(line: &str, column: usize, length: usize) -> usize {
    let start = column.saturating_sub(1);
    let total = display_width(line, start + length);
    total.saturating_sub(display_width(line, start)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::diagnostic::SourceLocation;

    fn render(lines: &[&str], diag: Diagnostic) -> String {
        let mut engine = DiagnosticEngine::new(false);
        engine.set_source(lines.iter().map(|s| s.to_string()).collect(), "test.pl0");
        let mut out = Vec::new();
        engine.render_to(&diag, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_basic_format() {
        let text = render(
            &["x = 1"],
            Diagnostic::error(SourceLocation::new(1, 3), "use ':=' for assignment")
                .with_help("'=' is for comparison")
                .with_fix(":="),
        );

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "test.pl0:1:3: error: use ':=' for assignment");
        assert_eq!(lines[1], "    1 | x = 1");
        assert_eq!(lines[2], "      |   ^");
        assert_eq!(lines[3], "      | help: '=' is for comparison");
        assert_eq!(lines[4], "      | try:  :=");
    }

    #[test]
    fn test_caret_span_tildes() {
        let text = render(
            &["a != b"],
            Diagnostic::error(
                SourceLocation::with_len(1, 3, 2),
                "'!=' is not valid in PL/0",
            ),
        );
        assert!(text.contains("      |   ^~\n"), "got:\n{}", text);
    }

    #[test]
    fn test_tab_expansion_moves_caret() {
        // One tab before the token: rendered as four spaces, caret after them.
        let text = render(
            &["\tx := 1"],
            Diagnostic::error(SourceLocation::new(1, 2), "message"),
        );
        assert!(text.contains("    1 |     x := 1\n"), "got:\n{}", text);
        assert!(text.contains("      |     ^\n"), "got:\n{}", text);
    }

    #[test]
    fn test_cjk_counts_double_width() {
        // Three bytes of CJK render two columns wide, so a diagnostic after
        // it is shifted by two, and a caret over it spans two columns.
        let line = "\u{4e2d} x";
        let text = render(
            &[line],
            Diagnostic::error(SourceLocation::with_len(1, 1, 3), "invalid character(s)"),
        );
        assert!(text.contains("      | ^~\n"), "got:\n{}", text);

        let text = render(&[line], Diagnostic::error(SourceLocation::new(1, 5), "m"));
        assert!(text.contains("      |    ^\n"), "got:\n{}", text);
    }

    #[test]
    fn test_no_source_line_when_out_of_range() {
        let text = render(&["one"], Diagnostic::error(SourceLocation::new(9, 1), "m"));
        assert_eq!(text.lines().count(), 1, "only the header: {}", text);
    }

    #[test]
    fn test_tallies_and_deferred_flush() {
        let mut engine = DiagnosticEngine::new(false);
        engine.report(Diagnostic::error(SourceLocation::new(1, 1), "a"));
        engine.report(Diagnostic::warning(SourceLocation::new(1, 2), "b"));
        engine.report(Diagnostic::note(SourceLocation::new(1, 3), "c"));

        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);
        assert!(engine.has_errors());
        // Queued until the source arrives.
        assert_eq!(engine.pending.len(), 3);

        engine.set_source(vec!["line".to_string()], "f.pl0");
        assert_eq!(engine.pending.len(), 0);
    }

    #[test]
    fn test_vec_sink_captures() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.report(Diagnostic::error(SourceLocation::new(2, 4), "boom"));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].location.line, 2);
    }

    #[test]
    fn test_colors_disabled_produces_no_escapes() {
        let text = render(&["x"], Diagnostic::error(SourceLocation::new(1, 1), "m"));
        assert!(!text.contains('\x1b'));
    }
}
