use std::io::{self, Read};
use std::path::Path;

use crate::diag::{Diagnostic, Severity, SourceLocation};
use crate::diag::DiagnosticSink;
use crate::frontend::buffer::InputBuffer;
use crate::frontend::token::{Token, TokenKind};

/// Longest-match tokenizer over the double-buffered input.
///
/// The lexer never aborts: malformed input becomes `Error` tokens plus
/// diagnostics, and scanning continues so the parser can report more.
pub struct Lexer<'a> {
    buffer: InputBuffer,
    diag: &'a mut dyn DiagnosticSink,
    had_error: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(diag: &'a mut dyn DiagnosticSink) -> Self {
        Lexer {
            buffer: InputBuffer::new(),
            diag,
            had_error: false,
        }
    }

    pub fn init_from_file(&mut self, path: &Path) -> io::Result<()> {
        self.buffer.init_from_file(path)
    }

    pub fn init_from_str(&mut self, source: &str) {
        self.buffer.init_from_str(source);
    }

    pub fn init_from_reader(&mut self, reader: Box<dyn Read>) {
        self.buffer.init_from_reader(reader);
    }

    pub fn had_errors(&self) -> bool {
        self.had_error
    }

    /// Completed source lines, for the diagnostic engine.
    pub fn take_source_lines(&mut self) -> Vec<String> {
        self.buffer.take_source_lines()
    }

    fn current(&self) -> u8 {
        self.buffer.current()
    }

    fn advance(&mut self) {
        self.buffer.advance();
    }

    fn start_location(&self) -> SourceLocation {
        SourceLocation::new(
            self.buffer.lexeme_start_line(),
            self.buffer.lexeme_start_column(),
        )
    }

    fn start_location_len(&self, length: usize) -> SourceLocation {
        SourceLocation::with_len(
            self.buffer.lexeme_start_line(),
            self.buffer.lexeme_start_column(),
            length,
        )
    }

    fn emit(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.had_error = true;
        }
        self.diag.report(diag);
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_ascii_whitespace() && !self.buffer.is_eof() {
            self.advance();
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.buffer.is_eof() {
                break;
            }

            let b = self.current();
            let token = if b.is_ascii_alphabetic() || b == b'_' {
                self.read_ident_or_keyword()
            } else if b.is_ascii_digit() {
                self.read_number()
            } else {
                self.read_operator()
            };
            tokens.push(token);
        }

        tokens.push(Token::with_len(
            TokenKind::Eof,
            "",
            self.buffer.line(),
            self.buffer.column(),
            0,
        ));
        tokens
    }

    fn read_ident_or_keyword(&mut self) -> Token {
        self.buffer.mark_lexeme_start();
        let line = self.buffer.lexeme_start_line();
        let column = self.buffer.lexeme_start_column();

        let mut text = String::new();
        while self.current().is_ascii_alphanumeric() || self.current() == b'_' {
            text.push(self.current() as char);
            self.advance();
        }

        if text.starts_with('_') {
            let loc = self.start_location_len(text.len());
            self.emit(
                Diagnostic::error(loc, "identifier cannot start with underscore")
                    .with_help("identifiers must start with a letter"),
            );
            return Token::new(TokenKind::Error, text, line, column);
        }

        let lower = text.to_ascii_lowercase();
        match TokenKind::keyword(&lower) {
            Some(kind) => Token::new(kind, text, line, column),
            None => Token::new(TokenKind::Ident, text, line, column),
        }
    }

    fn read_number(&mut self) -> Token {
        self.buffer.mark_lexeme_start();
        let line = self.buffer.lexeme_start_line();
        let column = self.buffer.lexeme_start_column();

        let mut text = String::new();
        while self.current().is_ascii_digit() {
            text.push(self.current() as char);
            self.advance();
        }

        // A letter glued to the digits makes the whole run one bad
        // identifier, reported as a single token.
        if self.current().is_ascii_alphabetic() || self.current() == b'_' {
            while self.current().is_ascii_alphanumeric() || self.current() == b'_' {
                text.push(self.current() as char);
                self.advance();
            }
            let loc = self.start_location_len(text.len());
            self.emit(
                Diagnostic::error(loc, format!("invalid identifier '{}'", text))
                    .with_help("identifiers cannot start with a digit"),
            );
            return Token::new(TokenKind::Error, text, line, column);
        }

        match text.parse::<i64>() {
            Ok(value) if value > i32::MAX as i64 => {
                let loc = self.start_location_len(text.len());
                self.emit(
                    Diagnostic::warning(loc, "integer literal is too large")
                        .with_help("maximum value is 2147483647"),
                );
            }
            Ok(_) => {}
            Err(_) => {
                let loc = self.start_location_len(text.len());
                self.emit(Diagnostic::error(loc, "integer literal overflow"));
            }
        }

        Token::new(TokenKind::Number, text, line, column)
    }

    fn read_operator(&mut self) -> Token {
        self.buffer.mark_lexeme_start();
        let line = self.buffer.lexeme_start_line();
        let column = self.buffer.lexeme_start_column();

        let single = |kind: TokenKind, text: &str| Token::new(kind, text, line, column);

        match self.current() {
            b'+' => {
                self.advance();
                single(TokenKind::Plus, "+")
            }
            b'-' => {
                self.advance();
                single(TokenKind::Minus, "-")
            }
            b'*' => {
                self.advance();
                single(TokenKind::Star, "*")
            }
            b'/' => {
                self.advance();
                single(TokenKind::Slash, "/")
            }
            b'(' => {
                self.advance();
                single(TokenKind::LParen, "(")
            }
            b')' => {
                self.advance();
                single(TokenKind::RParen, ")")
            }
            b',' => {
                self.advance();
                single(TokenKind::Comma, ",")
            }
            b';' => {
                self.advance();
                single(TokenKind::Semicolon, ";")
            }
            b'=' => {
                self.advance();
                single(TokenKind::Eq, "=")
            }
            b'<' => {
                self.advance();
                if self.current() == b'=' {
                    self.advance();
                    single(TokenKind::Le, "<=")
                } else if self.current() == b'>' {
                    self.advance();
                    single(TokenKind::Ne, "<>")
                } else {
                    single(TokenKind::Lt, "<")
                }
            }
            b'>' => {
                self.advance();
                if self.current() == b'=' {
                    self.advance();
                    single(TokenKind::Ge, ">=")
                } else {
                    single(TokenKind::Gt, ">")
                }
            }
            b':' => {
                self.advance();
                if self.current() == b'=' {
                    self.advance();
                    single(TokenKind::Assign, ":=")
                } else {
                    let loc = self.start_location();
                    self.emit(
                        Diagnostic::error(loc, "unexpected ':' - did you mean ':='?")
                            .with_help("use ':=' for assignment")
                            .with_fix(":="),
                    );
                    single(TokenKind::Error, ":")
                }
            }
            b'!' => {
                self.advance();
                if self.current() == b'=' {
                    self.advance();
                    let loc = self.start_location_len(2);
                    self.emit(
                        Diagnostic::error(loc, "'!=' is not valid in PL/0")
                            .with_help("use '<>' for not-equal comparison")
                            .with_fix("<>"),
                    );
                    single(TokenKind::Error, "!=")
                } else {
                    let loc = self.start_location();
                    self.emit(Diagnostic::error(loc, "unexpected character '!'"));
                    single(TokenKind::Error, "!")
                }
            }
            op @ (b'&' | b'|') => {
                self.advance();
                let mut text = String::from(op as char);
                if self.current() == op {
                    self.advance();
                    text.push(op as char);
                }
                let loc = self.start_location_len(text.len());
                self.emit(
                    Diagnostic::error(loc, format!("'{}' is not valid in PL/0", text))
                        .with_help("PL/0 does not have logical operators"),
                );
                Token::new(TokenKind::Error, text, line, column)
            }
            b if b >= 0x80 => self.read_invalid_utf8_run(line, column),
            _ => self.read_invalid_ascii_run(line, column),
        }
    }

    /// Consume one UTF-8 sequence per lead byte, then coalesce the run of
    /// following invalid bytes so a multi-byte glyph is one token, not N.
    fn read_invalid_utf8_run(&mut self, line: usize, column: usize) -> Token {
        let mut bytes = Vec::new();
        self.consume_utf8_sequence(&mut bytes);

        while !self.buffer.is_eof() && !self.current().is_ascii_whitespace() {
            let b = self.current();
            if b < 0x80 && is_valid_token_start(b) {
                break;
            }
            if b >= 0x80 {
                self.consume_utf8_sequence(&mut bytes);
            } else {
                bytes.push(b);
                self.advance();
            }
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let loc = self.start_location_len(bytes.len());
        self.emit(
            Diagnostic::error(loc, format!("invalid character(s) '{}'", text))
                .with_help("PL/0 only supports ASCII characters"),
        );
        Token::with_len(TokenKind::Error, text, line, column, bytes.len())
    }

    fn consume_utf8_sequence(&mut self, bytes: &mut Vec<u8>) {
        let len = utf8_sequence_len(self.current());
        for _ in 0..len {
            if self.buffer.is_eof() {
                break;
            }
            bytes.push(self.current());
            self.advance();
        }
    }

    fn read_invalid_ascii_run(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        text.push(self.current() as char);
        self.advance();

        while !self.buffer.is_eof() && !self.current().is_ascii_whitespace() {
            let b = self.current();
            if is_valid_token_start(b) || b >= 0x80 {
                break;
            }
            text.push(b as char);
            self.advance();
        }

        let loc = self.start_location_len(text.len());
        let mut diag = Diagnostic::error(loc, format!("unexpected character '{}'", text));
        diag = match text.as_str() {
            "{" | "}" => diag.with_help("use 'begin' and 'end' for blocks in PL/0"),
            "[" | "]" => diag.with_help("PL/0 does not support arrays"),
            "\"" | "'" => diag.with_help("PL/0 does not support string literals"),
            _ => diag,
        };
        self.emit(diag);
        Token::new(TokenKind::Error, text, line, column)
    }
}

/// Bytes that can begin a well-formed token.
fn is_valid_token_start(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'+' | b'-' | b'*' | b'/' | b'(' | b')' | b',' | b';' | b'=' | b'<' | b'>' | b':'
        )
}

/// Sequence length from a UTF-8 lead byte; malformed leads count as one.
fn utf8_sequence_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}
