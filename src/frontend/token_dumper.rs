use crate::frontend::token::{Token, TokenKind};

/// Prints the `--tokens` table.
pub struct TokenDumper {
    pub color: bool,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self { color: true }
    }
}

impl TokenDumper {
    const RESET: &'static str = "\x1b[0m";
    const BOLD: &'static str = "\x1b[1m";
    const DIM: &'static str = "\x1b[2m";
    const RED: &'static str = "\x1b[31m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn dump(&self, tokens: &[Token]) {
        let bold = self.paint(Self::BOLD);
        let reset = self.paint(Self::RESET);

        println!();
        println!(
            "{}{:>6} {:>5}  {:<13} {}{}",
            bold, "Line", "Col", "Type", "Value", reset
        );
        println!("{}", "-".repeat(44));

        for token in tokens {
            self.print_one(token);
        }

        println!("{}", "-".repeat(44));
        let count = tokens.len().saturating_sub(1); // EOF excluded
        println!("Total tokens: {}{}{}\n", bold, count, reset);
    }

    fn print_one(&self, token: &Token) {
        let color = self.paint(self.class_color(token.kind));
        let reset = self.paint(Self::RESET);
        let blue = self.paint(Self::BLU);

        let mut value = token.text.clone();
        if value.len() > 18 {
            value.truncate(15);
            value.push_str("...");
        }

        println!(
            "{}{:>6}{} {:>5}  {}{:<13}{} {}",
            blue,
            token.line,
            reset,
            token.column,
            color,
            token.kind.name(),
            reset,
            value
        );
    }

    fn class_color(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Error => Self::RED,
            TokenKind::Ident | TokenKind::Number => Self::YEL,
            TokenKind::Eof => Self::DIM,
            k if k.is_keyword() => Self::GRN,
            _ => Self::RESET,
        }
    }

    fn paint(&self, c: &'static str) -> &'static str {
        if self.color {
            c
        } else {
            ""
        }
    }
}
