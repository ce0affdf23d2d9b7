use crate::codegen::emitter::CodeEmitter;
use crate::codegen::op::{opr, Instruction, OpCode};
use crate::codegen::symbols::{Symbol, SymbolKind, SymbolTable};
use crate::diag::{Diagnostic, DiagnosticSink, SourceLocation};
use crate::frontend::token::{Token, TokenKind};

#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Print the parse-tree trace while parsing (`--ast`).
    pub show_parse_tree: bool,
}

/// Predictive recursive-descent parser that emits stack-machine code while
/// it parses. Forward jumps go out with target 0 and are backpatched from
/// indices held on the recursion stack; there is no AST.
///
/// Errors are reported and parsing continues after synchronizing to a
/// statement or declaration boundary. `parse` returns true only when no
/// error was reported.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diag: &'a mut dyn DiagnosticSink,
    symbols: SymbolTable,
    emitter: CodeEmitter,
    options: ParserOptions,
    indent: usize,
    had_error: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, diag: &'a mut dyn DiagnosticSink) -> Self {
        let mut tokens = tokens;
        if tokens.is_empty() {
            tokens.push(Token::with_len(TokenKind::Eof, "", 1, 1, 0));
        }
        Parser {
            tokens,
            pos: 0,
            diag,
            symbols: SymbolTable::new(),
            emitter: CodeEmitter::new(),
            options: ParserOptions::default(),
            indent: 0,
            had_error: false,
        }
    }

    pub fn set_options(&mut self, options: ParserOptions) {
        self.options = options;
    }

    pub fn parse(&mut self) -> bool {
        if self.options.show_parse_tree {
            println!("\n{}", "=".repeat(50));
            println!("                    PARSE TREE");
            println!("{}\n", "=".repeat(50));
        }

        self.parse_program();

        if self.options.show_parse_tree {
            println!("\n{}", "=".repeat(50));
        }

        !self.had_error
    }

    pub fn code(&self) -> &[Instruction] {
        self.emitter.code()
    }

    pub fn into_code(self) -> Vec<Instruction> {
        self.emitter.into_code()
    }

    pub fn print_symbols(&self) {
        self.symbols.print();
    }

    pub fn print_code(&self) {
        self.emitter.print();
    }

    // Token navigation

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    // Error handling

    fn token_loc(token: &Token) -> SourceLocation {
        SourceLocation::with_len(token.line, token.column, token.length)
    }

    fn error(&mut self, diag: Diagnostic) {
        self.had_error = true;
        self.diag.report(diag);
    }

    fn found_text(token: &Token) -> String {
        if token.kind == TokenKind::Eof {
            "end of file".to_string()
        } else {
            format!("'{}'", token.text)
        }
    }

    fn report_expected(&mut self, expected: &str) {
        let token = self.current().clone();
        let msg = format!("expected {}, found {}", expected, Self::found_text(&token));
        let mut diag = Diagnostic::error(Self::token_loc(&token), msg);

        diag = match expected {
            "';'" => match token.kind {
                TokenKind::Begin => diag.with_help("add ';' before 'begin'"),
                TokenKind::Ident => diag.with_help("statements must be separated by ';'"),
                TokenKind::End => diag.with_help("add ';' after the last statement before 'end'"),
                _ => diag,
            },
            "':='" if token.kind == TokenKind::Eq => diag
                .with_help("use ':=' for assignment, '=' is for comparison")
                .with_fix(":="),
            "'then'" => diag.with_help("'if' condition must be followed by 'then'"),
            "'do'" => diag.with_help("'while' condition must be followed by 'do'"),
            "'end'" => diag.with_help("'begin' must have a matching 'end'"),
            "')'" => diag.with_help("missing closing parenthesis"),
            "'('" => diag.with_help("missing opening parenthesis"),
            _ => diag,
        };

        self.error(diag);
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.report_expected(expected);
            self.synchronize();
        }
    }

    fn expect_semicolon(&mut self) {
        if self.eat(TokenKind::Semicolon) {
            return;
        }

        let token = self.current().clone();
        let prev = self.previous().clone();
        if matches!(
            token.kind,
            TokenKind::Ident
                | TokenKind::Begin
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Call
                | TokenKind::Read
                | TokenKind::Write
        ) {
            // The semicolon is most likely missing right after the previous
            // token; point there instead of at the next statement.
            let loc = SourceLocation::new(prev.line, prev.column + prev.length);
            self.error(
                Diagnostic::error(loc, "expected ';'")
                    .with_help(format!("add ';' after '{}'", prev.text)),
            );
        } else {
            let msg = format!("expected ';', found {}", Self::found_text(&token));
            self.error(Diagnostic::error(Self::token_loc(&token), msg));
        }
        self.synchronize();
    }

    /// Skip to the next statement or declaration boundary: past a `;`, or
    /// up to `begin`/`end`/`const`/`var`/`procedure`/EOF.
    fn synchronize(&mut self) {
        while !self.check(TokenKind::Eof) {
            match self.current().kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::Begin
                | TokenKind::End
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::Procedure => return,
                _ => self.advance(),
            }
        }
    }

    // Parse-tree trace (--ast)

    fn trace_enter(&mut self, rule: &str) {
        if !self.options.show_parse_tree {
            return;
        }
        println!("{}├─ {}", "  ".repeat(self.indent), rule);
        self.indent += 1;
    }

    fn trace_exit(&mut self) {
        if !self.options.show_parse_tree {
            return;
        }
        self.indent -= 1;
    }

    fn trace(&mut self, message: impl AsRef<str>) {
        if !self.options.show_parse_tree {
            return;
        }
        println!("{}{}", "  ".repeat(self.indent), message.as_ref());
    }

    // Grammar

    // <prog> -> program <id>; <block>
    fn parse_program(&mut self) {
        self.trace_enter("<program>");

        self.expect(TokenKind::Program, "'program'");

        if self.check(TokenKind::Ident) {
            let name = self.current().text.clone();
            self.trace(format!("Program name: {}", name));
            self.advance();
        } else {
            self.report_expected("program name (identifier)");
        }

        self.expect(TokenKind::Semicolon, "';'");

        self.parse_block();

        self.emitter.emit(OpCode::Opr, 0, opr::RET);

        if !self.check(TokenKind::Eof) {
            let token = self.current().clone();
            self.error(
                Diagnostic::error(Self::token_loc(&token), "unexpected token after end of program")
                    .with_help("program should end after the main block"),
            );
        }

        self.trace_exit();
    }

    // <block> -> [<condecl>][<vardecl>][<proc>]<body>
    fn parse_block(&mut self) {
        self.trace_enter("<block>");

        // Reserve a jump over the nested procedure bodies.
        let jump_over = self.emitter.emit(OpCode::Jmp, 0, 0);

        if self.check(TokenKind::Const) {
            self.parse_const_decl();
        }
        if self.check(TokenKind::Var) {
            self.parse_var_decl();
        }
        while self.check(TokenKind::Procedure) {
            self.parse_procedure();
        }

        self.emitter.backpatch(jump_over, self.emitter.next_address());
        self.emitter.emit(OpCode::Int, 0, self.symbols.frame_size());

        self.parse_body();

        self.trace_exit();
    }

    // <condecl> -> const <const>{,<const>};
    // <const>   -> id := [+|-]<integer>
    fn parse_const_decl(&mut self) {
        self.trace_enter("<const-declaration>");

        self.expect(TokenKind::Const, "'const'");

        loop {
            if self.check(TokenKind::Ident) {
                let name_token = self.current().clone();
                self.advance();

                if self.check(TokenKind::Eq) {
                    let token = self.current().clone();
                    self.error(
                        Diagnostic::error(
                            Self::token_loc(&token),
                            "use ':=' for constant definition, not '='",
                        )
                        .with_help("PL/0 uses ':=' for both assignment and constant definition")
                        .with_fix(":="),
                    );
                    self.advance();
                } else {
                    self.expect(TokenKind::Assign, "':='");
                }

                let mut negative = false;
                if self.eat(TokenKind::Minus) {
                    negative = true;
                } else {
                    self.eat(TokenKind::Plus);
                }

                if self.check(TokenKind::Number) {
                    let mut value = literal_value(&self.current().text);
                    if negative {
                        value = value.wrapping_neg();
                    }

                    if self.symbols.lookup_current(&name_token.text).is_some() {
                        self.report_redefinition(&name_token);
                    } else {
                        self.symbols
                            .declare(&name_token.text, SymbolKind::Const, value);
                        self.trace(format!("Constant: {} = {}", name_token.text, value));
                    }
                    self.advance();
                } else {
                    self.report_expected("integer value");
                }
            } else {
                self.report_expected("identifier");
                break;
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect_semicolon();
        self.trace_exit();
    }

    // <vardecl> -> var <id>{,<id>};
    fn parse_var_decl(&mut self) {
        self.trace_enter("<var-declaration>");

        self.expect(TokenKind::Var, "'var'");

        loop {
            if self.check(TokenKind::Ident) {
                let name_token = self.current().clone();

                if self.symbols.lookup_current(&name_token.text).is_some() {
                    self.report_redefinition(&name_token);
                } else {
                    self.symbols.declare(&name_token.text, SymbolKind::Var, 0);
                    self.trace(format!("Variable: {}", name_token.text));
                }
                self.advance();
            } else {
                self.report_expected("identifier");
                break;
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect_semicolon();
        self.trace_exit();
    }

    // <proc> -> procedure <id>([<id>{,<id>}]);<block>;
    fn parse_procedure(&mut self) {
        self.trace_enter("<procedure>");

        self.expect(TokenKind::Procedure, "'procedure'");

        if self.check(TokenKind::Ident) {
            let name_token = self.current().clone();
            if self.symbols.lookup_current(&name_token.text).is_some() {
                let msg = format!("redefinition of procedure '{}'", name_token.text);
                self.error(Diagnostic::error(Self::token_loc(&name_token), msg));
            } else {
                // The entry address is where this procedure's block starts.
                self.symbols.declare(
                    &name_token.text,
                    SymbolKind::Procedure,
                    self.emitter.next_address() as i32,
                );
                self.trace(format!("Procedure: {}", name_token.text));
            }
            self.advance();
        } else {
            self.report_expected("procedure name");
        }

        self.expect(TokenKind::LParen, "'('");

        self.symbols.enter_scope();

        if self.check(TokenKind::Ident) {
            self.trace("Parameters:");
            loop {
                if self.check(TokenKind::Ident) {
                    let name = self.current().text.clone();
                    self.symbols.declare(&name, SymbolKind::Var, 0);
                    self.trace(format!("  - {}", name));
                    self.advance();
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RParen, "')'");
        self.expect_semicolon();

        self.parse_block();

        self.emitter.emit(OpCode::Opr, 0, opr::RET);
        self.symbols.exit_scope();

        self.expect_semicolon();
        self.trace_exit();
    }

    // <body> -> begin <statement>{;<statement>} end
    fn parse_body(&mut self) {
        self.trace_enter("<body>");

        self.expect(TokenKind::Begin, "'begin'");

        self.parse_statement();

        while self.eat(TokenKind::Semicolon) {
            if self.check(TokenKind::End) {
                // Trailing semicolon before 'end' is tolerated.
                break;
            }
            self.parse_statement();
        }

        if !self.check(TokenKind::End) {
            if matches!(
                self.current().kind,
                TokenKind::Ident
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::Call
                    | TokenKind::Read
                    | TokenKind::Write
                    | TokenKind::Begin
            ) {
                let token = self.current().clone();
                self.error(
                    Diagnostic::error(Self::token_loc(&token), "expected ';' between statements")
                        .with_help("statements must be separated by ';'"),
                );
            } else {
                self.report_expected("'end'");
            }
        }

        self.expect(TokenKind::End, "'end'");
        self.trace_exit();
    }

    fn parse_statement(&mut self) {
        self.trace_enter("<statement>");

        if self.check(TokenKind::Ident) {
            self.parse_assignment();
        } else if self.eat(TokenKind::If) {
            self.trace("IF statement");

            self.parse_condition();
            self.expect(TokenKind::Then, "'then'");

            let jump_false = self.emitter.emit(OpCode::Jpc, 0, 0);
            self.parse_statement();

            if self.eat(TokenKind::Else) {
                self.trace("ELSE clause");
                let jump_end = self.emitter.emit(OpCode::Jmp, 0, 0);
                self.emitter.backpatch(jump_false, self.emitter.next_address());
                self.parse_statement();
                self.emitter.backpatch(jump_end, self.emitter.next_address());
            } else {
                self.emitter.backpatch(jump_false, self.emitter.next_address());
            }
        } else if self.eat(TokenKind::While) {
            self.trace("WHILE loop");

            let loop_top = self.emitter.next_address();
            self.parse_condition();
            self.expect(TokenKind::Do, "'do'");

            let jump_out = self.emitter.emit(OpCode::Jpc, 0, 0);
            self.parse_statement();
            self.emitter.emit(OpCode::Jmp, 0, loop_top as i32);
            self.emitter.backpatch(jump_out, self.emitter.next_address());
        } else if self.eat(TokenKind::Call) {
            self.parse_call();
        } else if self.check(TokenKind::Begin) {
            self.parse_body();
        } else if self.eat(TokenKind::Read) {
            self.parse_read();
        } else if self.eat(TokenKind::Write) {
            self.parse_write();
        } else if !matches!(
            self.current().kind,
            TokenKind::Semicolon | TokenKind::End | TokenKind::Else | TokenKind::Eof
        ) {
            // Empty statements are allowed; anything else cannot start one.
            let token = self.current().clone();
            self.error(
                Diagnostic::error(Self::token_loc(&token), "unexpected token in statement")
                    .with_help(
                        "expected statement starting with identifier, 'if', 'while', 'call', \
                         'begin', 'read', or 'write'",
                    ),
            );
        }

        self.trace_exit();
    }

    fn parse_assignment(&mut self) {
        let name_token = self.current().clone();
        let symbol = self.symbols.lookup(&name_token.text).cloned();

        self.trace(format!("Assignment to: {}", name_token.text));

        let target = match symbol {
            None => {
                let msg = format!("use of undeclared identifier '{}'", name_token.text);
                let help = format!("declare '{}' with 'var' before use", name_token.text);
                self.error(Diagnostic::error(Self::token_loc(&name_token), msg).with_help(help));
                self.recover_assignment();
                return;
            }
            Some(sym) if sym.kind == SymbolKind::Const => {
                let msg = format!("cannot assign to constant '{}'", name_token.text);
                let help = format!("'{}' was declared as 'const'", name_token.text);
                self.error(Diagnostic::error(Self::token_loc(&name_token), msg).with_help(help));
                self.recover_assignment();
                return;
            }
            Some(sym) if sym.kind == SymbolKind::Procedure => {
                let msg = format!("cannot assign to procedure '{}'", name_token.text);
                let help = format!("did you mean 'call {}(...)'?", name_token.text);
                self.error(Diagnostic::error(Self::token_loc(&name_token), msg).with_help(help));
                self.recover_assignment();
                return;
            }
            Some(sym) => sym,
        };

        self.advance();

        if self.check(TokenKind::Eq) {
            let token = self.current().clone();
            self.error(
                Diagnostic::error(Self::token_loc(&token), "use ':=' for assignment, not '='")
                    .with_help("'=' is for comparison, ':=' is for assignment")
                    .with_fix(":="),
            );
            self.advance();
        } else {
            self.expect(TokenKind::Assign, "':='");
        }

        self.parse_expression();

        let level = self.level_diff(&target);
        self.emitter.emit(OpCode::Sto, level, target.value);
    }

    /// After a bad assignment target: skip the name, and if an assignment
    /// follows, still parse the right-hand side for its errors.
    fn recover_assignment(&mut self) {
        self.advance();
        if self.check(TokenKind::Assign) || self.check(TokenKind::Eq) {
            self.advance();
            self.parse_expression();
        }
    }

    // call <id>([<exp>{,<exp>}])
    fn parse_call(&mut self) {
        self.trace("CALL statement");

        let mut callee: Option<(i32, i32)> = None;

        if self.check(TokenKind::Ident) {
            let name_token = self.current().clone();
            let symbol = self.symbols.lookup(&name_token.text).cloned();
            self.trace(format!("Calling: {}", name_token.text));

            match symbol {
                None => {
                    let msg = format!("call to undeclared procedure '{}'", name_token.text);
                    self.error(
                        Diagnostic::error(Self::token_loc(&name_token), msg)
                            .with_help("declare procedure before calling it"),
                    );
                }
                Some(sym) if sym.kind != SymbolKind::Procedure => {
                    let msg = format!(
                        "'{}' is a {}, not a procedure",
                        name_token.text,
                        sym.kind.readable()
                    );
                    self.error(
                        Diagnostic::error(Self::token_loc(&name_token), msg)
                            .with_help("only procedures can be called"),
                    );
                }
                Some(sym) => {
                    callee = Some((self.level_diff(&sym), sym.value));
                }
            }
            self.advance();
        } else {
            self.report_expected("procedure name");
        }

        self.expect(TokenKind::LParen, "'('");

        // Arguments are evaluated onto the stack; the callee's INT then
        // repositions T past them, so they never reach its frame.
        if !self.check(TokenKind::RParen) {
            loop {
                self.parse_expression();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RParen, "')'");

        if let Some((level, entry)) = callee {
            self.emitter.emit(OpCode::Cal, level, entry);
        }
    }

    // read(<id>{,<id>})
    fn parse_read(&mut self) {
        self.trace("READ statement");

        self.expect(TokenKind::LParen, "'('");

        loop {
            if self.check(TokenKind::Ident) {
                let name_token = self.current().clone();
                let symbol = self.symbols.lookup(&name_token.text).cloned();
                self.trace(format!("Reading into: {}", name_token.text));

                match symbol {
                    None => {
                        let msg = format!("use of undeclared identifier '{}'", name_token.text);
                        self.error(Diagnostic::error(Self::token_loc(&name_token), msg));
                    }
                    Some(sym) if sym.kind == SymbolKind::Const => {
                        let msg = format!("cannot read into constant '{}'", name_token.text);
                        let help = format!("'{}' was declared as 'const'", name_token.text);
                        self.error(
                            Diagnostic::error(Self::token_loc(&name_token), msg).with_help(help),
                        );
                    }
                    Some(sym) if sym.kind == SymbolKind::Procedure => {
                        let msg = format!("cannot read into procedure '{}'", name_token.text);
                        self.error(Diagnostic::error(Self::token_loc(&name_token), msg));
                    }
                    Some(sym) => {
                        let level = self.level_diff(&sym);
                        self.emitter.emit(OpCode::Red, level, sym.value);
                    }
                }
                self.advance();
            } else {
                self.report_expected("identifier");
                break;
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen, "')'");
    }

    // write(<exp>{,<exp>})
    fn parse_write(&mut self) {
        self.trace("WRITE statement");

        self.expect(TokenKind::LParen, "'('");

        loop {
            self.parse_expression();
            self.emitter.emit(OpCode::Wrt, 0, 0);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen, "')'");
    }

    // <lexp> -> <exp> <lop> <exp> | odd <exp>
    fn parse_condition(&mut self) {
        self.trace_enter("<condition>");

        if self.eat(TokenKind::Odd) {
            self.trace("ODD operator");
            self.parse_expression();
            self.emitter.emit(OpCode::Opr, 0, opr::ODD);
        } else {
            self.parse_expression();

            let op = self.current().kind;
            let code = match op {
                TokenKind::Eq => Some(opr::EQ),
                TokenKind::Ne => Some(opr::NEQ),
                TokenKind::Lt => Some(opr::LT),
                TokenKind::Le => Some(opr::LEQ),
                TokenKind::Gt => Some(opr::GT),
                TokenKind::Ge => Some(opr::GEQ),
                _ => None,
            };

            match code {
                Some(code) => {
                    self.trace(format!("Relational operator: {}", self.current().text));
                    self.advance();
                    self.parse_expression();
                    self.emitter.emit(OpCode::Opr, 0, code);
                }
                None => {
                    let token = self.current().clone();
                    self.error(
                        Diagnostic::error(
                            Self::token_loc(&token),
                            "expected relational operator (=, <>, <, <=, >, >=)",
                        )
                        .with_help("conditions require a comparison"),
                    );
                }
            }
        }

        self.trace_exit();
    }

    // <exp> -> [+|-]<term>{<aop><term>}
    fn parse_expression(&mut self) {
        self.trace_enter("<expression>");

        let mut negative = false;
        if self.eat(TokenKind::Plus) {
            self.trace("Unary +");
        } else if self.eat(TokenKind::Minus) {
            self.trace("Unary -");
            negative = true;
        }

        self.parse_term();

        if negative {
            self.emitter.emit(OpCode::Opr, 0, opr::NEG);
        }

        while matches!(self.current().kind, TokenKind::Plus | TokenKind::Minus) {
            let op = self.current().kind;
            self.trace(format!("Operator: {}", self.current().text));
            self.advance();
            self.parse_term();

            let code = if op == TokenKind::Plus { opr::ADD } else { opr::SUB };
            self.emitter.emit(OpCode::Opr, 0, code);
        }

        self.trace_exit();
    }

    // <term> -> <factor>{<mop><factor>}
    fn parse_term(&mut self) {
        self.trace_enter("<term>");

        self.parse_factor();

        while matches!(self.current().kind, TokenKind::Star | TokenKind::Slash) {
            let op = self.current().kind;
            self.trace(format!("Operator: {}", self.current().text));
            self.advance();
            self.parse_factor();

            let code = if op == TokenKind::Star { opr::MUL } else { opr::DIV };
            self.emitter.emit(OpCode::Opr, 0, code);
        }

        self.trace_exit();
    }

    // <factor> -> <id> | <integer> | (<exp>)
    fn parse_factor(&mut self) {
        self.trace_enter("<factor>");

        if self.check(TokenKind::Ident) {
            let name_token = self.current().clone();
            let symbol = self.symbols.lookup(&name_token.text).cloned();
            self.trace(format!("Identifier: {}", name_token.text));

            match symbol {
                None => {
                    let msg = format!("use of undeclared identifier '{}'", name_token.text);
                    let help = format!("declare '{}' before use", name_token.text);
                    self.error(
                        Diagnostic::error(Self::token_loc(&name_token), msg).with_help(help),
                    );
                }
                Some(sym) => match sym.kind {
                    SymbolKind::Const => {
                        self.emitter.emit(OpCode::Lit, 0, sym.value);
                    }
                    SymbolKind::Var => {
                        let level = self.level_diff(&sym);
                        self.emitter.emit(OpCode::Lod, level, sym.value);
                    }
                    SymbolKind::Procedure => {
                        let msg =
                            format!("procedure '{}' cannot be used as a value", name_token.text);
                        self.error(
                            Diagnostic::error(Self::token_loc(&name_token), msg)
                                .with_help("procedures cannot appear in expressions"),
                        );
                    }
                },
            }
            self.advance();
        } else if self.check(TokenKind::Number) {
            let value = literal_value(&self.current().text);
            self.trace(format!("Integer: {}", value));
            self.emitter.emit(OpCode::Lit, 0, value);
            self.advance();
        } else if self.eat(TokenKind::LParen) {
            self.trace("( expression )");
            self.parse_expression();
            self.expect(TokenKind::RParen, "')'");
        } else {
            let token = self.current().clone();
            if token.kind == TokenKind::Eof {
                self.error(
                    Diagnostic::error(Self::token_loc(&token), "unexpected end of file in expression")
                        .with_help("expression is incomplete"),
                );
            } else {
                let msg = "expected expression (identifier, number, or '(')".to_string();
                let help = format!(
                    "found '{}' which cannot start an expression",
                    token.text
                );
                self.error(Diagnostic::error(Self::token_loc(&token), msg).with_help(help));
            }
        }

        self.trace_exit();
    }

    fn level_diff(&self, symbol: &Symbol) -> i32 {
        (self.symbols.current_level() - symbol.level) as i32
    }

    fn report_redefinition(&mut self, name_token: &Token) {
        let msg = format!("redefinition of '{}'", name_token.text);
        let help = format!("'{}' is already declared in this scope", name_token.text);
        self.error(Diagnostic::error(Self::token_loc(name_token), msg).with_help(help));
    }
}

/// The lexer has already diagnosed out-of-range literals; here the value is
/// clamped into the i32 operand range so emission can proceed.
fn literal_value(text: &str) -> i32 {
    text.parse::<i64>()
        .unwrap_or(0)
        .clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
