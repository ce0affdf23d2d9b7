//! End-to-end compilation and execution tests.
//!
//! These drive the complete source → tokens → code → VM path with captured
//! diagnostics and injected standard streams.

use pl0::codegen::{OpCode, Parser};
use pl0::diag::{Diagnostic, DiagnosticEngine, Severity};
use pl0::frontend::Lexer;
use pl0::runtime::{Interpreter, RuntimeError};

/// Compile a source string, returning the instruction vector, everything
/// reported, and whether both phases were clean.
fn compile(source: &str) -> (Vec<pl0::codegen::Instruction>, Vec<Diagnostic>, bool) {
    let mut diags = Vec::new();

    let tokens = {
        let mut lexer = Lexer::new(&mut diags);
        lexer.init_from_str(source);
        lexer.tokenize()
    };

    let mut parser = Parser::new(tokens, &mut diags);
    let parse_ok = parser.parse();
    let code = parser.into_code();

    let clean = parse_ok && !diags.iter().any(|d| d.severity == Severity::Error);
    (code, diags, clean)
}

/// Compile (expecting success) and run with the given stdin bytes;
/// returns everything written to stdout.
fn run(source: &str, stdin: &str) -> String {
    let (code, diags, ok) = compile(source);
    assert!(ok, "compile failed: {:?}", diags);

    let mut vm = Interpreter::new(false);
    vm.load(code);
    let mut output = Vec::new();
    vm.run_with_io(&mut stdin.as_bytes(), &mut output)
        .unwrap_or_else(|e| panic!("run failed: {}", e));
    String::from_utf8(output).unwrap()
}

fn run_expect_err(source: &str, stdin: &str) -> RuntimeError {
    let (code, diags, ok) = compile(source);
    assert!(ok, "compile failed: {:?}", diags);

    let mut vm = Interpreter::new(false);
    vm.load(code);
    let mut output = Vec::new();
    vm.run_with_io(&mut stdin.as_bytes(), &mut output)
        .expect_err("expected a runtime error")
}

fn error_messages(diags: &[Diagnostic]) -> Vec<String> {
    diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect()
}

#[test]
fn test_arithmetic_and_write() {
    let out = run("program p; var x; begin x := 2 + 3 * 4; write(x) end", "");
    assert_eq!(out, "14\n");
}

#[test]
fn test_factorial_via_recursion() {
    // Recursion with the result accumulated through program-level
    // variables, since call arguments do not reach the callee frame.
    let source = "program fact;
var n, f;
procedure go();
begin
  if n > 1 then
  begin
    f := f * n;
    n := n - 1;
    call go()
  end
end;
begin
  read(n);
  f := 1;
  call go();
  write(f)
end";
    assert_eq!(run(source, "5\n"), "? 120\n");
}

#[test]
fn test_while_loop_sum() {
    let source = "program p; var i, s; begin i := 1; s := 0; \
                  while i <= 10 do begin s := s + i; i := i + 1 end; write(s) end";
    assert_eq!(run(source, ""), "55\n");
}

#[test]
fn test_constants_and_unary_minus() {
    let source = "program p; const a := -7; var x; begin x := a + 10; write(x) end";
    assert_eq!(run(source, ""), "3\n");
}

#[test]
fn test_undeclared_identifier_reported() {
    let (_, diags, ok) = compile("program p; var a; begin a := b + 1 end");
    assert!(!ok);
    let msgs = error_messages(&diags);
    assert!(
        msgs.iter().any(|m| m.contains("use of undeclared identifier 'b'")),
        "got: {:?}",
        msgs
    );
}

#[test]
fn test_assignment_typo_has_fixit() {
    let (_, diags, ok) = compile("program p; var a; begin a = 1 end");
    assert!(!ok);
    let fix = diags
        .iter()
        .find(|d| d.message.contains("use ':=' for assignment"))
        .expect("missing ':=' diagnostic");
    assert_eq!(fix.fix.as_deref(), Some(":="));
}

#[test]
fn test_empty_program_runs_silently() {
    assert_eq!(run("program p; begin end", ""), "");
}

#[test]
fn test_nested_procedures_scope_walk() {
    // inner sits two levels below the program scope and reaches x through
    // two static links; outer reaches it through one.
    let source = "program p;
var x;
procedure outer();
  procedure inner();
  begin
    x := x + 1;
    write(x)
  end;
begin
  x := x * 10;
  call inner()
end;
begin
  x := 4;
  call outer()
end";
    assert_eq!(run(source, ""), "41\n");
}

#[test]
fn test_else_branch_taken() {
    let source = "program p; var x; begin \
                  if 1 > 2 then write(1) else write(2); \
                  if 2 > 1 then write(3) else write(4) end";
    assert_eq!(run(source, ""), "2\n3\n");
}

#[test]
fn test_odd_condition() {
    let source = "program p; var i; begin i := 0; \
                  while i < 6 do begin if odd i then write(i); i := i + 1 end end";
    assert_eq!(run(source, ""), "1\n3\n5\n");
}

#[test]
fn test_multiple_reads_and_writes() {
    let source = "program p; var a, b; begin read(a, b); write(a + b, a * b) end";
    assert_eq!(run(source, "3\n4\n"), "? ? 7\n12\n");
}

#[test]
fn test_division_by_zero_at_runtime() {
    let err = run_expect_err("program p; var x; begin x := 1 / 0; write(x) end", "");
    assert!(matches!(err, RuntimeError::DivisionByZero));
    assert_eq!(err.to_string(), "Division by zero");
}

#[test]
fn test_runaway_recursion_overflows_stack() {
    let source = "program p; procedure loop(); begin call loop() end; begin call loop() end";
    let err = run_expect_err(source, "");
    assert!(matches!(err, RuntimeError::StackOverflow));
}

#[test]
fn test_deterministic_output() {
    let source = "program p; var n; begin read(n); write(n * n) end";
    assert_eq!(run(source, "9\n"), run(source, "9\n"));
}

#[test]
fn test_source_larger_than_one_buffer_block() {
    // Push the interesting code past the 4096-byte refill boundary; the
    // token stream must come out as if the file were lexed in one piece.
    let mut source = String::from("program p; var x; begin\n");
    for _ in 0..600 {
        source.push_str("  x := x + 1;\n"); // ~8 KiB of statements
    }
    source.push_str("  x := x - x;\n  write(x)\nend");
    assert_eq!(run(&source, ""), "0\n");
}

#[test]
fn test_arguments_are_evaluated_but_not_passed() {
    // The argument expression runs (its side effects on the stack are
    // discarded by the callee's INT); the callee sees only globals.
    let source = "program p;
var x;
procedure show();
begin
  write(x)
end;
begin
  x := 8;
  call show(x + 1000)
end";
    assert_eq!(run(source, ""), "8\n");
}

#[test]
fn test_call_emits_arguments_before_cal() {
    let (code, _, ok) = compile(
        "program p; var x; procedure q(); begin end; begin call q(x * 2) end",
    );
    assert!(ok);
    let cal_at = code.iter().position(|i| i.op == OpCode::Cal).unwrap();
    let mul_at = code
        .iter()
        .position(|i| i.op == OpCode::Opr && i.address == 4)
        .unwrap();
    assert!(mul_at < cal_at, "argument code must precede CAL");
}

#[test]
fn test_all_compile_errors_surface_in_one_pass() {
    let source = "program p; const c := 1; var a; begin \
                  a := b; c := 2; call a(); read(c) end";
    let (_, diags, ok) = compile(source);
    assert!(!ok);
    let msgs = error_messages(&diags);
    assert!(msgs.iter().any(|m| m.contains("undeclared identifier 'b'")));
    assert!(msgs.iter().any(|m| m.contains("cannot assign to constant 'c'")));
    assert!(msgs.iter().any(|m| m.contains("'a' is a variable, not a procedure")));
    assert!(msgs.iter().any(|m| m.contains("cannot read into constant 'c'")));
}

#[test]
fn test_rendered_diagnostic_layout() {
    let source = "program p; var a;\nbegin\n  a = 1\nend";
    let (_, diags, _) = compile(source);
    let bad = diags
        .iter()
        .find(|d| d.fix.is_some())
        .expect("expected a fix-it diagnostic");

    let mut engine = DiagnosticEngine::new(false);
    engine.set_source(source.lines().map(|l| l.to_string()).collect(), "prog.pl0");
    let mut rendered = Vec::new();
    engine.render_to(bad, &mut rendered).unwrap();
    let text = String::from_utf8(rendered).unwrap();

    assert!(text.starts_with("prog.pl0:3:5: error:"), "got:\n{}", text);
    assert!(text.contains("    3 |   a = 1"), "got:\n{}", text);
    assert!(text.contains("      |     ^"), "got:\n{}", text);
    assert!(text.contains("try:  :="), "got:\n{}", text);
}

#[test]
fn test_sink_location_matches_token() {
    let (_, diags, _) = compile("program p; var a; begin a := b end");
    let err = diags
        .iter()
        .find(|d| d.message.contains("undeclared"))
        .unwrap();
    assert_eq!(err.location.line, 1);
    assert_eq!(err.location.column, 30);
    assert_eq!(err.location.length, 1);
}
