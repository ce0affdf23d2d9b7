use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

use pl0::codegen::{Parser, ParserOptions};
use pl0::diag::engine::color;
use pl0::diag::{DiagnosticEngine, DiagnosticSink};
use pl0::frontend::token_dumper::TokenDumper;
use pl0::frontend::Lexer;
use pl0::runtime::Interpreter;

/// Compiles and optionally executes PL/0 source files.
/// The .pl0 extension is added automatically if not provided.
#[derive(ClapParser)]
#[command(name = "pl0", disable_version_flag = true)]
struct Cli {
    /// PL/0 source file
    input: Option<String>,

    /// Show lexer output (token list)
    #[arg(short = 't', long)]
    tokens: bool,

    /// Show parser output (parse tree)
    #[arg(short = 'a', long)]
    ast: bool,

    /// Show symbol table
    #[arg(short = 's', long)]
    symbols: bool,

    /// Show generated code
    #[arg(short = 'c', long)]
    code: bool,

    /// Show source code before compilation
    #[arg(long)]
    source: bool,

    /// Show all intermediate outputs
    #[arg(long)]
    all: bool,

    /// Compile and run (default)
    #[arg(long)]
    run: bool,

    /// Compile only, do not execute
    #[arg(long)]
    no_run: bool,

    /// Run with debug output (show execution steps)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Run lexer only (same as --tokens --no-run)
    #[arg(long, alias = "lexer")]
    lexer_only: bool,

    /// Run parser only (same as --ast --no-run)
    #[arg(long, alias = "parser")]
    parse_only: bool,

    /// Compile only (same as --no-run)
    #[arg(long, alias = "compile")]
    compile_only: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Show version information
    #[arg(short = 'v', long = "version")]
    version: bool,
}

struct Options {
    input: String,
    show_tokens: bool,
    show_ast: bool,
    show_symbols: bool,
    show_code: bool,
    show_source: bool,
    run_program: bool,
    debug: bool,
    colors: bool,
    verbose: bool,
    lexer_only: bool,
    parse_only: bool,
    compile_only: bool,
}

impl Options {
    fn from_cli(cli: Cli, input: String) -> Self {
        Options {
            input,
            show_tokens: cli.tokens || cli.all || cli.lexer_only,
            show_ast: cli.ast || cli.all || cli.parse_only,
            show_symbols: cli.symbols || cli.all,
            show_code: cli.code || cli.all,
            show_source: cli.source || cli.all,
            run_program: (cli.run || !cli.no_run)
                && !(cli.lexer_only || cli.parse_only || cli.compile_only),
            debug: cli.debug,
            colors: !cli.no_color,
            verbose: cli.verbose,
            lexer_only: cli.lexer_only,
            parse_only: cli.parse_only,
            compile_only: cli.compile_only,
        }
    }

    fn paint(&self, c: &'static str) -> &'static str {
        if self.colors {
            c
        } else {
            ""
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let Some(input) = cli.input.clone() else {
        eprintln!("Error: no input file specified.");
        eprintln!("Use --help for usage information.");
        return ExitCode::FAILURE;
    };

    let opts = Options::from_cli(cli, input);
    match drive(&opts) {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn print_version() {
    println!("PL/0 Compiler v{}", env!("CARGO_PKG_VERSION"));
    println!("A compiler and interpreter for the PL/0 programming language");
    println!("Supports the full PL/0 grammar with Clang-style error reporting");
}

/// Resolve the input name: as given, with .pl0 appended, and under the
/// test directories used by the sample programs.
fn find_file(name: &str) -> PathBuf {
    let candidates = [
        name.to_string(),
        format!("{}.pl0", name),
        format!("test/{}", name),
        format!("test/{}.pl0", name),
        format!("../test/{}", name),
        format!("../test/{}.pl0", name),
    ];
    for candidate in &candidates {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return path;
        }
    }
    PathBuf::from(name)
}

fn display_source(path: &PathBuf, opts: &Options) {
    let bold = opts.paint(color::BOLD);
    let cyan = opts.paint(color::CYAN);
    let blue = opts.paint(color::BLUE);
    let reset = opts.paint(color::RESET);

    println!("{}{}========== Source Code =========={}", bold, cyan, reset);
    match std::fs::read_to_string(path) {
        Ok(source) => {
            for (index, line) in source.lines().enumerate() {
                println!("{}{:>4} |{} {}", blue, index + 1, reset, line);
            }
            println!();
        }
        Err(e) => {
            eprintln!("Warning: cannot open file for display: {}: {}", path.display(), e);
        }
    }
}

fn drive(opts: &Options) -> i32 {
    let bold = opts.paint(color::BOLD);
    let red = opts.paint(color::BOLD_RED);
    let green = opts.paint(color::BOLD_GREEN);
    let blue = opts.paint(color::BLUE);
    let cyan = opts.paint(color::CYAN);
    let reset = opts.paint(color::RESET);

    let mut engine = DiagnosticEngine::new(opts.colors);
    let path = find_file(&opts.input);

    if opts.verbose {
        println!("{}{}========== PL/0 Compiler =========={}", bold, cyan, reset);
        println!("Input file: {}{}{}", bold, path.display(), reset);
        print!("Options:    ");
        if opts.show_tokens {
            print!("[tokens] ");
        }
        if opts.show_ast {
            print!("[ast] ");
        }
        if opts.show_symbols {
            print!("[symbols] ");
        }
        if opts.show_code {
            print!("[code] ");
        }
        if opts.run_program {
            print!("[run] ");
        }
        if opts.debug {
            print!("[debug] ");
        }
        if !opts.colors {
            print!("[no-color] ");
        }
        println!("\n");
    }

    if opts.show_source {
        display_source(&path, opts);
    }

    // Phase 1: lexical analysis
    if opts.verbose {
        println!("{}[Phase 1]{} Lexical Analysis...", blue, reset);
    }

    let mut lexer = Lexer::new(&mut engine as &mut dyn DiagnosticSink);
    if let Err(e) = lexer.init_from_file(&path) {
        eprintln!("{}error:{} cannot open file: {}: {}", red, reset, path.display(), e);
        return 1;
    }

    let tokens = lexer.tokenize();
    let had_lex_errors = lexer.had_errors();
    let lines = lexer.take_source_lines();
    drop(lexer);
    engine.set_source(lines, path.display().to_string());

    if opts.show_tokens {
        let mut dumper = TokenDumper::new();
        if !opts.colors {
            dumper = dumper.no_color();
        }
        dumper.dump(&tokens);
    }

    if had_lex_errors || engine.has_errors() {
        if opts.lexer_only {
            eprintln!("{}[Error]{} Lexical analysis failed with errors.", red, reset);
        }
        engine.print_summary();
        return 1;
    }

    if opts.verbose {
        println!("{}[OK]{} Lexical analysis completed.", green, reset);
    }

    if opts.lexer_only {
        println!("{}[OK]{} Lexical analysis completed successfully.", green, reset);
        return 0;
    }

    // Phase 2: syntax analysis and code generation
    if opts.verbose {
        println!("{}[Phase 2]{} Syntax Analysis & Code Generation...", blue, reset);
    }

    let mut parser = Parser::new(tokens, &mut engine as &mut dyn DiagnosticSink);
    parser.set_options(ParserOptions {
        show_parse_tree: opts.show_ast,
    });

    let parse_ok = parser.parse();

    if parse_ok && opts.show_symbols {
        parser.print_symbols();
    }
    if parse_ok && opts.show_code {
        parser.print_code();
    }
    let code = parser.into_code();

    if !parse_ok {
        if opts.parse_only {
            eprintln!("{}[Error]{} Syntax analysis failed with errors.", red, reset);
        }
        engine.print_summary();
        return 1;
    }

    if opts.verbose {
        println!("{}[OK]{} Syntax analysis completed.", green, reset);
    }

    if opts.parse_only {
        println!("{}[OK]{} Syntax analysis completed successfully.", green, reset);
        return 0;
    }

    if opts.verbose || opts.compile_only {
        println!("{}[OK]{} Compilation completed successfully.", green, reset);
    }

    if !opts.run_program {
        engine.print_summary();
        return 0;
    }

    // Phase 3: execution
    if opts.verbose {
        println!("\n{}[Phase 3]{} Execution...", blue, reset);
        println!("{}", "=".repeat(56));
    }

    let mut vm = Interpreter::new(opts.debug);
    vm.load(code);

    match vm.run() {
        Ok(()) => {
            if opts.debug {
                println!("\nProgram terminated.");
                println!("Total steps executed: {}", vm.steps());
            }
            if opts.verbose {
                println!("{}", "=".repeat(56));
                println!("{}[OK]{} Execution completed.", green, reset);
            }
            engine.print_summary();
            0
        }
        Err(e) => {
            eprintln!("Runtime Error: {}", e);
            1
        }
    }
}
