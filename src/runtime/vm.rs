use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use crate::codegen::op::{opr, Instruction, OpCode};
use crate::runtime::runtime_error::RuntimeError;

pub const STACK_SIZE: usize = 10_000;

// Activation record header layout.
const RA_OFFSET: isize = 0; // return address
const DL_OFFSET: isize = 1; // dynamic link: caller's base
const SL_OFFSET: isize = 2; // static link: lexically enclosing base

/// Stack machine executing the emitted instruction vector.
///
/// Registers: `p` program counter, `t` top-of-stack index (-1 when empty),
/// `b` current activation-record base, `i` the instruction being executed.
/// Execution starts at address 0 and ends when a RET leaves the stack
/// empty; runtime errors halt immediately.
pub struct Interpreter {
    code: Vec<Instruction>,
    stack: Vec<i32>,

    i: Instruction,
    p: usize,
    t: isize,
    b: isize,

    debug: bool,
    steps: u64,
    input_tokens: VecDeque<String>,
}

impl Interpreter {
    pub fn new(debug: bool) -> Self {
        Interpreter {
            code: Vec::new(),
            stack: vec![0; STACK_SIZE],
            i: Instruction::new(OpCode::Lit, 0, 0),
            p: 0,
            t: -1,
            b: 0,
            debug,
            steps: 0,
            input_tokens: VecDeque::new(),
        }
    }

    pub fn load(&mut self, code: Vec<Instruction>) {
        self.code = code;
        self.p = 0;
        self.t = -1;
        self.b = 0;
        self.steps = 0;
        self.input_tokens.clear();
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run against the process's standard streams.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        self.run_with_io(&mut input, &mut output)
    }

    /// Run with caller-supplied streams, for tests and embedding.
    pub fn run_with_io<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), RuntimeError> {
        self.p = 0;
        self.t = -1;
        self.b = 0;
        self.steps = 0;

        while self.p < self.code.len() {
            self.step(input, output)?;

            // A RET that empties the stack is the return from the main
            // block; that is the only normal termination.
            if self.i.op == OpCode::Opr && self.i.address == opr::RET && self.t < 0 {
                break;
            }
        }
        Ok(())
    }

    fn step<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), RuntimeError> {
        self.i = self.code[self.p];
        self.p += 1;
        self.steps += 1;

        if self.debug {
            println!("\nStep {}: {}", self.steps, self.i);
        }

        match self.i.op {
            OpCode::Lit => {
                self.push(self.i.address)?;
                if self.debug {
                    println!("  LIT: push constant {}", self.i.address);
                }
            }
            OpCode::Opr => self.execute_opr()?,
            OpCode::Lod => {
                let addr = self.base(self.i.level) + self.i.address as isize;
                let value = self.stack[addr as usize];
                self.push(value)?;
                if self.debug {
                    println!("  LOD: load [{}] = {}", addr, value);
                }
            }
            OpCode::Sto => {
                let addr = self.base(self.i.level) + self.i.address as isize;
                self.stack[addr as usize] = self.top();
                if self.debug {
                    println!("  STO: store {} to [{}]", self.top(), addr);
                }
                self.t -= 1;
            }
            OpCode::Cal => {
                // New frame header just above the current top.
                if self.t + 3 >= STACK_SIZE as isize {
                    return Err(RuntimeError::StackOverflow);
                }
                let static_base = self.base(self.i.level);
                self.stack[(self.t + 1 + RA_OFFSET) as usize] = self.p as i32;
                self.stack[(self.t + 1 + DL_OFFSET) as usize] = self.b as i32;
                self.stack[(self.t + 1 + SL_OFFSET) as usize] = static_base as i32;
                self.b = self.t + 1;
                self.p = self.i.address as usize;
                if self.debug {
                    println!(
                        "  CAL: call {} (level diff {})",
                        self.i.address, self.i.level
                    );
                }
            }
            OpCode::Int => {
                self.t += self.i.address as isize;
                if self.t >= STACK_SIZE as isize {
                    return Err(RuntimeError::StackOverflow);
                }
                if self.debug {
                    println!("  INT: allocate {} slots, T={}", self.i.address, self.t);
                }
            }
            OpCode::Jmp => {
                self.p = self.i.address as usize;
                if self.debug {
                    println!("  JMP: jump to {}", self.i.address);
                }
            }
            OpCode::Jpc => {
                if self.top() == 0 {
                    self.p = self.i.address as usize;
                    if self.debug {
                        println!("  JPC: condition false, jump to {}", self.i.address);
                    }
                } else if self.debug {
                    println!("  JPC: condition true, continue");
                }
                self.t -= 1;
            }
            OpCode::Red => {
                write!(output, "? ")?;
                output.flush()?;
                let value = self.read_integer(input)?;
                let addr = self.base(self.i.level) + self.i.address as isize;
                self.stack[addr as usize] = value;
                if self.debug {
                    println!("  RED: read {} to [{}]", value, addr);
                }
            }
            OpCode::Wrt => {
                writeln!(output, "{}", self.top())?;
                if self.debug {
                    println!("  WRT: write {}", self.top());
                }
                self.t -= 1;
            }
        }

        if self.debug {
            self.print_stack();
        }
        Ok(())
    }

    fn execute_opr(&mut self) -> Result<(), RuntimeError> {
        match self.i.address {
            opr::RET => {
                self.t = self.b - 1;
                self.p = self.stack[(self.b + RA_OFFSET) as usize] as usize;
                self.b = self.stack[(self.b + DL_OFFSET) as usize] as isize;
                if self.debug {
                    println!("  OPR RET: return, T={} B={} P={}", self.t, self.b, self.p);
                }
            }
            opr::NEG => {
                let value = self.top().wrapping_neg();
                *self.top_mut() = value;
            }
            opr::ADD => self.binary(|a, b| a.wrapping_add(b)),
            opr::SUB => self.binary(|a, b| a.wrapping_sub(b)),
            opr::MUL => self.binary(|a, b| a.wrapping_mul(b)),
            opr::DIV => {
                let divisor = self.top();
                if divisor == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                self.binary(|a, b| a.wrapping_div(b));
            }
            opr::ODD => {
                let value = if self.top() % 2 == 1 { 1 } else { 0 };
                *self.top_mut() = value;
            }
            opr::EQ => self.binary(|a, b| (a == b) as i32),
            opr::NEQ => self.binary(|a, b| (a != b) as i32),
            opr::LT => self.binary(|a, b| (a < b) as i32),
            opr::GEQ => self.binary(|a, b| (a >= b) as i32),
            opr::GT => self.binary(|a, b| (a > b) as i32),
            opr::LEQ => self.binary(|a, b| (a <= b) as i32),
            other => return Err(RuntimeError::UnknownOperation(other)),
        }

        if self.debug && self.i.address != opr::RET && self.t >= 0 {
            println!("  OPR {}: {}", opr::name(self.i.address), self.top());
        }
        Ok(())
    }

    /// Pop two, push the result.
    fn binary(&mut self, f: impl Fn(i32, i32) -> i32) {
        self.t -= 1;
        let a = self.stack[self.t as usize];
        let b = self.stack[(self.t + 1) as usize];
        self.stack[self.t as usize] = f(a, b);
    }

    fn push(&mut self, value: i32) -> Result<(), RuntimeError> {
        self.t += 1;
        if self.t >= STACK_SIZE as isize {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.t as usize] = value;
        Ok(())
    }

    fn top(&self) -> i32 {
        self.stack[self.t as usize]
    }

    fn top_mut(&mut self) -> &mut i32 {
        &mut self.stack[self.t as usize]
    }

    /// Follow the static chain `level` records outward.
    fn base(&self, level: i32) -> isize {
        let mut base = self.b;
        let mut level = level;
        while level > 0 {
            base = self.stack[(base + SL_OFFSET) as usize] as isize;
            level -= 1;
        }
        base
    }

    /// One whitespace-separated integer, reading more lines as needed.
    fn read_integer<R: BufRead>(&mut self, input: &mut R) -> Result<i32, RuntimeError> {
        loop {
            if let Some(token) = self.input_tokens.pop_front() {
                return token.parse().map_err(|_| RuntimeError::InvalidInput);
            }
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(RuntimeError::InvalidInput);
            }
            self.input_tokens
                .extend(line.split_whitespace().map(|s| s.to_string()));
        }
    }

    fn print_stack(&self) {
        print!("Stack (T={}, B={}): [", self.t, self.b);
        let shown = (self.t + 1).min(20) as usize;
        for i in 0..shown {
            if i > 0 {
                print!(", ");
            }
            print!("{}", self.stack[i]);
        }
        if self.t >= 20 {
            print!(", ...");
        }
        println!("]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(op: OpCode, level: i32, address: i32) -> Instruction {
        Instruction::new(op, level, address)
    }

    fn run(code: Vec<Instruction>, input: &str) -> Result<String, RuntimeError> {
        let mut vm = Interpreter::new(false);
        vm.load(code);
        let mut output = Vec::new();
        vm.run_with_io(&mut input.as_bytes(), &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    fn run_binary_op(op: i32, a: i32, b: i32) -> i32 {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, a),
            inst(OpCode::Lit, 0, b),
            inst(OpCode::Opr, 0, op),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        run(code, "").unwrap().trim().parse().unwrap()
    }

    #[test]
    fn test_lit_and_write() {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, 5),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "").unwrap(), "5\n");
    }

    #[test]
    fn test_arithmetic_operations() {
        assert_eq!(run_binary_op(opr::ADD, 2, 3), 5);
        assert_eq!(run_binary_op(opr::SUB, 2, 3), -1);
        assert_eq!(run_binary_op(opr::MUL, 4, 6), 24);
        assert_eq!(run_binary_op(opr::DIV, 7, 2), 3);
    }

    #[test]
    fn test_comparisons_yield_zero_or_one() {
        assert_eq!(run_binary_op(opr::EQ, 1, 1), 1);
        assert_eq!(run_binary_op(opr::NEQ, 1, 1), 0);
        assert_eq!(run_binary_op(opr::LT, 1, 2), 1);
        assert_eq!(run_binary_op(opr::GEQ, 1, 2), 0);
        assert_eq!(run_binary_op(opr::GT, 2, 1), 1);
        assert_eq!(run_binary_op(opr::LEQ, 2, 1), 0);
    }

    #[test]
    fn test_odd() {
        let odd_of = |v: i32| {
            let code = vec![
                inst(OpCode::Int, 0, 3),
                inst(OpCode::Lit, 0, v),
                inst(OpCode::Opr, 0, opr::ODD),
                inst(OpCode::Wrt, 0, 0),
                inst(OpCode::Opr, 0, opr::RET),
            ];
            run(code, "").unwrap()
        };
        assert_eq!(odd_of(3), "1\n");
        assert_eq!(odd_of(4), "0\n");
        // Remainder semantics: negative odd values are not "odd" here.
        assert_eq!(odd_of(-3), "0\n");
    }

    #[test]
    fn test_neg() {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, 9),
            inst(OpCode::Opr, 0, opr::NEG),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "").unwrap(), "-9\n");
    }

    #[test]
    fn test_division_by_zero_halts() {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, 1),
            inst(OpCode::Lit, 0, 0),
            inst(OpCode::Opr, 0, opr::DIV),
        ];
        assert!(matches!(
            run(code, ""),
            Err(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn test_unknown_operation_halts() {
        let code = vec![inst(OpCode::Int, 0, 3), inst(OpCode::Opr, 0, 7)];
        assert!(matches!(
            run(code, ""),
            Err(RuntimeError::UnknownOperation(7))
        ));
    }

    #[test]
    fn test_stack_overflow_on_int() {
        let code = vec![inst(OpCode::Int, 0, STACK_SIZE as i32 + 1)];
        assert!(matches!(run(code, ""), Err(RuntimeError::StackOverflow)));
    }

    #[test]
    fn test_jpc_pops_and_branches_on_zero() {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, 0),
            inst(OpCode::Jpc, 0, 5),
            inst(OpCode::Lit, 0, 111),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Lit, 0, 222),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "").unwrap(), "222\n");
    }

    #[test]
    fn test_call_builds_frame_and_returns() {
        let code = vec![
            inst(OpCode::Jmp, 0, 5),
            inst(OpCode::Int, 0, 3), // procedure
            inst(OpCode::Lit, 0, 42),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
            inst(OpCode::Int, 0, 3), // main
            inst(OpCode::Cal, 0, 1),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "").unwrap(), "42\n");
    }

    #[test]
    fn test_static_link_reaches_enclosing_frame() {
        // Procedure at nesting depth 1 loads the program's variable.
        let code = vec![
            inst(OpCode::Jmp, 0, 5),
            inst(OpCode::Int, 0, 3), // procedure
            inst(OpCode::Lod, 1, 3),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
            inst(OpCode::Int, 0, 4), // main, variable at offset 3
            inst(OpCode::Lit, 0, 99),
            inst(OpCode::Sto, 0, 3),
            inst(OpCode::Cal, 0, 1),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "").unwrap(), "99\n");
    }

    #[test]
    fn test_read_prompts_and_stores() {
        let code = vec![
            inst(OpCode::Int, 0, 4),
            inst(OpCode::Red, 0, 3),
            inst(OpCode::Lod, 0, 3),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "7\n").unwrap(), "? 7\n");
    }

    #[test]
    fn test_read_takes_tokens_from_one_line() {
        let code = vec![
            inst(OpCode::Int, 0, 5),
            inst(OpCode::Red, 0, 3),
            inst(OpCode::Red, 0, 4),
            inst(OpCode::Lod, 0, 3),
            inst(OpCode::Lod, 0, 4),
            inst(OpCode::Opr, 0, opr::ADD),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "5 7\n").unwrap(), "? ? 12\n");
    }

    #[test]
    fn test_read_rejects_garbage() {
        let code = vec![inst(OpCode::Int, 0, 4), inst(OpCode::Red, 0, 3)];
        assert!(matches!(
            run(code, "abc\n"),
            Err(RuntimeError::InvalidInput)
        ));
    }

    #[test]
    fn test_read_rejects_closed_input() {
        let code = vec![inst(OpCode::Int, 0, 4), inst(OpCode::Red, 0, 3)];
        assert!(matches!(run(code, ""), Err(RuntimeError::InvalidInput)));
    }

    #[test]
    fn test_negative_input_accepted() {
        let code = vec![
            inst(OpCode::Int, 0, 4),
            inst(OpCode::Red, 0, 3),
            inst(OpCode::Lod, 0, 3),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        assert_eq!(run(code, "-31\n").unwrap(), "? -31\n");
    }

    #[test]
    fn test_runs_are_deterministic() {
        let code = vec![
            inst(OpCode::Int, 0, 4),
            inst(OpCode::Red, 0, 3),
            inst(OpCode::Lod, 0, 3),
            inst(OpCode::Lit, 0, 2),
            inst(OpCode::Opr, 0, opr::MUL),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        let first = run(code.clone(), "21\n").unwrap();
        let second = run(code, "21\n").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "? 42\n");
    }

    #[test]
    fn test_step_counter() {
        let code = vec![
            inst(OpCode::Int, 0, 3),
            inst(OpCode::Lit, 0, 1),
            inst(OpCode::Wrt, 0, 0),
            inst(OpCode::Opr, 0, opr::RET),
        ];
        let mut vm = Interpreter::new(false);
        vm.load(code);
        let mut output = Vec::new();
        vm.run_with_io(&mut "".as_bytes(), &mut output).unwrap();
        assert_eq!(vm.steps(), 4);
    }
}
