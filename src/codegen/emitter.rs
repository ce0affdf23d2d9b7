use crate::codegen::op::{opr, Instruction, OpCode};

/// Append-only instruction store with backpatching.
///
/// Forward jumps are emitted with a placeholder target of 0; the emit site
/// keeps the returned index and patches the address once the target is
/// known.
pub struct CodeEmitter {
    code: Vec<Instruction>,
}

impl CodeEmitter {
    pub fn new() -> Self {
        CodeEmitter { code: Vec::new() }
    }

    /// Append an instruction; returns its address.
    pub fn emit(&mut self, op: OpCode, level: i32, address: i32) -> usize {
        self.code.push(Instruction::new(op, level, address));
        self.code.len() - 1
    }

    /// Rewrite the address field of a previously emitted instruction.
    pub fn backpatch(&mut self, at: usize, address: usize) {
        if let Some(inst) = self.code.get_mut(at) {
            inst.address = address as i32;
        }
    }

    /// Address the next emitted instruction will get.
    pub fn next_address(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn into_code(self) -> Vec<Instruction> {
        self.code
    }

    /// Annotated listing for `--code`.
    pub fn print(&self) {
        println!("\n========== Generated Code ==========");
        println!("{:<8}{:<8}{:<8}{:<8}Comment", "Addr", "OP", "L", "A");
        println!("{}", "-".repeat(60));

        for (addr, inst) in self.code.iter().enumerate() {
            print!(
                "{:<8}{:<8}{:<8}{:<8}",
                addr,
                inst.op.to_string(),
                inst.level,
                inst.address
            );
            match inst.op {
                OpCode::Opr => print!("; {}", opr::name(inst.address)),
                OpCode::Lit => print!("; load constant {}", inst.address),
                OpCode::Jmp => print!("; jump to {}", inst.address),
                OpCode::Jpc => print!("; jump to {} if false", inst.address),
                _ => {}
            }
            println!();
        }
        println!("{}\n", "=".repeat(60));
    }
}

impl Default for CodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_returns_addresses_in_order() {
        let mut emitter = CodeEmitter::new();
        assert_eq!(emitter.emit(OpCode::Jmp, 0, 0), 0);
        assert_eq!(emitter.emit(OpCode::Lit, 0, 5), 1);
        assert_eq!(emitter.next_address(), 2);
    }

    #[test]
    fn test_backpatch_rewrites_target() {
        let mut emitter = CodeEmitter::new();
        let jump = emitter.emit(OpCode::Jpc, 0, 0);
        emitter.emit(OpCode::Lit, 0, 1);
        emitter.backpatch(jump, emitter.next_address());

        assert_eq!(emitter.code()[jump].address, 2);
        assert_eq!(emitter.code()[jump].op, OpCode::Jpc);
    }

    #[test]
    fn test_backpatch_out_of_range_is_ignored() {
        let mut emitter = CodeEmitter::new();
        emitter.backpatch(3, 7);
        assert!(emitter.code().is_empty());
    }
}
