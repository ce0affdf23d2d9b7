use thiserror::Error;

/// Errors that stop the virtual machine. There is no recovery: the VM
/// halts on the offending instruction and the driver exits non-zero.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("unknown OPR operation: {0}")]
    UnknownOperation(i32),

    #[error("invalid input: expected an integer")]
    InvalidInput,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
