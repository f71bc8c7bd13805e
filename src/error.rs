use crate::bytecode::Opcode;

/// First error met while compiling. Compilation never resumes after it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}: {kind}")]
pub struct CompileError {
    pub line: usize,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, kind: CompileErrorKind) -> Self {
        CompileError { line, kind }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("expected {expected}, got {found}")]
    Expected { expected: String, found: String },
    #[error("bad enum identifier {0}")]
    BadEnumIdentifier(String),
    #[error("bad enum initializer")]
    BadEnumInitializer,
    #[error("bad global declaration")]
    BadGlobalDeclaration,
    #[error("duplicate global declaration")]
    DuplicateGlobal,
    #[error("bad parameter declaration")]
    BadParameterDeclaration,
    #[error("duplicate parameter declaration")]
    DuplicateParameter,
    #[error("bad local declaration")]
    BadLocalDeclaration,
    #[error("duplicate local declaration")]
    DuplicateLocal,
    #[error("unexpected eof in expression")]
    UnexpectedEof,
    #[error("bad expression")]
    BadExpression,
    #[error("bad cast")]
    BadCast,
    #[error("bad dereference")]
    BadDereference,
    #[error("bad address-of")]
    BadAddressOf,
    #[error("bad lvalue in {0}")]
    BadLvalue(&'static str),
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("bad function call {0}")]
    BadFunctionCall(String),
    #[error("pointer type mismatch in subtraction: {0} - {1}")]
    PointerMismatch(String, String),
    #[error("pointer type expected")]
    PointerExpected,
    #[error("conditional missing colon")]
    ConditionalMissingColon,
    #[error("main() not defined")]
    MainNotDefined,
}

/// Fatal fault raised while executing a program.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("unknown instruction {word} at {pc}")]
    UnknownOpcode { word: i64, pc: usize },
    #[error("pc {pc} outside of the code buffer")]
    PcOutOfRange { pc: usize },
    #[error("division by zero at {pc} ({op})")]
    DivisionByZero { pc: usize, op: Opcode },
    #[error("segmentation fault: address {addr} at {pc}")]
    SegFault { addr: i64, pc: usize },
    #[error("stack overflow at {pc}")]
    StackOverflow { pc: usize },
    #[error("out of memory while loading the program")]
    OutOfMemory,
    #[error("program has already exited with {0}")]
    AlreadyExited(i64),
}
