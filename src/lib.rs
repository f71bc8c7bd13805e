//! CVM is a single pass compiler for a small subset of C and the stack based
//! virtual machine that runs its bytecode.
//!
//! # Example
//!
//! ```text
//! int fib(int n) {
//!     if (n < 2) return n;
//!     return fib(n - 1) + fib(n - 2);
//! }
//!
//! int main() {
//!     printf("fib(10) = %d\n", fib(10));
//!     return 0;
//! }
//! ```
//!
//! ```no_run
//! let source = std::fs::read_to_string("fib.c").unwrap();
//! let program = cvm::compile(&source).unwrap();
//! let host = cvm::StdHost::new();
//! let mut vm = cvm::Vm::load(&program, &["fib.c"], host, Default::default()).unwrap();
//! let exit_code = vm.run().unwrap();
//! ```
//!
//! # Language
//!
//! - Types: `int`, `char`, `void` (same as `char`) and pointers to them.
//! - Global declarations: variables, functions and `enum` blocks.
//! - Function bodies: local declarations first, then statements.
//! - Statements: `if`/`else`, `while`, `return`, blocks, expressions.
//! - Expressions follow C precedence: assignment, `?:`, `||`, `&&`, `|`, `^`,
//!   `&`, equality, relational, shifts, additive, multiplicative, unary,
//!   postfix (`++`, `--`, `[]`), calls, casts and `sizeof`.
//! - `#` lines are skipped, not expanded.
//!
//! # Instructions
//!
//! | Instruction | Usage     | Brief   |
//! |-------------|-----------|---------|
//! | Lea         | LEA _n_   | `ax = bp + n * WORD`, address of an argument or local. |
//! | Imm         | IMM _v_   | `ax = v` |
//! | Jmp         | JMP _a_   | Jump to the absolute code position `a`. |
//! | Call        | CALL _a_  | Push the return position and jump to `a`. |
//! | Jz          | JZ _a_    | Jump to `a` if `ax` is zero. |
//! | Jnz         | JNZ _a_   | Jump to `a` if `ax` is not zero. |
//! | Ent         | ENT _n_   | Push `bp`, `bp = sp`, reserve `n` words for locals. |
//! | Adj         | ADJ _n_   | Pop `n` call arguments. |
//! | Lev         | LEV       | `sp = bp`, pop `bp`, pop `pc`. |
//! | Li / Lc     | LI        | Load the word / char addressed by `ax` into `ax`. |
//! | Si / Sc     | SI        | Pop an address and store `ax` there as word / char. |
//! | Push        | PUSH      | Push `ax`. |
//! | Or .. Mod   | ADD       | Pop `lhs`, `ax = lhs <op> ax`. |
//! | Open .. Exit | PRTF     | Syscalls, arguments are read from the stack. |
//!
//! # Calling convention
//!
//! ```text
//! bp + 2 + k   argument (k counted from the last one)
//! bp + 1       return position
//! bp + 0       caller's bp
//! bp - 1 - k   local k
//! ```
//!
//! # Syscalls
//!
//! `open`, `read`, `close`, `printf`, `malloc`, `memset`, `memcmp` and `exit`
//! are pre-registered identifiers. File and console I/O go through the
//! [`Host`] trait.
//!
//! # Important notes
//!
//! - Entry point is the `main` function. It is called as `main(argc, argv)`.
//! - Functions must be defined before they are called.
//! - The first error stops compilation; nothing runs after a compile error.

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod memory;
pub mod symbol;
pub mod syscall;
pub mod token;
pub mod vm;

pub use bytecode::{Opcode, Program};
pub use compiler::compile;
pub use error::{CompileError, CompileErrorKind, VmError};
pub use syscall::{BufferHost, Host, StdHost};
pub use vm::{Registers, Vm, VmConfig};
