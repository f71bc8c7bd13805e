//! Bytecode representation

use std::fmt;

/// Width in bytes of a machine word, `int` and every pointer.
pub const WORD: i64 = 8;

/// Instruction set of the virtual machine.
///
/// Every opcode occupies one word of the code buffer. Opcodes up to and
/// including `Adj` are followed by exactly one operand word.
#[repr(i64)]
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Opcode {
    /// Load effective address: `ax = bp + n * WORD`
    Lea,
    /// Load immediate: `ax = n`
    Imm,
    /// Jump to an absolute code position
    Jmp,
    /// Push the return position and jump
    Call,
    /// Jump if `ax == 0`
    Jz,
    /// Jump if `ax != 0`
    Jnz,
    /// Enter a frame: push bp, `bp = sp`, reserve n locals
    Ent,
    /// Drop n call arguments
    Adj,
    /// Leave a frame: restore sp, bp and pc
    Lev,
    /// Load word addressed by `ax`
    Li,
    /// Load char addressed by `ax`
    Lc,
    /// Store `ax` as word at the address on top of stack, pop
    Si,
    /// Store `ax` as char at the address on top of stack, pop
    Sc,
    /// Push `ax`
    Push,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Open,
    Read,
    Clos,
    Prtf,
    Malc,
    Mset,
    Mcmp,
    Exit,
}

impl Opcode {
    const ALL: [Opcode; 38] = [
        Opcode::Lea,
        Opcode::Imm,
        Opcode::Jmp,
        Opcode::Call,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Ent,
        Opcode::Adj,
        Opcode::Lev,
        Opcode::Li,
        Opcode::Lc,
        Opcode::Si,
        Opcode::Sc,
        Opcode::Push,
        Opcode::Or,
        Opcode::Xor,
        Opcode::And,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Gt,
        Opcode::Le,
        Opcode::Ge,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Open,
        Opcode::Read,
        Opcode::Clos,
        Opcode::Prtf,
        Opcode::Malc,
        Opcode::Mset,
        Opcode::Mcmp,
        Opcode::Exit,
    ];

    /// Decode a code word, `None` if it is not an opcode.
    pub fn from_word(word: i64) -> Option<Opcode> {
        let index = usize::try_from(word).ok()?;
        Self::ALL.get(index).copied()
    }

    pub fn has_operand(self) -> bool {
        (self as i64) <= (Opcode::Adj as i64)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lea => "LEA",
            Opcode::Imm => "IMM",
            Opcode::Jmp => "JMP",
            Opcode::Call => "CALL",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Ent => "ENT",
            Opcode::Adj => "ADJ",
            Opcode::Lev => "LEV",
            Opcode::Li => "LI",
            Opcode::Lc => "LC",
            Opcode::Si => "SI",
            Opcode::Sc => "SC",
            Opcode::Push => "PUSH",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::And => "AND",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Gt => "GT",
            Opcode::Le => "LE",
            Opcode::Ge => "GE",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Open => "OPEN",
            Opcode::Read => "READ",
            Opcode::Clos => "CLOS",
            Opcode::Prtf => "PRTF",
            Opcode::Malc => "MALC",
            Opcode::Mset => "MSET",
            Opcode::Mcmp => "MCMP",
            Opcode::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

/// Position of an operand word waiting for a jump target.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[must_use]
pub struct Slot(usize);

/// Append-only buffer of code words.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    words: Vec<i64>,
    /// Position of the most recently emitted opcode
    last_op: Option<usize>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next emitted word will occupy.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn emit(&mut self, op: Opcode) {
        self.last_op = Some(self.words.len());
        self.words.push(op as i64);
    }

    pub fn emit_with(&mut self, op: Opcode, operand: i64) {
        self.emit(op);
        self.words.push(operand);
    }

    /// Emit a jump with a placeholder target to be patched later.
    pub fn emit_jump(&mut self, op: Opcode) -> Slot {
        self.emit_with(op, 0);
        Slot(self.words.len() - 1)
    }

    /// Write the resolved absolute `target` into a placeholder.
    pub fn patch(&mut self, slot: Slot, target: usize) {
        self.words[slot.0] = target as i64;
    }

    /// Point a placeholder at the next position to be emitted.
    pub fn patch_here(&mut self, slot: Slot) {
        self.patch(slot, self.len());
    }

    /// The final word of the buffer, if it is a zero operand opcode.
    pub fn last_op(&self) -> Option<Opcode> {
        match self.last_op {
            Some(pos) if pos + 1 == self.words.len() => Opcode::from_word(self.words[pos]),
            _ => None,
        }
    }

    /// Remove the final opcode emitted by [`CodeBuffer::emit`].
    pub fn pop_last(&mut self) -> Option<Opcode> {
        let op = self.last_op()?;
        self.words.pop();
        self.last_op = None;
        Some(op)
    }

    /// Rewrite the final opcode in place.
    pub fn replace_last(&mut self, op: Opcode) {
        if let Some(pos) = self.last_op {
            if pos + 1 == self.words.len() {
                self.words[pos] = op as i64;
            }
        }
    }

    pub fn words(&self) -> &[i64] {
        &self.words
    }

    pub fn into_words(self) -> Vec<i64> {
        self.words
    }
}

/// Data segment built during compilation: string literals and globals.
#[derive(Debug)]
pub struct DataSegment {
    bytes: Vec<u8>,
}

impl DataSegment {
    /// The first word stays reserved so no object lives at address 0.
    pub fn new() -> Self {
        DataSegment {
            bytes: vec![0; WORD as usize],
        }
    }

    /// Address the next byte will be written to.
    pub fn position(&self) -> i64 {
        self.bytes.len() as i64
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    /// Terminate the pending string and move to the next word boundary.
    /// At least one NUL byte is always written.
    pub fn align(&mut self) {
        let len = self.bytes.len() as i64;
        let aligned = (len + WORD) & !(WORD - 1);
        self.bytes.resize(aligned as usize, 0);
    }

    /// Reserve a zeroed word for a global variable and return its address.
    pub fn reserve_word(&mut self) -> i64 {
        let addr = self.position();
        self.bytes.extend_from_slice(&[0; WORD as usize]);
        addr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for DataSegment {
    fn default() -> Self {
        Self::new()
    }
}

/// Function attributes
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Function {
    pub name: String,
    /// Entry position in the code buffer
    pub addr: usize,
}

/// A fully compiled program, ready to be loaded by the VM.
#[derive(Debug, Clone)]
pub struct Program {
    pub code: Vec<i64>,
    pub data: Vec<u8>,
    /// Entry position of `main`
    pub entry: usize,
    /// Position of the `PUSH; EXIT` stub that `main` returns into
    pub exit_stub: usize,
    pub functions: Vec<Function>,
}

impl Program {
    /// Decode the code buffer into `(position, opcode, operand)` triples.
    pub fn instructions(&self) -> Vec<(usize, Option<Opcode>, Option<i64>)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < self.code.len() {
            let op = Opcode::from_word(self.code[pos]);
            let operand = match op {
                Some(op) if op.has_operand() => self.code.get(pos + 1).copied(),
                _ => None,
            };
            out.push((pos, op, operand));
            pos += if operand.is_some() { 2 } else { 1 };
        }
        out
    }

    /// Human readable listing of the code buffer.
    pub fn disassemble(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, op, operand) in self.instructions() {
            if let Some(func) = self.functions.iter().find(|func| func.addr == pos) {
                writeln!(f, "{}:", func.name)?;
            }
            if pos == self.exit_stub {
                writeln!(f, "<exit>:")?;
            }
            match (op, operand) {
                (Some(op), Some(operand)) => writeln!(f, "{:>6}  {:<4} {}", pos, op, operand)?,
                (Some(op), None) => writeln!(f, "{:>6}  {}", pos, op)?,
                (None, _) => writeln!(f, "{:>6}  .word {}", pos, self.code[pos])?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_decoding() {
        assert_eq!(Opcode::from_word(0), Some(Opcode::Lea));
        assert_eq!(Opcode::from_word(Opcode::Exit as i64), Some(Opcode::Exit));
        assert_eq!(Opcode::from_word(38), None);
        assert_eq!(Opcode::from_word(-1), None);
    }

    #[test]
    fn operand_arity() {
        let with_operand = [
            Opcode::Lea,
            Opcode::Imm,
            Opcode::Jmp,
            Opcode::Call,
            Opcode::Jz,
            Opcode::Jnz,
            Opcode::Ent,
            Opcode::Adj,
        ];
        for op in Opcode::ALL {
            assert_eq!(op.has_operand(), with_operand.contains(&op), "{}", op);
        }
    }

    #[test]
    fn patch_forward_jump() {
        let mut code = CodeBuffer::new();
        code.emit_with(Opcode::Imm, 0);
        let slot = code.emit_jump(Opcode::Jz);
        code.emit_with(Opcode::Imm, 1);
        code.patch_here(slot);
        code.emit(Opcode::Lev);

        assert_eq!(
            code.words(),
            &[
                Opcode::Imm as i64,
                0,
                Opcode::Jz as i64,
                6,
                Opcode::Imm as i64,
                1,
                Opcode::Lev as i64
            ]
        );
    }

    #[test]
    fn last_op_ignores_operands() {
        let mut code = CodeBuffer::new();
        // Operand equal to the numeric value of LI must not look like a load.
        code.emit_with(Opcode::Imm, Opcode::Li as i64);
        assert_eq!(code.last_op(), None);
        assert_eq!(code.pop_last(), None);

        code.emit(Opcode::Li);
        assert_eq!(code.last_op(), Some(Opcode::Li));
        code.replace_last(Opcode::Push);
        assert_eq!(code.last_op(), Some(Opcode::Push));
        assert_eq!(code.pop_last(), Some(Opcode::Push));
        assert_eq!(code.len(), 2);
    }

    #[test]
    fn data_alignment() {
        let mut data = DataSegment::new();
        assert_eq!(data.position(), WORD);

        for &b in b"hello" {
            data.push(b);
        }
        data.align();
        assert_eq!(data.position(), 2 * WORD);

        for &b in b"12345678" {
            data.push(b);
        }
        data.align();
        // A full word string still gets a terminator word.
        assert_eq!(data.position(), 4 * WORD);
        assert_eq!(data.bytes()[3 * WORD as usize], 0);

        assert_eq!(data.reserve_word(), 4 * WORD);
        assert_eq!(data.position(), 5 * WORD);
    }
}
