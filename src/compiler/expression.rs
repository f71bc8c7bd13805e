//! Precedence climbing expression compiler.
//!
//! Each call compiles one primary operand, then keeps folding operators whose
//! precedence is at least `min`. The value of the expression is left in `ax`
//! at run time and its type in `expr_type` at compile time.

use super::{CResult, Compiler};
use crate::bytecode::{Opcode, WORD};
use crate::error::CompileErrorKind;
use crate::symbol::{Class, Type};
use crate::token::{Keyword, Op, Token};

impl<'a> Compiler<'a> {
    pub(super) fn expression(&mut self, min: Op) -> CResult<()> {
        self.primary()?;

        while let Token::Op(op) = self.token {
            if op < min {
                break;
            }
            self.operator(op)?;
        }
        Ok(())
    }

    fn primary(&mut self) -> CResult<()> {
        match self.token {
            Token::Eof => return Err(self.error(CompileErrorKind::UnexpectedEof)),
            Token::Num(value) => {
                self.code.emit_with(Opcode::Imm, value);
                self.next();
                self.expr_type = Type::INT;
            }
            Token::Str(addr) => {
                self.code.emit_with(Opcode::Imm, addr);
                self.next();
                // Adjacent literals were appended to the same string
                while let Token::Str(_) = self.token {
                    self.next();
                }
                self.data.align();
                self.expr_type = Type::CHAR.pointer_to();
            }
            Token::Keyword(Keyword::Sizeof) => self.size_of()?,
            Token::Id(_) => self.identifier()?,
            Token::Punct(b'(') => {
                self.next();
                if let Some(base) = self.base_type() {
                    let ty = self.pointer_suffix(base);
                    if !self.token.is_punct(b')') {
                        return Err(self.error(CompileErrorKind::BadCast));
                    }
                    self.next();
                    self.expression(Op::Inc)?;
                    self.expr_type = ty;
                } else {
                    self.expression(Op::Assign)?;
                    self.expect_punct(b')')?;
                }
            }
            Token::Op(Op::Mul) => {
                self.next();
                self.expression(Op::Inc)?;
                self.expr_type = self
                    .expr_type
                    .pointee()
                    .ok_or_else(|| self.error(CompileErrorKind::BadDereference))?;
                self.code.emit(self.expr_type.load_op());
            }
            Token::Op(Op::And) => {
                self.next();
                self.expression(Op::Inc)?;
                // Drop the load and keep its address
                match self.code.last_op() {
                    Some(Opcode::Lc | Opcode::Li) => {
                        self.code.pop_last();
                    }
                    _ => return Err(self.error(CompileErrorKind::BadAddressOf)),
                }
                self.expr_type = self.expr_type.pointer_to();
            }
            Token::Punct(b'!') => {
                self.next();
                self.expression(Op::Inc)?;
                self.code.emit(Opcode::Push);
                self.code.emit_with(Opcode::Imm, 0);
                self.code.emit(Opcode::Eq);
                self.expr_type = Type::INT;
            }
            Token::Punct(b'~') => {
                self.next();
                self.expression(Op::Inc)?;
                self.code.emit(Opcode::Push);
                self.code.emit_with(Opcode::Imm, -1);
                self.code.emit(Opcode::Xor);
                self.expr_type = Type::INT;
            }
            Token::Op(Op::Add) => {
                self.next();
                self.expression(Op::Inc)?;
                self.expr_type = Type::INT;
            }
            Token::Op(Op::Sub) => {
                self.next();
                if let Token::Num(value) = self.token {
                    self.code.emit_with(Opcode::Imm, value.wrapping_neg());
                    self.next();
                } else {
                    self.code.emit_with(Opcode::Imm, -1);
                    self.code.emit(Opcode::Push);
                    self.expression(Op::Inc)?;
                    self.code.emit(Opcode::Mul);
                }
                self.expr_type = Type::INT;
            }
            Token::Op(op @ (Op::Inc | Op::Dec)) => {
                self.next();
                self.expression(Op::Inc)?;
                let load = self.push_lvalue("pre-increment")?;
                self.code.emit(load);
                self.step(op, Opcode::Add, Opcode::Sub);
                self.code.emit(self.expr_type.store_op());
            }
            _ => return Err(self.error(CompileErrorKind::BadExpression)),
        }
        Ok(())
    }

    /// `sizeof(int)`, `sizeof(char)` and pointers to either, as an immediate.
    fn size_of(&mut self) -> CResult<()> {
        self.next();
        self.expect_punct(b'(')?;
        let base = self.base_type().unwrap_or(Type::INT);
        let ty = self.pointer_suffix(base);
        self.expect_punct(b')')?;

        self.code.emit_with(Opcode::Imm, ty.size());
        self.expr_type = Type::INT;
        Ok(())
    }

    /// Function call, enum constant or variable load.
    fn identifier(&mut self) -> CResult<()> {
        let id = match self.token {
            Token::Id(id) => id,
            _ => return Err(self.error(CompileErrorKind::BadExpression)),
        };
        self.next();
        let binding = self.symbols.get(id).binding;

        if self.token.is_punct(b'(') {
            self.next();
            let mut args = 0;
            while !self.token.is_punct(b')') {
                self.expression(Op::Assign)?;
                self.code.emit(Opcode::Push);
                args += 1;
                if self.token.is_punct(b',') {
                    self.next();
                } else if !self.token.is_punct(b')') {
                    return Err(self.expected("')'"));
                }
            }
            self.next();

            match binding.class {
                Some(Class::Sys) => {
                    let op = Opcode::from_word(binding.value).ok_or_else(|| {
                        self.error(CompileErrorKind::BadFunctionCall(self.name(id)))
                    })?;
                    self.code.emit(op);
                }
                Some(Class::Fun) => self.code.emit_with(Opcode::Call, binding.value),
                _ => return Err(self.error(CompileErrorKind::BadFunctionCall(self.name(id)))),
            }
            if args > 0 {
                self.code.emit_with(Opcode::Adj, args);
            }
            self.expr_type = binding.ty;
            return Ok(());
        }

        match binding.class {
            Some(Class::Num) => {
                self.code.emit_with(Opcode::Imm, binding.value);
                self.expr_type = Type::INT;
            }
            Some(Class::Loc) => {
                self.code.emit_with(Opcode::Lea, self.frame_slot - binding.value);
                self.code.emit(binding.ty.load_op());
                self.expr_type = binding.ty;
            }
            Some(Class::Glo) => {
                self.code.emit_with(Opcode::Imm, binding.value);
                self.code.emit(binding.ty.load_op());
                self.expr_type = binding.ty;
            }
            _ => return Err(self.error(CompileErrorKind::UndefinedVariable(self.name(id)))),
        }
        Ok(())
    }

    /// Fold one binary or postfix operator into the expression compiled so far.
    fn operator(&mut self, op: Op) -> CResult<()> {
        let lhs = self.expr_type;
        match op {
            Op::Assign => {
                self.next();
                self.push_lvalue("assignment")?;
                self.expression(Op::Assign)?;
                self.code.emit(lhs.store_op());
                self.expr_type = lhs;
            }
            Op::Cond => {
                self.next();
                let to_else = self.code.emit_jump(Opcode::Jz);
                self.expression(Op::Assign)?;
                if !self.token.is_punct(b':') {
                    return Err(self.error(CompileErrorKind::ConditionalMissingColon));
                }
                self.next();
                let to_end = self.code.emit_jump(Opcode::Jmp);
                self.code.patch_here(to_else);
                self.expression(Op::Cond)?;
                self.code.patch_here(to_end);
            }
            Op::Lor => {
                self.next();
                let to_end = self.code.emit_jump(Opcode::Jnz);
                self.expression(Op::Lan)?;
                self.code.patch_here(to_end);
                self.expr_type = Type::INT;
            }
            Op::Lan => {
                self.next();
                let to_end = self.code.emit_jump(Opcode::Jz);
                self.expression(Op::Or)?;
                self.code.patch_here(to_end);
                self.expr_type = Type::INT;
            }
            Op::Or => self.binary(Op::Xor, Opcode::Or)?,
            Op::Xor => self.binary(Op::And, Opcode::Xor)?,
            Op::And => self.binary(Op::Eq, Opcode::And)?,
            Op::Eq => self.binary(Op::Lt, Opcode::Eq)?,
            Op::Ne => self.binary(Op::Lt, Opcode::Ne)?,
            Op::Lt => self.binary(Op::Shl, Opcode::Lt)?,
            Op::Gt => self.binary(Op::Shl, Opcode::Gt)?,
            Op::Le => self.binary(Op::Shl, Opcode::Le)?,
            Op::Ge => self.binary(Op::Shl, Opcode::Ge)?,
            Op::Shl => self.binary(Op::Add, Opcode::Shl)?,
            Op::Shr => self.binary(Op::Add, Opcode::Shr)?,
            Op::Add => {
                self.next();
                self.code.emit(Opcode::Push);
                self.expression(Op::Mul)?;
                if lhs.is_word_pointer() {
                    self.scale(Opcode::Mul);
                }
                self.code.emit(Opcode::Add);
                self.expr_type = lhs;
            }
            Op::Sub => {
                self.next();
                self.code.emit(Opcode::Push);
                self.expression(Op::Mul)?;
                let rhs = self.expr_type;
                if lhs.is_pointer() && rhs.is_pointer() {
                    if lhs != rhs {
                        return Err(self.error(CompileErrorKind::PointerMismatch(
                            lhs.to_string(),
                            rhs.to_string(),
                        )));
                    }
                    // Difference in elements
                    self.code.emit(Opcode::Sub);
                    if lhs.is_word_pointer() {
                        self.scale(Opcode::Div);
                    }
                    self.expr_type = Type::INT;
                } else {
                    if lhs.is_word_pointer() {
                        self.scale(Opcode::Mul);
                    }
                    self.code.emit(Opcode::Sub);
                    self.expr_type = lhs;
                }
            }
            Op::Mul => self.binary(Op::Inc, Opcode::Mul)?,
            Op::Div => self.binary(Op::Inc, Opcode::Div)?,
            Op::Mod => self.binary(Op::Inc, Opcode::Mod)?,
            Op::Inc | Op::Dec => {
                // Store the stepped value, then undo the step in ax so the
                // expression yields the old value.
                let load = self.push_lvalue("post-increment")?;
                self.code.emit(load);
                self.step(op, Opcode::Add, Opcode::Sub);
                self.code.emit(lhs.store_op());
                self.step(op, Opcode::Sub, Opcode::Add);
                self.next();
            }
            Op::Brak => {
                self.next();
                self.code.emit(Opcode::Push);
                self.expression(Op::Assign)?;
                if !self.token.is_punct(b']') {
                    return Err(self.expected("']'"));
                }
                self.next();

                let elem = lhs
                    .pointee()
                    .ok_or_else(|| self.error(CompileErrorKind::PointerExpected))?;
                if lhs.is_word_pointer() {
                    self.scale(Opcode::Mul);
                }
                self.code.emit(Opcode::Add);
                self.code.emit(elem.load_op());
                self.expr_type = elem;
            }
        }
        Ok(())
    }

    /// `lhs <op> rhs` for operators without type specific behavior.
    fn binary(&mut self, rhs_min: Op, opcode: Opcode) -> CResult<()> {
        self.next();
        self.code.emit(Opcode::Push);
        self.expression(rhs_min)?;
        self.code.emit(opcode);
        self.expr_type = Type::INT;
        Ok(())
    }

    /// Combine `ax` with the word size: `PUSH; IMM WORD; <op>`.
    fn scale(&mut self, op: Opcode) {
        self.code.emit(Opcode::Push);
        self.code.emit_with(Opcode::Imm, WORD);
        self.code.emit(op);
    }

    /// `PUSH; IMM stride; <inc or dec>` for the current expression type.
    fn step(&mut self, op: Op, inc: Opcode, dec: Opcode) {
        self.code.emit(Opcode::Push);
        self.code.emit_with(Opcode::Imm, self.expr_type.stride());
        self.code.emit(if op == Op::Inc { inc } else { dec });
    }

    /// Turn the load that produced the current value into a push of its
    /// address. Returns the load so callers can reload the value.
    fn push_lvalue(&mut self, context: &'static str) -> CResult<Opcode> {
        match self.code.last_op() {
            Some(load @ (Opcode::Lc | Opcode::Li)) => {
                self.code.replace_last(Opcode::Push);
                Ok(load)
            }
            _ => Err(self.error(CompileErrorKind::BadLvalue(context))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::{Opcode, WORD};
    use crate::compiler::compile;
    use crate::error::CompileErrorKind;

    use Opcode::*;

    /// Code of `main`'s body between its `ENT` and trailing `LEV`.
    fn body(source: &str) -> Vec<i64> {
        let program = compile(source).unwrap();
        let start = program.entry + 2;
        let end = program.exit_stub - 1;
        program.code[start..end].to_vec()
    }

    fn compile_err(source: &str) -> CompileErrorKind {
        compile(source).unwrap_err().kind
    }

    #[test]
    fn precedence() {
        let code = body("int main() { return 1 + 2 * 3; }");
        assert_eq!(
            code,
            vec![
                Imm as i64, 1, Push as i64, Imm as i64, 2, Push as i64, Imm as i64, 3,
                Mul as i64, Add as i64, Lev as i64
            ]
        );
    }

    #[test]
    fn int_pointer_addition_is_scaled() {
        let code = body("int main() { int *p; p = p + 1; }");
        assert_eq!(
            code,
            vec![
                Lea as i64, -1, Push as i64, Lea as i64, -1, Li as i64, Push as i64,
                Imm as i64, 1, Push as i64, Imm as i64, WORD, Mul as i64, Add as i64,
                Si as i64
            ]
        );
    }

    #[test]
    fn char_pointer_addition_is_not_scaled() {
        let code = body("int main() { char *s; s = s + 1; }");
        assert_eq!(
            code,
            vec![
                Lea as i64, -1, Push as i64, Lea as i64, -1, Li as i64, Push as i64,
                Imm as i64, 1, Add as i64, Si as i64
            ]
        );
        assert!(!code.contains(&(Mul as i64)));
    }

    #[test]
    fn pointer_difference_counts_elements() {
        let code = body("int main() { int *p, *q; return p - q; }");
        assert_eq!(
            &code[code.len() - 6..],
            &[Sub as i64, Push as i64, Imm as i64, WORD, Div as i64, Lev as i64]
        );
    }

    #[test]
    fn short_circuit_jump_skips_rhs() {
        let program = compile("int f() { return 1; } int main() { return 0 && f(); }").unwrap();
        let start = program.entry + 2;
        let code = &program.code;
        assert_eq!(&code[start..start + 3], &[Imm as i64, 0, Jz as i64]);
        let target = code[start + 3] as usize;
        // The jump lands right after the call
        assert_eq!(code[target - 2], Call as i64);
        assert_eq!(code[target], Lev as i64);
    }

    #[test]
    fn address_of_cancels_load() {
        let code = body("int main() { int x; int *p; p = &x; }");
        assert_eq!(
            code,
            vec![Lea as i64, -2, Push as i64, Lea as i64, -1, Si as i64]
        );
    }

    #[test]
    fn sizeof() {
        let code = body("int main() { return sizeof(char) + sizeof(int) + sizeof(char *); }");
        assert_eq!(code[0..2], [Imm as i64, 1]);
        assert_eq!(code[3..5], [Imm as i64, WORD]);
        assert_eq!(code[7..9], [Imm as i64, WORD]);
    }

    #[test]
    fn string_literals_concatenate() {
        let program = compile("int main() { printf(\"ab\" \"cd\"); }").unwrap();
        assert_eq!(&program.data[8..13], b"abcd\0");
        assert_eq!(program.data.len() as i64 % WORD, 0);
    }

    #[test]
    fn syscall_call() {
        let code = body("int main() { printf(\"%d\", 1); }");
        assert_eq!(
            code,
            vec![
                Imm as i64, 8, Push as i64, Imm as i64, 1, Push as i64, Prtf as i64,
                Adj as i64, 2
            ]
        );
    }

    #[test]
    fn expression_errors() {
        assert_eq!(
            compile_err("int main() { 1 = 2; }"),
            CompileErrorKind::BadLvalue("assignment")
        );
        assert_eq!(
            compile_err("int main() { int x; x + 1 = 2; }"),
            CompileErrorKind::BadLvalue("assignment")
        );
        assert_eq!(
            compile_err("int main() { ++3; }"),
            CompileErrorKind::BadLvalue("pre-increment")
        );
        assert_eq!(
            compile_err("int main() { 3++; }"),
            CompileErrorKind::BadLvalue("post-increment")
        );
        assert_eq!(
            compile_err("int main() { int x; return *x; }"),
            CompileErrorKind::BadDereference
        );
        assert_eq!(
            compile_err("int main() { return &1; }"),
            CompileErrorKind::BadAddressOf
        );
        assert_eq!(
            compile_err("int main() { return x; }"),
            CompileErrorKind::UndefinedVariable("x".into())
        );
        assert_eq!(
            compile_err("int x; int main() { return x(); }"),
            CompileErrorKind::BadFunctionCall("x".into())
        );
        assert_eq!(
            compile_err("int main() { int *p; char *s; return p - s; }"),
            CompileErrorKind::PointerMismatch("int*".into(), "char*".into())
        );
        assert_eq!(
            compile_err("int main() { int x; return x[0]; }"),
            CompileErrorKind::PointerExpected
        );
        assert_eq!(
            compile_err("int main() { return 1 ? 2; }"),
            CompileErrorKind::ConditionalMissingColon
        );
        assert_eq!(
            compile_err("int main() { return (int 1; }"),
            CompileErrorKind::BadCast
        );
        assert_eq!(compile_err("int main() { return 1 +"), CompileErrorKind::UnexpectedEof);
        assert_eq!(compile_err("int main() { return ]; }"), CompileErrorKind::BadExpression);
    }
}
