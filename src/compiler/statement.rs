use super::{CResult, Compiler};
use crate::bytecode::Opcode;
use crate::token::{Keyword, Op, Token};

impl<'a> Compiler<'a> {
    pub(super) fn statement(&mut self) -> CResult<()> {
        match self.token {
            Token::Keyword(Keyword::If) => {
                self.next();
                self.condition()?;
                let mut to_end = self.code.emit_jump(Opcode::Jz);
                self.statement()?;

                if self.token == Token::Keyword(Keyword::Else) {
                    let over_else = self.code.emit_jump(Opcode::Jmp);
                    self.code.patch_here(to_end);
                    to_end = over_else;
                    self.next();
                    self.statement()?;
                }
                self.code.patch_here(to_end);
            }
            Token::Keyword(Keyword::While) => {
                self.next();
                let head = self.code.len();
                self.condition()?;
                let to_end = self.code.emit_jump(Opcode::Jz);
                self.statement()?;
                self.code.emit_with(Opcode::Jmp, head as i64);
                self.code.patch_here(to_end);
            }
            Token::Keyword(Keyword::Return) => {
                self.next();
                if !self.token.is_punct(b';') {
                    self.expression(Op::Assign)?;
                }
                self.code.emit(Opcode::Lev);
                self.expect_punct(b';')?;
            }
            Token::Punct(b'{') => {
                self.next();
                while !self.token.is_punct(b'}') {
                    if self.token == Token::Eof {
                        return Err(self.expected("'}'"));
                    }
                    self.statement()?;
                }
                self.next();
            }
            Token::Punct(b';') => self.next(),
            _ => {
                self.expression(Op::Assign)?;
                self.expect_punct(b';')?;
            }
        }
        Ok(())
    }

    /// `'(' expression ')'`
    fn condition(&mut self) -> CResult<()> {
        self.expect_punct(b'(')?;
        self.expression(Op::Assign)?;
        self.expect_punct(b')')
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::Opcode::*;
    use crate::compiler::compile;
    use crate::error::CompileErrorKind;

    #[test]
    fn if_else_diamond() {
        let program = compile("int main() { if (1) return 2; else return 3; }").unwrap();
        let code = &program.code;
        assert_eq!(
            &code[2..],
            &[
                Imm as i64, 1, Jz as i64, 11, Imm as i64, 2, Lev as i64, Jmp as i64, 14,
                Imm as i64, 3, Lev as i64, Lev as i64, Push as i64, Exit as i64
            ][..]
        );
    }

    #[test]
    fn if_without_else() {
        let program = compile("int main() { if (0) return 1; return 2; }").unwrap();
        let code = &program.code;
        assert_eq!(&code[2..5], &[Imm as i64, 0, Jz as i64]);
        assert_eq!(code[5], 9);
        assert_eq!(&code[9..11], &[Imm as i64, 2]);
    }

    #[test]
    fn while_jumps_back_to_condition() {
        let program = compile("int main() { int n; while (n) n = n - 1; }").unwrap();
        let code = &program.code;
        // ENT 1, then the condition starts at 2
        assert_eq!(&code[2..6], &[Lea as i64, -1, Li as i64, Jz as i64]);
        let exit = code[6] as usize;
        assert_eq!(&code[exit - 2..exit], &[Jmp as i64, 2]);
        assert_eq!(code[exit], Lev as i64);
    }

    #[test]
    fn empty_statements_and_blocks() {
        let program = compile("int main() { ; { ; { } } return 0; }").unwrap();
        assert_eq!(&program.code[2..5], &[Imm as i64, 0, Lev as i64]);
    }

    #[test]
    fn statement_errors() {
        assert!(matches!(
            compile("int main() { if 1) return 0; }").unwrap_err().kind,
            CompileErrorKind::Expected { .. }
        ));
        assert!(matches!(
            compile("int main() { return 0 }").unwrap_err().kind,
            CompileErrorKind::Expected { .. }
        ));
        assert!(matches!(
            compile("int main() { { return 0; }").unwrap_err().kind,
            CompileErrorKind::Expected { .. }
        ));
    }
}
