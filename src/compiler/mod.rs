//! Single pass compiler
//!
//! Parsing and code generation are fused: every grammar rule emits its
//! bytecode into the [`CodeBuffer`] as soon as it is recognized. There is no
//! syntax tree.
//!
//! ```text
//! program          ::= {global_decl}+
//! global_decl      ::= enum_decl | variable_decl | function_decl
//! enum_decl        ::= 'enum' [id] '{' id ['=' num] {',' id ['=' num]} '}' ';'
//! variable_decl    ::= type {'*'} id {',' {'*'} id} ';'
//! function_decl    ::= type {'*'} id '(' param_decl ')' '{' body_decl '}'
//! param_decl       ::= type {'*'} id {',' type {'*'} id}
//! body_decl        ::= {variable_decl} {statement}
//! statement        ::= if_stmt | while_stmt | '{' {statement} '}'
//!                    | 'return' [expression] ';' | [expression] ';'
//! ```

mod expression;
mod statement;

use log::debug;

use crate::bytecode::{CodeBuffer, DataSegment, Function, Opcode, Program};
use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::Lexer;
use crate::symbol::{Binding, Class, SymbolId, SymbolTable, Type};
use crate::token::{Keyword, Op, Token};

type CResult<T> = Result<T, CompileError>;

/// Compile a whole source text into a [`Program`]. The source is read as
/// raw bytes, so comments and string literals may hold any encoding.
pub fn compile<S: AsRef<[u8]> + ?Sized>(source: &S) -> Result<Program, CompileError> {
    Compiler::new(source.as_ref()).compile()
}

pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    /// Current token
    token: Token,
    symbols: SymbolTable,
    data: DataSegment,
    code: CodeBuffer,
    /// Type of the most recently compiled expression
    expr_type: Type,
    /// Slot of the frame pointer in the function being compiled. A local at
    /// slot `n` lives at `bp + (frame_slot - n) * WORD`.
    frame_slot: i64,
    functions: Vec<Function>,
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Compiler {
            lexer: Lexer::new(source),
            token: Token::Eof,
            symbols: SymbolTable::new(),
            data: DataSegment::new(),
            code: CodeBuffer::new(),
            expr_type: Type::INT,
            frame_slot: 0,
            functions: Vec::new(),
        }
    }

    pub fn compile(mut self) -> CResult<Program> {
        self.next();
        while self.token != Token::Eof {
            self.global_declaration()?;
        }

        let main = self.symbols.get(self.symbols.main()).binding;
        if main.class != Some(Class::Fun) {
            return Err(self.error(CompileErrorKind::MainNotDefined));
        }

        // `main` returns into this stub, which exits with its return value
        let exit_stub = self.code.len();
        self.code.emit(Opcode::Push);
        self.code.emit(Opcode::Exit);

        debug!(
            "compiled {} words of code, {} bytes of data",
            self.code.len(),
            self.data.position()
        );

        Ok(Program {
            code: self.code.into_words(),
            data: self.data.into_bytes(),
            entry: main.value as usize,
            exit_stub,
            functions: self.functions,
        })
    }

    fn next(&mut self) {
        self.token = self.lexer.next_token(&mut self.symbols, &mut self.data);
    }

    fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError::new(self.lexer.line(), kind)
    }

    fn expected(&self, expected: &str) -> CompileError {
        self.error(CompileErrorKind::Expected {
            expected: expected.to_string(),
            found: self.token.to_string(),
        })
    }

    /// Consume the punctuation `ch` or fail.
    fn expect_punct(&mut self, ch: u8) -> CResult<()> {
        if !self.token.is_punct(ch) {
            return Err(self.expected(&format!("'{}'", ch as char)));
        }
        self.next();
        Ok(())
    }

    fn name(&self, id: SymbolId) -> String {
        self.symbols.get(id).name.clone()
    }

    /// Consume a leading `int` or `char` keyword.
    fn base_type(&mut self) -> Option<Type> {
        let ty = match self.token {
            Token::Keyword(Keyword::Int) => Type::INT,
            Token::Keyword(Keyword::Char) => Type::CHAR,
            _ => return None,
        };
        self.next();
        Some(ty)
    }

    /// Consume any number of `*` after a base type.
    fn pointer_suffix(&mut self, mut ty: Type) -> Type {
        while self.token == Token::Op(Op::Mul) {
            self.next();
            ty = ty.pointer_to();
        }
        ty
    }

    fn global_declaration(&mut self) -> CResult<()> {
        if self.token == Token::Keyword(Keyword::Enum) {
            return self.enum_declaration();
        }

        let base = self
            .base_type()
            .ok_or_else(|| self.error(CompileErrorKind::BadGlobalDeclaration))?;

        if self.token.is_punct(b';') {
            self.next();
            return Ok(());
        }

        loop {
            let ty = self.pointer_suffix(base);
            let id = match self.token {
                Token::Id(id) => id,
                _ => return Err(self.error(CompileErrorKind::BadGlobalDeclaration)),
            };
            if self.symbols.get(id).binding.class.is_some() {
                return Err(self.error(CompileErrorKind::DuplicateGlobal));
            }
            self.next();

            if self.token.is_punct(b'(') {
                self.symbols.get_mut(id).binding = Binding {
                    class: Some(Class::Fun),
                    ty,
                    value: self.code.len() as i64,
                };
                // A function definition ends the declaration
                return self.function_declaration(id);
            }

            let addr = self.data.reserve_word();
            debug!("global {} {} at {}", ty, self.symbols.get(id).name, addr);
            self.symbols.get_mut(id).binding = Binding {
                class: Some(Class::Glo),
                ty,
                value: addr,
            };

            if self.token.is_punct(b',') {
                self.next();
            } else {
                return self.expect_punct(b';');
            }
        }
    }

    /// `enum [name] { a [= n], b, ... };`
    fn enum_declaration(&mut self) -> CResult<()> {
        self.next();
        if let Token::Id(_) = self.token {
            self.next();
        }

        if self.token.is_punct(b'{') {
            self.next();
            let mut value = 0;
            while !self.token.is_punct(b'}') {
                let id = match self.token {
                    Token::Id(id) => id,
                    token => {
                        return Err(
                            self.error(CompileErrorKind::BadEnumIdentifier(token.to_string()))
                        )
                    }
                };
                if self.symbols.get(id).binding.class.is_some() {
                    return Err(self.error(CompileErrorKind::DuplicateGlobal));
                }
                self.next();

                if self.token == Token::Op(Op::Assign) {
                    self.next();
                    value = match self.token {
                        Token::Num(n) => n,
                        _ => return Err(self.error(CompileErrorKind::BadEnumInitializer)),
                    };
                    self.next();
                }

                self.symbols.get_mut(id).binding = Binding {
                    class: Some(Class::Num),
                    ty: Type::INT,
                    value,
                };
                value = value.wrapping_add(1);

                if self.token.is_punct(b',') {
                    self.next();
                }
            }
            self.next();
        }

        self.expect_punct(b';')
    }

    /// Parameters, locals and body of a function whose name was just consumed.
    fn function_declaration(&mut self, id: SymbolId) -> CResult<()> {
        let name = self.name(id);
        let addr = self.code.len();
        debug!("function {} at {}", name, addr);
        self.functions.push(Function { name, addr });

        self.expect_punct(b'(')?;
        let mut params = 0;
        while !self.token.is_punct(b')') {
            let base = self
                .base_type()
                .ok_or_else(|| self.error(CompileErrorKind::BadParameterDeclaration))?;
            let ty = self.pointer_suffix(base);
            let param = match self.token {
                Token::Id(param) => param,
                _ => return Err(self.error(CompileErrorKind::BadParameterDeclaration)),
            };
            if self.symbols.get(param).binding.class == Some(Class::Loc) {
                return Err(self.error(CompileErrorKind::DuplicateParameter));
            }
            self.symbols.bind_local(param, ty, params);
            params += 1;
            self.next();

            if self.token.is_punct(b',') {
                self.next();
            } else if !self.token.is_punct(b')') {
                return Err(self.error(CompileErrorKind::BadParameterDeclaration));
            }
        }
        self.next();

        // Slots above the frame pointer: the return address, then the arguments
        self.frame_slot = params + 1;

        self.expect_punct(b'{')?;
        let mut locals = 0;
        while let Some(base) = self.base_type() {
            while !self.token.is_punct(b';') {
                let ty = self.pointer_suffix(base);
                let local = match self.token {
                    Token::Id(local) => local,
                    _ => return Err(self.error(CompileErrorKind::BadLocalDeclaration)),
                };
                if self.symbols.get(local).binding.class == Some(Class::Loc) {
                    return Err(self.error(CompileErrorKind::DuplicateLocal));
                }
                locals += 1;
                self.symbols.bind_local(local, ty, self.frame_slot + locals);
                self.next();

                if self.token.is_punct(b',') {
                    self.next();
                } else if !self.token.is_punct(b';') {
                    return Err(self.expected("';'"));
                }
            }
            self.next();
        }

        self.code.emit_with(Opcode::Ent, locals);
        while !self.token.is_punct(b'}') {
            if self.token == Token::Eof {
                return Err(self.expected("'}'"));
            }
            self.statement()?;
        }
        // Falling off the end of a function returns too
        self.code.emit(Opcode::Lev);

        self.symbols.unbind_locals();
        self.next();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::WORD;

    fn compile_err(source: &str) -> CompileErrorKind {
        compile(source).unwrap_err().kind
    }

    #[test]
    fn empty_main() {
        let program = compile("int main() { }").unwrap();
        assert_eq!(program.entry, 0);
        assert_eq!(
            program.code,
            vec![
                Opcode::Ent as i64,
                0,
                Opcode::Lev as i64,
                Opcode::Push as i64,
                Opcode::Exit as i64
            ]
        );
        assert_eq!(program.exit_stub, 3);
        assert_eq!(program.functions, vec![Function { name: "main".into(), addr: 0 }]);
    }

    #[test]
    fn globals_get_data_words() {
        let program = compile("int a, *b; char c; int main() { return 0; }").unwrap();
        // Reserved null word plus three globals
        assert_eq!(program.data.len() as i64, 4 * WORD);
    }

    #[test]
    fn frame_layout() {
        let program = compile("int f(int a, int b) { int x; char y; return a + y; } int main() { }")
            .unwrap();
        let code = &program.code;
        assert_eq!(&code[0..2], &[Opcode::Ent as i64, 2]);
        // a is the first argument, two slots above bp plus one per later argument
        assert_eq!(&code[2..5], &[Opcode::Lea as i64, 3, Opcode::Li as i64]);
        assert_eq!(code[5], Opcode::Push as i64);
        // y is the second local
        assert_eq!(&code[6..9], &[Opcode::Lea as i64, -2, Opcode::Lc as i64]);
    }

    #[test]
    fn enum_constants() {
        let program =
            compile("enum { A, B = 10, C }; enum Named { D }; int main() { return C + D; }")
                .unwrap();
        let code = &program.code;
        assert_eq!(&code[2..4], &[Opcode::Imm as i64, 11]);
        assert_eq!(&code[5..7], &[Opcode::Imm as i64, 0]);
    }

    #[test]
    fn enum_numbering_wraps() {
        let program =
            compile("enum { A = 0x7fffffffffffffff, B }; int main() { return B; }").unwrap();
        assert_eq!(&program.code[2..4], &[Opcode::Imm as i64, i64::MIN]);
    }

    #[test]
    fn declaration_errors() {
        assert_eq!(compile_err("int a; int a;"), CompileErrorKind::DuplicateGlobal);
        assert_eq!(compile_err("int printf;"), CompileErrorKind::DuplicateGlobal);
        assert_eq!(
            compile_err("int f(int a, int a) { }"),
            CompileErrorKind::DuplicateParameter
        );
        assert_eq!(
            compile_err("int f(int a) { int a; }"),
            CompileErrorKind::DuplicateLocal
        );
        assert_eq!(compile_err("int 5;"), CompileErrorKind::BadGlobalDeclaration);
        assert_eq!(compile_err("}"), CompileErrorKind::BadGlobalDeclaration);
        assert_eq!(
            compile_err("int main() { return 0; } }"),
            CompileErrorKind::BadGlobalDeclaration
        );
        assert_eq!(
            compile_err("enum { 1 };"),
            CompileErrorKind::BadEnumIdentifier("number 1".into())
        );
        assert_eq!(compile_err("enum { A = B };"), CompileErrorKind::BadEnumInitializer);
        assert_eq!(compile_err("int f(x) { }"), CompileErrorKind::BadParameterDeclaration);
        assert_eq!(compile_err("int x;"), CompileErrorKind::MainNotDefined);
    }

    #[test]
    fn error_line_numbers() {
        let err = compile("int main() {\n  int x;\n  return y;\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, CompileErrorKind::UndefinedVariable("y".into()));
        assert_eq!(err.to_string(), "3: undefined variable y");
    }

    #[test]
    fn locals_are_restored_after_body() {
        let source = "int x; int f(int x) { return x; } int main() { return x; }";
        let program = compile(source).unwrap();
        let main = program.entry;
        // Inside main `x` is the global again
        assert_eq!(
            &program.code[main + 2..main + 5],
            &[Opcode::Imm as i64, WORD, Opcode::Li as i64]
        );
    }
}
