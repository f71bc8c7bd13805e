use crate::bytecode::DataSegment;
use crate::symbol::SymbolTable;
use crate::token::{Op, Token};

/// On-demand scanner over the source text.
///
/// Identifiers are interned into the symbol table and string literals are
/// copied into the data segment as they are scanned, so both are passed in
/// by the compiler on every call.
pub struct Lexer<'a> {
    program: &'a [u8],
    cursor: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(program: &'a [u8]) -> Self {
        Lexer {
            program,
            cursor: 0,
            line: 1,
        }
    }

    /// Line of the last consumed character, used for diagnostics only.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Get the next token. This consumes the tokens.
    pub fn next_token(&mut self, symbols: &mut SymbolTable, data: &mut DataSegment) -> Token {
        while let Some(ch) = self.next_char(false) {
            match ch {
                b'\n' => self.line += 1,
                // Preprocessor directives are not supported, drop the whole line
                b'#' => self.skip_line(),
                b'/' => {
                    if self.next_char(true) == Some(b'/') {
                        self.skip_line();
                    } else {
                        return Token::Op(Op::Div);
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => return self.read_identifier(symbols),
                b'0'..=b'9' => return self.read_number(ch),
                b'"' | b'\'' => return self.read_literal(ch, data),
                b'=' => return self.either(b'=', Op::Eq, Op::Assign),
                b'+' => return self.either(b'+', Op::Inc, Op::Add),
                b'-' => return self.either(b'-', Op::Dec, Op::Sub),
                b'|' => return self.either(b'|', Op::Lor, Op::Or),
                b'&' => return self.either(b'&', Op::Lan, Op::And),
                b'!' => {
                    if self.eat(b'=') {
                        return Token::Op(Op::Ne);
                    }
                    return Token::Punct(b'!');
                }
                b'<' => {
                    if self.eat(b'=') {
                        return Token::Op(Op::Le);
                    }
                    return self.either(b'<', Op::Shl, Op::Lt);
                }
                b'>' => {
                    if self.eat(b'=') {
                        return Token::Op(Op::Ge);
                    }
                    return self.either(b'>', Op::Shr, Op::Gt);
                }
                b'^' => return Token::Op(Op::Xor),
                b'%' => return Token::Op(Op::Mod),
                b'*' => return Token::Op(Op::Mul),
                b'[' => return Token::Op(Op::Brak),
                b'?' => return Token::Op(Op::Cond),
                b'~' | b';' | b'{' | b'}' | b'(' | b')' | b']' | b',' | b':' => {
                    return Token::Punct(ch)
                }
                // Whitespace and unknown characters
                _ => {}
            }
        }

        Token::Eof
    }

    /// Two character operator if the next char is `second`, else the single one.
    fn either(&mut self, second: u8, double: Op, single: Op) -> Token {
        if self.eat(second) {
            Token::Op(double)
        } else {
            Token::Op(single)
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.next_char(true) == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Skip until the end of line. The newline itself is left for line counting.
    fn skip_line(&mut self) {
        while let Some(ch) = self.next_char(true) {
            if ch == b'\n' {
                break;
            }
            self.cursor += 1;
        }
    }

    /// Read a decimal, `0x` hexadecimal or leading zero octal number
    fn read_number(&mut self, first: u8) -> Token {
        let mut value = (first - b'0') as i64;

        if value != 0 {
            while let Some(digit) = self.digit(10) {
                value = value.wrapping_mul(10).wrapping_add(digit);
            }
        } else if matches!(self.next_char(true), Some(b'x' | b'X')) {
            self.cursor += 1;
            while let Some(digit) = self.digit(16) {
                value = value.wrapping_mul(16).wrapping_add(digit);
            }
        } else {
            while let Some(digit) = self.digit(8) {
                value = value.wrapping_mul(8).wrapping_add(digit);
            }
        }

        Token::Num(value)
    }

    fn digit(&mut self, radix: u32) -> Option<i64> {
        let digit = (self.next_char(true)? as char).to_digit(radix)?;
        self.cursor += 1;
        Some(digit as i64)
    }

    /// Read a string literal into the data segment, or a character literal
    /// into a number. `\n` is the only escape with a special meaning.
    fn read_literal(&mut self, quote: u8, data: &mut DataSegment) -> Token {
        let start = data.position();
        let mut value = 0u8;

        while let Some(ch) = self.next_char(false) {
            if ch == quote {
                break;
            }
            value = match ch {
                b'\\' => match self.next_char(false) {
                    Some(b'n') => b'\n',
                    Some(escaped) => escaped,
                    None => break,
                },
                b'\n' => {
                    self.line += 1;
                    ch
                }
                _ => ch,
            };

            if quote == b'"' {
                data.push(value);
            }
        }

        if quote == b'"' {
            Token::Str(start)
        } else {
            Token::Num(value as i64)
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self, symbols: &mut SymbolTable) -> Token {
        let start_pos = self.cursor - 1;
        while let Some(ch) = self.next_char(true) {
            // Only alphanumeric characters and '_'
            if !ch.is_ascii_alphanumeric() && ch != b'_' {
                break;
            }
            self.cursor += 1;
        }

        let name = String::from_utf8_lossy(&self.program[start_pos..self.cursor]);
        let id = symbols.intern(&name);
        match symbols.get(id).keyword {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Id(id),
        }
    }

    /// Get the next char and increase the cursor if `peek` is false
    fn next_char(&mut self, peek: bool) -> Option<u8> {
        let ch = *self.program.get(self.cursor)?;
        if !peek {
            self.cursor += 1;
        }
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Keyword;

    fn lex_all(program: &str) -> (Vec<Token>, SymbolTable, DataSegment) {
        let mut symbols = SymbolTable::new();
        let mut data = DataSegment::new();
        let mut lexer = Lexer::new(program.as_bytes());
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token(&mut symbols, &mut data);
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        (tokens, symbols, data)
    }

    #[test]
    fn operators() {
        let (tokens, _, _) = lex_all("= == + ++ - -- ! != < <= << > >= >> | || & && ^ % * [ ? / ~");
        let expected = vec![
            Token::Op(Op::Assign),
            Token::Op(Op::Eq),
            Token::Op(Op::Add),
            Token::Op(Op::Inc),
            Token::Op(Op::Sub),
            Token::Op(Op::Dec),
            Token::Punct(b'!'),
            Token::Op(Op::Ne),
            Token::Op(Op::Lt),
            Token::Op(Op::Le),
            Token::Op(Op::Shl),
            Token::Op(Op::Gt),
            Token::Op(Op::Ge),
            Token::Op(Op::Shr),
            Token::Op(Op::Or),
            Token::Op(Op::Lor),
            Token::Op(Op::And),
            Token::Op(Op::Lan),
            Token::Op(Op::Xor),
            Token::Op(Op::Mod),
            Token::Op(Op::Mul),
            Token::Op(Op::Brak),
            Token::Op(Op::Cond),
            Token::Op(Op::Div),
            Token::Punct(b'~'),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn numbers() {
        let (tokens, _, _) = lex_all("0 42 0x1F 0XfF 017 'a' '\\n'");
        assert_eq!(
            tokens,
            vec![
                Token::Num(0),
                Token::Num(42),
                Token::Num(31),
                Token::Num(255),
                Token::Num(15),
                Token::Num(97),
                Token::Num(10),
            ]
        );
    }

    #[test]
    fn strings_go_to_data_segment() {
        let (tokens, _, data) = lex_all("\"hi\\n\" \"x\"");
        assert_eq!(tokens, vec![Token::Str(8), Token::Str(11)]);
        assert_eq!(&data.bytes()[8..12], b"hi\nx");
    }

    #[test]
    fn identifiers_and_keywords() {
        let (tokens, symbols, _) = lex_all("int foo_1 while foo_1 void");
        let foo = symbols.lookup("foo_1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Int),
                Token::Id(foo),
                Token::Keyword(Keyword::While),
                Token::Id(foo),
                Token::Keyword(Keyword::Char),
            ]
        );
    }

    #[test]
    fn skips_comments_and_directives() {
        let program = "#include <stdio.h>\n// int x;\n;# define X 1\n}";
        let (tokens, _, _) = lex_all(program);
        assert_eq!(tokens, vec![Token::Punct(b';'), Token::Punct(b'}')]);
    }

    #[test]
    fn raw_bytes_in_comments_and_strings() {
        let mut symbols = SymbolTable::new();
        let mut data = DataSegment::new();
        let mut lexer = Lexer::new(b"// caf\xe9\n\"\xff\" x");
        assert_eq!(lexer.next_token(&mut symbols, &mut data), Token::Str(8));
        assert_eq!(data.bytes()[8], 0xff);
        let token = lexer.next_token(&mut symbols, &mut data);
        assert_eq!(token, Token::Id(symbols.lookup("x").unwrap()));
    }

    #[test]
    fn counts_lines() {
        let mut symbols = SymbolTable::new();
        let mut data = DataSegment::new();
        let mut lexer = Lexer::new(b"a\n\n// c\nb");
        lexer.next_token(&mut symbols, &mut data);
        assert_eq!(lexer.line(), 1);
        lexer.next_token(&mut symbols, &mut data);
        assert_eq!(lexer.line(), 4);
        assert_eq!(lexer.next_token(&mut symbols, &mut data), Token::Eof);
    }
}
