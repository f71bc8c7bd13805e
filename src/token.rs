use crate::symbol::SymbolId;

/// Reserved words of the language.
/// ***Note that syscalls like `printf` are not keywords, they are pre-bound identifiers***
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Keyword {
    Char,
    Else,
    Enum,
    If,
    Int,
    Return,
    Sizeof,
    While,
}

impl Keyword {
    /// Keywords in the order they are registered in a fresh symbol table.
    /// `void` is not listed, it is registered as an alias of `char`.
    pub const ALL: [(&'static str, Keyword); 8] = [
        ("char", Keyword::Char),
        ("else", Keyword::Else),
        ("enum", Keyword::Enum),
        ("if", Keyword::If),
        ("int", Keyword::Int),
        ("return", Keyword::Return),
        ("sizeof", Keyword::Sizeof),
        ("while", Keyword::While),
    ];
}

/// Operators that may follow a primary expression.
///
/// Variants are declared in ascending precedence order and the derived `Ord`
/// is the precedence table: the expression compiler keeps consuming an
/// operator only while `op >= min_precedence`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub enum Op {
    Assign,
    Cond,
    Lor,
    Lan,
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
    Inc,
    Dec,
    Brak,
}

impl Op {
    /// Numeric token code, symbolic codes start at 128.
    pub fn code(self) -> i64 {
        142 + self as i64
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Assign => "=",
            Op::Cond => "?",
            Op::Lor => "||",
            Op::Lan => "&&",
            Op::Or => "|",
            Op::Xor => "^",
            Op::And => "&",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Le => "<=",
            Op::Ge => ">=",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Inc => "++",
            Op::Dec => "--",
            Op::Brak => "[",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Token {
    /// End of the source text
    Eof,
    /// Single character punctuation: `~ ; { } ( ) ] , : !`
    Punct(u8),
    /// Numeric or character literal
    Num(i64),
    /// String literal, the value is its address in the data segment
    Str(i64),
    /// Plain identifier
    Id(SymbolId),
    Keyword(Keyword),
    Op(Op),
}

impl Token {
    pub fn is_punct(&self, ch: u8) -> bool {
        *self == Token::Punct(ch)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Eof => write!(f, "end of file"),
            Token::Punct(ch) => write!(f, "'{}'", *ch as char),
            Token::Num(n) => write!(f, "number {}", n),
            Token::Str(_) => write!(f, "string literal"),
            Token::Id(_) => write!(f, "identifier"),
            Token::Keyword(kw) => write!(f, "keyword {:?}", kw),
            Token::Op(op) => write!(f, "'{}' ({})", op.symbol(), op.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_order() {
        assert!(Op::Assign < Op::Cond);
        assert!(Op::Lor < Op::Lan);
        assert!(Op::Eq < Op::Lt);
        assert!(Op::Add < Op::Mul);
        assert!(Op::Mul < Op::Inc);
        assert!(Op::Inc < Op::Brak);
        assert_eq!(Op::Eq.cmp(&Op::Ne), std::cmp::Ordering::Less);
    }

    #[test]
    fn token_codes() {
        assert_eq!(Op::Assign.code(), 142);
        assert_eq!(Op::Brak.code(), 164);
    }
}
