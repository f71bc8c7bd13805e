//! Symbol table
//!
//! One flat, append-only table holds every identifier seen in the source. Each
//! record carries its current binding plus a backup of the binding it shadowed,
//! which is enough for the two scope levels of the language: globals and the
//! body of the function being compiled.

use crate::bytecode::{Opcode, WORD};
use crate::token::Keyword;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum BaseType {
    Char,
    Int,
}

/// Type of a variable or expression: a base type plus pointer depth.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Type {
    pub base: BaseType,
    pub depth: u32,
}

impl Type {
    pub const CHAR: Type = Type { base: BaseType::Char, depth: 0 };
    pub const INT: Type = Type { base: BaseType::Int, depth: 0 };

    pub fn pointer_to(self) -> Type {
        Type { base: self.base, depth: self.depth + 1 }
    }

    /// The type a dereference yields, `None` for non-pointers.
    pub fn pointee(self) -> Option<Type> {
        match self.depth {
            0 => None,
            depth => Some(Type { base: self.base, depth: depth - 1 }),
        }
    }

    pub fn is_pointer(self) -> bool {
        self.depth > 0
    }

    /// Pointer whose elements are a full word wide (anything but `char *`).
    pub fn is_word_pointer(self) -> bool {
        self.depth > 1 || (self.depth == 1 && self.base == BaseType::Int)
    }

    /// Element width used to scale pointer arithmetic and increments.
    pub fn stride(self) -> i64 {
        if self.is_word_pointer() {
            WORD
        } else {
            1
        }
    }

    /// Storage width of a value of this type.
    pub fn size(self) -> i64 {
        if self == Type::CHAR {
            1
        } else {
            WORD
        }
    }

    pub fn load_op(self) -> Opcode {
        if self == Type::CHAR {
            Opcode::Lc
        } else {
            Opcode::Li
        }
    }

    pub fn store_op(self) -> Opcode {
        if self == Type::CHAR {
            Opcode::Sc
        } else {
            Opcode::Si
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.base {
            BaseType::Char => write!(f, "char")?,
            BaseType::Int => write!(f, "int")?,
        }
        for _ in 0..self.depth {
            write!(f, "*")?;
        }
        Ok(())
    }
}

/// Storage class of a binding
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Class {
    /// Enum constant, value is the constant
    Num,
    /// Function, value is the entry position in the code buffer
    Fun,
    /// Host syscall, value is the opcode
    Sys,
    /// Global variable, value is its address in the data segment
    Glo,
    /// Parameter or local, value is its slot index
    Loc,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Binding {
    /// `None` while the name is unbound
    pub class: Option<Class>,
    pub ty: Type,
    pub value: i64,
}

impl Default for Binding {
    fn default() -> Self {
        Binding { class: None, ty: Type::INT, value: 0 }
    }
}

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub hash: i64,
    /// Reserved words resolve to a keyword token instead of an identifier
    pub keyword: Option<Keyword>,
    pub binding: Binding,
    /// Binding that was active before the current local one
    backup: Binding,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SymbolId(usize);

const SYSCALLS: [(&str, Opcode); 8] = [
    ("open", Opcode::Open),
    ("read", Opcode::Read),
    ("close", Opcode::Clos),
    ("printf", Opcode::Prtf),
    ("malloc", Opcode::Malc),
    ("memset", Opcode::Mset),
    ("memcmp", Opcode::Mcmp),
    ("exit", Opcode::Exit),
];

#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    main: SymbolId,
}

impl SymbolTable {
    /// Create a table with the keywords and syscalls already registered.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            symbols: Vec::new(),
            main: SymbolId(0),
        };

        for (name, keyword) in Keyword::ALL {
            let id = table.intern(name);
            table.symbols[id.0].keyword = Some(keyword);
        }
        for (name, op) in SYSCALLS {
            let id = table.intern(name);
            table.symbols[id.0].binding = Binding {
                class: Some(Class::Sys),
                ty: Type::INT,
                value: op as i64,
            };
        }

        let void = table.intern("void");
        table.symbols[void.0].keyword = Some(Keyword::Char);
        table.main = table.intern("main");

        table
    }

    /// Rolling multiplicative hash over the identifier bytes.
    pub fn hash(name: &[u8]) -> i64 {
        let mut bytes = name.iter();
        let mut hash = match bytes.next() {
            Some(&first) => first as i64,
            None => return 0,
        };
        for &byte in bytes {
            hash = hash.wrapping_mul(147).wrapping_add(byte as i64);
        }
        hash
    }

    /// Find the record for `name`, creating an unbound one if it was never seen.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        let hash = Self::hash(name.as_bytes());
        if let Some(id) = self.find(name, hash) {
            return id;
        }

        self.symbols.push(Symbol {
            name: name.to_string(),
            hash,
            keyword: None,
            binding: Binding::default(),
            backup: Binding::default(),
        });
        SymbolId(self.symbols.len() - 1)
    }

    /// Look a name up without creating it.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.find(name, Self::hash(name.as_bytes()))
    }

    fn find(&self, name: &str, hash: i64) -> Option<SymbolId> {
        self.symbols
            .iter()
            .position(|sym| sym.hash == hash && sym.name == name)
            .map(SymbolId)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    /// The record of the program entry point.
    pub fn main(&self) -> SymbolId {
        self.main
    }

    /// Save the current binding of `id` and bind it as a local at `slot`.
    pub fn bind_local(&mut self, id: SymbolId, ty: Type, slot: i64) {
        let sym = &mut self.symbols[id.0];
        sym.backup = sym.binding;
        sym.binding = Binding {
            class: Some(Class::Loc),
            ty,
            value: slot,
        };
    }

    /// Restore every shadowed binding once a function body is finished.
    pub fn unbind_locals(&mut self) {
        for sym in self
            .symbols
            .iter_mut()
            .filter(|sym| sym.binding.class == Some(Class::Loc))
        {
            sym.binding = sym.backup;
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
