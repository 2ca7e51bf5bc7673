//! Parser for the textual form of value types.
//!
//! ```text
//! type      := cell | "tensor" ("<" cell ">")? "(" dims? ")"
//! dims      := dim ("," dim)*
//! dim       := ident ("[" size "]" | "{" "}")
//! cell      := "double" | "float" | "bfloat16" | "int8"
//! ```
//!
//! Whitespace is allowed between tokens. A tensor without an explicit cell
//! type has `double` cells. Dimension order is kept as written.

use crate::{CellType, Dimension, ValueType};
use rustc_hash::FxHashSet;

/// Errors produced while parsing a type spec.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TypeSpecError {
    /// Input ended in the middle of a type.
    #[error("unexpected end of type spec, expected {expected}")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// A character did not fit the grammar.
    #[error("unexpected '{found}' at offset {pos}, expected {expected}")]
    UnexpectedChar {
        /// Byte offset of the character.
        pos: usize,
        /// The offending character.
        found: char,
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// Unknown cell type name.
    #[error("unknown cell type: {0}")]
    UnknownCellType(String),

    /// An indexed dimension had a missing, zero or unparsable size.
    #[error("invalid size for dimension '{0}'")]
    InvalidSize(String),

    /// The same dimension name appeared twice.
    #[error("duplicate dimension: {0}")]
    DuplicateDimension(String),

    /// The indexed sizes multiply to more cells than can be addressed.
    #[error("too many cells: dimension '{0}' overflows the cell count")]
    TooLarge(String),
}

/// Parses a type spec.
///
/// # Errors
///
/// Returns a [`TypeSpecError`] describing the first problem found.
pub fn parse(input: &str) -> Result<ValueType, TypeSpecError> {
    let mut parser = Parser { input, pos: 0 };
    let ty = parser.parse_type()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(ty),
        Some(c) => Err(parser.unexpected(c, "end of input")),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn unexpected(&self, found: char, expected: &'static str) -> TypeSpecError {
        TypeSpecError::UnexpectedChar {
            pos: self.pos,
            found,
            expected,
        }
    }

    fn expect(&mut self, want: char, expected: &'static str) -> Result<(), TypeSpecError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.unexpected(c, expected)),
            None => Err(TypeSpecError::UnexpectedEnd { expected }),
        }
    }

    fn ident(&mut self, expected: &'static str) -> Result<&'a str, TypeSpecError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        if self.pos == start {
            return match self.peek() {
                Some(c) => Err(self.unexpected(c, expected)),
                None => Err(TypeSpecError::UnexpectedEnd { expected }),
            };
        }
        Ok(&self.input[start..self.pos])
    }

    fn cell_type(&mut self) -> Result<CellType, TypeSpecError> {
        let name = self.ident("cell type")?;
        CellType::from_name(name).ok_or_else(|| TypeSpecError::UnknownCellType(name.to_string()))
    }

    fn parse_type(&mut self) -> Result<ValueType, TypeSpecError> {
        let word = self.ident("type")?;
        if word != "tensor" {
            return CellType::from_name(word)
                .map(ValueType::scalar)
                .ok_or_else(|| TypeSpecError::UnknownCellType(word.to_string()));
        }

        self.skip_ws();
        let cell_type = if self.peek() == Some('<') {
            self.bump();
            let cell_type = self.cell_type()?;
            self.expect('>', "'>'")?;
            cell_type
        } else {
            CellType::Double
        };

        self.expect('(', "'('")?;
        let mut dims = Vec::new();
        let mut seen = FxHashSet::default();
        let mut cells: usize = 1;
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(ValueType::tensor(cell_type, dims));
        }
        loop {
            let dim = self.dimension()?;
            if !seen.insert(dim.name.clone()) {
                return Err(TypeSpecError::DuplicateDimension(dim.name));
            }
            if let Some(size) = dim.size {
                cells = cells
                    .checked_mul(size)
                    .ok_or_else(|| TypeSpecError::TooLarge(dim.name.clone()))?;
            }
            dims.push(dim);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(')') => break,
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.unexpected(c, "',' or ')'"));
                }
                None => return Err(TypeSpecError::UnexpectedEnd { expected: "')'" }),
            }
        }
        Ok(ValueType::tensor(cell_type, dims))
    }

    fn dimension(&mut self) -> Result<Dimension, TypeSpecError> {
        let name = self.ident("dimension name")?.to_string();
        self.skip_ws();
        match self.bump() {
            Some('{') => {
                self.expect('}', "'}'")?;
                Ok(Dimension::mapped(name))
            }
            Some('[') => {
                self.skip_ws();
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
                let size = self.input[start..self.pos]
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| TypeSpecError::InvalidSize(name.clone()))?;
                self.expect(']', "']'")?;
                Ok(Dimension::indexed(name, size))
            }
            Some(c) => {
                self.pos -= c.len_utf8();
                Err(self.unexpected(c, "'[' or '{'"))
            }
            None => Err(TypeSpecError::UnexpectedEnd {
                expected: "'[' or '{'",
            }),
        }
    }
}
