//! Abstract Syntax Tree for recognized matrix kernels
//!
//! The tree only keeps what code generation needs: kernel functions, the matrices
//! they take as parameters, and the multiply operations found in their bodies.
//! Every node owns its children outright.

use serde::Serialize;

/// Root of a recognized source file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    /// Recognized kernel functions, in source order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(function) => Some(function),
            _ => None,
        })
    }

    /// Total number of multiply operations found inside kernels
    pub fn kernel_count(&self) -> usize {
        self.functions().map(|f| f.operations.len()).sum()
    }
}

/// A top-level item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Item {
    /// A function that looks like a multiply kernel
    Function(Function),
    /// A multiply operator found outside any kernel
    MatrixOp(MatrixOp),
    /// A preprocessor directive, kept only as a marker
    MemoryOp(MemoryOp),
}

/// A recognized kernel function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub line: usize,
    /// Matrix parameters in declaration order
    pub params: Vec<MatrixDecl>,
    /// Multiply operations found in the body
    pub operations: Vec<MatrixOp>,
}

impl Function {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            params: Vec::new(),
            operations: Vec::new(),
        }
    }
}

/// A reference to a matrix by its single-letter name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixDecl {
    pub name: String,
    pub line: usize,
}

impl MatrixDecl {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
        }
    }
}

/// Matrix-level operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatrixOperator {
    Multiply,
}

impl std::fmt::Display for MatrixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixOperator::Multiply => write!(f, "*"),
        }
    }
}

/// The three operands of `result = left * right`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operands {
    pub left: MatrixDecl,
    pub right: MatrixDecl,
    pub result: MatrixDecl,
}

impl Operands {
    /// Operands in emission order: left, right, result
    pub fn iter(&self) -> impl Iterator<Item = &MatrixDecl> {
        [&self.left, &self.right, &self.result].into_iter()
    }
}

/// A matrix operation; either fully resolved or carrying no operands at all
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixOp {
    pub operator: MatrixOperator,
    pub line: usize,
    pub operands: Option<Operands>,
}

impl MatrixOp {
    pub fn multiply(line: usize, operands: Option<Operands>) -> Self {
        Self {
            operator: MatrixOperator::Multiply,
            line,
            operands,
        }
    }

    /// Number of child operands (always 0 or 3)
    pub fn arity(&self) -> usize {
        if self.operands.is_some() {
            3
        } else {
            0
        }
    }
}

/// Marker for a preprocessor directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryOp {
    pub line: usize,
}
