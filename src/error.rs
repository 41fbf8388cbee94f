//! Error types for the PIM compiler

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
///
/// `ParseError`, `UnexpectedEof` and `UnresolvedOperand` are recoverable: the stage that
/// raises them records the diagnostic and keeps going. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Parse error at token {index} ('{token}'): {message}")]
    ParseError {
        index: usize,
        token: String,
        message: String,
    },

    #[error("Unexpected end of input at line {line} while {context}")]
    UnexpectedEof { line: usize, context: String },

    #[error(
        "PIM memory overflow: matrix {name} needs {requested} bytes at {cursor:#06x}, \
         window ends at {ceiling:#06x}"
    )]
    MemoryOverflow {
        name: String,
        requested: u64,
        cursor: u64,
        ceiling: u64,
    },

    #[error("Missing address for matrix {name} in {operation}")]
    UnresolvedOperand { name: String, operation: String },

    #[error("Invalid target configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Could not open input file '{path}': {source}")]
    ReadInput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not open output file '{path}': {source}")]
    WriteOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn parse_error(index: usize, token: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::ParseError {
            index,
            token: token.into(),
            message: msg.into(),
        }
    }

    pub fn unexpected_eof(line: usize, context: impl Into<String>) -> Self {
        CompileError::UnexpectedEof {
            line,
            context: context.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CompileError::InvalidConfig { message: msg.into() }
    }

    /// Whether the pipeline can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CompileError::ParseError { .. }
                | CompileError::UnexpectedEof { .. }
                | CompileError::UnresolvedOperand { .. }
        )
    }
}
