//! C Matrix Kernel to PIM ISA Compiler
//!
//! This library recognizes matrix-multiply kernels in C-style source and turns
//! them into an instruction stream for a processing-in-memory accelerator:
//! microcode definitions, matrix allocations, execution records and releases.
//!
//! # Example
//!
//! ```rust
//! use pim_compiler::{backend, compile, TargetConfig};
//!
//! let source = "
//! #define N 2
//! void multiply(int A[N][N], int B[N][N], int C[N][N]) {
//!     for (int i = 0; i < N; i++) {
//!         for (int j = 0; j < N; j++) {
//!             for (int k = 0; k < N; k++) { C[i][j] += A[i][k] * B[k][j]; }
//!         }
//!     }
//! }";
//! let compilation = compile(source, &TargetConfig::default()).unwrap();
//! assert_eq!(compilation.dimension, 2);
//! assert!(backend::validate(&compilation.isa.lines()).is_well_formed());
//! println!("{}", compilation.isa);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod analyzer;
pub mod allocator;
pub mod codegen;
pub mod hardware;
pub mod backend;
pub mod error;

pub use ast::*;
pub use parser::Parser;
pub use analyzer::KernelScanner;
pub use allocator::{AddressTable, BumpAllocator};
pub use codegen::CodeGenerator;
pub use hardware::{Instruction, IsaProgram, TargetConfig};
pub use backend::IsaReport;
pub use error::{CompileError, CompileResult};

/// Everything one compilation produced
#[derive(Debug)]
pub struct Compilation {
    /// Tokens read, including the end marker
    pub token_count: usize,
    /// Side length every matrix is allocated with
    pub dimension: u64,
    pub program: Program,
    pub isa: IsaProgram,
    /// Recoverable problems; anything here was skipped, not emitted
    pub diagnostics: Vec<CompileError>,
}

/// Main compilation function that takes kernel source and produces PIM instructions
pub fn compile(source: &str, config: &TargetConfig) -> CompileResult<Compilation> {
    config.validate()?;

    // Tokenize and fold #define constants into one dimension
    let tokenized = lexer::tokenize(source);
    log::info!("Tokenization complete: {} tokens", tokenized.tokens.len());
    log::info!(
        "Detected matrix size: {}x{}",
        tokenized.dimension,
        tokenized.dimension
    );

    // Recognize kernels
    let mut parser = Parser::new(&tokenized.tokens);
    let program = parser.parse_program();
    let mut diagnostics = parser.into_diagnostics();

    if log::log_enabled!(log::Level::Debug) {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => log::debug!("AST:\n{}", json),
            Err(e) => log::debug!("AST could not be serialized: {}", e),
        }
    }

    // Allocate and emit
    let mut codegen = CodeGenerator::new(config.clone(), tokenized.dimension);
    let isa = codegen.generate(&program)?;
    diagnostics.extend(codegen.into_diagnostics());

    if log::log_enabled!(log::Level::Trace) {
        match isa.to_json() {
            Ok(json) => log::trace!("ISA:\n{}", json),
            Err(e) => log::trace!("ISA could not be serialized: {}", e),
        }
    }

    Ok(Compilation {
        token_count: tokenized.tokens.len(),
        dimension: tokenized.dimension,
        program,
        isa,
        diagnostics,
    })
}
