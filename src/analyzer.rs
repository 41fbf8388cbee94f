//! Loop-nest analysis for kernel bodies
//!
//! Recognizes the canonical accumulation pattern
//!
//! ```text
//! for (i ...) { for (j ...) { for (k ...) { R[i][j] += A[i][k] * B[k][j]; } } }
//! ```
//!
//! by tracking how deep the `for` nest is and, once it is exactly three deep,
//! looking at the first assignment that multiplies two matrices. Anything else is
//! ignored without complaint.

use crate::ast::{MatrixDecl, MatrixOp, Operands};
use crate::lexer::Token;

/// Depth at which an assignment is considered a kernel candidate
pub const KERNEL_DEPTH: usize = 3;

/// How many tokens, ending at the `=`, are searched for the result matrix
pub const RESULT_LOOKBACK: usize = 5;

/// What the caller should do after feeding a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The closing brace of the function body was consumed
    Exit,
}

/// Recognizer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    /// Outside any loop
    Scanning,
    /// Inside a loop nest that is not a candidate
    InNest(usize),
    /// Freshly entered a 3-deep nest, waiting for an assignment
    Candidate,
    /// Collecting operands of an assignment up to its `;`
    Resolving(Resolution),
}

/// Operands gathered while resolving one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub result: Option<MatrixDecl>,
    pub left: Option<MatrixDecl>,
    pub right: Option<MatrixDecl>,
    pub multiply_seen: bool,
}

impl Resolution {
    fn into_operands(self) -> Option<Operands> {
        if !self.multiply_seen {
            return None;
        }
        Some(Operands {
            left: self.left?,
            right: self.right?,
            result: self.result?,
        })
    }
}

/// State machine fed one body token at a time
#[derive(Debug)]
pub struct KernelScanner {
    /// Source line of each open `for`
    nest: Vec<usize>,
    state: ScanState,
    operations: Vec<MatrixOp>,
}

impl KernelScanner {
    pub fn new() -> Self {
        Self {
            nest: Vec::new(),
            state: ScanState::Scanning,
            operations: Vec::new(),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn depth(&self) -> usize {
        self.nest.len()
    }

    /// Operations recognized so far
    pub fn operations(&self) -> &[MatrixOp] {
        &self.operations
    }

    pub fn finish(self) -> Vec<MatrixOp> {
        self.operations
    }

    /// Feed `tokens[index]`; earlier tokens are visible for the result lookback
    pub fn feed(&mut self, tokens: &[Token], index: usize) -> Flow {
        let token = &tokens[index];

        let state = std::mem::replace(&mut self.state, ScanState::Scanning);
        self.state = match state {
            ScanState::Resolving(resolution) => self.resolve(resolution, token),
            ScanState::Candidate if token.is_operator("=") => {
                let result = lookback_result(tokens, index);
                log::trace!(
                    "Line {}: assignment in kernel nest, result {:?}",
                    token.line,
                    result.as_ref().map(|m| m.name.as_str())
                );
                ScanState::Resolving(Resolution {
                    result,
                    ..Resolution::default()
                })
            }
            _ if token.is_symbol("}") => {
                if self.nest.pop().is_none() {
                    return Flow::Exit;
                }
                self.nest_state()
            }
            _ if token.is_identifier("for") => {
                self.nest.push(token.line);
                if self.nest.len() == KERNEL_DEPTH {
                    log::trace!("Line {}: entered {}-deep loop nest", token.line, KERNEL_DEPTH);
                    ScanState::Candidate
                } else {
                    self.nest_state()
                }
            }
            state => state,
        };

        Flow::Continue
    }

    fn resolve(&mut self, mut resolution: Resolution, token: &Token) -> ScanState {
        if token.is_symbol(";") {
            return match resolution.into_operands() {
                Some(operands) => {
                    let line = self.nest.last().copied().unwrap_or(token.line);
                    log::debug!(
                        "Line {}: recognized {} = {} * {}",
                        line,
                        operands.result.name,
                        operands.left.name,
                        operands.right.name
                    );
                    self.operations.push(MatrixOp::multiply(line, Some(operands)));
                    self.nest_state()
                }
                None => ScanState::Candidate,
            };
        }

        if token.is_matrix_name() {
            let operand = Some(MatrixDecl::new(token.text.clone(), token.line));
            if resolution.left.is_none() {
                resolution.left = operand;
            } else if resolution.right.is_none() {
                resolution.right = operand;
            }
        } else if token.is_operator("*") {
            resolution.multiply_seen = true;
        }

        ScanState::Resolving(resolution)
    }

    fn nest_state(&self) -> ScanState {
        match self.nest.len() {
            0 => ScanState::Scanning,
            depth => ScanState::InNest(depth),
        }
    }
}

impl Default for KernelScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest matrix name among the `RESULT_LOOKBACK` tokens ending at `index`
fn lookback_result(tokens: &[Token], index: usize) -> Option<MatrixDecl> {
    let start = (index + 1).saturating_sub(RESULT_LOOKBACK);
    tokens[start..=index]
        .iter()
        .rev()
        .find(|t| t.is_matrix_name())
        .map(|t| MatrixDecl::new(t.text.clone(), t.line))
}
