//! Structural recognizer for C-style kernel sources
//!
//! This is not a C parser. It looks for:
//! - `void multiply(int A[N][N], ...) { ... }` style kernels (see [`KERNEL_NAMES`])
//! - preprocessor directives, kept as inert markers
//! - stray `*` operators at top level
//!
//! and skips everything else. A statement that cannot be recognized is reported
//! and scanning picks up again at the next token.

use crate::analyzer::{Flow, KernelScanner};
use crate::ast::{Function, Item, MatrixDecl, MatrixOp, MemoryOp, Operands, Program};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Token, TokenKind};

/// Function names treated as multiply kernels
pub const KERNEL_NAMES: [&str; 3] = ["multiply", "matmul", "matrix_multiply"];

/// Recognizer over a token sequence ending in [`TokenKind::Eof`]
pub struct Parser<'tokens> {
    tokens: &'tokens [Token],
    index: usize,
    diagnostics: Vec<CompileError>,
}

impl<'tokens> Parser<'tokens> {
    pub fn new(tokens: &'tokens [Token]) -> Self {
        Self {
            tokens,
            index: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Recoverable problems met while parsing
    pub fn diagnostics(&self) -> &[CompileError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<CompileError> {
        self.diagnostics
    }

    /// Current token, or an error once the input is exhausted
    fn current(&self, context: &str) -> CompileResult<&'tokens Token> {
        match self.tokens.get(self.index) {
            Some(token) if !token.is_eof() => Ok(token),
            Some(token) => Err(CompileError::unexpected_eof(token.line, context)),
            None => Err(CompileError::unexpected_eof(self.last_line(), context)),
        }
    }

    fn peek(&self) -> Option<&'tokens Token> {
        self.tokens.get(self.index).filter(|t| !t.is_eof())
    }

    fn at_end(&self) -> bool {
        self.peek().is_none()
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map_or(1, |t| t.line)
    }

    /// Advance until the current token is the symbol `symbol`
    fn skip_to_symbol(&mut self, symbol: &str, context: &str) -> CompileResult<()> {
        while !self.current(context)?.is_symbol(symbol) {
            self.advance();
        }
        Ok(())
    }

    /// Parse the whole token stream
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.at_end() {
            match self.parse_top_level() {
                Ok(Some(item)) => program.items.push(item),
                Ok(None) => {}
                Err(e) => {
                    let token = self
                        .tokens
                        .get(self.index)
                        .map_or_else(String::new, |t| t.to_string());
                    log::warn!("Parse error at token {} ('{}'): {}", self.index, token, e);
                    self.diagnostics.push(e);
                    self.advance();
                }
            }
        }

        log::info!(
            "AST built with {} top-level nodes, {} kernel operation(s)",
            program.items.len(),
            program.kernel_count()
        );
        program
    }

    /// Parse one top-level construct; `None` means tokens were skipped
    fn parse_top_level(&mut self) -> CompileResult<Option<Item>> {
        let token = self.current("scanning top level")?;

        if token.is_identifier("void") {
            self.advance();
            let Some(name) = self.peek().filter(|t| t.kind == TokenKind::Identifier) else {
                return Ok(None);
            };
            self.advance();

            if KERNEL_NAMES.contains(&name.text.as_str()) {
                let function = self.parse_function(&name.text, name.line)?;
                return Ok(Some(Item::Function(function)));
            }

            log::debug!("Skipping function {} at line {}", name.text, name.line);
            self.skip_function();
            return Ok(None);
        }

        match token.kind {
            TokenKind::Preprocessor => {
                self.advance();
                Ok(Some(Item::MemoryOp(MemoryOp { line: token.line })))
            }
            TokenKind::Operator if token.text == "*" => {
                Ok(Some(Item::MatrixOp(self.parse_standalone_operation())))
            }
            _ => {
                self.advance();
                Ok(None)
            }
        }
    }

    /// Skip a function body by brace counting; a prototype ends at its `;`
    fn skip_function(&mut self) {
        while let Some(token) = self.peek() {
            if token.is_symbol("{") {
                break;
            }
            self.advance();
            if token.is_symbol(";") {
                return;
            }
        }
        if self.at_end() {
            return;
        }

        self.advance();
        let mut depth = 1usize;
        while depth > 0 {
            let Some(token) = self.peek() else {
                return;
            };
            if token.is_symbol("{") {
                depth += 1;
            } else if token.is_symbol("}") {
                depth -= 1;
            }
            self.advance();
        }
    }

    /// Parse a kernel from its parameter list through the end of its body
    fn parse_function(&mut self, name: &str, line: usize) -> CompileResult<Function> {
        let mut function = Function::new(name, line);
        let context = format!("parsing parameters of {}", name);

        self.skip_to_symbol("(", &context)?;
        self.advance();

        loop {
            let token = self.current(&context)?;
            if token.is_symbol(")") {
                self.advance();
                break;
            }

            self.advance();
            if token.kind != TokenKind::ElementType {
                continue;
            }

            let declared = self.current(&context)?;
            if !matches!(declared.kind, TokenKind::MatrixName | TokenKind::Identifier) {
                continue;
            }
            function
                .params
                .push(MatrixDecl::new(declared.text.clone(), declared.line));

            // Rest of the parameter, e.g. trailing dimensions
            while !self
                .current(&context)
                .map(|t| t.is_symbol(",") || t.is_symbol(")"))?
            {
                self.advance();
            }
        }

        self.skip_to_body(name)?;
        self.advance();

        function.operations = self.scan_body(name);
        log::debug!(
            "Function {} at line {}: {} matrix parameter(s), {} operation(s)",
            name,
            line,
            function.params.len(),
            function.operations.len()
        );
        Ok(function)
    }

    /// Advance to the `{` opening a kernel body; a `;` first means a bare prototype
    fn skip_to_body(&mut self, name: &str) -> CompileResult<()> {
        let context = format!("looking for the body of {}", name);
        loop {
            let token = self.current(&context)?;
            if token.is_symbol("{") {
                return Ok(());
            }
            if token.is_symbol(";") {
                return Err(CompileError::parse_error(
                    self.index,
                    token.text.clone(),
                    format!("kernel {} is declared without a body", name),
                ));
            }
            self.advance();
        }
    }

    /// Feed body tokens to the kernel scanner until the function closes
    fn scan_body(&mut self, name: &str) -> Vec<MatrixOp> {
        let mut scanner = KernelScanner::new();

        while !self.at_end() {
            let flow = scanner.feed(self.tokens, self.index);
            self.advance();
            if flow == Flow::Exit {
                return scanner.finish();
            }
        }

        log::warn!("Body of {} is not closed before end of input", name);
        scanner.finish()
    }

    /// `* L R = Res` outside any kernel; keeps operands only when all three resolve
    fn parse_standalone_operation(&mut self) -> MatrixOp {
        let line = self.tokens[self.index].line;
        self.advance();

        let left = self.matrix_operand();
        let right = self.matrix_operand();
        let result = if self.peek().is_some_and(|t| t.is_operator("=")) {
            self.advance();
            self.matrix_operand()
        } else {
            None
        };

        let operands = match (left, right, result) {
            (Some(left), Some(right), Some(result)) => Some(Operands {
                left,
                right,
                result,
            }),
            _ => None,
        };
        MatrixOp::multiply(line, operands)
    }

    fn matrix_operand(&mut self) -> Option<MatrixDecl> {
        let token = self.peek().filter(|t| t.is_matrix_name())?;
        self.advance();
        Some(MatrixDecl::new(token.text.clone(), token.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (Program, Vec<CompileError>) {
        let tokens = tokenize(source).tokens;
        let mut parser = Parser::new(&tokens);
        let program = parser.parse_program();
        (program, parser.into_diagnostics())
    }

    const MULTIPLY: &str = "#include <iostream>
#define N 3

void multiply(int A[N][N], int B[N][N], int C[N][N]) {
    for (int i = 0; i < N; i++) {
        for (int j = 0; j < N; j++) {
            C[i][j] = 0;
            for (int k = 0; k < N; k++) {
                C[i][j] += A[i][k] * B[k][j];
            }
        }
    }
}

int main() {
    int A[N][N] = {{1,2,3},{4,5,6},{7,8,9}};
    int B[N][N] = {{9,8,7},{6,5,4},{3,2,1}};
    int C[N][N];

    multiply(A, B, C);
    return 0;
}
";

    #[test]
    fn test_parse_kernel() {
        let (program, diagnostics) = parse(MULTIPLY);
        assert!(diagnostics.is_empty());

        let functions: Vec<_> = program.functions().collect();
        assert_eq!(functions.len(), 1);

        let kernel = functions[0];
        assert_eq!(kernel.name, "multiply");
        assert_eq!(kernel.line, 4);
        let params: Vec<&str> = kernel.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["A", "B", "C"]);

        assert_eq!(kernel.operations.len(), 1);
        let operands = kernel.operations[0].operands.as_ref().unwrap();
        assert_eq!(operands.left.name, "A");
        assert_eq!(operands.right.name, "B");
        assert_eq!(operands.result.name, "C");
    }

    #[test]
    fn test_preprocessor_markers() {
        let (program, _) = parse(MULTIPLY);
        let markers: Vec<usize> = program
            .items
            .iter()
            .filter_map(|item| match item {
                Item::MemoryOp(op) => Some(op.line),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec![1, 2]);
    }

    #[test]
    fn test_other_functions_are_skipped() {
        let source = "void helper(int A[N]) { for (i) { for (j) { for (k) { C = A * B; } } } }
                      void matmul(float X[4][4], float Y[4][4], float Z[4][4]) { }";
        let (program, _) = parse(source);

        let functions: Vec<_> = program.functions().collect();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "matmul");
        assert_eq!(functions[0].params.len(), 3);
        assert!(functions[0].operations.is_empty());
    }

    #[test]
    fn test_every_typed_parameter_is_declared() {
        let source = "void matrix_multiply(MATRIX P, int n, double Q[n], int a[N][N], const) { }";
        let (program, _) = parse(source);
        let kernel = program.functions().next().unwrap();
        let params: Vec<&str> = kernel.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["P", "n", "Q", "a"]);
    }

    #[test]
    fn test_prototype_before_kernel() {
        let source = format!(
            "#define N 3\nvoid print_matrix(int M[N][N]);\n{}",
            MULTIPLY.split_once("#define N 3").map_or("", |(_, rest)| rest)
        );
        let (program, diagnostics) = parse(&source);
        assert!(diagnostics.is_empty());
        assert_eq!(program.kernel_count(), 1);

        let names: Vec<&str> = program.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["multiply"]);
    }

    #[test]
    fn test_truncated_signature_is_recovered() {
        let (program, diagnostics) = parse("#define N 2\nvoid multiply(int A");
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0], CompileError::UnexpectedEof { line: 2, .. }));
        // The directive before the broken kernel survives
        assert_eq!(program.items.len(), 1);
        assert!(program.functions().next().is_none());
    }

    #[test]
    fn test_missing_body_is_recovered() {
        let (program, diagnostics) = parse("void multiply(int A, int B, int C)");
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0], CompileError::UnexpectedEof { .. }));
        assert!(program.items.is_empty());
    }

    #[test]
    fn test_prototype_is_reported() {
        let source = "void multiply(int A, int B, int C);
                      int main() { return 0; }";
        let (program, diagnostics) = parse(source);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0],
            CompileError::ParseError { ref token, .. } if token == ";"
        ));
        assert!(diagnostics[0].is_recoverable());
        assert!(program.items.is_empty());
    }

    #[test]
    fn test_unclosed_body_keeps_operations() {
        let source = "void multiply(int A, int B, int C) {
            for (i) { for (j) { for (k) { C += A * B; ";
        let (program, diagnostics) = parse(source);
        assert!(diagnostics.is_empty());
        assert_eq!(program.kernel_count(), 1);
    }

    #[test]
    fn test_standalone_multiply() {
        let (program, _) = parse("* A B = C ;  x = y * z ;");
        let ops: Vec<&MatrixOp> = program
            .items
            .iter()
            .filter_map(|item| match item {
                Item::MatrixOp(op) => Some(op),
                _ => None,
            })
            .collect();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].arity(), 3);
        assert_eq!(ops[0].operands.as_ref().unwrap().result.name, "C");
        assert_eq!(ops[1].arity(), 0);
    }

    #[test]
    fn test_multiple_kernels() {
        let source = "
            void multiply(int A[N][N], int B[N][N], int C[N][N]) {
                for (i) { for (j) { for (k) { C[i][j] += A[i][k] * B[k][j]; } } }
            }
            void matmul(int X[N][N], int Y[N][N], int Z[N][N]) {
                for (i) { for (j) { for (k) { Z[i][j] += X[i][k] * Y[k][j]; } } }
            }";
        let (program, _) = parse(source);
        let names: Vec<&str> = program.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["multiply", "matmul"]);
        assert_eq!(program.kernel_count(), 2);
    }
}
