//! Tokenizer for C-style kernel sources using logos
//!
//! logos splits the raw text into lexemes. The [`Tokenizer`] wrapper adds the
//! stateful parts on top:
//! - line tracking, so every token knows where it started
//! - `#define` handling, which folds dimension constants into one inferred size
//! - array subscripts, which are skipped wholesale (`A[i][k]` lexes as just `A`)

use logos::Logos;

/// `#define` names whose values contribute to the inferred matrix dimension
pub const DIMENSION_CONSTANTS: [&str; 5] = ["N", "SIZE", "ROWS", "COLS", "INNER"];

/// Identifiers treated as matrix element types
pub const ELEMENT_TYPES: [&str; 4] = ["int", "float", "double", "MATRIX"];

/// Raw lexemes recognised by logos
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\x0B\x0C]+")]
enum Lexeme {
    #[token("\n")]
    Newline,

    #[token("#")]
    Hash,

    #[token("[")]
    OpenSubscript,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Word,

    #[regex(r"[0-9]+")]
    Digits,

    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("=")]
    Operator,

    #[regex(r"[^ \t\r\n\x0B\x0CA-Za-z0-9_]", priority = 1)]
    Symbol,
}

/// Token classes seen by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `int`, `float`, `double`, `MATRIX`
    ElementType,
    Identifier,
    /// A single uppercase letter, e.g. `A`
    MatrixName,
    Number,
    /// One of `+ - * / =`
    Operator,
    Symbol,
    Preprocessor,
    Eof,
}

impl TokenKind {
    /// Classify an identifier run
    pub fn classify_word(word: &str) -> Self {
        let mut chars = word.chars();
        let single_upper =
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase());
        if ELEMENT_TYPES.contains(&word) {
            TokenKind::ElementType
        } else if single_upper {
            TokenKind::MatrixName
        } else {
            TokenKind::Identifier
        }
    }
}

/// A token with its source line (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }

    pub fn is_matrix_name(&self) -> bool {
        self.kind == TokenKind::MatrixName
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "<eof>"),
            _ => write!(f, "{}", self.text),
        }
    }
}

/// Output of the tokenizer
#[derive(Debug, Clone, PartialEq)]
pub struct Tokenized {
    /// Always terminated by a [`TokenKind::Eof`] token
    pub tokens: Vec<Token>,
    /// Largest value bound to any of [`DIMENSION_CONSTANTS`], 0 if none
    pub dimension: u64,
}

/// Stateful tokenizer over a single source file
pub struct Tokenizer<'source> {
    inner: logos::Lexer<'source, Lexeme>,
    line: usize,
    dimension: u64,
}

impl<'source> Tokenizer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Lexeme::lexer(source),
            line: 1,
            dimension: 0,
        }
    }

    /// Tokenize the whole source
    pub fn tokenize(mut self) -> Tokenized {
        let mut tokens = Vec::new();

        while let Some(lexeme) = self.inner.next() {
            let text = self.inner.slice();
            match lexeme {
                Ok(Lexeme::Newline) => self.line += 1,
                Ok(Lexeme::Hash) => {
                    tokens.push(Token::new(TokenKind::Preprocessor, "#", self.line));
                    self.directive();
                }
                Ok(Lexeme::OpenSubscript) => self.skip_subscript(),
                Ok(Lexeme::Word) => {
                    tokens.push(Token::new(TokenKind::classify_word(text), text, self.line));
                }
                Ok(Lexeme::Digits) => tokens.push(Token::new(TokenKind::Number, text, self.line)),
                Ok(Lexeme::Operator) => {
                    tokens.push(Token::new(TokenKind::Operator, text, self.line));
                }
                // Anything logos cannot place is still just a symbol
                Ok(Lexeme::Symbol) | Err(()) => {
                    tokens.push(Token::new(TokenKind::Symbol, text, self.line));
                }
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line));
        log::debug!(
            "Tokenized {} tokens over {} lines, inferred dimension {}",
            tokens.len(),
            self.line,
            self.dimension
        );

        Tokenized {
            tokens,
            dimension: self.dimension,
        }
    }

    /// Consume the directive word after `#`, handling `#define`
    fn directive(&mut self) {
        let rest = self.inner.remainder();
        let word_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();

        let consumed = if &rest[..word_len] == "define" {
            word_len + self.define(&rest[word_len..])
        } else {
            word_len
        };

        self.inner.bump(consumed);
    }

    /// Scan a `#define` body, returning the number of bytes consumed
    fn define(&mut self, rest: &str) -> usize {
        let bytes = rest.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            self.count_newline(bytes[pos]);
            pos += 1;
        }

        let name_start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
            pos += 1;
        }
        let name = &rest[name_start..pos];

        if !DIMENSION_CONSTANTS.contains(&name) {
            return pos;
        }

        while pos < bytes.len() && !bytes[pos].is_ascii_digit() {
            self.count_newline(bytes[pos]);
            pos += 1;
        }

        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }

        if pos > digits_start {
            // Oversized literals saturate; allocation rejects them later
            let value = rest[digits_start..pos].parse::<u64>().unwrap_or(u64::MAX);
            log::trace!("#define {} = {}", name, value);
            self.dimension = self.dimension.max(value);
        }

        pos
    }

    /// Drop everything up to and including the `]` matching an already consumed `[`
    fn skip_subscript(&mut self) {
        let rest = self.inner.remainder();
        let mut depth = 1usize;

        for (offset, byte) in rest.bytes().enumerate() {
            match byte {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.inner.bump(offset + 1);
                        return;
                    }
                }
                _ => self.count_newline(byte),
            }
        }

        self.inner.bump(rest.len());
    }

    fn count_newline(&mut self, byte: u8) {
        if byte == b'\n' {
            self.line += 1;
        }
    }
}

/// Tokenize a source string
pub fn tokenize(source: &str) -> Tokenized {
    Tokenizer::new(source).tokenize()
}
