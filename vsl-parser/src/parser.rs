use crate::ast::{Expr, Function, Program, Stmt};
use crate::lexer::{Cursor, Token};
use vsl_source::{CompileError, Source};

mod expr;
mod stmt;

pub type ParseResult<T> = Result<T, CompileError>;

/// Maximum nesting of statements and expressions. Code generation recurses once per level.
pub const MAX_NESTING_DEPTH: usize = 128;

pub struct Parser<'a> {
    /// Cached token for peeking.
    current_token: Token,
    cursor: Cursor<'a>,
    /// Source code
    source: &'a Source<'a>,
    /// Number of statements and primary expressions currently being parsed.
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a Source<'a>) -> Self {
        let mut cursor = Cursor::new(source.content);
        Self {
            current_token: cursor.next_token(),
            cursor,
            source,
            depth: 0,
        }
    }
}

impl<'a> Parser<'a> {
    /// Parses every function definition until the end of input.
    ///
    /// A definition that fails to parse is reported to the [`Source`]'s error reporter
    /// and a single token is skipped before trying the next definition. Badly malformed
    /// input can therefore produce a cascade of errors.
    pub fn parse_program(&mut self) -> Program {
        let mut functions = Vec::new();

        while !self.is_at_end() {
            match self.parse_function() {
                Ok(func) => functions.push(func),
                Err(err) => {
                    self.source.errors.add_error(err);
                    self.next(); // skip token for error recovery
                }
            }
        }

        Program { functions }
    }

    /// Returns `true` if all the input has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.current_token == Token::Eof
    }
}

/// Parse utilities
impl<'a> Parser<'a> {
    fn next(&mut self) -> Token {
        let token = self.cursor.next_token();
        self.current_token = token.clone();
        token
    }

    /// Predicate that tests whether the current token is `tok` and eats it if yes as a side effect.
    fn eat(&mut self, tok: &Token) -> bool {
        if self.current_token == *tok {
            self.next(); // eat token
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, message: &str) -> ParseResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(message))
        }
    }

    /// Eats an identifier and returns its name.
    fn expect_identifier(&mut self, message: &str) -> ParseResult<String> {
        match self.current_token.clone() {
            Token::Identifier(ident) => {
                self.next();
                Ok(ident)
            }
            _ => Err(self.unexpected(message)),
        }
    }

    /// Runs `parse` one nesting level deeper, failing once [`MAX_NESTING_DEPTH`] is reached.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.unexpected("statement or expression is nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Creates an unexpected token error at the current token.
    fn unexpected(&self, message: &str) -> CompileError {
        CompileError::syntax(
            format!("{}, found `{}`", message, self.current_token),
            self.cursor.span(),
        )
    }
}
