use logos::{Lexer, Logos};
use std::fmt;
use std::ops::Range;

#[derive(Debug, Logos, Clone, PartialEq)]
pub enum Token {
    // literals
    #[regex(r"[0-9]+", |lex| parse_integer(lex.slice()))]
    IntegerLit(i32),
    #[regex(r#""([^"\\]|\\(.|\n))*""#, closed_text)]
    #[regex(r#""([^"\\]|\\(.|\n))*"#, open_text)] // runs to end of input
    TextLit(String),

    // identifiers
    #[regex("[a-zA-Z][a-zA-Z0-9]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token(":=")]
    AssignSymbol,

    // keywords
    #[token("FUNC")]
    Func,
    #[token("PRINT")]
    Print,
    #[token("RETURN")]
    Return,
    #[token("CONTINUE")]
    Continue,
    #[token("IF")]
    If,
    #[token("THEN")]
    Then,
    #[token("ELSE")]
    Else,
    #[token("FI")]
    Fi,
    #[token("WHILE")]
    While,
    #[token("DO")]
    Do,
    #[token("DONE")]
    Done,
    #[token("VAR")]
    Var,

    /// Any other single character, e.g. `(`, `+` or `=`.
    #[regex(r"[!#-/:-@\[-\x60{-~]", |lex| lex.slice().chars().next())]
    Punct(char),

    // misc
    #[regex(r"[ \t\n\r\x0B\x0C]+", logos::skip)]
    #[regex(r"//[^\n\r]*", logos::skip)] // single line comments
    #[error]
    Error,

    /// Only generated by [`Cursor`] when the underlying lexer is exhausted.
    Eof,
}

/// Precedence of every binary operator character. Higher binds tighter.
pub const BINOP_PRECEDENCE: [(char, u8); 4] = [('+', 10), ('-', 10), ('*', 40), ('/', 40)];

impl Token {
    /// Returns the precedence of the binary operator or `None` if not a binop token.
    pub fn binop_precedence(&self) -> Option<u8> {
        match self {
            Token::Punct(c) => BINOP_PRECEDENCE
                .iter()
                .find(|(op, _)| op == c)
                .map(|(_, prec)| *prec),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntegerLit(val) => write!(f, "{}", val),
            Token::TextLit(text) => write!(f, "{:?}", text),
            Token::Identifier(ident) => write!(f, "{}", ident),
            Token::AssignSymbol => write!(f, ":="),
            Token::Func => write!(f, "FUNC"),
            Token::Print => write!(f, "PRINT"),
            Token::Return => write!(f, "RETURN"),
            Token::Continue => write!(f, "CONTINUE"),
            Token::If => write!(f, "IF"),
            Token::Then => write!(f, "THEN"),
            Token::Else => write!(f, "ELSE"),
            Token::Fi => write!(f, "FI"),
            Token::While => write!(f, "WHILE"),
            Token::Do => write!(f, "DO"),
            Token::Done => write!(f, "DONE"),
            Token::Var => write!(f, "VAR"),
            Token::Punct(c) => write!(f, "{}", c),
            Token::Error => write!(f, "<error>"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Base 10 digits to `i32`. Overflow wraps.
fn parse_integer(digits: &str) -> i32 {
    digits.bytes().fold(0i32, |acc, digit| {
        acc.wrapping_mul(10).wrapping_add((digit - b'0') as i32)
    })
}

fn closed_text(lex: &mut Lexer<Token>) -> String {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

fn open_text(lex: &mut Lexer<Token>) -> String {
    unescape(&lex.slice()[1..])
}

/// Resolves `\n`, `\t` and `\r`. Any other escaped character keeps its backslash.
fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some(other) => {
                text.push('\\');
                text.push(other);
            }
            None => text.push('\\'),
        }
    }
    text
}

/// A restartable token cursor over a source string.
///
/// The position of the next token lives inside the cursor, so several cursors can lex
/// independent sources at the same time.
pub struct Cursor<'a> {
    lexer: Lexer<'a, Token>,
    finished: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            lexer: Token::lexer(content),
            finished: false,
        }
    }

    /// Lexes the next token. Returns [`Token::Eof`] forever once the input is exhausted.
    pub fn next_token(&mut self) -> Token {
        match self.lexer.next() {
            None => {
                self.finished = true;
                Token::Eof
            }
            // Unclassified input is returned as its own punctuation token.
            Some(Token::Error) => Token::Punct(self.lexer.slice().chars().next().unwrap_or('\0')),
            Some(token) => token,
        }
    }

    /// Span of the last token returned by [`Cursor::next_token`].
    pub fn span(&self) -> Range<usize> {
        if self.finished {
            let end = self.lexer.source().len();
            end..end
        } else {
            self.lexer.span()
        }
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Token;

    /// Yields every token up to, but excluding, [`Token::Eof`].
    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}
