//! AST node definitions. The tree is strictly owned: every node owns its children.

use std::convert::TryFrom;
use std::fmt;

use vsl_source::{CompileError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn as_char(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

impl TryFrom<char> for BinOp {
    type Error = CompileError;

    fn try_from(c: char) -> Result<Self, CompileError> {
        match c {
            '+' => Ok(BinOp::Add),
            '-' => Ok(BinOp::Sub),
            '*' => Ok(BinOp::Mul),
            '/' => Ok(BinOp::Div),
            _ => Err(CompileError::new(
                ErrorKind::InvalidOperator,
                format!("invalid binary operator `{}`", c),
            )),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NumberLit(i32),
    /// A variable read (e.g. `foo`).
    Identifier(String),
    /// Unary minus applied to a primary expression (e.g. `-x`).
    Negate(Box<Expr>),
    /// A binary expression (e.g. `1+1`).
    Binary {
        lhs: Box<Expr>,
        op: BinOp,
        rhs: Box<Expr>,
    },
    /// A function call (e.g. `foo(1, x)`).
    FnCall { ident: String, args: Vec<Expr> },
}

impl Expr {
    /// Height of the expression tree. Literals and identifiers have a depth of 1.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            match expr {
                Expr::NumberLit(_) | Expr::Identifier(_) => {}
                Expr::Negate(operand) => stack.push((operand.as_ref(), depth + 1)),
                Expr::Binary { lhs, rhs, .. } => {
                    stack.push((lhs.as_ref(), depth + 1));
                    stack.push((rhs.as_ref(), depth + 1));
                }
                Expr::FnCall { args, .. } => stack.extend(args.iter().map(|arg| (arg, depth + 1))),
            }
        }
        max
    }
}

/// `VAR a, b, c`. Every name gets zero-initialized storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration(pub Vec<String>);

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declaration(Declaration),
    Block {
        declarations: Vec<Declaration>,
        body: Vec<Stmt>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return(Expr),
    /// `format` holds the literal text with a ` %d ` placeholder for every argument.
    Print { format: String, args: Vec<Expr> },
    Assign { target: String, value: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub ident: String,
    pub params: Vec<String>,
}

impl Prototype {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
}
