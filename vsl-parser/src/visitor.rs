//! Visitor pattern for AST nodes.

use crate::ast::{Expr, Function, Program, Stmt};

pub trait Visitor<'ast>: Sized {
    fn visit_program(&mut self, program: &'ast Program) {
        walk_program(self, program);
    }
    fn visit_function(&mut self, func: &'ast Function) {
        walk_function(self, func);
    }
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }
    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<'ast>(visitor: &mut impl Visitor<'ast>, program: &'ast Program) {
    for func in &program.functions {
        visitor.visit_function(func);
    }
}

pub fn walk_function<'ast>(visitor: &mut impl Visitor<'ast>, func: &'ast Function) {
    visitor.visit_stmt(&func.body);
}

pub fn walk_expr<'ast>(visitor: &mut impl Visitor<'ast>, expr: &'ast Expr) {
    match expr {
        Expr::NumberLit(_) => {}
        Expr::Identifier(_) => {}
        Expr::Negate(operand) => visitor.visit_expr(operand),
        Expr::Binary { lhs, op: _, rhs } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::FnCall { ident: _, args } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
    }
}

pub fn walk_stmt<'ast>(visitor: &mut impl Visitor<'ast>, stmt: &'ast Stmt) {
    match stmt {
        Stmt::Declaration(_) => {}
        Stmt::Block {
            declarations: _,
            body,
        } => {
            for stmt in body {
                visitor.visit_stmt(stmt);
            }
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        Stmt::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        Stmt::Return(expr) => visitor.visit_expr(expr),
        Stmt::Print { format: _, args } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Stmt::Assign { target: _, value } => visitor.visit_expr(value),
    }
}
