use super::*;
use crate::ast::BinOp;
use std::convert::TryFrom;

impl<'a> Parser<'a> {
    /* Expressions */
    /// Parses any expression.
    /// This is equivalent to calling [`Self::parse_bin_op_rhs`] with `expr_prec = 0` on a primary expression.
    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary_expr()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// Parses a primary (atom) expression.
    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        // NOTE: prefix operators are handled here
        self.nested(|parser| match parser.current_token {
            Token::IntegerLit(val) => {
                parser.next();
                Ok(Expr::NumberLit(val))
            }
            Token::Identifier(_) => parser.parse_identifier_or_call_expr(),
            Token::Punct('(') => parser.parse_paren_expr(),
            Token::Punct('-') => {
                parser.next();
                // binds to the next primary only: `-a * b` is `(-a) * b`
                let operand = parser.parse_primary_expr()?;
                Ok(Expr::Negate(Box::new(operand)))
            }
            _ => Err(parser.unexpected("unknown token when expecting an expression")),
        })
    }

    /// Folds binary operators with a precedence of at least `expr_prec` into `lhs`.
    ///
    /// Operators of equal precedence associate to the left. When the operator after the
    /// right hand side binds tighter, the right hand side is parsed recursively first.
    /// Any other token ends the expression, including the `}` closing a block.
    fn parse_bin_op_rhs(&mut self, expr_prec: u8, mut lhs: Expr) -> ParseResult<Expr> {
        let mut depth = lhs.depth();
        loop {
            let tok_prec = match self.current_token.binop_precedence() {
                Some(prec) if prec >= expr_prec => prec,
                _ => return Ok(lhs), // not a binop or binds too loosely, stop parsing
            };

            // self.current_token is a valid binop
            let op = match self.current_token {
                Token::Punct(c) => BinOp::try_from(c)?,
                _ => unreachable!("binop precedence is only defined for punctuation"),
            };
            self.next();

            let mut rhs = self.parse_primary_expr()?;

            if let Some(next_prec) = self.current_token.binop_precedence() {
                if tok_prec < next_prec {
                    rhs = self.parse_bin_op_rhs(tok_prec + 1, rhs)?;
                }
            }

            // left associative chains grow without recursing, so their depth is checked here
            depth = 1 + depth.max(rhs.depth());
            if self.depth + depth > MAX_NESTING_DEPTH {
                return Err(self.unexpected("expression is nested too deeply"));
            }

            lhs = Expr::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        self.expect(Token::Punct('('), "expected '('")?;
        let expr = self.parse_expr()?;
        self.expect(Token::Punct(')'), "expected ')'")?;
        Ok(expr)
    }

    /* Expressions.Identifier */
    /// Parses an identifier or a call expression.
    fn parse_identifier_or_call_expr(&mut self) -> ParseResult<Expr> {
        let ident = self.expect_identifier("expected identifier")?;

        if self.eat(&Token::Punct('(')) {
            // parse call expression
            let mut args = Vec::new();

            if !self.eat(&Token::Punct(')')) {
                loop {
                    args.push(self.parse_expr()?);

                    if self.eat(&Token::Punct(')')) {
                        break;
                    } else if !self.eat(&Token::Punct(',')) {
                        return Err(self.unexpected("expected ')' or ',' in argument list"));
                    }
                }
            }

            Ok(Expr::FnCall { ident, args })
        } else {
            // parse identifier expression
            Ok(Expr::Identifier(ident))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_debug_snapshot;

    fn expr(source: &str) -> Expr {
        let source = source.into();
        let ast = Parser::new(&source).parse_expr();
        assert!(source.has_no_errors());
        ast.unwrap()
    }

    fn expr_error(source: &str) -> CompileError {
        let source = source.into();
        let err = Parser::new(&source).parse_expr().unwrap_err();
        err
    }

    #[test]
    fn test_literal() {
        assert_eq!(expr("1"), Expr::NumberLit(1));
        assert_eq!(expr("(42)"), Expr::NumberLit(42));
    }

    #[test]
    fn test_binary_expr() {
        assert_debug_snapshot!(expr("2 + 3 * 4"), @r###"
        Binary {
            lhs: NumberLit(
                2,
            ),
            op: Add,
            rhs: Binary {
                lhs: NumberLit(
                    3,
                ),
                op: Mul,
                rhs: NumberLit(
                    4,
                ),
            },
        }
        "###);
        // should be (10 - 2) - 3
        assert_debug_snapshot!(expr("10 - 2 - 3"), @r###"
        Binary {
            lhs: Binary {
                lhs: NumberLit(
                    10,
                ),
                op: Sub,
                rhs: NumberLit(
                    2,
                ),
            },
            op: Sub,
            rhs: NumberLit(
                3,
            ),
        }
        "###);
    }

    #[test]
    fn test_precedence_mix() {
        let num = |val| Box::new(Expr::NumberLit(val));
        // 1 * 2 + 3 / 4 - 5 => ((1 * 2) + (3 / 4)) - 5
        assert_eq!(
            expr("1 * 2 + 3 / 4 - 5"),
            Expr::Binary {
                lhs: Box::new(Expr::Binary {
                    lhs: Box::new(Expr::Binary {
                        lhs: num(1),
                        op: BinOp::Mul,
                        rhs: num(2),
                    }),
                    op: BinOp::Add,
                    rhs: Box::new(Expr::Binary {
                        lhs: num(3),
                        op: BinOp::Div,
                        rhs: num(4),
                    }),
                }),
                op: BinOp::Sub,
                rhs: num(5),
            }
        );
        // 8 / 4 / 2 => (8 / 4) / 2
        assert_eq!(
            expr("8 / 4 / 2"),
            Expr::Binary {
                lhs: Box::new(Expr::Binary {
                    lhs: num(8),
                    op: BinOp::Div,
                    rhs: num(4),
                }),
                op: BinOp::Div,
                rhs: num(2),
            }
        );
    }

    #[test]
    fn test_negate() {
        assert_debug_snapshot!(expr("-a * 2"), @r###"
        Binary {
            lhs: Negate(
                Identifier(
                    "a",
                ),
            ),
            op: Mul,
            rhs: NumberLit(
                2,
            ),
        }
        "###);
        assert_eq!(
            expr("--1"),
            Expr::Negate(Box::new(Expr::Negate(Box::new(Expr::NumberLit(1)))))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1", "-".repeat(MAX_NESTING_DEPTH - 1));
        assert_eq!(expr(&deep).depth(), MAX_NESTING_DEPTH);

        let err = expr_error(&format!("{}1", "-".repeat(1000)));
        assert_eq!(err.kind, vsl_source::ErrorKind::Syntax);
        assert!(err.message.starts_with("statement or expression is nested too deeply"));

        let err = expr_error(&format!("{}1{}", "(".repeat(1000), ")".repeat(1000)));
        assert_eq!(err.kind, vsl_source::ErrorKind::Syntax);
    }

    #[test]
    fn test_long_chain_limit() {
        let chain = |terms: usize| vec!["1"; terms].join(" + ");
        assert_eq!(expr(&chain(100)).depth(), 100);

        let err = expr_error(&chain(1000));
        assert_eq!(err.message, "expression is nested too deeply, found `+`");
    }

    #[test]
    fn test_depth() {
        assert_eq!(expr("1").depth(), 1);
        assert_eq!(expr("-(1 + 2) * f(a, 3 - b)").depth(), 4);
    }

    #[test]
    fn test_closing_brace_terminates() {
        assert_eq!(expr("x }"), Expr::Identifier("x".to_string()));
    }

    #[test]
    fn test_fn_call() {
        assert_eq!(
            expr("foo()"),
            Expr::FnCall {
                ident: "foo".to_string(),
                args: vec![],
            }
        );
        assert_debug_snapshot!(expr("foo(1, bar, baz())"), @r###"
        FnCall {
            ident: "foo",
            args: [
                NumberLit(
                    1,
                ),
                Identifier(
                    "bar",
                ),
                FnCall {
                    ident: "baz",
                    args: [],
                },
            ],
        }
        "###);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            expr_error("foo(1 2)").message,
            "expected ')' or ',' in argument list, found `2`"
        );
        assert_eq!(expr_error("(1").message, "expected ')', found `end of input`");
        assert_eq!(
            expr_error("1 + THEN").message,
            "unknown token when expecting an expression, found `THEN`"
        );
    }
}
