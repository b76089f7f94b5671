use super::*;
use crate::ast::{Declaration, Prototype};

impl<'a> Parser<'a> {
    /// Parses a function definition: `FUNC name(params) statement`.
    /// The body is exactly one statement.
    pub fn parse_function(&mut self) -> ParseResult<Function> {
        self.expect(Token::Func, "expected FUNC")?;
        let proto = self.parse_prototype()?;
        let body = self.parse_stmt()?;
        Ok(Function { proto, body })
    }

    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let ident = self.expect_identifier("expected function name in prototype")?;
        self.expect(Token::Punct('('), "expected '(' in prototype")?;

        let mut params = Vec::new();
        if !self.eat(&Token::Punct(')')) {
            loop {
                params.push(self.expect_identifier("expected parameter name in prototype")?);

                if self.eat(&Token::Punct(')')) {
                    break;
                } else if !self.eat(&Token::Punct(',')) {
                    return Err(self.unexpected("expected ')' or ',' in parameter list"));
                }
            }
        }

        Ok(Prototype { ident, params })
    }

    /// Parses a statement.
    pub fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        self.nested(|parser| match parser.current_token {
            Token::Var => Ok(Stmt::Declaration(parser.parse_declaration()?)),
            Token::If => parser.parse_if_stmt(),
            Token::While => parser.parse_while_stmt(),
            Token::Return => parser.parse_return_stmt(),
            Token::Print => parser.parse_print_stmt(),
            Token::Punct('{') => parser.parse_block_stmt(),
            _ => parser.parse_assign_stmt(),
        })
    }

    /// Parses `VAR name (, name)*`.
    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        self.expect(Token::Var, "expected VAR")?;

        let mut idents = vec![self.expect_identifier("expected identifier after VAR")?];
        while self.eat(&Token::Punct(',')) {
            idents.push(self.expect_identifier("expected identifier list after VAR")?);
        }

        Ok(Declaration(idents))
    }

    /// Parses `{ declaration* statement* }`.
    pub fn parse_block_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Punct('{'), "expected '{'")?;

        let mut declarations = Vec::new();
        while self.current_token == Token::Var {
            declarations.push(self.parse_declaration()?);
        }

        let mut body = Vec::new();
        while !self.eat(&Token::Punct('}')) {
            if self.current_token == Token::Eof {
                return Err(self.unexpected("expected '}' at end of block"));
            }
            body.push(self.parse_stmt()?);
        }

        Ok(Stmt::Block { declarations, body })
    }

    /// Parses `IF expr THEN stmt [ELSE stmt] FI`.
    fn parse_if_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::If, "expected IF")?;
        let condition = self.parse_expr()?;
        self.expect(Token::Then, "expected THEN")?;
        let then_branch = Box::new(self.parse_stmt()?);

        let else_branch = if self.eat(&Token::Else) {
            let else_branch = self.parse_stmt()?;
            // The closing token is not checked after an ELSE branch.
            self.next();
            Some(Box::new(else_branch))
        } else {
            self.expect(Token::Fi, "expected FI or ELSE")?;
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// Parses `WHILE expr DO stmt DONE`.
    fn parse_while_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::While, "expected WHILE")?;
        let condition = self.parse_expr()?;
        self.expect(Token::Do, "expected DO in WHILE statement")?;
        let body = Box::new(self.parse_stmt()?);
        self.expect(Token::Done, "expected DONE in WHILE statement")?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_return_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Return, "expected RETURN")?;
        let expr = self.parse_expr()?;
        Ok(Stmt::Return(expr))
    }

    /// Parses `PRINT item (, item)*` where an item is a text literal or a variable.
    /// Every variable adds a ` %d ` placeholder to the format text.
    fn parse_print_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Print, "expected PRINT")?;

        let mut format = String::new();
        let mut args = Vec::new();
        loop {
            match self.current_token.clone() {
                Token::TextLit(text) => format.push_str(&text),
                Token::Identifier(ident) => {
                    format.push_str(" %d ");
                    args.push(Expr::Identifier(ident));
                }
                _ => return Err(self.unexpected("expected text or variable in PRINT")),
            }
            self.next();

            if !self.eat(&Token::Punct(',')) {
                break;
            }
        }

        Ok(Stmt::Print { format, args })
    }

    /// Parses `name = expr`.
    fn parse_assign_stmt(&mut self) -> ParseResult<Stmt> {
        let target = self.expect_identifier("expected identifier at start of statement")?;

        if self.current_token == Token::AssignSymbol {
            return Err(self.unexpected("use '=' for assignment, ':=' is not an assignment operator"));
        }
        self.expect(Token::Punct('='), "expected '=' in assignment")?;

        let value = self.parse_expr()?;
        Ok(Stmt::Assign { target, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use insta::assert_debug_snapshot;

    fn stmt(source: &str) -> Stmt {
        let source = source.into();
        let ast = Parser::new(&source).parse_stmt();
        assert!(source.has_no_errors());
        ast.unwrap()
    }

    fn stmt_error(source: &str) -> CompileError {
        let source = source.into();
        let err = Parser::new(&source).parse_stmt().unwrap_err();
        err
    }

    fn func(source: &str) -> Function {
        let source = source.into();
        let ast = Parser::new(&source).parse_function();
        assert!(source.has_no_errors());
        ast.unwrap()
    }

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    #[test]
    fn test_declaration() {
        assert_eq!(
            stmt("VAR a, b, c"),
            Stmt::Declaration(Declaration(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string()
            ]))
        );
        assert_eq!(
            stmt_error("VAR 1").message,
            "expected identifier after VAR, found `1`"
        );
        assert_eq!(
            stmt_error("VAR a,").message,
            "expected identifier list after VAR, found `end of input`"
        );
    }

    #[test]
    fn test_comment_between_declarations() {
        let source = "VAR x // comment\n VAR y".into();
        let mut parser = Parser::new(&source);
        let first = parser.parse_stmt().unwrap();
        let second = parser.parse_stmt().unwrap();
        assert!(source.has_no_errors());
        assert!(parser.is_at_end());

        assert_eq!(first, Stmt::Declaration(Declaration(vec!["x".to_string()])));
        assert_eq!(second, Stmt::Declaration(Declaration(vec!["y".to_string()])));
    }

    #[test]
    fn test_if_stmt() {
        assert_debug_snapshot!(stmt("IF x THEN RETURN 1 FI"), @r###"
        If {
            condition: Identifier(
                "x",
            ),
            then_branch: Return(
                NumberLit(
                    1,
                ),
            ),
            else_branch: None,
        }
        "###);
        assert_eq!(
            stmt("IF x THEN a = 1 ELSE a = 2 FI"),
            Stmt::If {
                condition: ident("x"),
                then_branch: Box::new(Stmt::Assign {
                    target: "a".to_string(),
                    value: Expr::NumberLit(1),
                }),
                else_branch: Some(Box::new(Stmt::Assign {
                    target: "a".to_string(),
                    value: Expr::NumberLit(2),
                })),
            }
        );
        assert_eq!(
            stmt_error("IF x THEN a = 1 DONE").message,
            "expected FI or ELSE, found `DONE`"
        );
    }

    #[test]
    fn test_if_else_eats_any_closing_token() {
        let source = "IF x THEN a = 1 ELSE a = 2 DONE VAR z".into();
        let mut parser = Parser::new(&source);
        assert!(parser.parse_stmt().is_ok());
        assert_eq!(
            parser.parse_stmt().unwrap(),
            Stmt::Declaration(Declaration(vec!["z".to_string()]))
        );
    }

    #[test]
    fn test_while_stmt() {
        assert_eq!(
            stmt("WHILE n DO n = n - 1 DONE"),
            Stmt::While {
                condition: ident("n"),
                body: Box::new(Stmt::Assign {
                    target: "n".to_string(),
                    value: Expr::Binary {
                        lhs: Box::new(ident("n")),
                        op: BinOp::Sub,
                        rhs: Box::new(Expr::NumberLit(1)),
                    },
                }),
            }
        );
        assert_eq!(
            stmt_error("WHILE n DO n = 1").message,
            "expected DONE in WHILE statement, found `end of input`"
        );
    }

    #[test]
    fn test_print_stmt() {
        assert_eq!(
            stmt(r#"PRINT "x=", x"#),
            Stmt::Print {
                format: "x= %d ".to_string(),
                args: vec![ident("x")],
            }
        );
        assert_eq!(
            stmt(r#"PRINT a, " and ", b, "\n""#),
            Stmt::Print {
                format: " %d  and  %d \n".to_string(),
                args: vec![ident("a"), ident("b")],
            }
        );
        assert_eq!(
            stmt_error("PRINT x,").message,
            "expected text or variable in PRINT, found `end of input`"
        );
    }

    #[test]
    fn test_assign_stmt() {
        assert_eq!(
            stmt("x = 1 + 2"),
            Stmt::Assign {
                target: "x".to_string(),
                value: Expr::Binary {
                    lhs: Box::new(Expr::NumberLit(1)),
                    op: BinOp::Add,
                    rhs: Box::new(Expr::NumberLit(2)),
                },
            }
        );
        let err = stmt_error("x := 1");
        assert_eq!(err.kind, vsl_source::ErrorKind::Syntax);
        assert_eq!(
            err.message,
            "use '=' for assignment, ':=' is not an assignment operator, found `:=`"
        );
        assert_eq!(
            stmt_error("CONTINUE").message,
            "expected identifier at start of statement, found `CONTINUE`"
        );
    }

    #[test]
    fn test_block_stmt() {
        assert_debug_snapshot!(stmt("{ VAR a VAR b a = 1 RETURN a }"), @r###"
        Block {
            declarations: [
                Declaration(
                    [
                        "a",
                    ],
                ),
                Declaration(
                    [
                        "b",
                    ],
                ),
            ],
            body: [
                Assign {
                    target: "a",
                    value: NumberLit(
                        1,
                    ),
                },
                Return(
                    Identifier(
                        "a",
                    ),
                ),
            ],
        }
        "###);
        assert_eq!(
            stmt_error("{ VAR a").message,
            "expected '}' at end of block, found `end of input`"
        );
    }

    #[test]
    fn test_function() {
        let add = func("FUNC add(a, b) RETURN a + b");
        assert_eq!(add.proto.ident, "add");
        assert_eq!(add.proto.params, vec!["a", "b"]);
        assert_eq!(
            add.body,
            Stmt::Return(Expr::Binary {
                lhs: Box::new(ident("a")),
                op: BinOp::Add,
                rhs: Box::new(ident("b")),
            })
        );

        let main = func("FUNC main() RETURN 0");
        assert!(main.proto.params.is_empty());
    }

    #[test]
    fn test_prototype_errors() {
        let source = "FUNC f(a b) RETURN 0".into();
        let err = Parser::new(&source).parse_function().unwrap_err();
        assert_eq!(err.message, "expected ')' or ',' in parameter list, found `b`");

        let source = "FUNC (a) RETURN 0".into();
        let err = Parser::new(&source).parse_function().unwrap_err();
        assert_eq!(err.message, "expected function name in prototype, found `(`");
    }

    #[test]
    fn test_nested_statements_limit() {
        let nested = |levels: usize| {
            format!(
                "{}x = 1{}",
                "WHILE x DO ".repeat(levels),
                " DONE".repeat(levels)
            )
        };
        assert!(matches!(stmt(&nested(100)), Stmt::While { .. }));

        let err = stmt_error(&nested(500));
        assert_eq!(err.kind, vsl_source::ErrorKind::Syntax);
        assert_eq!(
            err.message,
            "statement or expression is nested too deeply, found `WHILE`"
        );
    }
}
