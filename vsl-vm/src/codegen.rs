//! Lowers the AST into IR through a [`Backend`].

use std::collections::HashMap;

use vsl_ir::{Backend, BinaryOp, BlockId, FunctionId, Operand, PRINTF};
use vsl_parser::ast::{BinOp, Declaration, Expr, Function, Stmt};
use vsl_passes::registry::FunctionRegistry;
use vsl_source::{CompileError, ErrorKind};

const DUMP_IR: bool = false;

pub type CodegenResult<T> = Result<T, CompileError>;

/// Generate IR from an abstract syntax tree.
pub struct Codegen<'a, B: Backend> {
    backend: &'a mut B,
    registry: &'a FunctionRegistry,
    /// Stack slot of every variable in the current function. Flat: a declaration in a
    /// nested block stays visible until the end of the function.
    named_values: HashMap<String, Operand>,
    /// The function being generated.
    current: Option<FunctionId>,
}

impl<'a, B: Backend> Codegen<'a, B> {
    pub fn new(backend: &'a mut B, registry: &'a FunctionRegistry) -> Self {
        Self {
            backend,
            registry,
            named_values: HashMap::new(),
            current: None,
        }
    }

    /// Generates the body of `func`.
    ///
    /// On failure the partially generated body is removed, leaving at most a declaration
    /// in the module.
    pub fn codegen_function(&mut self, func: &Function) -> CodegenResult<FunctionId> {
        let proto = &func.proto;
        if proto.ident == PRINTF {
            return Err(CompileError::new(
                ErrorKind::Redefinition,
                format!("function cannot be redefined: `{}` is reserved for PRINT", PRINTF),
            ));
        }
        let id = match self.backend.get_function(&proto.ident) {
            Some(id) if self.backend.has_body(id) => {
                return Err(CompileError::new(
                    ErrorKind::Redefinition,
                    format!("function cannot be redefined: `{}`", proto.ident),
                ));
            }
            Some(id) if self.backend.arity(id) != proto.arity() => {
                return Err(CompileError::new(
                    ErrorKind::PrototypeMismatch,
                    format!(
                        "function `{}` was declared with {} parameters, defined with {}",
                        proto.ident,
                        self.backend.arity(id),
                        proto.arity()
                    ),
                ));
            }
            Some(id) => id,
            None => self.backend.declare_function(&proto.ident, &proto.params),
        };

        self.current = Some(id);
        let result = self.codegen_body(id, func);
        self.current = None;

        if let Err(err) = result {
            self.backend.discard_body(id);
            return Err(err);
        }

        if DUMP_IR {
            eprintln!("{}", self.backend.dump_function(id));
        }
        Ok(id)
    }

    fn codegen_body(&mut self, id: FunctionId, func: &Function) -> CodegenResult<()> {
        let entry = self.backend.append_block(id, "entry");
        self.backend.position_at_end(id, entry);

        self.named_values.clear();
        for (index, param) in func.proto.params.iter().enumerate() {
            let slot = self.backend.build_alloca(param)?;
            let value = self.backend.param(index);
            self.backend.build_store(value, slot)?;
            self.named_values.insert(param.clone(), slot);
        }

        self.codegen_stmt(&func.body)?;

        if !self.backend.is_terminated() {
            let zero = self.backend.const_int(0);
            self.backend.build_ret(zero)?;
        }

        self.backend.verify_function(id)?;
        Ok(())
    }

    fn current_function(&self) -> CodegenResult<FunctionId> {
        self.current.ok_or_else(|| {
            CompileError::new(ErrorKind::Backend, "statement generated outside of a function")
        })
    }

    /// Code after a `RETURN` goes into a fresh, unreachable block.
    fn reopen_if_terminated(&mut self) -> CodegenResult<()> {
        if self.backend.is_terminated() {
            let func = self.current_function()?;
            let block = self.backend.append_block(func, "afterReturn");
            self.backend.position_at_end(func, block);
        }
        Ok(())
    }

    fn lookup_variable(&self, ident: &str) -> CodegenResult<Operand> {
        self.named_values.get(ident).copied().ok_or_else(|| {
            CompileError::new(
                ErrorKind::UnknownVariable,
                format!("unknown variable name `{}`", ident),
            )
        })
    }

    fn codegen_declaration(&mut self, declaration: &Declaration) -> CodegenResult<()> {
        self.reopen_if_terminated()?;
        for ident in &declaration.0 {
            let slot = self.backend.build_alloca(ident)?;
            let zero = self.backend.const_int(0);
            self.backend.build_store(zero, slot)?;
            self.named_values.insert(ident.clone(), slot);
        }
        Ok(())
    }

    /// Branches to `target` unless the current block already returned.
    fn branch_to(&mut self, target: BlockId) -> CodegenResult<()> {
        if !self.backend.is_terminated() {
            self.backend.build_br(target)?;
        }
        Ok(())
    }

    /// Evaluates `condition` and compares it against zero.
    fn codegen_condition(&mut self, condition: &Expr) -> CodegenResult<Operand> {
        let value = self.codegen_expr(condition)?;
        let zero = self.backend.const_int(0);
        Ok(self.backend.build_icmp_ne(value, zero)?)
    }

    pub fn codegen_stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        self.reopen_if_terminated()?;

        match stmt {
            Stmt::Declaration(declaration) => self.codegen_declaration(declaration)?,
            Stmt::Block { declarations, body } => {
                for declaration in declarations {
                    self.codegen_declaration(declaration)?;
                }
                for stmt in body {
                    self.codegen_stmt(stmt)?;
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let func = self.current_function()?;
                let cond = self.codegen_condition(condition)?;

                let then_block = self.backend.append_block(func, "then");
                let else_block = match else_branch {
                    Some(_) => Some(self.backend.append_block(func, "else")),
                    None => None,
                };
                let merge_block = self.backend.append_block(func, "ifcont");
                self.backend
                    .build_cond_br(cond, then_block, else_block.unwrap_or(merge_block))?;

                self.backend.position_at_end(func, then_block);
                self.codegen_stmt(then_branch)?;
                self.branch_to(merge_block)?;

                if let (Some(else_block), Some(else_branch)) = (else_block, else_branch) {
                    self.backend.position_at_end(func, else_block);
                    self.codegen_stmt(else_branch)?;
                    self.branch_to(merge_block)?;
                }

                self.backend.position_at_end(func, merge_block);
            }
            Stmt::While { condition, body } => {
                let func = self.current_function()?;
                let cond = self.codegen_condition(condition)?;

                let loop_block = self.backend.append_block(func, "loop");
                let after_block = self.backend.append_block(func, "afterLoop");
                self.backend.build_cond_br(cond, loop_block, after_block)?;

                self.backend.position_at_end(func, loop_block);
                self.codegen_stmt(body)?;
                self.reopen_if_terminated()?;
                // The condition is tested again at the end of every iteration.
                let cond = self.codegen_condition(condition)?;
                self.backend.build_cond_br(cond, loop_block, after_block)?;

                self.backend.position_at_end(func, after_block);
            }
            Stmt::Return(expr) => {
                let value = self.codegen_expr(expr)?;
                self.backend.build_ret(value)?;
            }
            Stmt::Print { format, args } => {
                let printf = self.backend.printf();
                let mut values = vec![self.backend.global_string(format)];
                for arg in args {
                    values.push(self.codegen_expr(arg)?);
                }
                self.backend.build_call(printf, values)?;
            }
            Stmt::Assign { target, value } => {
                let slot = self.lookup_variable(target)?;
                let value = self.codegen_expr(value)?;
                self.backend.build_store(value, slot)?;
            }
        }

        Ok(())
    }

    /// Finds `ident` in the module, declaring it from its registered prototype if needed.
    fn get_function(&mut self, ident: &str) -> CodegenResult<FunctionId> {
        let unknown = || {
            CompileError::new(
                ErrorKind::UnknownFunction,
                format!("unknown function referenced `{}`", ident),
            )
        };
        if ident == PRINTF {
            return Err(unknown());
        }
        if let Some(id) = self.backend.get_function(ident) {
            return Ok(id);
        }
        match self.registry.get(ident) {
            Some(proto) => Ok(self.backend.declare_function(&proto.ident, &proto.params)),
            None => Err(unknown()),
        }
    }

    pub fn codegen_expr(&mut self, expr: &Expr) -> CodegenResult<Operand> {
        match expr {
            Expr::NumberLit(value) => Ok(self.backend.const_int(*value)),
            Expr::Identifier(ident) => {
                let slot = self.lookup_variable(ident)?;
                Ok(self.backend.build_load(slot)?)
            }
            Expr::Negate(operand) => {
                let operand = self.codegen_expr(operand)?;
                Ok(self.backend.build_neg(operand)?)
            }
            Expr::Binary { lhs, op, rhs } => {
                let lhs = self.codegen_expr(lhs)?;
                let rhs = self.codegen_expr(rhs)?;
                let op = match op {
                    BinOp::Add => BinaryOp::Add,
                    BinOp::Sub => BinaryOp::Sub,
                    BinOp::Mul => BinaryOp::Mul,
                    BinOp::Div => BinaryOp::SDiv,
                };
                Ok(self.backend.build_binary(op, lhs, rhs)?)
            }
            Expr::FnCall { ident, args } => {
                let callee = self.get_function(ident)?;
                let arity = self.backend.arity(callee);
                if arity != args.len() {
                    return Err(CompileError::new(
                        ErrorKind::ArityMismatch,
                        format!(
                            "incorrect number of arguments passed to `{}`: expected {}, found {}",
                            ident,
                            arity,
                            args.len()
                        ),
                    ));
                }

                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.codegen_expr(arg)?);
                }
                Ok(self.backend.build_call(callee, values)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsl_ir::{Builder, Instr, Module};
    use vsl_parser::parser::Parser;

    /// Generates every function of `source`, collecting the errors.
    fn codegen(source: &str) -> (Module, Vec<CompileError>) {
        let source = source.into();
        let program = Parser::new(&source).parse_program();
        assert!(source.has_no_errors(), "{}", source.errors);

        let registry = FunctionRegistry::collect(&program);
        let mut builder = Builder::new("test");
        let mut errors = Vec::new();
        {
            let mut codegen = Codegen::new(&mut builder, &registry);
            for func in &program.functions {
                if let Err(err) = codegen.codegen_function(func) {
                    errors.push(err);
                }
            }
        }
        (builder.into_module(), errors)
    }

    fn error_kinds(source: &str) -> Vec<ErrorKind> {
        codegen(source).1.into_iter().map(|err| err.kind).collect()
    }

    fn instrs(module: &Module, name: &str) -> Vec<Instr> {
        let id = module.get_function(name).unwrap();
        module
            .function(id)
            .blocks
            .iter()
            .flat_map(|block| block.instrs.iter().cloned())
            .collect()
    }

    fn count_returns(module: &Module, name: &str) -> usize {
        instrs(module, name)
            .iter()
            .filter(|instr| matches!(instr, Instr::Ret { .. }))
            .count()
    }

    #[test]
    fn test_single_return_has_no_implicit_return() {
        let (module, errors) = codegen("FUNC f() RETURN 7");
        assert!(errors.is_empty());
        let body = instrs(&module, "f");
        assert_eq!(
            body,
            vec![Instr::Ret {
                value: Operand::Const(7)
            }]
        );
    }

    #[test]
    fn test_implicit_return() {
        let (module, errors) = codegen("FUNC f() VAR x");
        assert!(errors.is_empty());
        assert_eq!(
            instrs(&module, "f").last(),
            Some(&Instr::Ret {
                value: Operand::Const(0)
            })
        );
    }

    #[test]
    fn test_code_after_return() {
        let (module, errors) = codegen("FUNC f() { RETURN 1 RETURN 2 }");
        assert!(errors.is_empty());
        let id = module.get_function("f").unwrap();
        let blocks = &module.function(id).blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].name, "afterReturn");
        assert_eq!(count_returns(&module, "f"), 2);
    }

    #[test]
    fn test_params_get_stack_slots() {
        let (module, errors) = codegen("FUNC add(a, b) RETURN a + b");
        assert!(errors.is_empty());
        let body = instrs(&module, "add");
        assert!(matches!(body[0], Instr::Alloca { .. }));
        assert!(matches!(body[1], Instr::Alloca { .. }));
        assert!(matches!(
            body[2],
            Instr::Store {
                value: Operand::Param(0),
                ..
            }
        ));
        assert!(matches!(
            body[3],
            Instr::Store {
                value: Operand::Param(1),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            error_kinds("FUNC f() RETURN x + 1"),
            vec![ErrorKind::UnknownVariable]
        );
        assert_eq!(
            error_kinds("FUNC f() x = 1"),
            vec![ErrorKind::UnknownVariable]
        );
        // the failed body is dropped
        let (module, _) = codegen("FUNC f() RETURN x");
        let id = module.get_function("f").unwrap();
        assert!(module.function(id).is_declaration());
    }

    #[test]
    fn test_unknown_variable_in_nested_expressions() {
        let sources = [
            "FUNC g(a) RETURN a FUNC f() RETURN g(1 + y)",
            "FUNC f() IF y THEN RETURN 1 FI",
            "FUNC f() { VAR x WHILE y DO x = 1 DONE }",
            "FUNC f() { VAR x WHILE x DO x = -y DONE }",
            "FUNC f() PRINT \"y=\", y",
        ];
        for source in &sources {
            assert_eq!(
                error_kinds(source),
                vec![ErrorKind::UnknownVariable],
                "{}",
                source
            );
        }
    }

    #[test]
    fn test_printf_is_reserved() {
        let (module, errors) =
            codegen("FUNC printf(a) RETURN a FUNC main() { PRINT \"hi\" RETURN 0 }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Redefinition);
        assert_eq!(
            errors[0].message,
            "function cannot be redefined: `printf` is reserved for PRINT"
        );
        let printf = module.get_function("printf").unwrap();
        assert!(module.function(printf).variadic);
        assert!(module.function(printf).is_declaration());

        let (module, errors) =
            codegen("FUNC main() { PRINT \"hi\" RETURN 0 } FUNC printf(a) RETURN a");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Redefinition);
        let printf = module.get_function("printf").unwrap();
        assert!(module.function(printf).is_declaration());
        let main = module.get_function("main").unwrap();
        assert!(!module.function(main).is_declaration());
    }

    #[test]
    fn test_printf_cannot_be_called() {
        assert_eq!(
            error_kinds("FUNC main() { PRINT \"hi\" RETURN printf(1) }"),
            vec![ErrorKind::UnknownFunction]
        );
        assert_eq!(
            error_kinds("FUNC main() RETURN printf(1) FUNC printf(a) RETURN a"),
            vec![ErrorKind::UnknownFunction, ErrorKind::Redefinition]
        );
    }

    #[test]
    fn test_declaration_outlives_block() {
        let (_, errors) = codegen("FUNC f() { IF 1 THEN { VAR x x = 1 } FI RETURN x }");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unknown_function() {
        let (_, errors) = codegen("FUNC f() RETURN g(1)");
        assert_eq!(errors[0].kind, ErrorKind::UnknownFunction);
        assert_eq!(errors[0].message, "unknown function referenced `g`");
    }

    #[test]
    fn test_arity_mismatch() {
        for args in &["", "1", "1, 2, 3", "1, 2, 3, 4"] {
            let source = format!("FUNC f() RETURN add({}) FUNC add(a, b) RETURN a + b", args);
            assert_eq!(error_kinds(&source), vec![ErrorKind::ArityMismatch]);
        }
        assert!(error_kinds("FUNC f() RETURN add(1, 2) FUNC add(a, b) RETURN a + b").is_empty());
    }

    #[test]
    fn test_forward_call_declares_callee() {
        let (module, errors) = codegen("FUNC main() RETURN sq(3) FUNC sq(x) RETURN x * x");
        assert!(errors.is_empty());
        assert_eq!(module.get_function("sq").unwrap().index(), 1);
        let sq = module.get_function("sq").unwrap();
        assert!(!module.function(sq).is_declaration());
    }

    #[test]
    fn test_redefinition() {
        let (module, errors) = codegen("FUNC f() RETURN 1 FUNC f() RETURN 2");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Redefinition);
        // the first definition is kept
        assert_eq!(
            instrs(&module, "f"),
            vec![Instr::Ret {
                value: Operand::Const(1)
            }]
        );
    }

    #[test]
    fn test_prototype_mismatch() {
        // `main` declares `f` with two parameters, the last registered prototype
        assert_eq!(
            error_kinds("FUNC main() RETURN f(1, 2) FUNC f(a) RETURN a FUNC f(a, b) RETURN a"),
            vec![ErrorKind::PrototypeMismatch]
        );
    }

    #[test]
    fn test_print() {
        let (module, errors) = codegen("FUNC f() { VAR x x = 5 PRINT \"x=\", x }");
        assert!(errors.is_empty());
        assert_eq!(module.globals, vec!["x= %d ".to_string()]);
        let printf = module.get_function("printf").unwrap();
        let call = instrs(&module, "f")
            .into_iter()
            .find_map(|instr| match instr {
                Instr::Call { callee, args, .. } if callee == printf => Some(args),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.len(), 2);
        assert!(matches!(call[0], Operand::Global(_)));
        assert!(matches!(call[1], Operand::Value(_)));
    }

    #[test]
    fn test_while_tests_condition_twice() {
        let (module, errors) = codegen("FUNC f(n) WHILE n DO n = n - 1 DONE");
        assert!(errors.is_empty());
        let body = instrs(&module, "f");
        let tests = body
            .iter()
            .filter(|instr| matches!(instr, Instr::ICmpNe { .. }))
            .count();
        assert_eq!(tests, 2);
        let id = module.get_function("f").unwrap();
        let names: Vec<&str> = module
            .function(id)
            .blocks
            .iter()
            .map(|block| block.name.as_str())
            .collect();
        assert_eq!(names, vec!["entry", "loop", "afterLoop"]);
    }

    #[test]
    fn test_if_blocks() {
        let (module, errors) = codegen("FUNC f(n) IF n THEN RETURN 1 ELSE n = 2 FI");
        assert!(errors.is_empty());
        let id = module.get_function("f").unwrap();
        let names: Vec<&str> = module
            .function(id)
            .blocks
            .iter()
            .map(|block| block.name.as_str())
            .collect();
        assert_eq!(names, vec!["entry", "then", "else", "ifcont"]);
        // the merge block ends with the implicit return
        assert_eq!(count_returns(&module, "f"), 2);
    }
}
