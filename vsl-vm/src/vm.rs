//! Interpreter for verified IR modules.

use std::error::Error;
use std::fmt;
use std::io::Write;

use vsl_ir::{Function, GlobalId, Instr, Module, Operand, ValueId};

use crate::native::{BuiltinFunctions, NativeValue};

/// Maximum number of nested calls before the program is aborted.
pub const MAX_CALL_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    /// The function executing when the error occurred, if any.
    pub function: Option<String>,
}

impl RuntimeError {
    fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
            function: None,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{} (in function `{}`)", self.message, function),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Int(i32),
    /// Index of a stack slot in the current frame.
    Slot(usize),
    Global(GlobalId),
}

struct CallFrame<'a> {
    func: &'a Function,
    block: usize,
    /// Instruction pointer inside `block`.
    ip: usize,
    args: Vec<i32>,
    values: Vec<Option<Value>>,
    slots: Vec<i32>,
    /// Value of the caller that receives the result.
    return_to: Option<ValueId>,
}

impl<'a> CallFrame<'a> {
    fn new(func: &'a Function, args: Vec<i32>, return_to: Option<ValueId>) -> Self {
        Self {
            func,
            block: 0,
            ip: 0,
            args,
            values: vec![None; func.value_count()],
            slots: Vec::new(),
            return_to,
        }
    }

    fn error(&self, message: impl ToString) -> RuntimeError {
        RuntimeError {
            message: message.to_string(),
            function: Some(self.func.name.clone()),
        }
    }

    fn set(&mut self, dest: ValueId, value: Value) -> RuntimeResult<()> {
        match self.values.get_mut(dest.index()) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(self.error(format!("value %{} is out of range", dest.index()))),
        }
    }

    fn operand(&self, operand: Operand) -> RuntimeResult<Value> {
        match operand {
            Operand::Const(value) => Ok(Value::Int(value)),
            Operand::Value(value) => self
                .values
                .get(value.index())
                .copied()
                .flatten()
                .ok_or_else(|| self.error(format!("use of undefined value %{}", value.index()))),
            Operand::Param(index) => self
                .args
                .get(index as usize)
                .map(|arg| Value::Int(*arg))
                .ok_or_else(|| self.error(format!("use of unknown parameter #{}", index))),
            Operand::Global(global) => Ok(Value::Global(global)),
        }
    }

    fn int(&self, operand: Operand) -> RuntimeResult<i32> {
        match self.operand(operand)? {
            Value::Int(value) => Ok(value),
            _ => Err(self.error("expected an integer operand")),
        }
    }

    fn slot(&self, operand: Operand) -> RuntimeResult<usize> {
        match self.operand(operand)? {
            Value::Slot(index) if index < self.slots.len() => Ok(index),
            _ => Err(self.error("expected a stack slot operand")),
        }
    }

    /// Returns the next instruction and advances the instruction pointer.
    fn fetch(&mut self) -> RuntimeResult<&'a Instr> {
        let func = self.func;
        let instr = func
            .blocks
            .get(self.block)
            .and_then(|block| block.instrs.get(self.ip))
            .ok_or_else(|| self.error("control reached the end of a block"))?;
        self.ip += 1;
        Ok(instr)
    }

    fn jump(&mut self, block: usize) {
        self.block = block;
        self.ip = 0;
    }
}

/// Executes the functions of a [`Module`].
///
/// External declarations are resolved against [`BuiltinFunctions`]. Natives write to
/// `output`.
pub struct Vm<'a, W: Write> {
    module: &'a Module,
    builtins: &'a BuiltinFunctions,
    output: W,
    /// Suspended callers of the running function.
    call_stack: Vec<CallFrame<'a>>,
}

impl<'a, W: Write> Vm<'a, W> {
    pub fn new(module: &'a Module, builtins: &'a BuiltinFunctions, output: W) -> Self {
        Self {
            module,
            builtins,
            output,
            call_stack: Vec::new(),
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Consumes `self` and returns the output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Calls `main()`.
    pub fn run_main(&mut self) -> RuntimeResult<i32> {
        self.call("main", &[])
    }

    /// Calls the function `name` with `args` and returns its result.
    pub fn call(&mut self, name: &str, args: &[i32]) -> RuntimeResult<i32> {
        let module = self.module;
        let func = module
            .get_function(name)
            .map(|id| module.function(id))
            .ok_or_else(|| RuntimeError::new(format!("entry function `{}` not found", name)))?;
        if func.is_declaration() {
            return Err(RuntimeError::new(format!(
                "entry function `{}` has no body",
                name
            )));
        }
        if func.arity() != args.len() {
            return Err(RuntimeError::new(format!(
                "function `{}` expects {} arguments, found {}",
                name,
                func.arity(),
                args.len()
            )));
        }

        self.call_stack.clear();
        self.run(CallFrame::new(func, args.to_vec(), None))
    }

    /// Calls a native function for an external declaration.
    fn call_native(
        &mut self,
        frame: &CallFrame<'a>,
        target: &Function,
        args: &[Operand],
    ) -> RuntimeResult<i32> {
        let module = self.module;
        let builtins = self.builtins;
        let native = builtins.get(&target.name).ok_or_else(|| {
            frame.error(format!("unresolved external symbol `{}`", target.name))
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(match frame.operand(*arg)? {
                Value::Int(value) => NativeValue::Int(value),
                Value::Global(global) => match module.globals.get(global.index()) {
                    Some(text) => NativeValue::Str(text),
                    None => return Err(frame.error("use of unknown global")),
                },
                Value::Slot(_) => {
                    return Err(frame.error("stack slots cannot be passed to native functions"))
                }
            });
        }

        let output: &mut dyn Write = &mut self.output;
        (native.func)(&values[..], output).map_err(|message| frame.error(message))
    }

    fn run(&mut self, mut frame: CallFrame<'a>) -> RuntimeResult<i32> {
        let module = self.module;

        loop {
            match frame.fetch()? {
                Instr::Alloca { dest, .. } => {
                    frame.slots.push(0);
                    let slot = frame.slots.len() - 1;
                    frame.set(*dest, Value::Slot(slot))?;
                }
                Instr::Load { dest, ptr } => {
                    let slot = frame.slot(*ptr)?;
                    let value = frame.slots[slot];
                    frame.set(*dest, Value::Int(value))?;
                }
                Instr::Store { value, ptr } => {
                    let value = frame.int(*value)?;
                    let slot = frame.slot(*ptr)?;
                    frame.slots[slot] = value;
                }
                Instr::Binary { dest, op, lhs, rhs } => {
                    let lhs = frame.int(*lhs)?;
                    let rhs = frame.int(*rhs)?;
                    let value = op
                        .eval(lhs, rhs)
                        .ok_or_else(|| frame.error("division by zero"))?;
                    frame.set(*dest, Value::Int(value))?;
                }
                Instr::Neg { dest, operand } => {
                    let value = frame.int(*operand)?.wrapping_neg();
                    frame.set(*dest, Value::Int(value))?;
                }
                Instr::ICmpNe { dest, lhs, rhs } => {
                    let value = frame.int(*lhs)? != frame.int(*rhs)?;
                    frame.set(*dest, Value::Int(value as i32))?;
                }
                Instr::Call { dest, callee, args } => {
                    let target = module
                        .functions
                        .get(callee.index())
                        .ok_or_else(|| frame.error("call to unknown function"))?;

                    if target.is_declaration() {
                        let value = self.call_native(&frame, target, args)?;
                        frame.set(*dest, Value::Int(value))?;
                        continue;
                    }

                    if self.call_stack.len() + 1 >= MAX_CALL_DEPTH {
                        return Err(frame.error(format!(
                            "stack overflow: call depth exceeds {}",
                            MAX_CALL_DEPTH
                        )));
                    }
                    if target.arity() != args.len() {
                        return Err(frame.error(format!(
                            "`{}` expects {} arguments, found {}",
                            target.name,
                            target.arity(),
                            args.len()
                        )));
                    }
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(frame.int(*arg)?);
                    }

                    let callee_frame = CallFrame::new(target, values, Some(*dest));
                    let caller = std::mem::replace(&mut frame, callee_frame);
                    self.call_stack.push(caller);
                }
                Instr::Br { target } => frame.jump(target.index()),
                Instr::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if frame.int(*cond)? != 0 {
                        frame.jump(then_block.index());
                    } else {
                        frame.jump(else_block.index());
                    }
                }
                Instr::Ret { value } => {
                    let value = frame.int(*value)?;
                    let return_to = frame.return_to;
                    match self.call_stack.pop() {
                        Some(caller) => {
                            frame = caller;
                            if let Some(dest) = return_to {
                                frame.set(dest, Value::Int(value))?;
                            }
                        }
                        None => return Ok(value),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Codegen;
    use vsl_ir::Builder;
    use vsl_parser::parser::Parser;
    use vsl_passes::registry::FunctionRegistry;

    /// Writes every argument after the first, separated by spaces.
    fn print_args(args: &[NativeValue<'_>], output: &mut dyn Write) -> Result<i32, String> {
        let text: Vec<String> = args.iter().skip(1).map(|arg| arg.to_string()).collect();
        writeln!(output, "{}", text.join(" ")).map_err(|err| err.to_string())?;
        Ok(0)
    }

    fn compile(source: &str) -> Module {
        let source = source.into();
        let program = Parser::new(&source).parse_program();
        assert!(source.has_no_errors(), "{}", source.errors);

        let registry = FunctionRegistry::collect(&program);
        let mut builder = Builder::new("test");
        {
            let mut codegen = Codegen::new(&mut builder, &registry);
            for func in &program.functions {
                codegen.codegen_function(func).unwrap();
            }
        }
        builder.into_module()
    }

    fn builtins() -> BuiltinFunctions {
        let mut builtins = BuiltinFunctions::new();
        builtins.add_native_fn("printf", &print_args);
        builtins
    }

    fn eval(source: &str) -> RuntimeResult<i32> {
        let module = compile(source);
        let builtins = builtins();
        Vm::new(&module, &builtins, Vec::new()).run_main()
    }

    /// Runs `main` and returns what it printed.
    fn output(source: &str) -> String {
        let module = compile(source);
        let builtins = builtins();
        let mut vm = Vm::new(&module, &builtins, Vec::new());
        vm.run_main().unwrap();
        String::from_utf8(vm.into_output()).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("FUNC main() RETURN 2 + 3 * 4"), Ok(14));
        assert_eq!(eval("FUNC main() RETURN 10 - 2 - 3"), Ok(5));
        assert_eq!(eval("FUNC main() RETURN (2 + 3) * 4"), Ok(20));
        assert_eq!(eval("FUNC main() RETURN -2 * 3"), Ok(-6));
    }

    #[test]
    fn test_integer_division() {
        assert_eq!(eval("FUNC main() RETURN 7 / 2"), Ok(3));
        assert_eq!(eval("FUNC main() RETURN -7 / 2"), Ok(-3));
        assert_eq!(eval("FUNC main() RETURN 1 / 3 * 3"), Ok(0));
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("FUNC main() { VAR z RETURN 1 / z }").unwrap_err();
        assert_eq!(err.message, "division by zero");
        assert_eq!(err.function, Some("main".to_string()));
    }

    #[test]
    fn test_wrapping() {
        assert_eq!(eval("FUNC main() RETURN 2147483647 + 1"), Ok(i32::MIN));
    }

    #[test]
    fn test_variables_and_calls() {
        let source = "
            FUNC main() {
                VAR a, b
                a = 6
                b = add(a, 4)
                RETURN b
            }
            FUNC add(x, y) RETURN x + y
        ";
        assert_eq!(eval(source), Ok(10));
    }

    #[test]
    fn test_recursion() {
        let source = "
            FUNC main() RETURN fact(5)
            FUNC fact(n) IF n THEN RETURN n * fact(n - 1) ELSE RETURN 1 FI
        ";
        assert_eq!(eval(source), Ok(120));
    }

    #[test]
    fn test_stack_overflow() {
        let err = eval("FUNC main() RETURN f(1) FUNC f(n) RETURN f(n + 1)").unwrap_err();
        assert_eq!(err.message, "stack overflow: call depth exceeds 1024");
    }

    #[test]
    fn test_implicit_return_value() {
        assert_eq!(eval("FUNC main() VAR x"), Ok(0));
        assert_eq!(eval("FUNC main() IF 0 THEN RETURN 5 FI"), Ok(0));
    }

    #[test]
    fn test_while_condition_side_effects() {
        // `tick` prints its argument, the body runs twice
        let source = "
            FUNC main() {
                VAR n, i
                n = 2
                WHILE tick(n) DO { n = n - 1 i = i + 1 } DONE
                RETURN i
            }
            FUNC tick(n) {
                PRINT n
                RETURN n
            }
        ";
        assert_eq!(eval(source), Ok(2));
        assert_eq!(output(source), "2\n1\n0\n");
    }

    #[test]
    fn test_print() {
        let module = compile("FUNC main() { VAR x x = 5 PRINT \"x=\", x }");
        assert_eq!(module.globals, vec!["x= %d ".to_string()]);
        assert_eq!(output("FUNC main() { VAR x x = 5 PRINT \"x=\", x }"), "5\n");
    }

    #[test]
    fn test_unresolved_external() {
        let module = compile("FUNC main() PRINT \"hello\"");
        let builtins = BuiltinFunctions::new();
        let err = Vm::new(&module, &builtins, Vec::new())
            .run_main()
            .unwrap_err();
        assert_eq!(err.message, "unresolved external symbol `printf`");
    }

    #[test]
    fn test_entry_point_errors() {
        let module = compile("FUNC f(a) RETURN a");
        let builtins = builtins();
        let mut vm = Vm::new(&module, &builtins, Vec::new());
        assert_eq!(
            vm.run_main().unwrap_err().message,
            "entry function `main` not found"
        );
        assert_eq!(
            vm.call("f", &[]).unwrap_err().message,
            "function `f` expects 1 arguments, found 0"
        );
        assert_eq!(vm.call("f", &[42]), Ok(42));
    }
}
