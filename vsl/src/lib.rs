pub mod builtin_functions;

use std::io::Write;

use vsl_ir::optimize::PassManager;
use vsl_ir::{Builder, Module};
use vsl_parser::parser::Parser;
use vsl_passes::registry::FunctionRegistry;
use vsl_source::Source;
use vsl_vm::codegen::Codegen;
use vsl_vm::vm::{RuntimeResult, Vm};

/// Compiles `source` into an optimized module.
///
/// Errors are added to `source.errors`. Every function that compiled successfully is
/// still part of the returned module.
pub fn compile(source: &Source, module_name: &str) -> Module {
    let program = Parser::new(source).parse_program();
    let registry = FunctionRegistry::collect(&program);

    let mut builder = Builder::new(module_name);
    {
        let mut codegen = Codegen::new(&mut builder, &registry);
        for func in &program.functions {
            if let Err(err) = codegen.codegen_function(func) {
                source.errors.add_error(err);
            }
        }
    }

    let mut module = builder.into_module();
    PassManager::default().run(&mut module);
    module
}

/// Returns `true` if `module` defines a `main` function without parameters.
pub fn has_entry_point(module: &Module) -> bool {
    module
        .get_function("main")
        .map(|id| module.function(id))
        .map_or(false, |main| !main.is_declaration() && main.arity() == 0)
}

/// Runs `main()` with the default builtin functions, writing program output to `output`.
pub fn run_main<W: Write>(module: &Module, output: W) -> RuntimeResult<i32> {
    let builtins = builtin_functions::default_builtin_functions();
    Vm::new(module, &builtins, output).run_main()
}
