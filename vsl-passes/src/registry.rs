//! Function prototype collection pass.

use std::collections::HashMap;

use vsl_parser::ast::{Function, Program, Prototype};
use vsl_parser::visitor::Visitor;

/// Maps every function name to its most recently collected [`Prototype`].
///
/// Code generation resolves calls against this table, which allows calling a function
/// that is defined later in the program (or recursively).
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    prototypes: HashMap<String, Prototype>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the prototypes of all the functions in `program`.
    pub fn collect(program: &Program) -> Self {
        let mut registry = Self::new();
        registry.visit_program(program);
        registry
    }

    /// Records `proto`, replacing any previous prototype with the same name.
    pub fn insert(&mut self, proto: Prototype) {
        self.prototypes.insert(proto.ident.clone(), proto);
    }

    pub fn get(&self, ident: &str) -> Option<&Prototype> {
        self.prototypes.get(ident)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

impl<'a> Visitor<'a> for FunctionRegistry {
    fn visit_function(&mut self, func: &'a Function) {
        // Do not walk the body, functions cannot be nested.
        self.insert(func.proto.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsl_parser::parser::Parser;

    fn registry(source: &str) -> FunctionRegistry {
        let source = source.into();
        let program = Parser::new(&source).parse_program();
        assert!(source.has_no_errors());
        FunctionRegistry::collect(&program)
    }

    #[test]
    fn test_collect() {
        let registry = registry("FUNC main() RETURN add(1, 2) FUNC add(a, b) RETURN a + b");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("add").unwrap().params, vec!["a", "b"]);
        assert_eq!(registry.get("main").unwrap().arity(), 0);
        assert!(registry.get("sub").is_none());
    }

    #[test]
    fn test_last_prototype_wins() {
        let registry = registry("FUNC f(a) RETURN a FUNC f(x, y) RETURN x");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("f").unwrap().params, vec!["x", "y"]);
    }

    #[test]
    fn test_empty() {
        assert!(registry("").is_empty());
    }
}
