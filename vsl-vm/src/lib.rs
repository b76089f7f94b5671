//! Code generation from the AST into IR, and an interpreter for the generated IR.

pub mod codegen;
pub mod native;
pub mod vm;
