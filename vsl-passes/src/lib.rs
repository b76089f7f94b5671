//! Analysis passes run over a parsed program before code generation.

pub mod registry;
