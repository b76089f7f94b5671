//! Native functions callable from VSL programs.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

/// An argument passed to a native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeValue<'a> {
    Int(i32),
    /// A constant string of the module.
    Str(&'a str),
}

impl<'a> fmt::Display for NativeValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Int(value) => write!(f, "{}", value),
            NativeValue::Str(text) => write!(f, "{}", text),
        }
    }
}

/// Signature of a native function. `output` is the program's standard output.
pub type NativeFnPtr =
    &'static dyn Fn(&[NativeValue<'_>], &mut dyn Write) -> Result<i32, String>;

#[derive(Clone)]
pub struct NativeFn {
    pub ident: String,
    pub func: NativeFnPtr,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.ident)
    }
}

/// Native functions that resolve external declarations, by name.
#[derive(Debug, Clone, Default)]
pub struct BuiltinFunctions {
    pub functions: HashMap<String, NativeFn>,
}

impl BuiltinFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native function, replacing any previous one with the same name.
    pub fn add_native_fn(&mut self, ident: &str, func: NativeFnPtr) {
        self.functions.insert(
            ident.to_string(),
            NativeFn {
                ident: ident.to_string(),
                func,
            },
        );
    }

    pub fn get(&self, ident: &str) -> Option<&NativeFn> {
        self.functions.get(ident)
    }
}
