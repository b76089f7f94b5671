//! The interface a code generator uses to build IR.

use std::error::Error;
use std::fmt;

use vsl_source::{CompileError, ErrorKind};

use crate::module::{BinaryOp, BlockId, FunctionId, Operand};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// An instruction was built without an active insertion point.
    NoInsertPoint,
    /// The insertion block already ends with a terminator.
    BlockTerminated { block: String },
    /// A call passes the wrong number of arguments.
    ArgumentCount {
        callee: String,
        expected: usize,
        found: usize,
    },
    /// The function failed structural verification.
    Verification { function: String, message: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NoInsertPoint => write!(f, "no insertion point"),
            BackendError::BlockTerminated { block } => {
                write!(f, "block `{}` already has a terminator", block)
            }
            BackendError::ArgumentCount {
                callee,
                expected,
                found,
            } => write!(
                f,
                "call to `{}` expects {} arguments, found {}",
                callee, expected, found
            ),
            BackendError::Verification { function, message } => {
                write!(f, "invalid function `{}`: {}", function, message)
            }
        }
    }
}

impl Error for BackendError {}

impl From<BackendError> for CompileError {
    fn from(err: BackendError) -> Self {
        let kind = match err {
            BackendError::Verification { .. } => ErrorKind::Verification,
            _ => ErrorKind::Backend,
        };
        CompileError::new(kind, err)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Name of the external output routine called by `PRINT`. Programs cannot define or call it.
pub const PRINTF: &str = "printf";

/// IR construction primitives.
///
/// Instructions are appended at the end of the current insertion block, set with
/// [`Backend::position_at_end`]. All parameters and values are 32 bit integers.
pub trait Backend {
    /// Looks up a function (declared or defined) by name.
    fn get_function(&self, name: &str) -> Option<FunctionId>;
    /// Declares a function taking `params.len()` integers and returning an integer.
    fn declare_function(&mut self, name: &str, params: &[String]) -> FunctionId;
    /// Returns the variadic `printf(ptr, ...)` declaration, declaring it on first use.
    fn printf(&mut self) -> FunctionId;
    /// Returns `true` if the function has at least one basic block.
    fn has_body(&self, func: FunctionId) -> bool;
    fn arity(&self, func: FunctionId) -> usize;
    /// Removes all the blocks of `func`, turning it back into a declaration.
    fn discard_body(&mut self, func: FunctionId);

    /// Appends an empty block to `func`.
    fn append_block(&mut self, func: FunctionId, name: &str) -> BlockId;
    fn position_at_end(&mut self, func: FunctionId, block: BlockId);
    /// Returns `true` if the insertion block ends with a terminator.
    fn is_terminated(&self) -> bool;

    fn const_int(&self, value: i32) -> Operand {
        Operand::Const(value)
    }
    fn param(&self, index: usize) -> Operand {
        Operand::Param(index as u32)
    }
    fn global_string(&mut self, text: &str) -> Operand;

    /// Reserves a stack slot at the top of the entry block of the current function.
    fn build_alloca(&mut self, name: &str) -> BackendResult<Operand>;
    fn build_load(&mut self, ptr: Operand) -> BackendResult<Operand>;
    fn build_store(&mut self, value: Operand, ptr: Operand) -> BackendResult<()>;
    fn build_binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand)
        -> BackendResult<Operand>;
    fn build_neg(&mut self, operand: Operand) -> BackendResult<Operand>;
    fn build_icmp_ne(&mut self, lhs: Operand, rhs: Operand) -> BackendResult<Operand>;
    fn build_call(&mut self, callee: FunctionId, args: Vec<Operand>) -> BackendResult<Operand>;
    fn build_br(&mut self, target: BlockId) -> BackendResult<()>;
    fn build_cond_br(
        &mut self,
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    ) -> BackendResult<()>;
    fn build_ret(&mut self, value: Operand) -> BackendResult<()>;

    /// Checks the function for structural consistency.
    fn verify_function(&self, func: FunctionId) -> BackendResult<()>;
    /// Textual form of the function, for debugging.
    fn dump_function(&self, func: FunctionId) -> String;
}
