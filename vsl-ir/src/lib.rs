//! Intermediate representation for VSL programs and the reference backend that builds it.
//!
//! A [`module::Module`] holds functions made of basic blocks. Code generators drive it
//! through the [`backend::Backend`] trait, implemented by [`builder::Builder`].

pub mod backend;
pub mod builder;
pub mod disassemble;
pub mod module;
pub mod object;
pub mod optimize;
pub mod verify;

pub use backend::{Backend, BackendError, PRINTF};
pub use builder::Builder;
pub use module::{
    BasicBlock, BinaryOp, BlockId, Function, FunctionId, GlobalId, Instr, Module, Operand, Param,
    Type, ValueId,
};
