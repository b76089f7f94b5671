//! Binary object encoding of a [`Module`].
//!
//! Layout (integers are little endian):
//!
//! ```text
//! "VSLO" version:u8
//! globals:u32 { string }
//! functions:u32 {
//!     name:string variadic:u8 params:u32 { name:string type:u8 } values:u32
//!     blocks:u32 { name:string instrs:u32 { opcode:u8 operands... } }
//! }
//! ```
//!
//! Strings are a `u32` length followed by UTF-8 bytes. Every operand is a [`OperandKind`]
//! tag followed by a 4 byte payload.

use std::error::Error;
use std::fmt;

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

use crate::module::{
    BasicBlock, BinaryOp, BlockId, Function, FunctionId, GlobalId, Instr, Module, Operand, Param,
    Type, ValueId,
};

pub const MAGIC: &[u8; 4] = b"VSLO";
pub const VERSION: u8 = 1;

/// Represents an instruction opcode. Internally represented using 1 byte (`u8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OpCode {
    /// *dest, name*
    Alloca = 0,
    /// *dest, ptr*
    Load = 1,
    /// *value, ptr*
    Store = 2,
    Add = 3,
    Sub = 4,
    Mul = 5,
    SDiv = 6,
    /// *dest, operand*
    Neg = 7,
    /// *dest, lhs, rhs*
    ICmpNe = 8,
    /// *dest, callee, argc, args...*
    Call = 9,
    /// *target*
    Br = 10,
    /// *cond, then, else*
    CondBr = 11,
    /// *value*
    Ret = 12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OperandKind {
    Const = 0,
    Value = 1,
    Param = 2,
    Global = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Primitive)]
#[repr(u8)]
enum TypeTag {
    I1 = 0,
    I32 = 1,
    Ptr = 2,
}

impl From<Type> for TypeTag {
    fn from(ty: Type) -> Self {
        match ty {
            Type::I1 => TypeTag::I1,
            Type::I32 => TypeTag::I32,
            Type::Ptr => TypeTag::Ptr,
        }
    }
}

impl From<TypeTag> for Type {
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::I1 => Type::I1,
            TypeTag::I32 => Type::I32,
            TypeTag::Ptr => Type::Ptr,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectError {
    BadMagic,
    UnsupportedVersion(u8),
    UnexpectedEof,
    InvalidOpCode(u8),
    InvalidOperand(u8),
    InvalidType(u8),
    InvalidUtf8,
    /// Bytes left over after the last function.
    TrailingData,
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::BadMagic => write!(f, "not a VSL object file"),
            ObjectError::UnsupportedVersion(version) => {
                write!(f, "unsupported object version {}", version)
            }
            ObjectError::UnexpectedEof => write!(f, "unexpected end of object file"),
            ObjectError::InvalidOpCode(byte) => write!(f, "invalid opcode {:#04x}", byte),
            ObjectError::InvalidOperand(byte) => write!(f, "invalid operand tag {:#04x}", byte),
            ObjectError::InvalidType(byte) => write!(f, "invalid type tag {:#04x}", byte),
            ObjectError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            ObjectError::TrailingData => write!(f, "trailing data after the last function"),
        }
    }
}

impl Error for ObjectError {}

/// Encodes `module` into its binary object form.
pub fn write_object(module: &Module) -> Vec<u8> {
    let mut writer = Writer { bytes: Vec::new() };
    writer.bytes.extend_from_slice(MAGIC);
    writer.bytes.push(VERSION);

    writer.u32(module.globals.len());
    for global in &module.globals {
        writer.string(global);
    }

    writer.u32(module.functions.len());
    for func in &module.functions {
        writer.string(&func.name);
        writer.bytes.push(func.variadic as u8);
        writer.u32(func.params.len());
        for param in &func.params {
            writer.string(&param.name);
            writer.bytes.push(TypeTag::from(param.ty) as u8);
        }
        writer.u32(func.value_count());
        writer.u32(func.blocks.len());
        for block in &func.blocks {
            writer.string(&block.name);
            writer.u32(block.instrs.len());
            for instr in &block.instrs {
                writer.instr(instr);
            }
        }
    }

    writer.bytes
}

struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u32(&mut self, value: usize) {
        self.bytes.extend_from_slice(&(value as u32).to_le_bytes());
    }

    fn string(&mut self, text: &str) {
        self.u32(text.len());
        self.bytes.extend_from_slice(text.as_bytes());
    }

    fn op(&mut self, opcode: OpCode) {
        self.bytes.push(opcode as u8);
    }

    fn value(&mut self, value: ValueId) {
        self.u32(value.index());
    }

    fn block(&mut self, block: BlockId) {
        self.u32(block.index());
    }

    fn operand(&mut self, operand: Operand) {
        let (kind, payload) = match operand {
            Operand::Const(value) => (OperandKind::Const, value.to_le_bytes()),
            Operand::Value(value) => (OperandKind::Value, value.0.to_le_bytes()),
            Operand::Param(index) => (OperandKind::Param, index.to_le_bytes()),
            Operand::Global(global) => (OperandKind::Global, global.0.to_le_bytes()),
        };
        self.bytes.push(kind as u8);
        self.bytes.extend_from_slice(&payload);
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Alloca { dest, name } => {
                self.op(OpCode::Alloca);
                self.value(*dest);
                self.string(name);
            }
            Instr::Load { dest, ptr } => {
                self.op(OpCode::Load);
                self.value(*dest);
                self.operand(*ptr);
            }
            Instr::Store { value, ptr } => {
                self.op(OpCode::Store);
                self.operand(*value);
                self.operand(*ptr);
            }
            Instr::Binary { dest, op, lhs, rhs } => {
                self.op(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::SDiv => OpCode::SDiv,
                });
                self.value(*dest);
                self.operand(*lhs);
                self.operand(*rhs);
            }
            Instr::Neg { dest, operand } => {
                self.op(OpCode::Neg);
                self.value(*dest);
                self.operand(*operand);
            }
            Instr::ICmpNe { dest, lhs, rhs } => {
                self.op(OpCode::ICmpNe);
                self.value(*dest);
                self.operand(*lhs);
                self.operand(*rhs);
            }
            Instr::Call { dest, callee, args } => {
                self.op(OpCode::Call);
                self.value(*dest);
                self.u32(callee.index());
                self.u32(args.len());
                for arg in args {
                    self.operand(*arg);
                }
            }
            Instr::Br { target } => {
                self.op(OpCode::Br);
                self.block(*target);
            }
            Instr::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                self.op(OpCode::CondBr);
                self.operand(*cond);
                self.block(*then_block);
                self.block(*else_block);
            }
            Instr::Ret { value } => {
                self.op(OpCode::Ret);
                self.operand(*value);
            }
        }
    }
}

/// Decodes a module written by [`write_object`].
///
/// Only the encoding is checked. Use [`crate::verify::verify_module`] to validate the result.
pub fn read_object(bytes: &[u8]) -> Result<Module, ObjectError> {
    let mut reader = Reader { bytes, pos: 0 };
    if reader.take(MAGIC.len())? != MAGIC {
        return Err(ObjectError::BadMagic);
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(ObjectError::UnsupportedVersion(version));
    }

    let mut module = Module::new("object");

    for _ in 0..reader.u32()? {
        module.globals.push(reader.string()?);
    }

    for _ in 0..reader.u32()? {
        let name = reader.string()?;
        let variadic = reader.u8()? != 0;
        let mut params = Vec::new();
        for _ in 0..reader.u32()? {
            let name = reader.string()?;
            let tag = reader.u8()?;
            let ty = TypeTag::from_u8(tag).ok_or(ObjectError::InvalidType(tag))?;
            params.push(Param {
                name,
                ty: ty.into(),
            });
        }
        let mut func = Function::new(name, params, variadic);
        func.value_count = reader.u32()?;
        for _ in 0..reader.u32()? {
            let mut block = BasicBlock::new(reader.string()?);
            for _ in 0..reader.u32()? {
                block.instrs.push(reader.instr()?);
            }
            func.blocks.push(block);
        }
        module.functions.push(func);
    }

    if reader.pos != bytes.len() {
        return Err(ObjectError::TrailingData);
    }
    Ok(module)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ObjectError> {
        let end = self.pos.checked_add(len).ok_or(ObjectError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ObjectError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ObjectError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ObjectError> {
        let mut buf = [0; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn string(&mut self) -> Result<String, ObjectError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ObjectError::InvalidUtf8)
    }

    fn value(&mut self) -> Result<ValueId, ObjectError> {
        Ok(ValueId(self.u32()?))
    }

    fn block(&mut self) -> Result<BlockId, ObjectError> {
        Ok(BlockId(self.u32()?))
    }

    fn operand(&mut self) -> Result<Operand, ObjectError> {
        let tag = self.u8()?;
        let kind = OperandKind::from_u8(tag).ok_or(ObjectError::InvalidOperand(tag))?;
        let payload = self.u32()?;
        Ok(match kind {
            OperandKind::Const => Operand::Const(payload as i32),
            OperandKind::Value => Operand::Value(ValueId(payload)),
            OperandKind::Param => Operand::Param(payload),
            OperandKind::Global => Operand::Global(GlobalId(payload)),
        })
    }

    fn binary(&mut self, op: BinaryOp) -> Result<Instr, ObjectError> {
        Ok(Instr::Binary {
            dest: self.value()?,
            op,
            lhs: self.operand()?,
            rhs: self.operand()?,
        })
    }

    fn instr(&mut self) -> Result<Instr, ObjectError> {
        let byte = self.u8()?;
        let opcode = OpCode::from_u8(byte).ok_or(ObjectError::InvalidOpCode(byte))?;
        Ok(match opcode {
            OpCode::Alloca => Instr::Alloca {
                dest: self.value()?,
                name: self.string()?,
            },
            OpCode::Load => Instr::Load {
                dest: self.value()?,
                ptr: self.operand()?,
            },
            OpCode::Store => Instr::Store {
                value: self.operand()?,
                ptr: self.operand()?,
            },
            OpCode::Add => self.binary(BinaryOp::Add)?,
            OpCode::Sub => self.binary(BinaryOp::Sub)?,
            OpCode::Mul => self.binary(BinaryOp::Mul)?,
            OpCode::SDiv => self.binary(BinaryOp::SDiv)?,
            OpCode::Neg => Instr::Neg {
                dest: self.value()?,
                operand: self.operand()?,
            },
            OpCode::ICmpNe => Instr::ICmpNe {
                dest: self.value()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            },
            OpCode::Call => {
                let dest = self.value()?;
                let callee = FunctionId(self.u32()?);
                let mut args = Vec::new();
                for _ in 0..self.u32()? {
                    args.push(self.operand()?);
                }
                Instr::Call { dest, callee, args }
            }
            OpCode::Br => Instr::Br {
                target: self.block()?,
            },
            OpCode::CondBr => Instr::CondBr {
                cond: self.operand()?,
                then_block: self.block()?,
                else_block: self.block()?,
            },
            OpCode::Ret => Instr::Ret {
                value: self.operand()?,
            },
        })
    }
}
