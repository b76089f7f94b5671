//! Definitions for [`Module`], [`Function`], [`BasicBlock`] and [`Instr`].

use std::collections::HashMap;
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Position of the item in its owning list.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Handle to a [`Function`] in a [`Module`].
    FunctionId
);
id_type!(
    /// Handle to a [`BasicBlock`] in a [`Function`].
    BlockId
);
id_type!(
    /// Handle to the result of an instruction in a [`Function`].
    ValueId
);
id_type!(
    /// Handle to a constant string in a [`Module`].
    GlobalId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Result of a comparison.
    I1,
    I32,
    /// Address of a stack slot or a global string.
    Ptr,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I1 => write!(f, "i1"),
            Type::I32 => write!(f, "i32"),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// An integer immediate. Usable wherever an `i1` or `i32` is expected.
    Const(i32),
    Value(ValueId),
    /// The n-th parameter of the enclosing function.
    Param(u32),
    Global(GlobalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Signed division, truncating toward zero.
    SDiv,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
        }
    }

    /// Evaluates the operation with wrapping semantics. Returns `None` on division by zero.
    pub fn eval(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            BinaryOp::Add => Some(lhs.wrapping_add(rhs)),
            BinaryOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinaryOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinaryOp::SDiv if rhs == 0 => None,
            BinaryOp::SDiv => Some(lhs.wrapping_div(rhs)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Reserves an `i32` stack slot. `name` is only used when printing.
    Alloca { dest: ValueId, name: String },
    Load { dest: ValueId, ptr: Operand },
    Store { value: Operand, ptr: Operand },
    Binary {
        dest: ValueId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Neg { dest: ValueId, operand: Operand },
    /// Integer comparison `lhs != rhs`, producing an `i1`.
    ICmpNe {
        dest: ValueId,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        dest: ValueId,
        callee: FunctionId,
        args: Vec<Operand>,
    },
    Br { target: BlockId },
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret { value: Operand },
}

impl Instr {
    /// The value defined by this instruction, if any.
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Instr::Alloca { dest, .. }
            | Instr::Load { dest, .. }
            | Instr::Binary { dest, .. }
            | Instr::Neg { dest, .. }
            | Instr::ICmpNe { dest, .. }
            | Instr::Call { dest, .. } => Some(*dest),
            Instr::Store { .. } | Instr::Br { .. } | Instr::CondBr { .. } | Instr::Ret { .. } => {
                None
            }
        }
    }

    /// Type of the value defined by this instruction, if any.
    pub fn result_type(&self) -> Option<Type> {
        match self {
            Instr::Alloca { .. } => Some(Type::Ptr),
            Instr::ICmpNe { .. } => Some(Type::I1),
            Instr::Load { .. } | Instr::Binary { .. } | Instr::Neg { .. } | Instr::Call { .. } => {
                Some(Type::I32)
            }
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::CondBr { .. } | Instr::Ret { .. })
    }

    /// Blocks control may flow to after this instruction.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instr::Br { target } => vec![*target],
            Instr::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instr::Alloca { .. } | Instr::Br { .. } => Vec::new(),
            Instr::Load { ptr, .. } => vec![*ptr],
            Instr::Store { value, ptr } => vec![*value, *ptr],
            Instr::Binary { lhs, rhs, .. } | Instr::ICmpNe { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::Neg { operand, .. } => vec![*operand],
            Instr::Call { args, .. } => args.clone(),
            Instr::CondBr { cond, .. } => vec![*cond],
            Instr::Ret { value } => vec![*value],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instr::Alloca { .. } | Instr::Br { .. } => Vec::new(),
            Instr::Load { ptr, .. } => vec![ptr],
            Instr::Store { value, ptr } => vec![value, ptr],
            Instr::Binary { lhs, rhs, .. } | Instr::ICmpNe { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Neg { operand, .. } => vec![operand],
            Instr::Call { args, .. } => args.iter_mut().collect(),
            Instr::CondBr { cond, .. } => vec![cond],
            Instr::Ret { value } => vec![value],
        }
    }

    pub fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Instr::Br { target } => vec![target],
            Instr::CondBr {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            _ => Vec::new(),
        }
    }
}

/// A straight line sequence of instructions ending with a terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            instrs: Vec::new(),
        }
    }

    /// Returns the last instruction if it is a terminator.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instrs.last().filter(|instr| instr.is_terminator())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A function definition, or a declaration when it has no blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// Accepts extra arguments after `params`.
    pub variadic: bool,
    /// The first block is the entry block.
    pub blocks: Vec<BasicBlock>,
    /// Number of [`ValueId`]s handed out so far.
    pub(crate) value_count: u32,
}

impl Function {
    pub fn new(name: impl ToString, params: Vec<Param>, variadic: bool) -> Self {
        Self {
            name: name.to_string(),
            params,
            variadic,
            blocks: Vec::new(),
            value_count: 0,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn value_count(&self) -> usize {
        self.value_count as usize
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub(crate) fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.value_count);
        self.value_count += 1;
        id
    }

    /// Turns the function back into a declaration.
    pub fn clear_body(&mut self) {
        self.blocks.clear();
        self.value_count = 0;
    }

    /// Types of every value defined in the function.
    pub fn value_types(&self) -> HashMap<ValueId, Type> {
        self.blocks
            .iter()
            .flat_map(|block| block.instrs.iter())
            .filter_map(|instr| Some((instr.dest()?, instr.result_type()?)))
            .collect()
    }
}

/// A compilation unit: functions plus the constant strings they reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<String>,
}

impl Module {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|func| func.name == name)
            .map(FunctionId::new)
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Adds a function declaration. Blocks are added afterwards to define it.
    pub fn add_function(&mut self, func: Function) -> FunctionId {
        self.functions.push(func);
        FunctionId::new(self.functions.len() - 1)
    }

    /// Adds a constant string, reusing an identical one if present.
    pub fn add_global_string(&mut self, text: &str) -> GlobalId {
        match self.globals.iter().position(|global| global == text) {
            Some(index) => GlobalId::new(index),
            None => {
                self.globals.push(text.to_string());
                GlobalId::new(self.globals.len() - 1)
            }
        }
    }

    pub fn global(&self, id: GlobalId) -> &str {
        &self.globals[id.index()]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len()).map(FunctionId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_eval() {
        assert_eq!(BinaryOp::Add.eval(i32::MAX, 1), Some(i32::MIN));
        assert_eq!(BinaryOp::SDiv.eval(-7, 2), Some(-3));
        assert_eq!(BinaryOp::SDiv.eval(i32::MIN, -1), Some(i32::MIN));
        assert_eq!(BinaryOp::SDiv.eval(1, 0), None);
    }

    #[test]
    fn test_global_strings_are_shared() {
        let mut module = Module::new("test");
        let a = module.add_global_string("x= %d ");
        let b = module.add_global_string("y");
        let c = module.add_global_string("x= %d ");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(module.global(b), "y");
    }

    #[test]
    fn test_get_function() {
        let mut module = Module::new("test");
        let id = module.add_function(Function::new("f", Vec::new(), false));
        assert_eq!(module.get_function("f"), Some(id));
        assert_eq!(module.get_function("g"), None);
        assert!(module.function(id).is_declaration());
    }
}
