//! [`Builder`], the reference [`Backend`] implementation.

use crate::backend::{Backend, BackendError, BackendResult, PRINTF};
use crate::module::{
    BasicBlock, BinaryOp, BlockId, Function, FunctionId, Instr, Module, Operand, Param, Type,
    ValueId,
};
use crate::verify;

/// Builds IR into an owned [`Module`].
pub struct Builder {
    module: Module,
    insert_point: Option<(FunctionId, BlockId)>,
}

impl Builder {
    pub fn new(module_name: impl ToString) -> Self {
        Self {
            module: Module::new(module_name),
            insert_point: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Consumes `self` and returns the built [`Module`].
    #[must_use]
    pub fn into_module(self) -> Module {
        self.module
    }

    /// Appends `instr` to the insertion block.
    fn push(&mut self, instr: Instr) -> BackendResult<()> {
        let (func, block) = self.insert_point.ok_or(BackendError::NoInsertPoint)?;
        let block = &mut self.module.function_mut(func).blocks[block.index()];
        if block.terminator().is_some() {
            return Err(BackendError::BlockTerminated {
                block: block.name.clone(),
            });
        }
        block.instrs.push(instr);
        Ok(())
    }

    /// Allocates a fresh value in the current function.
    fn fresh_value(&mut self) -> BackendResult<ValueId> {
        let (func, _) = self.insert_point.ok_or(BackendError::NoInsertPoint)?;
        Ok(self.module.function_mut(func).fresh_value())
    }

    /// Builds an instruction that defines a value and returns that value.
    fn push_value(
        &mut self,
        build: impl FnOnce(ValueId) -> Instr,
    ) -> BackendResult<Operand> {
        let dest = self.fresh_value()?;
        self.push(build(dest))?;
        Ok(Operand::Value(dest))
    }
}

impl Backend for Builder {
    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.module.get_function(name)
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> FunctionId {
        let params = params
            .iter()
            .map(|name| Param {
                name: name.clone(),
                ty: Type::I32,
            })
            .collect();
        self.module.add_function(Function::new(name, params, false))
    }

    fn printf(&mut self) -> FunctionId {
        match self.module.get_function(PRINTF) {
            Some(func) => func,
            None => {
                let format = Param {
                    name: "format".to_string(),
                    ty: Type::Ptr,
                };
                self.module
                    .add_function(Function::new(PRINTF, vec![format], true))
            }
        }
    }

    fn has_body(&self, func: FunctionId) -> bool {
        !self.module.function(func).is_declaration()
    }

    fn arity(&self, func: FunctionId) -> usize {
        self.module.function(func).arity()
    }

    fn discard_body(&mut self, func: FunctionId) {
        self.module.function_mut(func).clear_body();
        if matches!(self.insert_point, Some((current, _)) if current == func) {
            self.insert_point = None;
        }
    }

    fn append_block(&mut self, func: FunctionId, name: &str) -> BlockId {
        let blocks = &mut self.module.function_mut(func).blocks;
        blocks.push(BasicBlock::new(name));
        BlockId::new(blocks.len() - 1)
    }

    fn position_at_end(&mut self, func: FunctionId, block: BlockId) {
        self.insert_point = Some((func, block));
    }

    fn is_terminated(&self) -> bool {
        match self.insert_point {
            Some((func, block)) => self
                .module
                .function(func)
                .block(block)
                .terminator()
                .is_some(),
            None => false,
        }
    }

    fn global_string(&mut self, text: &str) -> Operand {
        Operand::Global(self.module.add_global_string(text))
    }

    fn build_alloca(&mut self, name: &str) -> BackendResult<Operand> {
        let (func, _) = self.insert_point.ok_or(BackendError::NoInsertPoint)?;
        let dest = self.fresh_value()?;
        let entry = self
            .module
            .function_mut(func)
            .blocks
            .first_mut()
            .ok_or(BackendError::NoInsertPoint)?;
        // Keep all the slots grouped at the top of the entry block.
        let position = entry
            .instrs
            .iter()
            .take_while(|instr| matches!(instr, Instr::Alloca { .. }))
            .count();
        entry.instrs.insert(
            position,
            Instr::Alloca {
                dest,
                name: name.to_string(),
            },
        );
        Ok(Operand::Value(dest))
    }

    fn build_load(&mut self, ptr: Operand) -> BackendResult<Operand> {
        self.push_value(|dest| Instr::Load { dest, ptr })
    }

    fn build_store(&mut self, value: Operand, ptr: Operand) -> BackendResult<()> {
        self.push(Instr::Store { value, ptr })
    }

    fn build_binary(
        &mut self,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    ) -> BackendResult<Operand> {
        self.push_value(|dest| Instr::Binary { dest, op, lhs, rhs })
    }

    fn build_neg(&mut self, operand: Operand) -> BackendResult<Operand> {
        self.push_value(|dest| Instr::Neg { dest, operand })
    }

    fn build_icmp_ne(&mut self, lhs: Operand, rhs: Operand) -> BackendResult<Operand> {
        self.push_value(|dest| Instr::ICmpNe { dest, lhs, rhs })
    }

    fn build_call(&mut self, callee: FunctionId, args: Vec<Operand>) -> BackendResult<Operand> {
        let target = self.module.function(callee);
        let arity_ok = if target.variadic {
            args.len() >= target.arity()
        } else {
            args.len() == target.arity()
        };
        if !arity_ok {
            return Err(BackendError::ArgumentCount {
                callee: target.name.clone(),
                expected: target.arity(),
                found: args.len(),
            });
        }
        self.push_value(|dest| Instr::Call { dest, callee, args })
    }

    fn build_br(&mut self, target: BlockId) -> BackendResult<()> {
        self.push(Instr::Br { target })
    }

    fn build_cond_br(
        &mut self,
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    ) -> BackendResult<()> {
        self.push(Instr::CondBr {
            cond,
            then_block,
            else_block,
        })
    }

    fn build_ret(&mut self, value: Operand) -> BackendResult<()> {
        self.push(Instr::Ret { value })
    }

    fn verify_function(&self, func: FunctionId) -> BackendResult<()> {
        verify::verify_function(&self.module, func)
    }

    fn dump_function(&self, func: FunctionId) -> String {
        self.module.function_to_string(func)
    }
}
