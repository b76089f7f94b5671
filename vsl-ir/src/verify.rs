//! Structural verification of functions.

use std::collections::HashMap;

use crate::backend::{BackendError, BackendResult};
use crate::module::{Function, FunctionId, Instr, Module, Operand, Type, ValueId};

/// Checks that `func` is well formed:
///
/// * every block is non empty and ends with its only terminator,
/// * branch targets, callees, parameters and globals exist,
/// * every value is defined before the function uses it, with a matching type,
/// * calls pass the right number of arguments.
///
/// Declarations are always valid.
pub fn verify_function(module: &Module, id: FunctionId) -> BackendResult<()> {
    let func = module.function(id);
    Verifier {
        module,
        func,
        types: func.value_types(),
    }
    .verify()
    .map_err(|message| BackendError::Verification {
        function: func.name.clone(),
        message,
    })
}

/// Verifies every function of `module`.
pub fn verify_module(module: &Module) -> BackendResult<()> {
    module
        .function_ids()
        .try_for_each(|id| verify_function(module, id))
}

struct Verifier<'a> {
    module: &'a Module,
    func: &'a Function,
    types: HashMap<ValueId, Type>,
}

impl<'a> Verifier<'a> {
    fn verify(&self) -> Result<(), String> {
        let mut defined = vec![false; self.func.value_count()];

        for block in &self.func.blocks {
            let (last, body) = match block.instrs.split_last() {
                Some(split) => split,
                None => return Err(format!("block `{}` is empty", block.name)),
            };
            if !last.is_terminator() {
                return Err(format!("block `{}` has no terminator", block.name));
            }
            if body.iter().any(Instr::is_terminator) {
                return Err(format!(
                    "block `{}` has a terminator in the middle",
                    block.name
                ));
            }

            for instr in &block.instrs {
                self.verify_instr(instr)?;
                if let Some(dest) = instr.dest() {
                    match defined.get_mut(dest.index()) {
                        Some(slot) if !*slot => *slot = true,
                        Some(_) => return Err(format!("%{} is defined twice", dest.index())),
                        None => return Err(format!("%{} is out of range", dest.index())),
                    }
                }
            }
        }

        // All uses must refer to a defined value. Blocks are not ordered by dominance, so
        // this only runs once every definition is known.
        for instr in self.func.blocks.iter().flat_map(|block| &block.instrs) {
            for operand in instr.operands() {
                if let Operand::Value(value) = operand {
                    if !defined.get(value.index()).copied().unwrap_or(false) {
                        return Err(format!("use of undefined value %{}", value.index()));
                    }
                }
            }
        }

        Ok(())
    }

    fn verify_instr(&self, instr: &Instr) -> Result<(), String> {
        match instr {
            Instr::Alloca { .. } => Ok(()),
            Instr::Load { ptr, .. } => self.expect_type(*ptr, Type::Ptr),
            Instr::Store { value, ptr } => {
                self.expect_type(*value, Type::I32)?;
                self.expect_type(*ptr, Type::Ptr)
            }
            Instr::Binary { lhs, rhs, .. } | Instr::ICmpNe { lhs, rhs, .. } => {
                self.expect_type(*lhs, Type::I32)?;
                self.expect_type(*rhs, Type::I32)
            }
            Instr::Neg { operand, .. } => self.expect_type(*operand, Type::I32),
            Instr::Call { callee, args, .. } => {
                let target = self
                    .module
                    .functions
                    .get(callee.index())
                    .ok_or_else(|| format!("call to unknown function #{}", callee.index()))?;
                let arity_ok = if target.variadic {
                    args.len() >= target.arity()
                } else {
                    args.len() == target.arity()
                };
                if !arity_ok {
                    return Err(format!(
                        "call to `{}` expects {} arguments, found {}",
                        target.name,
                        target.arity(),
                        args.len()
                    ));
                }
                for (index, arg) in args.iter().enumerate() {
                    let expected = target.params.get(index).map_or(Type::I32, |p| p.ty);
                    // Variadic arguments may be of any type.
                    if index < target.arity() {
                        self.expect_type(*arg, expected)?;
                    } else {
                        self.type_of(*arg)?;
                    }
                }
                Ok(())
            }
            Instr::Br { target } => self.expect_block(target.index()),
            Instr::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                self.expect_type(*cond, Type::I1)?;
                self.expect_block(then_block.index())?;
                self.expect_block(else_block.index())
            }
            Instr::Ret { value } => self.expect_type(*value, Type::I32),
        }
    }

    fn expect_block(&self, index: usize) -> Result<(), String> {
        if index < self.func.blocks.len() {
            Ok(())
        } else {
            Err(format!("branch to unknown block #{}", index))
        }
    }

    /// Returns the type of `operand`, or `None` for an immediate.
    fn type_of(&self, operand: Operand) -> Result<Option<Type>, String> {
        match operand {
            Operand::Const(_) => Ok(None),
            Operand::Value(value) => self
                .types
                .get(&value)
                .copied()
                .map(Some)
                .ok_or_else(|| format!("use of undefined value %{}", value.index())),
            Operand::Param(index) => {
                if (index as usize) < self.func.arity() {
                    Ok(Some(Type::I32))
                } else {
                    Err(format!("use of unknown parameter #{}", index))
                }
            }
            Operand::Global(global) => {
                if global.index() < self.module.globals.len() {
                    Ok(Some(Type::Ptr))
                } else {
                    Err(format!("use of unknown global @{}", global.index()))
                }
            }
        }
    }

    fn expect_type(&self, operand: Operand, expected: Type) -> Result<(), String> {
        match self.type_of(operand)? {
            None if expected != Type::Ptr => Ok(()),
            None => Err(format!("expected a {} operand, found an immediate", expected)),
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(format!(
                "expected a {} operand, found a {}",
                expected, found
            )),
        }
    }
}
