//! Function level optimizations.

use std::collections::{HashMap, VecDeque};

use crate::module::{BlockId, Function, Instr, Module, Operand, ValueId};

/// A transformation over a single function.
pub trait Pass {
    fn name(&self) -> &'static str;
    /// Runs the pass. Returns `true` if the function changed.
    fn run(&self, func: &mut Function) -> bool;
}

/// Replaces arithmetic on immediates with its result.
///
/// Division by zero is left as is so that it still fails when executed. A conditional
/// branch on an immediate becomes an unconditional branch.
pub struct FoldConstants;

impl Pass for FoldConstants {
    fn name(&self) -> &'static str {
        "fold-constants"
    }

    fn run(&self, func: &mut Function) -> bool {
        let mut constants: HashMap<ValueId, i32> = HashMap::new();
        let mut changed = false;

        loop {
            let before = constants.len();
            for instr in func.blocks.iter_mut().flat_map(|block| block.instrs.iter_mut()) {
                for operand in instr.operands_mut() {
                    if let Operand::Value(value) = *operand {
                        if let Some(constant) = constants.get(&value) {
                            *operand = Operand::Const(*constant);
                        }
                    }
                }
                if let Some((dest, value)) = fold(instr) {
                    constants.insert(dest, value);
                }
            }
            if constants.len() == before {
                break;
            }
            changed = true;
        }

        for block in &mut func.blocks {
            block
                .instrs
                .retain(|instr| !matches!(instr.dest(), Some(dest) if constants.contains_key(&dest)));

            if let Some(Instr::CondBr {
                cond: Operand::Const(cond),
                then_block,
                else_block,
            }) = block.instrs.last()
            {
                let target = if *cond != 0 { *then_block } else { *else_block };
                block.instrs.pop();
                block.instrs.push(Instr::Br { target });
                changed = true;
            }
        }

        changed
    }
}

/// Evaluates `instr` if all of its operands are immediates.
fn fold(instr: &Instr) -> Option<(ValueId, i32)> {
    match instr {
        Instr::Binary {
            dest,
            op,
            lhs: Operand::Const(lhs),
            rhs: Operand::Const(rhs),
        } => Some((*dest, op.eval(*lhs, *rhs)?)),
        Instr::Neg {
            dest,
            operand: Operand::Const(operand),
        } => Some((*dest, operand.wrapping_neg())),
        Instr::ICmpNe {
            dest,
            lhs: Operand::Const(lhs),
            rhs: Operand::Const(rhs),
        } => Some((*dest, (lhs != rhs) as i32)),
        _ => None,
    }
}

/// Removes the blocks that cannot be reached from the entry block.
pub struct RemoveUnreachableBlocks;

impl Pass for RemoveUnreachableBlocks {
    fn name(&self) -> &'static str {
        "remove-unreachable-blocks"
    }

    fn run(&self, func: &mut Function) -> bool {
        if func.blocks.is_empty() {
            return false;
        }

        let mut reachable = vec![false; func.blocks.len()];
        let mut queue = VecDeque::new();
        reachable[0] = true;
        queue.push_back(0);
        while let Some(index) = queue.pop_front() {
            let successors = func.blocks[index]
                .terminator()
                .map(Instr::successors)
                .unwrap_or_default();
            for successor in successors {
                match reachable.get_mut(successor.index()) {
                    Some(seen) if !*seen => {
                        *seen = true;
                        queue.push_back(successor.index());
                    }
                    _ => {}
                }
            }
        }

        if reachable.iter().all(|&seen| seen) {
            return false;
        }

        let mut remap = HashMap::new();
        let mut index = 0;
        func.blocks.retain(|_| {
            let keep = reachable[index];
            index += 1;
            keep
        });
        for (new, old) in reachable
            .iter()
            .enumerate()
            .filter(|(_, &seen)| seen)
            .map(|(old, _)| old)
            .enumerate()
        {
            remap.insert(old, BlockId::new(new));
        }
        for instr in func.blocks.iter_mut().flat_map(|block| block.instrs.iter_mut()) {
            for target in instr.successors_mut() {
                if let Some(new) = remap.get(&target.index()) {
                    *target = *new;
                }
            }
        }

        true
    }
}

/// Runs a pipeline of passes over every function until none of them changes anything.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self {
            passes: vec![Box::new(FoldConstants), Box::new(RemoveUnreachableBlocks)],
        }
    }
}

impl PassManager {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Optimizes a single function. Returns `true` if it changed.
    pub fn run_function(&self, func: &mut Function) -> bool {
        if func.is_declaration() {
            return false;
        }
        let mut changed = false;
        loop {
            let mut round = false;
            for pass in &self.passes {
                round |= pass.run(func);
            }
            if !round {
                return changed;
            }
            changed = true;
        }
    }

    /// Optimizes every function of `module`. Returns `true` if anything changed.
    pub fn run(&self, module: &mut Module) -> bool {
        module
            .functions
            .iter_mut()
            .fold(false, |changed, func| self.run_function(func) | changed)
    }
}
