//! Textual dump of a [`Module`], modeled on LLVM assembly.
//!
//! The alternate form (`{:#}`) highlights opcodes and labels for terminal output.

use std::collections::HashMap;
use std::fmt;

use console::style;

use crate::module::{BlockId, Function, FunctionId, Instr, Module, Operand, Type};

/// Writes `text`, colored when `colored` is set.
fn opcode(f: &mut fmt::Formatter<'_>, colored: bool, text: &str) -> fmt::Result {
    if colored {
        write!(f, "{}", style(text).cyan())
    } else {
        write!(f, "{}", text)
    }
}

/// Escapes a string the way LLVM prints `c"..."` constants.
fn escape(text: &str) -> String {
    let mut escaped = String::new();
    for byte in text.bytes() {
        match byte {
            b'"' | b'\\' => escaped.push_str(&format!("\\{:02X}", byte)),
            0x20..=0x7e => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{:02X}", byte)),
        }
    }
    escaped
}

/// Unique label for every block of `func`. Repeated block names get their index appended.
fn block_labels(func: &Function) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for block in &func.blocks {
        *counts.entry(block.name.as_str()).or_default() += 1;
    }
    func.blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            if counts[block.name.as_str()] > 1 {
                format!("{}.{}", block.name, index)
            } else {
                block.name.clone()
            }
        })
        .collect()
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    func: &'a Function,
    labels: Vec<String>,
    colored: bool,
}

impl<'a> FunctionPrinter<'a> {
    fn operand(&self, operand: Operand) -> String {
        match operand {
            Operand::Const(value) => value.to_string(),
            Operand::Value(value) => format!("%{}", value.index()),
            Operand::Param(index) => match self.func.params.get(index as usize) {
                Some(param) => format!("%{}", param.name),
                None => format!("%arg{}", index),
            },
            Operand::Global(global) => format!("@.str.{}", global.index()),
        }
    }

    fn typed(&self, operand: Operand) -> String {
        let ty = match operand {
            Operand::Global(_) => Type::Ptr,
            _ => Type::I32,
        };
        format!("{} {}", ty, self.operand(operand))
    }

    fn label(&self, block: BlockId) -> String {
        match self.labels.get(block.index()) {
            Some(label) => format!("label %{}", label),
            None => format!("label %bb{}", block.index()),
        }
    }

    fn signature(&self) -> String {
        let mut params: Vec<String> = self
            .func
            .params
            .iter()
            .map(|param| format!("{} %{}", param.ty, param.name))
            .collect();
        if self.func.variadic {
            params.push("...".to_string());
        }
        format!("i32 @{}({})", self.func.name, params.join(", "))
    }

    fn instr(&self, f: &mut fmt::Formatter<'_>, instr: &Instr) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(dest) = instr.dest() {
            write!(f, "%{} = ", dest.index())?;
        }
        match instr {
            Instr::Alloca { name, .. } => {
                opcode(f, self.colored, "alloca")?;
                write!(f, " i32 ; {}", name)
            }
            Instr::Load { ptr, .. } => {
                opcode(f, self.colored, "load")?;
                write!(f, " i32, ptr {}", self.operand(*ptr))
            }
            Instr::Store { value, ptr } => {
                opcode(f, self.colored, "store")?;
                write!(f, " i32 {}, ptr {}", self.operand(*value), self.operand(*ptr))
            }
            Instr::Binary { op, lhs, rhs, .. } => {
                opcode(f, self.colored, op.name())?;
                write!(f, " i32 {}, {}", self.operand(*lhs), self.operand(*rhs))
            }
            Instr::Neg { operand, .. } => {
                opcode(f, self.colored, "neg")?;
                write!(f, " i32 {}", self.operand(*operand))
            }
            Instr::ICmpNe { lhs, rhs, .. } => {
                opcode(f, self.colored, "icmp")?;
                write!(f, " ne i32 {}, {}", self.operand(*lhs), self.operand(*rhs))
            }
            Instr::Call { callee, args, .. } => {
                opcode(f, self.colored, "call")?;
                let target = self.module.functions.get(callee.index());
                let args: Vec<String> = args.iter().map(|arg| self.typed(*arg)).collect();
                match target {
                    Some(target) if target.variadic => {
                        let params: Vec<String> =
                            target.params.iter().map(|p| p.ty.to_string()).collect();
                        write!(f, " i32 ({}, ...)", params.join(", "))?;
                    }
                    _ => write!(f, " i32")?,
                }
                let name = target.map_or("<unknown>", |target| target.name.as_str());
                write!(f, " @{}({})", name, args.join(", "))
            }
            Instr::Br { target } => {
                opcode(f, self.colored, "br")?;
                write!(f, " {}", self.label(*target))
            }
            Instr::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                opcode(f, self.colored, "br")?;
                write!(
                    f,
                    " i1 {}, {}, {}",
                    self.operand(*cond),
                    self.label(*then_block),
                    self.label(*else_block)
                )
            }
            Instr::Ret { value } => {
                opcode(f, self.colored, "ret")?;
                write!(f, " i32 {}", self.operand(*value))
            }
        }
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.func.is_declaration() {
            return writeln!(f, "declare {}", self.signature());
        }

        writeln!(f, "define {} {{", self.signature())?;
        for (block, label) in self.func.blocks.iter().zip(&self.labels) {
            if self.colored {
                writeln!(f, "{}:", style(label).yellow())?;
            } else {
                writeln!(f, "{}:", label)?;
            }
            for instr in &block.instrs {
                self.instr(f, instr)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Displays a single function of a module.
struct DisplayFunction<'a> {
    module: &'a Module,
    func: &'a Function,
}

impl<'a> fmt::Display for DisplayFunction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FunctionPrinter {
            module: self.module,
            func: self.func,
            labels: block_labels(self.func),
            colored: f.alternate(),
        }
        .print(f)
    }
}

impl Module {
    /// Disassembles a single function.
    pub fn function_to_string(&self, id: FunctionId) -> String {
        DisplayFunction {
            module: self,
            func: self.function(id),
        }
        .to_string()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let colored = f.alternate();
        if colored {
            writeln!(f, "{}", style(format!("; ModuleID = '{}'", self.name)).black().bright())?;
        } else {
            writeln!(f, "; ModuleID = '{}'", self.name)?;
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for (index, global) in self.globals.iter().enumerate() {
            writeln!(
                f,
                "@.str.{} = private constant [{} x i8] c\"{}\\00\"",
                index,
                global.len() + 1,
                escape(global)
            )?;
        }

        for func in &self.functions {
            writeln!(f)?;
            FunctionPrinter {
                module: self,
                func,
                labels: block_labels(func),
                colored,
            }
            .print(f)?;
        }
        Ok(())
    }
}
