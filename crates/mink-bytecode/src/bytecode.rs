//! The bytecode artifact

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::constant::ConstantPool;
use crate::instruction::Instruction;

/// A compiled unit: the whole program, or one function body.
///
/// Lives as long as any call frame or function object references it
/// (hence the `Rc` links for nested bodies).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    /// Function name, when this unit is a named function body
    pub name: Option<String>,
    /// Parameter names, in declaration order
    pub params: Vec<String>,
    /// The instruction stream
    pub instructions: Vec<Instruction>,
    /// Scalar literals referenced by `LoadConst`
    pub constants: ConstantPool,
    /// Names and string literals; each distinct string appears once
    pub strings: Vec<String>,
    /// Nested function bodies referenced by `MakeFunction`
    pub functions: Vec<Rc<Bytecode>>,
    /// Optional per-instruction source positions `(line, column)`
    pub spans: Option<Vec<(u32, u32)>>,
}

impl Bytecode {
    /// Number of instructions
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the instruction stream is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Get a pooled string by index
    #[inline]
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Get a nested function body by index
    #[inline]
    pub fn function(&self, index: u32) -> Option<&Rc<Bytecode>> {
        self.functions.get(index as usize)
    }

    /// Render a human-readable listing (for debugging and the REPL)
    pub fn disassemble(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let name = self.name.as_deref().unwrap_or("<main>");
        let _ = writeln!(out, "== {} ==", name);
        for (index, instruction) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{:04}  {}", index, instruction);
        }
        for function in &self.functions {
            out.push_str(&function.disassemble());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, Opcode};

    #[test]
    fn test_disassemble_lists_instructions() {
        let bytecode = Bytecode {
            instructions: vec![
                Instruction::with_operand(Opcode::LoadConst, 0),
                Instruction::simple(Opcode::Return),
            ],
            ..Bytecode::default()
        };
        let listing = bytecode.disassemble();
        assert!(listing.contains("<main>"));
        assert!(listing.contains("0000  LoadConst 0"));
        assert!(listing.contains("0001  Return"));
    }
}
