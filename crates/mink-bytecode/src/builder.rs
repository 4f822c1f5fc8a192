//! Incremental bytecode construction

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::bytecode::Bytecode;
use crate::constant::{Constant, ConstantPool};
use crate::instruction::{Instruction, Opcode};

/// Builds one [`Bytecode`] unit: append instructions, pool literals, and
/// patch forward jumps.
///
/// Jumps reference absolute instruction indices. Forward jumps are
/// emitted with a placeholder operand via [`BytecodeBuilder::emit_jump`]
/// and resolved with [`BytecodeBuilder::patch_jump_to_here`].
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    name: Option<String>,
    params: Vec<String>,
    instructions: Vec<Instruction>,
    constants: ConstantPool,
    strings: Vec<String>,
    string_index: FxHashMap<String, u32>,
    functions: Vec<Rc<Bytecode>>,
    spans: Vec<(u32, u32)>,
    current_span: (u32, u32),
    spans_enabled: bool,
}

impl BytecodeBuilder {
    /// Start building the top-level program unit
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a function body unit
    pub fn function(name: Option<String>, params: Vec<String>) -> Self {
        Self {
            name,
            params,
            ..Self::default()
        }
    }

    /// Set the source position recorded for subsequently emitted
    /// instructions. Spans stay off until the first call.
    pub fn set_span(&mut self, line: u32, column: u32) {
        self.spans_enabled = true;
        self.current_span = (line, column);
    }

    /// Index of the next instruction to be emitted
    #[inline]
    pub fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Append an instruction with no meaningful operand
    pub fn emit(&mut self, opcode: Opcode) {
        self.emit_with_operand(opcode, 0);
    }

    /// Append an instruction with an operand
    pub fn emit_with_operand(&mut self, opcode: Opcode, operand: u32) {
        self.instructions
            .push(Instruction::with_operand(opcode, operand));
        self.spans.push(self.current_span);
    }

    /// Append a jump with a placeholder target; returns the instruction
    /// index for later patching
    pub fn emit_jump(&mut self, opcode: Opcode) -> u32 {
        let at = self.here();
        self.emit_with_operand(opcode, u32::MAX);
        at
    }

    /// Point the jump at `jump_index` to the next emitted instruction
    pub fn patch_jump_to_here(&mut self, jump_index: u32) {
        let target = self.here();
        self.patch_jump(jump_index, target);
    }

    /// Point the jump at `jump_index` to `target`
    pub fn patch_jump(&mut self, jump_index: u32, target: u32) {
        self.instructions[jump_index as usize].operand = target;
    }

    /// Pool a scalar constant, returning its index
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        self.constants.add(constant)
    }

    /// Pool a string, returning its index. Each distinct string is
    /// stored at most once.
    pub fn add_string(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.string_index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx
    }

    /// Register a nested function body, returning its index
    pub fn add_function(&mut self, function: Bytecode) -> u32 {
        let idx = self.functions.len() as u32;
        self.functions.push(Rc::new(function));
        idx
    }

    /// Finish the unit
    pub fn build(self) -> Bytecode {
        Bytecode {
            name: self.name,
            params: self.params,
            instructions: self.instructions,
            constants: self.constants,
            strings: self.strings,
            functions: self.functions,
            spans: self.spans_enabled.then_some(self.spans),
        }
    }
}
