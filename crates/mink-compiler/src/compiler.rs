//! AST → bytecode lowering

use mink_bytecode::{Bytecode, BytecodeBuilder, Constant, Opcode};
use mink_frontend::ast::{
    AssignOp, BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp, UpdateOp,
};

use crate::error::{CompileError, CompileResult};

/// Patch lists for the innermost enclosing loop.
///
/// `break` and `continue` emit placeholder jumps collected here and
/// patched when the loop finishes compiling (`continue` in a `for` loop
/// targets the update site, which is not known until after the body).
struct LoopContext {
    breaks: Vec<u32>,
    continues: Vec<u32>,
}

/// Compile a parsed program into executable bytecode.
pub fn compile_program(program: &Program) -> CompileResult<Bytecode> {
    let mut compiler = Compiler::new(BytecodeBuilder::new());
    for stmt in &program.body {
        compiler.compile_statement(stmt)?;
    }
    // Top-level implicit return: operand 1 returns the completion value,
    // so the last statement's value becomes the program result.
    compiler.builder.emit_with_operand(Opcode::Return, 1);
    Ok(compiler.builder.build())
}

/// Single-unit compiler state: the bytecode builder, the block depth and
/// the loop-context stack.
struct Compiler {
    builder: BytecodeBuilder,
    loops: Vec<LoopContext>,
    scope_depth: usize,
}

impl Compiler {
    fn new(builder: BytecodeBuilder) -> Self {
        Self {
            builder,
            loops: Vec::new(),
            scope_depth: 0,
        }
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.compile_expression(expr)?;
                self.builder.emit(Opcode::Pop);
            }
            Stmt::Block(body) => {
                self.scope_depth += 1;
                for stmt in body {
                    self.compile_statement(stmt)?;
                }
                self.scope_depth -= 1;
            }
            Stmt::VarDecl { declarations, .. } => {
                for (name, init) in declarations {
                    match init {
                        Some(expr) => self.compile_expression(expr)?,
                        None => self.builder.emit(Opcode::PushUndefined),
                    }
                    let name_idx = self.builder.add_string(name);
                    self.builder.emit_with_operand(Opcode::DeclareVar, name_idx);
                }
            }
            Stmt::FunctionDecl { name, params, body } => {
                self.compile_function(Some(name.clone()), params, body)?;
                let name_idx = self.builder.add_string(name);
                self.builder.emit_with_operand(Opcode::DeclareVar, name_idx);
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.compile_expression(test)?;
                let jump_else = self.builder.emit_jump(Opcode::JumpIfFalse);
                self.compile_statement(consequent)?;
                let jump_end = self.builder.emit_jump(Opcode::Jump);
                self.builder.patch_jump_to_here(jump_else);
                if let Some(alternate) = alternate {
                    self.compile_statement(alternate)?;
                }
                self.builder.patch_jump_to_here(jump_end);
            }
            Stmt::While { test, body } => {
                let loop_start = self.builder.here();
                self.compile_expression(test)?;
                let jump_exit = self.builder.emit_jump(Opcode::JumpIfFalse);

                self.loops.push(LoopContext {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.compile_statement(body)?;
                self.builder.emit_with_operand(Opcode::Jump, loop_start);
                self.builder.patch_jump_to_here(jump_exit);

                let ctx = self.loops.pop().expect("loop context pushed above");
                for jump in ctx.breaks {
                    self.builder.patch_jump_to_here(jump);
                }
                for jump in ctx.continues {
                    self.builder.patch_jump(jump, loop_start);
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_statement(init)?;
                }
                let loop_start = self.builder.here();
                let jump_exit = match test {
                    Some(test) => {
                        self.compile_expression(test)?;
                        Some(self.builder.emit_jump(Opcode::JumpIfFalse))
                    }
                    None => None,
                };

                self.loops.push(LoopContext {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                self.compile_statement(body)?;

                // `continue` lands on the update expression
                let continue_target = self.builder.here();
                if let Some(update) = update {
                    self.compile_expression(update)?;
                    self.builder.emit(Opcode::Pop);
                }
                self.builder.emit_with_operand(Opcode::Jump, loop_start);
                if let Some(jump_exit) = jump_exit {
                    self.builder.patch_jump_to_here(jump_exit);
                }

                let ctx = self.loops.pop().expect("loop context pushed above");
                for jump in ctx.breaks {
                    self.builder.patch_jump_to_here(jump);
                }
                for jump in ctx.continues {
                    self.builder.patch_jump(jump, continue_target);
                }
            }
            Stmt::Return(argument) => {
                match argument {
                    Some(expr) => self.compile_expression(expr)?,
                    None => self.builder.emit(Opcode::PushUndefined),
                }
                self.builder.emit(Opcode::Return);
            }
            Stmt::Break => {
                let jump = self.builder.emit_jump(Opcode::Jump);
                self.loops
                    .last_mut()
                    .ok_or(CompileError::BreakOutsideLoop)?
                    .breaks
                    .push(jump);
            }
            Stmt::Continue => {
                let jump = self.builder.emit_jump(Opcode::Jump);
                self.loops
                    .last_mut()
                    .ok_or(CompileError::ContinueOutsideLoop)?
                    .continues
                    .push(jump);
            }
            Stmt::Empty => {}
        }
        Ok(())
    }

    /// Compile a function body into a nested unit and emit
    /// `MakeFunction` + `BindScope` for it.
    fn compile_function(
        &mut self,
        name: Option<String>,
        params: &[String],
        body: &[Stmt],
    ) -> CompileResult<()> {
        let mut inner = Compiler::new(BytecodeBuilder::function(name, params.to_vec()));
        for stmt in body {
            inner.compile_statement(stmt)?;
        }
        // Implicit trailing return for bodies that fall off the end
        inner.builder.emit(Opcode::PushUndefined);
        inner.builder.emit(Opcode::Return);

        let func_idx = self.builder.add_function(inner.builder.build());
        self.builder
            .emit_with_operand(Opcode::MakeFunction, func_idx);
        self.builder.emit(Opcode::BindScope);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Undefined => self.builder.emit(Opcode::PushUndefined),
            Expr::Null => self.builder.emit(Opcode::PushNull),
            Expr::Boolean(true) => self.builder.emit(Opcode::PushTrue),
            Expr::Boolean(false) => self.builder.emit(Opcode::PushFalse),
            Expr::Number(value) => {
                let idx = self.builder.add_constant(Constant::Number(*value));
                self.builder.emit_with_operand(Opcode::LoadConst, idx);
            }
            Expr::String(value) => {
                let idx = self.builder.add_string(value);
                self.builder.emit_with_operand(Opcode::PushString, idx);
            }
            Expr::BigInt(digits) => {
                let idx = self
                    .builder
                    .add_constant(Constant::BigInt(digits.as_str().into()));
                self.builder.emit_with_operand(Opcode::LoadConst, idx);
            }
            Expr::Identifier(name) => {
                let idx = self.builder.add_string(name);
                self.builder.emit_with_operand(Opcode::LoadVar, idx);
            }
            Expr::This => self.builder.emit(Opcode::LoadThis),
            Expr::Array(elements) => {
                self.builder
                    .emit_with_operand(Opcode::NewArray, elements.len() as u32);
                for element in elements {
                    self.compile_expression(element)?;
                    self.builder.emit(Opcode::ArrayPush);
                }
            }
            Expr::Object(properties) => {
                self.builder.emit(Opcode::NewObject);
                for (key, value) in properties {
                    // [obj] → [obj value obj] so the object survives the set
                    self.builder.emit(Opcode::Dup);
                    self.compile_expression(value)?;
                    self.builder.emit(Opcode::Swap);
                    let key_idx = self.builder.add_string(key);
                    self.builder.emit_with_operand(Opcode::SetProp, key_idx);
                }
            }
            Expr::Function { name, params, body } => {
                self.compile_function(name.clone(), params, body)?;
            }
            Expr::Unary { op, expr } => self.compile_unary(*op, expr)?,
            Expr::Update { op, prefix, target } => self.compile_update(*op, *prefix, target)?,
            Expr::Binary { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.builder.emit(binary_opcode(*op));
            }
            Expr::Logical { op, left, right } => {
                self.compile_expression(left)?;
                self.builder.emit(Opcode::Dup);
                let jump = self.builder.emit_jump(match op {
                    LogicalOp::And => Opcode::JumpIfFalse,
                    LogicalOp::Or => Opcode::JumpIfTrue,
                    LogicalOp::Nullish => Opcode::JumpIfNotNullish,
                });
                self.builder.emit(Opcode::Pop);
                self.compile_expression(right)?;
                self.builder.patch_jump_to_here(jump);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.compile_expression(test)?;
                let jump_else = self.builder.emit_jump(Opcode::JumpIfFalse);
                self.compile_expression(consequent)?;
                let jump_end = self.builder.emit_jump(Opcode::Jump);
                self.builder.patch_jump_to_here(jump_else);
                self.compile_expression(alternate)?;
                self.builder.patch_jump_to_here(jump_end);
            }
            Expr::Assign { op, target, value } => self.compile_assignment(*op, target, value)?,
            Expr::Member {
                object,
                property,
                optional,
            } => {
                self.compile_expression(object)?;
                let prop_idx = self.builder.add_string(property);
                if *optional {
                    // base ?. prop: undefined when the base is nullish
                    self.builder.emit(Opcode::Dup);
                    let jump_get = self.builder.emit_jump(Opcode::JumpIfNotNullish);
                    self.builder.emit(Opcode::Pop);
                    self.builder.emit(Opcode::PushUndefined);
                    let jump_end = self.builder.emit_jump(Opcode::Jump);
                    self.builder.patch_jump_to_here(jump_get);
                    self.builder.emit_with_operand(Opcode::GetProp, prop_idx);
                    self.builder.patch_jump_to_here(jump_end);
                } else {
                    self.builder.emit_with_operand(Opcode::GetProp, prop_idx);
                }
            }
            Expr::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.builder.emit(Opcode::GetPropComputed);
            }
            Expr::Call { callee, args } => self.compile_call(callee, args)?,
        }
        Ok(())
    }

    fn compile_unary(&mut self, op: UnaryOp, expr: &Expr) -> CompileResult<()> {
        match op {
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::Not | UnaryOp::BitNot | UnaryOp::Typeof => {
                self.compile_expression(expr)?;
                self.builder.emit(match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Plus => Opcode::Plus,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::BitNot => Opcode::BitNot,
                    _ => Opcode::TypeOf,
                });
            }
            UnaryOp::Void => {
                self.compile_expression(expr)?;
                self.builder.emit(Opcode::Pop);
                self.builder.emit(Opcode::PushUndefined);
            }
            UnaryOp::Delete => match expr {
                Expr::Member {
                    object, property, ..
                } => {
                    self.compile_expression(object)?;
                    let prop_idx = self.builder.add_string(property);
                    self.builder.emit_with_operand(Opcode::DeleteProp, prop_idx);
                }
                Expr::Index { object, index } => {
                    self.compile_expression(object)?;
                    self.compile_expression(index)?;
                    self.builder.emit(Opcode::DeletePropComputed);
                }
                other => {
                    // delete of a non-reference evaluates it and yields true
                    self.compile_expression(other)?;
                    self.builder.emit(Opcode::Pop);
                    self.builder.emit(Opcode::PushTrue);
                }
            },
        }
        Ok(())
    }

    /// `pre: load, op, store, push new; post: load, coerce, dup, op,
    /// store, pop old`
    fn compile_update(&mut self, op: UpdateOp, prefix: bool, target: &Expr) -> CompileResult<()> {
        let step = match op {
            UpdateOp::Inc => Opcode::Inc,
            UpdateOp::Dec => Opcode::Dec,
        };
        match target {
            Expr::Identifier(name) => {
                let name_idx = self.builder.add_string(name);
                self.builder.emit_with_operand(Opcode::LoadVar, name_idx);
                if prefix {
                    // [old] → [new new], store one
                    self.builder.emit(step);
                    self.builder.emit(Opcode::Dup);
                } else {
                    // [old] → [oldnum oldnum] → [oldnum new], store new
                    self.builder.emit(Opcode::Plus);
                    self.builder.emit(Opcode::Dup);
                    self.builder.emit(step);
                }
                self.builder.emit_with_operand(Opcode::StoreVar, name_idx);
            }
            Expr::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                self.builder.emit(Opcode::Dup);
                let prop_idx = self.builder.add_string(property);
                self.builder.emit_with_operand(Opcode::GetProp, prop_idx);
                if prefix {
                    // [obj old] → [obj new new obj], set leaves [new]
                    self.builder.emit(step);
                    self.builder.emit(Opcode::Dup);
                } else {
                    // [obj old] → [obj oldnum new], rotate for the set
                    self.builder.emit(Opcode::Plus);
                    self.builder.emit(Opcode::Dup);
                    self.builder.emit(step);
                }
                self.builder.emit(Opcode::Rot);
                self.builder.emit_with_operand(Opcode::SetProp, prop_idx);
            }
            Expr::Index { object, index } => {
                self.compile_expression(object)?;
                self.builder.emit(Opcode::Dup);
                self.compile_expression(index)?;
                self.builder.emit(Opcode::GetPropComputed);
                if prefix {
                    self.builder.emit(step);
                    self.builder.emit(Opcode::Dup);
                } else {
                    self.builder.emit(Opcode::Plus);
                    self.builder.emit(Opcode::Dup);
                    self.builder.emit(step);
                }
                self.builder.emit(Opcode::Rot);
                // The key is evaluated again for the store
                self.compile_expression(index)?;
                self.builder.emit(Opcode::SetPropComputed);
            }
            _ => return Err(CompileError::InvalidAssignmentTarget),
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> CompileResult<()> {
        match target {
            Expr::Identifier(name) => {
                let name_idx = self.builder.add_string(name);
                match assign_opcode(op) {
                    None => self.compile_expression(value)?,
                    Some(binop) => {
                        self.builder.emit_with_operand(Opcode::LoadVar, name_idx);
                        self.compile_expression(value)?;
                        self.builder.emit(binop);
                    }
                }
                // Keep the assigned value as the expression result
                self.builder.emit(Opcode::Dup);
                self.builder.emit_with_operand(Opcode::StoreVar, name_idx);
            }
            Expr::Member {
                object, property, ..
            } => {
                let prop_idx = self.builder.add_string(property);
                match assign_opcode(op) {
                    None => {
                        // RHS first, then the object
                        self.compile_expression(value)?;
                        self.builder.emit(Opcode::Dup);
                        self.compile_expression(object)?;
                    }
                    Some(binop) => {
                        // [obj old] → [obj cur] → [cur cur obj]
                        self.compile_expression(object)?;
                        self.builder.emit(Opcode::Dup);
                        self.builder.emit_with_operand(Opcode::GetProp, prop_idx);
                        self.compile_expression(value)?;
                        self.builder.emit(binop);
                        self.builder.emit(Opcode::Dup);
                        self.builder.emit(Opcode::Rot);
                    }
                }
                self.builder.emit_with_operand(Opcode::SetProp, prop_idx);
            }
            Expr::Index { object, index } => match assign_opcode(op) {
                None => {
                    self.compile_expression(value)?;
                    self.builder.emit(Opcode::Dup);
                    self.compile_expression(object)?;
                    self.compile_expression(index)?;
                    self.builder.emit(Opcode::SetPropComputed);
                }
                Some(binop) => {
                    self.compile_expression(object)?;
                    self.builder.emit(Opcode::Dup);
                    self.compile_expression(index)?;
                    self.builder.emit(Opcode::GetPropComputed);
                    self.compile_expression(value)?;
                    self.builder.emit(binop);
                    self.builder.emit(Opcode::Dup);
                    self.builder.emit(Opcode::Rot);
                    // The key is evaluated again for the store
                    self.compile_expression(index)?;
                    self.builder.emit(Opcode::SetPropComputed);
                }
            },
            _ => return Err(CompileError::InvalidAssignmentTarget),
        }
        Ok(())
    }

    /// Calls: method calls keep the receiver under the callee; plain
    /// calls push the callee then the arguments left to right.
    fn compile_call(&mut self, callee: &Expr, args: &[Expr]) -> CompileResult<()> {
        match callee {
            Expr::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                self.builder.emit(Opcode::Dup);
                let prop_idx = self.builder.add_string(property);
                self.builder.emit_with_operand(Opcode::GetProp, prop_idx);
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.builder
                    .emit_with_operand(Opcode::CallMethod, args.len() as u32);
            }
            Expr::Index { object, index } => {
                self.compile_expression(object)?;
                self.builder.emit(Opcode::Dup);
                self.compile_expression(index)?;
                self.builder.emit(Opcode::GetPropComputed);
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.builder
                    .emit_with_operand(Opcode::CallMethod, args.len() as u32);
            }
            _ => {
                self.compile_expression(callee)?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.builder
                    .emit_with_operand(Opcode::Call, args.len() as u32);
            }
        }
        Ok(())
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::Ushr => Opcode::Ushr,
        BinaryOp::Instanceof => Opcode::InstanceOf,
        BinaryOp::In => Opcode::In,
    }
}

/// The binary opcode behind a compound assignment; `None` for plain `=`.
fn assign_opcode(op: AssignOp) -> Option<Opcode> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(Opcode::Add),
        AssignOp::Sub => Some(Opcode::Sub),
        AssignOp::Mul => Some(Opcode::Mul),
        AssignOp::Div => Some(Opcode::Div),
        AssignOp::Mod => Some(Opcode::Mod),
        AssignOp::BitAnd => Some(Opcode::BitAnd),
        AssignOp::BitOr => Some(Opcode::BitOr),
        AssignOp::BitXor => Some(Opcode::BitXor),
        AssignOp::Shl => Some(Opcode::Shl),
        AssignOp::Shr => Some(Opcode::Shr),
        AssignOp::Ushr => Some(Opcode::Ushr),
    }
}
