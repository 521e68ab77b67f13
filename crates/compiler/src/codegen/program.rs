//! Function-level code generation
//!
//! Prologue/epilogue emission, the System V calling convention, name
//! mangling, and the mapping from predeclared functions to runtime entry
//! points.

use std::sync::atomic::Ordering;

use crate::ast::FunctionDecl;
use crate::types::{TypeId, TypeKind};

use super::ir::{ARG_REGISTERS, CALLEE_SAVED, FLOAT_ARG_REGISTERS};
use super::labels::LabelKind;
use super::locals::LocalTable;
use super::{CodeGen, CodeGenError, Instruction, Opcode, Operand, Register, Value};

/// `StructName_functionName`
pub fn mangle_method(struct_name: &str, function_name: &str) -> String {
    format!("{}_{}", struct_name, function_name)
}

/// `StructName_functionName_inplace`, the optimized self-mutation variant
/// emitted for instance methods that mutate through `self` and return
/// nothing.
pub fn mangle_method_inplace(struct_name: &str, function_name: &str) -> String {
    format!("{}_{}_inplace", struct_name, function_name)
}

/// Runtime entry points for the predeclared functions.
pub fn runtime_entry(name: &str) -> Option<&'static str> {
    match name {
        "log" => Some("asthra_simple_log"),
        "panic" => Some("asthra_panic"),
        "args" => Some("asthra_runtime_get_args"),
        _ => None,
    }
}

/// Runtime trap for failed bounds checks.
pub const BOUNDS_TRAP: &str = "asthra_bounds_check_fail";

impl CodeGen<'_> {
    /// Lower one function (or method) body under the given symbol name.
    ///
    /// `receiver` carries the struct (or monomorphized instance) for impl
    /// methods; its type parameters are substituted through every type
    /// the body mentions when a specialization is active.
    pub(super) fn emit_function(
        &mut self,
        decl: &FunctionDecl,
        symbol_name: &str,
        receiver: Option<TypeId>,
    ) -> Result<(), CodeGenError> {
        let fn_ty = match receiver {
            Some(recv) => self
                .universe
                .find_method(recv, &decl.name)
                .and_then(|s| s.ty),
            None => self.function_types.get(&decl.name).copied(),
        }
        .ok_or_else(|| {
            CodeGenError::Logic(format!(
                "analyzer violation: no signature recorded for '{}'",
                decl.name
            ))
        })?;
        let TypeKind::Function { params, ret, .. } = self.universe.kind(fn_ty).clone() else {
            return Err(CodeGenError::Logic(format!(
                "'{}' is not a function type",
                decl.name
            )));
        };

        self.locals = LocalTable::new();
        self.regs.reset();
        self.frame_patches.clear();
        self.loop_stack.clear();
        self.current_function = symbol_name.to_string();

        self.labels.intern(symbol_name, LabelKind::Function);
        self.place_label(symbol_name)?;

        // Self-mutating void methods get the in-place alias at the same
        // address.
        let ret_concrete = self.concrete(ret);
        if let Some(recv) = receiver
            && decl.params.first().is_some_and(|p| p.name == "self")
            && self.universe.is_void(ret_concrete)
        {
            let base_name = self.universe.name_of(recv);
            let alias = mangle_method_inplace(
                &super::specialization::mangle_canonical(&base_name),
                &decl.name,
            );
            self.labels.intern(&alias, LabelKind::Function);
            self.labels
                .define_label(&alias, self.instructions.len() - 1)
                .map_err(CodeGenError::Logic)?;
        }

        self.emit_prologue();
        self.regs.enable_callee_saved();

        // Parameters land in their slots from the argument registers,
        // integer and floating classes counted separately to mirror the
        // call side; overflow parameters come from the caller's frame.
        let mut int_index = 0;
        let mut float_index = 0;
        let mut stack_index = 0;
        for (i, param) in decl.params.iter().enumerate() {
            let ty = self.concrete(params[i]);
            let size = self.universe.size_of(ty).max(8);
            let align = self.universe.align_of(ty).max(8);
            let offset = self.locals.allocate(&param.name, size, align, true);
            let is_float = matches!(
                self.universe.primitive_kind(ty),
                Some(k) if k.is_float()
            );
            let source = if is_float {
                if float_index < FLOAT_ARG_REGISTERS.len() {
                    float_index += 1;
                    Some(FLOAT_ARG_REGISTERS[float_index - 1])
                } else {
                    None
                }
            } else if int_index < ARG_REGISTERS.len() {
                int_index += 1;
                Some(ARG_REGISTERS[int_index - 1])
            } else {
                None
            };
            match source {
                Some(reg) => {
                    let mov = if is_float { Opcode::Movsd } else { Opcode::Mov };
                    self.emit(
                        Instruction::new(
                            mov,
                            vec![
                                Operand::mem(Register::RBP, offset),
                                Operand::Register(reg),
                            ],
                        )
                        .with_comment(format!("param {}", param.name)),
                    );
                }
                None => {
                    // Stack argument: above the saved frame pointer and
                    // the return address, in overflow order.
                    let caller_offset = 16 + 8 * stack_index as i64;
                    stack_index += 1;
                    let scratch = self.alloc_reg();
                    self.emit_op(
                        Opcode::Mov,
                        vec![
                            Operand::Register(scratch),
                            Operand::mem(Register::RBP, caller_offset),
                        ],
                    );
                    self.emit_op(
                        Opcode::Mov,
                        vec![
                            Operand::mem(Register::RBP, offset),
                            Operand::Register(scratch),
                        ],
                    );
                    self.regs.free(scratch);
                }
            }
        }

        for stmt in &decl.body.stmts {
            self.emit_stmt(stmt)?;
        }

        // Fall-off-the-end path for void functions.
        self.emit_epilogue();
        self.emit_op(Opcode::Ret, vec![]);

        self.patch_frame_size();
        self.stats.functions_lowered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reserve the frame and save the callee-saved registers.
    fn emit_prologue(&mut self) {
        self.emit_op(
            Opcode::Push,
            vec![Operand::Register(Register::RBP)],
        );
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::Register(Register::RBP),
                Operand::Register(Register::RSP),
            ],
        );
        for reg in CALLEE_SAVED.iter().skip(1) {
            self.emit_op(Opcode::Push, vec![Operand::Register(*reg)]);
        }
        // Frame size is unknown until the body has allocated its locals;
        // patched by patch_frame_size.
        self.frame_patches.push(self.instructions.len());
        self.emit(
            Instruction::new(
                Opcode::Sub,
                vec![Operand::Register(Register::RSP), Operand::Immediate(0)],
            )
            .with_comment("frame"),
        );
    }

    /// Reverse the prologue. Emitted by every `return` and by the
    /// fall-off-the-end path.
    pub(super) fn emit_epilogue(&mut self) {
        self.frame_patches.push(self.instructions.len());
        self.emit(
            Instruction::new(
                Opcode::Add,
                vec![Operand::Register(Register::RSP), Operand::Immediate(0)],
            )
            .with_comment("frame"),
        );
        for reg in CALLEE_SAVED.iter().skip(1).rev() {
            self.emit_op(Opcode::Pop, vec![Operand::Register(*reg)]);
        }
        self.emit_op(Opcode::Pop, vec![Operand::Register(Register::RBP)]);
    }

    fn patch_frame_size(&mut self) {
        let frame = self.locals.frame_size() as i64;
        for &index in &self.frame_patches {
            if let Some(op) = self.instructions[index].operands.get_mut(1) {
                *op = Operand::Immediate(frame);
            }
        }
        self.frame_patches.clear();
    }

    /// Emit a call following the System V AMD64 convention: integer
    /// arguments in {RDI, RSI, RDX, RCX, R8, R9} and floating arguments in
    /// {XMM0..XMM7}, each class counted in its own sequence; overflow
    /// arguments are pushed right-to-left as raw 8-byte words. Argument
    /// values are parked in temporary slots first so that loading the
    /// argument registers cannot clobber a pending value. Returns the
    /// register holding the result (RAX moved into a scratch register).
    pub(super) fn emit_call(
        &mut self,
        target: &str,
        arg_values: Vec<Value>,
    ) -> Result<Register, CodeGenError> {
        let mut parked: Vec<(i64, bool)> = Vec::with_capacity(arg_values.len());
        for value in &arg_values {
            let slot = self.locals.allocate_anon(8, 8);
            let is_float = value.register().is_float();
            let mov = if is_float { Opcode::Movsd } else { Opcode::Mov };
            self.emit_op(
                mov,
                vec![
                    Operand::mem(Register::RBP, slot),
                    Operand::Register(value.register()),
                ],
            );
            self.regs.free(value.register());
            parked.push((slot, is_float));
        }

        let mut int_index = 0;
        let mut float_index = 0;
        let mut overflow: Vec<i64> = Vec::new();
        for &(slot, is_float) in &parked {
            if is_float {
                if float_index < FLOAT_ARG_REGISTERS.len() {
                    self.emit_op(
                        Opcode::Movsd,
                        vec![
                            Operand::Register(FLOAT_ARG_REGISTERS[float_index]),
                            Operand::mem(Register::RBP, slot),
                        ],
                    );
                    float_index += 1;
                } else {
                    overflow.push(slot);
                }
            } else if int_index < ARG_REGISTERS.len() {
                self.emit_op(
                    Opcode::Mov,
                    vec![
                        Operand::Register(ARG_REGISTERS[int_index]),
                        Operand::mem(Register::RBP, slot),
                    ],
                );
                int_index += 1;
            } else {
                overflow.push(slot);
            }
        }
        // Stack arguments, pushed right-to-left as raw words.
        let stack_args = overflow.len();
        if stack_args > 0 {
            let scratch = self.alloc_reg();
            for &slot in overflow.iter().rev() {
                self.emit_op(
                    Opcode::Mov,
                    vec![
                        Operand::Register(scratch),
                        Operand::mem(Register::RBP, slot),
                    ],
                );
                self.emit_op(Opcode::Push, vec![Operand::Register(scratch)]);
            }
            self.regs.free(scratch);
        }

        // Call targets are plain label operands; external symbols (runtime
        // entries, externs) are resolved by the linker, not the manager.
        self.emit_op(Opcode::Call, vec![Operand::Label(target.to_string())]);
        if stack_args > 0 {
            self.emit_op(
                Opcode::Add,
                vec![
                    Operand::Register(Register::RSP),
                    Operand::Immediate(8 * stack_args as i64),
                ],
            );
        }

        let result = self.alloc_reg();
        if result != Register::RAX {
            self.emit_op(
                Opcode::Mov,
                vec![
                    Operand::Register(result),
                    Operand::Register(Register::RAX),
                ],
            );
        }
        Ok(result)
    }
}
