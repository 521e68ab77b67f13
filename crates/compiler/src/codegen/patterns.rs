//! Pattern-match lowering
//!
//! Each arm lowers to a test sequence that falls through on match and
//! jumps to the next arm's label on mismatch, followed by a bind sequence
//! that materializes the arm's variables from the scrutinee. Enum tests
//! compare the discriminant in the first four bytes of the layout; the
//! payload lives immediately after the tag.

use crate::ast::{LiteralPattern, Pattern, PatternKind};
use crate::types::{TypeId, TypeKind, ENUM_TAG_SIZE};

use super::{CodeGen, CodeGenError, Instruction, Opcode, Operand, Register, Value};

impl CodeGen<'_> {
    /// Emit the test half of an arm: fall through on match, jump to
    /// `next_arm` on mismatch.
    pub(super) fn emit_pattern_test(
        &mut self,
        pattern: &Pattern,
        scrutinee: Value,
        scrutinee_ty: TypeId,
        next_arm: &str,
    ) -> Result<(), CodeGenError> {
        match &pattern.kind {
            // Unconditional fallthrough.
            PatternKind::Wildcard | PatternKind::Identifier(_) => Ok(()),
            PatternKind::Literal(literal) => self.emit_literal_test(literal, scrutinee, next_arm),
            PatternKind::EnumVariant {
                variant, binding, ..
            } => self.emit_variant_test(variant, binding.as_deref(), scrutinee, scrutinee_ty, next_arm),
            PatternKind::Struct { fields, .. } => {
                for (fname, sub) in fields {
                    let (offset, field_ty) = self.field_slot(scrutinee_ty, fname)?;
                    let value = self.load_component(scrutinee.register(), offset as i64, field_ty);
                    self.emit_pattern_test(sub, value, field_ty, next_arm)?;
                    self.regs.free(value.register());
                }
                Ok(())
            }
            PatternKind::Tuple(elements) => {
                let (types, offsets) = self.tuple_layout(scrutinee_ty)?;
                for ((sub, &elem_ty), &offset) in
                    elements.iter().zip(types.iter()).zip(offsets.iter())
                {
                    let value = self.load_component(scrutinee.register(), offset as i64, elem_ty);
                    self.emit_pattern_test(sub, value, elem_ty, next_arm)?;
                    self.regs.free(value.register());
                }
                Ok(())
            }
        }
    }

    /// Emit the bind half of an arm: declare the arm's variables from the
    /// scrutinee. Runs only on the fallthrough (matched) path.
    pub(super) fn emit_pattern_bind(
        &mut self,
        pattern: &Pattern,
        scrutinee: Value,
        scrutinee_ty: TypeId,
    ) -> Result<(), CodeGenError> {
        match &pattern.kind {
            PatternKind::Wildcard | PatternKind::Literal(_) => Ok(()),
            PatternKind::Identifier(name) => self.bind_value(name, scrutinee, scrutinee_ty),
            PatternKind::EnumVariant {
                variant, binding, ..
            } => {
                let Some(binding) = binding else {
                    return Ok(());
                };
                let payload_ty = self.variant_payload_type(scrutinee_ty, variant)?;
                let Some(payload_ty) = payload_ty else {
                    return Ok(());
                };
                let value = self.load_component(
                    scrutinee.register(),
                    ENUM_TAG_SIZE as i64,
                    payload_ty,
                );
                self.emit_pattern_bind(binding, value, payload_ty)?;
                self.regs.free(value.register());
                Ok(())
            }
            PatternKind::Struct { fields, .. } => {
                for (fname, sub) in fields {
                    let (offset, field_ty) = self.field_slot(scrutinee_ty, fname)?;
                    let value = self.load_component(scrutinee.register(), offset as i64, field_ty);
                    self.emit_pattern_bind(sub, value, field_ty)?;
                    self.regs.free(value.register());
                }
                Ok(())
            }
            PatternKind::Tuple(elements) => {
                let (types, offsets) = self.tuple_layout(scrutinee_ty)?;
                for ((sub, &elem_ty), &offset) in
                    elements.iter().zip(types.iter()).zip(offsets.iter())
                {
                    let value = self.load_component(scrutinee.register(), offset as i64, elem_ty);
                    self.emit_pattern_bind(sub, value, elem_ty)?;
                    self.regs.free(value.register());
                }
                Ok(())
            }
        }
    }

    fn emit_literal_test(
        &mut self,
        literal: &LiteralPattern,
        scrutinee: Value,
        next_arm: &str,
    ) -> Result<(), CodeGenError> {
        let reg = scrutinee.register();
        match literal {
            LiteralPattern::Int(value) => {
                self.emit_op(
                    Opcode::Cmp,
                    vec![Operand::Register(reg), Operand::Immediate(*value)],
                );
                self.emit_op(Opcode::Jne, vec![Operand::Label(next_arm.to_string())]);
            }
            LiteralPattern::Bool(value) => {
                self.emit_op(
                    Opcode::Cmp,
                    vec![Operand::Register(reg), Operand::Immediate(i64::from(*value))],
                );
                self.emit_op(Opcode::Jne, vec![Operand::Label(next_arm.to_string())]);
            }
            LiteralPattern::Char(c) => {
                self.emit_op(
                    Opcode::Cmp,
                    vec![
                        Operand::Register(reg),
                        Operand::Immediate(i64::from(*c as u32)),
                    ],
                );
                self.emit_op(Opcode::Jne, vec![Operand::Label(next_arm.to_string())]);
            }
            LiteralPattern::Float(value) => {
                let expected = self.emit_float_pattern_operand(*value)?;
                self.emit_op(
                    Opcode::Ucomisd,
                    vec![Operand::Register(reg), Operand::Register(expected)],
                );
                self.regs.free(expected);
                self.emit_op(Opcode::Jne, vec![Operand::Label(next_arm.to_string())]);
            }
            LiteralPattern::String(contents) => {
                // String equality goes through the runtime helper.
                let label = self.intern_string(contents);
                let expected = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![Operand::Register(expected), Operand::Label(label)],
                );
                let result = self.emit_call(
                    "asthra_string_equals",
                    vec![Value::Scalar(reg), Value::Scalar(expected)],
                )?;
                self.emit_op(
                    Opcode::Test,
                    vec![Operand::Register(result), Operand::Register(result)],
                );
                self.regs.free(result);
                self.emit_op(Opcode::Je, vec![Operand::Label(next_arm.to_string())]);
            }
        }
        Ok(())
    }

    fn emit_float_pattern_operand(&mut self, value: f64) -> Result<Register, CodeGenError> {
        let label = self.intern_float(value);
        let addr = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(addr), Operand::Label(label)],
        );
        let dst = self.alloc_float_reg();
        self.emit_op(
            Opcode::Movsd,
            vec![Operand::Register(dst), Operand::mem(addr, 0)],
        );
        self.regs.free(addr);
        Ok(dst)
    }

    /// Discriminant compare: load the first four bytes and test against
    /// the variant's tag.
    fn emit_variant_test(
        &mut self,
        variant: &str,
        binding: Option<&Pattern>,
        scrutinee: Value,
        scrutinee_ty: TypeId,
        next_arm: &str,
    ) -> Result<(), CodeGenError> {
        let (enum_id, _) = self.universe.as_enum(scrutinee_ty).ok_or_else(|| {
            CodeGenError::Logic("analyzer violation: variant pattern on non-enum".to_string())
        })?;
        let discriminant = self
            .universe
            .variant_discriminant(enum_id, variant)
            .ok_or_else(|| {
                CodeGenError::Logic(format!("analyzer violation: no variant '{}'", variant))
            })?;

        let tag = self.alloc_reg();
        self.emit(
            Instruction::new(
                Opcode::Mov,
                vec![
                    Operand::Register(tag),
                    Operand::mem(scrutinee.register(), 0),
                ],
            )
            .with_comment("discriminant"),
        );
        self.emit_op(
            Opcode::Cmp,
            vec![
                Operand::Register(tag),
                Operand::Immediate(i64::from(discriminant)),
            ],
        );
        self.regs.free(tag);
        self.emit_op(Opcode::Jne, vec![Operand::Label(next_arm.to_string())]);

        // Nested tests inside the payload, still on the match path.
        if let Some(binding) = binding
            && !matches!(
                binding.kind,
                PatternKind::Wildcard | PatternKind::Identifier(_)
            )
        {
            let payload_ty = self.variant_payload_type(scrutinee_ty, variant)?;
            if let Some(payload_ty) = payload_ty {
                let value = self.load_component(
                    scrutinee.register(),
                    ENUM_TAG_SIZE as i64,
                    payload_ty,
                );
                self.emit_pattern_test(binding, value, payload_ty, next_arm)?;
                self.regs.free(value.register());
            }
        }
        Ok(())
    }

    /// The concrete payload type of a variant, with generic instance
    /// arguments substituted.
    fn variant_payload_type(
        &mut self,
        scrutinee_ty: TypeId,
        variant: &str,
    ) -> Result<Option<TypeId>, CodeGenError> {
        let (enum_id, type_args) = self.universe.as_enum(scrutinee_ty).ok_or_else(|| {
            CodeGenError::Logic("analyzer violation: variant pattern on non-enum".to_string())
        })?;
        let payload = self
            .universe
            .find_variant(enum_id, variant)
            .ok_or_else(|| {
                CodeGenError::Logic(format!("analyzer violation: no variant '{}'", variant))
            })?
            .payload;
        let Some(payload) = payload else {
            return Ok(None);
        };
        if type_args.is_empty() {
            return Ok(Some(payload));
        }
        let params = match self.universe.kind(enum_id) {
            TypeKind::Enum { type_params, .. } => type_params.clone(),
            _ => return Ok(Some(payload)),
        };
        Ok(Some(self.universe.substitute(payload, &params, &type_args)))
    }

    /// Load a component of an aggregate at `[base + offset]`: scalars are
    /// loaded by value, aggregates by address.
    fn load_component(&mut self, base: Register, offset: i64, ty: TypeId) -> Value {
        if self.is_aggregate(ty) {
            let dst = self.alloc_reg();
            self.emit_op(
                Opcode::Lea,
                vec![Operand::Register(dst), Operand::mem(base, offset)],
            );
            Value::Address(dst)
        } else {
            let dst = self.alloc_reg();
            let mov = self.mov_for(ty);
            self.emit_op(mov, vec![Operand::Register(dst), Operand::mem(base, offset)]);
            Value::Scalar(dst)
        }
    }

    /// Materialize a pattern binding into its own stack slot.
    fn bind_value(
        &mut self,
        name: &str,
        value: Value,
        ty: TypeId,
    ) -> Result<(), CodeGenError> {
        let size = self.universe.size_of(ty).max(8);
        let align = self.universe.align_of(ty).max(8);
        let offset = self.locals.allocate(name, size, align, false);
        if self.is_aggregate(ty) {
            let dst = self.alloc_reg();
            self.emit_op(
                Opcode::Lea,
                vec![
                    Operand::Register(dst),
                    Operand::mem(Register::RBP, offset),
                ],
            );
            // The source register stays owned by the caller.
            let scratch = self.alloc_reg();
            let mut copied: i64 = 0;
            let mut remaining = self.universe.size_of(ty);
            while remaining > 0 {
                self.emit_op(
                    Opcode::Mov,
                    vec![
                        Operand::Register(scratch),
                        Operand::mem(value.register(), copied),
                    ],
                );
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::mem(dst, copied), Operand::Register(scratch)],
                );
                copied += 8;
                remaining = remaining.saturating_sub(8);
            }
            self.regs.free(scratch);
            self.regs.free(dst);
        } else {
            let mov = self.mov_for(ty);
            self.emit(
                Instruction::new(
                    mov,
                    vec![
                        Operand::mem(Register::RBP, offset),
                        Operand::Register(value.register()),
                    ],
                )
                .with_comment(format!("bind {}", name)),
            );
        }
        Ok(())
    }

    fn tuple_layout(&self, ty: TypeId) -> Result<(Vec<TypeId>, Vec<u64>), CodeGenError> {
        match self.universe.kind(ty) {
            TypeKind::Tuple { elements, offsets } => Ok((elements.clone(), offsets.clone())),
            _ => Err(CodeGenError::Logic(
                "analyzer violation: tuple pattern on non-tuple".to_string(),
            )),
        }
    }
}
