//! Expression lowering
//!
//! Scalars are computed into registers; aggregates (structs, enums,
//! tuples, arrays, slices) are materialized into stack slots and handled
//! through their base address. String literals land in the read-only pool;
//! enum construction writes the `{ u32 tag; payload }` layout.

use crate::ast::{BinaryOp, Expr, ExprKind, TypeExpr, UnaryOp};
use crate::types::{PrimitiveKind, TypeId, TypeKind, ENUM_TAG_SIZE};

use super::labels::LabelKind;
use super::program::{runtime_entry, BOUNDS_TRAP};
use super::{CodeGen, CodeGenError, Instruction, Opcode, Operand, Register, Value};

impl CodeGen<'_> {
    /// Lower one expression to a value.
    pub(super) fn emit_expr(&mut self, expr: &Expr) -> Result<Value, CodeGenError> {
        match &expr.kind {
            ExprKind::IntLiteral { value, .. } => {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(*value)],
                );
                Ok(Value::Scalar(dst))
            }
            ExprKind::BoolLiteral(value) => {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(i64::from(*value))],
                );
                Ok(Value::Scalar(dst))
            }
            ExprKind::CharLiteral(c) => {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(i64::from(*c as u32))],
                );
                Ok(Value::Scalar(dst))
            }
            ExprKind::Unit => {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(0)],
                );
                Ok(Value::Scalar(dst))
            }
            ExprKind::FloatLiteral { value, .. } => self.emit_float_literal(*value),
            ExprKind::StringLiteral(contents) => {
                let label = self.intern_string(contents);
                let dst = self.alloc_reg();
                self.emit(
                    Instruction::new(
                        Opcode::Lea,
                        vec![Operand::Register(dst), Operand::Label(label)],
                    )
                    .with_comment("string literal"),
                );
                Ok(Value::Scalar(dst))
            }
            ExprKind::Identifier(name) => self.emit_identifier(name, expr),
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs, expr),
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand),
            ExprKind::Assignment { target, value } => self.emit_assignment(target, value),
            ExprKind::Call { callee, args } => self.emit_call_expr(callee, args, expr),
            ExprKind::AssociatedCall {
                type_name,
                type_args,
                func,
                args,
            } => self.emit_associated_call(type_name, type_args, func, args),
            ExprKind::FieldAccess { object, field } => self.emit_field_access(object, field, expr),
            ExprKind::EnumVariant { variant, payload } => {
                let result_ty = self.type_of(expr)?;
                self.emit_enum_construct(result_ty, variant, payload.as_deref())
            }
            ExprKind::StructLiteral { fields, .. } => {
                let result_ty = self.type_of(expr)?;
                self.emit_struct_literal(result_ty, fields)
            }
            ExprKind::ArrayLiteral(elements) => {
                let result_ty = self.type_of(expr)?;
                self.emit_array_literal(result_ty, elements)
            }
            ExprKind::ArrayRepeat { value, .. } => {
                let result_ty = self.type_of(expr)?;
                self.emit_array_repeat(result_ty, value)
            }
            ExprKind::TupleLiteral(elements) => {
                let result_ty = self.type_of(expr)?;
                self.emit_tuple_literal(result_ty, elements)
            }
            ExprKind::Index { base, index } => self.emit_index(base, index),
            ExprKind::Slice { base, start, end } => {
                self.emit_slice_expr(base, start.as_deref(), end.as_deref())
            }
        }
    }

    fn emit_float_literal(&mut self, value: f64) -> Result<Value, CodeGenError> {
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
        Ok(Value::Scalar(dst))
    }

    pub(super) fn alloc_float_reg(&mut self) -> Register {
        let (register, spill) = self.regs.allocate_float(&mut self.locals);
        if let Some(spill) = spill {
            self.emit(
                Instruction::new(
                    Opcode::Movsd,
                    vec![
                        Operand::mem(Register::RBP, spill.offset),
                        Operand::Register(spill.register),
                    ],
                )
                .with_comment("spill"),
            );
        }
        register
    }

    fn emit_identifier(&mut self, name: &str, expr: &Expr) -> Result<Value, CodeGenError> {
        let ty = self.type_of(expr)?;
        let local = self.locals.get(name).ok_or_else(|| {
            CodeGenError::Logic(format!(
                "analyzer violation: '{}' has no stack slot in {}",
                name, self.current_function
            ))
        })?;
        if self.is_aggregate(ty) {
            // Aggregates are passed by address: a parameter's slot holds
            // the caller's pointer, a local's slot holds the bytes inline.
            let dst = self.alloc_reg();
            let opcode = if local.is_parameter {
                Opcode::Mov
            } else {
                Opcode::Lea
            };
            self.emit(
                Instruction::new(
                    opcode,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, local.offset),
                    ],
                )
                .with_comment(name.to_string()),
            );
            Ok(Value::Address(dst))
        } else if matches!(self.universe.primitive_kind(ty), Some(k) if k.is_float()) {
            let dst = self.alloc_float_reg();
            self.emit_op(
                Opcode::Movsd,
                vec![
                    Operand::Register(dst),
                    Operand::mem(Register::RBP, local.offset),
                ],
            );
            Ok(Value::Scalar(dst))
        } else {
            let dst = self.alloc_reg();
            self.emit(
                Instruction::new(
                    Opcode::Mov,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, local.offset),
                    ],
                )
                .with_comment(name.to_string()),
            );
            Ok(Value::Scalar(dst))
        }
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        expr: &Expr,
    ) -> Result<Value, CodeGenError> {
        if op.is_logical() {
            return self.emit_short_circuit(op, lhs, rhs);
        }
        let operand_ty = self.type_of(lhs)?;
        let is_float = matches!(
            self.universe.primitive_kind(operand_ty),
            Some(k) if k.is_float()
        );
        let l = self.emit_expr(lhs)?.register();
        let r = self.emit_expr(rhs)?.register();

        if op.is_comparison() {
            let cmp_op = if is_float { Opcode::Ucomisd } else { Opcode::Cmp };
            self.emit_op(cmp_op, vec![Operand::Register(l), Operand::Register(r)]);
            self.regs.free(l);
            self.regs.free(r);
            let dst = self.alloc_reg();
            let keep = self.new_label(LabelKind::BranchTarget, "cmp_true");
            self.emit_op(
                Opcode::Mov,
                vec![Operand::Register(dst), Operand::Immediate(1)],
            );
            let jump = match op {
                BinaryOp::Eq => Opcode::Je,
                BinaryOp::Ne => Opcode::Jne,
                BinaryOp::Lt => Opcode::Jl,
                BinaryOp::Le => Opcode::Jle,
                BinaryOp::Gt => Opcode::Jg,
                BinaryOp::Ge => Opcode::Jge,
                _ => unreachable!("comparison checked above"),
            };
            self.emit_op(jump, vec![Operand::Label(keep.clone())]);
            self.emit_op(
                Opcode::Mov,
                vec![Operand::Register(dst), Operand::Immediate(0)],
            );
            self.place_label(&keep)?;
            return Ok(Value::Scalar(dst));
        }

        if is_float {
            let float_op = match op {
                BinaryOp::Add => Opcode::Addsd,
                BinaryOp::Sub => Opcode::Subsd,
                BinaryOp::Mul => Opcode::Mulsd,
                BinaryOp::Div => Opcode::Divsd,
                _ => {
                    return Err(CodeGenError::Logic(format!(
                        "operator '{}' has no float lowering",
                        op.symbol()
                    )))
                }
            };
            self.emit_op(float_op, vec![Operand::Register(l), Operand::Register(r)]);
            self.regs.free(r);
            return Ok(Value::Scalar(l));
        }

        match op {
            BinaryOp::Add => self.emit_op(Opcode::Add, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::Sub => self.emit_op(Opcode::Sub, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::Mul => self.emit_op(Opcode::Imul, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::Div | BinaryOp::Mod => {
                // Dividend in RAX sign-extended into RDX; quotient RAX,
                // remainder RDX.
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(Register::RAX), Operand::Register(l)],
                );
                self.emit_op(Opcode::Cqo, vec![]);
                self.emit_op(Opcode::Idiv, vec![Operand::Register(r)]);
                let src = if op == BinaryOp::Div {
                    Register::RAX
                } else {
                    Register::RDX
                };
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(l), Operand::Register(src)],
                );
            }
            BinaryOp::BitAnd => self.emit_op(Opcode::And, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::BitOr => self.emit_op(Opcode::Or, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::BitXor => self.emit_op(Opcode::Xor, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::Shl => self.emit_op(Opcode::Shl, vec![Operand::Register(l), Operand::Register(r)]),
            BinaryOp::Shr => self.emit_op(Opcode::Shr, vec![Operand::Register(l), Operand::Register(r)]),
            _ => {
                return Err(CodeGenError::Logic(format!(
                    "operator '{}' reached scalar lowering",
                    op.symbol()
                )))
            }
        }
        self.regs.free(r);
        Ok(Value::Scalar(l))
    }

    /// `&&` and `||` short-circuit through branch labels.
    fn emit_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, CodeGenError> {
        let short = self.new_label(LabelKind::BranchTarget, "logic_short");
        let end = self.new_label(LabelKind::BranchTarget, "logic_end");
        let dst = self.alloc_reg();

        let l = self.emit_expr(lhs)?.register();
        self.emit_op(Opcode::Cmp, vec![Operand::Register(l), Operand::Immediate(0)]);
        self.regs.free(l);
        let (short_jump, short_value) = match op {
            BinaryOp::And => (Opcode::Je, 0),
            BinaryOp::Or => (Opcode::Jne, 1),
            _ => unreachable!("logical checked by caller"),
        };
        self.emit_op(short_jump, vec![Operand::Label(short.clone())]);

        let r = self.emit_expr(rhs)?.register();
        self.emit_op(
            Opcode::Mov,
            vec![Operand::Register(dst), Operand::Register(r)],
        );
        self.regs.free(r);
        self.emit_op(Opcode::Jmp, vec![Operand::Label(end.clone())]);

        self.place_label(&short)?;
        self.emit_op(
            Opcode::Mov,
            vec![Operand::Register(dst), Operand::Immediate(short_value)],
        );
        self.place_label(&end)?;
        Ok(Value::Scalar(dst))
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Value, CodeGenError> {
        match op {
            UnaryOp::Neg => {
                let v = self.emit_expr(operand)?.register();
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(0)],
                );
                self.emit_op(
                    Opcode::Sub,
                    vec![Operand::Register(dst), Operand::Register(v)],
                );
                self.regs.free(v);
                Ok(Value::Scalar(dst))
            }
            UnaryOp::Not => {
                let v = self.emit_expr(operand)?.register();
                self.emit_op(Opcode::Xor, vec![Operand::Register(v), Operand::Immediate(1)]);
                Ok(Value::Scalar(v))
            }
            UnaryOp::Deref => {
                let ptr = self.emit_expr(operand)?.register();
                let operand_ty = self.type_of(operand)?;
                let pointee = match self.universe.kind(operand_ty) {
                    TypeKind::Pointer { pointee, .. } => *pointee,
                    _ => {
                        return Err(CodeGenError::Logic(
                            "analyzer violation: dereference of non-pointer".to_string(),
                        ))
                    }
                };
                if self.is_aggregate(pointee) {
                    Ok(Value::Address(ptr))
                } else {
                    let dst = self.alloc_reg();
                    self.emit_op(
                        Opcode::Mov,
                        vec![Operand::Register(dst), Operand::mem(ptr, 0)],
                    );
                    self.regs.free(ptr);
                    Ok(Value::Scalar(dst))
                }
            }
            UnaryOp::AddrOf { .. } => {
                let addr = self.emit_place_address(operand)?;
                Ok(Value::Scalar(addr))
            }
        }
    }

    /// Address of a place expression (assignment targets, address-of).
    pub(super) fn emit_place_address(&mut self, place: &Expr) -> Result<Register, CodeGenError> {
        match &place.kind {
            ExprKind::Identifier(name) => {
                let local = self.locals.get(name).ok_or_else(|| {
                    CodeGenError::Logic(format!("'{}' has no stack slot", name))
                })?;
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, local.offset),
                    ],
                );
                Ok(dst)
            }
            ExprKind::FieldAccess { object, field } => {
                let base = self.emit_expr(object)?.register();
                let recv_ty = self.receiver_type(object)?;
                let (offset, _) = self.field_slot(recv_ty, field)?;
                self.emit_op(
                    Opcode::Add,
                    vec![Operand::Register(base), Operand::Immediate(offset as i64)],
                );
                Ok(base)
            }
            ExprKind::Index { base, index } => {
                let (ptr, _len) = self.emit_indexable(base)?;
                let element = self.element_type(base)?;
                let idx = self.emit_expr(index)?.register();
                let elem_size = self.universe.size_of(element).max(1);
                self.emit_op(
                    Opcode::Imul,
                    vec![Operand::Register(idx), Operand::Immediate(elem_size as i64)],
                );
                self.emit_op(
                    Opcode::Add,
                    vec![Operand::Register(ptr), Operand::Register(idx)],
                );
                self.regs.free(idx);
                Ok(ptr)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => Ok(self.emit_expr(operand)?.register()),
            _ => Err(CodeGenError::Logic(
                "analyzer violation: assignment target is not a place expression".to_string(),
            )),
        }
    }

    fn emit_assignment(&mut self, target: &Expr, value: &Expr) -> Result<Value, CodeGenError> {
        let value_ty = self.type_of(value)?;
        let v = self.emit_expr(value)?;
        let addr = self.emit_place_address(target)?;
        if self.is_aggregate(value_ty) {
            let size = self.universe.size_of(value_ty);
            self.copy_aggregate(v.register(), addr, 0, size);
        } else {
            let mov = self.mov_for(value_ty);
            self.emit_op(
                mov,
                vec![Operand::mem(addr, 0), Operand::Register(v.register())],
            );
        }
        self.regs.free(addr);
        Ok(v)
    }

    /// Move opcode for a scalar of the given type.
    pub(super) fn mov_for(&self, ty: TypeId) -> Opcode {
        match self.universe.primitive_kind(ty) {
            Some(PrimitiveKind::F64) => Opcode::Movsd,
            Some(PrimitiveKind::F32) => Opcode::Movss,
            _ => Opcode::Mov,
        }
    }

    /// Copy `size` bytes from the address in `src` to `[dst + dst_off]`,
    /// in 8-byte chunks (layouts are 8-aligned; a short tail copies as one
    /// final chunk).
    pub(super) fn copy_aggregate(&mut self, src: Register, dst: Register, dst_off: i64, size: u64) {
        let scratch = self.alloc_reg();
        let mut offset: i64 = 0;
        let mut remaining = size;
        while remaining > 0 {
            self.emit_op(
                Opcode::Mov,
                vec![Operand::Register(scratch), Operand::mem(src, offset)],
            );
            self.emit_op(
                Opcode::Mov,
                vec![
                    Operand::mem(dst, dst_off + offset),
                    Operand::Register(scratch),
                ],
            );
            offset += 8;
            remaining = remaining.saturating_sub(8);
        }
        self.regs.free(scratch);
        self.regs.free(src);
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn emit_call_expr(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        expr: &Expr,
    ) -> Result<Value, CodeGenError> {
        match &callee.kind {
            ExprKind::Identifier(name) => self.emit_named_call(name, callee, args, expr),
            ExprKind::FieldAccess { object, field } => {
                if self.is_type_reference(object) {
                    let result_ty = self.type_of(expr)?;
                    return self.emit_enum_construct(result_ty, field, args.first());
                }
                self.emit_method_call(object, field, args, expr)
            }
            _ => Err(CodeGenError::Logic(
                "analyzer violation: call through a non-callable expression".to_string(),
            )),
        }
    }

    /// A field-access object that names a type rather than a value:
    /// an identifier with no stack slot whose annotation is the enum
    /// descriptor itself.
    fn is_type_reference(&self, object: &Expr) -> bool {
        match &object.kind {
            ExprKind::Identifier(name) => {
                self.locals.get(name).is_none()
                    && object
                        .type_info
                        .is_some_and(|ty| matches!(self.universe.kind(ty), TypeKind::Enum { .. }))
            }
            _ => false,
        }
    }

    fn emit_named_call(
        &mut self,
        name: &str,
        callee: &Expr,
        args: &[Expr],
        expr: &Expr,
    ) -> Result<Value, CodeGenError> {
        // Predeclared functions map to runtime entry points; `len` is an
        // open-coded load.
        if callee
            .type_info
            .is_some_and(|ty| matches!(self.universe.kind(ty), TypeKind::Builtin))
        {
            if name == "len" {
                return self.emit_len_call(&args[0]);
            }
            if name == "range" {
                return Err(CodeGenError::Logic(
                    "'range' is only iterable inside a for loop".to_string(),
                ));
            }
            let entry = runtime_entry(name).ok_or_else(|| {
                CodeGenError::Logic(format!("predeclared '{}' has no runtime entry", name))
            })?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(self.emit_expr(arg)?);
            }
            let result = self.emit_call(entry, values)?;
            return Ok(Value::Scalar(result));
        }

        let fn_ty = self.type_of(callee)?;
        let TypeKind::Function {
            is_extern,
            extern_name,
            ..
        } = self.universe.kind(fn_ty).clone()
        else {
            return Err(CodeGenError::Logic(format!("'{}' is not a function", name)));
        };
        let target = if is_extern {
            extern_name.unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.emit_expr(arg)?);
        }
        let result = self.emit_call(&target, values)?;
        let result_ty = self.type_of(expr)?;
        Ok(if self.is_aggregate(result_ty) {
            Value::Address(result)
        } else {
            Value::Scalar(result)
        })
    }

    /// `len(x)`: slices load their length word; arrays are compile-time.
    fn emit_len_call(&mut self, arg: &Expr) -> Result<Value, CodeGenError> {
        let arg_ty = self.type_of(arg)?;
        match self.universe.kind(arg_ty).clone() {
            TypeKind::Slice { .. } => {
                let descriptor = self.emit_expr(arg)?.register();
                let dst = self.alloc_reg();
                self.emit(
                    Instruction::new(
                        Opcode::Mov,
                        vec![Operand::Register(dst), Operand::mem(descriptor, 8)],
                    )
                    .with_comment("slice len"),
                );
                self.regs.free(descriptor);
                Ok(Value::Scalar(dst))
            }
            TypeKind::Array { length, .. } => {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::Immediate(length as i64)],
                );
                Ok(Value::Scalar(dst))
            }
            _ => Err(CodeGenError::Logic(
                "analyzer violation: 'len' of a non-indexable".to_string(),
            )),
        }
    }

    fn emit_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        expr: &Expr,
    ) -> Result<Value, CodeGenError> {
        let obj_ty = self.type_of(object)?;
        let recv_ty = match self.universe.kind(obj_ty) {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => obj_ty,
        };
        let target = self.method_symbol(recv_ty, method)?;
        let is_instance = self
            .universe
            .find_method(recv_ty, method)
            .is_some_and(|s| s.is_instance_method);

        let mut values = Vec::with_capacity(args.len() + 1);
        if is_instance {
            // The receiver's address is the implicit first argument.
            let receiver = self.emit_expr(object)?;
            values.push(receiver);
        }
        for arg in args {
            values.push(self.emit_expr(arg)?);
        }
        let result = self.emit_call(&target, values)?;
        let result_ty = self.type_of(expr)?;
        Ok(if self.is_aggregate(result_ty) {
            Value::Address(result)
        } else {
            Value::Scalar(result)
        })
    }

    /// Mangled symbol for a method on a struct or monomorphized instance,
    /// recording the specialization on first sight.
    pub(super) fn method_symbol(
        &mut self,
        recv_ty: TypeId,
        method: &str,
    ) -> Result<String, CodeGenError> {
        match self.universe.kind(recv_ty).clone() {
            TypeKind::Struct { name, .. } => Ok(super::program::mangle_method(&name, method)),
            TypeKind::GenericInstance { .. } => {
                let index = self.generics.record(self.universe, recv_ty).ok_or_else(|| {
                    CodeGenError::Logic("generic instance failed to register".to_string())
                })?;
                let prefix = self.generics.get(index).mangled_prefix.clone();
                Ok(format!("{}_{}", prefix, method))
            }
            _ => Err(CodeGenError::Logic(format!(
                "type '{}' has no method table",
                self.universe.name_of(recv_ty)
            ))),
        }
    }

    fn emit_associated_call(
        &mut self,
        type_name: &str,
        type_args: &[TypeExpr],
        func: &str,
        args: &[Expr],
    ) -> Result<Value, CodeGenError> {
        let base = self.struct_id_for(type_name).ok_or_else(|| {
            CodeGenError::Logic(format!("no struct descriptor for '{}'", type_name))
        })?;
        let target = if type_args.is_empty() {
            super::program::mangle_method(type_name, func)
        } else {
            let mut resolved = Vec::with_capacity(type_args.len());
            for te in type_args {
                resolved.push(self.resolve_type_for_codegen(te)?);
            }
            let instance = self.universe.instantiate(base, resolved).ok_or_else(|| {
                CodeGenError::Logic(format!("failed to instantiate '{}'", type_name))
            })?;
            self.method_symbol(instance, func)?
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.emit_expr(arg)?);
        }
        let result = self.emit_call(&target, values)?;
        Ok(Value::Scalar(result))
    }

    /// Type arguments in associated calls are re-resolved against the
    /// arena (primitives and named struct/enum descriptors).
    fn resolve_type_for_codegen(&mut self, te: &TypeExpr) -> Result<TypeId, CodeGenError> {
        match te {
            TypeExpr::Named { name, type_args } if type_args.is_empty() => {
                if let Some(kind) = PrimitiveKind::from_name(name) {
                    return Ok(self.universe.primitive(kind));
                }
                self.struct_id_for(name).ok_or_else(|| {
                    CodeGenError::Logic(format!("unknown type '{}' in type arguments", name))
                })
            }
            TypeExpr::Pointer { mutable, inner } => {
                let pointee = self.resolve_type_for_codegen(inner)?;
                Ok(self.universe.pointer_to(pointee, *mutable))
            }
            _ => Err(CodeGenError::Logic(
                "unsupported type argument shape in associated call".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Field, index, slice access
    // ------------------------------------------------------------------

    fn receiver_type(&mut self, object: &Expr) -> Result<TypeId, CodeGenError> {
        let obj_ty = self.type_of(object)?;
        Ok(match self.universe.kind(obj_ty) {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => obj_ty,
        })
    }

    /// Field offset and type within a struct or monomorphized instance.
    /// Instance offsets are recomputed with the substituted field types.
    pub(super) fn field_slot(
        &mut self,
        recv_ty: TypeId,
        field: &str,
    ) -> Result<(u64, TypeId), CodeGenError> {
        match self.universe.kind(recv_ty).clone() {
            TypeKind::Struct { fields, .. } => {
                // Under an active specialization the base layout's offsets
                // are wrong for substituted fields; recompute them.
                if self.subst.is_some() {
                    let mut offset = 0u64;
                    for f in &fields {
                        let concrete = self.concrete(f.ty);
                        let align = self.universe.align_of(concrete).max(1);
                        offset = offset.div_ceil(align) * align;
                        if f.name == field {
                            return Ok((offset, concrete));
                        }
                        offset += self.universe.size_of(concrete);
                    }
                    return Err(CodeGenError::Logic(format!("no field '{}'", field)));
                }
                fields
                    .iter()
                    .find(|f| f.name == field)
                    .map(|f| (f.offset, f.ty))
                    .ok_or_else(|| CodeGenError::Logic(format!("no field '{}'", field)))
            }
            TypeKind::GenericInstance { base, args } => {
                let TypeKind::Struct {
                    fields,
                    type_params,
                    ..
                } = self.universe.kind(base).clone()
                else {
                    return Err(CodeGenError::Logic("instance of a non-struct".to_string()));
                };
                let mut offset = 0u64;
                for f in &fields {
                    let concrete = self.universe.substitute(f.ty, &type_params, &args);
                    let align = self.universe.align_of(concrete).max(1);
                    offset = offset.div_ceil(align) * align;
                    if f.name == field {
                        return Ok((offset, concrete));
                    }
                    offset += self.universe.size_of(concrete);
                }
                Err(CodeGenError::Logic(format!("no field '{}'", field)))
            }
            _ => Err(CodeGenError::Logic(format!(
                "type '{}' has no fields",
                self.universe.name_of(recv_ty)
            ))),
        }
    }

    fn emit_field_access(
        &mut self,
        object: &Expr,
        field: &str,
        expr: &Expr,
    ) -> Result<Value, CodeGenError> {
        // `Option.None` and friends: a type name on the left constructs.
        if self.is_type_reference(object) {
            let result_ty = self.type_of(expr)?;
            return self.emit_enum_construct(result_ty, field, None);
        }

        let recv_ty = self.receiver_type(object)?;
        let base = self.emit_expr(object)?.register();

        // Slice length is the second descriptor word.
        if matches!(self.universe.kind(recv_ty), TypeKind::Slice { .. }) && field == "len" {
            let dst = self.alloc_reg();
            self.emit(
                Instruction::new(
                    Opcode::Mov,
                    vec![Operand::Register(dst), Operand::mem(base, 8)],
                )
                .with_comment("slice len"),
            );
            self.regs.free(base);
            return Ok(Value::Scalar(dst));
        }

        let (offset, field_ty) = self.field_slot(recv_ty, field)?;
        if self.is_aggregate(field_ty) {
            let dst = self.alloc_reg();
            self.emit_op(
                Opcode::Lea,
                vec![Operand::Register(dst), Operand::mem(base, offset as i64)],
            );
            self.regs.free(base);
            Ok(Value::Address(dst))
        } else {
            let dst = self.alloc_reg();
            let mov = self.mov_for(field_ty);
            self.emit(
                Instruction::new(
                    mov,
                    vec![Operand::Register(dst), Operand::mem(base, offset as i64)],
                )
                .with_comment(format!(".{}", field)),
            );
            self.regs.free(base);
            Ok(Value::Scalar(dst))
        }
    }

    fn element_type(&mut self, base: &Expr) -> Result<TypeId, CodeGenError> {
        let base_ty = self.type_of(base)?;
        match self.universe.kind(base_ty) {
            TypeKind::Slice { element, .. } | TypeKind::Array { element, .. } => Ok(*element),
            _ => Err(CodeGenError::Logic(
                "analyzer violation: indexing a non-indexable".to_string(),
            )),
        }
    }

    /// Lower an indexable base to (data pointer register, length operand).
    fn emit_indexable(&mut self, base: &Expr) -> Result<(Register, Operand), CodeGenError> {
        let base_ty = self.type_of(base)?;
        match self.universe.kind(base_ty).clone() {
            TypeKind::Array { length, .. } => {
                let addr = self.emit_expr(base)?.register();
                Ok((addr, Operand::Immediate(length as i64)))
            }
            TypeKind::Slice { .. } => {
                let descriptor = self.emit_expr(base)?.register();
                let len = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(len), Operand::mem(descriptor, 8)],
                );
                let ptr = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(ptr), Operand::mem(descriptor, 0)],
                );
                self.regs.free(descriptor);
                Ok((ptr, Operand::Register(len)))
            }
            _ => Err(CodeGenError::Logic(
                "analyzer violation: indexing a non-indexable".to_string(),
            )),
        }
    }

    fn emit_index(&mut self, base: &Expr, index: &Expr) -> Result<Value, CodeGenError> {
        let element = self.element_type(base)?;
        let (ptr, len) = self.emit_indexable(base)?;
        let idx = self.emit_expr(index)?.register();

        // Bounds check, trapping into the runtime on violation.
        let in_bounds = self.new_label(LabelKind::BranchTarget, "bounds_ok");
        self.emit_op(Opcode::Cmp, vec![Operand::Register(idx), len.clone()]);
        self.emit_op(Opcode::Jl, vec![Operand::Label(in_bounds.clone())]);
        self.emit_op(Opcode::Call, vec![Operand::Label(BOUNDS_TRAP.to_string())]);
        self.place_label(&in_bounds)?;
        if let Operand::Register(len_reg) = len {
            self.regs.free(len_reg);
        }

        let elem_size = self.universe.size_of(element).max(1);
        let result = if self.is_aggregate(element) {
            self.emit_op(
                Opcode::Imul,
                vec![Operand::Register(idx), Operand::Immediate(elem_size as i64)],
            );
            self.emit_op(
                Opcode::Add,
                vec![Operand::Register(ptr), Operand::Register(idx)],
            );
            self.regs.free(idx);
            Value::Address(ptr)
        } else if [1, 2, 4, 8].contains(&elem_size) {
            let dst = self.alloc_reg();
            self.emit_op(
                self.mov_for(element),
                vec![
                    Operand::Register(dst),
                    Operand::mem_indexed(ptr, idx, elem_size as u8, 0),
                ],
            );
            self.regs.free(ptr);
            self.regs.free(idx);
            Value::Scalar(dst)
        } else {
            self.emit_op(
                Opcode::Imul,
                vec![Operand::Register(idx), Operand::Immediate(elem_size as i64)],
            );
            self.emit_op(
                Opcode::Add,
                vec![Operand::Register(ptr), Operand::Register(idx)],
            );
            self.regs.free(idx);
            let dst = self.alloc_reg();
            self.emit_op(
                self.mov_for(element),
                vec![Operand::Register(dst), Operand::mem(ptr, 0)],
            );
            self.regs.free(ptr);
            Value::Scalar(dst)
        };
        Ok(result)
    }

    /// `a[start..end]` builds a fresh 16-byte `{ ptr, len }` descriptor on
    /// the stack and yields its address.
    fn emit_slice_expr(
        &mut self,
        base: &Expr,
        start: Option<&Expr>,
        end: Option<&Expr>,
    ) -> Result<Value, CodeGenError> {
        let element = self.element_type(base)?;
        let elem_size = self.universe.size_of(element).max(1);
        let (ptr, len) = self.emit_indexable(base)?;

        let start_reg = match start {
            Some(expr) => self.emit_expr(expr)?.register(),
            None => {
                let r = self.alloc_reg();
                self.emit_op(Opcode::Mov, vec![Operand::Register(r), Operand::Immediate(0)]);
                r
            }
        };
        let end_reg = match end {
            Some(expr) => self.emit_expr(expr)?.register(),
            None => {
                let r = self.alloc_reg();
                self.emit_op(Opcode::Mov, vec![Operand::Register(r), len.clone()]);
                r
            }
        };
        if let Operand::Register(len_reg) = len {
            self.regs.free(len_reg);
        }

        // new_ptr = ptr + start * elem_size; new_len = end - start
        let scaled = self.alloc_reg();
        self.emit_op(
            Opcode::Mov,
            vec![Operand::Register(scaled), Operand::Register(start_reg)],
        );
        self.emit_op(
            Opcode::Imul,
            vec![Operand::Register(scaled), Operand::Immediate(elem_size as i64)],
        );
        self.emit_op(
            Opcode::Add,
            vec![Operand::Register(ptr), Operand::Register(scaled)],
        );
        self.regs.free(scaled);
        self.emit_op(
            Opcode::Sub,
            vec![Operand::Register(end_reg), Operand::Register(start_reg)],
        );
        self.regs.free(start_reg);

        let slot = self.locals.allocate_anon(16, 8);
        self.emit(
            Instruction::new(
                Opcode::Mov,
                vec![
                    Operand::mem(Register::RBP, slot),
                    Operand::Register(ptr),
                ],
            )
            .with_comment("slice ptr"),
        );
        self.emit(
            Instruction::new(
                Opcode::Mov,
                vec![
                    Operand::mem(Register::RBP, slot + 8),
                    Operand::Register(end_reg),
                ],
            )
            .with_comment("slice len"),
        );
        self.regs.free(ptr);
        self.regs.free(end_reg);

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }

    // ------------------------------------------------------------------
    // Aggregate construction
    // ------------------------------------------------------------------

    /// Enum construction: `{ u32 tag; payload }` in a stack slot.
    pub(super) fn emit_enum_construct(
        &mut self,
        result_ty: TypeId,
        variant: &str,
        payload: Option<&Expr>,
    ) -> Result<Value, CodeGenError> {
        let (enum_id, _) = self.universe.as_enum(result_ty).ok_or_else(|| {
            CodeGenError::Logic(format!(
                "analyzer violation: '{}' is not an enum",
                self.universe.name_of(result_ty)
            ))
        })?;
        let discriminant = self
            .universe
            .variant_discriminant(enum_id, variant)
            .ok_or_else(|| {
                CodeGenError::Logic(format!("analyzer violation: no variant '{}'", variant))
            })?;
        if matches!(self.universe.kind(result_ty), TypeKind::GenericInstance { .. }) {
            self.generics.record(self.universe, result_ty);
        }

        let size = self.universe.size_of(result_ty).max(8);
        let slot = self.locals.allocate_anon(size, 8);
        self.emit(
            Instruction::new(
                Opcode::Mov,
                vec![
                    Operand::mem(Register::RBP, slot),
                    Operand::Immediate(i64::from(discriminant)),
                ],
            )
            .with_comment(format!("tag {}", variant)),
        );

        if let Some(payload) = payload {
            let payload_ty = self.type_of(payload)?;
            let value = self.emit_expr(payload)?;
            let payload_off = slot + ENUM_TAG_SIZE as i64;
            if self.is_aggregate(payload_ty) {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, payload_off),
                    ],
                );
                let size = self.universe.size_of(payload_ty);
                self.copy_aggregate(value.register(), dst, 0, size);
                self.regs.free(dst);
            } else {
                let mov = self.mov_for(payload_ty);
                self.emit(
                    Instruction::new(
                        mov,
                        vec![
                            Operand::mem(Register::RBP, payload_off),
                            Operand::Register(value.register()),
                        ],
                    )
                    .with_comment("payload"),
                );
                self.regs.free(value.register());
            }
        }

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }

    fn emit_struct_literal(
        &mut self,
        result_ty: TypeId,
        fields: &[(String, Expr)],
    ) -> Result<Value, CodeGenError> {
        if matches!(self.universe.kind(result_ty), TypeKind::GenericInstance { .. }) {
            self.generics.record(self.universe, result_ty);
        }
        let size = self.universe.size_of(result_ty).max(8);
        let align = self.universe.align_of(result_ty).max(8);
        let slot = self.locals.allocate_anon(size, align);

        for (name, value) in fields {
            let (offset, field_ty) = self.field_slot(result_ty, name)?;
            let v = self.emit_expr(value)?;
            let target_off = slot + offset as i64;
            if self.is_aggregate(field_ty) {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, target_off),
                    ],
                );
                let size = self.universe.size_of(field_ty);
                self.copy_aggregate(v.register(), dst, 0, size);
                self.regs.free(dst);
            } else {
                let mov = self.mov_for(field_ty);
                self.emit(
                    Instruction::new(
                        mov,
                        vec![
                            Operand::mem(Register::RBP, target_off),
                            Operand::Register(v.register()),
                        ],
                    )
                    .with_comment(format!(".{}", name)),
                );
                self.regs.free(v.register());
            }
        }

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }

    fn emit_array_literal(
        &mut self,
        result_ty: TypeId,
        elements: &[Expr],
    ) -> Result<Value, CodeGenError> {
        let element = match self.universe.kind(result_ty) {
            TypeKind::Array { element, .. } => *element,
            _ => {
                return Err(CodeGenError::Logic(
                    "analyzer violation: array literal without array type".to_string(),
                ))
            }
        };
        let elem_size = self.universe.size_of(element).max(1);
        let size = self.universe.size_of(result_ty).max(8);
        let align = self.universe.align_of(result_ty).max(8);
        let slot = self.locals.allocate_anon(size, align);

        for (i, elem) in elements.iter().enumerate() {
            let v = self.emit_expr(elem)?;
            let target_off = slot + (i as u64 * elem_size) as i64;
            if self.is_aggregate(element) {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, target_off),
                    ],
                );
                self.copy_aggregate(v.register(), dst, 0, elem_size);
                self.regs.free(dst);
            } else {
                let mov = self.mov_for(element);
                self.emit_op(
                    mov,
                    vec![
                        Operand::mem(Register::RBP, target_off),
                        Operand::Register(v.register()),
                    ],
                );
                self.regs.free(v.register());
            }
        }

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }

    fn emit_array_repeat(
        &mut self,
        result_ty: TypeId,
        value: &Expr,
    ) -> Result<Value, CodeGenError> {
        let (element, length) = match self.universe.kind(result_ty) {
            TypeKind::Array { element, length } => (*element, *length),
            _ => {
                return Err(CodeGenError::Logic(
                    "analyzer violation: repeat literal without array type".to_string(),
                ))
            }
        };
        let elem_size = self.universe.size_of(element).max(1);
        let size = self.universe.size_of(result_ty).max(8);
        let align = self.universe.align_of(result_ty).max(8);
        let slot = self.locals.allocate_anon(size, align);

        // Evaluate once, store `length` times.
        let v = self.emit_expr(value)?.register();
        let mov = self.mov_for(element);
        for i in 0..length {
            self.emit_op(
                mov,
                vec![
                    Operand::mem(Register::RBP, slot + (i * elem_size) as i64),
                    Operand::Register(v),
                ],
            );
        }
        self.regs.free(v);

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }

    fn emit_tuple_literal(
        &mut self,
        result_ty: TypeId,
        elements: &[Expr],
    ) -> Result<Value, CodeGenError> {
        let (element_types, offsets) = match self.universe.kind(result_ty) {
            TypeKind::Tuple { elements, offsets } => (elements.clone(), offsets.clone()),
            _ => {
                return Err(CodeGenError::Logic(
                    "analyzer violation: tuple literal without tuple type".to_string(),
                ))
            }
        };
        let size = self.universe.size_of(result_ty).max(8);
        let align = self.universe.align_of(result_ty).max(8);
        let slot = self.locals.allocate_anon(size, align);

        for ((elem, &elem_ty), &offset) in
            elements.iter().zip(element_types.iter()).zip(offsets.iter())
        {
            let v = self.emit_expr(elem)?;
            let target_off = slot + offset as i64;
            if self.is_aggregate(elem_ty) {
                let dst = self.alloc_reg();
                self.emit_op(
                    Opcode::Lea,
                    vec![
                        Operand::Register(dst),
                        Operand::mem(Register::RBP, target_off),
                    ],
                );
                let size = self.universe.size_of(elem_ty);
                self.copy_aggregate(v.register(), dst, 0, size);
                self.regs.free(dst);
            } else {
                let mov = self.mov_for(elem_ty);
                self.emit_op(
                    mov,
                    vec![
                        Operand::mem(Register::RBP, target_off),
                        Operand::Register(v.register()),
                    ],
                );
                self.regs.free(v.register());
            }
        }

        let dst = self.alloc_reg();
        self.emit_op(
            Opcode::Lea,
            vec![Operand::Register(dst), Operand::mem(Register::RBP, slot)],
        );
        Ok(Value::Address(dst))
    }
}
