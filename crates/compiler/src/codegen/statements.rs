//! Statement lowering
//!
//! Control flow is label-based: `if` branches to an else label, `for` over
//! `range` runs a counter against a limit, and break/continue jump to the
//! innermost loop's saved exit/continue labels.

use crate::ast::{Block, Expr, ExprKind, Stmt, StmtKind};

use super::labels::LabelKind;
use super::{CodeGen, CodeGenError, Instruction, Opcode, Operand, Register};

impl CodeGen<'_> {
    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match &stmt.kind {
            StmtKind::Let { name, value, .. } => self.emit_let(name, value),
            StmtKind::Expr(expr) => {
                let value = self.emit_expr(expr)?;
                self.regs.free(value.register());
                Ok(())
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => self.emit_if(cond, then_block, else_block.as_ref()),
            StmtKind::IfLet {
                pattern,
                value,
                then_block,
                else_block,
            } => self.emit_if_let(pattern, value, then_block, else_block.as_ref()),
            StmtKind::For { var, iter, body } => self.emit_for(var, iter, body),
            StmtKind::Return(value) => self.emit_return(value.as_ref()),
            StmtKind::Match { scrutinee, arms } => self.emit_match(scrutinee, arms),
            StmtKind::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .map(|(_, exit)| exit.clone())
                    .ok_or_else(|| {
                        CodeGenError::Logic("analyzer violation: break outside a loop".to_string())
                    })?;
                self.emit_op(Opcode::Jmp, vec![Operand::Label(target)]);
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .last()
                    .map(|(cont, _)| cont.clone())
                    .ok_or_else(|| {
                        CodeGenError::Logic(
                            "analyzer violation: continue outside a loop".to_string(),
                        )
                    })?;
                self.emit_op(Opcode::Jmp, vec![Operand::Label(target)]);
                Ok(())
            }
            StmtKind::Block(block) => self.emit_block(block),
        }
    }

    pub(super) fn emit_block(&mut self, block: &Block) -> Result<(), CodeGenError> {
        self.locals.enter_scope();
        for stmt in &block.stmts {
            self.emit_stmt(stmt)?;
        }
        self.locals.exit_scope();
        Ok(())
    }

    fn emit_let(&mut self, name: &str, value: &Expr) -> Result<(), CodeGenError> {
        let ty = self.type_of(value)?;
        let size = self.universe.size_of(ty).max(8);
        let align = self.universe.align_of(ty).max(8);
        let offset = self.locals.allocate(name, size, align, false);

        let v = self.emit_expr(value)?;
        if self.is_aggregate(ty) {
            let dst = self.alloc_reg();
            self.emit_op(
                Opcode::Lea,
                vec![
                    Operand::Register(dst),
                    Operand::mem(Register::RBP, offset),
                ],
            );
            self.copy_aggregate(v.register(), dst, 0, self.universe.size_of(ty));
            self.regs.free(dst);
        } else {
            let mov = self.mov_for(ty);
            self.emit(
                Instruction::new(
                    mov,
                    vec![
                        Operand::mem(Register::RBP, offset),
                        Operand::Register(v.register()),
                    ],
                )
                .with_comment(format!("let {}", name)),
            );
            self.regs.free(v.register());
        }
        Ok(())
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let else_label = self.new_label(LabelKind::BranchTarget, "else");
        let end_label = self.new_label(LabelKind::BranchTarget, "if_end");

        let c = self.emit_expr(cond)?.register();
        self.emit_op(Opcode::Cmp, vec![Operand::Register(c), Operand::Immediate(0)]);
        self.regs.free(c);
        self.emit_op(Opcode::Je, vec![Operand::Label(else_label.clone())]);

        self.emit_block(then_block)?;
        self.emit_op(Opcode::Jmp, vec![Operand::Label(end_label.clone())]);

        self.place_label(&else_label)?;
        if let Some(else_block) = else_block {
            self.emit_block(else_block)?;
        }
        self.place_label(&end_label)?;
        Ok(())
    }

    /// `if let` is a single-arm match with an else tail.
    fn emit_if_let(
        &mut self,
        pattern: &crate::ast::Pattern,
        value: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let else_label = self.new_label(LabelKind::BranchTarget, "iflet_else");
        let end_label = self.new_label(LabelKind::BranchTarget, "iflet_end");

        let scrutinee_ty = self.type_of(value)?;
        let scrutinee = self.emit_expr(value)?;
        self.emit_pattern_test(pattern, scrutinee, scrutinee_ty, &else_label)?;
        self.emit_pattern_bind(pattern, scrutinee, scrutinee_ty)?;
        self.regs.free(scrutinee.register());

        self.emit_block(then_block)?;
        self.emit_op(Opcode::Jmp, vec![Operand::Label(end_label.clone())]);

        self.place_label(&else_label)?;
        if let Some(else_block) = else_block {
            self.emit_block(else_block)?;
        }
        self.place_label(&end_label)?;
        Ok(())
    }

    /// `for v in range(..)`: counter in the variable's slot, limit parked
    /// in an anonymous slot, compare at the top, increment at the bottom.
    fn emit_for(&mut self, var: &str, iter: &Expr, body: &Block) -> Result<(), CodeGenError> {
        let ExprKind::Call { args, .. } = &iter.kind else {
            return Err(CodeGenError::Logic(
                "analyzer violation: for iterable is not a range call".to_string(),
            ));
        };

        let var_offset = self.locals.allocate(var, 8, 8, false);
        let limit_offset = self.locals.allocate_anon(8, 8);

        // range(n) counts 0..n; range(lo, hi) counts lo..hi.
        let (init, limit) = match args.len() {
            1 => (None, &args[0]),
            2 => (Some(&args[0]), &args[1]),
            _ => {
                return Err(CodeGenError::Logic(
                    "analyzer violation: range arity".to_string(),
                ))
            }
        };
        match init {
            Some(lo) => {
                let v = self.emit_expr(lo)?.register();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::mem(Register::RBP, var_offset), Operand::Register(v)],
                );
                self.regs.free(v);
            }
            None => {
                let zero = self.alloc_reg();
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(zero), Operand::Immediate(0)],
                );
                self.emit_op(
                    Opcode::Mov,
                    vec![
                        Operand::mem(Register::RBP, var_offset),
                        Operand::Register(zero),
                    ],
                );
                self.regs.free(zero);
            }
        }
        let limit_reg = self.emit_expr(limit)?.register();
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::mem(Register::RBP, limit_offset),
                Operand::Register(limit_reg),
            ],
        );
        self.regs.free(limit_reg);

        let top = self.new_label(LabelKind::LoopStart, "loop_start");
        let next = self.new_label(LabelKind::BranchTarget, "loop_next");
        let exit = self.new_label(LabelKind::LoopEnd, "loop_end");

        self.place_label(&top)?;
        let counter = self.alloc_reg();
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::Register(counter),
                Operand::mem(Register::RBP, var_offset),
            ],
        );
        let bound = self.alloc_reg();
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::Register(bound),
                Operand::mem(Register::RBP, limit_offset),
            ],
        );
        self.emit_op(
            Opcode::Cmp,
            vec![Operand::Register(counter), Operand::Register(bound)],
        );
        self.regs.free(counter);
        self.regs.free(bound);
        self.emit_op(Opcode::Jge, vec![Operand::Label(exit.clone())]);

        self.loop_stack.push((next.clone(), exit.clone()));
        self.emit_block(body)?;
        self.loop_stack.pop();

        self.place_label(&next)?;
        let bump = self.alloc_reg();
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::Register(bump),
                Operand::mem(Register::RBP, var_offset),
            ],
        );
        self.emit_op(Opcode::Inc, vec![Operand::Register(bump)]);
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::mem(Register::RBP, var_offset),
                Operand::Register(bump),
            ],
        );
        self.regs.free(bump);
        self.emit_op(Opcode::Jmp, vec![Operand::Label(top)]);

        self.place_label(&exit)?;
        Ok(())
    }

    /// Result lands in the ABI return register, then the epilogue runs.
    fn emit_return(&mut self, value: Option<&Expr>) -> Result<(), CodeGenError> {
        if let Some(expr) = value {
            let ty = self.type_of(expr)?;
            let v = self.emit_expr(expr)?.register();
            if matches!(self.universe.primitive_kind(ty), Some(k) if k.is_float()) {
                if v != Register::Xmm0 {
                    self.emit_op(
                        Opcode::Movsd,
                        vec![Operand::Register(Register::Xmm0), Operand::Register(v)],
                    );
                }
            } else if v != Register::RAX {
                self.emit_op(
                    Opcode::Mov,
                    vec![Operand::Register(Register::RAX), Operand::Register(v)],
                );
            }
            self.regs.free(v);
        }
        self.emit_epilogue();
        self.emit_op(Opcode::Ret, vec![]);
        Ok(())
    }

    /// Arm test/bind sequences come from the pattern lowering; this drives
    /// the arm chain and the shared end label.
    fn emit_match(
        &mut self,
        scrutinee: &Expr,
        arms: &[crate::ast::MatchArm],
    ) -> Result<(), CodeGenError> {
        let scrutinee_ty = self.type_of(scrutinee)?;
        let value = self.emit_expr(scrutinee)?;
        // The scrutinee value is parked for the duration of the match; each
        // arm reloads it from its slot so arm bodies can clobber registers.
        let slot = self.locals.allocate_anon(8, 8);
        self.emit_op(
            Opcode::Mov,
            vec![
                Operand::mem(Register::RBP, slot),
                Operand::Register(value.register()),
            ],
        );
        self.regs.free(value.register());

        let end_label = self.new_label(LabelKind::BranchTarget, "match_end");
        let aggregate = self.is_aggregate(scrutinee_ty);
        for arm in arms {
            let next_label = self.new_label(LabelKind::BranchTarget, "match_next");
            let reload = self.alloc_reg();
            self.emit_op(
                Opcode::Mov,
                vec![
                    Operand::Register(reload),
                    Operand::mem(Register::RBP, slot),
                ],
            );
            let scrutinee_value = if aggregate {
                super::Value::Address(reload)
            } else {
                super::Value::Scalar(reload)
            };
            self.emit_pattern_test(&arm.pattern, scrutinee_value, scrutinee_ty, &next_label)?;
            self.emit_pattern_bind(&arm.pattern, scrutinee_value, scrutinee_ty)?;
            self.regs.free(reload);
            self.emit_block(&arm.body)?;
            self.emit_op(Opcode::Jmp, vec![Operand::Label(end_label.clone())]);
            self.place_label(&next_label)?;
        }
        self.place_label(&end_label)?;
        Ok(())
    }
}
