//! Statement analysis
//!
//! Statements thread the expected type into their expressions: `let` uses
//! the declared annotation, `return` uses the enclosing function's return
//! type, and `if`/`if-let` conditions are checked against bool.

use crate::ast::{Block, Expr, ExprKind, MatchArm, PatternKind, Span, Stmt, StmtKind, TypeExpr};
use crate::diagnostics::ErrorCode;
use crate::symbols::{Symbol, SymbolKind};
use crate::types::{PrimitiveKind, TypeId, TypeKind};

use super::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// Analyze a block in a fresh lexical scope.
    pub(crate) fn analyze_block(&mut self, block: &mut Block) {
        self.scopes().enter_scope();
        for stmt in &mut block.stmts {
            self.analyze_stmt(stmt);
        }
        self.scopes().exit_scope();
    }

    fn analyze_stmt(&mut self, stmt: &mut Stmt) {
        let span = stmt.span.clone();
        match &mut stmt.kind {
            StmtKind::Let { name, ty, value } => {
                let name = name.clone();
                let ty = ty.clone();
                self.analyze_let(&name, ty.as_ref(), value, &span);
            }
            StmtKind::Expr(expr) => {
                self.analyze_expr(expr, None);
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_condition(cond);
                self.analyze_block(then_block);
                if let Some(else_block) = else_block {
                    self.analyze_block(else_block);
                }
            }
            StmtKind::IfLet {
                pattern,
                value,
                then_block,
                else_block,
            } => {
                // Desugared form of a single-arm match with an else tail:
                // pattern bindings are visible in the then block only.
                if let Some(scrutinee) = self.analyze_expr(value, None) {
                    self.scopes().enter_scope();
                    let pattern = pattern.clone();
                    self.analyze_pattern(&pattern, scrutinee);
                    for inner in &mut then_block.stmts {
                        self.analyze_stmt(inner);
                    }
                    self.scopes().exit_scope();
                }
                if let Some(else_block) = else_block {
                    self.analyze_block(else_block);
                }
            }
            StmtKind::For { var, iter, body } => {
                let var = var.clone();
                self.analyze_for(&var, iter, body, &span);
            }
            StmtKind::Return(value) => self.analyze_return(value.as_mut(), &span),
            StmtKind::Match { scrutinee, arms } => self.analyze_match(scrutinee, arms, &span),
            StmtKind::Break => {
                if !self.in_loop() {
                    self.error_at(
                        ErrorCode::InvalidOperation,
                        &span,
                        "'break' outside of a loop",
                    );
                }
            }
            StmtKind::Continue => {
                if !self.in_loop() {
                    self.error_at(
                        ErrorCode::InvalidOperation,
                        &span,
                        "'continue' outside of a loop",
                    );
                }
            }
            StmtKind::Block(block) => self.analyze_block(block),
        }
    }

    fn analyze_let(
        &mut self,
        name: &str,
        ty: Option<&TypeExpr>,
        value: &mut Expr,
        span: &Span,
    ) {
        let declared = ty.and_then(|te| self.resolve_type_expr(te, span));
        let value_ty = self.analyze_expr(value, declared);
        let binding_ty = match (declared, value_ty) {
            (Some(declared), Some(value_ty)) => {
                if !self.check_assignable(value, value_ty, declared) {
                    self.report_type_mismatch(&value.span, declared, value_ty);
                }
                Some(declared)
            }
            (Some(declared), None) => Some(declared),
            (None, Some(value_ty)) => Some(value_ty),
            (None, None) => None,
        };
        let symbol =
            Symbol::new(name, SymbolKind::Variable, binding_ty).with_span(span.clone());
        self.insert_symbol(symbol, span);
    }

    fn check_condition(&mut self, cond: &mut Expr) {
        let bool_ty = self.universe.primitive(PrimitiveKind::Bool);
        if let Some(ty) = self.analyze_expr(cond, Some(bool_ty))
            && !self.universe.is_bool(ty)
        {
            self.report_type_mismatch(&cond.span, bool_ty, ty);
        }
    }

    fn analyze_for(&mut self, var: &str, iter: &mut Expr, body: &mut Block, span: &Span) {
        // Only `range(n)` and `range(lo, hi)` iterate in this core.
        let is_range_call = matches!(
            &iter.kind,
            ExprKind::Call { callee, .. }
                if matches!(&callee.kind, ExprKind::Identifier(name)
                    if name == "range"
                        && self.lookup(name).is_some_and(|s| s.is_predeclared))
        );
        if !is_range_call {
            self.error_at(
                ErrorCode::UnsupportedOperation,
                span,
                "Only 'range(n)' and 'range(lo, hi)' can be iterated",
            );
            return;
        }
        if self.analyze_expr(iter, None).is_none() {
            return;
        }
        let var_ty = Self::range_element_type(iter)
            .unwrap_or_else(|| self.universe.primitive(PrimitiveKind::I64));

        self.scopes().enter_scope();
        let symbol = Symbol::new(var, SymbolKind::Variable, Some(var_ty)).with_span(span.clone());
        self.insert_symbol(symbol, span);
        self.enter_loop();
        for stmt in &mut body.stmts {
            self.analyze_stmt(stmt);
        }
        self.exit_loop();
        self.scopes().exit_scope();
    }

    /// The loop variable takes the type of the range bounds.
    fn range_element_type(iter: &Expr) -> Option<TypeId> {
        match &iter.kind {
            ExprKind::Call { args, .. } => args.first().and_then(|a| a.type_info),
            _ => None,
        }
    }

    fn analyze_return(&mut self, value: Option<&mut Expr>, span: &Span) {
        let Some(ret) = self.current_return_type() else {
            self.error_at(
                ErrorCode::InvalidOperation,
                span,
                "'return' outside of a function",
            );
            return;
        };
        match value {
            Some(expr) => {
                if let Some(ty) = self.analyze_expr(expr, Some(ret))
                    && !self.check_assignable(expr, ty, ret)
                {
                    self.report_type_mismatch(&expr.span, ret, ty);
                }
            }
            None => {
                if !self.universe.is_void(ret) {
                    let void = self.universe.primitive(PrimitiveKind::Void);
                    self.report_type_mismatch(span, ret, void);
                }
            }
        }
    }

    fn analyze_match(&mut self, scrutinee: &mut Expr, arms: &mut [MatchArm], span: &Span) {
        let Some(scrutinee_ty) = self.analyze_expr(scrutinee, None) else {
            return;
        };
        for arm in arms.iter_mut() {
            self.scopes().enter_scope();
            let pattern = arm.pattern.clone();
            self.analyze_pattern(&pattern, scrutinee_ty);
            for stmt in &mut arm.body.stmts {
                self.analyze_stmt(stmt);
            }
            self.scopes().exit_scope();
        }
        self.check_exhaustiveness(scrutinee_ty, arms, span);
    }

    /// A match on an enum scrutinee must cover every variant, either
    /// explicitly or with a wildcard/binding arm. Violations warn rather
    /// than error.
    fn check_exhaustiveness(&mut self, scrutinee_ty: TypeId, arms: &[MatchArm], span: &Span) {
        let Some((enum_id, _)) = self.universe.as_enum(scrutinee_ty) else {
            return;
        };
        let variants: Vec<String> = match self.universe.kind(enum_id) {
            TypeKind::Enum { variants, .. } => variants.iter().map(|v| v.name.clone()).collect(),
            _ => return,
        };
        let mut covered: Vec<&str> = Vec::new();
        for arm in arms {
            match &arm.pattern.kind {
                PatternKind::Wildcard | PatternKind::Identifier(_) => return,
                PatternKind::EnumVariant { variant, .. } => covered.push(variant),
                _ => {}
            }
        }
        let missing: Vec<&String> = variants
            .iter()
            .filter(|v| !covered.contains(&v.as_str()))
            .collect();
        if !missing.is_empty() {
            let enum_name = self.universe.name_of(enum_id);
            self.warn_at(
                ErrorCode::NonExhaustiveMatch,
                span,
                format!(
                    "Match on '{}' does not cover variant{} {}",
                    enum_name,
                    if missing.len() == 1 { "" } else { "s" },
                    missing
                        .iter()
                        .map(|m| format!("'{}'", m))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
        }
    }
}
