//! Expression analysis
//!
//! Every expression yields a type, stored on the node. The expected type is
//! passed as an explicit parameter for bidirectional inference: literals and
//! enum constructors take their types from the slot they flow into.

use crate::ast::{BinaryOp, Expr, ExprKind, Span, TypeExpr, UnaryOp};
use crate::diagnostics::{
    conversion_hint, suggest_similar_name, Confidence, Diagnostic, ErrorCode, Suggestion,
    SuggestionKind,
};
use crate::symbols::SymbolKind;
use crate::types::{PrimitiveKind, TypeId, TypeKind};

use super::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// Analyze one expression against an optional expected type.
    /// On success the node's `type_info` is set and the type returned;
    /// on failure a diagnostic has been reported.
    pub(crate) fn analyze_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        let span = expr.span.clone();
        let ty = match &mut expr.kind {
            ExprKind::IntLiteral { value, suffix } => {
                Some(self.int_literal_type(*value, *suffix, expected))
            }
            ExprKind::FloatLiteral { suffix, .. } => Some(self.float_literal_type(*suffix, expected)),
            ExprKind::StringLiteral(_) => Some(self.universe.primitive(PrimitiveKind::String)),
            ExprKind::CharLiteral(_) => Some(self.universe.primitive(PrimitiveKind::Char)),
            ExprKind::BoolLiteral(_) => Some(self.universe.primitive(PrimitiveKind::Bool)),
            ExprKind::Unit => Some(self.universe.primitive(PrimitiveKind::Void)),
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.analyze_identifier(&name, &span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.analyze_binary(op, lhs, rhs, &span, expected)
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                self.analyze_unary(op, operand, &span, expected)
            }
            ExprKind::Assignment { target, value } => self.analyze_assignment(target, value, &span),
            ExprKind::Call { callee, args } => self.analyze_call(callee, args, &span, expected),
            ExprKind::AssociatedCall {
                type_name,
                type_args,
                func,
                args,
            } => {
                let type_name = type_name.clone();
                let type_args = type_args.clone();
                let func = func.clone();
                self.analyze_associated_call(&type_name, &type_args, &func, args, &span)
            }
            ExprKind::FieldAccess { object, field } => {
                let field = field.clone();
                self.analyze_field_access(object, &field, &span, expected)
            }
            ExprKind::EnumVariant { variant, payload } => {
                let variant = variant.clone();
                self.analyze_bare_variant(&variant, payload.as_deref_mut(), &span, expected)
            }
            ExprKind::StructLiteral {
                name,
                type_args,
                fields,
            } => {
                let name = name.clone();
                let type_args = type_args.clone();
                self.analyze_struct_literal(&name, &type_args, fields, &span, expected)
            }
            ExprKind::ArrayLiteral(elements) => {
                self.analyze_array_literal(elements, &span, expected)
            }
            ExprKind::ArrayRepeat { value, count } => {
                self.analyze_array_repeat(value, count, &span, expected)
            }
            ExprKind::TupleLiteral(elements) => {
                self.analyze_tuple_literal(elements, &span, expected)
            }
            ExprKind::Index { base, index } => self.analyze_index(base, index, &span),
            ExprKind::Slice { base, start, end } => {
                self.analyze_slice_expr(base, start.as_deref_mut(), end.as_deref_mut(), &span)
            }
        }?;
        expr.type_info = Some(ty);
        Some(ty)
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    fn int_literal_type(
        &mut self,
        value: i64,
        suffix: Option<PrimitiveKind>,
        expected: Option<TypeId>,
    ) -> TypeId {
        if let Some(kind) = suffix {
            return self.universe.primitive(kind);
        }
        if let Some(expected) = expected
            && self.universe.is_integer(expected)
            && self.universe.literal_fits(i128::from(value), expected)
        {
            return expected;
        }
        self.universe.primitive(PrimitiveKind::I32)
    }

    fn float_literal_type(
        &mut self,
        suffix: Option<PrimitiveKind>,
        expected: Option<TypeId>,
    ) -> TypeId {
        if let Some(kind) = suffix {
            return self.universe.primitive(kind);
        }
        if let Some(expected) = expected
            && matches!(
                self.universe.primitive_kind(expected),
                Some(k) if k.is_float()
            )
        {
            return expected;
        }
        self.universe.primitive(PrimitiveKind::F64)
    }

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------

    fn analyze_identifier(&mut self, name: &str, span: &Span) -> Option<TypeId> {
        match self.lookup(name) {
            Some(symbol) => {
                let ty = symbol.ty;
                self.scopes().mark_used(name);
                if ty.is_none() {
                    self.error_at(
                        ErrorCode::InvalidExpression,
                        span,
                        format!("'{}' cannot be used as a value", name),
                    );
                }
                ty
            }
            None => {
                self.report_undefined(name, span);
                None
            }
        }
    }

    /// Undefined identifier, with a did-you-mean scan over visible names.
    pub(crate) fn report_undefined(&mut self, name: &str, span: &Span) {
        let candidates = {
            let scopes = self.scopes();
            scopes.visible_names()
        };
        let mut diagnostic = Diagnostic::error(
            ErrorCode::UndefinedSymbol,
            format!("Undefined symbol '{}'", name),
        )
        .with_span(span.clone());
        if let Some(similar) = suggest_similar_name(name, &candidates) {
            diagnostic = diagnostic.with_suggestion(Suggestion {
                kind: SuggestionKind::Replace,
                span: span.clone(),
                text: similar,
                confidence: Confidence::Medium,
                rationale: "Similar variable found in scope".to_string(),
            });
        }
        self.reporter.report(diagnostic);
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn analyze_binary(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        let bool_ty = self.universe.primitive(PrimitiveKind::Bool);
        if op.is_logical() {
            let lt = self.analyze_expr(lhs, Some(bool_ty));
            let rt = self.analyze_expr(rhs, Some(bool_ty));
            let (lt, rt) = (lt?, rt?);
            if !self.universe.is_bool(lt) || !self.universe.is_bool(rt) {
                self.error_at(
                    ErrorCode::InvalidOperation,
                    span,
                    format!("Operator '{}' requires bool operands", op.symbol()),
                );
                return None;
            }
            return Some(bool_ty);
        }

        // Arithmetic, comparison, and bitwise operators want both sides at
        // the same type, with integer literals widening into the typed side.
        let operand_expected = if op.is_comparison() { None } else { expected };
        let lt = self.analyze_expr(lhs, operand_expected)?;
        let rt = self.analyze_expr(rhs, Some(lt))?;
        let unified = self.unify_operands(lhs, lt, rhs, rt);
        let Some(unified) = unified else {
            self.error_at(
                ErrorCode::TypeMismatch,
                span,
                format!(
                    "Operator '{}' requires equal types, found '{}' and '{}'",
                    op.symbol(),
                    self.universe.name_of(lt),
                    self.universe.name_of(rt)
                ),
            );
            return None;
        };

        if op.is_comparison() {
            return Some(bool_ty);
        }
        if op.is_bitwise() {
            if !self.universe.is_integer(unified) {
                self.error_at(
                    ErrorCode::InvalidOperation,
                    span,
                    format!("Operator '{}' requires integer operands", op.symbol()),
                );
                return None;
            }
            return Some(unified);
        }
        // Arithmetic.
        if !self.universe.is_numeric(unified) {
            self.error_at(
                ErrorCode::InvalidOperation,
                span,
                format!(
                    "Operator '{}' requires numeric operands, found '{}'",
                    op.symbol(),
                    self.universe.name_of(unified)
                ),
            );
            return None;
        }
        Some(unified)
    }

    /// Unify two operand types, letting an unsuffixed integer literal take
    /// the other side's integer type when the value fits.
    fn unify_operands(
        &mut self,
        lhs: &mut Expr,
        lt: TypeId,
        rhs: &mut Expr,
        rt: TypeId,
    ) -> Option<TypeId> {
        if self.universe.types_equal(lt, rt) {
            return Some(lt);
        }
        if let Some(value) = Self::unsuffixed_int_value(lhs)
            && self.universe.is_integer(rt)
            && self.universe.literal_fits(value, rt)
        {
            lhs.type_info = Some(rt);
            return Some(rt);
        }
        if let Some(value) = Self::unsuffixed_int_value(rhs)
            && self.universe.is_integer(lt)
            && self.universe.literal_fits(value, lt)
        {
            rhs.type_info = Some(lt);
            return Some(lt);
        }
        None
    }

    fn unsuffixed_int_value(expr: &Expr) -> Option<i128> {
        match &expr.kind {
            ExprKind::IntLiteral {
                value,
                suffix: None,
            } => Some(i128::from(*value)),
            _ => None,
        }
    }

    fn analyze_unary(
        &mut self,
        op: UnaryOp,
        operand: &mut Expr,
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        match op {
            UnaryOp::Neg => {
                let ty = self.analyze_expr(operand, expected)?;
                if !self.universe.is_numeric(ty) {
                    self.error_at(
                        ErrorCode::InvalidOperation,
                        span,
                        format!("Cannot negate '{}'", self.universe.name_of(ty)),
                    );
                    return None;
                }
                Some(ty)
            }
            UnaryOp::Not => {
                let bool_ty = self.universe.primitive(PrimitiveKind::Bool);
                let ty = self.analyze_expr(operand, Some(bool_ty))?;
                if !self.universe.is_bool(ty) {
                    self.error_at(
                        ErrorCode::InvalidOperation,
                        span,
                        "Operator '!' requires a bool operand",
                    );
                    return None;
                }
                Some(bool_ty)
            }
            UnaryOp::Deref => {
                let ty = self.analyze_expr(operand, None)?;
                match self.universe.kind(ty) {
                    TypeKind::Pointer { pointee, .. } => Some(*pointee),
                    _ => {
                        self.error_at(
                            ErrorCode::InvalidOperation,
                            span,
                            format!("Cannot dereference '{}'", self.universe.name_of(ty)),
                        );
                        None
                    }
                }
            }
            UnaryOp::AddrOf { mutable } => {
                if !Self::is_place_expr(operand) {
                    self.error_at(
                        ErrorCode::InvalidExpression,
                        span,
                        "Can only take the address of a place expression",
                    );
                    return None;
                }
                let ty = self.analyze_expr(operand, None)?;
                Some(self.universe.pointer_to(ty, mutable))
            }
        }
    }

    /// Place expressions denote memory locations and may be assigned to.
    pub(crate) fn is_place_expr(expr: &Expr) -> bool {
        matches!(
            &expr.kind,
            ExprKind::Identifier(_)
                | ExprKind::FieldAccess { .. }
                | ExprKind::Index { .. }
                | ExprKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        )
    }

    fn analyze_assignment(
        &mut self,
        target: &mut Expr,
        value: &mut Expr,
        span: &Span,
    ) -> Option<TypeId> {
        if !Self::is_place_expr(target) {
            self.error_at(
                ErrorCode::InvalidExpression,
                span,
                "Left side of assignment must be a place expression \
                 (identifier, field access, index, or dereference)",
            );
            return None;
        }
        let target_ty = self.analyze_expr(target, None)?;
        let value_ty = self.analyze_expr(value, Some(target_ty))?;
        if !self.check_assignable(value, value_ty, target_ty) {
            self.report_type_mismatch(&value.span, target_ty, value_ty);
            return None;
        }
        Some(self.universe.primitive(PrimitiveKind::Void))
    }

    /// Assignability including the integer-literal widening rule.
    pub(crate) fn check_assignable(&mut self, value: &Expr, from: TypeId, to: TypeId) -> bool {
        if self.universe.is_assignable(from, to) {
            return true;
        }
        if let Some(v) = Self::unsuffixed_int_value(value)
            && self.universe.is_integer(to)
            && self.universe.literal_fits(v, to)
        {
            return true;
        }
        false
    }

    /// Report a type mismatch with conversion suggestions.
    pub(crate) fn report_type_mismatch(&mut self, span: &Span, expected: TypeId, found: TypeId) {
        let expected_name = self.universe.name_of(expected);
        let found_name = self.universe.name_of(found);
        let mut diagnostic = Diagnostic::error(
            ErrorCode::TypeMismatch,
            format!(
                "type mismatch: expected '{}', found '{}'",
                expected_name, found_name
            ),
        )
        .with_span(span.clone());
        if let Some((text, confidence, rationale)) = conversion_hint(&found_name, &expected_name) {
            diagnostic = diagnostic.with_suggestion(Suggestion {
                kind: SuggestionKind::Insert,
                span: span.clone(),
                text,
                confidence,
                rationale,
            });
        } else if self.universe.is_numeric(expected) && self.universe.is_numeric(found) {
            diagnostic = diagnostic.with_suggestion(Suggestion {
                kind: SuggestionKind::Insert,
                span: span.clone(),
                text: format!(" as {}", expected_name),
                confidence: Confidence::Low,
                rationale: "Explicit cast".to_string(),
            });
        }
        self.reporter.report(diagnostic);
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn analyze_call(
        &mut self,
        callee: &mut Expr,
        args: &mut [Expr],
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        match &mut callee.kind {
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.analyze_identifier_call(&name, callee, args, span)
            }
            ExprKind::FieldAccess { object, field } => {
                let field = field.clone();
                // `EnumName.Variant(x)` when the object names an enum type,
                // otherwise a method call on the object value.
                if let ExprKind::Identifier(obj_name) = &object.kind {
                    let obj_name = obj_name.clone();
                    if let Some(symbol) = self.lookup(&obj_name)
                        && symbol.kind == SymbolKind::Type
                    {
                        let type_id = symbol.ty?;
                        object.type_info = Some(type_id);
                        return self.analyze_enum_constructor(
                            &obj_name, type_id, &field, args, span, expected,
                        );
                    }
                }
                self.analyze_method_call(object, &field, args, span)
            }
            _ => {
                self.error_at(
                    ErrorCode::NotCallable,
                    span,
                    "This expression is not callable",
                );
                None
            }
        }
    }

    fn analyze_identifier_call(
        &mut self,
        name: &str,
        callee: &mut Expr,
        args: &mut [Expr],
        span: &Span,
    ) -> Option<TypeId> {
        let Some(symbol) = self.lookup(name).cloned() else {
            self.report_undefined(name, span);
            return None;
        };
        self.scopes().mark_used(name);

        if symbol.is_predeclared && symbol.kind == SymbolKind::Function {
            callee.type_info = Some(self.universe.builtin());
            return self.analyze_predeclared_call(name, args, span);
        }

        if symbol.kind != SymbolKind::Function {
            let hint = match symbol.kind {
                SymbolKind::Variable => {
                    let ty = symbol
                        .ty
                        .map(|t| self.universe.name_of(t))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    format!("'{}' is a variable of type '{}', not a function", name, ty)
                }
                SymbolKind::Type => format!(
                    "'{}' is a type; use '{}::function(...)' for associated functions",
                    name, name
                ),
                _ => format!("'{}' is not a function", name),
            };
            self.error_at(ErrorCode::NotCallable, span, hint);
            return None;
        }

        let fn_ty = symbol.ty?;
        callee.type_info = Some(fn_ty);
        self.check_call(name, fn_ty, args, span, None, false)
    }

    /// `len`, `range`, `log`, `panic`, and `args` have specialized
    /// signatures handled outside the ordinary function path.
    fn analyze_predeclared_call(
        &mut self,
        name: &str,
        args: &mut [Expr],
        span: &Span,
    ) -> Option<TypeId> {
        match name {
            "len" => {
                if args.len() != 1 {
                    self.arity_error("len", 1, args.len(), span);
                    return None;
                }
                let ty = self.analyze_expr(&mut args[0], None)?;
                match self.universe.kind(ty) {
                    TypeKind::Slice { .. } | TypeKind::Array { .. } => {
                        Some(self.universe.primitive(PrimitiveKind::Usize))
                    }
                    _ => {
                        self.error_at(
                            ErrorCode::InvalidArguments,
                            span,
                            format!(
                                "'len' expects a slice or array, got '{}'",
                                self.universe.name_of(ty)
                            ),
                        );
                        None
                    }
                }
            }
            "range" => {
                if args.is_empty() || args.len() > 2 {
                    self.error_at(
                        ErrorCode::InvalidArguments,
                        span,
                        format!("'range' expects 1 or 2 arguments, got {}", args.len()),
                    );
                    return None;
                }
                let i64_ty = self.universe.primitive(PrimitiveKind::I64);
                for arg in args.iter_mut() {
                    let ty = self.analyze_expr(arg, Some(i64_ty))?;
                    if !self.universe.is_integer(ty) {
                        self.error_at(
                            ErrorCode::InvalidArguments,
                            &arg.span,
                            format!(
                                "'range' bounds must be integers, got '{}'",
                                self.universe.name_of(ty)
                            ),
                        );
                        return None;
                    }
                }
                // Iterable marker; only `for` loops consume it.
                Some(self.universe.builtin())
            }
            "log" | "panic" => {
                if args.len() != 1 {
                    self.arity_error(name, 1, args.len(), span);
                    return None;
                }
                let string_ty = self.universe.primitive(PrimitiveKind::String);
                let ty = self.analyze_expr(&mut args[0], Some(string_ty))?;
                if !self.universe.types_equal(ty, string_ty) {
                    self.report_type_mismatch(&args[0].span, string_ty, ty);
                    return None;
                }
                Some(self.universe.primitive(PrimitiveKind::Void))
            }
            "args" => {
                if !args.is_empty() {
                    self.arity_error("args", 0, args.len(), span);
                    return None;
                }
                let string_ty = self.universe.primitive(PrimitiveKind::String);
                Some(self.universe.slice_of(string_ty, false))
            }
            _ => {
                self.error_at(
                    ErrorCode::Internal,
                    span,
                    format!("Predeclared function '{}' has no call rule", name),
                );
                None
            }
        }
    }

    pub(crate) fn arity_error(&mut self, name: &str, expected: usize, got: usize, span: &Span) {
        self.error_at(
            ErrorCode::InvalidArguments,
            span,
            format!(
                "Function '{}' expects {} argument{}, got {}",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                got
            ),
        );
    }

    /// Shared argument checking: exact arity (or at-least for variadic
    /// externs), each argument analyzed under the declared parameter type,
    /// mismatches reported with 1-based indices.
    fn check_call(
        &mut self,
        name: &str,
        fn_ty: TypeId,
        args: &mut [Expr],
        span: &Span,
        instance: Option<TypeId>,
        skip_self: bool,
    ) -> Option<TypeId> {
        let TypeKind::Function {
            params,
            ret,
            variadic_from,
            ..
        } = self.universe.kind(fn_ty).clone()
        else {
            self.error_at(
                ErrorCode::NotCallable,
                span,
                format!("'{}' is not callable", name),
            );
            return None;
        };

        let offset = usize::from(skip_self);
        let fixed = params.len() - offset;
        match variadic_from {
            Some(start) => {
                if args.len() < start {
                    self.error_at(
                        ErrorCode::InvalidArguments,
                        span,
                        format!(
                            "Function '{}' expects at least {} argument{}, got {}",
                            name,
                            start,
                            if start == 1 { "" } else { "s" },
                            args.len()
                        ),
                    );
                    return None;
                }
            }
            None => {
                if args.len() != fixed {
                    self.arity_error(name, fixed, args.len(), span);
                    return None;
                }
            }
        }

        let mut ok = true;
        for (i, arg) in args.iter_mut().enumerate() {
            let param_index = i + offset;
            if param_index < params.len() {
                let declared = params[param_index];
                let expected = match instance {
                    Some(inst) => self.substitute_for_instance(declared, inst),
                    None => declared,
                };
                let Some(arg_ty) = self.analyze_expr(arg, Some(expected)) else {
                    ok = false;
                    continue;
                };
                if !self.check_assignable(arg, arg_ty, expected) {
                    let expected_name = self.universe.name_of(expected);
                    let found_name = self.universe.name_of(arg_ty);
                    self.error_at(
                        ErrorCode::TypeMismatch,
                        &arg.span,
                        format!(
                            "Argument {} to '{}': expected '{}', found '{}'",
                            i + 1,
                            name,
                            expected_name,
                            found_name
                        ),
                    );
                    ok = false;
                }
            } else {
                // Extra variadic argument: must be FFI-expressible.
                let Some(arg_ty) = self.analyze_expr(arg, None) else {
                    ok = false;
                    continue;
                };
                if !self.universe.is_ffi_compatible(arg_ty) {
                    self.error_at(
                        ErrorCode::InvalidArguments,
                        &arg.span,
                        format!(
                            "Argument {} to variadic '{}': type '{}' cannot cross the FFI boundary",
                            i + 1,
                            name,
                            self.universe.name_of(arg_ty)
                        ),
                    );
                    ok = false;
                }
            }
        }
        if !ok {
            return None;
        }
        let ret = match instance {
            Some(inst) => self.substitute_for_instance(ret, inst),
            None => ret,
        };
        Some(ret)
    }

    fn analyze_method_call(
        &mut self,
        object: &mut Expr,
        method: &str,
        args: &mut [Expr],
        span: &Span,
    ) -> Option<TypeId> {
        let obj_ty = self.analyze_expr(object, None)?;
        // Receivers arrive by value or behind one pointer.
        let recv_ty = match self.universe.kind(obj_ty) {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => obj_ty,
        };
        let Some(symbol) = self.universe.find_method(recv_ty, method).cloned() else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                span,
                format!(
                    "Type '{}' has no method '{}'",
                    self.universe.name_of(recv_ty),
                    method
                ),
            );
            return None;
        };
        let fn_ty = symbol.ty?;
        let instance = match self.universe.kind(recv_ty) {
            TypeKind::GenericInstance { .. } => Some(recv_ty),
            _ => None,
        };
        self.check_call(method, fn_ty, args, span, instance, symbol.is_instance_method)
    }

    fn analyze_associated_call(
        &mut self,
        type_name: &str,
        type_args: &[TypeExpr],
        func: &str,
        args: &mut [Expr],
        span: &Span,
    ) -> Option<TypeId> {
        let Some(symbol) = self.lookup(type_name).cloned() else {
            self.report_undefined(type_name, span);
            return None;
        };
        if symbol.kind != SymbolKind::Type {
            self.error_at(
                ErrorCode::InvalidOperation,
                span,
                format!("'{}' is not a type", type_name),
            );
            return None;
        }
        let base = symbol.ty?;
        if matches!(self.universe.kind(base), TypeKind::Enum { .. }) {
            self.error_at(
                ErrorCode::InvalidOperation,
                span,
                format!(
                    "'::' is for struct-associated functions; construct enum variants with \
                     '{}.{}(...)'",
                    type_name, func
                ),
            );
            return None;
        }

        let instance = if type_args.is_empty() {
            None
        } else {
            let mut resolved = Vec::with_capacity(type_args.len());
            for arg in type_args {
                resolved.push(self.resolve_type_expr(arg, span)?);
            }
            match self.universe.instantiate(base, resolved) {
                Some(inst) => Some(inst),
                None => {
                    self.error_at(
                        ErrorCode::InvalidType,
                        span,
                        format!(
                            "Wrong number of type arguments for '{}' (expected {})",
                            type_name, symbol.generic_param_count
                        ),
                    );
                    return None;
                }
            }
        };

        let Some(method) = self.universe.find_method(base, func).cloned() else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                span,
                format!("No associated function '{}' on '{}'", func, type_name),
            );
            return None;
        };
        let fn_ty = method.ty?;
        self.check_call(func, fn_ty, args, span, instance, false)
    }

    // ------------------------------------------------------------------
    // Enum constructors
    // ------------------------------------------------------------------

    fn analyze_enum_constructor(
        &mut self,
        enum_name: &str,
        enum_id: TypeId,
        variant: &str,
        args: &mut [Expr],
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        if !matches!(self.universe.kind(enum_id), TypeKind::Enum { .. }) {
            self.error_at(
                ErrorCode::InvalidOperation,
                span,
                format!(
                    "'{}' is a struct; use '{}::{}(...)' for associated functions",
                    enum_name, enum_name, variant
                ),
            );
            return None;
        }
        if args.len() > 1 {
            self.error_at(
                ErrorCode::InvalidArguments,
                span,
                format!(
                    "Enum constructor '{}.{}' takes at most one value; use a tuple for more",
                    enum_name, variant
                ),
            );
            return None;
        }
        let Some(variant_info) = self.universe.find_variant(enum_id, variant).cloned() else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                span,
                format!("Enum '{}' has no variant '{}'", enum_name, variant),
            );
            return None;
        };

        match (&variant_info.payload, args.len()) {
            (Some(_), 0) => {
                self.error_at(
                    ErrorCode::InvalidArguments,
                    span,
                    format!("Variant '{}.{}' expects a value", enum_name, variant),
                );
                return None;
            }
            (None, 1) => {
                self.error_at(
                    ErrorCode::InvalidArguments,
                    span,
                    format!("Variant '{}.{}' takes no value", enum_name, variant),
                );
                return None;
            }
            _ => {}
        }

        let type_params = match self.universe.kind(enum_id) {
            TypeKind::Enum { type_params, .. } => type_params.clone(),
            _ => unreachable!("checked above"),
        };

        if type_params.is_empty() {
            if let Some(payload_ty) = variant_info.payload {
                let arg = &mut args[0];
                let arg_ty = self.analyze_expr(arg, Some(payload_ty))?;
                if !self.check_assignable(arg, arg_ty, payload_ty) {
                    self.report_type_mismatch(&arg.span, payload_ty, arg_ty);
                    return None;
                }
            }
            return Some(enum_id);
        }

        // Generic enum: instantiate from the expected type when it matches,
        // otherwise fall back to single-parameter inference from the value.
        if let Some(expected) = expected
            && let Some((base, type_args)) = self.universe.as_enum(expected)
            && self.universe.types_equal(base, enum_id)
        {
            if let Some(payload_ty) = variant_info.payload {
                let concrete = self
                    .universe
                    .substitute(payload_ty, &type_params, &type_args);
                let arg = &mut args[0];
                let arg_ty = self.analyze_expr(arg, Some(concrete))?;
                if !self.check_assignable(arg, arg_ty, concrete) {
                    self.report_type_mismatch(&arg.span, concrete, arg_ty);
                    return None;
                }
            }
            return Some(expected);
        }

        if type_params.len() == 1
            && variant_info.payload.is_some()
            && args.len() == 1
        {
            let arg_ty = self.analyze_expr(&mut args[0], None)?;
            return self.universe.instantiate(enum_id, vec![arg_ty]);
        }

        self.error_at(
            ErrorCode::TypeInferenceFailed,
            span,
            format!(
                "Cannot infer type arguments for '{}.{}'; annotate the expected type",
                enum_name, variant
            ),
        );
        None
    }

    fn analyze_bare_variant(
        &mut self,
        variant: &str,
        payload: Option<&mut Expr>,
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        let Some(expected) = expected else {
            self.error_at(
                ErrorCode::TypeInferenceFailed,
                span,
                format!(
                    "Cannot infer the enum for '.{}' without an expected type",
                    variant
                ),
            );
            return None;
        };
        let Some((enum_id, type_args)) = self.universe.as_enum(expected) else {
            self.error_at(
                ErrorCode::TypeInferenceFailed,
                span,
                format!(
                    "'.{}' needs an enum context, but the expected type is '{}'",
                    variant,
                    self.universe.name_of(expected)
                ),
            );
            return None;
        };
        let enum_name = self.universe.name_of(enum_id);
        let Some(variant_info) = self.universe.find_variant(enum_id, variant).cloned() else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                span,
                format!("Enum '{}' has no variant '{}'", enum_name, variant),
            );
            return None;
        };
        let type_params = match self.universe.kind(enum_id) {
            TypeKind::Enum { type_params, .. } => type_params.clone(),
            _ => return None,
        };
        match (variant_info.payload, payload) {
            (Some(payload_ty), Some(value)) => {
                let concrete = self
                    .universe
                    .substitute(payload_ty, &type_params, &type_args);
                let value_ty = self.analyze_expr(value, Some(concrete))?;
                if !self.check_assignable(value, value_ty, concrete) {
                    self.report_type_mismatch(&value.span, concrete, value_ty);
                    return None;
                }
            }
            (Some(_), None) => {
                self.error_at(
                    ErrorCode::InvalidArguments,
                    span,
                    format!("Variant '{}.{}' expects a value", enum_name, variant),
                );
                return None;
            }
            (None, Some(_)) => {
                self.error_at(
                    ErrorCode::InvalidArguments,
                    span,
                    format!("Variant '{}.{}' takes no value", enum_name, variant),
                );
                return None;
            }
            (None, None) => {}
        }
        Some(expected)
    }

    // ------------------------------------------------------------------
    // Field, index, slice access
    // ------------------------------------------------------------------

    fn analyze_field_access(
        &mut self,
        object: &mut Expr,
        field: &str,
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        // A type name on the left is a bare enum-variant reference
        // (`Option.None`) rather than a value field access.
        if let ExprKind::Identifier(name) = &object.kind {
            let name = name.clone();
            if let Some(symbol) = self.lookup(&name)
                && symbol.kind == SymbolKind::Type
            {
                let type_id = symbol.ty?;
                object.type_info = Some(type_id);
                return self.analyze_enum_constructor(&name, type_id, field, &mut [], span, expected);
            }
        }

        let obj_ty = self.analyze_expr(object, None)?;
        let recv_ty = match self.universe.kind(obj_ty) {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => obj_ty,
        };

        // `.len` on a slice is a recognized special form.
        if matches!(self.universe.kind(recv_ty), TypeKind::Slice { .. }) && field == "len" {
            return Some(self.universe.primitive(PrimitiveKind::Usize));
        }

        match self.universe.find_field(recv_ty, field) {
            Some(f) => {
                let field_ty = f.ty;
                let instance = match self.universe.kind(recv_ty) {
                    TypeKind::GenericInstance { .. } => Some(recv_ty),
                    _ => None,
                };
                Some(match instance {
                    Some(inst) => self.substitute_for_instance(field_ty, inst),
                    None => field_ty,
                })
            }
            None => {
                let field_names: Vec<String> = match self.universe.kind(recv_ty) {
                    TypeKind::Struct { fields, .. } => {
                        fields.iter().map(|f| f.name.clone()).collect()
                    }
                    TypeKind::GenericInstance { base, .. } => match self.universe.kind(*base) {
                        TypeKind::Struct { fields, .. } => {
                            fields.iter().map(|f| f.name.clone()).collect()
                        }
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                let mut diagnostic = Diagnostic::error(
                    ErrorCode::UndefinedSymbol,
                    format!(
                        "Type '{}' has no field '{}'",
                        self.universe.name_of(recv_ty),
                        field
                    ),
                )
                .with_span(span.clone());
                if let Some(similar) = suggest_similar_name(field, &field_names) {
                    diagnostic = diagnostic.with_suggestion(Suggestion {
                        kind: SuggestionKind::Replace,
                        span: span.clone(),
                        text: similar,
                        confidence: Confidence::Medium,
                        rationale: "Similar field found on this type".to_string(),
                    });
                }
                self.reporter.report(diagnostic);
                None
            }
        }
    }

    fn analyze_index(
        &mut self,
        base: &mut Expr,
        index: &mut Expr,
        span: &Span,
    ) -> Option<TypeId> {
        let base_ty = self.analyze_expr(base, None)?;
        let element = match self.universe.kind(base_ty) {
            TypeKind::Slice { element, .. } | TypeKind::Array { element, .. } => *element,
            _ => {
                self.error_at(
                    ErrorCode::InvalidOperation,
                    span,
                    format!(
                        "Cannot index '{}'; only slices and arrays are indexable",
                        self.universe.name_of(base_ty)
                    ),
                );
                return None;
            }
        };
        let usize_ty = self.universe.primitive(PrimitiveKind::Usize);
        let idx_ty = self.analyze_expr(index, Some(usize_ty))?;
        if !self.universe.is_integer(idx_ty) {
            self.error_at(
                ErrorCode::TypeMismatch,
                &index.span,
                format!(
                    "Index must be an integer, found '{}'",
                    self.universe.name_of(idx_ty)
                ),
            );
            return None;
        }
        Some(element)
    }

    fn analyze_slice_expr(
        &mut self,
        base: &mut Expr,
        start: Option<&mut Expr>,
        end: Option<&mut Expr>,
        span: &Span,
    ) -> Option<TypeId> {
        let base_ty = self.analyze_expr(base, None)?;
        let (element, mutable) = match self.universe.kind(base_ty) {
            TypeKind::Slice { element, mutable } => (*element, *mutable),
            TypeKind::Array { element, .. } => (*element, false),
            _ => {
                self.error_at(
                    ErrorCode::InvalidOperation,
                    span,
                    format!(
                        "Cannot slice '{}'; only slices and arrays can be sliced",
                        self.universe.name_of(base_ty)
                    ),
                );
                return None;
            }
        };
        let usize_ty = self.universe.primitive(PrimitiveKind::Usize);
        for bound in [start, end].into_iter().flatten() {
            let ty = self.analyze_expr(bound, Some(usize_ty))?;
            if !self.universe.is_integer(ty) {
                self.error_at(
                    ErrorCode::TypeMismatch,
                    &bound.span,
                    format!(
                        "Slice bounds must be integers, found '{}'",
                        self.universe.name_of(ty)
                    ),
                );
                return None;
            }
        }
        Some(self.universe.slice_of(element, mutable))
    }

    // ------------------------------------------------------------------
    // Composite literals
    // ------------------------------------------------------------------

    fn analyze_struct_literal(
        &mut self,
        name: &str,
        type_args: &[TypeExpr],
        fields: &mut [(String, Expr)],
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        let Some(symbol) = self.lookup(name).cloned() else {
            self.report_undefined(name, span);
            return None;
        };
        if symbol.kind != SymbolKind::Type {
            self.error_at(
                ErrorCode::InvalidExpression,
                span,
                format!("'{}' is not a struct type", name),
            );
            return None;
        }
        let base = symbol.ty?;
        let declared_fields = match self.universe.kind(base) {
            TypeKind::Struct { fields, .. } => fields.clone(),
            _ => {
                self.error_at(
                    ErrorCode::InvalidExpression,
                    span,
                    format!("'{}' is not a struct type", name),
                );
                return None;
            }
        };

        // Resolve the concrete type first: explicit args, the expected
        // type, or the plain struct when it is not generic.
        let result_ty = if !type_args.is_empty() {
            let mut resolved = Vec::with_capacity(type_args.len());
            for arg in type_args {
                resolved.push(self.resolve_type_expr(arg, span)?);
            }
            match self.universe.instantiate(base, resolved) {
                Some(inst) => inst,
                None => {
                    self.error_at(
                        ErrorCode::InvalidType,
                        span,
                        format!("Wrong number of type arguments for '{}'", name),
                    );
                    return None;
                }
            }
        } else if symbol.is_generic {
            match expected {
                Some(exp)
                    if matches!(
                        self.universe.kind(exp),
                        TypeKind::GenericInstance { base: b, .. } if self.universe.types_equal(*b, base)
                    ) =>
                {
                    exp
                }
                _ => {
                    self.error_at(
                        ErrorCode::TypeInferenceFailed,
                        span,
                        format!(
                            "Cannot infer type arguments for generic struct '{}'; \
                             write '{}::<...>' or annotate the expected type",
                            name, name
                        ),
                    );
                    return None;
                }
            }
        } else {
            base
        };
        let instance = match self.universe.kind(result_ty) {
            TypeKind::GenericInstance { .. } => Some(result_ty),
            _ => None,
        };

        let mut seen: Vec<String> = Vec::new();
        for (fname, value) in fields.iter_mut() {
            if seen.contains(fname) {
                self.error_at(
                    ErrorCode::InvalidExpression,
                    &value.span,
                    format!("Field '{}' given more than once", fname),
                );
                continue;
            }
            seen.push(fname.clone());
            let Some(decl) = declared_fields.iter().find(|f| f.name == *fname) else {
                self.error_at(
                    ErrorCode::UndefinedSymbol,
                    &value.span,
                    format!("Struct '{}' has no field '{}'", name, fname),
                );
                continue;
            };
            let declared_ty = decl.ty;
            let field_expected = match instance {
                Some(inst) => self.substitute_for_instance(declared_ty, inst),
                None => declared_ty,
            };
            if let Some(value_ty) = self.analyze_expr(value, Some(field_expected))
                && !self.check_assignable(value, value_ty, field_expected)
            {
                self.report_type_mismatch(&value.span, field_expected, value_ty);
            }
        }
        let missing: Vec<String> = declared_fields
            .iter()
            .filter(|f| !seen.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();
        if !missing.is_empty() {
            self.error_at(
                ErrorCode::InvalidArguments,
                span,
                format!(
                    "Missing field{} {} in struct literal '{}'",
                    if missing.len() == 1 { "" } else { "s" },
                    missing
                        .iter()
                        .map(|m| format!("'{}'", m))
                        .collect::<Vec<_>>()
                        .join(", "),
                    name
                ),
            );
            return None;
        }
        Some(result_ty)
    }

    fn analyze_array_literal(
        &mut self,
        elements: &mut [Expr],
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        if elements.is_empty() {
            self.error_at(
                ErrorCode::InvalidExpression,
                span,
                "Array literals need at least one element",
            );
            return None;
        }
        let elem_expected = expected.and_then(|exp| match self.universe.kind(exp) {
            TypeKind::Array { element, .. } | TypeKind::Slice { element, .. } => Some(*element),
            _ => None,
        });
        let mut iter = elements.iter_mut();
        let first = iter.next().expect("non-empty checked above");
        let elem_ty = self.analyze_expr(first, elem_expected)?;
        for elem in iter {
            let ty = self.analyze_expr(elem, Some(elem_ty))?;
            if !self.check_assignable(elem, ty, elem_ty) {
                self.report_type_mismatch(&elem.span, elem_ty, ty);
                return None;
            }
        }
        self.universe.array_of(elem_ty, elements.len() as u64)
    }

    fn analyze_array_repeat(
        &mut self,
        value: &mut Expr,
        count: &mut Expr,
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        let ExprKind::IntLiteral { value: n, .. } = count.kind else {
            self.error_at(
                ErrorCode::InvalidExpression,
                &count.span,
                "Repeat count must be a constant integer literal",
            );
            return None;
        };
        if n <= 0 {
            self.error_at(
                ErrorCode::InvalidType,
                span,
                "Array length must be at least 1",
            );
            return None;
        }
        let usize_ty = self.universe.primitive(PrimitiveKind::Usize);
        count.type_info = Some(usize_ty);
        let elem_expected = expected.and_then(|exp| match self.universe.kind(exp) {
            TypeKind::Array { element, .. } => Some(*element),
            _ => None,
        });
        let elem_ty = self.analyze_expr(value, elem_expected)?;
        self.universe.array_of(elem_ty, n as u64)
    }

    fn analyze_tuple_literal(
        &mut self,
        elements: &mut [Expr],
        span: &Span,
        expected: Option<TypeId>,
    ) -> Option<TypeId> {
        if elements.len() < 2 {
            self.error_at(
                ErrorCode::InvalidExpression,
                span,
                "Tuples need at least 2 elements",
            );
            return None;
        }
        let expected_elems: Option<Vec<TypeId>> = expected.and_then(|exp| {
            match self.universe.kind(exp) {
                TypeKind::Tuple { elements: tys, .. } if tys.len() == elements.len() => {
                    Some(tys.clone())
                }
                _ => None,
            }
        });
        let mut types = Vec::with_capacity(elements.len());
        for (i, elem) in elements.iter_mut().enumerate() {
            let elem_expected = expected_elems.as_ref().map(|tys| tys[i]);
            types.push(self.analyze_expr(elem, elem_expected)?);
        }
        self.universe.tuple_of(types)
    }
}
