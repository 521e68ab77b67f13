//! Pattern analysis
//!
//! Patterns are typed against the scrutinee: binders are declared in the
//! current (arm) scope with the subtypes extracted from the scrutinee's
//! type, and shape mismatches are reported where they occur.

use crate::ast::{LiteralPattern, Pattern, PatternKind};
use crate::diagnostics::ErrorCode;
use crate::symbols::{Symbol, SymbolKind};
use crate::types::{PrimitiveKind, TypeId, TypeKind};

use super::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// Type a pattern against the scrutinee, declaring its binders.
    /// Returns false when the pattern cannot match the scrutinee's type.
    pub(crate) fn analyze_pattern(&mut self, pattern: &Pattern, scrutinee: TypeId) -> bool {
        match &pattern.kind {
            PatternKind::Wildcard => true,
            PatternKind::Identifier(name) => {
                let symbol = Symbol::new(name, SymbolKind::Variable, Some(scrutinee))
                    .with_span(pattern.span.clone());
                self.insert_symbol(symbol, &pattern.span)
            }
            PatternKind::Literal(literal) => self.check_literal_pattern(literal, scrutinee, pattern),
            PatternKind::EnumVariant {
                enum_name,
                variant,
                binding,
            } => self.analyze_variant_pattern(
                enum_name.as_deref(),
                variant,
                binding.as_deref(),
                scrutinee,
                pattern,
            ),
            PatternKind::Struct { name, fields } => {
                self.analyze_struct_pattern(name, fields, scrutinee, pattern)
            }
            PatternKind::Tuple(elements) => {
                self.analyze_tuple_pattern(elements, scrutinee, pattern)
            }
        }
    }

    fn check_literal_pattern(
        &mut self,
        literal: &LiteralPattern,
        scrutinee: TypeId,
        pattern: &Pattern,
    ) -> bool {
        let matches_ty = match literal {
            LiteralPattern::Int(value) => {
                self.universe.is_integer(scrutinee)
                    && self.universe.literal_fits(i128::from(*value), scrutinee)
            }
            LiteralPattern::Float(_) => matches!(
                self.universe.primitive_kind(scrutinee),
                Some(k) if k.is_float()
            ),
            LiteralPattern::String(_) => matches!(
                self.universe.primitive_kind(scrutinee),
                Some(PrimitiveKind::String)
            ),
            LiteralPattern::Bool(_) => self.universe.is_bool(scrutinee),
            LiteralPattern::Char(_) => matches!(
                self.universe.primitive_kind(scrutinee),
                Some(PrimitiveKind::Char)
            ),
        };
        if !matches_ty {
            self.error_at(
                ErrorCode::TypeMismatch,
                &pattern.span,
                format!(
                    "Literal pattern does not match scrutinee type '{}'",
                    self.universe.name_of(scrutinee)
                ),
            );
        }
        matches_ty
    }

    fn analyze_variant_pattern(
        &mut self,
        enum_name: Option<&str>,
        variant: &str,
        binding: Option<&Pattern>,
        scrutinee: TypeId,
        pattern: &Pattern,
    ) -> bool {
        let Some((enum_id, type_args)) = self.universe.as_enum(scrutinee) else {
            self.error_at(
                ErrorCode::TypeMismatch,
                &pattern.span,
                format!(
                    "Variant pattern needs an enum scrutinee, found '{}'",
                    self.universe.name_of(scrutinee)
                ),
            );
            return false;
        };
        let scrutinee_enum = self.universe.name_of(enum_id);
        if let Some(named) = enum_name
            && named != scrutinee_enum
        {
            self.error_at(
                ErrorCode::TypeMismatch,
                &pattern.span,
                format!(
                    "Pattern names enum '{}' but the scrutinee is '{}'",
                    named, scrutinee_enum
                ),
            );
            return false;
        }
        let Some(variant_info) = self.universe.find_variant(enum_id, variant).cloned() else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                &pattern.span,
                format!("Enum '{}' has no variant '{}'", scrutinee_enum, variant),
            );
            return false;
        };
        let type_params = match self.universe.kind(enum_id) {
            TypeKind::Enum { type_params, .. } => type_params.clone(),
            _ => return false,
        };
        match (variant_info.payload, binding) {
            (Some(payload_ty), Some(sub)) => {
                let concrete = if type_params.is_empty() {
                    payload_ty
                } else {
                    self.universe.substitute(payload_ty, &type_params, &type_args)
                };
                self.analyze_pattern(sub, concrete)
            }
            (Some(_), None) => true, // payload ignored
            (None, Some(_)) => {
                self.error_at(
                    ErrorCode::InvalidArguments,
                    &pattern.span,
                    format!(
                        "Variant '{}.{}' carries no value to bind",
                        scrutinee_enum, variant
                    ),
                );
                false
            }
            (None, None) => true,
        }
    }

    fn analyze_struct_pattern(
        &mut self,
        name: &str,
        fields: &[(String, Pattern)],
        scrutinee: TypeId,
        pattern: &Pattern,
    ) -> bool {
        let struct_name = self.universe.name_of(scrutinee);
        let matches_struct = match self.universe.kind(scrutinee) {
            TypeKind::Struct { name: n, .. } => n == name,
            TypeKind::GenericInstance { base, .. } => {
                matches!(self.universe.kind(*base), TypeKind::Struct { name: n, .. } if n == name)
            }
            _ => false,
        };
        if !matches_struct {
            self.error_at(
                ErrorCode::TypeMismatch,
                &pattern.span,
                format!(
                    "Struct pattern '{}' does not match scrutinee type '{}'",
                    name, struct_name
                ),
            );
            return false;
        }
        let mut ok = true;
        for (fname, sub) in fields {
            let Some(field) = self.universe.find_field(scrutinee, fname).cloned() else {
                self.error_at(
                    ErrorCode::UndefinedSymbol,
                    &sub.span,
                    format!("Struct '{}' has no field '{}'", name, fname),
                );
                ok = false;
                continue;
            };
            let field_ty = match self.universe.kind(scrutinee) {
                TypeKind::GenericInstance { .. } => {
                    self.substitute_for_instance(field.ty, scrutinee)
                }
                _ => field.ty,
            };
            ok &= self.analyze_pattern(sub, field_ty);
        }
        ok
    }

    fn analyze_tuple_pattern(
        &mut self,
        elements: &[Pattern],
        scrutinee: TypeId,
        pattern: &Pattern,
    ) -> bool {
        let element_types = match self.universe.kind(scrutinee) {
            TypeKind::Tuple { elements: tys, .. } => tys.clone(),
            _ => {
                self.error_at(
                    ErrorCode::TypeMismatch,
                    &pattern.span,
                    format!(
                        "Tuple pattern does not match scrutinee type '{}'",
                        self.universe.name_of(scrutinee)
                    ),
                );
                return false;
            }
        };
        if elements.len() != element_types.len() {
            self.error_at(
                ErrorCode::TypeMismatch,
                &pattern.span,
                format!(
                    "Tuple pattern has {} elements but the scrutinee has {}",
                    elements.len(),
                    element_types.len()
                ),
            );
            return false;
        }
        let mut ok = true;
        for (sub, &ty) in elements.iter().zip(element_types.iter()) {
            ok &= self.analyze_pattern(sub, ty);
        }
        ok
    }
}
