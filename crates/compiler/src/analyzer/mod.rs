//! Semantic analysis for Asthra
//!
//! Drives a pre-order walk over the AST, resolving names, checking types,
//! and annotating every successfully-typed expression with its [`TypeId`].
//! Declarations are processed in two phases so that type references may be
//! forward within a module: first all type names are gathered, then bodies
//! are analyzed in source order. A failure in one declaration does not
//! abort its siblings; the analyzer surfaces as many errors as it can.

mod decls;
mod exprs;
mod patterns;
mod stmts;

use crate::ast::{Program, Span, TypeExpr};
use crate::diagnostics::{Diagnostic, DiagnosticReporter, ErrorCode};
use crate::symbols::{InsertError, ScopeStack, Symbol, SymbolKind};
use crate::types::{PrimitiveKind, TypeId, TypeKind, TypeUniverse};

/// Names bound in the root scope before any user declaration.
pub const PREDECLARED_FUNCTIONS: &[&str] = &["len", "range", "log", "panic", "args"];

/// The analyzer: owns the type universe, the scope stack, and the
/// diagnostic sink for one compilation unit.
pub struct SemanticAnalyzer {
    pub universe: TypeUniverse,
    pub reporter: DiagnosticReporter,
    /// Declared signatures of free functions and externs, handed to the
    /// code generator (scopes are torn down when analysis finishes).
    pub function_types: std::collections::HashMap<String, TypeId>,
    scopes: ScopeStack,
    /// Return type of the function whose body is being analyzed.
    current_return: Option<TypeId>,
    /// Nesting depth of `for` loops, for break/continue validation.
    loop_depth: usize,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let mut universe = TypeUniverse::new();
        let mut scopes = ScopeStack::new();

        let builtin = universe.builtin();
        for name in PREDECLARED_FUNCTIONS {
            scopes.insert_root(Symbol::predeclared(
                *name,
                SymbolKind::Function,
                Some(builtin),
            ));
        }

        // Intrinsic generic enums.
        let mut option_sym =
            Symbol::predeclared("Option", SymbolKind::Type, Some(universe.option_enum()));
        option_sym.is_generic = true;
        option_sym.generic_param_count = 1;
        scopes.insert_root(option_sym);

        let mut result_sym =
            Symbol::predeclared("Result", SymbolKind::Type, Some(universe.result_enum()));
        result_sym.is_generic = true;
        result_sym.generic_param_count = 2;
        scopes.insert_root(result_sym);

        SemanticAnalyzer {
            universe,
            reporter: DiagnosticReporter::new(),
            function_types: std::collections::HashMap::new(),
            scopes,
            current_return: None,
            loop_depth: 0,
        }
    }

    /// Analyze a whole program. Returns true when no errors were reported.
    ///
    /// Phase 1 gathers declaration headers (type stubs, then type bodies,
    /// then function signatures); phase 2 analyzes function bodies. Both
    /// phases visit declarations in source order.
    pub fn analyze_program(&mut self, program: &mut Program) -> bool {
        self.declare_type_stubs(program);
        self.resolve_type_decls(program);
        self.declare_value_decls(program);
        self.analyze_bodies(program);
        !self.reporter.has_errors()
    }

    // ------------------------------------------------------------------
    // Diagnostic helpers
    // ------------------------------------------------------------------

    pub(crate) fn error_at(&mut self, code: ErrorCode, span: &Span, message: impl Into<String>) {
        self.reporter
            .report(Diagnostic::error(code, message).with_span(span.clone()));
    }

    pub(crate) fn warn_at(&mut self, code: ErrorCode, span: &Span, message: impl Into<String>) {
        self.reporter
            .report(Diagnostic::warning(code, message).with_span(span.clone()));
    }

    pub(crate) fn note_at(&mut self, code: ErrorCode, span: &Span, message: impl Into<String>) {
        self.reporter
            .report(Diagnostic::note(code, message).with_span(span.clone()));
    }

    // ------------------------------------------------------------------
    // Scope helpers
    // ------------------------------------------------------------------

    pub(crate) fn scopes(&mut self) -> &mut ScopeStack {
        &mut self.scopes
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.lookup(name)
    }

    /// Insert into the current scope, reporting a DuplicateSymbol error on
    /// collision with a non-predeclared name.
    pub(crate) fn insert_symbol(&mut self, symbol: Symbol, span: &Span) -> bool {
        let name = symbol.name.clone();
        match self.scopes.insert_safe(symbol) {
            Ok(()) => true,
            Err(InsertError::Duplicate { existing_span }) => {
                let mut diagnostic = Diagnostic::error(
                    ErrorCode::DuplicateSymbol,
                    format!("Symbol '{}' is already defined in this scope", name),
                )
                .with_span(span.clone());
                if let Some(previous) = existing_span {
                    diagnostic = diagnostic.with_labeled_span(previous, "previously defined here");
                }
                self.reporter.report(diagnostic);
                false
            }
        }
    }

    pub(crate) fn current_return_type(&self) -> Option<TypeId> {
        self.current_return
    }

    pub(crate) fn set_current_return(&mut self, ret: Option<TypeId>) -> Option<TypeId> {
        std::mem::replace(&mut self.current_return, ret)
    }

    pub(crate) fn enter_loop(&mut self) {
        self.loop_depth += 1;
    }

    pub(crate) fn exit_loop(&mut self) {
        self.loop_depth -= 1;
    }

    pub(crate) fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    // ------------------------------------------------------------------
    // Type expression resolution
    // ------------------------------------------------------------------

    /// Resolve a syntactic type annotation to a [`TypeId`], reporting a
    /// diagnostic and returning None on failure.
    pub(crate) fn resolve_type_expr(&mut self, te: &TypeExpr, span: &Span) -> Option<TypeId> {
        match te {
            TypeExpr::Named { name, type_args } => self.resolve_named_type(name, type_args, span),
            TypeExpr::Pointer { mutable, inner } => {
                let pointee = self.resolve_type_expr(inner, span)?;
                Some(self.universe.pointer_to(pointee, *mutable))
            }
            TypeExpr::Slice { mutable, inner } => {
                let element = self.resolve_type_expr(inner, span)?;
                Some(self.universe.slice_of(element, *mutable))
            }
            TypeExpr::Array { inner, length } => {
                let element = self.resolve_type_expr(inner, span)?;
                match self.universe.array_of(element, *length) {
                    Some(id) => Some(id),
                    None => {
                        self.error_at(
                            ErrorCode::InvalidType,
                            span,
                            "Array length must be at least 1",
                        );
                        None
                    }
                }
            }
            TypeExpr::Tuple(elements) => {
                let mut resolved = Vec::with_capacity(elements.len());
                for elem in elements {
                    resolved.push(self.resolve_type_expr(elem, span)?);
                }
                match self.universe.tuple_of(resolved) {
                    Some(id) => Some(id),
                    None => {
                        self.error_at(
                            ErrorCode::InvalidType,
                            span,
                            "Tuple types need at least 2 elements",
                        );
                        None
                    }
                }
            }
        }
    }

    fn resolve_named_type(
        &mut self,
        name: &str,
        type_args: &[TypeExpr],
        span: &Span,
    ) -> Option<TypeId> {
        if let Some(kind) = PrimitiveKind::from_name(name) {
            if !type_args.is_empty() {
                self.error_at(
                    ErrorCode::InvalidType,
                    span,
                    format!("Primitive type '{}' takes no type arguments", name),
                );
                return None;
            }
            return Some(self.universe.primitive(kind));
        }

        // `Result<T, E>` spells the built-in sugar.
        if name == "Result" && type_args.len() == 2 {
            let ok = self.resolve_type_expr(&type_args[0], span)?;
            let err = self.resolve_type_expr(&type_args[1], span)?;
            return Some(self.universe.result_of(ok, err));
        }

        let Some(symbol) = self.lookup(name) else {
            self.error_at(
                ErrorCode::UndefinedSymbol,
                span,
                format!("Undefined type '{}'", name),
            );
            return None;
        };
        if !matches!(symbol.kind, SymbolKind::Type | SymbolKind::TypeParameter) {
            let found = symbol.kind;
            self.error_at(
                ErrorCode::InvalidType,
                span,
                format!("'{}' is not a type (found {:?})", name, found),
            );
            return None;
        }
        let base = symbol.ty?;
        let is_generic = symbol.is_generic;
        let param_count = symbol.generic_param_count;

        if type_args.is_empty() {
            if is_generic {
                self.error_at(
                    ErrorCode::InvalidType,
                    span,
                    format!(
                        "Generic type '{}' requires {} type argument(s)",
                        name, param_count
                    ),
                );
                return None;
            }
            return Some(base);
        }

        if !is_generic {
            self.error_at(
                ErrorCode::InvalidType,
                span,
                format!("Type '{}' takes no type arguments", name),
            );
            return None;
        }
        let mut args = Vec::with_capacity(type_args.len());
        for arg in type_args {
            args.push(self.resolve_type_expr(arg, span)?);
        }
        match self.universe.instantiate(base, args) {
            Some(id) => Some(id),
            None => {
                self.error_at(
                    ErrorCode::InvalidType,
                    span,
                    format!(
                        "Wrong number of type arguments for '{}': expected {}, got {}",
                        name,
                        param_count,
                        type_args.len()
                    ),
                );
                None
            }
        }
    }

    /// Substitute a generic struct instance's arguments through a member
    /// type (field or method parameter/return).
    pub(crate) fn substitute_for_instance(&mut self, member_ty: TypeId, instance: TypeId) -> TypeId {
        let TypeKind::GenericInstance { base, args } = self.universe.kind(instance).clone() else {
            return member_ty;
        };
        let params = match self.universe.kind(base) {
            TypeKind::Struct { type_params, .. } | TypeKind::Enum { type_params, .. } => {
                type_params.clone()
            }
            _ => return member_ty,
        };
        self.universe.substitute(member_ty, &params, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeExpr;

    #[test]
    fn test_predeclared_names_bound() {
        let analyzer = SemanticAnalyzer::new();
        for name in PREDECLARED_FUNCTIONS {
            let sym = analyzer.lookup(name).expect("predeclared symbol missing");
            assert!(sym.is_predeclared);
        }
        assert!(analyzer.lookup("Option").unwrap().is_generic);
        assert_eq!(analyzer.lookup("Result").unwrap().generic_param_count, 2);
    }

    #[test]
    fn test_resolve_primitive_type() {
        let mut analyzer = SemanticAnalyzer::new();
        let span = Span::default();
        let id = analyzer
            .resolve_type_expr(&TypeExpr::named("i32"), &span)
            .unwrap();
        assert_eq!(
            analyzer.universe.primitive_kind(id),
            Some(PrimitiveKind::I32)
        );
    }

    #[test]
    fn test_resolve_result_sugar() {
        let mut analyzer = SemanticAnalyzer::new();
        let span = Span::default();
        let te = TypeExpr::Named {
            name: "Result".to_string(),
            type_args: vec![TypeExpr::named("i32"), TypeExpr::named("string")],
        };
        let id = analyzer.resolve_type_expr(&te, &span).unwrap();
        assert!(analyzer.universe.as_result_pair(id).is_some());
        assert_eq!(analyzer.universe.name_of(id), "Result<i32, string>");
    }

    #[test]
    fn test_resolve_undefined_type_reports() {
        let mut analyzer = SemanticAnalyzer::new();
        let span = Span::default();
        assert!(analyzer
            .resolve_type_expr(&TypeExpr::named("Mystery"), &span)
            .is_none());
        assert!(analyzer.reporter.has_errors());
    }

    #[test]
    fn test_generic_type_requires_args() {
        let mut analyzer = SemanticAnalyzer::new();
        let span = Span::default();
        assert!(analyzer
            .resolve_type_expr(&TypeExpr::named("Option"), &span)
            .is_none());
        let te = TypeExpr::Named {
            name: "Option".to_string(),
            type_args: vec![TypeExpr::named("i32")],
        };
        assert!(analyzer.resolve_type_expr(&te, &span).is_some());
    }
}
