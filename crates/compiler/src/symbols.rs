//! Symbols and lexical scoping
//!
//! A [`ScopeStack`] holds one hash map per lexical scope. Scopes are pushed
//! on function entry, block entry, and generic-parameter introduction.
//! Predeclared names (`len`, `range`, `log`, `panic`, `args`) live in the
//! root scope and may be shadowed by user declarations.

use std::collections::HashMap;

use crate::ast::Span;
use crate::ffi::FfiAnnotations;
use crate::types::TypeId;

/// What a name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Type,
    EnumVariant,
    TypeParameter,
    Module,
}

/// A binding of a name to a kind, a type, and declaration metadata.
///
/// Symbols are plain cloneable records: qualified enum-variant shortcuts and
/// struct method tables hold copies, keeping per-scope membership disjoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Option<TypeId>,
    /// Span of the declaring construct, for diagnostics.
    pub decl_span: Option<Span>,
    pub is_used: bool,
    pub is_predeclared: bool,
    pub is_instance_method: bool,
    pub is_generic: bool,
    pub generic_param_count: usize,
    /// External symbol name for extern functions.
    pub extern_name: Option<String>,
    /// Structured FFI transfer annotations for extern functions.
    pub ffi: Option<FfiAnnotations>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Option<TypeId>) -> Self {
        Symbol {
            name: name.into(),
            kind,
            ty,
            decl_span: None,
            is_used: false,
            is_predeclared: false,
            is_instance_method: false,
            is_generic: false,
            generic_param_count: 0,
            extern_name: None,
            ffi: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.decl_span = Some(span);
        self
    }

    pub fn predeclared(name: impl Into<String>, kind: SymbolKind, ty: Option<TypeId>) -> Self {
        let mut sym = Symbol::new(name, kind, ty);
        sym.is_predeclared = true;
        sym
    }
}

/// Failure modes of [`ScopeStack::insert_safe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// A non-predeclared symbol with this name already exists in the local scope.
    Duplicate { existing_span: Option<Span> },
}

/// One lexical scope: a name -> symbol map.
#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
}

/// Stack of lexical scopes, innermost last.
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    /// Create a stack with an empty root scope.
    pub fn new() -> Self {
        ScopeStack {
            scopes: vec![Scope::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope, dropping all of its symbols.
    /// The root scope is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Insert into the innermost scope.
    ///
    /// Re-declaring a predeclared name shadows it; any other duplicate at
    /// the same depth is an error.
    pub fn insert_safe(&mut self, symbol: Symbol) -> Result<(), InsertError> {
        let scope = self
            .scopes
            .last_mut()
            .expect("scope stack always has a root");
        if let Some(existing) = scope.symbols.get(&symbol.name)
            && !existing.is_predeclared
        {
            return Err(InsertError::Duplicate {
                existing_span: existing.decl_span.clone(),
            });
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Insert into the root scope (predeclared names, compiler intrinsics).
    pub fn insert_root(&mut self, symbol: Symbol) {
        self.scopes[0].symbols.insert(symbol.name.clone(), symbol);
    }

    /// Search the innermost scope only.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols.get(name))
    }

    /// Walk the scope chain outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    /// Walk the scope chain outward, yielding a mutable binding.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.symbols.get_mut(name))
    }

    /// Mark a symbol used, if bound.
    pub fn mark_used(&mut self, name: &str) {
        if let Some(sym) = self.lookup_mut(name) {
            sym.is_used = true;
        }
    }

    /// Names visible from the current scope, for did-you-mean scans.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for scope in self.scopes.iter().rev() {
            names.extend(scope.symbols.keys().cloned());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Symbol {
        Symbol::new(name, SymbolKind::Variable, None)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("x")).unwrap();
        assert!(scopes.lookup("x").is_some());
        assert!(scopes.lookup("y").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("x")).unwrap();
        assert!(matches!(
            scopes.insert_safe(var("x")),
            Err(InsertError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_shadowing_predeclared_allowed() {
        let mut scopes = ScopeStack::new();
        scopes.insert_root(Symbol::predeclared("len", SymbolKind::Function, None));
        // User redeclares `len` in the root scope; that shadows, not errors.
        assert!(scopes.insert_safe(var("len")).is_ok());
        assert_eq!(scopes.lookup("len").unwrap().kind, SymbolKind::Variable);
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("x")).unwrap();
        scopes.enter_scope();
        // Same name at a deeper scope is fine.
        scopes.insert_safe(var("x")).unwrap();
        assert!(scopes.lookup_local("x").is_some());
        scopes.exit_scope();
        assert!(scopes.lookup("x").is_some());
    }

    #[test]
    fn test_exit_scope_drops_locals() {
        let mut scopes = ScopeStack::new();
        scopes.enter_scope();
        scopes.insert_safe(var("inner")).unwrap();
        scopes.exit_scope();
        assert!(scopes.lookup("inner").is_none());
    }

    #[test]
    fn test_root_scope_never_popped() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("x")).unwrap();
        scopes.exit_scope();
        scopes.exit_scope();
        assert!(scopes.lookup("x").is_some());
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn test_lookup_local_ignores_outer() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("outer")).unwrap();
        scopes.enter_scope();
        assert!(scopes.lookup_local("outer").is_none());
        assert!(scopes.lookup("outer").is_some());
    }

    #[test]
    fn test_mark_used() {
        let mut scopes = ScopeStack::new();
        scopes.insert_safe(var("x")).unwrap();
        scopes.mark_used("x");
        assert!(scopes.lookup("x").unwrap().is_used);
    }
}
