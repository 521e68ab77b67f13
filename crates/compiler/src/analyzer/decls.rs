//! Declaration analysis
//!
//! Phase 1a: stub all struct/enum names so type references may be forward.
//! Phase 1b: resolve struct fields and enum variants in source order,
//! overwriting each stub in place. Phase 1c: declare function, extern,
//! impl-method, and import symbols. Phase 2: analyze function bodies.

use crate::ast::{
    Decl, EnumDecl, ExternDecl, FunctionDecl, ImplBlock, ImportDecl, Program, Span, StructDecl,
};
use crate::diagnostics::ErrorCode;
use crate::ffi::{self, FfiAnnotations, FfiTypeCheck};
use crate::symbols::{Symbol, SymbolKind};
use crate::types::{PrimitiveKind, TypeId, TypeKind};

use super::SemanticAnalyzer;

impl SemanticAnalyzer {
    /// Phase 1a: bind every struct/enum name to a stub descriptor.
    pub(super) fn declare_type_stubs(&mut self, program: &Program) {
        for decl in &program.decls {
            match decl {
                Decl::Struct(s) => self.stub_struct(s),
                Decl::Enum(e) => self.stub_enum(e),
                _ => {}
            }
        }
    }

    fn stub_struct(&mut self, decl: &StructDecl) {
        let stub = self
            .universe
            .struct_type(decl.name.clone(), decl.type_params.clone(), Vec::new());
        let mut symbol = Symbol::new(&decl.name, SymbolKind::Type, Some(stub))
            .with_span(decl.span.clone());
        symbol.is_generic = !decl.type_params.is_empty();
        symbol.generic_param_count = decl.type_params.len();
        self.insert_symbol(symbol, &decl.span);
    }

    fn stub_enum(&mut self, decl: &EnumDecl) {
        let stub = self
            .universe
            .enum_type(decl.name.clone(), decl.type_params.clone(), Vec::new());
        let mut symbol = Symbol::new(&decl.name, SymbolKind::Type, Some(stub))
            .with_span(decl.span.clone());
        symbol.is_generic = !decl.type_params.is_empty();
        symbol.generic_param_count = decl.type_params.len();
        self.insert_symbol(symbol, &decl.span);
    }

    /// Phase 1b: resolve struct fields and enum variants.
    pub(super) fn resolve_type_decls(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            match decl {
                Decl::Struct(s) => {
                    let errors_before = self.reporter.error_count();
                    self.resolve_struct_decl(s);
                    s.validated = self.reporter.error_count() == errors_before;
                }
                Decl::Enum(e) => {
                    let errors_before = self.reporter.error_count();
                    self.resolve_enum_decl(e);
                    e.validated = self.reporter.error_count() == errors_before;
                }
                _ => {}
            }
        }
    }

    fn resolve_struct_decl(&mut self, decl: &StructDecl) {
        let Some(stub) = self.lookup(&decl.name).and_then(|s| s.ty) else {
            return;
        };
        if !self.check_type_params_unique(&decl.type_params, &decl.span) {
            return;
        }

        self.scopes().enter_scope();
        self.bind_type_params(&decl.type_params);

        let mut fields: Vec<(String, TypeId)> = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            if fields.iter().any(|(name, _)| *name == field.name) {
                self.error_at(
                    ErrorCode::InvalidDeclaration,
                    &field.span,
                    format!(
                        "Duplicate field '{}' in struct '{}'",
                        field.name, decl.name
                    ),
                );
                continue;
            }
            if let Some(ty) = self.resolve_type_expr(&field.ty, &field.span) {
                fields.push((field.name.clone(), ty));
            }
        }

        self.scopes().exit_scope();

        // Rebuild the layout and overwrite the stub in place so every
        // earlier reference resolves to the finished descriptor.
        let resolved =
            self.universe
                .struct_type(decl.name.clone(), decl.type_params.clone(), fields);
        let kind = self.universe.kind(resolved).clone();
        let size = self.universe.size_of(resolved);
        let align = self.universe.align_of(resolved);
        self.universe.redefine(stub, kind, size, align);
    }

    fn resolve_enum_decl(&mut self, decl: &EnumDecl) {
        let Some(stub) = self.lookup(&decl.name).and_then(|s| s.ty) else {
            return;
        };
        if !self.check_type_params_unique(&decl.type_params, &decl.span) {
            return;
        }

        self.scopes().enter_scope();
        self.bind_type_params(&decl.type_params);

        let mut variants: Vec<(String, Option<TypeId>, i64)> = Vec::new();
        let mut next_value: i64 = 0;
        for variant in &decl.variants {
            if variants.iter().any(|(name, _, _)| *name == variant.name) {
                self.error_at(
                    ErrorCode::InvalidDeclaration,
                    &variant.span,
                    format!(
                        "Duplicate variant '{}' in enum '{}'",
                        variant.name, decl.name
                    ),
                );
                continue;
            }
            let payload = match &variant.payload {
                Some(te) => match self.resolve_type_expr(te, &variant.span) {
                    Some(ty) => Some(ty),
                    None => continue,
                },
                None => None,
            };
            let value = variant.value.unwrap_or(next_value);
            next_value = value + 1;
            variants.push((variant.name.clone(), payload, value));
        }

        self.scopes().exit_scope();

        let resolved =
            self.universe
                .enum_type(decl.name.clone(), decl.type_params.clone(), variants);
        let kind = self.universe.kind(resolved).clone();
        let size = self.universe.size_of(resolved);
        let align = self.universe.align_of(resolved);
        self.universe.redefine(stub, kind, size, align);

        // Qualified `Enum.Variant` shortcuts in the enclosing scope use
        // copied symbol entries, keeping scope membership disjoint.
        for variant in &decl.variants {
            let mut shortcut = Symbol::new(
                format!("{}.{}", decl.name, variant.name),
                SymbolKind::EnumVariant,
                Some(stub),
            )
            .with_span(variant.span.clone());
            shortcut.is_used = false;
            let _ = self.scopes().insert_safe(shortcut);
        }
    }

    fn check_type_params_unique(&mut self, params: &[String], span: &Span) -> bool {
        for (i, param) in params.iter().enumerate() {
            if params[..i].contains(param) {
                self.error_at(
                    ErrorCode::InvalidDeclaration,
                    span,
                    format!("Duplicate type parameter '{}'", param),
                );
                return false;
            }
        }
        true
    }

    fn bind_type_params(&mut self, params: &[String]) {
        for param in params {
            let ty = self.universe.type_parameter(param);
            let _ = self
                .scopes()
                .insert_safe(Symbol::new(param, SymbolKind::TypeParameter, Some(ty)));
        }
    }

    /// Phase 1c: declare functions, externs, impl methods, and imports.
    pub(super) fn declare_value_decls(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            match decl {
                Decl::Function(f) => {
                    self.declare_function(f);
                }
                Decl::Extern(e) => {
                    let errors_before = self.reporter.error_count();
                    self.declare_extern(e);
                    e.validated = self.reporter.error_count() == errors_before;
                }
                Decl::Impl(block) => self.declare_impl(block),
                Decl::Import(import) => self.declare_import(import),
                _ => {}
            }
        }
    }

    fn declare_function(&mut self, decl: &FunctionDecl) -> Option<Symbol> {
        if !decl.type_params.is_empty() {
            self.error_at(
                ErrorCode::UnsupportedOperation,
                &decl.span,
                format!(
                    "Function '{}' declares type parameters; only structs and enums are generic",
                    decl.name
                ),
            );
            return None;
        }
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            params.push(self.resolve_type_expr(&param.ty, &param.span)?);
        }
        let ret = match &decl.return_type {
            Some(te) => self.resolve_type_expr(te, &decl.span)?,
            None => self.universe.primitive(PrimitiveKind::Void),
        };
        let fn_ty = self.universe.function(params, ret, false, None, None);
        let symbol = Symbol::new(&decl.name, SymbolKind::Function, Some(fn_ty))
            .with_span(decl.span.clone());
        self.insert_symbol(symbol.clone(), &decl.span);
        self.function_types.insert(decl.name.clone(), fn_ty);
        Some(symbol)
    }

    fn declare_extern(&mut self, decl: &ExternDecl) {
        let mut params = Vec::with_capacity(decl.params.len());
        let mut param_transfers = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let Some(ty) = self.resolve_type_expr(&param.ty, &param.span) else {
                return;
            };
            match ffi::validate_ffi_type(&self.universe, ty) {
                FfiTypeCheck::Ok => {}
                FfiTypeCheck::SliceLowered => {
                    let name = self.universe.name_of(ty);
                    self.note_at(
                        ErrorCode::InvalidDeclaration,
                        &param.span,
                        format!(
                            "Slice parameter '{}: {}' is passed to '{}' as a pointer and length pair",
                            param.name, name, decl.name
                        ),
                    );
                }
                FfiTypeCheck::Incompatible => {
                    let name = self.universe.name_of(ty);
                    self.error_at(
                        ErrorCode::InvalidDeclaration,
                        &param.span,
                        format!(
                            "Type '{}' of parameter '{}' cannot cross the FFI boundary",
                            name, param.name
                        ),
                    );
                    return;
                }
            }
            match ffi::resolve_transfer(&param.annotations) {
                Ok(transfer) => param_transfers.push(transfer),
                Err(message) => {
                    self.error_at(ErrorCode::InvalidDeclaration, &param.span, message);
                    return;
                }
            }
            params.push(ty);
        }

        let ret = match &decl.return_type {
            Some(te) => match self.resolve_type_expr(te, &decl.span) {
                Some(ty) => ty,
                None => return,
            },
            None => self.universe.primitive(PrimitiveKind::Void),
        };
        if !self.universe.is_void(ret)
            && ffi::validate_ffi_type(&self.universe, ret) == FfiTypeCheck::Incompatible
        {
            let name = self.universe.name_of(ret);
            self.error_at(
                ErrorCode::InvalidDeclaration,
                &decl.span,
                format!(
                    "Return type '{}' of extern '{}' cannot cross the FFI boundary",
                    name, decl.name
                ),
            );
            return;
        }
        let return_transfer = match ffi::resolve_transfer(&decl.annotations) {
            Ok(transfer) => transfer,
            Err(message) => {
                self.error_at(ErrorCode::InvalidDeclaration, &decl.span, message);
                return;
            }
        };

        if let Some(start) = decl.variadic_from
            && start > decl.params.len()
        {
            self.error_at(
                ErrorCode::InvalidDeclaration,
                &decl.span,
                format!(
                    "Variadic start index {} exceeds the {} declared parameter(s)",
                    start,
                    decl.params.len()
                ),
            );
            return;
        }

        let extern_name = decl
            .extern_name
            .clone()
            .unwrap_or_else(|| decl.name.clone());
        let fn_ty = self.universe.function(
            params,
            ret,
            true,
            Some(extern_name.clone()),
            decl.variadic_from,
        );
        let mut symbol = Symbol::new(&decl.name, SymbolKind::Function, Some(fn_ty))
            .with_span(decl.span.clone());
        symbol.extern_name = Some(extern_name);
        symbol.ffi = Some(FfiAnnotations {
            return_transfer,
            param_transfers,
            variadic_from: decl.variadic_from,
        });
        self.insert_symbol(symbol, &decl.span);
        self.function_types.insert(decl.name.clone(), fn_ty);
    }

    fn declare_impl(&mut self, block: &ImplBlock) {
        let target = match self.lookup(&block.target) {
            Some(sym) if sym.kind == SymbolKind::Type => sym.ty,
            Some(_) => {
                self.error_at(
                    ErrorCode::InvalidDeclaration,
                    &block.span,
                    format!("'{}' is not a type", block.target),
                );
                return;
            }
            None => {
                self.error_at(
                    ErrorCode::UndefinedSymbol,
                    &block.span,
                    format!("Undefined type '{}' in impl block", block.target),
                );
                return;
            }
        };
        let Some(struct_id) = target else { return };
        let type_params = match self.universe.kind(struct_id) {
            TypeKind::Struct { type_params, .. } => type_params.clone(),
            _ => {
                self.error_at(
                    ErrorCode::InvalidDeclaration,
                    &block.span,
                    format!("Impl blocks attach to structs; '{}' is not one", block.target),
                );
                return;
            }
        };

        for method in &block.methods {
            if self.universe.find_method(struct_id, &method.name).is_some() {
                self.error_at(
                    ErrorCode::DuplicateSymbol,
                    &method.span,
                    format!(
                        "Method '{}' is already defined on '{}'",
                        method.name, block.target
                    ),
                );
                continue;
            }
            self.scopes().enter_scope();
            self.bind_type_params(&type_params);

            let mut is_instance_method = false;
            let mut params = Vec::with_capacity(method.params.len());
            let mut ok = true;
            for (i, param) in method.params.iter().enumerate() {
                if i == 0 && param.name == "self" {
                    is_instance_method = true;
                    params.push(self.universe.pointer_to(struct_id, true));
                    continue;
                }
                match self.resolve_type_expr(&param.ty, &param.span) {
                    Some(ty) => params.push(ty),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            let ret = if ok {
                match &method.return_type {
                    Some(te) => match self.resolve_type_expr(te, &method.span) {
                        Some(ty) => Some(ty),
                        None => None,
                    },
                    None => Some(self.universe.primitive(PrimitiveKind::Void)),
                }
            } else {
                None
            };

            self.scopes().exit_scope();

            let Some(ret) = ret else { continue };
            if !ok {
                continue;
            }
            let fn_ty = self.universe.function(params, ret, false, None, None);
            let mut symbol = Symbol::new(&method.name, SymbolKind::Function, Some(fn_ty))
                .with_span(method.span.clone());
            symbol.is_instance_method = is_instance_method;
            self.universe
                .attach_method(struct_id, method.name.clone(), symbol);
        }
    }

    fn declare_import(&mut self, decl: &ImportDecl) {
        let name = decl.alias.clone().unwrap_or_else(|| {
            decl.path
                .rsplit("::")
                .next()
                .unwrap_or(decl.path.as_str())
                .to_string()
        });
        let symbol =
            Symbol::new(name, SymbolKind::Module, None).with_span(decl.span.clone());
        self.insert_symbol(symbol, &decl.span);
    }

    /// Phase 2: analyze function and method bodies in source order.
    pub(super) fn analyze_bodies(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            match decl {
                Decl::Function(f) => {
                    let errors_before = self.reporter.error_count();
                    self.analyze_function_body_entry(f, None);
                    f.validated = self.reporter.error_count() == errors_before;
                }
                Decl::Impl(block) => {
                    let target = self
                        .lookup(&block.target)
                        .filter(|s| s.kind == SymbolKind::Type)
                        .and_then(|s| s.ty);
                    if let Some(struct_id) = target {
                        for method in &mut block.methods {
                            let errors_before = self.reporter.error_count();
                            self.analyze_function_body_entry(method, Some(struct_id));
                            method.validated = self.reporter.error_count() == errors_before;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn analyze_function_body_entry(
        &mut self,
        decl: &mut FunctionDecl,
        struct_ctx: Option<TypeId>,
    ) {
        // Find the declared signature. Free functions live in scope;
        // methods in the struct's table.
        let fn_ty = match struct_ctx {
            Some(struct_id) => self
                .universe
                .find_method(struct_id, &decl.name)
                .and_then(|s| s.ty),
            None => self
                .lookup(&decl.name)
                .filter(|s| s.kind == SymbolKind::Function)
                .and_then(|s| s.ty),
        };
        let Some(fn_ty) = fn_ty else { return };
        let TypeKind::Function { params, ret, .. } = self.universe.kind(fn_ty).clone() else {
            return;
        };

        self.scopes().enter_scope();
        if let Some(struct_id) = struct_ctx
            && let TypeKind::Struct { type_params, .. } = self.universe.kind(struct_id).clone()
        {
            self.bind_type_params(&type_params);
        }
        for (param, &ty) in decl.params.iter().zip(params.iter()) {
            let symbol = Symbol::new(&param.name, SymbolKind::Variable, Some(ty))
                .with_span(param.span.clone());
            self.insert_symbol(symbol, &param.span);
        }

        let saved = self.set_current_return(Some(ret));
        self.analyze_block(&mut decl.body);
        self.set_current_return(saved);

        self.scopes().exit_scope();
    }
}
