//! FFI (Foreign Function Interface) Support
//!
//! Extern declarations describe C-callable functions using the platform
//! System V AMD64 ABI. Ownership-transfer annotations are carried as
//! structured enum values attached to the function symbol and to each
//! parameter, never as strings; unrecognized annotations are rejected at
//! analysis time.

use crate::ast::FfiAnnotationAst;
use crate::types::{TypeId, TypeKind, TypeUniverse};

/// Ownership-transfer semantics of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiTransfer {
    /// Callee takes ownership (`#[transfer_full]`).
    Full,
    /// Caller keeps ownership (`#[transfer_none]`).
    None,
    /// Value is borrowed for the duration of the call (`#[borrowed]`).
    Borrowed,
}

impl FfiTransfer {
    /// Recognized annotation names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "transfer_full" => Some(FfiTransfer::Full),
            "transfer_none" => Some(FfiTransfer::None),
            "borrowed" => Some(FfiTransfer::Borrowed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FfiTransfer::Full => "transfer_full",
            FfiTransfer::None => "transfer_none",
            FfiTransfer::Borrowed => "borrowed",
        }
    }
}

/// Validated annotations for one extern function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfiAnnotations {
    /// Transfer semantics of the return value, if annotated.
    pub return_transfer: Option<FfiTransfer>,
    /// Per-parameter transfer semantics, indexed like the parameter list.
    pub param_transfers: Vec<Option<FfiTransfer>>,
    /// Index of the first variadic parameter, for variadic externs.
    pub variadic_from: Option<usize>,
}

/// Parse one annotation list into a single transfer, rejecting unknown
/// names and conflicting duplicates.
pub fn resolve_transfer(
    annotations: &[FfiAnnotationAst],
) -> Result<Option<FfiTransfer>, String> {
    let mut resolved: Option<FfiTransfer> = None;
    for ann in annotations {
        let Some(transfer) = FfiTransfer::from_name(&ann.name) else {
            return Err(format!(
                "Unrecognized FFI annotation '#[{}]' (expected transfer_full, transfer_none, or borrowed)",
                ann.name
            ));
        };
        if let Some(previous) = resolved
            && previous != transfer
        {
            return Err(format!(
                "Conflicting FFI annotations '#[{}]' and '#[{}]'",
                previous.as_str(),
                transfer.as_str()
            ));
        }
        resolved = Some(transfer);
    }
    Ok(resolved)
}

/// Outcome of checking one extern parameter or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfiTypeCheck {
    /// Passes as-is.
    Ok,
    /// A slice: lowered to an expanded (pointer, length) pair. The caller
    /// records a note diagnostic at the declaration.
    SliceLowered,
    /// Not expressible across the FFI boundary.
    Incompatible,
}

/// Validate a type for use in an extern signature.
///
/// Primitives (except `string`), pointers to FFI-compatible pointees,
/// FFI-compatible structs, payload-free enums, and function pointers pass.
/// Slices are accepted with the canonical pointer+length lowering.
pub fn validate_ffi_type(universe: &TypeUniverse, ty: TypeId) -> FfiTypeCheck {
    match universe.kind(ty) {
        TypeKind::Slice { element, .. } => {
            if universe.is_ffi_compatible(*element) {
                FfiTypeCheck::SliceLowered
            } else {
                FfiTypeCheck::Incompatible
            }
        }
        _ if universe.is_ffi_compatible(ty) => FfiTypeCheck::Ok,
        _ => FfiTypeCheck::Incompatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::types::PrimitiveKind;

    fn ann(name: &str) -> FfiAnnotationAst {
        FfiAnnotationAst {
            name: name.to_string(),
            span: Span::default(),
        }
    }

    #[test]
    fn test_recognized_transfers() {
        assert_eq!(
            FfiTransfer::from_name("transfer_full"),
            Some(FfiTransfer::Full)
        );
        assert_eq!(
            FfiTransfer::from_name("transfer_none"),
            Some(FfiTransfer::None)
        );
        assert_eq!(FfiTransfer::from_name("borrowed"), Some(FfiTransfer::Borrowed));
        assert_eq!(FfiTransfer::from_name("gift_wrapped"), None);
    }

    #[test]
    fn test_resolve_transfer_rejects_unknown() {
        let result = resolve_transfer(&[ann("gift_wrapped")]);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("gift_wrapped"));
    }

    #[test]
    fn test_resolve_transfer_rejects_conflict() {
        let result = resolve_transfer(&[ann("transfer_full"), ann("borrowed")]);
        assert!(result.is_err());
        // A repeated identical annotation is harmless.
        let result = resolve_transfer(&[ann("borrowed"), ann("borrowed")]);
        assert_eq!(result.unwrap(), Some(FfiTransfer::Borrowed));
    }

    #[test]
    fn test_validate_ffi_types() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let s = u.primitive(PrimitiveKind::String);
        let ptr = u.pointer_to(i32_ty, false);
        let slice = u.slice_of(i32_ty, false);
        let string_slice = u.slice_of(s, false);
        assert_eq!(validate_ffi_type(&u, i32_ty), FfiTypeCheck::Ok);
        assert_eq!(validate_ffi_type(&u, ptr), FfiTypeCheck::Ok);
        assert_eq!(validate_ffi_type(&u, s), FfiTypeCheck::Incompatible);
        assert_eq!(validate_ffi_type(&u, slice), FfiTypeCheck::SliceLowered);
        assert_eq!(
            validate_ffi_type(&u, string_slice),
            FfiTypeCheck::Incompatible
        );
    }
}
