//! Generic monomorphization registry
//!
//! Each unique `(struct-or-enum, type-args)` combination encountered during
//! code generation is recorded once, hash-consed by its canonical name
//! (`Base<A, B>`). The first occurrence materializes the specialized layout;
//! monomorphized method bodies are emitted at end-of-module in
//! canonical-name order, while registry iteration itself preserves
//! insertion order for deterministic bookkeeping.

use std::collections::HashMap;

use crate::types::{TypeId, TypeKind, TypeUniverse};

/// One materialized specialization.
#[derive(Debug, Clone)]
pub struct Specialization {
    /// Canonical generic name, e.g. `Vec<i32>`.
    pub canonical_name: String,
    /// Mangling prefix derived from the canonical name, e.g. `Vec_i32`.
    pub mangled_prefix: String,
    pub instance: TypeId,
    pub base: TypeId,
    pub args: Vec<TypeId>,
    /// Size of the specialized layout in bytes.
    pub size: u64,
}

/// Per-compilation registry of generic instantiations.
#[derive(Default)]
pub struct GenericRegistry {
    entries: Vec<Specialization>,
    by_name: HashMap<String, usize>,
}

impl GenericRegistry {
    pub fn new() -> Self {
        GenericRegistry::default()
    }

    /// Record an instance, reusing the existing entry when the canonical
    /// name has been seen before. Returns the entry index.
    pub fn record(&mut self, universe: &TypeUniverse, instance: TypeId) -> Option<usize> {
        let TypeKind::GenericInstance { base, args } = universe.kind(instance).clone() else {
            return None;
        };
        let canonical_name = universe.name_of(instance);
        if let Some(&index) = self.by_name.get(&canonical_name) {
            return Some(index);
        }
        let mangled_prefix = mangle_canonical(&canonical_name);
        let index = self.entries.len();
        self.entries.push(Specialization {
            canonical_name: canonical_name.clone(),
            mangled_prefix,
            instance,
            base,
            args,
            size: universe.size_of(instance),
        });
        self.by_name.insert(canonical_name, index);
        Some(index)
    }

    pub fn get(&self, index: usize) -> &Specialization {
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Specialization> {
        self.entries.iter()
    }

    /// Canonical-name order, used for end-of-module emission.
    pub fn iter_canonical(&self) -> Vec<&Specialization> {
        let mut sorted: Vec<&Specialization> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        sorted
    }
}

/// Deterministic mangling of a canonical generic name: every run of
/// non-alphanumeric characters collapses to a single underscore.
/// `Vec<i32>` becomes `Vec_i32`, `Map<string, *const i32>` becomes
/// `Map_string_const_i32`.
pub fn mangle_canonical(canonical: &str) -> String {
    let mut mangled = String::with_capacity(canonical.len());
    let mut pending_sep = false;
    for c in canonical.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !mangled.is_empty() {
                mangled.push('_');
            }
            pending_sep = false;
            mangled.push(c);
        } else {
            pending_sep = true;
        }
    }
    mangled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveKind;

    fn generic_struct(u: &mut TypeUniverse) -> TypeId {
        let t = u.type_parameter("T");
        u.struct_type(
            "Vec".to_string(),
            vec!["T".to_string()],
            vec![("data".to_string(), t)],
        )
    }

    #[test]
    fn test_record_hash_conses_by_name() {
        let mut u = TypeUniverse::new();
        let base = generic_struct(&mut u);
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let a = u.instantiate(base, vec![i32_ty]).unwrap();
        let b = u.instantiate(base, vec![i32_ty]).unwrap();

        let mut registry = GenericRegistry::new();
        let first = registry.record(&u, a).unwrap();
        let second = registry.record(&u, b).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first).canonical_name, "Vec<i32>");
        assert_eq!(registry.get(first).mangled_prefix, "Vec_i32");
    }

    #[test]
    fn test_non_instance_ignored() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let mut registry = GenericRegistry::new();
        assert!(registry.record(&u, i32_ty).is_none());
    }

    #[test]
    fn test_canonical_order_emission() {
        let mut u = TypeUniverse::new();
        let base = generic_struct(&mut u);
        let i64_ty = u.primitive(PrimitiveKind::I64);
        let bool_ty = u.primitive(PrimitiveKind::Bool);
        let b = u.instantiate(base, vec![i64_ty]).unwrap();
        let a = u.instantiate(base, vec![bool_ty]).unwrap();

        let mut registry = GenericRegistry::new();
        registry.record(&u, b).unwrap();
        registry.record(&u, a).unwrap();
        // Insertion order preserved.
        let inserted: Vec<&str> = registry.iter().map(|s| s.canonical_name.as_str()).collect();
        assert_eq!(inserted, vec!["Vec<i64>", "Vec<bool>"]);
        // Emission order is canonical.
        let emitted: Vec<&str> = registry
            .iter_canonical()
            .iter()
            .map(|s| s.canonical_name.as_str())
            .collect();
        assert_eq!(emitted, vec!["Vec<bool>", "Vec<i64>"]);
    }

    #[test]
    fn test_mangle_canonical() {
        assert_eq!(mangle_canonical("Vec<i32>"), "Vec_i32");
        assert_eq!(mangle_canonical("Pair<i32, bool>"), "Pair_i32_bool");
        assert_eq!(mangle_canonical("Vec<*const u8>"), "Vec_const_u8");
    }
}
