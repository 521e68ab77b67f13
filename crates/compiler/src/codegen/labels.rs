//! Label management
//!
//! Labels are interned by name. `create_label` mints a globally-unique id
//! per code generation and appends it to the caller's prefix, so a label
//! created by the manager can never collide within one run.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Function,
    BranchTarget,
    LoopStart,
    LoopEnd,
}

#[derive(Debug, Clone)]
struct LabelEntry {
    kind: LabelKind,
    /// Linear address: index of the instruction the label precedes.
    address: Option<usize>,
}

/// Per-codegen-run label table.
#[derive(Default)]
pub struct LabelManager {
    labels: HashMap<String, LabelEntry>,
    next_id: u64,
}

impl LabelManager {
    pub fn new() -> Self {
        LabelManager::default()
    }

    /// Mint a unique label `prefix_id` of the given kind.
    pub fn create_label(&mut self, kind: LabelKind, prefix: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        let name = format!("{}_{}", prefix, id);
        self.labels.insert(
            name.clone(),
            LabelEntry {
                kind,
                address: None,
            },
        );
        name
    }

    /// Register a fixed-name label (function entry points).
    pub fn intern(&mut self, name: &str, kind: LabelKind) {
        self.labels.entry(name.to_string()).or_insert(LabelEntry {
            kind,
            address: None,
        });
    }

    /// Fill in the linear address of the next instruction.
    /// Defining the same label twice is an error.
    pub fn define_label(&mut self, name: &str, address: usize) -> Result<(), String> {
        match self.labels.get_mut(name) {
            Some(entry) => {
                if entry.address.is_some() {
                    return Err(format!("label '{}' defined twice", name));
                }
                entry.address = Some(address);
                Ok(())
            }
            None => Err(format!("label '{}' was never created", name)),
        }
    }

    pub fn resolve_label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).and_then(|e| e.address)
    }

    pub fn kind_of(&self, name: &str) -> Option<LabelKind> {
        self.labels.get(name).map(|e| e.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// Labels created but never defined, for end-of-run validation.
    pub fn undefined_labels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .labels
            .iter()
            .filter(|(_, e)| e.address.is_none())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_unique() {
        let mut manager = LabelManager::new();
        let a = manager.create_label(LabelKind::BranchTarget, "else");
        let b = manager.create_label(LabelKind::BranchTarget, "else");
        assert_ne!(a, b);
        assert!(a.starts_with("else_"));
    }

    #[test]
    fn test_define_and_resolve() {
        let mut manager = LabelManager::new();
        let label = manager.create_label(LabelKind::LoopStart, "loop_start");
        assert_eq!(manager.resolve_label(&label), None);
        manager.define_label(&label, 17).unwrap();
        assert_eq!(manager.resolve_label(&label), Some(17));
        assert_eq!(manager.kind_of(&label), Some(LabelKind::LoopStart));
    }

    #[test]
    fn test_double_define_rejected() {
        let mut manager = LabelManager::new();
        let label = manager.create_label(LabelKind::BranchTarget, "end");
        manager.define_label(&label, 0).unwrap();
        assert!(manager.define_label(&label, 1).is_err());
    }

    #[test]
    fn test_define_unknown_rejected() {
        let mut manager = LabelManager::new();
        assert!(manager.define_label("ghost", 0).is_err());
    }

    #[test]
    fn test_undefined_labels_reported() {
        let mut manager = LabelManager::new();
        let a = manager.create_label(LabelKind::BranchTarget, "a");
        let b = manager.create_label(LabelKind::BranchTarget, "b");
        manager.define_label(&a, 3).unwrap();
        assert_eq!(manager.undefined_labels(), vec![b]);
    }
}
