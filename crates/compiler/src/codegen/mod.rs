//! Code generation
//!
//! Consumes a fully-annotated AST (every expression carries `type_info`)
//! and produces a flat IR buffer over the abstract register file. The
//! generator is constructed from an analysis result and refuses to run
//! when that analysis reported errors or when an expression it lowers was
//! left untyped; both indicate an analyzer contract violation.

pub mod error;
pub mod ir;
pub mod labels;
pub mod locals;
pub mod registers;
pub mod specialization;

mod exprs;
mod patterns;
mod program;
mod statements;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::{Decl, Expr, ImplBlock, Program};
use crate::types::{TypeId, TypeKind, TypeUniverse};
use crate::AnalysisResult;

pub use error::CodeGenError;
pub use ir::{Instruction, Opcode, Operand, Register};
pub use program::{mangle_method, mangle_method_inplace, runtime_entry};
use labels::{LabelKind, LabelManager};
use locals::LocalTable;
use registers::RegisterAllocator;
use specialization::GenericRegistry;

/// Atomic counters for one code generation run. Atomics tolerate a future
/// multi-threaded orchestration; within one run the generator is
/// thread-confined.
#[derive(Default)]
pub struct CodeGenStats {
    pub instructions_emitted: AtomicU64,
    pub basic_blocks: AtomicU64,
    pub functions_lowered: AtomicU64,
    pub bytes_estimated: AtomicU64,
    pub spills: AtomicU64,
    pub peak_register_pressure: AtomicU64,
}

/// A plain snapshot of the counters, carried on the finished module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub instructions_emitted: u64,
    pub basic_blocks: u64,
    pub functions_lowered: u64,
    pub bytes_estimated: u64,
    pub spills: u64,
    pub peak_register_pressure: u64,
}

impl CodeGenStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            instructions_emitted: self.instructions_emitted.load(Ordering::Relaxed),
            basic_blocks: self.basic_blocks.load(Ordering::Relaxed),
            functions_lowered: self.functions_lowered.load(Ordering::Relaxed),
            bytes_estimated: self.bytes_estimated.load(Ordering::Relaxed),
            spills: self.spills.load(Ordering::Relaxed),
            peak_register_pressure: self.peak_register_pressure.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// One-line summary for the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} instructions, {} blocks, {} functions, ~{} bytes, {} spills, peak pressure {}",
            self.instructions_emitted,
            self.basic_blocks,
            self.functions_lowered,
            self.bytes_estimated,
            self.spills,
            self.peak_register_pressure
        )
    }
}

/// The finished architecture-agnostic module, ready for a back-end
/// formatter (x86-64 AT&T/Intel, AArch64, WebAssembly).
#[derive(Debug)]
pub struct IrModule {
    pub instructions: Vec<Instruction>,
    /// Read-only string literals: (label, contents).
    pub string_literals: Vec<(String, String)>,
    /// Floating literals materialized through memory: (label, value).
    pub float_literals: Vec<(String, f64)>,
    pub stats: StatsSnapshot,
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.string_literals.is_empty() || !self.float_literals.is_empty() {
            writeln!(f, "; read-only data")?;
            for (label, contents) in &self.string_literals {
                writeln!(f, "{}: string {:?}", label, contents)?;
            }
            for (label, value) in &self.float_literals {
                writeln!(f, "{}: double {}", label, value)?;
            }
            writeln!(f)?;
        }
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

/// A lowered expression value: scalars live in a register, aggregates are
/// addressed through a register holding their base pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Value {
    Scalar(Register),
    /// Base address of an aggregate (struct, enum, tuple, array, slice).
    Address(Register),
}

impl Value {
    pub(super) fn register(self) -> Register {
        match self {
            Value::Scalar(r) | Value::Address(r) => r,
        }
    }
}

pub struct CodeGen<'a> {
    pub(super) universe: &'a mut TypeUniverse,
    /// Declared signatures of free functions and externs, by name.
    pub(super) function_types: &'a HashMap<String, TypeId>,
    pub(super) instructions: Vec<Instruction>,
    pub(super) labels: LabelManager,
    pub(super) regs: RegisterAllocator,
    pub(super) locals: LocalTable,
    pub(super) generics: GenericRegistry,
    pub(super) stats: CodeGenStats,
    /// Innermost-last stack of (continue target, break target).
    pub(super) loop_stack: Vec<(String, String)>,
    /// Interned string literals: contents -> label.
    pub(super) string_constants: HashMap<String, String>,
    pub(super) string_literals: Vec<(String, String)>,
    pub(super) float_literals: Vec<(String, f64)>,
    /// Instruction indices whose frame-size immediate is patched once the
    /// function's locals are fully allocated.
    pub(super) frame_patches: Vec<usize>,
    /// Type-parameter substitution while emitting a monomorphized method.
    pub(super) subst: Option<(Vec<String>, Vec<TypeId>)>,
    /// Name of the function being lowered, for comments.
    pub(super) current_function: String,
}

impl<'a> CodeGen<'a> {
    /// Build a generator from a finished analysis.
    ///
    /// Fails when the analysis reported errors; the architectural
    /// safeguard that the generator never runs over an invalid AST.
    pub fn new(analysis: &'a mut AnalysisResult) -> Result<Self, CodeGenError> {
        if analysis.reporter.has_errors() {
            return Err(CodeGenError::Logic(
                "refusing to generate code: semantic analysis reported errors".to_string(),
            ));
        }
        Ok(CodeGen {
            function_types: &analysis.function_types,
            universe: &mut analysis.universe,
            instructions: Vec::new(),
            labels: LabelManager::new(),
            regs: RegisterAllocator::new(),
            locals: LocalTable::new(),
            generics: GenericRegistry::new(),
            stats: CodeGenStats::default(),
            loop_stack: Vec::new(),
            string_constants: HashMap::new(),
            string_literals: Vec::new(),
            float_literals: Vec::new(),
            frame_patches: Vec::new(),
            subst: None,
            current_function: String::new(),
        })
    }

    /// Lower a whole program to an IR module.
    ///
    /// Free functions and non-generic impl methods are emitted in source
    /// order; monomorphized generic methods are emitted at end-of-module
    /// in canonical-name order.
    pub fn generate_program(mut self, program: &Program) -> Result<IrModule, CodeGenError> {
        let mut generic_impls: HashMap<String, &ImplBlock> = HashMap::new();

        for decl in &program.decls {
            match decl {
                Decl::Function(f) => {
                    let name = f.name.clone();
                    self.emit_function(f, &name, None)?;
                }
                Decl::Impl(block) => {
                    let Some(struct_id) = self.struct_id_for(&block.target) else {
                        return Err(CodeGenError::Logic(format!(
                            "impl target '{}' has no struct descriptor",
                            block.target
                        )));
                    };
                    if self.struct_is_generic(struct_id) {
                        generic_impls.insert(block.target.clone(), block);
                        continue;
                    }
                    for method in &block.methods {
                        let mangled = program::mangle_method(&block.target, &method.name);
                        self.emit_function(method, &mangled, Some(struct_id))?;
                    }
                }
                // Externs, type declarations, and imports emit no code.
                _ => {}
            }
        }

        self.emit_specializations(&generic_impls)?;

        let undefined = self.labels.undefined_labels();
        if !undefined.is_empty() {
            return Err(CodeGenError::Validation(format!(
                "labels never defined: {}",
                undefined.join(", ")
            )));
        }
        ir::validate(&self.instructions).map_err(CodeGenError::Validation)?;

        self.stats
            .bytes_estimated
            .store(self.instructions.len() as u64 * 4, Ordering::Relaxed);
        self.stats
            .spills
            .store(self.regs.spill_count(), Ordering::Relaxed);
        self.stats
            .peak_register_pressure
            .store(self.regs.peak_pressure() as u64, Ordering::Relaxed);

        Ok(IrModule {
            instructions: self.instructions,
            string_literals: self.string_literals,
            float_literals: self.float_literals,
            stats: self.stats.snapshot(),
        })
    }

    /// Monomorphized methods, emitted until no new instantiations appear
    /// (a specialized body may itself instantiate further generics).
    fn emit_specializations(
        &mut self,
        generic_impls: &HashMap<String, &ImplBlock>,
    ) -> Result<(), CodeGenError> {
        let mut emitted: Vec<String> = Vec::new();
        loop {
            let pending: Vec<(String, String, TypeId, TypeId, Vec<TypeId>)> = self
                .generics
                .iter_canonical()
                .into_iter()
                .filter(|s| !emitted.contains(&s.canonical_name))
                .map(|s| {
                    (
                        s.canonical_name.clone(),
                        s.mangled_prefix.clone(),
                        s.instance,
                        s.base,
                        s.args.clone(),
                    )
                })
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for (canonical, prefix, instance, base, args) in pending {
                emitted.push(canonical);
                let (base_name, params) = match self.universe.kind(base) {
                    TypeKind::Struct {
                        name, type_params, ..
                    } => (name.clone(), type_params.clone()),
                    _ => continue,
                };
                let Some(block) = generic_impls.get(&base_name) else {
                    continue;
                };
                self.subst = Some((params, args));
                for method in &block.methods {
                    let mangled = format!("{}_{}", prefix, method.name);
                    self.emit_function(method, &mangled, Some(instance))?;
                }
                self.subst = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(super) fn struct_id_for(&self, name: &str) -> Option<TypeId> {
        // Struct descriptors are reachable from any value typed with them;
        // the analyzer interned exactly one per name, so scan the arena.
        (0..self.universe.len() as u32)
            .map(TypeId)
            .find(|&id| matches!(self.universe.kind(id), TypeKind::Struct { name: n, .. } if n == name))
    }

    pub(super) fn struct_is_generic(&self, id: TypeId) -> bool {
        matches!(
            self.universe.kind(id),
            TypeKind::Struct { type_params, .. } if !type_params.is_empty()
        )
    }

    /// Append an instruction.
    pub(super) fn emit(&mut self, instruction: Instruction) {
        self.stats
            .instructions_emitted
            .fetch_add(1, Ordering::Relaxed);
        self.instructions.push(instruction);
    }

    pub(super) fn emit_op(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        self.emit(Instruction::new(opcode, operands));
    }

    /// Define a label at the current address and emit its marker.
    pub(super) fn place_label(&mut self, name: &str) -> Result<(), CodeGenError> {
        self.labels
            .define_label(name, self.instructions.len())
            .map_err(CodeGenError::Logic)?;
        self.stats.basic_blocks.fetch_add(1, Ordering::Relaxed);
        self.emit(Instruction::label(name));
        Ok(())
    }

    pub(super) fn new_label(&mut self, kind: LabelKind, prefix: &str) -> String {
        self.labels.create_label(kind, prefix)
    }

    /// The annotated type of an expression, with the active substitution
    /// applied. A missing annotation is an analyzer contract violation.
    pub(super) fn type_of(&mut self, expr: &Expr) -> Result<TypeId, CodeGenError> {
        let ty = expr.type_info.ok_or_else(|| {
            CodeGenError::Logic(format!(
                "analyzer violation: expression at {} has no type information",
                expr.span
            ))
        })?;
        Ok(self.concrete(ty))
    }

    /// Apply the monomorphization substitution, if one is active.
    pub(super) fn concrete(&mut self, ty: TypeId) -> TypeId {
        let Some((params, args)) = self.subst.clone() else {
            return ty;
        };
        self.universe.substitute(ty, &params, &args)
    }

    /// Aggregates are manipulated through their base address; scalars ride
    /// in registers.
    pub(super) fn is_aggregate(&self, ty: TypeId) -> bool {
        matches!(
            self.universe.kind(ty),
            TypeKind::Struct { .. }
                | TypeKind::Enum { .. }
                | TypeKind::Tuple { .. }
                | TypeKind::Array { .. }
                | TypeKind::Slice { .. }
                | TypeKind::GenericInstance { .. }
                | TypeKind::Result { .. }
        )
    }

    /// Allocate a scratch register, emitting the spill store if one was
    /// displaced.
    pub(super) fn alloc_reg(&mut self) -> Register {
        let (register, spill) = self.regs.allocate(true, &mut self.locals);
        if let Some(spill) = spill {
            self.stats.spills.fetch_add(1, Ordering::Relaxed);
            self.emit(
                Instruction::new(
                    Opcode::Mov,
                    vec![
                        Operand::mem(Register::RBP, spill.offset),
                        Operand::Register(spill.register),
                    ],
                )
                .with_comment("spill"),
            );
        }
        register
    }

    /// Intern a string literal into the read-only pool.
    pub(super) fn intern_string(&mut self, contents: &str) -> String {
        if let Some(label) = self.string_constants.get(contents) {
            return label.clone();
        }
        let label = format!("str_{}", self.string_literals.len());
        self.string_constants
            .insert(contents.to_string(), label.clone());
        self.string_literals
            .push((label.clone(), contents.to_string()));
        label
    }

    pub(super) fn intern_float(&mut self, value: f64) -> String {
        let label = format!("flt_{}", self.float_literals.len());
        self.float_literals.push((label.clone(), value));
        label
    }
}
