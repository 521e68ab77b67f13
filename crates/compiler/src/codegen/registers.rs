//! Register allocation
//!
//! A simple linear-scan allocator over the abstract register file. When no
//! register is free, the value whose next use is furthest away is spilled
//! to a freshly reserved stack slot; next-use distance is approximated by
//! allocation timestamp (oldest allocation spills first).
//!
//! Callee-saved registers are withheld from allocation until the function
//! prologue has saved them. The allocator is thread-confined: one instance
//! per codegen run, no shared mutation.

use std::collections::HashMap;

use super::ir::Register;
use super::locals::LocalTable;

/// Scratch pool, preferred allocation order. Non-argument scratch
/// registers first so short-lived temporaries survive call setup.
const CALLER_SAVED_POOL: [Register; 9] = [
    Register::R10,
    Register::R11,
    Register::RCX,
    Register::RDX,
    Register::RSI,
    Register::RDI,
    Register::R8,
    Register::R9,
    Register::RAX,
];

const CALLEE_SAVED_POOL: [Register; 5] = [
    Register::RBX,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const FLOAT_POOL: [Register; 16] = [
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
    Register::Xmm6,
    Register::Xmm7,
    Register::Xmm8,
    Register::Xmm9,
    Register::Xmm10,
    Register::Xmm11,
    Register::Xmm12,
    Register::Xmm13,
    Register::Xmm14,
    Register::Xmm15,
];

/// A spill decision made by the allocator. The caller must emit the store
/// of `register` into `[frame-pointer + offset]` before reusing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillEvent {
    pub register: Register,
    pub offset: i64,
}

pub struct RegisterAllocator {
    /// Allocation timestamp per live register.
    in_use: HashMap<Register, u64>,
    next_stamp: u64,
    /// Callee-saved registers become allocatable once the prologue has
    /// saved them.
    callee_saved_enabled: bool,
    spill_count: u64,
    peak_pressure: usize,
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator {
            in_use: HashMap::new(),
            next_stamp: 0,
            callee_saved_enabled: false,
            spill_count: 0,
            peak_pressure: 0,
        }
    }

    /// Reset per-function state; statistics survive.
    pub fn reset(&mut self) {
        self.in_use.clear();
        self.callee_saved_enabled = false;
    }

    /// Allow handing out callee-saved registers (prologue saved them).
    pub fn enable_callee_saved(&mut self) {
        self.callee_saved_enabled = true;
    }

    /// Allocate a general-purpose register, preferring the requested class.
    /// Returns the register and, when a spill was needed, the spill event.
    pub fn allocate(
        &mut self,
        caller_saved: bool,
        locals: &mut LocalTable,
    ) -> (Register, Option<SpillEvent>) {
        let preferred: &[Register] = if caller_saved {
            &CALLER_SAVED_POOL
        } else if self.callee_saved_enabled {
            &CALLEE_SAVED_POOL
        } else {
            &CALLER_SAVED_POOL
        };
        if let Some(reg) = self.find_free(preferred) {
            return (self.take(reg), None);
        }
        // Fall through to the other class before spilling.
        let fallback: &[Register] = if caller_saved && self.callee_saved_enabled {
            &CALLEE_SAVED_POOL
        } else {
            &CALLER_SAVED_POOL
        };
        if let Some(reg) = self.find_free(fallback) {
            return (self.take(reg), None);
        }
        let victim = self.spill_victim(false);
        let offset = locals.allocate_anon(8, 8);
        self.spill_count += 1;
        self.in_use.remove(&victim);
        (
            self.take(victim),
            Some(SpillEvent {
                register: victim,
                offset,
            }),
        )
    }

    /// Allocate a floating-point register.
    pub fn allocate_float(&mut self, locals: &mut LocalTable) -> (Register, Option<SpillEvent>) {
        if let Some(reg) = self.find_free(&FLOAT_POOL) {
            return (self.take(reg), None);
        }
        let victim = self.spill_victim(true);
        let offset = locals.allocate_anon(8, 8);
        self.spill_count += 1;
        self.in_use.remove(&victim);
        (
            self.take(victim),
            Some(SpillEvent {
                register: victim,
                offset,
            }),
        )
    }

    /// Mark a register free again.
    pub fn free(&mut self, register: Register) {
        self.in_use.remove(&register);
    }

    pub fn is_free(&self, register: Register) -> bool {
        !self.in_use.contains_key(&register)
    }

    /// Claim a specific register (argument setup, return values).
    /// The caller must know it is free.
    pub fn claim(&mut self, register: Register) {
        self.take(register);
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn spill_count(&self) -> u64 {
        self.spill_count
    }

    pub fn peak_pressure(&self) -> usize {
        self.peak_pressure
    }

    fn find_free(&self, pool: &[Register]) -> Option<Register> {
        pool.iter().copied().find(|r| !self.in_use.contains_key(r))
    }

    fn take(&mut self, register: Register) -> Register {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.in_use.insert(register, stamp);
        self.peak_pressure = self.peak_pressure.max(self.in_use.len());
        register
    }

    /// Oldest allocation in the requested class; its next use is assumed
    /// furthest away.
    fn spill_victim(&self, float: bool) -> Register {
        self.in_use
            .iter()
            .filter(|(r, _)| r.is_float() == float)
            .min_by_key(|&(_, &stamp)| stamp)
            .map(|(&r, _)| r)
            .expect("allocation pool exhausted with nothing to spill")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut regs = RegisterAllocator::new();
        let mut locals = LocalTable::new();
        let (a, spill) = regs.allocate(true, &mut locals);
        assert!(spill.is_none());
        assert!(!regs.is_free(a));
        regs.free(a);
        assert!(regs.is_free(a));
    }

    #[test]
    fn test_callee_saved_withheld_until_enabled() {
        let mut regs = RegisterAllocator::new();
        let mut locals = LocalTable::new();
        let (reg, _) = regs.allocate(false, &mut locals);
        assert!(!reg.is_callee_saved());
        regs.free(reg);
        regs.enable_callee_saved();
        let (reg, _) = regs.allocate(false, &mut locals);
        assert!(reg.is_callee_saved());
    }

    #[test]
    fn test_exhaustion_spills_oldest() {
        let mut regs = RegisterAllocator::new();
        let mut locals = LocalTable::new();
        let mut held = Vec::new();
        // Drain the caller-saved pool.
        for _ in 0..CALLER_SAVED_POOL.len() {
            let (reg, spill) = regs.allocate(true, &mut locals);
            assert!(spill.is_none());
            held.push(reg);
        }
        let (reg, spill) = regs.allocate(true, &mut locals);
        let spill = spill.expect("exhausted pool must spill");
        // The oldest allocation is the first one handed out.
        assert_eq!(spill.register, held[0]);
        assert_eq!(reg, held[0]);
        assert!(spill.offset < 0);
        assert_eq!(regs.spill_count(), 1);
    }

    #[test]
    fn test_peak_pressure_tracking() {
        let mut regs = RegisterAllocator::new();
        let mut locals = LocalTable::new();
        let (a, _) = regs.allocate(true, &mut locals);
        let (b, _) = regs.allocate(true, &mut locals);
        regs.free(a);
        regs.free(b);
        assert_eq!(regs.peak_pressure(), 2);
        assert_eq!(regs.in_use_count(), 0);
    }

    #[test]
    fn test_float_pool_separate() {
        let mut regs = RegisterAllocator::new();
        let mut locals = LocalTable::new();
        let (f, spill) = regs.allocate_float(&mut locals);
        assert!(f.is_float());
        assert!(spill.is_none());
    }
}
