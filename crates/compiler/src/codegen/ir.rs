//! Intermediate representation
//!
//! A flat buffer of pseudo-instructions over an abstract register file.
//! The operand model matches a canonical AT&T-like x86-64 machine but is
//! architecture-agnostic; per-target text formatting is an external
//! pretty-printer over this IR.

use std::fmt;

/// The abstract register file: 16 general-purpose registers, 16 floating
/// registers, and a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
    None,
}

impl Register {
    /// Total register count, excluding the sentinel.
    pub const COUNT: usize = 32;

    // x86-64 role aliases, in hardware encoding order.
    pub const RAX: Register = Register::R0;
    pub const RCX: Register = Register::R1;
    pub const RDX: Register = Register::R2;
    pub const RBX: Register = Register::R3;
    pub const RSP: Register = Register::R4;
    pub const RBP: Register = Register::R5;
    pub const RSI: Register = Register::R6;
    pub const RDI: Register = Register::R7;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            Register::Xmm0
                | Register::Xmm1
                | Register::Xmm2
                | Register::Xmm3
                | Register::Xmm4
                | Register::Xmm5
                | Register::Xmm6
                | Register::Xmm7
                | Register::Xmm8
                | Register::Xmm9
                | Register::Xmm10
                | Register::Xmm11
                | Register::Xmm12
                | Register::Xmm13
                | Register::Xmm14
                | Register::Xmm15
        )
    }

    /// Callee-saved under the System V AMD64 ABI.
    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            Register::RBP
                | Register::RBX
                | Register::R12
                | Register::R13
                | Register::R14
                | Register::R15
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::R0 => "rax",
            Register::R1 => "rcx",
            Register::R2 => "rdx",
            Register::R3 => "rbx",
            Register::R4 => "rsp",
            Register::R5 => "rbp",
            Register::R6 => "rsi",
            Register::R7 => "rdi",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R12 => "r12",
            Register::R13 => "r13",
            Register::R14 => "r14",
            Register::R15 => "r15",
            Register::Xmm0 => "xmm0",
            Register::Xmm1 => "xmm1",
            Register::Xmm2 => "xmm2",
            Register::Xmm3 => "xmm3",
            Register::Xmm4 => "xmm4",
            Register::Xmm5 => "xmm5",
            Register::Xmm6 => "xmm6",
            Register::Xmm7 => "xmm7",
            Register::Xmm8 => "xmm8",
            Register::Xmm9 => "xmm9",
            Register::Xmm10 => "xmm10",
            Register::Xmm11 => "xmm11",
            Register::Xmm12 => "xmm12",
            Register::Xmm13 => "xmm13",
            Register::Xmm14 => "xmm14",
            Register::Xmm15 => "xmm15",
            Register::None => "none",
        }
    }
}

/// Integer argument registers, System V AMD64 order.
pub const ARG_REGISTERS: [Register; 6] = [
    Register::RDI,
    Register::RSI,
    Register::RDX,
    Register::RCX,
    Register::R8,
    Register::R9,
];

/// Floating argument registers, System V AMD64 order. Float arguments are
/// counted in their own sequence, independent of the integer one.
pub const FLOAT_ARG_REGISTERS: [Register; 8] = [
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
    Register::Xmm6,
    Register::Xmm7,
];

/// Callee-saved registers the prologue preserves.
pub const CALLEE_SAVED: [Register; 6] = [
    Register::RBP,
    Register::RBX,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Mov,
    Lea,
    Add,
    Sub,
    Imul,
    Idiv,
    Cqo,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Cmp,
    Test,
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Inc,
    Dec,
    Call,
    Ret,
    Push,
    Pop,
    Label,
    // Floating variants
    Movss,
    Movsd,
    Addss,
    Addsd,
    Subss,
    Subsd,
    Mulss,
    Mulsd,
    Divss,
    Divsd,
    Ucomiss,
    Ucomisd,
    Cvtsi2sd,
    Cvtsi2ss,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Lea => "lea",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Imul => "imul",
            Opcode::Idiv => "idiv",
            Opcode::Cqo => "cqo",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Cmp => "cmp",
            Opcode::Test => "test",
            Opcode::Jmp => "jmp",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Jg => "jg",
            Opcode::Jge => "jge",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Label => "label",
            Opcode::Movss => "movss",
            Opcode::Movsd => "movsd",
            Opcode::Addss => "addss",
            Opcode::Addsd => "addsd",
            Opcode::Subss => "subss",
            Opcode::Subsd => "subsd",
            Opcode::Mulss => "mulss",
            Opcode::Mulsd => "mulsd",
            Opcode::Divss => "divss",
            Opcode::Divsd => "divsd",
            Opcode::Ucomiss => "ucomiss",
            Opcode::Ucomisd => "ucomisd",
            Opcode::Cvtsi2sd => "cvtsi2sd",
            Opcode::Cvtsi2ss => "cvtsi2ss",
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Je
                | Opcode::Jne
                | Opcode::Jl
                | Opcode::Jle
                | Opcode::Jg
                | Opcode::Jge
        )
    }
}

/// One instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(Register),
    Immediate(i64),
    Memory {
        base: Register,
        index: Option<Register>,
        /// Index scale; must be 1, 2, 4, or 8.
        scale: u8,
        displacement: i64,
    },
    Label(String),
}

impl Operand {
    pub fn mem(base: Register, displacement: i64) -> Self {
        Operand::Memory {
            base,
            index: None,
            scale: 1,
            displacement,
        }
    }

    pub fn mem_indexed(base: Register, index: Register, scale: u8, displacement: i64) -> Self {
        Operand::Memory {
            base,
            index: Some(index),
            scale,
            displacement,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r.name()),
            Operand::Immediate(v) => write!(f, "{}", v),
            Operand::Memory {
                base,
                index,
                scale,
                displacement,
            } => {
                write!(f, "[{}", base.name())?;
                if let Some(index) = index {
                    write!(f, " + {}*{}", index.name(), scale)?;
                }
                if *displacement > 0 {
                    write!(f, " + {}", displacement)?;
                } else if *displacement < 0 {
                    write!(f, " - {}", -displacement)?;
                }
                write!(f, "]")
            }
            Operand::Label(name) => write!(f, "{}", name),
        }
    }
}

/// One pseudo-instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// Branch prediction hint: Some(true) = likely taken.
    pub branch_hint: Option<bool>,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Instruction {
            opcode,
            operands,
            branch_hint: None,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// A label pseudo-instruction marking a branch target.
    pub fn label(name: impl Into<String>) -> Self {
        Instruction::new(Opcode::Label, vec![Operand::Label(name.into())])
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode == Opcode::Label {
            if let Some(Operand::Label(name)) = self.operands.first() {
                write!(f, "{}:", name)?;
            }
        } else {
            write!(f, "    {}", self.opcode.mnemonic())?;
            for (i, op) in self.operands.iter().enumerate() {
                if i == 0 {
                    write!(f, " {}", op)?;
                } else {
                    write!(f, ", {}", op)?;
                }
            }
        }
        if let Some(comment) = &self.comment {
            write!(f, "  ; {}", comment)?;
        }
        Ok(())
    }
}

/// Self-validation over an instruction buffer: every operand must satisfy
/// its type's constraints. Run before handing the IR to a formatter.
pub fn validate(instructions: &[Instruction]) -> Result<(), String> {
    for (i, instruction) in instructions.iter().enumerate() {
        for operand in &instruction.operands {
            match operand {
                Operand::Register(r) => {
                    if *r == Register::None {
                        return Err(format!(
                            "instruction {}: the sentinel register is not a valid operand",
                            i
                        ));
                    }
                }
                Operand::Memory {
                    base,
                    index,
                    scale,
                    ..
                } => {
                    if *base == Register::None {
                        return Err(format!("instruction {}: memory base is the sentinel", i));
                    }
                    if index.is_some() && ![1, 2, 4, 8].contains(scale) {
                        return Err(format!(
                            "instruction {}: scale {} is not in {{1, 2, 4, 8}}",
                            i, scale
                        ));
                    }
                }
                Operand::Label(name) => {
                    if name.is_empty() {
                        return Err(format!("instruction {}: empty label operand", i));
                    }
                }
                Operand::Immediate(_) => {}
            }
        }
        if instruction.branch_hint.is_some() && !instruction.opcode.is_branch() {
            return Err(format!(
                "instruction {}: branch hint on non-branch opcode {}",
                i,
                instruction.opcode.mnemonic()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_aliases() {
        assert_eq!(Register::RAX, Register::R0);
        assert_eq!(Register::RDI, Register::R7);
        assert_eq!(Register::RBP.name(), "rbp");
        assert!(Register::R12.is_callee_saved());
        assert!(!Register::R11.is_callee_saved());
        assert!(Register::Xmm3.is_float());
    }

    #[test]
    fn test_arg_register_order() {
        assert_eq!(
            ARG_REGISTERS,
            [
                Register::RDI,
                Register::RSI,
                Register::RDX,
                Register::RCX,
                Register::R8,
                Register::R9
            ]
        );
        assert_eq!(FLOAT_ARG_REGISTERS[0], Register::Xmm0);
        assert_eq!(FLOAT_ARG_REGISTERS[7], Register::Xmm7);
        assert!(FLOAT_ARG_REGISTERS.iter().all(|r| r.is_float()));
    }

    #[test]
    fn test_instruction_display() {
        let inst = Instruction::new(
            Opcode::Mov,
            vec![
                Operand::Register(Register::RAX),
                Operand::mem(Register::RBP, -8),
            ],
        );
        assert_eq!(format!("{}", inst), "    mov rax, [rbp - 8]");
        let label = Instruction::label("loop_start_1");
        assert_eq!(format!("{}", label), "loop_start_1:");
    }

    #[test]
    fn test_validate_accepts_good_ir() {
        let instructions = vec![
            Instruction::label("f"),
            Instruction::new(
                Opcode::Mov,
                vec![Operand::Register(Register::RAX), Operand::Immediate(42)],
            ),
            Instruction::new(
                Opcode::Mov,
                vec![
                    Operand::Register(Register::RCX),
                    Operand::mem_indexed(Register::RAX, Register::RDX, 8, 16),
                ],
            ),
            Instruction::new(Opcode::Ret, vec![]),
        ];
        assert!(validate(&instructions).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let instructions = vec![Instruction::new(
            Opcode::Mov,
            vec![
                Operand::Register(Register::RAX),
                Operand::mem_indexed(Register::RAX, Register::RDX, 3, 0),
            ],
        )];
        let err = validate(&instructions).unwrap_err();
        assert!(err.contains("scale 3"));
    }

    #[test]
    fn test_validate_rejects_sentinel_register() {
        let instructions = vec![Instruction::new(
            Opcode::Push,
            vec![Operand::Register(Register::None)],
        )];
        assert!(validate(&instructions).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_label() {
        let instructions = vec![Instruction::new(
            Opcode::Jmp,
            vec![Operand::Label(String::new())],
        )];
        assert!(validate(&instructions).is_err());
    }
}
