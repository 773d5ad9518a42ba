//! The instruction module contains the decoded instruction representation
//! and the opcode table. The instruction table built from an [`crate::image`]
//! is immutable after load and is indexed directly by the program counter.

use crate::memory::Word;

/// Every opcode the machine understands. Operand counts are fixed per
/// opcode and enforced by the image parser, not by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Set,
    Cpy,
    Cpyi,
    Cpyi2,
    Add,
    Addi,
    Subi,
    Jif,
    Push,
    Pop,
    Call,
    Ret,
    Hlt,
    User,
    Loadi,
    Storei,
    SyscallPrn,
    SyscallHlt,
    SyscallYield,
}

impl Opcode {
    /// The number of operands this opcode takes, matching the table in
    /// the machine's instruction set.
    pub fn operand_count(self) -> u8 {
        match self {
            Opcode::Set
            | Opcode::Cpy
            | Opcode::Cpyi
            | Opcode::Cpyi2
            | Opcode::Add
            | Opcode::Addi
            | Opcode::Subi
            | Opcode::Jif
            | Opcode::Loadi
            | Opcode::Storei => 2,
            Opcode::Push | Opcode::Pop | Opcode::Call | Opcode::User | Opcode::SyscallPrn => 1,
            Opcode::Ret | Opcode::Hlt | Opcode::SyscallHlt | Opcode::SyscallYield => 0,
        }
    }

    /// Parse a case-insensitive mnemonic into an opcode. `SYSCALL` is handled
    /// separately by the image parser since it carries a subtype token.
    pub fn from_mnemonic(token: &str) -> Option<Opcode> {
        match token.to_ascii_uppercase().as_str() {
            "SET" => Some(Opcode::Set),
            "CPY" => Some(Opcode::Cpy),
            "CPYI" => Some(Opcode::Cpyi),
            "CPYI2" => Some(Opcode::Cpyi2),
            "ADD" => Some(Opcode::Add),
            "ADDI" => Some(Opcode::Addi),
            "SUBI" => Some(Opcode::Subi),
            "JIF" => Some(Opcode::Jif),
            "PUSH" => Some(Opcode::Push),
            "POP" => Some(Opcode::Pop),
            "CALL" => Some(Opcode::Call),
            "RET" => Some(Opcode::Ret),
            "HLT" => Some(Opcode::Hlt),
            "USER" => Some(Opcode::User),
            "LOADI" => Some(Opcode::Loadi),
            "STOREI" => Some(Opcode::Storei),
            _ => None,
        }
    }
}

/// A single decoded instruction. Absent operands are stored as 0.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg1: Word,
    pub arg2: Word,
    pub operand_count: u8,
    /// The trimmed source text the instruction was parsed from. Empty for a
    /// hole (see [`Instruction::is_hole`]).
    pub source_text: String,
}

impl Instruction {
    pub fn new(opcode: Opcode, arg1: Word, arg2: Word, operand_count: u8, source_text: String) -> Self {
        Self {
            opcode,
            arg1,
            arg2,
            operand_count,
            source_text,
        }
    }

    /// A hole is an instruction slot the loader never populated. It executes
    /// as an implicit HLT.
    pub fn is_hole(&self) -> bool {
        self.source_text.is_empty()
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self {
            opcode: Opcode::Hlt,
            arg1: 0,
            arg2: 0,
            operand_count: 0,
            source_text: String::new(),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_hole() {
            write!(f, "<hole>")
        } else {
            write!(f, "{}", self.source_text)
        }
    }
}
