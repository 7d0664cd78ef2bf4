//! Opcode table and operand-mode metadata.
//!
//! Each opcode carries its mnemonic and the resolution mode of every operand
//! word that follows it, which fixes the encoded length of the instruction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an operand word is turned into a usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Literals pass through; register encodings are replaced by the register's content.
    Value,
    /// Literals pass through; register encodings yield the bare register index.
    RegisterIndex,
    /// The raw word is returned unvalidated, to be dispatched by a later write.
    RawAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum Opcode {
    Halt = 0,
    Set = 1,
    Push = 2,
    Pop = 3,
    Eq = 4,
    Gt = 5,
    Jmp = 6,
    Jt = 7,
    Jf = 8,
    Add = 9,
    Mult = 10,
    Mod = 11,
    And = 12,
    Or = 13,
    Not = 14,
    Rmem = 15,
    Wmem = 16,
    Call = 17,
    Ret = 18,
    Out = 19,
    // 20 is unassigned.
    Noop = 21,
}

const ALL: [Opcode; 21] = [
    Opcode::Halt,
    Opcode::Set,
    Opcode::Push,
    Opcode::Pop,
    Opcode::Eq,
    Opcode::Gt,
    Opcode::Jmp,
    Opcode::Jt,
    Opcode::Jf,
    Opcode::Add,
    Opcode::Mult,
    Opcode::Mod,
    Opcode::And,
    Opcode::Or,
    Opcode::Not,
    Opcode::Rmem,
    Opcode::Wmem,
    Opcode::Call,
    Opcode::Ret,
    Opcode::Out,
    Opcode::Noop,
];

impl Opcode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "halt",
            Opcode::Set => "set",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Eq => "eq",
            Opcode::Gt => "gt",
            Opcode::Jmp => "jmp",
            Opcode::Jt => "jt",
            Opcode::Jf => "jf",
            Opcode::Add => "add",
            Opcode::Mult => "mult",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Rmem => "rmem",
            Opcode::Wmem => "wmem",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Out => "out",
            Opcode::Noop => "noop",
        }
    }

    /// Resolution mode of each operand word, in encoding order.
    pub fn operand_modes(self) -> &'static [Mode] {
        use Mode::*;
        match self {
            Opcode::Halt | Opcode::Ret | Opcode::Noop => &[],
            Opcode::Set | Opcode::Rmem => &[RegisterIndex, Value],
            Opcode::Push | Opcode::Jmp | Opcode::Call | Opcode::Out => &[Value],
            Opcode::Pop => &[RawAddress],
            Opcode::Eq
            | Opcode::Gt
            | Opcode::Add
            | Opcode::Mult
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or => &[RawAddress, Value, Value],
            Opcode::Jt | Opcode::Jf | Opcode::Wmem => &[Value, Value],
            Opcode::Not => &[RawAddress, Value],
        }
    }

    /// Encoded length in words, opcode included.
    pub fn length(self) -> u16 {
        1 + self.operand_modes().len() as u16
    }

    /// Whether the instruction can redirect the instruction pointer.
    pub fn is_control_transfer(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jt | Opcode::Jf | Opcode::Call | Opcode::Ret
        )
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0..=19 => Ok(ALL[value as usize]),
            21 => Ok(Opcode::Noop),
            other => Err(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decode an opcode word. Returns `None` for 20 and anything above 21.
pub fn decode_opcode(word: u16) -> Option<Opcode> {
    Opcode::try_from(word).ok()
}

/// Iterate over every assigned opcode in numeric order.
pub fn all_opcodes() -> impl Iterator<Item = Opcode> {
    ALL.iter().copied()
}
