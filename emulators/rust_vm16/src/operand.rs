//! Operand classification and resolution.
//!
//! Every operand word is one of: a literal (< 32768), a register encoding
//! (32768..32776), or invalid. How a register encoding is interpreted depends
//! on the [`Mode`] the instruction asks for.

use crate::constants::{OPERAND_LIMIT, REGISTER_BASE};
use crate::isa::Mode;
use crate::state::State;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Literal(u16),
    Register(usize),
    Invalid(u16),
}

impl Operand {
    pub fn classify(raw: u16) -> Self {
        if raw < REGISTER_BASE {
            Operand::Literal(raw)
        } else if raw < OPERAND_LIMIT {
            Operand::Register((raw - REGISTER_BASE) as usize)
        } else {
            Operand::Invalid(raw)
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Register(index) => write!(f, "r{index}"),
            Operand::Invalid(raw) => write!(f, "?{raw}"),
        }
    }
}

/// Resolve a raw operand word.
///
/// Returns `Err(raw)` when the word is invalid for the requested mode; only
/// `RawAddress` accepts every word, leaving validation to the eventual write.
pub fn resolve(raw: u16, mode: Mode, state: &State) -> Result<u16, u16> {
    if mode == Mode::RawAddress {
        return Ok(raw);
    }
    match Operand::classify(raw) {
        Operand::Literal(value) => Ok(value),
        Operand::Register(index) => Ok(match mode {
            Mode::RegisterIndex => index as u16,
            _ => state.get_reg(index),
        }),
        Operand::Invalid(raw) => Err(raw),
    }
}
