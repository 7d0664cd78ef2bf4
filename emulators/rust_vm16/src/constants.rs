//! Architectural constants for the 16-bit word machine.

/// Number of addressable words in the program store (15-bit address space).
pub const MEMORY_WORDS: usize = 0x8000;

/// Raw operand value that encodes register 0; `REGISTER_BASE + n` encodes register `n`.
pub const REGISTER_BASE: u16 = 0x8000;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// First raw operand value that is neither a literal nor a register encoding.
pub const OPERAND_LIMIT: u16 = REGISTER_BASE + REGISTER_COUNT as u16;

/// Arithmetic and addresses are reduced modulo 32768.
pub const WORD_MASK: u16 = 0x7FFF;

/// Full 16-bit mask applied by `not` before the final reduction.
pub const FULL_MASK: u16 = 0xFFFF;
