//! Interpreter for a 16-bit word bytecode machine.
//!
//! Programs are little-endian word images loaded at address 0 of a
//! 32768-word store. Eight registers are addressed through the operand range
//! 32768..32776, and an unbounded stack backs `push`/`pop` and `call`/`ret`.

pub mod bus;
pub mod constants;
pub mod disasm;
pub mod eval;
pub mod isa;
pub mod machine;
pub mod operand;
pub mod state;
pub mod trace;

pub use bus::{Bus, MemoryBus};
pub use disasm::{disassemble, Line};
pub use eval::{step, Error, Result, Status};
pub use isa::{all_opcodes, decode_opcode, Mode, Opcode};
pub use machine::{Machine, Outcome};
pub use operand::Operand;
pub use state::State;
pub use trace::{LogSink, NullSink, OpcodeProfile, TraceSink};
