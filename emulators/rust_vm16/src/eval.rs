use crate::bus::Bus;
use crate::constants::{FULL_MASK, OPERAND_LIMIT, REGISTER_BASE, WORD_MASK};
use crate::isa::{decode_opcode, Mode, Opcode};
use crate::operand::resolve;
use crate::state::State;
use crate::trace::TraceSink;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid operand {raw} in instruction at {address}")]
    InvalidOperand { address: u16, raw: u16 },
    #[error("undefined opcode {opcode} at {address}")]
    UndefinedOpcode { address: u16, opcode: u16 },
    #[error("stack underflow in {opcode} at {address}")]
    StackUnderflow { address: u16, opcode: Opcode },
    #[error("division by zero in mod at {address}")]
    DivisionByZero { address: u16 },
    #[error("destination {raw} of instruction at {address} is not a register")]
    NotARegister { address: u16, raw: u16 },
    #[error("execution ran past the end of the program at {address}")]
    EndOfProgram { address: u16 },
    #[error("program image has odd length {0}")]
    OddImageLength(usize),
    #[error("program image of {0} words exceeds the address space")]
    ImageTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit status for this failure; every kind is distinct and non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Io(_) | Error::OddImageLength(_) | Error::ImageTooLarge(_) => 1,
            Error::InvalidOperand { .. } => 2,
            Error::UndefinedOpcode { .. } => 3,
            Error::StackUnderflow { .. } => 4,
            Error::DivisionByZero { .. } => 5,
            Error::NotARegister { .. } => 6,
            Error::EndOfProgram { .. } => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Halted,
    Faulted,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        self != Status::Running
    }
}

struct Env<'a, B: Bus, S: TraceSink, W: Write> {
    state: &'a mut State,
    bus: &'a mut B,
    sink: &'a mut S,
    out: &'a mut W,
    /// Address of the opcode word being executed.
    pc: u16,
}

impl<'a, B: Bus, S: TraceSink, W: Write> Env<'a, B, S, W> {
    fn read(&mut self, mode: Mode) -> Result<u16> {
        let address = self.state.ip;
        if !self.bus.is_mapped(address) {
            return Err(Error::EndOfProgram { address });
        }
        let raw = self.bus.load(address);
        let resolved = resolve(raw, mode, self.state).map_err(|raw| Error::InvalidOperand {
            address: self.pc,
            raw,
        })?;
        self.sink.operand(address, raw, mode, resolved);
        Ok(resolved)
    }

    /// Advance to the next operand word and resolve it.
    fn next(&mut self, mode: Mode) -> Result<u16> {
        self.state.advance();
        self.read(mode)
    }

    /// Step over an operand word without reading it.
    fn skip(&mut self) {
        self.state.advance();
    }

    fn next_register(&mut self) -> Result<usize> {
        let raw = self.next(Mode::RegisterIndex)?;
        let operand_word = self.bus.load(self.state.ip);
        if operand_word < REGISTER_BASE {
            return Err(Error::NotARegister {
                address: self.pc,
                raw,
            });
        }
        Ok(raw as usize)
    }

    fn set_register(&mut self, index: usize, value: u16) {
        let before = self.state.set_reg(index, value);
        self.sink.register_write(index, before, value);
    }

    fn store(&mut self, address: u16, value: u16) {
        let address = address & WORD_MASK;
        let before = self.bus.load(address);
        self.bus.store(address, value);
        self.sink.memory_write(address, before, value);
    }

    /// Write `value` to a raw destination: memory below 32768, a register in
    /// the register range, fatal otherwise.
    fn write(&mut self, dst: u16, value: u16) -> Result<()> {
        if dst < REGISTER_BASE {
            self.store(dst, value);
            Ok(())
        } else if dst < OPERAND_LIMIT {
            self.set_register((dst - REGISTER_BASE) as usize, value);
            Ok(())
        } else {
            Err(Error::InvalidOperand {
                address: self.pc,
                raw: dst,
            })
        }
    }

    fn push(&mut self, value: u16) {
        self.state.push(value);
        self.sink.stack_push(value, self.state.stack_depth());
    }

    fn pop(&mut self, opcode: Opcode) -> Result<u16> {
        let value = self.state.pop().ok_or(Error::StackUnderflow {
            address: self.pc,
            opcode,
        })?;
        self.sink.stack_pop(value, self.state.stack_depth());
        Ok(value)
    }

    fn jump(&mut self, target: u16) {
        self.state.set_ip(target);
        self.sink.jump(self.pc, self.state.ip);
    }

    /// `dst a b` instructions: resolve both values and write `f(a, b)`.
    fn binary(&mut self, f: impl FnOnce(u16, u16) -> Result<u16>) -> Result<()> {
        let dst = self.next(Mode::RawAddress)?;
        let a = self.next(Mode::Value)?;
        let b = self.next(Mode::Value)?;
        let value = f(a, b)?;
        self.write(dst, value)
    }
}

/// Execute the instruction at `state.ip`.
///
/// On return the instruction pointer addresses the next instruction, or is
/// left on the halting instruction. Errors leave the state as it was when the
/// fault was detected.
pub fn step<B, S, W>(state: &mut State, bus: &mut B, sink: &mut S, out: &mut W) -> Result<Status>
where
    B: Bus,
    S: TraceSink,
    W: Write,
{
    let pc = state.ip;
    let mut env = Env {
        state,
        bus,
        sink,
        out,
        pc,
    };

    let word = env.read(Mode::Value)?;
    let opcode = decode_opcode(word).ok_or(Error::UndefinedOpcode {
        address: pc,
        opcode: word,
    })?;
    env.sink.instruction(pc, opcode);

    match opcode {
        Opcode::Halt => {
            env.sink.halted(pc);
            return Ok(Status::Halted);
        }
        Opcode::Set => {
            let dst = env.next_register()?;
            let value = env.next(Mode::Value)?;
            env.set_register(dst, value);
        }
        Opcode::Push => {
            let value = env.next(Mode::Value)?;
            env.push(value);
        }
        Opcode::Pop => {
            let dst = env.next(Mode::RawAddress)?;
            // Reject the destination before the stack is touched.
            if dst >= OPERAND_LIMIT {
                return Err(Error::InvalidOperand { address: pc, raw: dst });
            }
            let value = env.pop(opcode)?;
            env.write(dst, value)?;
        }
        Opcode::Eq => env.binary(|a, b| Ok((a == b) as u16))?,
        Opcode::Gt => env.binary(|a, b| Ok((a > b) as u16))?,
        Opcode::Jmp => {
            let target = env.next(Mode::Value)?;
            env.jump(target);
            return Ok(Status::Running);
        }
        Opcode::Jt | Opcode::Jf => {
            let cond = env.next(Mode::Value)?;
            let taken = if opcode == Opcode::Jt {
                cond != 0
            } else {
                cond == 0
            };
            if taken {
                let target = env.next(Mode::Value)?;
                env.jump(target);
                return Ok(Status::Running);
            }
            env.skip();
        }
        Opcode::Add => env.binary(|a, b| Ok(((a as u32 + b as u32) % 0x8000) as u16))?,
        Opcode::Mult => env.binary(|a, b| Ok(((a as u32 * b as u32) % 0x8000) as u16))?,
        Opcode::Mod => env.binary(|a, b| {
            if b == 0 {
                Err(Error::DivisionByZero { address: pc })
            } else {
                Ok((a % b) & WORD_MASK)
            }
        })?,
        Opcode::And => env.binary(|a, b| Ok((a & b) & WORD_MASK))?,
        Opcode::Or => env.binary(|a, b| Ok((a | b) & WORD_MASK))?,
        Opcode::Not => {
            let dst = env.next(Mode::RawAddress)?;
            let a = env.next(Mode::Value)?;
            env.write(dst, (!a & FULL_MASK) & WORD_MASK)?;
        }
        Opcode::Rmem => {
            let dst = env.next_register()?;
            let src = env.next(Mode::Value)? & WORD_MASK;
            let raw = env.bus.load(src);
            let value = resolve(raw, Mode::Value, env.state)
                .map_err(|raw| Error::InvalidOperand { address: pc, raw })?;
            env.sink.operand(src, raw, Mode::Value, value);
            env.set_register(dst, value);
        }
        Opcode::Wmem => {
            let dst = env.next(Mode::Value)?;
            let value = env.next(Mode::Value)?;
            env.store(dst, value);
        }
        Opcode::Call => {
            env.push(pc.wrapping_add(2) & WORD_MASK);
            let target = env.next(Mode::Value)?;
            env.jump(target);
            return Ok(Status::Running);
        }
        Opcode::Ret => {
            let target = env.pop(opcode)?;
            env.jump(target);
            return Ok(Status::Running);
        }
        Opcode::Out => {
            if env.sink.is_active() {
                env.skip();
            } else {
                let code = env.next(Mode::Value)?;
                // Resolved values stay below the surrogate range.
                let ch = char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                env.out.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
                if ch == '\n' {
                    env.out.flush()?;
                }
            }
        }
        Opcode::Noop => {}
    }

    env.state.advance();
    Ok(Status::Running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::trace::{NullSink, OpcodeProfile};

    const R0: u16 = 32768;
    const R1: u16 = 32769;

    fn exec(program: &[u16]) -> (State, MemoryBus, Vec<u8>, Result<Status>) {
        let mut state = State::new();
        let mut bus = MemoryBus::from_words(program).unwrap();
        let mut out = Vec::new();
        let result = step(&mut state, &mut bus, &mut NullSink, &mut out);
        (state, bus, out, result)
    }

    #[test]
    fn halt_leaves_ip_on_the_halt() {
        let (state, _, out, result) = exec(&[0, 19, 65]);
        assert_eq!(result.unwrap(), Status::Halted);
        assert_eq!(state.ip, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn set_writes_register_and_advances_past_operands() {
        let (state, _, _, result) = exec(&[1, R1, 300, 0]);
        assert_eq!(result.unwrap(), Status::Running);
        assert_eq!(state.get_reg(1), 300);
        assert_eq!(state.ip, 3);
    }

    #[test]
    fn set_with_literal_destination_is_rejected() {
        let (_, _, _, result) = exec(&[1, 3, 300]);
        assert!(matches!(
            result,
            Err(Error::NotARegister { address: 0, raw: 3 })
        ));
    }

    #[test]
    fn arithmetic_writes_to_memory_destinations() {
        let (_, bus, _, result) = exec(&[9, 10, 32767, 5, 0, 0, 0, 0, 0, 0, 0]);
        result.unwrap();
        assert_eq!(bus.load(10), 4);
    }

    #[test]
    fn not_reduces_over_fifteen_bits() {
        let (state, _, _, _) = exec(&[14, R0, 0]);
        assert_eq!(state.get_reg(0), 32767);
        let (state, _, _, _) = exec(&[14, R0, 32767]);
        assert_eq!(state.get_reg(0), 0);
        let (state, _, _, _) = exec(&[14, R0, 0x5555]);
        assert_eq!(state.get_reg(0), 0x2AAA);
    }

    #[test]
    fn rmem_with_literal_destination_is_rejected() {
        let (_, _, _, result) = exec(&[15, 3, 5]);
        assert!(matches!(
            result,
            Err(Error::NotARegister { address: 0, raw: 3 })
        ));
    }

    #[test]
    fn set_with_out_of_range_destination_is_invalid() {
        let (state, _, _, result) = exec(&[1, 40000, 9]);
        assert!(matches!(
            result,
            Err(Error::InvalidOperand { address: 0, raw: 40000 })
        ));
        assert_eq!(state.registers(), &[0; 8]);
    }

    #[test]
    fn pop_to_invalid_destination_keeps_the_stack() {
        let mut state = State::new();
        state.push(5);
        let mut bus = MemoryBus::from_words(&[3, 40000]).unwrap();
        let result = step(&mut state, &mut bus, &mut NullSink, &mut Vec::new());
        assert!(matches!(
            result,
            Err(Error::InvalidOperand { address: 0, raw: 40000 })
        ));
        assert_eq!(state.stack(), &[5]);
    }

    #[test]
    fn mod_by_zero_faults() {
        let (_, _, _, result) = exec(&[11, R0, 7, 0]);
        assert!(matches!(result, Err(Error::DivisionByZero { address: 0 })));
    }

    #[test]
    fn invalid_write_destination_faults_after_reading_operands() {
        let (_, _, _, result) = exec(&[4, 40000, 1, 1]);
        assert!(matches!(
            result,
            Err(Error::InvalidOperand { address: 0, raw: 40000 })
        ));
    }

    #[test]
    fn undefined_opcodes_fault() {
        for word in [20u16, 22, 1000] {
            let (_, _, _, result) = exec(&[word]);
            assert!(
                matches!(result, Err(Error::UndefinedOpcode { opcode, .. }) if opcode == word),
                "{word}"
            );
        }
    }

    #[test]
    fn opcode_word_may_come_from_a_register() {
        let mut state = State::new();
        state.set_reg(0, 21);
        let mut bus = MemoryBus::from_words(&[R0, 0]).unwrap();
        let status = step(&mut state, &mut bus, &mut NullSink, &mut Vec::new()).unwrap();
        assert_eq!(status, Status::Running);
        assert_eq!(state.ip, 1);
    }

    #[test]
    fn jt_not_taken_skips_an_invalid_target_unread() {
        let (state, _, _, result) = exec(&[7, 0, 65000, 0]);
        assert_eq!(result.unwrap(), Status::Running);
        assert_eq!(state.ip, 3);
    }

    #[test]
    fn jf_not_taken_skips_an_invalid_target_unread() {
        let (state, _, _, result) = exec(&[8, 1, 65000, 0]);
        assert_eq!(result.unwrap(), Status::Running);
        assert_eq!(state.ip, 3);
    }

    #[test]
    fn jump_targets_wrap() {
        let (state, _, _, _) = exec(&[6, R0]);
        assert_eq!(state.ip, 0);
        let mut state = State::new();
        state.set_reg(0, 32767);
        let mut bus = MemoryBus::from_words(&[6, R0]).unwrap();
        step(&mut state, &mut bus, &mut NullSink, &mut Vec::new()).unwrap();
        assert_eq!(state.ip, 32767);
    }

    #[test]
    fn call_pushes_the_return_address() {
        let (state, _, _, _) = exec(&[17, 50]);
        assert_eq!(state.stack(), &[2]);
        assert_eq!(state.ip, 50);
    }

    #[test]
    fn ret_and_pop_on_empty_stack_underflow() {
        let (_, _, _, result) = exec(&[18]);
        assert!(matches!(
            result,
            Err(Error::StackUnderflow { opcode: Opcode::Ret, .. })
        ));
        let (_, _, _, result) = exec(&[3, R0]);
        assert!(matches!(
            result,
            Err(Error::StackUnderflow { opcode: Opcode::Pop, .. })
        ));
    }

    #[test]
    fn rmem_dereferences_register_encodings_in_memory() {
        let mut state = State::new();
        state.set_reg(2, 4242);
        let mut bus = MemoryBus::from_words(&[15, R0, 3, 32770]).unwrap();
        step(&mut state, &mut bus, &mut NullSink, &mut Vec::new()).unwrap();
        assert_eq!(state.get_reg(0), 4242);
        assert_eq!(state.ip, 3);
    }

    #[test]
    fn rmem_of_invalid_word_faults() {
        let (_, _, _, result) = exec(&[15, R0, 3, 50000]);
        assert!(matches!(
            result,
            Err(Error::InvalidOperand { raw: 50000, .. })
        ));
    }

    #[test]
    fn wmem_wraps_the_address() {
        let mut state = State::new();
        state.set_reg(1, 99);
        let mut bus = MemoryBus::from_words(&[16, 10, R1]).unwrap();
        step(&mut state, &mut bus, &mut NullSink, &mut Vec::new()).unwrap();
        assert_eq!(bus.load(10), 99);
    }

    #[test]
    fn out_emits_utf8() {
        let (_, _, out, _) = exec(&[19, 0xE9]);
        assert_eq!(String::from_utf8(out).unwrap(), "é");
        let (_, _, out, _) = exec(&[19, 0x4E2D]);
        assert_eq!(String::from_utf8(out).unwrap(), "中");
    }

    #[test]
    fn out_is_suppressed_under_an_active_sink() {
        let mut state = State::new();
        let mut bus = MemoryBus::from_words(&[19, 60000]).unwrap();
        let mut out = Vec::new();
        let status = step(&mut state, &mut bus, &mut crate::trace::LogSink, &mut out).unwrap();
        assert_eq!(status, Status::Running);
        assert!(out.is_empty());
        assert_eq!(state.ip, 2);
    }

    #[test]
    fn fetch_past_the_image_is_fatal() {
        let (_, _, _, result) = exec(&[9, R0, 1]);
        assert!(matches!(result, Err(Error::EndOfProgram { address: 3 })));
    }

    #[test]
    fn sink_sees_the_fetched_opcode() {
        let mut state = State::new();
        let mut bus = MemoryBus::from_words(&[21, 0]).unwrap();
        let mut profile = OpcodeProfile::new();
        step(&mut state, &mut bus, &mut profile, &mut Vec::new()).unwrap();
        assert_eq!(profile.count(Opcode::Noop), 1);
    }

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            Error::InvalidOperand { address: 0, raw: 0 },
            Error::UndefinedOpcode { address: 0, opcode: 0 },
            Error::StackUnderflow {
                address: 0,
                opcode: Opcode::Ret,
            },
            Error::DivisionByZero { address: 0 },
            Error::NotARegister { address: 0, raw: 0 },
            Error::EndOfProgram { address: 0 },
        ];
        let mut codes: Vec<u8> = errors.iter().map(Error::exit_code).collect();
        assert!(codes.iter().all(|&c| c > 1));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
