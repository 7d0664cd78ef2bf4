//! Diagnostic hooks reported by the dispatcher.
//!
//! Sinks never influence execution, with one exception: while an *active*
//! sink is attached, `out` is suppressed so character output does not
//! interleave with the trace.

use crate::isa::{all_opcodes, Mode, Opcode};
use std::collections::BTreeMap;
use tracing::{debug, trace};

const TARGET: &str = "vm16::trace";

pub trait TraceSink {
    /// Active sinks suppress `out`.
    fn is_active(&self) -> bool {
        false
    }
    fn instruction(&mut self, _address: u16, _opcode: Opcode) {}
    fn operand(&mut self, _address: u16, _raw: u16, _mode: Mode, _resolved: u16) {}
    fn register_write(&mut self, _index: usize, _before: u16, _after: u16) {}
    fn memory_write(&mut self, _address: u16, _before: u16, _after: u16) {}
    fn stack_push(&mut self, _value: u16, _depth: usize) {}
    fn stack_pop(&mut self, _value: u16, _depth: usize) {}
    fn jump(&mut self, _from: u16, _to: u16) {}
    fn halted(&mut self, _address: u16) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {}

/// Reports every event through `tracing` under the `vm16::trace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn is_active(&self) -> bool {
        true
    }

    fn instruction(&mut self, address: u16, opcode: Opcode) {
        debug!(target: TARGET, address, %opcode, "fetch");
    }

    fn operand(&mut self, address: u16, raw: u16, mode: Mode, resolved: u16) {
        trace!(target: TARGET, address, raw, ?mode, resolved, "operand");
    }

    fn register_write(&mut self, index: usize, before: u16, after: u16) {
        debug!(target: TARGET, register = index, before, after, "register write");
    }

    fn memory_write(&mut self, address: u16, before: u16, after: u16) {
        debug!(target: TARGET, address, before, after, "memory write");
    }

    fn stack_push(&mut self, value: u16, depth: usize) {
        debug!(target: TARGET, value, depth, "push");
    }

    fn stack_pop(&mut self, value: u16, depth: usize) {
        debug!(target: TARGET, value, depth, "pop");
    }

    fn jump(&mut self, from: u16, to: u16) {
        debug!(target: TARGET, from, to, "jump");
    }

    fn halted(&mut self, address: u16) {
        debug!(target: TARGET, address, "halt");
    }
}

/// Counts executed instructions per opcode.
#[derive(Debug, Default, Clone)]
pub struct OpcodeProfile {
    counts: BTreeMap<Opcode, u64>,
}

impl OpcodeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts.get(&opcode).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// One line per opcode that executed at least once, busiest first.
    pub fn report(&self) -> String {
        let mut rows: Vec<(Opcode, u64)> = all_opcodes()
            .map(|op| (op, self.count(op)))
            .filter(|(_, n)| *n > 0)
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let total = self.total().max(1) as f64;
        let mut out = format!("{:<6} {:>12} {:>7}\n", "opcode", "count", "share");
        for (op, n) in rows {
            out.push_str(&format!(
                "{:<6} {:>12} {:>6.2}%\n",
                op.mnemonic(),
                n,
                n as f64 * 100.0 / total
            ));
        }
        out.push_str(&format!("{:<6} {:>12}\n", "total", self.total()));
        out
    }
}

impl TraceSink for OpcodeProfile {
    fn instruction(&mut self, _address: u16, opcode: Opcode) {
        *self.counts.entry(opcode).or_insert(0) += 1;
    }
}

impl<T: TraceSink> TraceSink for Option<T> {
    fn is_active(&self) -> bool {
        self.as_ref().is_some_and(|sink| sink.is_active())
    }
    fn instruction(&mut self, address: u16, opcode: Opcode) {
        if let Some(sink) = self {
            sink.instruction(address, opcode);
        }
    }
    fn operand(&mut self, address: u16, raw: u16, mode: Mode, resolved: u16) {
        if let Some(sink) = self {
            sink.operand(address, raw, mode, resolved);
        }
    }
    fn register_write(&mut self, index: usize, before: u16, after: u16) {
        if let Some(sink) = self {
            sink.register_write(index, before, after);
        }
    }
    fn memory_write(&mut self, address: u16, before: u16, after: u16) {
        if let Some(sink) = self {
            sink.memory_write(address, before, after);
        }
    }
    fn stack_push(&mut self, value: u16, depth: usize) {
        if let Some(sink) = self {
            sink.stack_push(value, depth);
        }
    }
    fn stack_pop(&mut self, value: u16, depth: usize) {
        if let Some(sink) = self {
            sink.stack_pop(value, depth);
        }
    }
    fn jump(&mut self, from: u16, to: u16) {
        if let Some(sink) = self {
            sink.jump(from, to);
        }
    }
    fn halted(&mut self, address: u16) {
        if let Some(sink) = self {
            sink.halted(address);
        }
    }
}

impl<A: TraceSink, B: TraceSink> TraceSink for (A, B) {
    fn is_active(&self) -> bool {
        self.0.is_active() || self.1.is_active()
    }
    fn instruction(&mut self, address: u16, opcode: Opcode) {
        self.0.instruction(address, opcode);
        self.1.instruction(address, opcode);
    }
    fn operand(&mut self, address: u16, raw: u16, mode: Mode, resolved: u16) {
        self.0.operand(address, raw, mode, resolved);
        self.1.operand(address, raw, mode, resolved);
    }
    fn register_write(&mut self, index: usize, before: u16, after: u16) {
        self.0.register_write(index, before, after);
        self.1.register_write(index, before, after);
    }
    fn memory_write(&mut self, address: u16, before: u16, after: u16) {
        self.0.memory_write(address, before, after);
        self.1.memory_write(address, before, after);
    }
    fn stack_push(&mut self, value: u16, depth: usize) {
        self.0.stack_push(value, depth);
        self.1.stack_push(value, depth);
    }
    fn stack_pop(&mut self, value: u16, depth: usize) {
        self.0.stack_pop(value, depth);
        self.1.stack_pop(value, depth);
    }
    fn jump(&mut self, from: u16, to: u16) {
        self.0.jump(from, to);
        self.1.jump(from, to);
    }
    fn halted(&mut self, address: u16) {
        self.0.halted(address);
        self.1.halted(address);
    }
}
