use crate::constants::{REGISTER_COUNT, WORD_MASK};
use serde::{Deserialize, Serialize};

/// Register bank, execution stack and instruction pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    regs: [u16; REGISTER_COUNT],
    #[serde(default)]
    stack: Vec<u16>,
    #[serde(default)]
    pub ip: u16,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if `index` is not below `REGISTER_COUNT`; callers decode the index first.
    pub fn get_reg(&self, index: usize) -> u16 {
        self.regs[index]
    }

    pub fn set_reg(&mut self, index: usize, value: u16) -> u16 {
        std::mem::replace(&mut self.regs[index], value)
    }

    pub fn registers(&self) -> &[u16; REGISTER_COUNT] {
        &self.regs
    }

    pub fn push(&mut self, value: u16) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<u16> {
        self.stack.pop()
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Set the instruction pointer, wrapping into the 15-bit address space.
    pub fn set_ip(&mut self, value: u16) {
        self.ip = value & WORD_MASK;
    }

    pub fn advance(&mut self) {
        self.set_ip(self.ip.wrapping_add(1));
    }
}
