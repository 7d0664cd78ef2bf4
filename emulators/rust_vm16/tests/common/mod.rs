#![allow(dead_code)]

use rust_vm16::{Machine, Outcome, Result};

pub const R0: u16 = 32768;
pub const R1: u16 = 32769;
pub const R2: u16 = 32770;
pub const R7: u16 = 32775;

pub fn image(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Run `words` to completion with no trace sink; returns the machine, its
/// character output and the run result.
pub fn run(words: &[u16]) -> (Machine, String, Result<Outcome>) {
    let mut vm = Machine::from_words(words).expect("program fits in memory");
    let mut out = Vec::new();
    let result = vm.run(&mut out);
    let text = String::from_utf8(out).expect("utf-8 output");
    (vm, text, result)
}
