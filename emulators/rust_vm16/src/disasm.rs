//! Static disassembler: renders program words as an instruction listing.

use crate::bus::Bus;
use crate::isa::{decode_opcode, Opcode};
use crate::operand::Operand;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub address: u16,
    pub words: Vec<u16>,
    pub text: String,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05}: {}", self.address, self.text)
    }
}

/// Disassemble the words in `start..end`.
///
/// Undecodable words and instructions truncated by `end` are emitted as
/// `.word` data, one word per line.
pub fn disassemble<B: Bus>(bus: &B, start: u16, end: u16) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut addr = start as u32;
    let end = end as u32;
    while addr < end {
        let word = bus.load(addr as u16);
        let decoded = decode_opcode(word).filter(|op| addr + op.length() as u32 <= end);
        let line = match decoded {
            Some(op) => {
                let operands: Vec<u16> = (1..op.length())
                    .map(|i| bus.load((addr as u16).wrapping_add(i)))
                    .collect();
                let mut words = vec![word];
                words.extend_from_slice(&operands);
                Line {
                    address: addr as u16,
                    text: render(op, &operands),
                    words,
                }
            }
            None => Line {
                address: addr as u16,
                words: vec![word],
                text: format!(".word {word}"),
            },
        };
        addr += line.words.len() as u32;
        lines.push(line);
    }
    lines
}

fn render(op: Opcode, operands: &[u16]) -> String {
    let mut text = op.mnemonic().to_string();
    for (i, raw) in operands.iter().enumerate() {
        text.push(if i == 0 { ' ' } else { ',' });
        if i > 0 {
            text.push(' ');
        }
        match (op, Operand::classify(*raw)) {
            (Opcode::Out, Operand::Literal(code)) => match char::from_u32(code as u32) {
                Some(ch) if ch.is_ascii_graphic() || ch == ' ' => text.push_str(&format!("'{ch}'")),
                Some(ch) => text.push_str(&format!("{:?}", ch)),
                None => text.push_str(&code.to_string()),
            },
            (_, operand) => text.push_str(&operand.to_string()),
        }
    }
    text
}
