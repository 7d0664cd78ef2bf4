use crate::constants::{MEMORY_WORDS, WORD_MASK};
use crate::eval::{Error, Result};
use std::io::Read;

pub trait Bus {
    fn load(&self, addr: u16) -> u16;
    fn store(&mut self, addr: u16, value: u16);

    /// Whether `addr` holds program words that instruction fetch may consume.
    fn is_mapped(&self, _addr: u16) -> bool {
        true
    }
}

/// The program store: 32768 words, zero-filled past the loaded image.
///
/// `extent` is one past the highest word that was loaded or written; fetches
/// beyond it mean the program ran off its end. A store far past the image
/// maps every zero word in between, so a jump into that gap runs `halt`.
#[derive(Clone)]
pub struct MemoryBus {
    words: Vec<u16>,
    extent: usize,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            words: vec![0; MEMORY_WORDS],
            extent: 0,
        }
    }

    pub fn from_words(program: &[u16]) -> Result<Self> {
        if program.len() > MEMORY_WORDS {
            return Err(Error::ImageTooLarge(program.len()));
        }
        let mut bus = Self::new();
        bus.words[..program.len()].copy_from_slice(program);
        bus.extent = program.len();
        Ok(bus)
    }

    /// Decode a little-endian image: two bytes per word, loaded from address 0.
    pub fn from_image(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(Error::OddImageLength(bytes.len()));
        }
        let words: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::from_words(&words)
    }

    pub fn read_image<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_image(&bytes)
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }
}

impl Bus for MemoryBus {
    fn load(&self, addr: u16) -> u16 {
        self.words[(addr & WORD_MASK) as usize]
    }

    fn store(&mut self, addr: u16, value: u16) {
        let index = (addr & WORD_MASK) as usize;
        self.words[index] = value;
        self.extent = self.extent.max(index + 1);
    }

    fn is_mapped(&self, addr: u16) -> bool {
        ((addr & WORD_MASK) as usize) < self.extent
    }
}
