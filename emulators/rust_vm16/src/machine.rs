use crate::bus::{Bus, MemoryBus};
use crate::eval::{step, Result, Status};
use crate::state::State;
use crate::trace::{NullSink, TraceSink};
use serde::Serialize;
use std::io::{Read, Write};

/// Terminal summary of a [`Machine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: Status,
    pub steps: u64,
}

/// One program instance: program store, registers, stack and a trace sink.
pub struct Machine<S: TraceSink = NullSink> {
    bus: MemoryBus,
    state: State,
    sink: S,
    status: Status,
    steps: u64,
}

impl Machine<NullSink> {
    pub fn new(bus: MemoryBus) -> Self {
        Self::with_sink(bus, NullSink)
    }

    pub fn from_words(program: &[u16]) -> Result<Self> {
        Ok(Self::new(MemoryBus::from_words(program)?))
    }

    pub fn from_image(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(MemoryBus::from_image(bytes)?))
    }

    pub fn read_image<R: Read>(reader: R) -> Result<Self> {
        Ok(Self::new(MemoryBus::read_image(reader)?))
    }
}

impl<S: TraceSink> Machine<S> {
    pub fn with_sink(bus: MemoryBus, sink: S) -> Self {
        Self {
            bus,
            state: State::new(),
            sink,
            status: Status::Running,
            steps: 0,
        }
    }

    /// Execute a single instruction. Terminal machines are left untouched.
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<Status> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        self.steps += 1;
        match step(&mut self.state, &mut self.bus, &mut self.sink, out) {
            Ok(status) => {
                self.status = status;
                Ok(status)
            }
            Err(err) => {
                self.status = Status::Faulted;
                Err(err)
            }
        }
    }

    /// Run until halt or fault. `out` is flushed before returning either way.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<Outcome> {
        let result = loop {
            match self.step(out) {
                Ok(Status::Running) => continue,
                Ok(_) => break Ok(self.outcome()),
                Err(err) => break Err(err),
            }
        };
        out.flush()?;
        result
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            status: self.status,
            steps: self.steps,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn ip(&self) -> u16 {
        self.state.ip
    }

    pub fn register(&self, index: usize) -> u16 {
        self.state.get_reg(index)
    }

    pub fn stack(&self) -> &[u16] {
        self.state.stack()
    }

    pub fn memory(&self, addr: u16) -> u16 {
        self.bus.load(addr)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
