use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rust_vm16::{disassemble, LogSink, Machine, MemoryBus, OpcodeProfile, State, Status};
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "vm16-run")]
#[command(about = "Run a 16-bit word VM program image", long_about = None)]
struct Args {
    /// Program image: little-endian 16-bit words, loaded at address 0
    image: PathBuf,

    /// Trace execution to stderr instead of printing `out` characters (repeat for operand reads)
    #[arg(short, long, action = ArgAction::Count)]
    debug: u8,

    /// Print a disassembly listing of the image and exit without running it
    #[arg(long, action = ArgAction::SetTrue)]
    disassemble: bool,

    /// Emit a per-opcode execution count table to stderr after the run
    #[arg(long, action = ArgAction::SetTrue)]
    profile_opcodes: bool,

    /// Write the final registers, stack and instruction pointer as JSON
    #[arg(long, value_name = "PATH")]
    dump_state: Option<PathBuf>,
}

#[derive(Serialize)]
struct StateDump<'a> {
    status: Status,
    steps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    state: &'a State,
}

fn init_logging(debug: u8) {
    let filter = match debug {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("warn,vm16::trace=debug"),
        _ => EnvFilter::new("warn,vm16::trace=trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vm16-run: {err:#}");
            let code = err
                .downcast_ref::<rust_vm16::Error>()
                .map_or(1, rust_vm16::Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let bus = MemoryBus::from_image(&bytes)
        .with_context(|| format!("failed to load image {}", args.image.display()))?;

    if args.disassemble {
        let mut out = BufWriter::new(io::stdout().lock());
        for line in disassemble(&bus, 0, bus.extent() as u16) {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        return Ok(());
    }

    let log = (args.debug > 0).then_some(LogSink);
    let profile = args.profile_opcodes.then(OpcodeProfile::new);
    let mut vm = Machine::with_sink(bus, (log, profile));

    let mut out = BufWriter::new(io::stdout().lock());
    let result = vm.run(&mut out);

    if let Some(profile) = &vm.sink().1 {
        eprint!("{}", profile.report());
    }
    if let Some(path) = &args.dump_state {
        let dump = StateDump {
            status: vm.status(),
            steps: vm.steps(),
            error: result.as_ref().err().map(ToString::to_string),
            state: vm.state(),
        };
        let json = serde_json::to_string_pretty(&dump)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write state dump {}", path.display()))?;
    }

    let outcome = result?;
    tracing::debug!(target: "vm16::trace", steps = outcome.steps, "run finished");
    Ok(())
}
