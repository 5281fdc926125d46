//! CLI entry point for bbbgpio
//!
//! Drives the GPIO control device from the command line:
//! - register get/set through the opcode table
//! - raw sample read/write
//! - acquisition mode switches
//! - a simulated interrupt capture run
//!
//! # Usage
//!
//! ```bash
//! bbbgpio get direction --bank 1
//! bbbgpio set data --bank 1 0x00200000
//! bbbgpio --json simulate --samples 20
//! BBBGPIO_BACKEND__KIND=mmio bbbgpio read --bank 2
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, info};

use bbbgpio::config::{BackendKind, DriverConfig, DEFAULT_CONFIG_PATH};
use bbbgpio::device::{GpioDevice, GpioHandle};
use bbbgpio::error::GpioError;
use bbbgpio::ioctl::{Action, Opcode, ParamBlock};
use bbbgpio::irq::IrqController;
use bbbgpio::logging::{self, LoggingSettings};
use bbbgpio::mode::AcquisitionMode;
use bbbgpio::port::RegisterPort;
use bbbgpio::registers::{address, Bank, Register};
use bbbgpio::sim::{SimulatedIrq, SimulatedRegisters};

/// Line reported by the simulated controller when none is configured.
const SIMULATED_LINE: u32 = 62;

#[derive(Parser)]
#[command(name = "bbbgpio")]
#[command(about = "BeagleBone GPIO register driver", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a bank register
    Get {
        register: RegisterArg,
        #[arg(long, default_value_t = 0)]
        bank: u8,
    },

    /// Write a bank register
    Set {
        register: RegisterArg,
        #[arg(long, default_value_t = 0)]
        bank: u8,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },

    /// Read one raw sample
    Read {
        #[arg(long, default_value_t = 0)]
        bank: u8,
    },

    /// Write one raw sample to DATAOUT
    Write {
        #[arg(long, default_value_t = 0)]
        bank: u8,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },

    /// Report the acquisition mode
    Mode,

    /// Probe an interrupt line and switch to interrupt-driven mode
    EnableIrq {
        #[arg(long, default_value_t = 0)]
        bank: u8,
        /// Pin mask, e.g. 0x10000 for pin 16
        #[arg(long, value_parser = parse_u32)]
        mask: u32,
    },

    /// Force polling mode
    Poll {
        #[arg(long, default_value_t = 0)]
        bank: u8,
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        mask: u32,
    },

    /// Capture samples from a simulated interrupt source
    Simulate {
        #[arg(long, default_value_t = 16)]
        samples: u32,
        #[arg(long, default_value_t = 1)]
        bank: u8,
        #[arg(long, value_parser = parse_u32, default_value = "0x10000")]
        mask: u32,
    },

    /// Print the effective configuration
    Config,
}

/// Register selected on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RegisterArg {
    /// DATAIN on get, DATAOUT on set
    Data,
    /// OE
    Direction,
    /// LEVELDETECT0
    Low,
    /// LEVELDETECT1
    High,
    /// RISINGDETECT
    Rising,
    /// FALLINGDETECT
    Falling,
}

impl RegisterArg {
    fn getter(self) -> Opcode {
        match self {
            Self::Data => Opcode::ReadData,
            Self::Direction => Opcode::GetDirection,
            Self::Low => Opcode::GetLowDetect,
            Self::High => Opcode::GetHighDetect,
            Self::Rising => Opcode::GetRisingEdge,
            Self::Falling => Opcode::GetFallingEdge,
        }
    }

    fn setter(self) -> Opcode {
        match self {
            Self::Data => Opcode::WriteData,
            Self::Direction => Opcode::SetDirection,
            Self::Low => Opcode::SetLowDetect,
            Self::High => Opcode::SetHighDetect,
            Self::Rising => Opcode::SetRisingEdge,
            Self::Falling => Opcode::SetFallingEdge,
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid value '{s}': {e}"))
}

fn register_of(opcode: Opcode) -> Option<Register> {
    match opcode.action() {
        Action::Write(r) | Action::Configure(r) | Action::Read(r) => Some(r),
        _ => None,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DriverConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    config.validate()?;

    let settings = LoggingSettings::from_config(&config).map_err(anyhow::Error::msg)?;
    logging::init(settings).map_err(anyhow::Error::msg)?;
    debug!(config = ?cli.config, backend = ?config.backend.kind, "configuration loaded");

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Simulate {
            samples,
            bank,
            mask,
        } => simulate(&config, samples, bank, mask, cli.json),
        command => match config.backend.kind {
            BackendKind::Simulated => {
                let irq = match config.backend.sim_irq_line {
                    Some(line) => SimulatedIrq::with_line(line),
                    None => SimulatedIrq::new(),
                };
                let device = GpioDevice::from_config(&config, SimulatedRegisters::new(), irq);
                execute(&device, command, cli.json)
            }
            BackendKind::Mmio => run_mmio(&config, command, cli.json),
        },
    }
}

#[cfg(unix)]
fn run_mmio(config: &DriverConfig, command: Commands, json: bool) -> Result<()> {
    use bbbgpio::irq::NullIrq;
    use bbbgpio::mmio::MmioPort;

    let port = MmioPort::open(&config.backend.mem_path)?;
    let device = GpioDevice::from_config(config, port, NullIrq);
    execute(&device, command, json)
}

#[cfg(not(unix))]
fn run_mmio(_config: &DriverConfig, _command: Commands, _json: bool) -> Result<()> {
    bail!("the mmio backend is only available on unix targets")
}

fn execute<P, C>(device: &GpioDevice<P, C>, command: Commands, json: bool) -> Result<()>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    let handle = device
        .open()
        .with_context(|| format!("Failed to open {}", device.name()))?;

    match command {
        Commands::Get { register, bank } => {
            let opcode = register.getter();
            let block = control(&handle, opcode, ParamBlock::new(bank, 0))?;
            report_register(opcode, bank, block.read_value, json);
        }
        Commands::Set {
            register,
            bank,
            value,
        } => {
            let opcode = register.setter();
            control(&handle, opcode, ParamBlock::new(bank, value))?;
            report_register(opcode, bank, value, json);
        }
        Commands::Read { bank } => {
            // A raw read samples the bank named by the last control request.
            control(&handle, Opcode::GetMode, ParamBlock::new(bank, 0))?;
            let mut buf = [0u8; 4];
            handle.read(&mut buf)?;
            report_sample(bank, u32::from_le_bytes(buf), json);
        }
        Commands::Write { bank, value } => {
            control(&handle, Opcode::GetMode, ParamBlock::new(bank, 0))?;
            handle.write(&value.to_le_bytes())?;
            report_sample(bank, value, json);
        }
        Commands::Mode => {
            let block = control(&handle, Opcode::GetMode, ParamBlock::default())?;
            report_mode(block.read_value, json)?;
        }
        Commands::EnableIrq { bank, mask } => {
            control(&handle, Opcode::EnableInterrupt, ParamBlock::new(bank, mask))?;
            let block = control(&handle, Opcode::GetMode, ParamBlock::new(bank, 0))?;
            report_mode(block.read_value, json)?;
        }
        Commands::Poll { bank, mask } => {
            control(&handle, Opcode::ForcePolling, ParamBlock::new(bank, mask))?;
            let block = control(&handle, Opcode::GetMode, ParamBlock::new(bank, 0))?;
            report_mode(block.read_value, json)?;
        }
        Commands::Simulate { .. } | Commands::Config => {
            bail!("command does not run against a configured backend")
        }
    }

    handle.close();
    Ok(())
}

fn control<P, C>(handle: &GpioHandle<P, C>, opcode: Opcode, mut block: ParamBlock) -> Result<ParamBlock>
where
    P: RegisterPort + 'static,
    C: IrqController + 'static,
{
    handle
        .dispatch(opcode, &mut block)
        .with_context(|| format!("{opcode:?} on bank {} failed", block.bank))?;
    Ok(block)
}

fn report_register(opcode: Opcode, bank: u8, value: u32, json: bool) {
    let name = register_of(opcode).map_or("?", Register::name);
    if json {
        println!("{}", json!({ "bank": bank, "register": name, "value": value }));
    } else {
        println!("gpio{bank} {name} = 0x{value:08X}");
    }
}

fn report_sample(bank: u8, sample: u32, json: bool) {
    if json {
        println!("{}", json!({ "bank": bank, "sample": sample }));
    } else {
        println!("gpio{bank} sample = 0x{sample:08X}");
    }
}

fn report_mode(raw: u32, json: bool) -> Result<()> {
    let Some(mode) = AcquisitionMode::from_raw(raw) else {
        bail!("device reported unknown mode {raw}");
    };
    if json {
        println!("{}", json!({ "mode": mode, "raw": raw }));
    } else {
        println!("{mode}");
    }
    Ok(())
}

/// Run a producer thread that drives DATAIN and raises the interrupt line
/// while this thread drains the ring through raw reads.
fn simulate(config: &DriverConfig, samples: u32, bank: u8, mask: u32, json: bool) -> Result<()> {
    let bank_id = Bank::try_from(bank)?;
    let line = config.backend.sim_irq_line.unwrap_or(SIMULATED_LINE);
    let port = Arc::new(SimulatedRegisters::new());
    let irq = Arc::new(SimulatedIrq::with_line(line));
    let device = GpioDevice::from_config(config, Arc::clone(&port), Arc::clone(&irq));

    let handle = device.open()?;
    control(&handle, Opcode::EnableInterrupt, ParamBlock::new(bank, mask))?;
    if device.mode() != Some(AcquisitionMode::InterruptDriven) {
        bail!("interrupt line {line} could not be bound");
    }
    info!(line, samples, "simulated capture started");

    let producer = thread::Builder::new()
        .name("sim-irq".to_string())
        .spawn(move || {
            for i in 0..samples {
                port.poke(address(bank_id, Register::DataIn), mask.rotate_left(i) ^ i);
                irq.fire(line);
                thread::sleep(Duration::from_micros(200));
            }
        })
        .context("Failed to spawn interrupt producer")?;

    let mut captured = Vec::new();
    loop {
        match handle.read_sample() {
            Ok(sample) => captured.push(sample),
            Err(GpioError::NoData | GpioError::Busy(_)) if !producer.is_finished() => {
                thread::sleep(Duration::from_micros(50));
            }
            Err(GpioError::NoData) => break,
            Err(GpioError::Busy(_)) => thread::yield_now(),
            Err(e) => return Err(e.into()),
        }
    }
    if producer.join().is_err() {
        bail!("interrupt producer panicked");
    }

    control(&handle, Opcode::ForcePolling, ParamBlock::new(bank, mask))?;
    handle.close();

    let stats = device.stats();
    if json {
        println!("{}", json!({ "line": line, "samples": captured, "stats": stats }));
    } else {
        for (i, sample) in captured.iter().enumerate() {
            println!("{i:>4}: 0x{sample:08X}");
        }
        println!(
            "captured {} dropped {} overwritten {} spurious {}",
            stats.captured, stats.dropped_contended, stats.overwritten, stats.spurious
        );
    }
    Ok(())
}
