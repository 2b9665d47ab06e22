//! picoflash CLI - flash RP2040 boards over the serial bootloader
//! protocol.
//!
//! ## Features
//!
//! - Flash flat binary images and boot them
//! - Read back flash ranges
//! - Run a simulated device server for hardware-free testing
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use console::style;
use env_logger::Env;
use log::debug;
use picoflash::DeviceInfo;
use picoflash::transport::{SerialConfig, SerialTransport, TcpTransport, Transport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod commands;
mod config;

use config::Config;

/// picoflash - flash RP2040 boards over the serial bootloader protocol.
///
/// Environment variables:
///   PICOFLASH_PORT   - Default serial port
///   PICOFLASH_BAUD   - Default baud rate (default: 115200)
///   PICOFLASH_TCP    - Default simulated-device address
#[derive(Parser)]
#[command(name = "picoflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (first detected port if not specified).
    #[arg(short, long, global = true, env = "PICOFLASH_PORT")]
    port: Option<String>,

    /// Baud rate for the serial link.
    #[arg(short, long, global = true, env = "PICOFLASH_BAUD")]
    baud: Option<u32>,

    /// Talk to a simulated device at HOST:PORT instead of a serial port.
    #[arg(long, global = true, env = "PICOFLASH_TCP", value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Transport timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 1000, value_name = "MS")]
    timeout: u64,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash a flat binary image and boot it.
    Flash {
        /// Path to the image to install.
        image: PathBuf,

        /// Load address in flash.
        #[arg(short, long, value_parser = parse_u32, default_value = "0x10000000")]
        addr: u32,
    },

    /// Read a flash range into a file.
    Read {
        /// Output file for the dumped bytes.
        out: PathBuf,

        /// Start address.
        #[arg(short, long, value_parser = parse_u32, default_value = "0x10000000")]
        addr: u32,

        /// Number of bytes to read.
        #[arg(short, long, value_parser = parse_u32)]
        length: u32,
    },

    /// Run a simulated device server.
    Sim {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8888", value_name = "HOST:PORT")]
        listen: String,

        /// Flash base address the simulated device reports.
        #[arg(long, value_parser = parse_u32, default_value = "0x10000000")]
        flash_addr: u32,

        /// Flash size in bytes.
        #[arg(long, value_parser = parse_u32, default_value = "0x1000000")]
        flash_size: u32,

        /// Erase granularity in bytes.
        #[arg(long, value_parser = parse_u32, default_value = "0x1000")]
        erase_size: u32,

        /// Write granularity in bytes.
        #[arg(long, value_parser = parse_u32, default_value = "0x100")]
        write_size: u32,

        /// Largest single write payload in bytes.
        #[arg(long, value_parser = parse_u32, default_value = "0x100")]
        max_data_len: u32,
    },

    /// List available serial ports.
    ListPorts,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: clap_complete::Shell,
    },
}

/// Parse a u32 given as decimal or 0x-prefixed hex.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            if let Some(lib_err) = err.downcast_ref::<picoflash::Error>() {
                if lib_err.is_device_error() {
                    eprintln!(
                        "{}",
                        style("Power-cycle the device and run the command again.").yellow()
                    );
                }
            }
            ExitCode::FAILURE
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config_path.as_deref());

    match &cli.command {
        Commands::Flash { image, addr } => commands::flash::run(cli, &mut config, image, *addr),
        Commands::Read { out, addr, length } => {
            commands::read::run(cli, &mut config, out, *addr, *length)
        },
        Commands::Sim {
            listen,
            flash_addr,
            flash_size,
            erase_size,
            write_size,
            max_data_len,
        } => {
            let geometry = DeviceInfo {
                flash_addr: *flash_addr,
                flash_size: *flash_size,
                erase_size: *erase_size,
                write_size: *write_size,
                max_data_len: *max_data_len,
            };
            commands::sim::run(cli, listen, geometry)
        },
        Commands::ListPorts => cmd_list_ports(),
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "picoflash",
                &mut std::io::stdout(),
            );
            Ok(())
        },
    }
}

fn cmd_list_ports() -> Result<()> {
    let ports = picoflash::list_ports().context("listing serial ports")?;
    if ports.is_empty() {
        eprintln!("{} no serial ports found", style("!").yellow());
        return Ok(());
    }
    for port in ports {
        match (port.vid, port.pid, port.product) {
            (Some(vid), Some(pid), product) => println!(
                "{}\t{:04x}:{:04x}\t{}",
                port.name,
                vid,
                pid,
                product.unwrap_or_default()
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

/// Open the transport the global flags select: TCP when `--tcp` is
/// given, a serial port otherwise. A successfully opened serial port is
/// remembered in the config file for the next invocation.
fn open_transport(cli: &Cli, config: &mut Config) -> Result<Box<dyn Transport + Send>> {
    let timeout = Duration::from_millis(cli.timeout);

    if let Some(addr) = &cli.tcp {
        let transport = TcpTransport::connect(addr.as_str(), timeout)
            .with_context(|| format!("connecting to simulated device at {addr}"))?;
        if !cli.quiet {
            eprintln!("{} using {}", style("→").cyan(), transport.name());
        }
        return Ok(Box::new(transport));
    }

    let port = match cli.port.clone().or_else(|| config.port.clone()) {
        Some(port) => port,
        None => {
            let mut ports = picoflash::list_ports().context("listing serial ports")?;
            if ports.is_empty() {
                bail!(
                    "no serial port found; connect a device in bootloader mode \
                     or pass --port/--tcp"
                );
            }
            ports.remove(0).name
        },
    };
    let baud = cli
        .baud
        .or(config.baud)
        .unwrap_or(picoflash::transport::serial::DEFAULT_BAUD);

    let serial_config = SerialConfig::new(&port, baud).with_timeout(timeout);
    let transport =
        SerialTransport::open(&serial_config).with_context(|| format!("opening {port}"))?;
    if !cli.quiet {
        eprintln!("{} using {port} at {baud} baud", style("→").cyan());
    }

    config.remember_port(&port, baud);
    if let Err(e) = config.save(cli.config_path.as_deref()) {
        debug!("could not persist config: {e:#}");
    }

    Ok(Box::new(transport))
}
