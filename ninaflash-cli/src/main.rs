//! ninaflash CLI - Command-line tool for flashing NINA WiFi modules.
//!
//! ## Features
//!
//! - Upload and MD5-verify WiFi firmware images
//! - Upload root certificate bundles
//! - Read back flash regions
//! - Query the module's firmware version
//! - Optionally follow boards that re-enumerate after a 1200-bps reset
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to a specific exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration.
    #[error("{0}")]
    Config(String),
    /// Stopped by the user.
    #[error("{0}")]
    Cancelled(String),
}

/// Exit codes.
mod exit_code {
    pub const FAILURE: u8 = 1;
    pub const USAGE: u8 = 2;
    pub const CONFIG: u8 = 3;
    pub const DEVICE_NOT_FOUND: u8 = 4;
    pub const CANCELLED: u8 = 130;
}

/// Pick the exit code for an error returned by a command.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::Usage(_) => exit_code::USAGE,
                CliError::Config(_) => exit_code::CONFIG,
                CliError::Cancelled(_) => exit_code::CANCELLED,
            };
        }
        if let Some(lib) = cause.downcast_ref::<ninaflash::Error>() {
            return match lib {
                ninaflash::Error::DeviceNotFound => exit_code::DEVICE_NOT_FOUND,
                ninaflash::Error::Serial(e) if e.kind() == serialport::ErrorKind::NoDevice => {
                    exit_code::DEVICE_NOT_FOUND
                },
                ninaflash::Error::Interrupted => exit_code::CANCELLED,
                ninaflash::Error::InvalidArgument(_) => exit_code::USAGE,
                _ => exit_code::FAILURE,
            };
        }
    }
    exit_code::FAILURE
}

/// Parse a number given in decimal or with a `0x` prefix.
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    // Support underscore separators like 0x1_0000
    let s: String = s.chars().filter(|c| *c != '_').collect();
    let parsed = if let Some(hex) = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("Invalid number '{s}': {e}"))
}

/// ninaflash - Flash and verify NINA WiFi module firmware.
///
/// The board must be running the command sketch, which bridges its serial
/// port to the WiFi module.
///
/// Environment variables:
///   NINAFLASH_PORT              - Default serial port
///   NINAFLASH_BAUD              - Baud rate of the command sketch (default: 1000000)
#[derive(Parser)]
#[command(name = "ninaflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  ninaflash -p /dev/ttyACM0 flash NINA_W102-v1.5.0.bin\n  ninaflash -p COM4 version")]
struct Cli {
    /// Serial port to use (auto-detected if only one is present).
    #[arg(short, long, global = true, env = "NINAFLASH_PORT")]
    port: Option<String>,

    /// Baud rate of the command sketch [default: 1000000].
    #[arg(short, long, global = true, env = "NINAFLASH_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Reset the board at 1200 bps first and follow it to its new port.
    ///
    /// Only useful for boards whose command sketch starts after that reset.
    #[arg(long, global = true)]
    reset: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload a WiFi firmware image and verify its MD5.
    Flash {
        /// Path to the firmware binary.
        firmware: PathBuf,

        /// Skip the MD5 check after writing.
        #[arg(long)]
        no_verify: bool,
    },

    /// Upload a root certificate bundle.
    Certificates {
        /// Path to the certificate bundle.
        file: PathBuf,
    },

    /// Read a flash region into a file.
    Read {
        /// Start address (decimal or 0x-prefixed hex).
        #[arg(short, long, value_parser = parse_number)]
        address: u32,

        /// Number of bytes to read (decimal or 0x-prefixed hex).
        #[arg(short, long, value_parser = parse_number)]
        length: u32,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the WiFi module's firmware version.
    Version,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Wait for a new serial port to appear and print its name.
    Watch {
        /// How long to wait, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    ninaflash::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        if !path.exists() {
            return Err(
                CliError::Config(format!("config file {} does not exist", path.display())).into(),
            );
        }
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            no_verify,
        } => commands::flash::cmd_flash(cli, &config, firmware, *no_verify),
        Commands::Certificates { file } => commands::flash::cmd_certificates(cli, &config, file),
        Commands::Read {
            address,
            length,
            output,
        } => commands::read::cmd_read(cli, &config, *address, *length, output),
        Commands::Version => commands::version::cmd_version(cli, &config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Watch { timeout_ms } => commands::ports::cmd_watch(cli, &config, *timeout_ms),
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "ninaflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}
