//! nexflash CLI - Command-line tool for uploading TFT firmware to Nextion displays.
//!
//! ## Features
//!
//! - Upload TFT firmware with a progress bar
//! - Display identification and baud rate discovery
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Errors that carry their own exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing input the user has to provide.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration.
    #[error("{0}")]
    Config(String),
    /// The user aborted a prompt.
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
///
/// | Code | Meaning |
/// |------|---------|
/// | 1    | runtime error |
/// | 2    | usage error |
/// | 3    | configuration error |
/// | 4    | display not found |
/// | 130  | cancelled |
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => 2,
                CliError::Config(_) => 3,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<nexflash::Error>() {
            return match lib_err {
                nexflash::Error::DeviceNotFound => 4,
                nexflash::Error::Config(_) => 3,
                _ => 1,
            };
        }
    }
    1
}

/// Idle baud rate of the display, or `auto` to search for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BaudSetting {
    /// Try every rate the display supports.
    Auto,
    /// Fixed rate.
    Rate(u32),
}

fn parse_baud(s: &str) -> Result<BaudSetting, String> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(BaudSetting::Auto);
    }
    match s.trim().parse::<u32>() {
        Ok(0) => Err("baud rate must be greater than zero".to_string()),
        Ok(rate) => Ok(BaudSetting::Rate(rate)),
        Err(_) => Err(format!("invalid baud rate '{s}' (expected a number or 'auto')")),
    }
}

/// nexflash - A cross-platform tool for uploading TFT firmware to Nextion displays.
///
/// Environment variables:
///   NEXFLASH_PORT              - Default serial port
///   NEXFLASH_BAUD              - Display baud rate (default: 9600, or "auto")
///   NEXFLASH_UPLOAD_BAUD       - Transfer baud rate (default: 115200)
///   NEXFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "nexflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Usage examples:
  nexflash upload display.tft
  nexflash -p /dev/ttyUSB0 -b auto upload display.tft --upload-baud 921600
  nexflash info --json")]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "NEXFLASH_PORT")]
    port: Option<String>,

    /// Baud rate the display currently listens on, or "auto".
    #[arg(short, long, global = true, env = "NEXFLASH_BAUD", value_parser = parse_baud)]
    baud: Option<BaudSetting>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "NEXFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// Offer all ports (including unknown types) for selection.
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload a TFT firmware file to the display.
    Upload {
        /// Path to the TFT firmware file.
        firmware: PathBuf,

        /// Baud rate used for the transfer.
        #[arg(short, long, env = "NEXFLASH_UPLOAD_BAUD")]
        upload_baud: Option<u32>,

        /// Use the legacy update command (no section redirects).
        #[arg(long)]
        legacy: bool,

        /// Extra attempts for a section that was not acknowledged.
        #[arg(long)]
        retries: Option<u32>,

        /// Response timeout in milliseconds.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Identify the connected display.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Soft reset the display.
    Reset,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    // Respect NO_COLOR and keep pipes free of escape codes
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
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

    debug!(
        "nexflash v{} (verbose level: {})",
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

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config_path {
        Some(path) if !path.exists() => {
            return Err(CliError::Config(format!(
                "config file {} does not exist",
                path.display()
            ))
            .into());
        },
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    match &cli.command {
        Commands::Upload {
            firmware,
            upload_baud,
            legacy,
            retries,
            timeout_ms,
        } => {
            let options = commands::upload::UploadOptions {
                upload_baud: *upload_baud,
                legacy: *legacy,
                retries: *retries,
                timeout_ms: *timeout_ms,
            };
            commands::upload::cmd_upload(cli, &mut config, firmware, &options)
        },
        Commands::Info { json } => commands::info::cmd_info(cli, &mut config, *json),
        Commands::Reset => commands::reset::cmd_reset(cli, &mut config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args, config, or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_upload() {
        let cli = Cli::try_parse_from(["nexflash", "upload", "display.tft"]).unwrap();
        match cli.command {
            Commands::Upload {
                firmware,
                upload_baud,
                legacy,
                ..
            } => {
                assert_eq!(firmware, PathBuf::from("display.tft"));
                assert!(upload_baud.is_none());
                assert!(!legacy);
            },
            _ => panic!("expected upload command"),
        }
    }

    #[test]
    fn test_cli_parse_upload_with_all_options() {
        let cli = Cli::try_parse_from([
            "nexflash",
            "-p",
            "/dev/ttyUSB0",
            "-b",
            "auto",
            "upload",
            "display.tft",
            "--upload-baud",
            "921600",
            "--legacy",
            "--retries",
            "5",
            "--timeout-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(BaudSetting::Auto));
        match cli.command {
            Commands::Upload {
                upload_baud,
                legacy,
                retries,
                timeout_ms,
                ..
            } => {
                assert_eq!(upload_baud, Some(921600));
                assert!(legacy);
                assert_eq!(retries, Some(5));
                assert_eq!(timeout_ms, Some(500));
            },
            _ => panic!("expected upload command"),
        }
    }

    #[test]
    fn test_cli_parse_info_json() {
        let cli = Cli::try_parse_from(["nexflash", "info", "--json", "-b", "115200"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { json: true }));
        assert_eq!(cli.baud, Some(BaudSetting::Rate(115200)));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["nexflash"]).is_err());
    }

    #[test]
    fn test_cli_upload_requires_firmware() {
        assert!(Cli::try_parse_from(["nexflash", "upload"]).is_err());
    }

    #[test]
    fn test_parse_baud() {
        assert_eq!(parse_baud("auto"), Ok(BaudSetting::Auto));
        assert_eq!(parse_baud("AUTO"), Ok(BaudSetting::Auto));
        assert_eq!(parse_baud("9600"), Ok(BaudSetting::Rate(9600)));
        assert!(parse_baud("0").is_err());
        assert!(parse_baud("fast").is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("bad".into()).into();
        assert_eq!(exit_code_for(&usage), 2);

        let config: anyhow::Error = CliError::Config("bad".into()).into();
        assert_eq!(exit_code_for(&config), 3);

        let cancelled: anyhow::Error = CliError::Cancelled("stop".into()).into();
        assert_eq!(exit_code_for(&cancelled), 130);

        let not_found = anyhow::Error::from(nexflash::Error::DeviceNotFound).context("probing");
        assert_eq!(exit_code_for(&not_found), 4);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), 1);
    }
}
