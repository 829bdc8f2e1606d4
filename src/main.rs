//! # Waypost: The Main Entry Point
//!
//! Handles Command Line Interface (CLI) parsing, logging initialization, and
//! dispatching to the installer logic. Invoked with no arguments it performs
//! the install, so it can be dropped next to a tool's binaries and double-run.
//!
//! The machine-scope PATH write requires Administrator rights; `install`
//! attempts a UAC relaunch up front when it isn't elevated.

use clap::{Parser, Subcommand};
use log::{error, warn, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod elevation;
mod installer;
mod invariant_ppt;
mod lock;
mod system;

use system::WindowsSystem;

/// The primary Command Line Interface (CLI) configuration.
///
/// Uses `clap` for sub-command parsing and help generation.
#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Adds its own folder to the Windows PATH (user and machine)", long_about = None)]
struct Cli {
    /// The sub-command to execute. Omitted = `install`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Available sub-commands for the waypost installer.
#[derive(Subcommand)]
enum Commands {
    /// Add this executable's folder to the user and machine PATH.
    ///
    /// Idempotent: a folder that is already a PATH entry is left alone.
    /// The previous value of each rewritten PATH is backed up as a .reg
    /// file under %LOCALAPPDATA%\waypost first.
    Install {
        /// Dry run: report what would change without touching the registry.
        #[arg(long)]
        dry_run: bool,
    },
    /// Report whether this executable's folder is in each PATH scope.
    ///
    /// Read-only; never prompts for elevation.
    Status,
}

fn main() {
    let cli = Cli::parse();

    // Determine log level based on verbosity flag
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Initialize logger
    // We ignore the result here as logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    match &cli.command {
        Some(Commands::Install { dry_run }) => run_install(*dry_run),
        Some(Commands::Status) => {
            let target = match installer::resolve_target_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    error!("Cannot resolve install directory: {:#}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = installer::status(&WindowsSystem, &target) {
                error!("Status check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        // No arguments at all is the classic "drop next to the binaries and
        // run" invocation. It installs.
        None => run_install(false),
    }
}

fn run_install(dry_run: bool) {
    // The HKLM write will be denied without elevation, so try to get it first
    // (dry runs never write and never need it).
    if !dry_run && !elevation::is_elevated() {
        warn!("Updating the machine PATH requires admin rights. Attempting to elevate...");
        if elevation::relaunch_as_admin() {
            // The elevated process takes over. We're done.
            return;
        }
        warn!("Elevation declined or failed. The machine PATH update will likely be denied.");
    }

    // Resolve before touching anything: no directory, nothing to install.
    let target = match installer::resolve_target_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Cannot resolve install directory: {:#}", e);
            std::process::exit(1);
        }
    };

    // Hold the update lock across both read-modify-write sequences so a
    // concurrent run can't lose our append (or we theirs).
    let _lock = if dry_run {
        None
    } else {
        match lock::UpdateLock::acquire() {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = installer::run_install(&WindowsSystem, &target, dry_run) {
        error!("Install failed: {:#}", e);
        std::process::exit(1);
    }
}
