//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Kasa-Link CLI - register, discover and switch Kasa smart plugs
#[derive(Parser, Debug)]
#[command(name = "kasa-link")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Device timeout in milliseconds
    #[arg(long, global = true, env = "KASA_LINK_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Registry database file
    #[arg(long, global = true, env = "KASA_LINK_STORE_PATH")]
    pub store: Option<PathBuf>,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a device under a name
    Register(RegisterArgs),

    /// List registered devices
    List(ListArgs),

    /// Show one registered device
    Show(TargetArgs),

    /// Switch a device's relay on
    PowerOn(TargetArgs),

    /// Switch a device's relay off
    PowerOff(TargetArgs),

    /// Query a device's current state without changing it
    Refresh(TargetArgs),

    /// Remove a device from the registry
    Remove(TargetArgs),

    /// Probe the network and reconcile the registry
    Sweep(SweepArgs),

    /// Print the version
    Version,
}

// ==================== Registry ====================

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Name for the device (letters, digits, space, dot, dash, underscore)
    pub name: String,

    /// IP address of the device
    pub address: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Number of records to skip
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Maximum number of records to show
    #[arg(long, default_value = "100")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Device name or numeric id
    pub device: String,
}

// ==================== Sweep ====================

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Broadcast address or IPv4 CIDR (default: configured sweep target)
    #[arg(long)]
    pub target: Option<String>,

    /// Listening window in milliseconds (default: the device timeout)
    #[arg(long)]
    pub window: Option<u64>,
}
