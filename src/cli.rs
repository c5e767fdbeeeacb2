use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for dmg-installer
#[derive(Parser, Debug, Clone)]
#[command(name = "dmg-installer")]
#[command(version, about = "Download a disk image and install the application it contains")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Only check whether the application is installed (Exit 0 = installed, 1 = not installed)
    #[arg(long, conflicts_with = "print_config")]
    pub check: bool,

    /// Don't open the application after installing
    #[arg(long)]
    pub no_launch: bool,

    /// Never prompt; a failed attempt aborts instead of offering a retry
    #[arg(long)]
    pub no_interaction: bool,

    /// Debug-level logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
