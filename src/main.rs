mod cli;
mod runners;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dmg_installer::{InstallConfig, InstallationState, check_installation_state};
use log::error;

fn main() {
    let args = cli::Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // Initialize logger with custom format; RUST_LOG still overrides the default level
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main(args: cli::Args) -> Result<i32> {
    let config = Arc::new(InstallConfig::load(args.config.as_deref())?);

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(0);
    }

    if args.check {
        let install_path = config.install_path();
        return Ok(match check_installation_state(&install_path) {
            InstallationState::Installed => {
                println!("{} is installed at {}", config.app_name, install_path.display());
                0
            }
            InstallationState::NotInstalled => {
                println!("{} is not installed", config.app_name);
                1
            }
        });
    }

    runners::run_install(config, &args).await
}
