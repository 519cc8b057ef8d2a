use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::{debug, info};
use std::io::Read;

use jsonrepair::cli::Cli;
use jsonrepair::{Strategy, repair, scan_state};

fn setup_logging() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();
    Ok(())
}

fn read_input(cli: &Cli) -> Result<String> {
    match cli.input_path() {
        Some(path) => std::fs::read_to_string(path).context(format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let input = read_input(&cli)?;
    info!("jr repairing {} bytes", input.len());

    let repaired = match repair(&input) {
        Ok(repaired) => repaired,
        Err(e) => {
            debug!("scan state at failure: {:?}", scan_state(&input));
            bail!("{}", e);
        }
    };

    if cli.strategy {
        let label = match repaired.strategy {
            Strategy::Strict => repaired.strategy.to_string().green(),
            Strategy::Cleaned | Strategy::Structural => repaired.strategy.to_string().yellow(),
            Strategy::Salvaged => repaired.strategy.to_string().red(),
        };
        eprintln!("{} {}", "strategy:".dimmed(), label);
    }

    let output = if cli.pretty {
        serde_json::to_string_pretty(&repaired.value)?
    } else {
        serde_json::to_string(&repaired.value)?
    };
    println!("{}", output);

    Ok(())
}
