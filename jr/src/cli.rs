//! CLI argument parsing for jr

use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "jr")]
#[command(author, version, about = "Repair truncated or malformed JSON from LLM output", long_about = None)]
pub struct Cli {
    /// File to repair (reads stdin when omitted or "-")
    pub file: Option<PathBuf>,

    /// Report the winning strategy on stderr
    #[arg(short, long)]
    pub strategy: bool,

    /// Pretty-print the repaired JSON
    #[arg(short, long)]
    pub pretty: bool,
}

impl Cli {
    /// Input path, or None for stdin
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.file.as_ref().filter(|path| path.as_path() != Path::new("-"))
    }
}
