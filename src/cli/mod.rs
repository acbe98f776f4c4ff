//! `nitrokit` CLI - command-line interface for the DS file format tools

pub mod commands;
pub mod progress;

use clap::Parser;
use commands::Commands;

#[derive(Parser)]
#[command(name = "nitrokit")]
#[command(about = "NitroKit: Nintendo DS file format tools")]
#[command(long_about = "NitroKit: Nintendo DS file format tools

A pure-Rust toolkit for working with Nintendo DS file formats.
Supports ROM images, NARC archives, LZ10/code compression, BMG message
files, and SDAT sound archives.

Examples:
  nitrokit rom info game.nds
  nitrokit rom extract game.nds ./output
  nitrokit narc create ./assets data.narc
  nitrokit lz10 decompress file.cmp file.bin
  nitrokit sdat list sound_data.sdat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Run the `nitrokit` CLI
pub fn run_cli() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.command.execute()?;

    Ok(())
}
