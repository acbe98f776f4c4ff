//! CLI commands for the compression codecs

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::cli::commands::{CodeCommands, Lz10Commands};
use crate::compression::{code, lz10};

fn output_or(input: &Path, output: Option<PathBuf>, extension: &str) -> PathBuf {
    output.unwrap_or_else(|| input.with_extension(extension))
}

/// Execute an `lz10` subcommand.
///
/// # Errors
/// Returns an error if a file cannot be read/written or is malformed.
pub fn execute_lz10(command: Lz10Commands) -> anyhow::Result<()> {
    match command {
        Lz10Commands::Compress { input, output } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let compressed = lz10::compress(&data);
            let output = output_or(&input, output, "cmp");
            std::fs::write(&output, &compressed)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                compressed.len()
            );
        }
        Lz10Commands::Decompress { input, output } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let decompressed = lz10::decompress(&data)
                .with_context(|| format!("decompressing {}", input.display()))?;
            let output = output_or(&input, output, "dec");
            std::fs::write(&output, &decompressed)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                decompressed.len()
            );
        }
    }
    Ok(())
}

/// Execute a `code` subcommand.
///
/// # Errors
/// Returns an error if a file cannot be read/written or is malformed.
pub fn execute_code(command: CodeCommands) -> anyhow::Result<()> {
    match command {
        CodeCommands::Compress {
            input,
            output,
            arm9,
        } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let compressed = code::compress(&data, arm9);
            let output = output_or(&input, output, "cmp");
            std::fs::write(&output, &compressed)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                compressed.len()
            );
        }
        CodeCommands::Decompress { input, output } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let decompressed = code::decompress(&data)
                .with_context(|| format!("decompressing {}", input.display()))?;
            let output = output_or(&input, output, "dec");
            std::fs::write(&output, &decompressed)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} -> {} ({} -> {} bytes)",
                input.display(),
                output.display(),
                data.len(),
                decompressed.len()
            );
        }
    }
    Ok(())
}
