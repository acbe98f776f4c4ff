//! CLI command definitions and dispatch

use std::path::PathBuf;

use clap::Subcommand;

pub mod compress;
pub mod narc;
pub mod rom;
pub mod sdat;

#[derive(Subcommand)]
pub enum Commands {
    /// ROM image operations
    Rom {
        #[command(subcommand)]
        command: RomCommands,
    },

    /// NARC archive operations
    Narc {
        #[command(subcommand)]
        command: NarcCommands,
    },

    /// SDAT sound archive operations
    Sdat {
        #[command(subcommand)]
        command: SdatCommands,
    },

    /// LZ10 compression
    Lz10 {
        #[command(subcommand)]
        command: Lz10Commands,
    },

    /// Executable code compression
    Code {
        #[command(subcommand)]
        command: CodeCommands,
    },
}

#[derive(Subcommand)]
pub enum RomCommands {
    /// Print header information about a ROM
    Info {
        /// Source .nds file
        source: PathBuf,
    },

    /// List the files inside a ROM
    List {
        /// Source .nds file
        source: PathBuf,
    },

    /// Extract a ROM's filesystem (and code banks) to a directory
    Extract {
        /// Source .nds file
        source: PathBuf,

        /// Output directory
        destination: PathBuf,

        /// Suppress the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Subcommand)]
pub enum NarcCommands {
    /// List the files inside a NARC
    List {
        /// Source .narc file
        source: PathBuf,
    },

    /// Extract a NARC to a directory
    Extract {
        /// Source .narc file
        source: PathBuf,

        /// Output directory
        destination: PathBuf,
    },

    /// Create a NARC from a directory tree
    Create {
        /// Source directory
        source: PathBuf,

        /// Output .narc file
        destination: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum SdatCommands {
    /// List the assets inside an SDAT
    List {
        /// Source .sdat file
        source: PathBuf,
    },

    /// Extract an SDAT's assets to a directory
    Extract {
        /// Source .sdat file
        source: PathBuf,

        /// Output directory
        destination: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum Lz10Commands {
    /// Compress a file with LZ10
    Compress {
        /// Input file
        input: PathBuf,

        /// Output file (defaults to input + ".cmp")
        output: Option<PathBuf>,
    },

    /// Decompress an LZ10 file
    Decompress {
        /// Input file
        input: PathBuf,

        /// Output file (defaults to input + ".dec")
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CodeCommands {
    /// Compress a code file
    Compress {
        /// Input file
        input: PathBuf,

        /// Output file (defaults to input + ".cmp")
        output: Option<PathBuf>,

        /// Treat the data as a main ARM9 code file (not an overlay)
        #[arg(long)]
        arm9: bool,
    },

    /// Decompress a code file
    Decompress {
        /// Input file
        input: PathBuf,

        /// Output file (defaults to input + ".dec")
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying operation fails.
    pub fn execute(self) -> anyhow::Result<()> {
        match self {
            Commands::Rom { command } => rom::execute(command),
            Commands::Narc { command } => narc::execute(command),
            Commands::Sdat { command } => sdat::execute(command),
            Commands::Lz10 { command } => compress::execute_lz10(command),
            Commands::Code { command } => compress::execute_code(command),
        }
    }
}
