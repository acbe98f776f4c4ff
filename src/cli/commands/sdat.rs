//! CLI commands for SDAT sound archives

use std::path::Path;

use anyhow::Context;

use crate::cli::commands::SdatCommands;
use crate::sound::sdat::{NamedEntry, Sdat};

/// Execute an `sdat` subcommand.
///
/// # Errors
/// Returns an error if the archive cannot be read or extracted.
pub fn execute(command: SdatCommands) -> anyhow::Result<()> {
    match command {
        SdatCommands::List { source } => {
            let sdat = Sdat::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            list_kind("sequence", &sdat.sequences);
            list_kind("sequence-archive", &sdat.sequence_archives);
            list_kind("bank", &sdat.banks);
            list_kind("wave-archive", &sdat.wave_archives);
            list_kind("sequence-player", &sdat.sequence_players);
            list_kind("group", &sdat.groups);
            list_kind("stream-player", &sdat.stream_players);
            list_kind("stream", &sdat.streams);
        }
        SdatCommands::Extract {
            source,
            destination,
        } => {
            let sdat = Sdat::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            extract(&sdat, &destination)?;
        }
    }
    Ok(())
}

fn list_kind<T>(kind: &str, entries: &[NamedEntry<T>]) {
    for (i, (name, value)) in entries.iter().enumerate() {
        let name = name.as_deref().unwrap_or("<unnamed>");
        let state = if value.is_some() { "" } else { " (empty)" };
        println!("{kind:17} {i:4}  {name}{state}");
    }
}

fn extract(sdat: &Sdat, destination: &Path) -> anyhow::Result<()> {
    let write = |dir: &str, i: usize, name: &Option<String>, ext: &str, data: Vec<u8>| {
        let dir = destination.join(dir);
        std::fs::create_dir_all(&dir)?;
        let stem = name.clone().unwrap_or_else(|| format!("{i:04}"));
        let path = dir.join(format!("{stem}.{ext}"));
        std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))
    };

    let mut count = 0usize;
    for (i, (name, sseq)) in sdat.sequences.iter().enumerate() {
        if let Some(sseq) = sseq {
            write("sseq", i, name, "sseq", sseq.save()?)?;
            count += 1;
        }
    }
    for (i, (name, ssar)) in sdat.sequence_archives.iter().enumerate() {
        if let Some(ssar) = ssar {
            write("ssar", i, name, "ssar", ssar.save()?)?;
            count += 1;
        }
    }
    for (i, (name, sbnk)) in sdat.banks.iter().enumerate() {
        if let Some(sbnk) = sbnk {
            write("sbnk", i, name, "sbnk", sbnk.save())?;
            count += 1;
        }
    }
    for (i, (name, swar)) in sdat.wave_archives.iter().enumerate() {
        if let Some(swar) = swar {
            write("swar", i, name, "swar", swar.save())?;
            count += 1;
        }
    }
    for (i, (name, strm)) in sdat.streams.iter().enumerate() {
        if let Some(strm) = strm {
            write("strm", i, name, "strm", strm.clone().save(Default::default())?)?;
            count += 1;
        }
    }

    println!("extracted {count} assets to {}", destination.display());
    Ok(())
}
