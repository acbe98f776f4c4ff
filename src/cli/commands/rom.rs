//! CLI commands for ROM operations

use std::path::Path;

use anyhow::Context;
use rayon::prelude::*;

use crate::cli::commands::RomCommands;
use crate::cli::progress::simple_bar;
use crate::formats::fnt::Folder;
use crate::rom::NdsRom;

/// Execute a `rom` subcommand.
///
/// # Errors
/// Returns an error if the ROM cannot be read, parsed, or extracted.
pub fn execute(command: RomCommands) -> anyhow::Result<()> {
    match command {
        RomCommands::Info { source } => {
            let rom = NdsRom::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            print_info(&rom);
        }
        RomCommands::List { source } => {
            let rom = NdsRom::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            for id in 0..rom.files.len() as u16 {
                let name = rom
                    .filenames
                    .name_of(id)
                    .unwrap_or_else(|| format!("<unnamed {id:04}>"));
                println!("{id:4}  {:8}  {name}", rom.files[usize::from(id)].len());
            }
        }
        RomCommands::Extract {
            source,
            destination,
            quiet,
        } => {
            let rom = NdsRom::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            extract(&rom, &destination, quiet)?;
        }
    }
    Ok(())
}

fn print_info(rom: &NdsRom) {
    println!("Title:         {}", String::from_utf8_lossy(&rom.title));
    println!("ID code:       {}", String::from_utf8_lossy(&rom.id_code));
    println!(
        "Developer:     {}",
        String::from_utf8_lossy(&rom.developer_code)
    );
    println!("Capacity:      {} KiB", 128 << rom.device_capacity);
    println!("Region:        {:#04x}", rom.region);
    println!("Version:       {}", rom.version);
    println!(
        "ARM9:          {} bytes, entry {:#010x}, RAM {:#010x}",
        rom.arm9.len(),
        rom.arm9_entry_address,
        rom.arm9_ram_address
    );
    println!(
        "ARM7:          {} bytes, entry {:#010x}, RAM {:#010x}",
        rom.arm7.len(),
        rom.arm7_entry_address,
        rom.arm7_ram_address
    );
    println!("ARM9 overlays: {}", rom.arm9_overlay_table.len() / 32);
    println!("ARM7 overlays: {}", rom.arm7_overlay_table.len() / 32);
    println!("Files:         {}", rom.files.len());
}

fn extract(rom: &NdsRom, destination: &Path, quiet: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(destination)?;

    // Code banks and metadata blobs.
    std::fs::write(destination.join("arm9.bin"), &rom.arm9)?;
    std::fs::write(destination.join("arm7.bin"), &rom.arm7)?;
    if !rom.arm9_overlay_table.is_empty() {
        std::fs::write(destination.join("arm9ovt.bin"), &rom.arm9_overlay_table)?;
    }
    if !rom.arm7_overlay_table.is_empty() {
        std::fs::write(destination.join("arm7ovt.bin"), &rom.arm7_overlay_table)?;
    }
    if !rom.icon_banner.is_empty() {
        std::fs::write(destination.join("banner.bin"), &rom.icon_banner)?;
    }

    // Filesystem: named files go to their tree paths, the rest under a
    // catch-all directory.
    let root = destination.join("data");
    let mut jobs: Vec<(std::path::PathBuf, u16)> = Vec::new();
    collect_jobs(&rom.filenames, &root, &mut jobs);

    let named: std::collections::HashSet<u16> = jobs.iter().map(|(_, id)| *id).collect();
    let unnamed_root = destination.join("unnamed");
    for id in 0..rom.files.len() as u16 {
        if !named.contains(&id) {
            jobs.push((unnamed_root.join(format!("{id:04}.bin")), id));
        }
    }

    let bar = if quiet {
        None
    } else {
        Some(simple_bar(jobs.len() as u64, "Extracting"))
    };

    jobs.par_iter().try_for_each(|(path, id)| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &rom.files[usize::from(*id)])
            .with_context(|| format!("writing {}", path.display()))?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
        Ok::<(), anyhow::Error>(())
    })?;

    if let Some(bar) = bar {
        bar.finish_with_message("Done");
    }
    Ok(())
}

fn collect_jobs(folder: &Folder, path: &Path, jobs: &mut Vec<(std::path::PathBuf, u16)>) {
    for (i, file) in folder.files.iter().enumerate() {
        jobs.push((path.join(file), folder.first_id + i as u16));
    }
    for (name, sub) in &folder.folders {
        collect_jobs(sub, &path.join(name), jobs);
    }
}
