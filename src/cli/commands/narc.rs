//! CLI commands for NARC archives

use std::path::Path;

use anyhow::Context;
use walkdir::WalkDir;

use crate::cli::commands::NarcCommands;
use crate::formats::fnt::Folder;
use crate::formats::narc::Narc;

/// Execute a `narc` subcommand.
///
/// # Errors
/// Returns an error if the archive or directory cannot be processed.
pub fn execute(command: NarcCommands) -> anyhow::Result<()> {
    match command {
        NarcCommands::List { source } => {
            let narc = Narc::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            for id in 0..narc.files.len() as u16 {
                let name = narc
                    .filenames
                    .name_of(id)
                    .unwrap_or_else(|| format!("<unnamed {id:04}>"));
                println!("{id:4}  {:8}  {name}", narc.files[usize::from(id)].len());
            }
        }
        NarcCommands::Extract {
            source,
            destination,
        } => {
            let narc = Narc::from_file(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            for id in 0..narc.files.len() as u16 {
                let relative = narc
                    .filenames
                    .name_of(id)
                    .unwrap_or_else(|| format!("{id:04}.bin"));
                let path = destination.join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, &narc.files[usize::from(id)])
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            println!("extracted {} files", narc.files.len());
        }
        NarcCommands::Create {
            source,
            destination,
        } => {
            let mut files = Vec::new();
            let filenames = build_tree(&source, &mut files)?;
            let narc = Narc::from_files_and_names(files, Some(filenames));
            narc.save_to_file(&destination)
                .with_context(|| format!("writing {}", destination.display()))?;
            println!(
                "packed {} files into {}",
                narc.files.len(),
                destination.display()
            );
        }
    }
    Ok(())
}

/// Build a filename table from a directory, assigning file IDs in tree
/// order (files first, then subfolders, each sorted by name).
fn build_tree(root: &Path, files: &mut Vec<Vec<u8>>) -> anyhow::Result<Folder> {
    let mut folder = Folder {
        first_id: files.len() as u16,
        ..Folder::default()
    };

    let mut entries: Vec<_> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| (e.file_type().is_dir(), e.file_name().to_owned()));

    for entry in &entries {
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push(std::fs::read(entry.path())?);
        folder.files.push(name);
    }
    for entry in &entries {
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let sub = build_tree(entry.path(), files)?;
        folder.folders.push((name, sub));
    }

    Ok(folder)
}
