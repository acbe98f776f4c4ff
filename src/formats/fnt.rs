//! Filename tables, as found in ROMs and NARC archives
//!
//! A filename table is a tree of folders. File IDs are implicit: the k-th
//! file in a folder has ID `first_id + k`, and subfolders continue the
//! numbering. On the wire the table is a fixed-stride directory table (one
//! 8-byte row per folder, root at index 0xF000) followed by packed
//! length-prefixed entry lists.

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::{Error, Result};
use crate::utils;

/// Index of the root folder in the directory table.
const ROOT_FOLDER_ID: u16 = 0xF000;

/// A single folder within a filename table, or an entire filename table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Folder {
    /// Subfolders, as (name, folder) pairs, in wire order.
    pub folders: Vec<(String, Folder)>,
    /// File names in this folder, in wire order.
    pub files: Vec<String>,
    /// File ID of the first file in this folder.
    pub first_id: u16,
}

impl Folder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the file ID for a `/`-separated path relative to this folder.
    #[must_use]
    pub fn id_of(&self, path: &str) -> Option<u16> {
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        let first = parts.next()?;
        self.id_of_parts(first, parts)
    }

    fn id_of_parts<'a>(
        &self,
        part: &str,
        mut rest: impl Iterator<Item = &'a str>,
    ) -> Option<u16> {
        match rest.next() {
            None => self
                .files
                .iter()
                .position(|f| f == part)
                .map(|i| self.first_id + i as u16),
            Some(next) => self
                .folders
                .iter()
                .find(|(name, _)| name == part)
                .and_then(|(_, folder)| folder.id_of_parts(next, rest)),
        }
    }

    /// Find the Folder for a `/`-separated subfolder path.
    #[must_use]
    pub fn subfolder(&self, path: &str) -> Option<&Folder> {
        let mut current = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = current
                .folders
                .iter()
                .find(|(name, _)| name == part)
                .map(|(_, folder)| folder)?;
        }
        if std::ptr::eq(current, self) {
            None
        } else {
            Some(current)
        }
    }

    /// Find the `/`-separated path of the file with the given ID.
    #[must_use]
    pub fn name_of(&self, id: u16) -> Option<String> {
        if id >= self.first_id {
            let index = usize::from(id - self.first_id);
            if index < self.files.len() {
                return Some(self.files[index].clone());
            }
        }

        for (name, folder) in &self.folders {
            if let Some(path) = folder.name_of(id) {
                return Some(format!("{name}/{path}"));
            }
        }

        None
    }

    /// Total number of files in this folder and all subfolders.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len() + self.folders.iter().map(|(_, f)| f.file_count()).sum::<usize>()
    }

    fn folder_count(&self) -> usize {
        1 + self
            .folders
            .iter()
            .map(|(_, f)| f.folder_count())
            .sum::<usize>()
    }
}

/// Create a [`Folder`] tree from filename table data. This is the inverse of
/// [`save`].
///
/// # Errors
/// Returns [`Error::MalformedFnt`] if a directory index is out of range, the
/// folder graph is not a tree, or the table is truncated.
pub fn load(data: &[u8]) -> Result<Folder> {
    // The root row's parent field holds the total folder count.
    let mut cursor = ByteCursor::le(data);
    cursor.seek(6).map_err(|_| Error::MalformedFnt {
        reason: "directory table is shorter than one row".into(),
        offset: 0,
    })?;
    let folder_count = usize::from(cursor.read_u16()?).min(0x1000);

    let mut visiting = vec![false; 0x1000];
    load_folder(data, ROOT_FOLDER_ID, folder_count, &mut visiting)
}

fn load_folder(
    data: &[u8],
    folder_id: u16,
    folder_count: usize,
    visiting: &mut [bool],
) -> Result<Folder> {
    let row = usize::from(folder_id & 0xFFF);
    if visiting[row] {
        return Err(Error::MalformedFnt {
            reason: format!("folder {folder_id:#x} participates in a cycle"),
            offset: 8 * row,
        });
    }
    visiting[row] = true;

    let mut cursor = ByteCursor::le(data);
    cursor.seek(8 * row).map_err(|_| Error::MalformedFnt {
        reason: format!("directory index {folder_id:#x} is outside the directory table"),
        offset: 8 * row,
    })?;

    let entries_offset = cursor.read_u32()? as usize;
    let first_id = cursor.read_u16()?;

    let mut folder = Folder {
        first_id,
        ..Folder::default()
    };

    cursor.seek(entries_offset).map_err(|_| Error::MalformedFnt {
        reason: format!("entry table offset {entries_offset:#x} is out of range"),
        offset: 8 * row,
    })?;

    loop {
        let control_offset = cursor.tell();
        let control = cursor.read_u8()?;
        if control == 0 {
            break;
        }

        let name_len = usize::from(control & 0x7F);
        let is_folder = control & 0x80 != 0;

        let name: String = cursor
            .read_bytes(name_len)
            .map_err(|_| Error::MalformedFnt {
                reason: "entry name runs past the end of the table".into(),
                offset: control_offset,
            })?
            .iter()
            .map(|&b| b as char)
            .collect();

        if is_folder {
            let sub_id = cursor.read_u16()?;
            if usize::from(sub_id & 0xFFF) >= folder_count {
                return Err(Error::MalformedFnt {
                    reason: format!("subfolder index {sub_id:#x} references a missing directory row"),
                    offset: control_offset,
                });
            }
            let sub = load_folder(data, sub_id, folder_count, visiting)?;
            folder.folders.push((name, sub));
        } else {
            folder.files.push(name);
        }
    }

    Ok(folder)
}

/// Generate filename table data representing this root folder. This is the
/// inverse of [`load`].
///
/// # Errors
/// Returns [`Error::InvalidFnt`] if any name is longer than 127 bytes.
pub fn save(root: &Folder) -> Result<Vec<u8>> {
    // Intermediate rows: (first file ID, parent folder ID, entry table).
    let mut rows: Vec<(u16, u16, Vec<u8>)> = Vec::new();

    // The root folder's "parent" field holds the total folder count.
    let total_folders = root.folder_count();
    collect_folder(root, total_folders as u16, &mut rows)?;

    let mut writer = ByteWriter::new();
    writer.reserve(rows.len() * 8);

    // Entry tables are appended in folder-ID order, directly after the
    // directory table.
    let mut entry_tables = Vec::new();
    let table_len = rows.len() * 8;
    let mut running = table_len;
    for (i, (first_id, parent, entries)) in rows.iter().enumerate() {
        writer.patch_u32_at(8 * i, running as u32);
        writer.patch_u16_at(8 * i + 4, *first_id);
        writer.patch_u16_at(8 * i + 6, *parent);
        running += entries.len();
        entry_tables.extend_from_slice(entries);
    }
    writer.write_bytes(&entry_tables);

    Ok(writer.into_inner())
}

fn collect_folder(
    folder: &Folder,
    parent_id: u16,
    rows: &mut Vec<(u16, u16, Vec<u8>)>,
) -> Result<u16> {
    let folder_id = ROOT_FOLDER_ID + rows.len() as u16;
    rows.push((folder.first_id, parent_id, Vec::new()));
    let row = usize::from(folder_id - ROOT_FOLDER_ID);

    let mut entries = Vec::new();
    for file in &folder.files {
        let encoded = utils::to_latin1(file);
        if encoded.len() > 127 {
            return Err(Error::InvalidFnt(format!(
                "filename \"{file}\" is {} bytes long (maximum is 127)",
                encoded.len()
            )));
        }
        entries.push(encoded.len() as u8);
        entries.extend_from_slice(&encoded);
    }

    for (name, sub) in &folder.folders {
        let sub_id = collect_folder(sub, folder_id, rows)?;

        let encoded = utils::to_latin1(name);
        if encoded.len() > 127 {
            return Err(Error::InvalidFnt(format!(
                "folder name \"{name}\" is {} bytes long (maximum is 127)",
                encoded.len()
            )));
        }
        entries.push(encoded.len() as u8 | 0x80);
        entries.extend_from_slice(&encoded);
        entries.extend_from_slice(&sub_id.to_le_bytes());
    }

    entries.push(0);
    rows[row].2 = entries;

    Ok(folder_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Folder {
        Folder {
            folders: vec![
                (
                    "data".into(),
                    Folder {
                        folders: vec![(
                            "sound".into(),
                            Folder {
                                folders: vec![],
                                files: vec!["bgm.sseq".into(), "se.ssar".into()],
                                first_id: 3,
                            },
                        )],
                        files: vec!["model.nsbmd".into()],
                        first_id: 2,
                    },
                ),
                (
                    "text".into(),
                    Folder {
                        folders: vec![],
                        files: vec!["course.bmg".into()],
                        first_id: 5,
                    },
                ),
            ],
            files: vec!["banner.bin".into(), "title.bin".into()],
            first_id: 0,
        }
    }

    #[test]
    fn round_trip_preserves_structure() {
        let tree = sample_tree();
        let data = save(&tree).unwrap();
        assert_eq!(load(&data).unwrap(), tree);
    }

    #[test]
    fn lookups_are_consistent() {
        let tree = sample_tree();
        for id in 0..tree.file_count() as u16 {
            let name = tree.name_of(id).unwrap();
            assert_eq!(tree.id_of(&name), Some(id), "id {id} via {name}");
        }
    }

    #[test]
    fn id_of_handles_separator_noise() {
        let tree = sample_tree();
        assert_eq!(tree.id_of("/data/sound/bgm.sseq/"), Some(3));
        assert_eq!(tree.id_of("data/missing.bin"), None);
        assert_eq!(tree.id_of("missing/banner.bin"), None);
    }

    #[test]
    fn subfolder_resolves_paths() {
        let tree = sample_tree();
        assert_eq!(tree.subfolder("data/sound").unwrap().first_id, 3);
        assert!(tree.subfolder("nope").is_none());
    }

    #[test]
    fn empty_root_round_trips() {
        let tree = Folder::new();
        let data = save(&tree).unwrap();
        assert_eq!(load(&data).unwrap(), tree);
    }

    #[test]
    fn rejects_overlong_names() {
        let tree = Folder {
            folders: vec![],
            files: vec!["x".repeat(200)],
            first_id: 0,
        };
        assert!(matches!(save(&tree), Err(Error::InvalidFnt(_))));
    }

    #[test]
    fn rejects_cyclic_tables() {
        // Root's entry table points the subfolder back at the root.
        let mut data = Vec::new();
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.push(0x81); // subfolder, name length 1
        data.push(b'a');
        data.extend_from_slice(&0xF000u16.to_le_bytes());
        data.push(0);
        assert!(matches!(load(&data), Err(Error::MalformedFnt { .. })));
    }
}
