use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

/// Entries of an archive, split into classes and everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveCatalog {
    /// Slash-separated class paths without the `.class` suffix (`com/app/Main$1`).
    pub classes: Vec<String>,
    /// Remaining file entries, by archive path.
    pub resources: Vec<String>,
}

fn open_archive(archive_path: &Path) -> Result<(File, Mmap)> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and outlives the mapping within the caller.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap archive: {}", archive_path.display()))?;
    Ok((file, mmap))
}

pub fn catalog(archive_path: &Path) -> Result<ArchiveCatalog> {
    let (_file, mmap) = open_archive(archive_path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;

    let mut out = ArchiveCatalog::default();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        match name.strip_suffix(".class") {
            Some(class_path) => out.classes.push(class_path.to_string()),
            None => out.resources.push(name),
        }
    }
    out.classes.sort();
    out.resources.sort();
    Ok(out)
}

pub fn read_entry(archive_path: &Path, entry_name: &str) -> Result<Vec<u8>> {
    let (_file, mmap) = open_archive(archive_path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;
    let mut entry = archive
        .by_name(entry_name)
        .with_context(|| format!("Entry not found: {entry_name}"))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// The class whose output `class_path` is folded into: the shortest prefix
/// ending before a `$` that `is_class` knows, or the path itself.
/// Leading `$`s belong to the simple name (`$Gson$Types` is a class of its own
/// unless `$Gson` exists).
pub fn top_level_class<'a>(class_path: &'a str, is_class: impl Fn(&str) -> bool) -> &'a str {
    let simple_start = class_path.rfind('/').map_or(0, |i| i + 1);
    let simple = &class_path[simple_start..];
    let name_start = simple_start + simple.len() - simple.trim_start_matches('$').len();
    class_path[name_start..]
        .match_indices('$')
        .map(|(i, _)| &class_path[..name_start + i])
        .find(|candidate| is_class(candidate))
        .unwrap_or(class_path)
}
