//! Byte-source resolution for discovered classes.
//!
//! Every registered class gets a [`Link`] recording where its raw bytes
//! live: a loose file on disk, or an entry inside an archive. The link map
//! lets the decompiler re-fetch bytes lazily (and pick up on-disk edits on
//! reload) without re-walking the tree.

use anyhow::{Context as _, Result};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use zip::ZipArchive;

/// Deferred byte-source reference: the container file on disk plus the
/// entry name inside it when the class lives in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub container: PathBuf,
    pub entry: Option<String>,
}

impl Link {
    pub fn file(container: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            entry: None,
        }
    }

    pub fn archived(container: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            entry: Some(entry.into()),
        }
    }
}

/// Resolves raw class bytes and keeps the class-name-to-link registry.
pub trait ByteSource: Send + Sync {
    /// Raw bytes behind `link`, fetched fresh from disk.
    fn bytes(&self, link: &Link) -> Result<Vec<u8>>;

    fn register_link(&self, qualified_name: &str, link: Link);
    fn remove_link(&self, qualified_name: &str);
    fn link_for(&self, qualified_name: &str) -> Option<Link>;

    /// Convenience lookup-then-fetch by qualified name.
    fn class_bytes(&self, qualified_name: &str) -> Result<Vec<u8>> {
        let link = self
            .link_for(qualified_name)
            .with_context(|| format!("No byte-source link for class: {qualified_name}"))?;
        self.bytes(&link)
    }
}

/// Filesystem-backed resolver: plain read for loose files, mmap-backed zip
/// lookup for archived entries.
#[derive(Debug, Default)]
pub struct FsByteSource {
    links: RwLock<HashMap<String, Link>>,
}

impl FsByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_count(&self) -> usize {
        self.links.read().expect("link map lock poisoned").len()
    }
}

impl ByteSource for FsByteSource {
    fn bytes(&self, link: &Link) -> Result<Vec<u8>> {
        match link.entry.as_deref() {
            None => std::fs::read(&link.container)
                .with_context(|| format!("Failed to read class file: {}", link.container.display())),
            Some(entry) => read_archive_entry(&link.container, entry),
        }
    }

    fn register_link(&self, qualified_name: &str, link: Link) {
        self.links
            .write()
            .expect("link map lock poisoned")
            .insert(qualified_name.to_string(), link);
    }

    fn remove_link(&self, qualified_name: &str) {
        self.links
            .write()
            .expect("link map lock poisoned")
            .remove(qualified_name);
    }

    fn link_for(&self, qualified_name: &str) -> Option<Link> {
        self.links
            .read()
            .expect("link map lock poisoned")
            .get(qualified_name)
            .cloned()
    }
}

/// Reads one named entry out of a zip/jar archive.
pub fn read_archive_entry(archive_path: &Path, entry_name: &str) -> Result<Vec<u8>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime
    // of the mmap. The mmap is dropped before the file.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap archive: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;
    let mut entry = archive.by_name(entry_name).with_context(|| {
        format!("Entry not found in {}: {entry_name}", archive_path.display())
    })?;

    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).with_context(|| {
        format!("Failed to read entry {entry_name} from {}", archive_path.display())
    })?;
    Ok(bytes)
}
