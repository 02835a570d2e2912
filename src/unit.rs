//! A unit is one physical origin (a directory subtree or a single archive
//! file) grouping the entries discovered in it. Units accumulate classes,
//! passthrough files and directory markers during traversal, and own the
//! logic to persist processed output back into their origin's native shape
//! (a folder tree, or a zip/jar stream).

use anyhow::{Context as _, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

use crate::loader::{ByteSource, Link};
use crate::model::{ClassEntry, ClassParser, SourceProvider};
use crate::scan::{CLASS_SUFFIX, MULTI_RELEASE_PREFIX, entry_escapes_archive};
use crate::sink::ResultSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Folder,
    Jar,
    Zip,
}

/// Passthrough non-class file, copied verbatim on save.
#[derive(Debug, Clone)]
pub struct OtherEntry {
    /// Container the bytes come from: the file itself for folder units,
    /// the archive file for archive units.
    pub source: PathBuf,
    pub entry_name: String,
}

#[derive(Debug)]
pub struct Unit {
    kind: UnitKind,
    /// Folder units: the origin key itself. Archive units: the origin-key
    /// prefix of the directory holding the archive.
    path: String,
    /// Archive file name; empty for folder units.
    name: String,
    is_own: bool,
    /// On-disk archive location backing an archive unit, re-enumerated on
    /// reload. Folder units re-derive their directories from class links
    /// instead (the default `""` unit can span several roots).
    container: Option<PathBuf>,
    classes: Vec<ClassEntry>,
    other_entries: Vec<OtherEntry>,
    dir_entries: Vec<String>,
    manifest: Option<Vec<u8>>,
}

impl Unit {
    pub fn folder(path: impl Into<String>, is_own: bool) -> Self {
        Self {
            kind: UnitKind::Folder,
            path: path.into(),
            name: String::new(),
            is_own,
            container: None,
            classes: Vec::new(),
            other_entries: Vec::new(),
            dir_entries: Vec::new(),
            manifest: None,
        }
    }

    pub fn archive(
        kind: UnitKind,
        path: impl Into<String>,
        name: impl Into<String>,
        is_own: bool,
        container: PathBuf,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            name: name.into(),
            is_own,
            container: Some(container),
            classes: Vec::new(),
            other_entries: Vec::new(),
            dir_entries: Vec::new(),
            manifest: None,
        }
    }

    /// Registry key this unit is addressed by.
    pub fn key(&self) -> String {
        match self.kind {
            UnitKind::Folder => self.path.clone(),
            UnitKind::Jar | UnitKind::Zip => format!("{}/{}", self.path, self.name),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn is_own(&self) -> bool {
        self.is_own
    }

    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }

    pub fn other_entries(&self) -> &[OtherEntry] {
        &self.other_entries
    }

    pub fn dir_entries(&self) -> &[String] {
        &self.dir_entries
    }

    pub fn manifest(&self) -> Option<&[u8]> {
        self.manifest.as_deref()
    }

    pub fn set_manifest(&mut self, manifest: Option<Vec<u8>>) {
        self.manifest = manifest;
    }

    pub fn add_class(&mut self, entry: ClassEntry) {
        self.classes.push(entry);
    }

    pub fn add_other_entry(&mut self, source: PathBuf, entry_name: impl Into<String>) {
        self.other_entries.push(OtherEntry {
            source,
            entry_name: entry_name.into(),
        });
    }

    pub fn add_dir_entry(&mut self, entry_name: impl Into<String>) {
        self.dir_entries.push(entry_name.into());
    }

    /// Persists this unit into its origin's native shape. Entry-level
    /// failures are logged and skipped; an archive stream that was opened
    /// is always closed, even when entry writes failed mid-unit.
    pub fn save(&self, sink: &dyn ResultSink, provider: &dyn SourceProvider) -> Result<()> {
        match self.kind {
            UnitKind::Folder => self.save_folder(sink, provider),
            UnitKind::Jar | UnitKind::Zip => self.save_archive(sink, provider),
        }
    }

    fn save_folder(&self, sink: &dyn ResultSink, provider: &dyn SourceProvider) -> Result<()> {
        sink.ensure_folder(&self.path)?;

        for other in &self.other_entries {
            if let Err(err) = sink.copy_plain_file(&other.source, &self.path, &other.entry_name) {
                warn!(
                    source = %other.source.display(),
                    entry = other.entry_name.as_str(),
                    "cannot copy file: {err:#}"
                );
            }
        }

        for class in &self.classes {
            let Some(entry_name) = provider.entry_name(class, &class.entry_name) else {
                continue;
            };
            let Some(content) = provider.content(class) else {
                continue;
            };
            if let Err(err) = sink.write_class_source(
                &self.path,
                &class.qualified_name,
                &entry_name,
                &content,
                None,
            ) {
                warn!(
                    class = class.qualified_name.as_str(),
                    "cannot write decompiled source: {err:#}"
                );
            }
        }
        Ok(())
    }

    fn save_archive(&self, sink: &dyn ResultSink, provider: &dyn SourceProvider) -> Result<()> {
        sink.ensure_folder(&self.path)?;
        sink.open_archive(&self.path, &self.name, self.manifest.as_deref())?;

        self.write_archive_entries(sink, provider);
        sink.close_archive(&self.path, &self.name)
    }

    fn write_archive_entries(&self, sink: &dyn ResultSink, provider: &dyn SourceProvider) {
        for dir in &self.dir_entries {
            if let Err(err) = sink.write_dir_marker(&self.path, &self.name, dir) {
                warn!(entry = dir.as_str(), "cannot write directory entry: {err:#}");
            }
        }

        for other in &self.other_entries {
            if let Err(err) =
                sink.copy_entry(&other.source, &self.path, &self.name, &other.entry_name)
            {
                warn!(
                    entry = other.entry_name.as_str(),
                    "cannot copy archive entry: {err:#}"
                );
            }
        }

        for class in &self.classes {
            let Some(entry_name) = provider.entry_name(class, &class.entry_name) else {
                continue;
            };
            let content = provider.content(class);
            if let Err(err) = sink.write_entry(
                &self.path,
                &self.name,
                &entry_name,
                content.as_deref().map(str::as_bytes),
            ) {
                warn!(
                    class = class.qualified_name.as_str(),
                    "cannot write archive entry: {err:#}"
                );
            }
        }
    }

    /// Re-scans this unit's origin, replacing its class list with the
    /// current on-disk state and refreshing the byte-source links.
    /// Corrupted classes are logged and dropped from the new set.
    pub fn reload(&mut self, source: &dyn ByteSource, parser: &dyn ClassParser) -> Result<()> {
        match self.kind {
            UnitKind::Folder => self.reload_folder(source, parser),
            UnitKind::Jar | UnitKind::Zip => self.reload_archive(source, parser),
        }
    }

    fn reload_folder(&mut self, source: &dyn ByteSource, parser: &dyn ClassParser) -> Result<()> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for class in &self.classes {
            if let Some(link) = source.link_for(&class.qualified_name)
                && link.entry.is_none()
                && let Some(parent) = link.container.parent()
                && !dirs.iter().any(|d| d.as_path() == parent)
            {
                dirs.push(parent.to_path_buf());
            }
            source.remove_link(&class.qualified_name);
        }

        let key = self.key();
        let mut classes = Vec::new();
        for dir in &dirs {
            // a directory that vanished simply contributes no classes
            let files = match sorted_class_files(dir) {
                Ok(files) => files,
                Err(err) => {
                    warn!(dir = %dir.display(), "cannot re-scan directory: {err:#}");
                    continue;
                }
            };
            for path in files {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let bytes = match source.bytes(&Link::file(&path)) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(path = %path.display(), "cannot reload class file: {err:#}");
                        continue;
                    }
                };
                match parser.parse(&bytes, self.is_own) {
                    Ok(parsed) => {
                        source.register_link(&parsed.qualified_name, Link::file(&path));
                        classes.push(ClassEntry {
                            qualified_name: parsed.qualified_name,
                            is_own: self.is_own,
                            unit_key: key.clone(),
                            entry_name: file_name,
                        });
                    }
                    Err(err) => {
                        warn!(path = %path.display(), "corrupted class file: {err:#}");
                    }
                }
            }
        }

        self.classes = classes;
        Ok(())
    }

    fn reload_archive(&mut self, source: &dyn ByteSource, parser: &dyn ClassParser) -> Result<()> {
        let container = self
            .container
            .clone()
            .context("archive unit has no container path")?;
        let file = File::open(&container)
            .with_context(|| format!("Failed to open archive: {}", container.display()))?;
        // SAFETY: The file is opened read-only and remains valid for the
        // lifetime of the mmap. The mmap is dropped before the file.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap archive: {}", container.display()))?;
        let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
            .with_context(|| format!("Failed to read zip structure: {}", container.display()))?;

        for class in &self.classes {
            source.remove_link(&class.qualified_name);
        }

        let key = self.key();
        let mut classes = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .with_context(|| format!("Failed to read entry in {}", container.display()))?;
            let name = entry.name().to_string();
            if name.starts_with(MULTI_RELEASE_PREFIX) || !name.ends_with(CLASS_SUFFIX) {
                continue;
            }
            if entry_escapes_archive(&name) {
                anyhow::bail!("zip entry '{name}' tries to escape {}", container.display());
            }

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            if let Err(err) = entry.read_to_end(&mut bytes) {
                warn!(entry = name.as_str(), "cannot reload archive entry: {err:#}");
                continue;
            }
            match parser.parse(&bytes, self.is_own) {
                Ok(parsed) => {
                    source.register_link(&parsed.qualified_name, Link::archived(&container, &name));
                    classes.push(ClassEntry {
                        qualified_name: parsed.qualified_name,
                        is_own: self.is_own,
                        unit_key: key.clone(),
                        entry_name: name,
                    });
                }
                Err(err) => {
                    warn!(entry = name.as_str(), "corrupted class file: {err:#}");
                }
            }
        }

        self.classes = classes;
        Ok(())
    }
}

fn sorted_class_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_class = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(CLASS_SUFFIX))
            .unwrap_or(false);
        if is_class {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_keys_follow_origin_scheme() {
        let folder = Unit::folder("a/b", true);
        assert_eq!(folder.key(), "a/b");

        let archive = Unit::archive(
            UnitKind::Jar,
            "lib",
            "demo.jar",
            false,
            PathBuf::from("/tmp/demo.jar"),
        );
        assert_eq!(archive.key(), "lib/demo.jar");

        let top_level = Unit::archive(
            UnitKind::Zip,
            "",
            "demo.zip",
            true,
            PathBuf::from("/tmp/demo.zip"),
        );
        assert_eq!(top_level.key(), "/demo.zip");
    }

    #[test]
    fn entries_accumulate_in_discovery_order() {
        let mut unit = Unit::folder("", true);
        unit.add_other_entry(PathBuf::from("/tmp/a.txt"), "a.txt");
        unit.add_other_entry(PathBuf::from("/tmp/b.txt"), "b.txt");
        unit.add_dir_entry("empty/");

        assert_eq!(unit.other_entries()[0].entry_name, "a.txt");
        assert_eq!(unit.other_entries()[1].entry_name, "b.txt");
        assert_eq!(unit.dir_entries(), ["empty/"]);
    }
}
