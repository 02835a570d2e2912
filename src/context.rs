//! Top-level registry of discovered units and classes.
//!
//! The context owns the map from origin key to [`Unit`] and a flattened
//! index from fully-qualified class name to its registry entry, aggregated
//! across all units. It drives traversal of filesystem roots, recursive
//! archive scanning (including archives nested inside archives),
//! incremental reload, and orchestrated save of own units.
//!
//! Sibling traversal order is lexicographic by file name, so discovery and
//! save order are deterministic across runs. When two units register the
//! same qualified name, the most recently registered entry wins.

use anyhow::{Context as _, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tempfile::TempDir;
use tracing::{debug, error, trace, warn};
use zip::ZipArchive;

use crate::error::ScanError;
use crate::loader::{ByteSource, Link};
use crate::model::{ClassEntry, ClassParser, ParsedClass, SourceProvider};
use crate::saver::MANIFEST_ENTRY;
use crate::scan::{self, FileKind, MULTI_RELEASE_PREFIX};
use crate::sink::ResultSink;
use crate::unit::{Unit, UnitKind};

#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub root: String,
    pub scanned_files: usize,
    pub classes: usize,
    pub archives: usize,
    pub other_entries: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SaveReport {
    pub saved_units: usize,
    pub failed_units: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Class,
    Archive(UnitKind),
    Other,
    EmptyDir,
}

#[derive(Debug)]
struct WorkItem {
    key: String,
    path: PathBuf,
    kind: ItemKind,
}

pub struct Context {
    byte_source: Arc<dyn ByteSource>,
    parser: Arc<dyn ClassParser>,
    units: BTreeMap<String, Unit>,
    classes: RwLock<HashMap<String, ClassEntry>>,
    /// Scratch space nested archives are extracted into; removed with the
    /// context on every exit path.
    temp: Option<TempDir>,
    temp_seq: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl Context {
    pub fn new(byte_source: Arc<dyn ByteSource>, parser: Arc<dyn ClassParser>) -> Self {
        let mut units = BTreeMap::new();
        units.insert(String::new(), Unit::folder("", true));
        Self {
            byte_source,
            parser,
            units,
            classes: RwLock::new(HashMap::new()),
            temp: None,
            temp_seq: 0,
            cancel: None,
        }
    }

    /// Installs a flag checked between units: once raised, scans and saves
    /// finish the unit in flight and stop.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn byte_source(&self) -> Arc<dyn ByteSource> {
        Arc::clone(&self.byte_source)
    }

    pub fn get_class(&self, qualified_name: &str) -> Option<ClassEntry> {
        self.classes
            .read()
            .expect("class index lock poisoned")
            .get(qualified_name)
            .cloned()
    }

    pub fn all_classes(&self) -> Vec<ClassEntry> {
        let mut all: Vec<ClassEntry> = self
            .classes
            .read()
            .expect("class index lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        all
    }

    pub fn unit_keys(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    pub fn unit(&self, key: &str) -> Option<&Unit> {
        self.units.get(key)
    }

    /// Classifies everything reachable from `path` and registers it.
    ///
    /// `is_own` marks the root's contents for output; library roots only
    /// feed the class index. Corrupted classes and archives are logged and
    /// skipped; a zip-slip violation aborts with an error, having
    /// registered nothing from the offending archive.
    pub fn add_root(&mut self, root: &Path, is_own: bool) -> Result<ScanReport> {
        let mut report = ScanReport {
            root: root.to_string_lossy().to_string(),
            ..ScanReport::default()
        };

        let items = if root.is_dir() {
            collect_items(root)
        } else if root.is_file() {
            let file_name = file_name_of(root);
            let kind = match scan::classify(&file_name) {
                FileKind::Jar => ItemKind::Archive(UnitKind::Jar),
                FileKind::Zip => ItemKind::Archive(UnitKind::Zip),
                FileKind::Class => ItemKind::Class,
                FileKind::Other => ItemKind::Other,
            };
            vec![WorkItem {
                key: String::new(),
                path: root.to_path_buf(),
                kind,
            }]
        } else {
            anyhow::bail!("root path does not exist: {}", root.display());
        };

        // Loose class files are decoded in parallel; registration below
        // stays in discovery order so index overwrites are deterministic.
        let parsed: Vec<Option<Result<ParsedClass>>> = {
            let byte_source = &self.byte_source;
            let parser = &self.parser;
            items
                .par_iter()
                .map(|item| match item.kind {
                    ItemKind::Class => Some(
                        byte_source
                            .bytes(&Link::file(&item.path))
                            .and_then(|bytes| parser.parse(&bytes, is_own)),
                    ),
                    _ => None,
                })
                .collect()
        };

        for (item, parse_result) in items.iter().zip(parsed) {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }

            match item.kind {
                ItemKind::EmptyDir => {
                    Self::folder_unit(&mut self.units, &item.key, is_own);
                }
                ItemKind::Other => {
                    report.scanned_files += 1;
                    let file_name = file_name_of(&item.path);
                    let unit = Self::folder_unit(&mut self.units, &item.key, is_own);
                    unit.add_other_entry(item.path.clone(), file_name);
                    report.other_entries += 1;
                }
                ItemKind::Class => {
                    report.scanned_files += 1;
                    match parse_result {
                        Some(Ok(parsed)) => {
                            self.register_file_class(&item.key, &item.path, parsed, is_own);
                            report.classes += 1;
                        }
                        Some(Err(err)) => {
                            let err = ScanError::CorruptedClass {
                                path: item.path.clone(),
                                source: err.into(),
                            };
                            warn!("skipping: {err}");
                            report.skipped += 1;
                        }
                        None => {}
                    }
                }
                ItemKind::Archive(kind) => {
                    report.scanned_files += 1;
                    match self.scan_archive(&item.key, &item.path, kind, is_own, &mut report) {
                        Ok(()) => report.archives += 1,
                        Err(err) if err.is_fatal() => return Err(err.into()),
                        Err(err) => {
                            warn!(
                                archive = %item.path.display(),
                                "corrupted archive file, skipping: {err}"
                            );
                            report.skipped += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Re-scans every unit's origin and rebuilds the class index to match
    /// the current on-disk state. A unit whose origin became unreadable
    /// keeps its previous class set.
    pub fn reload(&mut self) -> Result<()> {
        let keys: Vec<String> = self.units.keys().cloned().collect();
        for key in keys {
            let Some(unit) = self.units.get_mut(&key) else {
                continue;
            };

            {
                let mut index = self.classes.write().expect("class index lock poisoned");
                for class in unit.classes() {
                    index.remove(&class.qualified_name);
                }
            }

            if let Err(err) = unit.reload(self.byte_source.as_ref(), self.parser.as_ref()) {
                warn!(
                    unit = key.as_str(),
                    "reload failed, keeping previous class set: {err:#}"
                );
            }

            for class in unit.classes() {
                index_insert(&self.classes, class.clone());
            }
        }
        Ok(())
    }

    /// Persists every own unit in registry order; library units are never
    /// written. Per-unit failures are logged and counted, not propagated.
    pub fn save(&self, sink: &dyn ResultSink, provider: &dyn SourceProvider) -> SaveReport {
        let mut report = SaveReport::default();
        for (key, unit) in &self.units {
            if self.cancelled() {
                report.cancelled = true;
                break;
            }
            if !unit.is_own() {
                continue;
            }
            match unit.save(sink, provider) {
                Ok(()) => report.saved_units += 1,
                Err(err) => {
                    report.failed_units += 1;
                    error!(unit = key.as_str(), "cannot save unit: {err:#}");
                }
            }
        }
        report
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn folder_unit<'a>(
        units: &'a mut BTreeMap<String, Unit>,
        key: &str,
        is_own: bool,
    ) -> &'a mut Unit {
        units
            .entry(key.to_string())
            .or_insert_with(|| Unit::folder(key, is_own))
    }

    #[allow(clippy::too_many_arguments)]
    fn archive_unit<'a>(
        units: &'a mut BTreeMap<String, Unit>,
        key: &str,
        kind: UnitKind,
        prefix: &str,
        file_name: &str,
        is_own: bool,
        container: &Path,
        manifest: Option<&Vec<u8>>,
    ) -> &'a mut Unit {
        units.entry(key.to_string()).or_insert_with(|| {
            let mut unit = Unit::archive(kind, prefix, file_name, is_own, container.to_path_buf());
            unit.set_manifest(manifest.cloned());
            unit
        })
    }

    fn register_file_class(&mut self, key: &str, path: &Path, parsed: ParsedClass, is_own: bool) {
        let entry = ClassEntry {
            qualified_name: parsed.qualified_name,
            is_own,
            unit_key: key.to_string(),
            entry_name: file_name_of(path),
        };
        self.byte_source
            .register_link(&entry.qualified_name, Link::file(path));

        let unit = Self::folder_unit(&mut self.units, key, is_own);
        unit.add_class(entry.clone());
        index_insert(&self.classes, entry);
    }

    /// Scans one archive file, addressed by `prefix + "/" + file name`.
    ///
    /// Every entry name is validated against zip-slip before anything is
    /// registered, so a hostile archive contributes zero classes. Nested
    /// archives are extracted into scratch space and scanned recursively
    /// under their `.src` namespace.
    fn scan_archive(
        &mut self,
        prefix: &str,
        file: &Path,
        kind: UnitKind,
        is_own: bool,
        report: &mut ScanReport,
    ) -> std::result::Result<(), ScanError> {
        let archive_file = File::open(file)?;
        // SAFETY: The file is opened read-only and remains valid for the
        // lifetime of the mmap. The mmap is dropped before the file.
        let mmap = unsafe { Mmap::map(&archive_file) }?;
        let mut archive =
            ZipArchive::new(Cursor::new(&mmap[..])).map_err(|source| ScanError::CorruptedArchive {
                path: file.to_path_buf(),
                source,
            })?;

        if let Some(bad) = archive
            .file_names()
            .find(|&name| !name.starts_with(MULTI_RELEASE_PREFIX) && scan::entry_escapes_archive(name))
        {
            return Err(ScanError::ZipSlip {
                archive: file.to_path_buf(),
                entry: bad.to_string(),
            });
        }

        let file_name = file_name_of(file);
        let key = scan::archive_key(prefix, &file_name);
        trace!(archive = %file.display(), key = key.as_str(), "scanning archive");
        let manifest = match kind {
            UnitKind::Jar => read_manifest(&mut archive),
            _ => None,
        };

        for index in 0..archive.len() {
            let mut entry =
                archive
                    .by_index(index)
                    .map_err(|source| ScanError::CorruptedArchive {
                        path: file.to_path_buf(),
                        source,
                    })?;
            let name = entry.name().to_string();
            if name.starts_with(MULTI_RELEASE_PREFIX) {
                continue;
            }

            if entry.is_dir() {
                drop(entry);
                let unit = Self::archive_unit(
                    &mut self.units,
                    &key,
                    kind,
                    prefix,
                    &file_name,
                    is_own,
                    file,
                    manifest.as_ref(),
                );
                unit.add_dir_entry(name);
                continue;
            }

            match scan::classify(&name) {
                FileKind::Class => {
                    let mut bytes = Vec::with_capacity(entry.size() as usize);
                    if let Err(err) = entry.read_to_end(&mut bytes) {
                        let err = ScanError::UnreadableEntry {
                            archive: file.to_path_buf(),
                            entry: name,
                            source: err,
                        };
                        warn!("skipping: {err}");
                        report.skipped += 1;
                        continue;
                    }
                    drop(entry);

                    match self.parser.parse(&bytes, is_own) {
                        Ok(parsed) => {
                            self.byte_source
                                .register_link(&parsed.qualified_name, Link::archived(file, &name));
                            let class = ClassEntry {
                                qualified_name: parsed.qualified_name,
                                is_own,
                                unit_key: key.clone(),
                                entry_name: name,
                            };
                            let unit = Self::archive_unit(
                                &mut self.units,
                                &key,
                                kind,
                                prefix,
                                &file_name,
                                is_own,
                                file,
                                manifest.as_ref(),
                            );
                            unit.add_class(class.clone());
                            index_insert(&self.classes, class);
                            report.classes += 1;
                        }
                        Err(err) => {
                            let err = ScanError::CorruptedClass {
                                path: file.join(&name),
                                source: err.into(),
                            };
                            warn!("skipping: {err}");
                            report.skipped += 1;
                        }
                    }
                }
                FileKind::Jar | FileKind::Zip => {
                    let mut bytes = Vec::with_capacity(entry.size() as usize);
                    if let Err(err) = entry.read_to_end(&mut bytes) {
                        let err = ScanError::UnreadableEntry {
                            archive: file.to_path_buf(),
                            entry: name,
                            source: err,
                        };
                        warn!("skipping: {err}");
                        report.skipped += 1;
                        continue;
                    }
                    drop(entry);

                    let nested_prefix = scan::nested_key_prefix(prefix, &file_name, &name);
                    let temp_path = match self.extract_nested(&file_name, &name, &bytes) {
                        Ok(path) => path,
                        Err(err) => {
                            warn!(
                                entry = name.as_str(),
                                "cannot extract nested archive: {err:#}"
                            );
                            report.skipped += 1;
                            continue;
                        }
                    };
                    match self.scan_archive(&nested_prefix, &temp_path, UnitKind::Zip, is_own, report)
                    {
                        Ok(()) => report.archives += 1,
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!(
                                archive = %temp_path.display(),
                                "corrupted nested archive, skipping: {err}"
                            );
                            report.skipped += 1;
                        }
                    }
                }
                FileKind::Other => {
                    drop(entry);
                    let unit = Self::archive_unit(
                        &mut self.units,
                        &key,
                        kind,
                        prefix,
                        &file_name,
                        is_own,
                        file,
                        manifest.as_ref(),
                    );
                    unit.add_other_entry(file.to_path_buf(), name);
                    report.other_entries += 1;
                }
            }
        }

        Ok(())
    }

    fn extract_nested(
        &mut self,
        archive_name: &str,
        entry_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        if self.temp.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("class-context-")
                .tempdir()
                .context("Failed to create scratch directory for nested archives")?;
            self.temp = Some(dir);
        }
        let temp = self.temp.as_ref().expect("scratch directory initialized above");

        // A per-extraction sequence number keeps same-named nested archives
        // from different containers apart.
        self.temp_seq += 1;
        let path = temp
            .path()
            .join(self.temp_seq.to_string())
            .join(archive_name)
            .join(entry_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to extract nested archive: {}", path.display()))?;
        Ok(path)
    }
}

fn index_insert(index: &RwLock<HashMap<String, ClassEntry>>, entry: ClassEntry) {
    let mut map = index.write().expect("class index lock poisoned");
    let name = entry.qualified_name.clone();
    if map.insert(name.clone(), entry).is_some() {
        debug!(class = name.as_str(), "class registered twice, last registration wins");
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn origin_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_origin_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    match rel.parent() {
        Some(parent) => parent
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        None => String::new(),
    }
}

fn directory_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn collect_items(root: &Path) -> Vec<WorkItem> {
    let mut items = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("unreadable directory entry, skipping: {err}");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            if directory_is_empty(path) {
                items.push(WorkItem {
                    key: origin_key(root, path),
                    path: path.to_path_buf(),
                    kind: ItemKind::EmptyDir,
                });
            }
            continue;
        }

        let kind = match scan::classify(&file_name_of(path)) {
            FileKind::Jar => ItemKind::Archive(UnitKind::Jar),
            FileKind::Zip => ItemKind::Archive(UnitKind::Zip),
            FileKind::Class => ItemKind::Class,
            FileKind::Other => ItemKind::Other,
        };
        items.push(WorkItem {
            key: parent_origin_key(root, path),
            path: path.to_path_buf(),
            kind,
        });
    }
    items
}

fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(MANIFEST_ENTRY).ok()?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::FsByteSource;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    /// Stands in for the external class-file decoder: bytes are
    /// `class:<qualified name>`, anything else is malformed.
    struct TextParser;

    impl ClassParser for TextParser {
        fn parse(&self, bytes: &[u8], _is_own: bool) -> Result<ParsedClass> {
            let text = std::str::from_utf8(bytes).map_err(|err| anyhow::anyhow!("not utf-8: {err}"))?;
            let name = text
                .strip_prefix("class:")
                .ok_or_else(|| anyhow::anyhow!("missing class marker"))?;
            Ok(ParsedClass {
                qualified_name: name.trim().to_string(),
            })
        }
    }

    fn new_context() -> Context {
        Context::new(Arc::new(FsByteSource::new()), Arc::new(TextParser))
    }

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_context_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_file(path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn add_root_discovers_directory_tree() -> Result<()> {
        let root = temp_dir("ctx_tree");
        write_file(&root.join("A.class"), b"class:a.A")?;
        write_file(&root.join("pkg/B.class"), b"class:pkg.B")?;
        write_file(&root.join("notes.txt"), b"notes")?;
        std::fs::create_dir_all(root.join("empty"))?;
        write_jar(&root.join("lib/demo.jar"), &[("c/C.class", b"class:c.C")])?;

        let mut ctx = new_context();
        let report = ctx.add_root(&root, true)?;

        assert_eq!(report.classes, 3);
        assert_eq!(report.archives, 1);
        assert_eq!(report.other_entries, 1);
        assert_eq!(report.skipped, 0);

        assert_eq!(ctx.get_class("a.A").map(|c| c.unit_key), Some("".to_string()));
        assert_eq!(
            ctx.get_class("pkg.B").map(|c| c.unit_key),
            Some("pkg".to_string())
        );
        assert_eq!(
            ctx.get_class("c.C").map(|c| c.unit_key),
            Some("lib/demo.jar".to_string())
        );
        assert!(ctx.get_class("missing.M").is_none());

        let keys = ctx.unit_keys();
        assert!(keys.contains(&"".to_string()));
        assert!(keys.contains(&"pkg".to_string()));
        assert!(keys.contains(&"empty".to_string()));
        assert!(keys.contains(&"lib/demo.jar".to_string()));

        let names: Vec<String> = ctx
            .all_classes()
            .into_iter()
            .map(|c| c.qualified_name)
            .collect();
        assert_eq!(names, ["a.A", "c.C", "pkg.B"]);

        let _ = std::fs::remove_dir_all(root);
        Ok(())
    }

    #[test]
    fn nested_archives_live_in_src_namespace() -> Result<()> {
        let base = temp_dir("ctx_nested");
        std::fs::create_dir_all(&base)?;

        let inner = base.join("inner.jar");
        write_jar(&inner, &[("d/D.class", b"class:d.D")])?;
        let inner_bytes = std::fs::read(&inner)?;

        let outer = base.join("outer.jar");
        write_jar(
            &outer,
            &[
                ("a/B.class", b"class:a.B"),
                ("lib/foo.jar", inner_bytes.as_slice()),
            ],
        )?;

        let mut ctx = new_context();
        ctx.add_root(&outer, true)?;

        assert_eq!(
            ctx.get_class("a.B").map(|c| c.unit_key),
            Some("/outer.jar".to_string())
        );
        assert_eq!(
            ctx.get_class("d.D").map(|c| c.unit_key),
            Some("/outer.jar.src/lib/foo.jar".to_string())
        );

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn zip_slip_aborts_scan_and_registers_nothing() -> Result<()> {
        let base = temp_dir("ctx_slip");
        std::fs::create_dir_all(&base)?;
        let jar = base.join("hostile.jar");
        write_jar(
            &jar,
            &[
                ("a/B.class", b"class:a.B"),
                ("../../evil.class", b"class:evil.E"),
            ],
        )?;

        let mut ctx = new_context();
        let result = ctx.add_root(&jar, true);
        assert!(result.is_err());
        assert!(ctx.get_class("a.B").is_none());
        assert!(ctx.get_class("evil.E").is_none());
        assert!(!ctx.unit_keys().contains(&"/hostile.jar".to_string()));

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn duplicate_qualified_names_keep_last_registration() -> Result<()> {
        let base = temp_dir("ctx_dup");
        std::fs::create_dir_all(&base)?;
        let one = base.join("one.jar");
        let two = base.join("two.jar");
        write_jar(&one, &[("a/A.class", b"class:a.A")])?;
        write_jar(&two, &[("a/A.class", b"class:a.A")])?;

        let mut ctx = new_context();
        ctx.add_root(&one, true)?;
        ctx.add_root(&two, true)?;

        assert_eq!(
            ctx.get_class("a.A").map(|c| c.unit_key),
            Some("/two.jar".to_string())
        );
        assert_eq!(ctx.all_classes().len(), 1);

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn corrupted_inputs_are_skipped_not_fatal() -> Result<()> {
        let root = temp_dir("ctx_corrupt");
        write_file(&root.join("good.class"), b"class:g.Good")?;
        write_file(&root.join("bad.class"), &[0xCA, 0xFE, 0xBA, 0xBE])?;
        write_file(&root.join("broken.jar"), b"this is not a zip")?;

        let mut ctx = new_context();
        let report = ctx.add_root(&root, true)?;

        assert_eq!(report.classes, 1);
        assert_eq!(report.skipped, 2);
        assert!(ctx.get_class("g.Good").is_some());

        let _ = std::fs::remove_dir_all(root);
        Ok(())
    }

    #[test]
    fn multi_release_entries_are_ignored() -> Result<()> {
        let base = temp_dir("ctx_multirelease");
        std::fs::create_dir_all(&base)?;
        let jar = base.join("mr.jar");
        write_jar(
            &jar,
            &[
                ("a/A.class", b"class:a.A"),
                ("META-INF/versions/9/a/A.class", b"class:versioned.A"),
            ],
        )?;

        let mut ctx = new_context();
        let report = ctx.add_root(&jar, true)?;

        assert_eq!(report.classes, 1);
        assert!(ctx.get_class("a.A").is_some());
        assert!(ctx.get_class("versioned.A").is_none());

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn reload_tracks_folder_changes() -> Result<()> {
        let root = temp_dir("ctx_reload_dir");
        write_file(&root.join("A.class"), b"class:a.A")?;

        let mut ctx = new_context();
        ctx.add_root(&root, true)?;
        assert!(ctx.get_class("a.A").is_some());

        std::fs::remove_file(root.join("A.class"))?;
        write_file(&root.join("B.class"), b"class:b.B")?;

        ctx.reload()?;
        assert!(ctx.get_class("a.A").is_none());
        assert!(ctx.get_class("b.B").is_some());

        let _ = std::fs::remove_dir_all(root);
        Ok(())
    }

    #[test]
    fn reload_tracks_archive_changes() -> Result<()> {
        let base = temp_dir("ctx_reload_jar");
        std::fs::create_dir_all(&base)?;
        let jar = base.join("demo.jar");
        write_jar(&jar, &[("a/A.class", b"class:a.A")])?;

        let mut ctx = new_context();
        ctx.add_root(&jar, true)?;
        assert!(ctx.get_class("a.A").is_some());

        write_jar(&jar, &[("b/B.class", b"class:b.B")])?;
        ctx.reload()?;

        assert!(ctx.get_class("a.A").is_none());
        assert_eq!(
            ctx.get_class("b.B").map(|c| c.unit_key),
            Some("/demo.jar".to_string())
        );

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn cancelled_scan_stops_between_items() -> Result<()> {
        let root = temp_dir("ctx_cancel");
        write_file(&root.join("A.class"), b"class:a.A")?;
        write_file(&root.join("B.class"), b"class:b.B")?;

        let flag = Arc::new(AtomicBool::new(true));
        let mut ctx = Context::new(Arc::new(FsByteSource::new()), Arc::new(TextParser))
            .with_cancel_flag(Arc::clone(&flag));

        let report = ctx.add_root(&root, true)?;
        assert!(report.cancelled);
        assert_eq!(report.classes, 0);

        let _ = std::fs::remove_dir_all(root);
        Ok(())
    }
}
