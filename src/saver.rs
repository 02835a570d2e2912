//! Streaming multi-archive writer for processed output.
//!
//! `DiskSink` materializes save results under one destination root: folder
//! units as mirrored directory trees, archive units as zip/jar streams.
//! Open archives are registered by absolute destination path together with
//! the set of entry names already written to them, so a duplicate entry is
//! skipped with a warning instead of corrupting the stream, and every
//! stream is finalized exactly once. Entry writes into one archive are
//! serialized on that archive's own lock; distinct archives can be written
//! concurrently.

use anyhow::{Context as _, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::loader::read_archive_entry;
use crate::sink::ResultSink;

pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

struct OpenArchive {
    writer: ZipWriter<BufWriter<File>>,
    written: HashSet<String>,
}

impl OpenArchive {
    /// Claims an entry name, warning and refusing on a duplicate. The
    /// written-name set lives and dies with the stream, so no bookkeeping
    /// leaks across distinct `open_archive` calls.
    fn claim(&mut self, file: &Path, entry_name: &str) -> bool {
        if !self.written.insert(entry_name.to_string()) {
            warn!(
                archive = %file.display(),
                entry = entry_name,
                "zip entry already exists, skipping"
            );
            return false;
        }
        true
    }
}

/// [`ResultSink`] implementation writing under a destination root directory.
pub struct DiskSink {
    root: PathBuf,
    archives: Mutex<HashMap<PathBuf, Arc<Mutex<OpenArchive>>>>,
}

impl DiskSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archives: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Origin-key prefixes may carry a leading `/` (top-level archive
    /// units); they address the destination root, not the filesystem root.
    fn absolute(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches(['/', '\\']);
        if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        }
    }

    fn archive_handle(&self, file: &Path) -> Option<Arc<Mutex<OpenArchive>>> {
        self.archives
            .lock()
            .expect("archive registry lock poisoned")
            .get(file)
            .cloned()
    }

    fn open_archive_handle(&self, file: &Path) -> Result<Arc<Mutex<OpenArchive>>> {
        self.archive_handle(file)
            .with_context(|| format!("Archive is not open: {}", file.display()))
    }
}

impl ResultSink for DiskSink {
    fn ensure_folder(&self, path: &str) -> Result<()> {
        let dir = self.absolute(path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create directory: {}", dir.display()))
    }

    fn copy_plain_file(&self, source: &Path, path: &str, entry_name: &str) -> Result<()> {
        let target = self.absolute(path).join(entry_name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory: {}", parent.display()))?;
        }
        std::fs::copy(source, &target).with_context(|| {
            format!("Cannot copy {} to {}", source.display(), target.display())
        })?;
        Ok(())
    }

    fn write_class_source(
        &self,
        path: &str,
        qualified_name: &str,
        entry_name: &str,
        content: &str,
        _source_map: Option<&[u32]>,
    ) -> Result<()> {
        let target = self.absolute(path).join(entry_name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory: {}", parent.display()))?;
        }
        std::fs::write(&target, content).with_context(|| {
            format!("Cannot write class {qualified_name} to {}", target.display())
        })?;
        Ok(())
    }

    fn open_archive(&self, path: &str, archive_name: &str, manifest: Option<&[u8]>) -> Result<()> {
        let dir = self.absolute(path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create directory: {}", dir.display()))?;

        let file = dir.join(archive_name);

        // Truncating a path whose stream is still open would let the stale
        // writer corrupt the new file on drop; finalize it first.
        let stale = self
            .archives
            .lock()
            .expect("archive registry lock poisoned")
            .remove(&file);
        if let Some(stale) = stale {
            warn!(archive = %file.display(), "archive reopened before close, finalizing stale stream");
            let mut archive = stale.lock().expect("archive stream lock poisoned");
            let _ = archive.writer.finish();
        }

        let out = File::create(&file)
            .with_context(|| format!("Cannot create archive: {}", file.display()))?;
        let mut archive = OpenArchive {
            writer: ZipWriter::new(BufWriter::new(out)),
            written: HashSet::new(),
        };

        if let Some(manifest) = manifest {
            // JarOutputStream-compatible layout: the manifest leads the archive.
            archive.claim(&file, MANIFEST_ENTRY);
            archive
                .writer
                .start_file(MANIFEST_ENTRY, FileOptions::default())
                .with_context(|| format!("Cannot write manifest to {}", file.display()))?;
            archive.writer.write_all(manifest)?;
        }

        self.archives
            .lock()
            .expect("archive registry lock poisoned")
            .insert(file, Arc::new(Mutex::new(archive)));
        Ok(())
    }

    fn write_dir_marker(&self, path: &str, archive_name: &str, entry_name: &str) -> Result<()> {
        self.write_entry(path, archive_name, entry_name, None)
    }

    fn copy_entry(
        &self,
        source_archive: &Path,
        path: &str,
        archive_name: &str,
        entry_name: &str,
    ) -> Result<()> {
        let file = self.absolute(path).join(archive_name);
        let handle = self.open_archive_handle(&file)?;
        let mut archive = handle.lock().expect("archive stream lock poisoned");

        if !archive.claim(&file, entry_name) {
            return Ok(());
        }

        let bytes = read_archive_entry(source_archive, entry_name).with_context(|| {
            format!(
                "Cannot copy entry {entry_name} from {} to {}",
                source_archive.display(),
                file.display()
            )
        })?;
        archive.writer.start_file(entry_name, FileOptions::default())?;
        archive.writer.write_all(&bytes)?;
        Ok(())
    }

    fn write_entry(
        &self,
        path: &str,
        archive_name: &str,
        entry_name: &str,
        content: Option<&[u8]>,
    ) -> Result<()> {
        let file = self.absolute(path).join(archive_name);
        let handle = self.open_archive_handle(&file)?;
        let mut archive = handle.lock().expect("archive stream lock poisoned");

        if !archive.claim(&file, entry_name) {
            return Ok(());
        }

        if content.is_none() && entry_name.ends_with('/') {
            archive
                .writer
                .add_directory(entry_name.trim_end_matches('/'), FileOptions::default())
                .with_context(|| {
                    format!("Cannot write entry {entry_name} to {}", file.display())
                })?;
            return Ok(());
        }

        archive
            .writer
            .start_file(entry_name, FileOptions::default())
            .with_context(|| format!("Cannot write entry {entry_name} to {}", file.display()))?;
        if let Some(bytes) = content {
            archive.writer.write_all(bytes)?;
        }
        Ok(())
    }

    fn close_archive(&self, path: &str, archive_name: &str) -> Result<()> {
        let file = self.absolute(path).join(archive_name);
        let handle = self
            .archives
            .lock()
            .expect("archive registry lock poisoned")
            .remove(&file);

        let Some(handle) = handle else {
            // already closed or never opened
            return Ok(());
        };

        let mut archive = handle.lock().expect("archive stream lock poisoned");
        let mut out = archive
            .writer
            .finish()
            .with_context(|| format!("Cannot finalize archive: {}", file.display()))?;
        out.flush()
            .with_context(|| format!("Cannot flush archive: {}", file.display()))?;
        Ok(())
    }
}

impl Drop for DiskSink {
    fn drop(&mut self) {
        // Finalize anything a cancelled or failed save left open so file
        // handles do not leak and the archives stay structurally readable.
        let mut archives = self.archives.lock().expect("archive registry lock poisoned");
        for (file, handle) in archives.drain() {
            let mut archive = handle.lock().expect("archive stream lock poisoned");
            if let Err(err) = archive.writer.finish() {
                warn!(archive = %file.display(), error = %err, "failed to finalize leftover archive");
            }
        }
    }
}
