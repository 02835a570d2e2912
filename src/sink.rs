use anyhow::Result;
use std::path::Path;

/// Save-side sink the context drives when persisting own units.
///
/// `path` arguments are destination-root-relative origin-key prefixes
/// (`/`-separated, possibly empty for the destination root itself);
/// `archive_name` addresses an archive previously opened under that
/// prefix. Implementations must tolerate duplicate entry names per
/// archive (skip, never corrupt the stream) and idempotent closes.
pub trait ResultSink {
    /// Creates the destination directory tree if absent; idempotent.
    fn ensure_folder(&self, path: &str) -> Result<()>;

    /// Verbatim byte copy of a plain file into a folder destination.
    fn copy_plain_file(&self, source: &Path, path: &str, entry_name: &str) -> Result<()>;

    /// Writes decompiled source text into a folder destination. The
    /// source-map hint carries line mapping information when the caller
    /// tracks it; sinks may ignore it.
    fn write_class_source(
        &self,
        path: &str,
        qualified_name: &str,
        entry_name: &str,
        content: &str,
        source_map: Option<&[u32]>,
    ) -> Result<()>;

    /// Creates (or truncates) a destination archive and opens a sequential
    /// writer stream over it. A supplied manifest selects a jar-compatible
    /// layout with the manifest as leading entry.
    fn open_archive(&self, path: &str, archive_name: &str, manifest: Option<&[u8]>) -> Result<()>;

    /// Records an empty-directory marker in an open archive.
    fn write_dir_marker(&self, path: &str, archive_name: &str, entry_name: &str) -> Result<()>;

    /// Streams the named entry out of `source_archive` into an open
    /// destination archive under the same entry name.
    fn copy_entry(
        &self,
        source_archive: &Path,
        path: &str,
        archive_name: &str,
        entry_name: &str,
    ) -> Result<()>;

    /// Writes one entry into an open archive. `None` content marks a
    /// directory-style entry (a name with a trailing `/`) or an empty one.
    fn write_entry(
        &self,
        path: &str,
        archive_name: &str,
        entry_name: &str,
        content: Option<&[u8]>,
    ) -> Result<()>;

    /// Flushes and closes an open archive stream. Idempotent: closing an
    /// already-closed or never-opened archive is a no-op.
    fn close_archive(&self, path: &str, archive_name: &str) -> Result<()>;
}
