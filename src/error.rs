use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while scanning roots and archives.
///
/// The traversal driver decides skip-vs-abort from the variant alone:
/// [`ScanError::is_fatal`] variants abort the enclosing archive scan,
/// everything else is logged and the offending file is skipped.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("corrupted archive file {}: {source}", .path.display())]
    CorruptedArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("corrupted class file {}: {source}", .path.display())]
    CorruptedClass {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unreadable entry {entry} in {}: {source}", .archive.display())]
    UnreadableEntry {
        archive: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    /// Hostile or corrupted input by construction; never skipped.
    #[error("zip entry '{entry}' tries to escape {}", .archive.display())]
    ZipSlip { archive: PathBuf, entry: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::ZipSlip { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zip_slip_is_fatal() {
        let slip = ScanError::ZipSlip {
            archive: PathBuf::from("demo.jar"),
            entry: "../../evil.class".to_string(),
        };
        assert!(slip.is_fatal());
        assert!(slip.to_string().contains("../../evil.class"));

        let io = ScanError::Io(std::io::Error::other("boom"));
        assert!(!io.is_fatal());
    }
}
