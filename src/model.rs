use anyhow::Result;

/// Minimum structural surface of the opaque class-parse step: whatever the
/// decoder builds internally, it must at least recover the fully-qualified
/// name from the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClass {
    pub qualified_name: String,
}

/// Decodes raw class bytes into a structural model. The decoding itself is
/// outside this crate; a decode failure on malformed input is reported as
/// an error and the offending file is skipped by the traversal.
pub trait ClassParser: Send + Sync {
    fn parse(&self, bytes: &[u8], is_own: bool) -> Result<ParsedClass>;
}

/// Produces decompiled output for a class at save time.
///
/// Returning `None` from [`entry_name`](SourceProvider::entry_name) drops
/// the class from the saved output entirely (the usual answer for library
/// classes kept only for symbol resolution).
pub trait SourceProvider {
    fn entry_name(&self, class: &ClassEntry, original_entry: &str) -> Option<String>;
    fn content(&self, class: &ClassEntry) -> Option<String>;
}

/// Registry record for one discovered class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub qualified_name: String,
    pub is_own: bool,
    /// Origin key of the unit the class was discovered in.
    pub unit_key: String,
    /// Entry name within the unit: file name for folder units, archive
    /// entry name for archive units.
    pub entry_name: String,
}
