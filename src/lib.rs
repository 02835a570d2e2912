//! # class-context
//!
//! The filesystem and archive I/O layer of a Java class-file decompiler.
//! It discovers decompilable units (loose class files, directories, and
//! nested jar/zip/war/ear archives) across filesystem roots, builds a
//! uniform addressable view of them, and re-materializes processed output
//! back into an equivalent archive/directory layout. Bytecode decoding and
//! source generation are external collaborators behind the [`model`]
//! traits.
//!
//! ## Architecture
//!
//! - **scan**: suffix classification, origin-key construction, and the
//!   zip-slip security check shared by traversal and reload
//! - **error**: typed scan errors separating recoverable corruption from
//!   fatal security violations
//! - **loader**: byte-source links and the filesystem resolver used to
//!   re-fetch class bytes lazily
//! - **model**: seams for the external class parser and decompiled-source
//!   provider, plus the registry entry type
//! - **unit**: one physical origin (directory or archive) with its
//!   discovered entries and per-origin save/reload logic
//! - **context**: the unit registry, global class index, root traversal,
//!   and nested-archive scanning
//! - **sink**: the save-side interface the context drives
//! - **saver**: disk implementation streaming output folders and archives,
//!   with per-archive duplicate-entry guarding

pub mod context;
pub mod error;
pub mod loader;
pub mod model;
pub mod saver;
pub mod scan;
pub mod sink;
pub mod unit;
