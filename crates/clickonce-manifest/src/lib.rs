//! ClickOnce manifest decoding and the entry model shared by the retrieval crates.
//!
//! This crate defines the schema layer: a lenient, charset-aware decoder for
//! deployment and application manifests (`decode_manifest`), the typed
//! dependency/file graph it produces (`Manifest`), and the path conventions
//! used to name deployed files (`normalize_path`, `file_name`, `is_manifest`).

pub mod decode;
pub mod manifest;
pub mod path;

pub use decode::decode_manifest;
pub use manifest::{
    DependentAssembly, EntryInfo, FileEntry, FileKind, Hash, Manifest, ManifestEntry,
    INSTALL_DEPENDENCY,
};
pub use path::{extension, file_name, is_manifest, normalize_path, MANIFEST_EXTENSION};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest document is empty")]
    Empty,
    #[error("malformed manifest markup: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("manifest has no root element")]
    NoRootElement,
    #[error("manifest ends before element '{0}' is closed")]
    UnexpectedEof(String),
}
