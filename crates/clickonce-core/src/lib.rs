//! Retrieval sessions for ClickOnce deployments.
//!
//! This crate ties together manifest decoding and remote verification into
//! the [`Deployment`] session: `init` fetches the root deployment manifest,
//! `get`/`get_all` walk the manifest graph depth-first and collect verified
//! file contents, and configured output directories receive a mirror of the
//! results through a [`FileSink`].

pub mod persist;
pub mod session;
pub mod subset;
pub mod traverse;

pub use persist::{output_path, persist_results, FileSink, FsSink};
pub use session::{DeployOptions, DeployedFile, Deployment, SessionState};
pub use subset::SubsetFilter;
pub use traverse::Traversal;

use clickonce_manifest::ManifestError;
use clickonce_remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("refusing to write outside the output directory: {0}")]
    UnsafePath(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Coarse classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input or session state is invalid.
    Config,
    /// A manifest could not be decoded or declares unusable values.
    Decode,
    NotFound,
    /// Unsupported digest algorithm.
    Integrity,
    SizeMismatch,
    DigestMismatch,
    Transport,
    Io,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnsafePath(_) | Self::Manifest(_) => ErrorKind::Decode,
            Self::Io(_) => ErrorKind::Io,
            Self::Remote(e) => match e {
                RemoteError::Io(_) => ErrorKind::Io,
                RemoteError::Http(_) => ErrorKind::Transport,
                RemoteError::Serialization(_) | RemoteError::Config(_) => ErrorKind::Config,
                RemoteError::NotFound(_) => ErrorKind::NotFound,
                RemoteError::InvalidUrl { .. } | RemoteError::InvalidSize { .. } => {
                    ErrorKind::Decode
                }
                RemoteError::UnsupportedDigest { .. } => ErrorKind::Integrity,
                RemoteError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
                RemoteError::DigestMismatch { .. } => ErrorKind::DigestMismatch,
            },
        }
    }
}
