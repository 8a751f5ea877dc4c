//! Remote access for ClickOnce deployments.
//!
//! This crate provides the transport seam (`Transport`, with a blocking
//! `ureq`-based `HttpTransport`), resolution of manifest entries into absolute
//! download targets (`RemoteFile`), and the download-and-verify engine that
//! applies the `.deploy` suffix fallback and checks size and digest
//! (`download_and_verify`).

pub mod config;
pub mod http;
pub mod resolve;
pub mod verify;

pub use config::HttpConfig;
pub use http::HttpTransport;
pub use resolve::{algorithm_name, join_url, RemoteFile};
pub use verify::{
    download_and_verify, strip_extension, verify_content, DigestAlgorithm, Downloaded,
    DEPLOY_SUFFIX,
};

use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("invalid URL '{reference}': {reason}")]
    InvalidUrl { reference: String, reason: String },
    #[error("invalid size '{value}' declared for '{path}'")]
    InvalidSize { path: String, value: String },
    #[error("'{algorithm}' digest algorithm not supported for '{file}'")]
    UnsupportedDigest { file: String, algorithm: String },
    #[error("size mismatch for file '{file}': expected {expected}, got {actual}")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },
    #[error("digest mismatch for file '{file}': expected {expected}, got {actual}")]
    DigestMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// A completed fetch.
///
/// Error statuses are reported here rather than as `Err`, so callers can
/// react to 404 with the suffix fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub status: u16,
    /// Final URL of the document, after redirects.
    pub url: Url,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Trait for transports able to fetch a document by URL.
pub trait Transport: Send + Sync {
    /// Fetch the full body of `url`. Only failures to talk to the remote at
    /// all are errors.
    fn fetch(&self, url: &Url) -> Result<Fetched, RemoteError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn fetch(&self, url: &Url) -> Result<Fetched, RemoteError> {
        (**self).fetch(url)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn fetch(&self, url: &Url) -> Result<Fetched, RemoteError> {
        (**self).fetch(url)
    }
}
