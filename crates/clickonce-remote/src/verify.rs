//! Download-and-verify engine.
//!
//! Payload files of a deployment are usually published as `<name>.deploy` so
//! that web servers never hand out executables directly. Deployments built
//! without extension mapping store them under their plain name instead; the
//! engine finds out which convention a server uses from the first 404 and
//! reports it back through [`Downloaded::try_suffix`].

use crate::{Fetched, RemoteError, RemoteFile, Transport};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clickonce_manifest::{extension, is_manifest};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

/// Suffix appended to payload files by publishers using extension mapping.
pub const DEPLOY_SUFFIX: &str = ".deploy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Accepts the lowercase names produced by
    /// [`algorithm_name`](crate::algorithm_name).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Digest method URI as written by manifest publishers.
    pub fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2000/09/xmldsig#sha256",
        }
    }

    /// Standard, padded base64 of the digest of `data`.
    pub fn digest_base64(self, data: &[u8]) -> String {
        match self {
            Self::Sha1 => STANDARD.encode(Sha1::digest(data)),
            Self::Sha256 => STANDARD.encode(Sha256::digest(data)),
        }
    }
}

/// Verified content of a remote file.
#[derive(Debug)]
pub struct Downloaded {
    pub content: Vec<u8>,
    /// Whether later downloads should still try the `.deploy` suffix first.
    /// Turns `false` once a plain-name fallback has succeeded.
    pub try_suffix: bool,
}

/// Download `file` and check its size and digest.
///
/// With `try_suffix`, non-manifest files are first requested with
/// [`DEPLOY_SUFFIX`]. A 404 is retried once with the last extension of the
/// requested URL removed; a second 404 is `NotFound`.
pub fn download_and_verify(
    transport: &dyn Transport,
    file: &RemoteFile,
    try_suffix: bool,
) -> Result<Downloaded, RemoteError> {
    let name = file.file_name();

    let algorithm =
        DigestAlgorithm::from_name(&file.algorithm).ok_or_else(|| RemoteError::UnsupportedDigest {
            file: name.clone(),
            algorithm: file.algorithm.clone(),
        })?;

    let mut try_suffix = try_suffix;
    let mut download_url = file.url.to_string();
    if try_suffix && !is_manifest(&name) {
        download_url.push_str(DEPLOY_SUFFIX);
    }

    info!("downloading '{name}' from '{download_url}'");
    let mut fetched = fetch(transport, &download_url)?;

    if fetched.is_not_found() {
        let fallback = strip_extension(&download_url);
        info!("not found, trying to download '{name}' from '{fallback}'");
        fetched = fetch(transport, fallback)?;
        if fetched.is_not_found() {
            return Err(RemoteError::NotFound(format!(
                "no file available at '{fallback}'"
            )));
        }
        if try_suffix {
            info!("application files deployed without default '{DEPLOY_SUFFIX}' suffix");
        }
        try_suffix = false;
    }

    if fetched.is_error() {
        return Err(RemoteError::Http(format!(
            "HTTP {} for {}",
            fetched.status, fetched.url
        )));
    }

    verify_content(&fetched.body, file, algorithm)?;
    debug!("downloaded '{name}' ({} bytes)", fetched.body.len());

    Ok(Downloaded {
        content: fetched.body,
        try_suffix,
    })
}

/// Check `content` against the declared size, then the declared digest.
pub fn verify_content(
    content: &[u8],
    file: &RemoteFile,
    algorithm: DigestAlgorithm,
) -> Result<(), RemoteError> {
    let actual_size = content.len() as u64;
    if actual_size != file.size {
        return Err(RemoteError::SizeMismatch {
            file: file.file_name(),
            expected: file.size,
            actual: actual_size,
        });
    }

    let actual = algorithm.digest_base64(content);
    if actual != file.digest {
        return Err(RemoteError::DigestMismatch {
            file: file.file_name(),
            expected: file.digest.clone(),
            actual,
        });
    }
    Ok(())
}

/// `url` without the extension of its last path element.
pub fn strip_extension(url: &str) -> &str {
    &url[..url.len() - extension(url).len()]
}

fn fetch(transport: &dyn Transport, url: &str) -> Result<Fetched, RemoteError> {
    let parsed = Url::parse(url).map_err(|e| RemoteError::InvalidUrl {
        reference: url.to_owned(),
        reason: e.to_string(),
    })?;
    transport.fetch(&parsed)
}
