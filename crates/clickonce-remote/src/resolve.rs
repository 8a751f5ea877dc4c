use crate::RemoteError;
use clickonce_manifest::{normalize_path, EntryInfo, ManifestEntry};
use percent_encoding::percent_decode_str;
use url::Url;

/// A manifest entry resolved to something that can be downloaded and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: Url,
    pub size: u64,
    /// Lowercase algorithm name taken from the digest method URI fragment.
    /// Validated only when the file is downloaded.
    pub algorithm: String,
    /// Expected base64 digest.
    pub digest: String,
}

impl RemoteFile {
    /// Resolve `entry` against the current base URL.
    pub fn resolve(base: &Url, entry: &ManifestEntry<'_>) -> Result<Self, RemoteError> {
        let url = join_url(base, entry.path)?;
        Self::from_info(url, entry.path, entry.info)
    }

    pub fn from_info(url: Url, path: &str, info: &EntryInfo) -> Result<Self, RemoteError> {
        let size = info
            .size
            .parse::<u64>()
            .map_err(|_| RemoteError::InvalidSize {
                path: path.to_owned(),
                value: info.size.clone(),
            })?;

        Ok(Self {
            url,
            size,
            algorithm: algorithm_name(&info.hash.algorithm),
            digest: info.hash.digest.clone(),
        })
    }

    /// Decoded last path segment of the URL, used for messages and
    /// manifest detection.
    pub fn file_name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Join a manifest-relative path onto `base`, accepting `\` separators.
pub fn join_url(base: &Url, path: &str) -> Result<Url, RemoteError> {
    let posix = normalize_path(path);
    base.join(&posix).map_err(|e| RemoteError::InvalidUrl {
        reference: posix,
        reason: e.to_string(),
    })
}

/// Lowercase fragment of an XML-DSig digest method URI:
/// `http://www.w3.org/2000/09/xmldsig#SHA256` gives `sha256`.
/// A URI without fragment gives an empty name.
pub fn algorithm_name(uri: &str) -> String {
    uri.split_once('#')
        .map(|(_, fragment)| fragment.to_lowercase())
        .unwrap_or_default()
}
