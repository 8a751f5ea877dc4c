use crate::session::DeployedFile;
use crate::subset::SubsetFilter;
use crate::CoreError;
use clickonce_manifest::{file_name, normalize_path};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Destination for retrieved files.
pub trait FileSink {
    /// Write `content` to `path`, creating missing parent directories.
    fn write_file(&self, path: &Path, content: &[u8]) -> std::io::Result<()>;
}

/// Filesystem sink. Each file is written to a temporary file next to its
/// destination and renamed into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl FileSink for FsSink {
    fn write_file(&self, path: &Path, content: &[u8]) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Destination of a manifest-relative `path` below `output_dir`.
///
/// Absolute paths and `..` segments are refused with `UnsafePath`.
pub fn output_path(output_dir: &Path, path: &str) -> Result<PathBuf, CoreError> {
    let normalized = normalize_path(path);
    if normalized.starts_with('/') {
        return Err(CoreError::UnsafePath(path.to_owned()));
    }

    let mut dest = output_dir.to_path_buf();
    let mut pushed = false;
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(CoreError::UnsafePath(path.to_owned())),
            s if s.contains(':') => return Err(CoreError::UnsafePath(path.to_owned())),
            s => {
                dest.push(s);
                pushed = true;
            }
        }
    }
    if !pushed {
        return Err(CoreError::UnsafePath(path.to_owned()));
    }
    Ok(dest)
}

/// Write the results selected by `subset` below `output_dir`.
///
/// Without a filter every result is written; with one, only results whose
/// bare file name is in it. Returns the number of files written.
pub fn persist_results(
    sink: &dyn FileSink,
    output_dir: &Path,
    deployed: &BTreeMap<String, DeployedFile>,
    subset: Option<&SubsetFilter>,
) -> Result<usize, CoreError> {
    let mut written = 0;
    for (path, file) in deployed {
        let normalized = normalize_path(path);
        let name = file_name(&normalized);
        if subset.is_some_and(|filter| !filter.contains(name)) {
            debug!("not saving '{path}': outside requested subset");
            continue;
        }

        let dest = output_path(output_dir, path)?;
        sink.write_file(&dest, &file.content)?;
        info!("saved '{}' ({} bytes)", dest.display(), file.content.len());
        written += 1;
    }
    Ok(written)
}
