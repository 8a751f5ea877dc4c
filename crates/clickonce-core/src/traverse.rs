use crate::session::{DeployedFile, SessionState};
use crate::CoreError;
use clickonce_manifest::{
    decode_manifest, file_name, is_manifest, normalize_path, FileKind, Manifest, ManifestEntry,
};
use clickonce_remote::{download_and_verify, RemoteFile, Transport};
use tracing::debug;

/// Depth-first walk over a manifest graph.
///
/// Install dependencies are visited before files, each list in declaration
/// order, and a downloaded manifest is walked completely before its next
/// sibling. The first error aborts the walk; results collected until then
/// stay in the session.
pub struct Traversal<'a> {
    transport: &'a dyn Transport,
    state: &'a mut SessionState,
}

impl<'a> Traversal<'a> {
    pub fn new(transport: &'a dyn Transport, state: &'a mut SessionState) -> Self {
        Self { transport, state }
    }

    pub fn retrieve_all(&mut self, manifest: &Manifest) -> Result<(), CoreError> {
        for dependency in manifest.dependencies.iter().filter(|d| !d.is_install()) {
            debug!(
                "skipping '{}' dependency '{}'",
                dependency.dependency_type, dependency.codebase
            );
        }
        for entry in manifest.entries() {
            self.retrieve(&entry)?;
        }
        Ok(())
    }

    fn retrieve(&mut self, entry: &ManifestEntry<'_>) -> Result<(), CoreError> {
        if entry.path.is_empty() {
            debug!("skipping entry without path");
            return Ok(());
        }

        let normalized = normalize_path(entry.path);
        let name = file_name(&normalized);
        let manifest = is_manifest(name);

        if !manifest {
            if let Some(subset) = &self.state.subset {
                if !subset.contains(name) {
                    debug!("skipping '{}': not in requested subset", entry.path);
                    return Ok(());
                }
            }
        }

        if self.state.deployed.contains_key(entry.path) {
            debug!("skipping '{}': already retrieved", entry.path);
            return Ok(());
        }

        let base = self
            .state
            .base_url
            .as_ref()
            .ok_or_else(|| CoreError::Config("not initialized".to_owned()))?;
        let file = RemoteFile::resolve(base, entry)?;

        if manifest && entry.kind == FileKind::AssemblyDependency {
            debug!("following dependent manifest at '{}'", file.url);
            self.state.base_url = Some(file.url.clone());
        }

        let downloaded = download_and_verify(self.transport, &file, !self.state.no_suffix)?;
        self.state.no_suffix = !downloaded.try_suffix;

        self.state.deployed.insert(
            entry.path.to_owned(),
            DeployedFile {
                kind: entry.kind,
                content: downloaded.content,
            },
        );
        if let Some(subset) = &mut self.state.subset {
            subset.mark_found(name);
        }

        if manifest {
            let nested = decode_manifest(&self.state.deployed[entry.path].content)?;
            self.retrieve_all(&nested)?;
        }
        Ok(())
    }
}
