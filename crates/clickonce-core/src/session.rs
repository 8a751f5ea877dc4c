use crate::persist::{persist_results, FileSink, FsSink};
use crate::subset::SubsetFilter;
use crate::traverse::Traversal;
use crate::CoreError;
use clickonce_manifest::{decode_manifest, file_name, normalize_path, FileKind, Manifest};
use clickonce_remote::{HttpConfig, HttpTransport, RemoteError, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// A retrieved and verified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedFile {
    pub kind: FileKind,
    pub content: Vec<u8>,
}

/// Mutable state shared by every traversal of a session.
#[derive(Debug, Default)]
pub struct SessionState {
    /// URL relative entry paths are resolved against. Moves to a dependent
    /// manifest's location when one is followed and stays there.
    pub base_url: Option<Url>,
    /// Results keyed by entry path as written in its manifest.
    pub deployed: BTreeMap<String, DeployedFile>,
    pub subset: Option<SubsetFilter>,
    /// Set once a download only succeeded without the `.deploy` suffix.
    pub no_suffix: bool,
    /// Set once a full retrieval has completed; later requests are served
    /// from `deployed`.
    pub offline: bool,
}

impl SessionState {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: Some(base_url),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOptions {
    /// Directory results are mirrored into. Nothing is written when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl DeployOptions {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid deploy options: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("serializing deploy options: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Retrieval session for one deployment.
///
/// Call [`init`](Self::init) with the deployment manifest URL, then
/// [`get`](Self::get) or [`get_all`](Self::get_all).
pub struct Deployment {
    transport: Box<dyn Transport>,
    sink: Box<dyn FileSink>,
    options: DeployOptions,
    root: Option<Manifest>,
    state: SessionState,
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new(HttpTransport::default())
    }
}

impl Deployment {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            sink: Box::new(FsSink),
            options: DeployOptions::default(),
            root: None,
            state: SessionState::default(),
        }
    }

    /// Session over HTTP with the given transport settings.
    pub fn http(config: HttpConfig) -> Self {
        Self::new(HttpTransport::new(config))
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl FileSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.set_output_dir(dir);
        self
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.options.output_dir = Some(dir.into());
    }

    pub fn is_offline(&self) -> bool {
        self.state.offline
    }

    /// Current resolution base, `None` before `init`.
    pub fn base_url(&self) -> Option<&Url> {
        self.state.base_url.as_ref()
    }

    pub fn deployed_files(&self) -> &BTreeMap<String, DeployedFile> {
        &self.state.deployed
    }

    /// Fetch and decode the deployment manifest at `url`.
    ///
    /// Any previous session state is discarded.
    pub fn init(&mut self, url: &str) -> Result<(), CoreError> {
        if url.is_empty() {
            return Err(CoreError::Config("empty deployment manifest URL".to_owned()));
        }
        let parsed = Url::parse(url)
            .map_err(|e| CoreError::Config(format!("invalid deployment manifest URL '{url}': {e}")))?;

        info!("fetching deployment manifest '{parsed}'");
        let fetched = self.transport.fetch(&parsed)?;
        if fetched.is_not_found() {
            return Err(CoreError::NotFound(format!(
                "no deployment manifest at '{url}'"
            )));
        }
        if fetched.is_error() {
            return Err(RemoteError::Http(format!("HTTP {} for {url}", fetched.status)).into());
        }

        let manifest = decode_manifest(&fetched.body)?;
        debug!(
            "deployment manifest lists {} dependencies and {} files",
            manifest.dependencies.len(),
            manifest.files.len()
        );
        self.root = Some(manifest);
        self.state = SessionState::new(fetched.url);
        Ok(())
    }

    /// Retrieve the files named in `subset`, or every file when it is empty.
    ///
    /// Dependent manifests are always followed. Results are written to the
    /// output directory when one is configured, also when the retrieval
    /// fails part way. Requested names that were not found are reported as
    /// `NotFound` after writing.
    pub fn get<S: AsRef<str>>(&mut self, subset: &[S]) -> Result<(), CoreError> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| CoreError::Config("not initialized".to_owned()))?;
        self.state.subset = SubsetFilter::from_names(subset)?;

        let retrieved = if self.state.offline {
            debug!("offline: selecting from {} results", self.state.deployed.len());
            if let Some(filter) = self.state.subset.as_mut() {
                for path in self.state.deployed.keys() {
                    filter.mark_found(file_name(&normalize_path(path)));
                }
            }
            Ok(())
        } else {
            Traversal::new(self.transport.as_ref(), &mut self.state).retrieve_all(root)
        };

        if let Err(e) = retrieved {
            if let Err(save_err) = self.save() {
                warn!("saving partial results failed: {save_err}");
            }
            return Err(e);
        }

        if let Some(filter) = &self.state.subset {
            if filter.found_count() == 0 {
                return Err(CoreError::NotFound(format!(
                    "none of the requested files found: {}",
                    filter.missing().join(", ")
                )));
            }
        }

        self.save()?;

        if let Some(filter) = &self.state.subset {
            let missing = filter.missing();
            if !missing.is_empty() {
                warn!("requested files not found: {}", missing.join(", "));
                return Err(CoreError::NotFound(format!(
                    "requested files not found: {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Retrieve every file, then serve later requests from memory.
    pub fn get_all(&mut self) -> Result<(), CoreError> {
        self.get::<&str>(&[])?;
        self.state.offline = true;
        Ok(())
    }

    fn save(&self) -> Result<(), CoreError> {
        let Some(dir) = &self.options.output_dir else {
            return Ok(());
        };
        let written = persist_results(
            self.sink.as_ref(),
            dir,
            &self.state.deployed,
            self.state.subset.as_ref(),
        )?;
        info!("saved {written} files to {}", dir.display());
        Ok(())
    }
}
