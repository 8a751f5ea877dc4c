/// Dependency type tag of dependent assemblies that must be downloaded.
/// Anything else (`preRequisite`, ...) is informational and never fetched.
pub const INSTALL_DEPENDENCY: &str = "install";

/// Role of a deployed file within the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A dependency required for the application (`dependentAssembly`).
    AssemblyDependency,
    /// A file used by the application (`file`).
    NonAssemblyFile,
}

/// Digest descriptor of an entry, as written in the manifest.
///
/// `algorithm` is the raw `DigestMethod/@Algorithm` URI and `digest` the
/// base64 `DigestValue`. Neither is validated at decode time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hash {
    pub algorithm: String,
    pub digest: String,
}

/// Fields shared by `file` and `dependentAssembly` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryInfo {
    /// Declared byte size, still string-encoded.
    pub size: String,
    pub hash: Hash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub info: EntryInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentAssembly {
    pub codebase: String,
    pub dependency_type: String,
    pub allow_delayed_binding: String,
    pub info: EntryInfo,
}

/// A parsed deployment or application manifest.
///
/// Both lists keep declaration order, which is also the traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub files: Vec<FileEntry>,
    pub dependencies: Vec<DependentAssembly>,
}

/// Borrowed view over either entry kind, tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry<'a> {
    /// Manifest-relative path (`name` or `codebase`), exactly as declared.
    pub path: &'a str,
    pub info: &'a EntryInfo,
    pub kind: FileKind,
}

impl FileEntry {
    pub fn entry(&self) -> ManifestEntry<'_> {
        ManifestEntry {
            path: &self.name,
            info: &self.info,
            kind: FileKind::NonAssemblyFile,
        }
    }
}

impl DependentAssembly {
    pub fn is_install(&self) -> bool {
        self.dependency_type == INSTALL_DEPENDENCY
    }

    pub fn entry(&self) -> ManifestEntry<'_> {
        ManifestEntry {
            path: &self.codebase,
            info: &self.info,
            kind: FileKind::AssemblyDependency,
        }
    }
}

impl Manifest {
    /// Entries in traversal order: install dependencies first, then files.
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry<'_>> {
        self.dependencies
            .iter()
            .filter(|d| d.is_install())
            .map(DependentAssembly::entry)
            .chain(self.files.iter().map(FileEntry::entry))
    }
}
