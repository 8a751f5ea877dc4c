//! Authoring of deployments for tests.
//!
//! [`ManifestXml`] writes manifest documents in the shape publishers produce,
//! with sizes and digests computed from the real payload bytes. [`Fixture`]
//! collects manifests and payloads under their server-relative paths so the
//! same deployment can be served from disk by [`TestServer`](crate::TestServer)
//! or from memory by [`MemoryHost`](crate::MemoryHost).

use clickonce_manifest::normalize_path;
use clickonce_remote::{DigestAlgorithm, DEPLOY_SUFFIX};
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Declared metadata of one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    pub path: String,
    pub size: String,
    pub algorithm_uri: String,
    pub digest: String,
}

impl EntrySpec {
    /// Metadata that matches `content` under `algorithm`.
    pub fn for_content(path: &str, content: &[u8], algorithm: DigestAlgorithm) -> Self {
        Self {
            path: path.to_owned(),
            size: content.len().to_string(),
            algorithm_uri: algorithm.uri().to_owned(),
            digest: algorithm.digest_base64(content),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Dependency {
        spec: EntrySpec,
        dependency_type: String,
    },
    File(EntrySpec),
}

/// Builder for a deployment or application manifest document.
#[derive(Debug, Clone, Default)]
pub struct ManifestXml {
    entries: Vec<Entry>,
}

impl ManifestXml {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install dependency on `codebase`, hashed with SHA-256.
    #[must_use]
    pub fn dependency(self, codebase: &str, content: &[u8]) -> Self {
        self.dependency_spec(
            EntrySpec::for_content(codebase, content, DigestAlgorithm::Sha256),
            "install",
        )
    }

    /// Dependency with fully caller-controlled metadata.
    #[must_use]
    pub fn dependency_spec(mut self, spec: EntrySpec, dependency_type: &str) -> Self {
        self.entries.push(Entry::Dependency {
            spec,
            dependency_type: dependency_type.to_owned(),
        });
        self
    }

    /// Informational dependency without codebase, like the framework
    /// prerequisites publishers emit.
    #[must_use]
    pub fn prerequisite(self) -> Self {
        self.dependency_spec(
            EntrySpec {
                path: String::new(),
                size: String::new(),
                algorithm_uri: String::new(),
                digest: String::new(),
            },
            "preRequisite",
        )
    }

    /// Plain file entry hashed with SHA-1.
    #[must_use]
    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.file_spec(EntrySpec::for_content(name, content, DigestAlgorithm::Sha1))
    }

    #[must_use]
    pub fn file_spec(mut self, spec: EntrySpec) -> Self {
        self.entries.push(Entry::File(spec));
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            "\n",
            r#"<asmv1:assembly xsi:schemaLocation="urn:schemas-microsoft-com:asm.v1 assembly.adaptive.xsd" manifestVersion="1.0" xmlns:asmv1="urn:schemas-microsoft-com:asm.v1" xmlns="urn:schemas-microsoft-com:asm.v2" xmlns:dsig="http://www.w3.org/2000/09/xmldsig#" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "\n",
            r#"  <assemblyIdentity name="Tool.app" version="1.0.0.0" publicKeyToken="0000000000000000" language="neutral" processorArchitecture="msil" xmlns="urn:schemas-microsoft-com:asm.v1" />"#,
            "\n",
        ));

        for entry in &self.entries {
            match entry {
                Entry::Dependency {
                    spec,
                    dependency_type,
                } => {
                    xml.push_str("  <dependency>\n");
                    let _ = writeln!(
                        xml,
                        r#"    <dependentAssembly dependencyType="{}" allowDelayedBinding="true" codebase="{}" size="{}">"#,
                        escape(dependency_type.as_str()),
                        escape(spec.path.as_str()),
                        escape(spec.size.as_str()),
                    );
                    write_hash(&mut xml, spec, "      ");
                    xml.push_str("    </dependentAssembly>\n");
                    xml.push_str("  </dependency>\n");
                }
                Entry::File(spec) => {
                    let _ = writeln!(
                        xml,
                        r#"  <file name="{}" size="{}">"#,
                        escape(spec.path.as_str()),
                        escape(spec.size.as_str()),
                    );
                    write_hash(&mut xml, spec, "    ");
                    xml.push_str("  </file>\n");
                }
            }
        }

        xml.push_str("</asmv1:assembly>\n");
        xml
    }
}

fn write_hash(xml: &mut String, spec: &EntrySpec, indent: &str) {
    let _ = writeln!(xml, "{indent}<hash>");
    let _ = writeln!(xml, "{indent}  <dsig:Transforms>");
    let _ = writeln!(
        xml,
        r#"{indent}    <dsig:Transform Algorithm="urn:schemas-microsoft-com:HashTransforms.Identity" />"#
    );
    let _ = writeln!(xml, "{indent}  </dsig:Transforms>");
    let _ = writeln!(
        xml,
        r#"{indent}  <dsig:DigestMethod Algorithm="{}" />"#,
        escape(spec.algorithm_uri.as_str())
    );
    let _ = writeln!(
        xml,
        "{indent}  <dsig:DigestValue>{}</dsig:DigestValue>",
        escape(spec.digest.as_str())
    );
    let _ = writeln!(xml, "{indent}</hash>");
}

/// Server-relative path → bytes of a published deployment.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    files: BTreeMap<String, Vec<u8>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a manifest document at `path` and return its bytes.
    pub fn manifest(&mut self, path: &str, manifest: &ManifestXml) -> Vec<u8> {
        let bytes = manifest.build().into_bytes();
        self.put(path, &bytes);
        bytes
    }

    /// Publish a payload at `path`, with the `.deploy` suffix when `suffixed`.
    pub fn payload(&mut self, path: &str, content: &[u8], suffixed: bool) {
        if suffixed {
            self.put(&format!("{path}{DEPLOY_SUFFIX}"), content);
        } else {
            self.put(path, content);
        }
    }

    /// Publish raw bytes at exactly `path`.
    pub fn put(&mut self, path: &str, content: &[u8]) {
        self.files.insert(normalize_path(path), content.to_vec());
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(&normalize_path(path))
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    /// Mirror the deployment under `root`.
    pub fn write_to(&self, root: &Path) -> std::io::Result<()> {
        for (path, content) in &self.files {
            let dest = root.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, content)?;
        }
        Ok(())
    }
}

/// Names used by [`sample`].
pub mod names {
    pub const DEPLOYMENT: &str = "Tool.application";
    pub const APP_DIR: &str = "Application Files/Tool_1_0_0_0";
    pub const APP_MANIFEST: &str = r"Application Files\Tool_1_0_0_0\Tool.exe.manifest";
    pub const EXE: &str = "Tool.exe";
    pub const LIB: &str = "Tool.Core.dll";
    pub const CONFIG: &str = "Tool.exe.config";
    pub const DATA: &str = r"Data\readme.txt";
}

pub const EXE_CONTENT: &[u8] = b"MZ\x90\x00 tool executable";
pub const LIB_CONTENT: &[u8] = b"MZ\x90\x00 core library";
pub const CONFIG_CONTENT: &[u8] = b"<configuration />";
pub const DATA_CONTENT: &[u8] = b"read me first";

/// A two-level deployment: `Tool.application` depends on
/// `Application Files\Tool_1_0_0_0\Tool.exe.manifest`, which lists an
/// executable, a library, a config file and a data file. Payloads are
/// published with the `.deploy` suffix when `suffixed`.
pub fn sample(suffixed: bool) -> Fixture {
    let mut fixture = Fixture::new();

    let app = ManifestXml::new()
        .prerequisite()
        .dependency(names::EXE, EXE_CONTENT)
        .dependency(names::LIB, LIB_CONTENT)
        .dependency(names::LIB, LIB_CONTENT)
        .file(names::CONFIG, CONFIG_CONTENT)
        .file(names::DATA, DATA_CONTENT)
        .file_spec(EntrySpec {
            path: String::new(),
            size: "0".to_owned(),
            algorithm_uri: DigestAlgorithm::Sha1.uri().to_owned(),
            digest: String::new(),
        });
    let app_bytes = fixture.manifest(names::APP_MANIFEST, &app);

    let deployment = ManifestXml::new()
        .prerequisite()
        .dependency(names::APP_MANIFEST, &app_bytes);
    fixture.manifest(names::DEPLOYMENT, &deployment);

    for (name, content) in [
        (names::EXE, EXE_CONTENT),
        (names::LIB, LIB_CONTENT),
        (names::CONFIG, CONFIG_CONTENT),
        (names::DATA, DATA_CONTENT),
    ] {
        fixture.payload(
            &format!("{}/{}", names::APP_DIR, normalize_path(name)),
            content,
            suffixed,
        );
    }
    fixture
}
