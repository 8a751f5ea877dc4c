//! Lenient, charset-aware manifest decoding.
//!
//! Real-world manifests are produced by several generations of publishing
//! tools, so the decoder matches elements by local name (namespace prefixes
//! are dropped), ignores anything it does not know, tolerates mismatched end
//! tags, and honours the `encoding` label of the XML declaration.

use crate::manifest::{DependentAssembly, EntryInfo, FileEntry, Manifest};
use crate::ManifestError;
use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use tracing::debug;

/// Only this many leading bytes are searched for an XML declaration.
const DECLARATION_SCAN_LIMIT: usize = 1024;

/// Decode a deployment or application manifest.
pub fn decode_manifest(data: &[u8]) -> Result<Manifest, ManifestError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ManifestError::Empty);
    }
    let text = decode_text(data);
    parse(&text)
}

/// Transcode the raw document to UTF-8.
///
/// A byte-order mark wins over the declared label; an unknown or missing
/// label means UTF-8.
fn decode_text(data: &[u8]) -> Cow<'_, str> {
    let declared = declared_encoding(data).unwrap_or(UTF_8);
    let (text, used, had_errors) = declared.decode(data);
    if had_errors {
        debug!(
            "manifest contains invalid {} sequences, replaced",
            used.name()
        );
    }
    text
}

fn declared_encoding(data: &[u8]) -> Option<&'static Encoding> {
    let head = &data[..data.len().min(DECLARATION_SCAN_LIMIT)];
    let start = find(head, b"<?xml")?;
    let rest = &head[start..];
    let decl = &rest[..find(rest, b"?>")?];
    let attr = find(decl, b"encoding")?;
    let value = skip_whitespace(&decl[attr + b"encoding".len()..]);
    let value = skip_whitespace(value.strip_prefix(b"=")?);
    let (&quote, value) = value.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = value.iter().position(|&b| b == quote)?;
    let label = &value[..end];
    let encoding = Encoding::for_label(label);
    if encoding.is_none() {
        debug!(
            "unknown manifest encoding '{}', assuming UTF-8",
            String::from_utf8_lossy(label)
        );
    }
    encoding
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn parse(text: &str) -> Result<Manifest, ManifestError> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut collector = Collector::default();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                seen_root = true;
                collector.start(&e);
            }
            Event::Empty(e) => {
                seen_root = true;
                collector.start(&e);
                collector.pop();
                if collector.open.is_empty() {
                    break;
                }
            }
            Event::End(e) => {
                collector.end(&local_name(e.local_name().as_ref()));
                if seen_root && collector.open.is_empty() {
                    break;
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned().into());
                collector.text(&text);
            }
            Event::CData(c) => collector.text(&String::from_utf8_lossy(&c)),
            Event::Eof => {
                return Err(match collector.open.pop() {
                    Some(name) => ManifestError::UnexpectedEof(name),
                    None => ManifestError::NoRootElement,
                });
            }
            _ => {}
        }
    }

    let manifest = collector.manifest;
    debug!(
        "decoded manifest: {} dependencies, {} files",
        manifest.dependencies.len(),
        manifest.files.len()
    );
    Ok(manifest)
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Attributes of a start tag as `(local name, value)` pairs.
///
/// Unquoted values are accepted; parsing stops at the first attribute that
/// cannot be read at all.
fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.html_attributes()
        .map_while(Result::ok)
        .map(|attr| {
            let key = local_name(attr.key.local_name().as_ref());
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

enum PendingEntry {
    File(FileEntry),
    Dependency(DependentAssembly),
}

/// An entry whose element is still open, with the stack depth it was opened at.
struct Pending {
    depth: usize,
    entry: PendingEntry,
}

impl Pending {
    fn info_mut(&mut self) -> &mut EntryInfo {
        match &mut self.entry {
            PendingEntry::File(f) => &mut f.info,
            PendingEntry::Dependency(d) => &mut d.info,
        }
    }
}

#[derive(Default)]
struct Collector {
    manifest: Manifest,
    /// Local names of the open elements, root first.
    open: Vec<String>,
    pending: Option<Pending>,
}

impl Collector {
    fn start(&mut self, e: &BytesStart<'_>) {
        let name = local_name(e.local_name().as_ref());
        let depth = self.open.len();

        if self.pending.is_none() {
            if depth == 1 && name == "file" {
                let mut file = FileEntry::default();
                for (key, value) in attributes(e) {
                    match key.as_str() {
                        "name" => file.name = value,
                        "size" => file.info.size = value,
                        _ => {}
                    }
                }
                self.pending = Some(Pending {
                    depth,
                    entry: PendingEntry::File(file),
                });
            } else if depth == 2 && name == "dependentAssembly" && self.open[1] == "dependency" {
                let mut dep = DependentAssembly::default();
                for (key, value) in attributes(e) {
                    match key.as_str() {
                        "codebase" => dep.codebase = value,
                        "size" => dep.info.size = value,
                        "dependencyType" => dep.dependency_type = value,
                        "allowDelayedBinding" => dep.allow_delayed_binding = value,
                        _ => {}
                    }
                }
                self.pending = Some(Pending {
                    depth,
                    entry: PendingEntry::Dependency(dep),
                });
            }
        } else if let Some(pending) = &mut self.pending {
            if name == "DigestMethod"
                && depth == pending.depth + 2
                && self.open[pending.depth + 1] == "hash"
            {
                for (key, value) in attributes(e) {
                    if key == "Algorithm" {
                        pending.info_mut().hash.algorithm = value;
                    }
                }
            }
        }

        self.open.push(name);
    }

    fn text(&mut self, text: &str) {
        let depth = self.open.len();
        if let Some(pending) = &mut self.pending {
            if depth == pending.depth + 3
                && self.open[pending.depth + 1] == "hash"
                && self.open[pending.depth + 2] == "DigestValue"
            {
                pending.info_mut().hash.digest.push_str(text.trim());
            }
        }
    }

    /// Close `name` and every element opened inside it. End tags that match
    /// no open element are ignored.
    fn end(&mut self, name: &str) {
        if let Some(pos) = self.open.iter().rposition(|n| n == name) {
            while self.open.len() > pos {
                self.pop();
            }
        }
    }

    fn pop(&mut self) {
        self.open.pop();
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.depth == self.open.len())
        {
            if let Some(pending) = self.pending.take() {
                match pending.entry {
                    PendingEntry::File(f) => self.manifest.files.push(f),
                    PendingEntry::Dependency(d) => self.manifest.dependencies.push(d),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileKind;

    const DEPLOYMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<asmv1:assembly xsi:schemaLocation="urn:schemas-microsoft-com:asm.v1 assembly.adaptive.xsd" manifestVersion="1.0" xmlns:asmv1="urn:schemas-microsoft-com:asm.v1" xmlns="urn:schemas-microsoft-com:asm.v2" xmlns:dsig="http://www.w3.org/2000/09/xmldsig#" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <assemblyIdentity name="Tool.application" version="1.0.0.0" publicKeyToken="0000000000000000" language="neutral" processorArchitecture="msil" xmlns="urn:schemas-microsoft-com:asm.v1" />
  <description asmv2:publisher="Example" asmv2:product="Tool" xmlns="urn:schemas-microsoft-com:asm.v1" />
  <deployment install="true" mapFileExtensions="true" />
  <dependency>
    <dependentAssembly dependencyType="install" codebase="Application Files\Tool_1_0_0_0\Tool.exe.manifest" size="4521">
      <assemblyIdentity name="Tool.exe" version="1.0.0.0" type="win32" />
      <hash>
        <dsig:Transforms>
          <dsig:Transform Algorithm="urn:schemas-microsoft-com:HashTransforms.Identity" />
        </dsig:Transforms>
        <dsig:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha256" />
        <dsig:DigestValue>n6xZQ8mXz0b3m8vJ1d2WZ4iKq9Qe8oJ2lVY3uTq7fGc=</dsig:DigestValue>
      </hash>
    </dependentAssembly>
  </dependency>
</asmv1:assembly>
"#;

    const APPLICATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<asmv1:assembly xmlns:asmv1="urn:schemas-microsoft-com:asm.v1" xmlns="urn:schemas-microsoft-com:asm.v2" xmlns:dsig="http://www.w3.org/2000/09/xmldsig#">
  <dependency>
    <dependentAssembly dependencyType="preRequisite" allowDelayedBinding="true">
      <assemblyIdentity name="Microsoft.Windows.CommonLanguageRuntime" version="4.0.30319.0" />
    </dependentAssembly>
  </dependency>
  <dependency>
    <dependentAssembly dependencyType="install" allowDelayedBinding="true" codebase="Tool.exe" size="2048">
      <hash>
        <dsig:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1" />
        <dsig:DigestValue>2jmj7l5rSw0yVb/vlWAYkK/YBwk=</dsig:DigestValue>
      </hash>
    </dependentAssembly>
  </dependency>
  <file name="Tool.exe.config" size="189">
    <hash>
      <dsig:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha256" />
      <dsig:DigestValue>47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=</dsig:DigestValue>
    </hash>
  </file>
  <file name="Resources\en\Tool.resources.dll" size="512" />
</asmv1:assembly>
"#;

    #[test]
    fn parses_deployment_manifest() {
        let manifest = decode_manifest(DEPLOYMENT.as_bytes()).unwrap();
        assert!(manifest.files.is_empty());
        assert_eq!(manifest.dependencies.len(), 1);

        let dep = &manifest.dependencies[0];
        assert!(dep.is_install());
        assert_eq!(
            dep.codebase,
            r"Application Files\Tool_1_0_0_0\Tool.exe.manifest"
        );
        assert_eq!(dep.info.size, "4521");
        assert_eq!(
            dep.info.hash.algorithm,
            "http://www.w3.org/2000/09/xmldsig#sha256"
        );
        assert_eq!(
            dep.info.hash.digest,
            "n6xZQ8mXz0b3m8vJ1d2WZ4iKq9Qe8oJ2lVY3uTq7fGc="
        );
    }

    #[test]
    fn parses_application_manifest_in_order() {
        let manifest = decode_manifest(APPLICATION.as_bytes()).unwrap();
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.dependencies[0].dependency_type, "preRequisite");
        assert!(manifest.dependencies[0].codebase.is_empty());
        assert_eq!(manifest.dependencies[1].allow_delayed_binding, "true");
        assert_eq!(
            manifest.dependencies[1].info.hash.digest,
            "2jmj7l5rSw0yVb/vlWAYkK/YBwk="
        );

        let names: Vec<_> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Tool.exe.config", r"Resources\en\Tool.resources.dll"]
        );

        let entries: Vec<_> = manifest.entries().map(|e| (e.path, e.kind)).collect();
        assert_eq!(entries[0], ("Tool.exe", FileKind::AssemblyDependency));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn nested_transform_algorithm_is_not_the_digest_method() {
        let manifest = decode_manifest(DEPLOYMENT.as_bytes()).unwrap();
        assert!(manifest.dependencies[0]
            .info
            .hash
            .algorithm
            .ends_with("#sha256"));
    }

    #[test]
    fn missing_attributes_default_to_empty() {
        let manifest = decode_manifest(APPLICATION.as_bytes()).unwrap();
        let bare = &manifest.files[1];
        assert_eq!(bare.info.size, "512");
        assert!(bare.info.hash.algorithm.is_empty());
        assert!(bare.info.hash.digest.is_empty());
    }

    #[test]
    fn files_outside_root_level_are_ignored() {
        let doc = r#"<assembly><group><file name="nested.dll" size="1"/></group><file name="top.dll" size="2"/></assembly>"#;
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].name, "top.dll");
    }

    #[test]
    fn decodes_declared_windows_1252() {
        let mut doc = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>\n<assembly><file name=\"caf"
            .to_vec();
        doc.push(0xE9);
        doc.extend_from_slice(b".txt\" size=\"4\"/></assembly>");

        let manifest = decode_manifest(&doc).unwrap();
        assert_eq!(manifest.files[0].name, "caf\u{e9}.txt");
    }

    #[test]
    fn decodes_utf16_with_byte_order_mark() {
        let doc = r#"<?xml version="1.0" encoding="utf-16"?><assembly><file name="wide.dll" size="8"/></assembly>"#;
        let mut bytes = vec![0xFF, 0xFE];
        for unit in doc.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        let manifest = decode_manifest(&bytes).unwrap();
        assert_eq!(manifest.files[0].name, "wide.dll");
        assert_eq!(manifest.files[0].info.size, "8");
    }

    #[test]
    fn unknown_encoding_label_falls_back_to_utf8() {
        let doc = r#"<?xml version="1.0" encoding="x-made-up"?><assembly><file name="a.dll" size="1"/></assembly>"#;
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files[0].name, "a.dll");
    }

    #[test]
    fn tolerates_mismatched_end_tags() {
        let doc = r#"<assembly><file name="a.dll" size="3"><hash><DigestValue>abc=</file><file name="b.dll" size="4"></file></assembly>"#;
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].info.hash.digest, "abc=");
    }

    #[test]
    fn ignores_stray_end_tags() {
        let doc = r#"<assembly></bogus><file name="a.dll" size="3"></file></assembly>"#;
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn accepts_unquoted_attribute_values() {
        let doc = "<assembly><file name=a.dll size=3></file></assembly>";
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files[0].name, "a.dll");
        assert_eq!(manifest.files[0].info.size, "3");
    }

    #[test]
    fn undefined_entity_keeps_raw_text() {
        let doc = r#"<assembly><file name="a.dll" size="3"><hash><DigestValue>ab&bogus;cd</DigestValue></hash></file></assembly>"#;
        let manifest = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(manifest.files[0].info.hash.digest, "ab&bogus;cd");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(decode_manifest(b""), Err(ManifestError::Empty)));
        assert!(matches!(
            decode_manifest(b"  \n\t"),
            Err(ManifestError::Empty)
        ));
    }

    #[test]
    fn rejects_text_without_root() {
        assert!(matches!(
            decode_manifest(b"this is not a manifest"),
            Err(ManifestError::NoRootElement)
        ));
    }

    #[test]
    fn rejects_truncated_document() {
        let err = decode_manifest(br#"<assembly><file name="a.dll" size="1"/>"#).unwrap_err();
        assert!(matches!(err, ManifestError::UnexpectedEof(ref name) if name == "assembly"));
    }

    #[test]
    fn rejects_unclosed_tag() {
        assert!(matches!(
            decode_manifest(br#"<assembly><file name="a.dll" size="3""#),
            Err(ManifestError::Xml(_))
        ));
    }

    #[test]
    fn empty_root_yields_empty_manifest() {
        let manifest = decode_manifest(b"<assembly/>").unwrap();
        assert!(manifest.files.is_empty());
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.entries().count(), 0);
    }
}
