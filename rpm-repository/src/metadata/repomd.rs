// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `repomd.xml` file format.

`repomd.xml` is the index of a repository. It holds one `<data>` record per metadata
file, giving the file's location, the digest of its stored bytes, the digest of its
decompressed content (the _open checksum_) and its modification time.
*/

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer},
        error::{Result, RpmRepositoryError},
        io::{Compression, ContentDigest, DigestFlavor},
    },
    log::warn,
    std::{
        hash::{Hash, Hasher},
        io::{Read, Write},
        path::Path,
        time::UNIX_EPOCH,
    },
    xml::{
        attribute::OwnedAttribute,
        reader::{EventReader, ParserConfig, XmlEvent as ReadEvent},
        writer::XmlEvent,
    },
};

/// Namespace of the `<repomd>` root element.
pub const REPO_NAMESPACE: &str = "http://linux.duke.edu/metadata/repo";

/// A `<data>` record in a `repomd.xml` file.
///
/// Records are identified by [Self::location]: equality and hashing ignore all
/// other fields.
#[derive(Clone, Debug)]
pub struct RepoMdResource {
    /// The type of data, e.g. `primary`.
    pub kind: String,
    /// Path of the file relative to the repository root.
    pub location: String,
    /// Digest of the file as stored.
    pub checksum: ContentDigest,
    /// Modification time of the file, in seconds since the UNIX epoch.
    pub timestamp: u64,
    /// Digest of the decompressed file content.
    ///
    /// Equal to [Self::checksum] for files that aren't compressed.
    pub open_checksum: ContentDigest,
}

impl PartialEq for RepoMdResource {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for RepoMdResource {}

impl Hash for RepoMdResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state)
    }
}

/// Derive the resource type from a file name.
///
/// A trailing `.gz` is removed before the remaining extension is, so
/// `primary.xml.gz` yields `primary`.
pub fn resource_kind_from_path(path: impl AsRef<Path>) -> String {
    let file_name = path
        .as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let stripped = file_name
        .strip_suffix(Compression::Gzip.extension())
        .unwrap_or(&file_name);

    Path::new(stripped)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// A `repomd.xml` file.
///
/// Resources keep insertion order, which is also the order they are written in.
#[derive(Clone, Debug, Default)]
pub struct RepoMd {
    resources: Vec<RepoMdResource>,
}

impl RepoMd {
    /// Construct an instance by parsing XML from a reader.
    ///
    /// Any element inside a `<data>` record other than `location`, `checksum`,
    /// `timestamp` and `open-checksum` is an error.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut index = Self::default();
        let mut parser = IndexParser::default();

        let config = ParserConfig::new()
            .trim_whitespace(true)
            .cdata_to_characters(true);

        for event in EventReader::new_with_config(reader, config) {
            if let Some(resource) = parser.handle(event?)? {
                index.add_resource(resource);
            }
        }

        Ok(index)
    }

    /// Construct an instance by parsing XML from a string.
    pub fn from_xml(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Construct an instance by parsing the file at the given path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;

        Self::from_reader(std::io::BufReader::new(fh))
    }

    /// Resources in this index, in insertion order.
    pub fn resources(&self) -> &[RepoMdResource] {
        &self.resources
    }

    /// Number of resources in this index.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether this index has no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Find a resource by its location.
    pub fn resource(&self, location: &str) -> Option<&RepoMdResource> {
        self.resources.iter().find(|r| r.location == location)
    }

    /// Find the first resource of a given type.
    pub fn resource_by_kind(&self, kind: &str) -> Option<&RepoMdResource> {
        self.resources.iter().find(|r| r.kind == kind)
    }

    /// Add a resource.
    ///
    /// A resource at an already registered location replaces the existing entry
    /// in place.
    pub fn add_resource(&mut self, resource: RepoMdResource) {
        if let Some(existing) = self.resources.iter_mut().find(|r| **r == resource) {
            warn!("{} already exists; replacing", resource.location);
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove the resource at a location, returning it if present.
    pub fn remove_resource(&mut self, location: &str) -> Option<RepoMdResource> {
        let position = self.resources.iter().position(|r| r.location == location)?;

        Some(self.resources.remove(position))
    }

    /// Add a resource describing a file on disk.
    ///
    /// `location` is the path recorded in the index. `path` is where the file is read
    /// from. When `kind` is not given, it is derived from the file name of `path`.
    pub fn add_file_resource(
        &mut self,
        location: impl ToString,
        path: impl AsRef<Path>,
        kind: Option<&str>,
    ) -> Result<()> {
        let path = path.as_ref();

        let kind = match kind {
            Some(kind) => kind.to_string(),
            None => resource_kind_from_path(path),
        };

        let metadata = std::fs::metadata(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;
        let timestamp = metadata
            .modified()
            .map_err(|e| RpmRepositoryError::io_path(path, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let checksum = ContentDigest::digest_path(DigestFlavor::Sha1, path)?;

        let open_checksum = match Compression::from_path(path) {
            Compression::None => checksum.clone(),
            compression => {
                ContentDigest::digest_path_decompressed(DigestFlavor::Sha1, path, compression)?
            }
        };

        self.add_resource(RepoMdResource {
            kind,
            location: location.to_string(),
            checksum,
            timestamp,
            open_checksum,
        });

        Ok(())
    }

    /// Write this index as XML.
    ///
    /// Output only depends on the registered resources.
    pub fn write_to(&self, writer: impl Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);

        write_declaration(&mut writer)?;
        writer.write(XmlEvent::start_element("repomd").default_ns(REPO_NAMESPACE))?;

        for resource in &self.resources {
            writer.write(XmlEvent::start_element("data").attr("type", &resource.kind))?;

            writer.write(XmlEvent::start_element("location").attr("href", &resource.location))?;
            writer.write(XmlEvent::end_element())?;

            write_checksum(&mut writer, "checksum", &resource.checksum)?;
            write_text_element(&mut writer, "timestamp", &resource.timestamp.to_string())?;
            write_checksum(&mut writer, "open-checksum", &resource.open_checksum)?;

            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }

    /// Render this index to an XML string.
    pub fn to_xml(&self, indent: usize) -> Result<String> {
        let mut buf = vec![];
        self.write_to(&mut buf, indent)?;

        Ok(String::from_utf8_lossy(&buf).to_string())
    }
}

fn write_checksum<W: Write>(
    writer: &mut xml::writer::EventWriter<W>,
    name: &str,
    digest: &ContentDigest,
) -> Result<()> {
    writer.write(XmlEvent::start_element(name).attr("type", digest.digest_type().metadata_name()))?;
    writer.write(XmlEvent::characters(&digest.digest_hex()))?;
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

fn attribute(attributes: &[OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
}

/// Fields of a `<data>` record seen so far.
#[derive(Default)]
struct ResourceFields {
    kind: Option<String>,
    location: Option<String>,
    checksum: Option<ContentDigest>,
    timestamp: Option<u64>,
    open_checksum: Option<ContentDigest>,
}

impl ResourceFields {
    fn build(self) -> Result<RepoMdResource> {
        Ok(RepoMdResource {
            kind: self.kind.ok_or(RpmRepositoryError::IndexMissingField("type"))?,
            location: self
                .location
                .ok_or(RpmRepositoryError::IndexMissingField("location"))?,
            checksum: self
                .checksum
                .ok_or(RpmRepositoryError::IndexMissingField("checksum"))?,
            timestamp: self
                .timestamp
                .ok_or(RpmRepositoryError::IndexMissingField("timestamp"))?,
            open_checksum: self
                .open_checksum
                .ok_or(RpmRepositoryError::IndexMissingField("open-checksum"))?,
        })
    }
}

/// A text-bearing child of a `<data>` record being read.
struct FieldText {
    name: String,
    digest_type: Option<String>,
    text: String,
}

/// Event driven `repomd.xml` parser.
#[derive(Default)]
struct IndexParser {
    /// Local names of currently open elements.
    stack: Vec<String>,
    /// Stack depth of an ignored top-level element being skipped.
    skip_depth: Option<usize>,
    record: Option<ResourceFields>,
    field: Option<FieldText>,
}

impl IndexParser {
    /// Process an event, returning a resource once a `<data>` record is complete.
    fn handle(&mut self, event: ReadEvent) -> Result<Option<RepoMdResource>> {
        match event {
            ReadEvent::StartElement {
                name, attributes, ..
            } => {
                let local = name.local_name;

                if self.skip_depth.is_none() {
                    self.start_element(&local, &attributes)?;
                }

                self.stack.push(local);
                Ok(None)
            }
            ReadEvent::EndElement { .. } => {
                self.stack.pop();

                if let Some(depth) = self.skip_depth {
                    if self.stack.len() == depth {
                        self.skip_depth = None;
                    }
                    return Ok(None);
                }

                self.end_element()
            }
            ReadEvent::Characters(text) => {
                if let Some(field) = self.field.as_mut() {
                    field.text.push_str(&text);
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn start_element(&mut self, local: &str, attributes: &[OwnedAttribute]) -> Result<()> {
        match self.stack.len() {
            0 => {
                if local != "repomd" {
                    return Err(RpmRepositoryError::IndexMalformed(format!(
                        "unexpected root element <{}>",
                        local
                    )));
                }
            }
            1 => {
                if local == "data" {
                    self.record = Some(ResourceFields {
                        kind: attribute(attributes, "type"),
                        ..Default::default()
                    });
                } else {
                    warn!("ignoring <{}> element in repository index", local);
                    self.skip_depth = Some(self.stack.len());
                }
            }
            2 => {
                let record = self.record.as_mut().ok_or_else(|| {
                    RpmRepositoryError::IndexMalformed("field outside of <data>".to_string())
                })?;

                match local {
                    "location" => {
                        record.location = attribute(attributes, "href");
                    }
                    "checksum" | "timestamp" | "open-checksum" => {}
                    name => return Err(RpmRepositoryError::IndexUnknownField(name.to_string())),
                }

                self.field = Some(FieldText {
                    name: local.to_string(),
                    digest_type: attribute(attributes, "type"),
                    text: String::new(),
                });
            }
            _ => {
                let parent = self.stack.last().cloned().unwrap_or_default();
                return Err(RpmRepositoryError::IndexUnknownField(format!(
                    "{}/{}",
                    parent, local
                )));
            }
        }

        Ok(())
    }

    fn end_element(&mut self) -> Result<Option<RepoMdResource>> {
        match self.stack.len() {
            2 => {
                if let (Some(field), Some(record)) = (self.field.take(), self.record.as_mut()) {
                    let digest = |field: &FieldText| -> Result<ContentDigest> {
                        let digest_type = field
                            .digest_type
                            .as_deref()
                            .ok_or(RpmRepositoryError::IndexMissingField("type"))?;
                        ContentDigest::from_metadata(digest_type, &field.text)
                    };

                    match field.name.as_str() {
                        "checksum" => record.checksum = Some(digest(&field)?),
                        "open-checksum" => record.open_checksum = Some(digest(&field)?),
                        "timestamp" => {
                            record.timestamp =
                                Some(field.text.trim().parse::<u64>().map_err(|e| {
                                    RpmRepositoryError::IndexMalformed(format!(
                                        "bad timestamp {:?}: {}",
                                        field.text, e
                                    ))
                                })?);
                        }
                        _ => {}
                    }
                }

                Ok(None)
            }
            1 => match self.record.take() {
                Some(record) => Ok(Some(record.build()?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }
}
