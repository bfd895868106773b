// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Extension documents.

Every metadata file referenced from `repomd.xml` other than the index itself is an
_extension document_. The [ExtensionDocument] trait is the interface through which
[crate::repository::Repository] writes all of them: it asks whether a document has
content, renders it, compresses it and registers the result in the index.
*/

use {
    crate::{error::Result, package::PackageIdentity},
    std::{collections::HashMap, io::Write},
    xml::{
        common::XmlVersion,
        writer::{EmitterConfig, EventWriter, XmlEvent},
    },
};

/// A metadata document that can be rendered to XML.
pub trait ExtensionDocument {
    /// The document type, e.g. `primary` or `updateinfo`.
    ///
    /// This is the `type` recorded in the index and the stem of the file name.
    fn kind(&self) -> &'static str;

    /// Whether the document has nothing worth persisting.
    fn is_empty(&self) -> bool;

    /// Render the document as XML.
    ///
    /// `indent` is the number of spaces per nesting level. Rendering only depends on
    /// in-memory state.
    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()>;

    /// File name of the uncompressed document.
    fn file_name(&self) -> String {
        format!("{}.xml", self.kind())
    }
}

/// Per-package values keyed by [PackageIdentity], kept in insertion order.
#[derive(Clone, Debug)]
pub struct PackageMap<V> {
    entries: Vec<(PackageIdentity, V)>,
    positions: HashMap<PackageIdentity, usize>,
}

impl<V> Default for PackageMap<V> {
    fn default() -> Self {
        Self {
            entries: vec![],
            positions: HashMap::new(),
        }
    }
}

impl<V> PackageMap<V> {
    /// Obtain the value for a package, inserting the result of `f` if absent.
    pub fn get_or_insert_with(&mut self, package: &PackageIdentity, f: impl FnOnce() -> V) -> &mut V {
        let position = match self.positions.get(package) {
            Some(position) => *position,
            None => {
                self.entries.push((package.clone(), f()));
                self.positions.insert(package.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        &mut self.entries[position].1
    }

    /// Obtain the value for a package.
    pub fn get(&self, package: &PackageIdentity) -> Option<&V> {
        self.positions
            .get(package)
            .map(|position| &self.entries[*position].1)
    }

    /// Iterate over packages and their values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageIdentity, &V)> {
        self.entries.iter().map(|(package, value)| (package, value))
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no packages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write the `<package pkgid name arch>` start element and `<version>` child shared by
/// per-package documents.
///
/// The caller closes the element.
pub fn start_package_element<W: Write>(
    writer: &mut EventWriter<W>,
    package: &PackageIdentity,
) -> Result<()> {
    let pkgid = package.pkgid();

    writer.write(
        XmlEvent::start_element("package")
            .attr("pkgid", &pkgid)
            .attr("name", &package.name)
            .attr("arch", &package.arch),
    )?;

    write_package_version(writer, package)
}

/// Obtain an XML writer emitting `indent` spaces per nesting level.
pub fn xml_writer<W: Write>(sink: W, indent: usize) -> EventWriter<W> {
    EmitterConfig::new()
        .perform_indent(indent > 0)
        .indent_string(" ".repeat(indent))
        .create_writer(sink)
}

/// Write the `<?xml ?>` declaration.
pub fn write_declaration<W: Write>(writer: &mut EventWriter<W>) -> Result<()> {
    writer.write(XmlEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("UTF-8"),
        standalone: None,
    })?;

    Ok(())
}

/// Write `<name>text</name>`.
///
/// Empty text results in an empty element.
pub fn write_text_element<W: Write>(
    writer: &mut EventWriter<W>,
    name: &str,
    text: &str,
) -> Result<()> {
    writer.write(XmlEvent::start_element(name))?;
    if !text.is_empty() {
        writer.write(XmlEvent::characters(text))?;
    }
    writer.write(XmlEvent::end_element())?;

    Ok(())
}

/// Write the `<version>` element describing a package.
pub fn write_package_version<W: Write>(
    writer: &mut EventWriter<W>,
    package: &PackageIdentity,
) -> Result<()> {
    let epoch = package.epoch.to_string();

    writer.write(
        XmlEvent::start_element("version")
            .attr("epoch", &epoch)
            .attr("ver", &package.version)
            .attr("rel", &package.release),
    )?;
    writer.write(XmlEvent::end_element())?;

    Ok(())
}
