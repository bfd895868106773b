// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `other.xml` file format. */

use {
    crate::{
        document::{
            start_package_element, write_declaration, xml_writer, ExtensionDocument, PackageMap,
        },
        error::Result,
        package::PackageIdentity,
    },
    std::io::Write,
    xml::writer::XmlEvent,
};

/// Namespace of the `<otherdata>` root element.
pub const OTHER_NAMESPACE: &str = "http://linux.duke.edu/metadata/other";

/// A package changelog entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangelogEntry {
    pub author: String,
    /// Seconds since the UNIX epoch.
    pub date: u64,
    pub text: String,
}

/// The `other.xml` document: package changelogs.
#[derive(Clone, Debug, Default)]
pub struct Other {
    packages: PackageMap<Vec<ChangelogEntry>>,
}

impl Other {
    /// Append a changelog entry to a package.
    pub fn add_changelog(&mut self, package: &PackageIdentity, entry: ChangelogEntry) {
        self.packages
            .get_or_insert_with(package, Vec::new)
            .push(entry);
    }
}

impl ExtensionDocument for Other {
    fn kind(&self) -> &'static str {
        "other"
    }

    fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);
        let count = self.packages.len().to_string();

        write_declaration(&mut writer)?;
        writer.write(
            XmlEvent::start_element("otherdata")
                .default_ns(OTHER_NAMESPACE)
                .attr("packages", &count),
        )?;

        for (package, entries) in self.packages.iter() {
            start_package_element(&mut writer, package)?;

            for entry in entries {
                let date = entry.date.to_string();
                writer.write(
                    XmlEvent::start_element("changelog")
                        .attr("author", &entry.author)
                        .attr("date", &date),
                )?;
                writer.write(XmlEvent::characters(&entry.text))?;
                writer.write(XmlEvent::end_element())?;
            }

            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}
