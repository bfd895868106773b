// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `filelists.xml` file format. */

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

/// Namespace of the `<filelists>` root element.
pub const FILELISTS_NAMESPACE: &str = "http://linux.duke.edu/metadata/filelists";

/// A file installed by a package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: String,

    /// Type of file.
    ///
    /// `None` is a regular file. Other values are `dir` and `ghost`.
    pub file_type: Option<String>,
}

impl FileEntry {
    /// A regular file.
    pub fn file(path: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            file_type: None,
        }
    }

    /// A directory.
    pub fn dir(path: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            file_type: Some("dir".to_string()),
        }
    }
}

/// The `filelists.xml` document: files installed by each package.
#[derive(Clone, Debug, Default)]
pub struct FileLists {
    packages: PackageMap<Vec<FileEntry>>,
}

impl FileLists {
    /// Record files installed by a package.
    ///
    /// Files are appended to any already recorded for the same package.
    pub fn add_files(
        &mut self,
        package: &PackageIdentity,
        files: impl IntoIterator<Item = FileEntry>,
    ) {
        self.packages
            .get_or_insert_with(package, Vec::new)
            .extend(files);
    }

    /// Files recorded for a package.
    pub fn files(&self, package: &PackageIdentity) -> Option<&[FileEntry]> {
        self.packages.get(package).map(|files| files.as_slice())
    }
}

impl ExtensionDocument for FileLists {
    fn kind(&self) -> &'static str {
        "filelists"
    }

    fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);
        let count = self.packages.len().to_string();

        write_declaration(&mut writer)?;
        writer.write(
            XmlEvent::start_element("filelists")
                .default_ns(FILELISTS_NAMESPACE)
                .attr("packages", &count),
        )?;

        for (package, files) in self.packages.iter() {
            start_package_element(&mut writer, package)?;

            for file in files {
                let element = XmlEvent::start_element("file");
                let element = match &file.file_type {
                    Some(file_type) => element.attr("type", file_type),
                    None => element,
                };
                writer.write(element)?;
                writer.write(XmlEvent::characters(&file.path))?;
                writer.write(XmlEvent::end_element())?;
            }

            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{io::ContentDigest, package::PackageHeader},
    };

    fn package(name: &str, sha1: &str) -> Result<PackageIdentity> {
        Ok(PackageIdentity::with_checksum(
            PackageHeader {
                name: name.into(),
                arch: "noarch".into(),
                version: "1".into(),
                epoch: 0,
                release: "1".into(),
            },
            ContentDigest::sha1_hex(sha1)?,
            format!("{}.rpm", name),
        ))
    }

    #[test]
    fn render() -> Result<()> {
        let foo = package("foo", "f572d396fae9206628714fb2ce00f72e94f2258f")?;
        let bar = package("bar", "0a4d55a8d778e5022fab701977c5d840bbc486d0")?;

        let mut lists = FileLists::default();
        assert!(lists.is_empty());

        lists.add_files(&foo, vec![FileEntry::dir("/usr/share/foo")]);
        lists.add_files(&bar, vec![FileEntry::file("/usr/bin/bar")]);
        lists.add_files(&foo, vec![FileEntry::file("/usr/bin/foo")]);
        assert!(!lists.is_empty());
        assert_eq!(lists.files(&foo).map(|f| f.len()), Some(2));

        let mut buf = vec![];
        lists.render_to(&mut buf, 2)?;
        let xml = String::from_utf8_lossy(&buf);

        assert!(xml.contains("packages=\"2\""));
        assert!(xml.contains("<file type=\"dir\">/usr/share/foo</file>"));
        assert!(xml.contains("<file>/usr/bin/foo</file>"));
        assert!(xml.find("name=\"foo\"") < xml.find("name=\"bar\""));

        Ok(())
    }
}
