// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `deltainfo.xml` file format.

Delta RPMs let clients reconstruct a new package from an installed older version
plus a smaller download. Each `<newpackage>` lists the deltas producing it.
*/

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer, ExtensionDocument, PackageMap},
        error::{Result, RpmRepositoryError},
        io::{ContentDigest, DigestFlavor},
        metadata::susedata::{find_files_with_extension, relative_href},
        package::{PackageHeader, PackageIdentity},
    },
    log::{info, warn},
    std::{io::Write, path::Path},
    xml::writer::{EventWriter, XmlEvent},
};

/// A delta from an older package version to a new package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delta {
    /// The version the delta applies to.
    pub old: PackageHeader,
    /// Location of the delta file relative to the repository root.
    pub filename: String,
    /// Sequence string identifying the old package contents.
    pub sequence: String,
    /// Size of the delta file in bytes.
    pub size: u64,
    pub checksum: ContentDigest,
}

impl Delta {
    /// Construct an instance describing the delta file at `path`.
    ///
    /// Size and SHA-1 checksum are read from the file. `href` is recorded as the file name.
    pub fn from_path(
        old: PackageHeader,
        path: impl AsRef<Path>,
        href: impl ToString,
        sequence: impl ToString,
    ) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)
            .map_err(|e| RpmRepositoryError::io_path(path, e))?
            .len();

        Ok(Self {
            old,
            filename: href.to_string(),
            sequence: sequence.to_string(),
            size,
            checksum: ContentDigest::digest_path(DigestFlavor::Sha1, path)?,
        })
    }

    fn write_xml<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        let old_epoch = self.old.epoch.to_string();

        writer.write(
            XmlEvent::start_element("delta")
                .attr("oldepoch", &old_epoch)
                .attr("oldversion", &self.old.version)
                .attr("oldrelease", &self.old.release),
        )?;

        write_text_element(writer, "filename", &self.filename)?;
        write_text_element(writer, "sequence", &self.sequence)?;
        write_text_element(writer, "size", &self.size.to_string())?;

        writer.write(
            XmlEvent::start_element("checksum").attr("type", self.checksum.digest_type().metadata_name()),
        )?;
        writer.write(XmlEvent::characters(&self.checksum.digest_hex()))?;
        writer.write(XmlEvent::end_element())?;

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

/// Package versions encoded in a `name-oldver_newver-oldrel_newrel.arch.delta.rpm` file name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeltaFileName {
    pub name: String,
    pub arch: String,
    pub old_version: String,
    pub old_release: String,
    pub new_version: String,
    pub new_release: String,
}

impl DeltaFileName {
    /// Parse a delta file name. Returns `None` if it doesn't follow the naming scheme.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".delta.rpm")?;
        let (rest, arch) = stem.rsplit_once('.')?;

        let mut parts = rest.rsplitn(3, '-');
        let (old_release, new_release) = parts.next()?.split_once('_')?;
        let (old_version, new_version) = parts.next()?.split_once('_')?;
        let name = parts.next()?;

        if name.is_empty() || arch.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            arch: arch.to_string(),
            old_version: old_version.to_string(),
            old_release: old_release.to_string(),
            new_version: new_version.to_string(),
            new_release: new_release.to_string(),
        })
    }

    fn produces(&self, package: &PackageIdentity) -> bool {
        package.name == self.name
            && package.arch == self.arch
            && package.version == self.new_version
            && package.release == self.new_release
    }
}

/// The `deltainfo.xml` document.
#[derive(Clone, Debug, Default)]
pub struct DeltaInfo {
    packages: PackageMap<Vec<Delta>>,
}

impl DeltaInfo {
    /// Register a delta producing `package`.
    pub fn add_delta(&mut self, package: &PackageIdentity, delta: Delta) {
        self.packages.get_or_insert_with(package, Vec::new).push(delta);
    }

    /// Index every `*.delta.rpm` under `dir`.
    ///
    /// The versions come from the file name (see [DeltaFileName]). A delta is recorded
    /// for the entry of `packages` it produces; the old epoch is taken from that package.
    /// The sequence is `<name>-<oldversion>-<oldrelease>-<delta sha1>`. Deltas without a
    /// matching package are skipped with a warning. Returns the number of deltas added.
    pub fn add_deltas(&mut self, dir: &Path, packages: &[PackageIdentity]) -> Result<usize> {
        let mut count = 0;

        for path in find_files_with_extension(dir, "rpm")? {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            if !file_name.ends_with(".delta.rpm") {
                continue;
            }

            let parsed = match DeltaFileName::parse(&file_name) {
                Some(parsed) => parsed,
                None => {
                    warn!("ignoring delta with unrecognized file name: {}", path.display());
                    continue;
                }
            };

            let package = match packages.iter().find(|p| parsed.produces(p)) {
                Some(package) => package,
                None => {
                    warn!("no package is produced by delta {}; ignoring", path.display());
                    continue;
                }
            };

            let old = PackageHeader {
                name: parsed.name.clone(),
                arch: parsed.arch.clone(),
                version: parsed.old_version.clone(),
                epoch: package.epoch,
                release: parsed.old_release.clone(),
            };

            let mut delta = Delta::from_path(old, &path, relative_href(dir, &path), "")?;
            delta.sequence = format!(
                "{}-{}-{}-{}",
                parsed.name,
                parsed.old_version,
                parsed.old_release,
                delta.checksum.digest_hex()
            );

            info!("adding delta {} to {}", path.display(), package);
            self.add_delta(package, delta);
            count += 1;
        }

        Ok(count)
    }

    /// Deltas producing a package.
    pub fn deltas(&self, package: &PackageIdentity) -> Option<&[Delta]> {
        self.packages.get(package).map(|d| d.as_slice())
    }
}

impl ExtensionDocument for DeltaInfo {
    fn kind(&self) -> &'static str {
        "deltainfo"
    }

    fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);

        write_declaration(&mut writer)?;
        writer.write(XmlEvent::start_element("deltainfo"))?;

        for (package, deltas) in self.packages.iter() {
            let epoch = package.epoch.to_string();

            writer.write(
                XmlEvent::start_element("newpackage")
                    .attr("name", &package.name)
                    .attr("epoch", &epoch)
                    .attr("version", &package.version)
                    .attr("release", &package.release)
                    .attr("arch", &package.arch),
            )?;

            for delta in deltas {
                delta.write_xml(&mut writer)?;
            }

            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(version: &str) -> PackageHeader {
        PackageHeader {
            name: "foo".into(),
            arch: "x86_64".into(),
            version: version.into(),
            epoch: 0,
            release: "1".into(),
        }
    }

    #[test]
    fn render_deltas() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let rpm_path = td.path().join("foo-1.1-1.x86_64.rpm");
        let delta_path = td.path().join("foo-1.0_1.1-1_1.x86_64.delta.rpm");
        std::fs::write(&rpm_path, b"new").map_err(|e| RpmRepositoryError::io_path(&rpm_path, e))?;
        std::fs::write(&delta_path, b"hello\n")
            .map_err(|e| RpmRepositoryError::io_path(&delta_path, e))?;

        let package = PackageIdentity::from_header(header("1.1"), &rpm_path)?;
        let delta = Delta::from_path(
            header("1.0"),
            &delta_path,
            "x86_64/foo-1.0_1.1-1_1.x86_64.delta.rpm",
            "foo-abc123",
        )?;
        assert_eq!(delta.size, 6);

        let mut info = DeltaInfo::default();
        assert!(info.is_empty());
        info.add_delta(&package, delta);
        assert!(!info.is_empty());
        assert_eq!(info.deltas(&package).map(|d| d.len()), Some(1));

        let mut buf = vec![];
        info.render_to(&mut buf, 2)?;
        let xml = String::from_utf8_lossy(&buf);

        assert!(xml.contains("<newpackage name=\"foo\" epoch=\"0\" version=\"1.1\""));
        assert!(xml.contains("oldversion=\"1.0\""));
        assert!(xml.contains("<sequence>foo-abc123</sequence>"));
        assert!(xml.contains("<size>6</size>"));
        assert!(xml.contains(
            "<checksum type=\"sha\">f572d396fae9206628714fb2ce00f72e94f2258f</checksum>"
        ));

        Ok(())
    }

    #[test]
    fn parse_delta_file_names() {
        assert_eq!(
            DeltaFileName::parse("foo-bar-1.0_1.1-1_2.x86_64.delta.rpm"),
            Some(DeltaFileName {
                name: "foo-bar".into(),
                arch: "x86_64".into(),
                old_version: "1.0".into(),
                old_release: "1".into(),
                new_version: "1.1".into(),
                new_release: "2".into(),
            })
        );
        assert_eq!(DeltaFileName::parse("foo-1.0-1.x86_64.rpm"), None);
        assert_eq!(DeltaFileName::parse("foo-1.0-1.x86_64.delta.rpm"), None);
        assert_eq!(DeltaFileName::parse("1.0_1.1-1_1.x86_64.delta.rpm"), None);
    }

    #[test]
    fn scan_deltas() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let root = td.path();
        let arch_dir = root.join("x86_64");
        std::fs::create_dir_all(arch_dir.join("deltas"))
            .map_err(|e| RpmRepositoryError::io_path(&arch_dir, e))?;

        let rpm_path = arch_dir.join("foo-1.1-1.x86_64.rpm");
        std::fs::write(&rpm_path, b"new").map_err(|e| RpmRepositoryError::io_path(&rpm_path, e))?;
        for (name, content) in [
            ("foo-1.0_1.1-1_1.x86_64.delta.rpm", "hello\n"),
            ("foo-0.9_1.0-1_1.x86_64.delta.rpm", "orphan"),
            ("garbage.delta.rpm", "?"),
        ] {
            let path = arch_dir.join("deltas").join(name);
            std::fs::write(&path, content).map_err(|e| RpmRepositoryError::io_path(&path, e))?;
        }

        let mut header = header("1.1");
        header.epoch = 3;
        let package = PackageIdentity::from_header(header, &rpm_path)?;

        let mut info = DeltaInfo::default();
        assert_eq!(info.add_deltas(root, &[package.clone()])?, 1);

        let deltas = info.deltas(&package).unwrap_or_default();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].filename, "x86_64/deltas/foo-1.0_1.1-1_1.x86_64.delta.rpm");
        assert_eq!(deltas[0].old.version, "1.0");
        assert_eq!(deltas[0].old.epoch, 3);
        assert_eq!(
            deltas[0].sequence,
            "foo-1.0-1-f572d396fae9206628714fb2ce00f72e94f2258f"
        );

        Ok(())
    }
}
