// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `primary.xml` file format. */

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer, ExtensionDocument},
        error::{Result, RpmRepositoryError},
        io::{ContentDigest, DigestFlavor},
        package::PackageIdentity,
    },
    serde::Deserialize,
    std::{
        io::{Read, Write},
        time::UNIX_EPOCH,
    },
    xml::writer::{EventWriter, XmlEvent},
};

/// Namespace of the `<metadata>` root element.
pub const COMMON_NAMESPACE: &str = "http://linux.duke.edu/metadata/common";

/// Namespace of `rpm:` prefixed elements.
pub const RPM_NAMESPACE: &str = "http://linux.duke.edu/metadata/rpm";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Primary {
    /// The number of packages expressed by this document.
    #[serde(rename = "packages")]
    pub count: usize,

    /// `<package>` elements in this document.
    #[serde(default, rename = "package")]
    pub packages: Vec<Package>,
}

impl Primary {
    /// Construct an instance by parsing XML from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    /// Construct an instance by parsing XML from a string.
    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }

    /// Add a package record.
    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
        self.count = self.packages.len();
    }
}

impl ExtensionDocument for Primary {
    fn kind(&self) -> &'static str {
        "primary"
    }

    fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);
        let count = self.packages.len().to_string();

        write_declaration(&mut writer)?;
        writer.write(
            XmlEvent::start_element("metadata")
                .default_ns(COMMON_NAMESPACE)
                .ns("rpm", RPM_NAMESPACE)
                .attr("packages", &count),
        )?;

        for package in &self.packages {
            package.write_xml(&mut writer)?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

/// A package as advertised in a `primary.xml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    /// The type/flavor of a package.
    ///
    /// e.g. `rpm`.
    #[serde(rename = "type")]
    pub package_type: String,

    /// The name of the package.
    pub name: String,

    /// The machine architecture the package is targeting.
    pub arch: String,

    /// The package version.
    pub version: PackageVersion,

    /// Content digest of package file.
    pub checksum: Checksum,

    /// A text summary of the package.
    pub summary: String,

    /// A longer text description of the package.
    pub description: String,

    /// Name of entity that produced the package.
    pub packager: Option<String>,

    /// URL where additional package info can be obtained.
    pub url: Option<String>,

    /// Time the package was created.
    pub time: PackageTime,

    /// Describes sizes affiliated with the package.
    pub size: PackageSize,

    /// Where the package can be obtained from.
    pub location: Location,

    /// Additional metadata about the package.
    pub format: Option<PackageFormat>,
}

impl Package {
    /// Construct a record for a package file.
    ///
    /// `href` is the location of the package relative to the repository root. Size and
    /// file time come from the file at [PackageIdentity::path]; text fields start out empty.
    pub fn from_identity(identity: &PackageIdentity, href: impl ToString) -> Result<Self> {
        let metadata = std::fs::metadata(&identity.path)
            .map_err(|e| RpmRepositoryError::io_path(&identity.path, e))?;
        let file_time = metadata
            .modified()
            .map_err(|e| RpmRepositoryError::io_path(&identity.path, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Self {
            package_type: "rpm".to_string(),
            name: identity.name.clone(),
            arch: identity.arch.clone(),
            version: PackageVersion {
                epoch: identity.epoch,
                version: identity.version.clone(),
                release: identity.release.clone(),
            },
            checksum: Checksum {
                name: identity.checksum.digest_type().metadata_name().to_string(),
                value: identity.pkgid(),
                pkg_id: Some("YES".to_string()),
            },
            summary: String::new(),
            description: String::new(),
            packager: None,
            url: None,
            time: PackageTime {
                file: file_time,
                build: file_time,
            },
            size: PackageSize {
                package: metadata.len(),
                installed: 0,
                archive: 0,
            },
            location: Location {
                href: href.to_string(),
            },
            format: None,
        })
    }

    fn write_xml<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        writer.write(XmlEvent::start_element("package").attr("type", &self.package_type))?;

        write_text_element(writer, "name", &self.name)?;
        write_text_element(writer, "arch", &self.arch)?;

        let epoch = self.version.epoch.to_string();
        writer.write(
            XmlEvent::start_element("version")
                .attr("epoch", &epoch)
                .attr("ver", &self.version.version)
                .attr("rel", &self.version.release),
        )?;
        writer.write(XmlEvent::end_element())?;

        let checksum = XmlEvent::start_element("checksum").attr("type", &self.checksum.name);
        let checksum = match &self.checksum.pkg_id {
            Some(pkg_id) => checksum.attr("pkgid", pkg_id),
            None => checksum,
        };
        writer.write(checksum)?;
        writer.write(XmlEvent::characters(&self.checksum.value))?;
        writer.write(XmlEvent::end_element())?;

        write_text_element(writer, "summary", &self.summary)?;
        write_text_element(writer, "description", &self.description)?;
        if let Some(packager) = &self.packager {
            write_text_element(writer, "packager", packager)?;
        }
        if let Some(url) = &self.url {
            write_text_element(writer, "url", url)?;
        }

        let (file, build) = (self.time.file.to_string(), self.time.build.to_string());
        writer.write(
            XmlEvent::start_element("time")
                .attr("file", &file)
                .attr("build", &build),
        )?;
        writer.write(XmlEvent::end_element())?;

        let (package, installed, archive) = (
            self.size.package.to_string(),
            self.size.installed.to_string(),
            self.size.archive.to_string(),
        );
        writer.write(
            XmlEvent::start_element("size")
                .attr("package", &package)
                .attr("installed", &installed)
                .attr("archive", &archive),
        )?;
        writer.write(XmlEvent::end_element())?;

        writer.write(XmlEvent::start_element("location").attr("href", &self.location.href))?;
        writer.write(XmlEvent::end_element())?;

        if let Some(format) = &self.format {
            format.write_xml(writer)?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

/// Describes a package version.
#[derive(Clone, Debug, Deserialize)]
pub struct PackageVersion {
    /// When the version came into existence.
    pub epoch: u64,

    /// Version string.
    #[serde(rename = "ver")]
    pub version: String,

    /// Release string.
    #[serde(rename = "rel")]
    pub release: String,
}

/// Describes the content checksum of a package.
#[derive(Clone, Debug, Deserialize)]
pub struct Checksum {
    /// Digest type.
    #[serde(rename = "type")]
    pub name: String,

    /// Hex encoded digest value.
    #[serde(rename = "$value")]
    pub value: String,

    #[serde(rename = "pkgid")]
    pub pkg_id: Option<String>,
}

impl TryFrom<Checksum> for ContentDigest {
    type Error = RpmRepositoryError;

    fn try_from(v: Checksum) -> std::result::Result<Self, Self::Error> {
        ContentDigest::from_hex_digest(DigestFlavor::from_metadata_name(&v.name)?, &v.value)
    }
}

/// The location of a package file.
#[derive(Clone, Debug, Deserialize)]
pub struct Location {
    pub href: String,
}

/// Times associated with a package.
#[derive(Clone, Debug, Deserialize)]
pub struct PackageTime {
    pub file: u64,
    pub build: u64,
}

/// Sizes associated with a package.
#[derive(Clone, Debug, Deserialize)]
pub struct PackageSize {
    pub package: u64,

    /// Total size in bytes when installed.
    pub installed: u64,

    /// Size in bytes of package archive.
    pub archive: u64,
}

/// Additional metadata about a package.
#[derive(Clone, Debug, Deserialize)]
pub struct PackageFormat {
    /// The package's license.
    pub license: Option<String>,

    /// Vendor of package.
    pub vendor: Option<String>,
    pub group: Option<String>,

    /// Hostname of machine that built the package.
    #[serde(rename = "buildhost")]
    pub build_host: Option<String>,

    /// Name of RPM from which this package is derived.
    #[serde(rename = "sourcerpm")]
    pub source_rpm: Option<String>,

    /// Packages that this package provides.
    pub provides: Option<Entries>,

    /// Packages that this package requires.
    pub requires: Option<Entries>,
}

impl PackageFormat {
    fn write_xml<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        writer.write(XmlEvent::start_element("format"))?;

        for (name, value) in [
            ("rpm:license", &self.license),
            ("rpm:vendor", &self.vendor),
            ("rpm:group", &self.group),
            ("rpm:buildhost", &self.build_host),
            ("rpm:sourcerpm", &self.source_rpm),
        ] {
            if let Some(value) = value {
                write_text_element(writer, name, value)?;
            }
        }

        for (name, entries) in [("rpm:provides", &self.provides), ("rpm:requires", &self.requires)] {
            if let Some(entries) = entries {
                writer.write(XmlEvent::start_element(name))?;
                for entry in &entries.entries {
                    entry.write_xml(writer)?;
                }
                writer.write(XmlEvent::end_element())?;
            }
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

/// A collection of [PackageEntry].
#[derive(Clone, Debug, Deserialize)]
pub struct Entries {
    #[serde(rename = "entry")]
    pub entries: Vec<PackageEntry>,
}

/// Describes a package relationship.
#[derive(Clone, Debug, Deserialize)]
pub struct PackageEntry {
    /// Name of package.
    pub name: String,

    /// Version comparison flags.
    pub flags: Option<String>,

    /// Epoch value.
    pub epoch: Option<u64>,

    /// Version of package.
    #[serde(rename = "ver")]
    pub version: Option<String>,

    /// Release of package.
    #[serde(rename = "rel")]
    pub release: Option<String>,
}

impl PackageEntry {
    fn write_xml<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        let epoch = self.epoch.map(|epoch| epoch.to_string());

        let mut element = XmlEvent::start_element("rpm:entry").attr("name", &self.name);
        if let Some(flags) = &self.flags {
            element = element.attr("flags", flags);
        }
        if let Some(epoch) = &epoch {
            element = element.attr("epoch", epoch);
        }
        if let Some(version) = &self.version {
            element = element.attr("ver", version);
        }
        if let Some(release) = &self.release {
            element = element.attr("rel", release);
        }

        writer.write(element)?;
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

    #[test]
    fn render_and_parse() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let path = td.path().join("foo-1.0-1.x86_64.rpm");
        std::fs::write(&path, b"not really an rpm").map_err(|e| RpmRepositoryError::io_path(&path, e))?;

        let identity = PackageIdentity::from_header(
            PackageHeader {
                name: "foo".into(),
                arch: "x86_64".into(),
                version: "1.0".into(),
                epoch: 2,
                release: "1".into(),
            },
            &path,
        )?;

        let mut primary = Primary::default();
        assert!(primary.is_empty());

        let mut package = Package::from_identity(&identity, "x86_64/foo-1.0-1.x86_64.rpm")?;
        package.summary = "The foo tool".to_string();
        package.description = "Does foo & bar.".to_string();
        primary.add_package(package);
        assert!(!primary.is_empty());
        assert_eq!(primary.count, 1);

        let mut buf = vec![];
        primary.render_to(&mut buf, 2)?;
        let xml = String::from_utf8_lossy(&buf).to_string();
        assert!(xml.contains("packages=\"1\""));
        assert!(xml.contains("pkgid=\"YES\""));

        let parsed = Primary::from_xml(&xml)?;
        assert_eq!(parsed.count, 1);
        let package = &parsed.packages[0];
        assert_eq!(package.name, "foo");
        assert_eq!(package.version.epoch, 2);
        assert_eq!(package.description, "Does foo & bar.");
        assert_eq!(package.size.package, 17);
        assert_eq!(package.location.href, "x86_64/foo-1.0-1.x86_64.rpm");
        assert_eq!(
            ContentDigest::try_from(package.checksum.clone())?,
            identity.checksum
        );
        assert!(package.format.is_none());

        Ok(())
    }

    #[test]
    fn format_round_trips() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let path = td.path().join("foo-1.0-1.noarch.rpm");
        std::fs::write(&path, b"foo").map_err(|e| RpmRepositoryError::io_path(&path, e))?;

        let identity = PackageIdentity::from_header(
            PackageHeader {
                name: "foo".into(),
                arch: "noarch".into(),
                version: "1.0".into(),
                epoch: 0,
                release: "1".into(),
            },
            &path,
        )?;

        let mut package = Package::from_identity(&identity, "noarch/foo-1.0-1.noarch.rpm")?;
        package.format = Some(PackageFormat {
            license: Some("MIT".to_string()),
            vendor: None,
            group: Some("Development/Tools".to_string()),
            build_host: None,
            source_rpm: Some("foo-1.0-1.src.rpm".to_string()),
            provides: Some(Entries {
                entries: vec![PackageEntry {
                    name: "foo".to_string(),
                    flags: Some("EQ".to_string()),
                    epoch: Some(0),
                    version: Some("1.0".to_string()),
                    release: Some("1".to_string()),
                }],
            }),
            requires: None,
        });

        let mut primary = Primary::default();
        primary.add_package(package);

        let mut buf = vec![];
        primary.render_to(&mut buf, 2)?;
        let xml = String::from_utf8_lossy(&buf).to_string();
        assert!(xml.contains("<rpm:license>MIT</rpm:license>"));
        assert!(xml.contains("<rpm:entry name=\"foo\" flags=\"EQ\" epoch=\"0\" ver=\"1.0\" rel=\"1\""));
        assert!(!xml.contains("rpm:vendor"));
        assert!(!xml.contains("rpm:requires"));

        let parsed = Primary::from_xml(&xml)?;
        let format = parsed.packages[0].format.clone().ok_or_else(|| {
            RpmRepositoryError::IndexMalformed("format element not parsed".to_string())
        })?;
        assert_eq!(format.license.as_deref(), Some("MIT"));
        assert_eq!(format.group.as_deref(), Some("Development/Tools"));
        assert_eq!(format.source_rpm.as_deref(), Some("foo-1.0-1.src.rpm"));
        assert!(format.vendor.is_none());
        let provides = format.provides.map(|p| p.entries).unwrap_or_default();
        assert_eq!(provides.len(), 1);
        assert_eq!(provides[0].name, "foo");
        assert_eq!(provides[0].flags.as_deref(), Some("EQ"));

        Ok(())
    }
}
