// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package identities.

Metadata documents refer to packages by the content digest of the package
file. [PackageIdentity] carries that digest along with the header fields
needed to render package records. Header fields are obtained through a
[PackageInspector], which abstracts over how package headers are read.
*/

use {
    crate::{
        error::{Result, RpmRepositoryError},
        io::{ContentDigest, DigestFlavor},
    },
    log::debug,
    std::{
        ffi::OsString,
        fmt::{Display, Formatter},
        hash::{Hash, Hasher},
        path::{Path, PathBuf},
    },
};

/// `rpm --queryformat` argument producing the fields of a [PackageHeader].
const QUERY_FORMAT: &str = "%{NAME} %{ARCH} %{VERSION} %{EPOCH} %{RELEASE}";

/// Header fields of a package file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageHeader {
    pub name: String,
    pub arch: String,
    pub version: String,
    pub epoch: u64,
    pub release: String,
}

impl PackageHeader {
    /// Parse the output of `rpm -qp --queryformat` using [QUERY_FORMAT].
    ///
    /// An epoch of `(none)` is treated as `0`.
    pub fn from_query_output(s: &str) -> std::result::Result<Self, String> {
        let fields = s.split_whitespace().collect::<Vec<_>>();

        if fields.len() != 5 {
            return Err(format!("expected 5 header fields; got {:?}", s.trim()));
        }

        let epoch = match fields[3] {
            "(none)" => 0,
            value => value
                .parse::<u64>()
                .map_err(|e| format!("invalid epoch {}: {}", value, e))?,
        };

        Ok(Self {
            name: fields[0].to_string(),
            arch: fields[1].to_string(),
            version: fields[2].to_string(),
            epoch,
            release: fields[4].to_string(),
        })
    }
}

/// Identifies a package file by its content digest.
///
/// Equality and hashing only consider [Self::checksum]: byte-identical package
/// files at different paths are the same identity.
#[derive(Clone, Debug)]
pub struct PackageIdentity {
    pub name: String,
    pub arch: String,
    pub version: String,
    pub epoch: u64,
    pub release: String,
    /// SHA-1 of the package file.
    pub checksum: ContentDigest,
    /// Where the package file was read from.
    pub path: PathBuf,
}

impl PackageIdentity {
    /// Construct an instance from header fields, digesting the file at `path`.
    pub fn from_header(header: PackageHeader, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let checksum = ContentDigest::digest_path(DigestFlavor::Sha1, path)?;

        Ok(Self::with_checksum(header, checksum, path))
    }

    /// Construct an instance from header fields and an already computed digest.
    pub fn with_checksum(
        header: PackageHeader,
        checksum: ContentDigest,
        path: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: header.name,
            arch: header.arch,
            version: header.version,
            epoch: header.epoch,
            release: header.release,
            checksum,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The `pkgid` value used in metadata documents.
    pub fn pkgid(&self) -> String {
        self.checksum.digest_hex()
    }

    /// File name component of the package path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.checksum == other.checksum
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.checksum.hash(state)
    }
}

impl Display for PackageIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}({})",
            self.name,
            self.version,
            self.release,
            self.arch,
            self.pkgid()
        )
    }
}

/// Resolves the identity of a package file.
pub trait PackageInspector {
    /// Read the package at `path` and derive its identity.
    fn inspect(&self, path: &Path) -> Result<PackageIdentity>;
}

/// A [PackageInspector] that queries headers with the `rpm` executable.
#[derive(Clone, Debug)]
pub struct RpmCommandInspector {
    rpm_exe: PathBuf,
}

impl Default for RpmCommandInspector {
    fn default() -> Self {
        Self {
            rpm_exe: PathBuf::from("rpm"),
        }
    }
}

impl RpmCommandInspector {
    /// Construct an instance invoking the `rpm` executable at the given path.
    pub fn new(rpm_exe: impl AsRef<Path>) -> Self {
        Self {
            rpm_exe: rpm_exe.as_ref().to_path_buf(),
        }
    }
}

impl PackageInspector for RpmCommandInspector {
    fn inspect(&self, path: &Path) -> Result<PackageIdentity> {
        debug!("reading {} header information", path.display());

        let args: Vec<OsString> = vec![
            "-qp".into(),
            "--queryformat".into(),
            QUERY_FORMAT.into(),
            path.as_os_str().to_owned(),
        ];

        let output = duct::cmd(&self.rpm_exe, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                RpmRepositoryError::ExternalTool(format!("{}", self.rpm_exe.display()), e)
            })?;

        if !output.status.success() {
            return Err(RpmRepositoryError::PackageInspection(
                format!("{}", path.display()),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let header = PackageHeader::from_query_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| RpmRepositoryError::PackageInspection(format!("{}", path.display()), e))?;

        PackageIdentity::from_header(header, path)
    }
}
