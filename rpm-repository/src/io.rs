// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers.

Content digests, compression and atomic file replacement used by the
metadata writers.
*/

use {
    crate::error::{Result, RpmRepositoryError},
    digest::DynDigest,
    flate2::{read::GzDecoder, write::GzEncoder, GzBuilder},
    std::{
        fmt::Formatter,
        io::{Read, Write},
        path::Path,
    },
};

/// Compression format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
}

impl Compression {
    /// Infer the compression of a file from its path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension() {
            Some(ext) if ext == "gz" => Self::Gzip,
            _ => Self::None,
        }
    }

    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
        }
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed<'a>(stream: impl Read + 'a, compression: Compression) -> Box<dyn Read + 'a> {
    match compression {
        Compression::None => Box::new(stream),
        Compression::Gzip => Box::new(GzDecoder::new(stream)),
    }
}

/// Obtain a gzip encoder whose output only depends on the written content.
///
/// The header carries no file name and a zero modification time.
pub fn gzip_encoder<W: Write>(writer: W) -> GzEncoder<W> {
    GzBuilder::new()
        .mtime(0)
        .write(writer, flate2::Compression::default())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestFlavor {
    Sha1,
    Sha256,
}

impl DigestFlavor {
    /// Create a new hasher for this flavor.
    pub fn new_hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
        }
    }

    /// The value of the `type` attribute used for this flavor in metadata files.
    ///
    /// SHA-1 is written as `sha`, which yum and zypper both understand.
    pub fn metadata_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha",
            Self::Sha256 => "sha256",
        }
    }

    /// Resolve a flavor from a `type` attribute value.
    pub fn from_metadata_name(name: &str) -> Result<Self> {
        match name {
            "sha" | "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            name => Err(RpmRepositoryError::UnknownDigestFormat(name.to_string())),
        }
    }
}

/// Represents a content digest.
#[derive(Clone, Eq, Hash, PartialEq, PartialOrd)]
pub enum ContentDigest {
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Create a new SHA-1 instance by parsing a hex digest.
    pub fn sha1_hex(digest: &str) -> Result<Self> {
        Self::from_hex_digest(DigestFlavor::Sha1, digest)
    }

    /// Create a new SHA-256 instance by parsing a hex digest.
    pub fn sha256_hex(digest: &str) -> Result<Self> {
        Self::from_hex_digest(DigestFlavor::Sha256, digest)
    }

    /// Obtain an instance by parsing a hex string as a [DigestFlavor].
    pub fn from_hex_digest(flavor: DigestFlavor, digest: &str) -> Result<Self> {
        let digest = hex::decode(digest.trim())
            .map_err(|e| RpmRepositoryError::ContentDigestBadHex(digest.to_string(), e))?;

        Ok(Self::from_digest_bytes(flavor, digest))
    }

    /// Obtain an instance from a metadata `type` attribute and hex digest text.
    pub fn from_metadata(type_name: &str, digest: &str) -> Result<Self> {
        Self::from_hex_digest(DigestFlavor::from_metadata_name(type_name)?, digest)
    }

    fn from_digest_bytes(flavor: DigestFlavor, digest: Vec<u8>) -> Self {
        match flavor {
            DigestFlavor::Sha1 => Self::Sha1(digest),
            DigestFlavor::Sha256 => Self::Sha256(digest),
        }
    }

    /// Compute the digest of all content in a reader.
    pub fn digest_reader(flavor: DigestFlavor, mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = flavor.new_hasher();
        let mut buf = [0u8; 16384];

        loop {
            let size = reader.read(&mut buf)?;
            if size == 0 {
                break;
            }

            hasher.update(&buf[0..size]);
        }

        Ok(Self::from_digest_bytes(flavor, hasher.finalize().to_vec()))
    }

    /// Compute the digest of a file's stored bytes.
    pub fn digest_path(flavor: DigestFlavor, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;

        Self::digest_reader(flavor, std::io::BufReader::new(fh))
            .map_err(|e| RpmRepositoryError::io_path(path, e))
    }

    /// Compute the digest of a file's content after decompression.
    pub fn digest_path_decompressed(
        flavor: DigestFlavor,
        path: impl AsRef<Path>,
        compression: Compression,
    ) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;

        Self::digest_reader(
            flavor,
            read_decompressed(std::io::BufReader::new(fh), compression),
        )
        .map_err(|e| RpmRepositoryError::io_path(path, e))
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }

    /// Obtain the [DigestFlavor] for this digest.
    pub fn digest_type(&self) -> DigestFlavor {
        match self {
            Self::Sha1(_) => DigestFlavor::Sha1,
            Self::Sha256(_) => DigestFlavor::Sha256,
        }
    }
}

/// A reader that verifies the digest of its source once the source is exhausted.
///
/// The digest is only compared when the end of the stream is reached. Callers that
/// stop reading early get no integrity guarantee.
pub struct ContentValidatingReader<R> {
    hasher: Option<Box<dyn DynDigest + Send>>,
    expected_digest: ContentDigest,
    source: R,
}

impl<R> ContentValidatingReader<R> {
    pub fn new(source: R, expected_digest: ContentDigest) -> Self {
        Self {
            hasher: Some(expected_digest.digest_type().new_hasher()),
            expected_digest,
            source,
        }
    }
}

impl<R: Read> Read for ContentValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;

        if size > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[0..size]);
            }
        } else if let Some(hasher) = self.hasher.take() {
            let got_digest = hasher.finalize();

            if got_digest.as_ref() != self.expected_digest.digest_bytes() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "digest mismatch of read content: expected {}, got {}",
                        self.expected_digest.digest_hex(),
                        hex::encode(got_digest)
                    ),
                ));
            }
        }

        Ok(size)
    }
}

/// Write a file by staging it in a temporary file and renaming it into place.
///
/// The temporary file is created in `staging_dir` if given, otherwise next to `dest`.
/// A staging directory on a different filesystem than `dest` makes the final rename fail.
pub fn write_atomic<F>(dest: &Path, staging_dir: Option<&Path>, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let staging_dir = match staging_dir {
        Some(dir) => dir,
        None => dest.parent().unwrap_or_else(|| Path::new(".")),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".rpm-repository-")
        .tempfile_in(staging_dir)
        .map_err(|e| RpmRepositoryError::io_path(staging_dir, e))?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file_mut());
        f(&mut writer)?;
        writer
            .flush()
            .map_err(|e| RpmRepositoryError::io_path(dest, e))?;
    }

    temp.as_file()
        .sync_all()
        .map_err(|e| RpmRepositoryError::io_path(dest, e))?;

    // Temporary files are created owner-only; metadata must be readable by everyone.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(|e| RpmRepositoryError::io_path(temp.path(), e))?;
    }

    temp.persist(dest)
        .map_err(|e| RpmRepositoryError::io_path(dest, e.error))?;

    Ok(())
}
