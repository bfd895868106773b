// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Error type for this crate.
#[derive(Debug, Error)]
pub enum RpmRepositoryError {
    #[error("XML error: {0:?}")]
    Xml(#[from] serde_xml_rs::Error),

    #[error("XML read error: {0:?}")]
    XmlRead(#[from] xml::reader::Error),

    #[error("XML write error: {0:?}")]
    XmlWrite(#[from] xml::writer::Error),

    #[error("YAML error: {0:?}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("repository I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("invalid hex in content digest: {0}; {1:?}")]
    ContentDigestBadHex(String, hex::FromHexError),

    #[error("unknown content digest format: {0}")]
    UnknownDigestFormat(String),

    #[error("unknown field in repository index: {0}")]
    IndexUnknownField(String),

    #[error("repository index entry lacks required field: {0}")]
    IndexMissingField(&'static str),

    #[error("malformed repository index: {0}")]
    IndexMalformed(String),

    #[error("repository metadata entry not found: {0}")]
    MetadataFileNotFound(&'static str),

    #[error("digest mismatch on {path}: expected {expected}, got {got}")]
    DigestMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("error running {0}: {1:?}")]
    ExternalTool(String, std::io::Error),

    #[error("package inspection of {0} failed: {1}")]
    PackageInspection(String, String),

    #[error("could not generate signature {0}")]
    SignatureMissing(String),

    #[error("could not generate public key {0}")]
    PublicKeyMissing(String),

    #[error("update descriptor {0} is not a mapping of updates")]
    UpdateDescriptorShape(String),
}

impl RpmRepositoryError {
    /// Construct an [Self::IoPath] from anything path-like.
    pub fn io_path(path: impl AsRef<std::path::Path>, e: std::io::Error) -> Self {
        Self::IoPath(format!("{}", path.as_ref().display()), e)
    }
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, RpmRepositoryError>;
