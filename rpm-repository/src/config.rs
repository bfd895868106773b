// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository configuration. */

use {
    crate::error::{Result, RpmRepositoryError},
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

fn default_indent() -> usize {
    2
}

/// Settings for a [crate::repository::Repository].
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Repository root. An existing `repodata/repomd.xml` under it is read.
    pub dir: PathBuf,

    /// Where `repodata/` is written. Defaults to [Self::dir].
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Spaces per nesting level in written XML.
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Directory for temporary files of atomic writes.
    ///
    /// Must be on the same filesystem as the output. Defaults to the
    /// destination directory.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Drop index entries of document kinds that are empty in this run.
    ///
    /// When false, such entries are kept as-is.
    #[serde(default)]
    pub prune_empty_documents: bool,

    /// Seconds after which clients should consider the metadata expired.
    #[serde(default)]
    pub expire: Option<u64>,

    /// Products the repository is tagged with.
    #[serde(default)]
    pub repo_products: Vec<String>,

    /// Keywords the repository is tagged with.
    #[serde(default)]
    pub repo_keywords: Vec<String>,

    /// Key used to sign the index.
    #[serde(default)]
    pub sign_key: Option<String>,

    /// Directory scanned for `*.update` descriptors.
    #[serde(default)]
    pub updates_dir: Option<PathBuf>,

    /// Whether to add every package under [Self::dir] to `primary.xml`.
    #[serde(default)]
    pub primary: bool,

    /// Whether to index `*.delta.rpm` files in `deltainfo.xml`.
    #[serde(default)]
    pub deltas: bool,

    /// Whether to attach `*.eula` files to packages.
    #[serde(default)]
    pub eulas: bool,

    /// Whether to tag packages with keywords from `*.keywords` files.
    #[serde(default)]
    pub keywords: bool,

    /// Directory each update is additionally written to as its own file.
    #[serde(default)]
    pub split_updates: Option<PathBuf>,

    /// Default issuer of updates.
    #[serde(default)]
    pub update_issuer: Option<String>,
}

impl RepositoryConfig {
    /// Construct an instance with defaults for a repository root.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            output_dir: None,
            indent: default_indent(),
            staging_dir: None,
            prune_empty_documents: false,
            expire: None,
            repo_products: vec![],
            repo_keywords: vec![],
            sign_key: None,
            updates_dir: None,
            primary: false,
            deltas: false,
            eulas: false,
            keywords: false,
            split_updates: None,
            update_issuer: None,
        }
    }

    /// Load an instance from a YAML file.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;

        Ok(serde_yaml::from_reader(std::io::BufReader::new(fh))?)
    }

    /// The directory `repodata/` is written to.
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.dir)
    }
}
