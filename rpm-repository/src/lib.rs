// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository metadata generation.

This crate writes the metadata describing an RPM package repository.

Under the repository root is a `repodata` directory containing a `repomd.xml`
file. This `repomd.xml` file (represented by [metadata::repomd::RepoMd]) is the
index of the other _metadata_ files of the repository. Each of those files is an
_extension document_ (see [document::ExtensionDocument]) stored gzip compressed
as `repodata/<kind>.xml.gz`.

[repository::Repository] ties everything together. It reads an existing index,
lets callers populate every document kind, writes the documents and the index and
optionally signs the index through a [signing::IndexSigner].

```no_run
use rpm_repository::{
    config::RepositoryConfig,
    package::RpmCommandInspector,
    repository::Repository,
    signing::GpgSigner,
};

let mut config = RepositoryConfig::new("/srv/repo");
config.eulas = true;

let mut repo = Repository::new(config)?;
repo.scan(&RpmCommandInspector::default())?;
repo.suseinfo_mut().add_keyword("testing");

let published = repo.write()?;
published.sign("ABCD1234", &GpgSigner::default())?;
# Ok::<(), rpm_repository::RpmRepositoryError>(())
```

Package files are identified by [package::PackageIdentity], whose identity is the
content digest of the file. Header fields come from a [package::PackageInspector].

Rebuilds of the same output directory must not run concurrently. Nothing here
guards against interleaved writers.
*/

pub mod config;
pub mod document;
pub mod error;
pub mod io;
pub mod metadata;
pub mod package;
pub mod repository;
pub mod signing;

pub use crate::error::{Result, RpmRepositoryError};
