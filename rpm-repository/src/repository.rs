// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository orchestration.

A [Repository] owns the index and one instance of every extension document kind.
Its lifecycle is linear:

1. [Repository::new()] reads an existing `repodata/repomd.xml` so entries this run
   doesn't touch are preserved.
2. Callers populate documents through the `*_mut()` accessors or
   [Repository::scan()].
3. [Repository::write()] writes every non-empty document, then the index, and
   yields a [PublishedRepository].
4. [PublishedRepository::sign()] optionally signs the index.

A repository can't be written twice. Construct a new one to start over.
*/

use {
    crate::{
        config::RepositoryConfig,
        document::ExtensionDocument,
        error::{Result, RpmRepositoryError},
        io::{gzip_encoder, read_decompressed, write_atomic, Compression, ContentDigest, ContentValidatingReader},
        metadata::{
            deltainfo::DeltaInfo,
            filelists::FileLists,
            other::Other,
            primary::{Package, Primary},
            repomd::RepoMd,
            susedata::{find_files_with_extension, relative_href, SuseData},
            suseinfo::SuseInfo,
            updateinfo::UpdateInfo,
        },
        package::{PackageIdentity, PackageInspector},
        signing::{sign_index, IndexSignature, IndexSigner},
    },
    log::{info, warn},
    std::path::{Path, PathBuf},
};

/// Name of the directory holding metadata files.
pub const REPODATA_DIR: &str = "repodata";

/// Name of the index file.
pub const INDEX_FILE_NAME: &str = "repomd.xml";

fn index_path(root: &Path) -> PathBuf {
    root.join(REPODATA_DIR).join(INDEX_FILE_NAME)
}

/// Find, verify and parse `primary.xml` of the repository at `root`.
fn read_primary_from(root: &Path, index: &RepoMd) -> Result<Primary> {
    let resource = index
        .resource_by_kind("primary")
        .ok_or(RpmRepositoryError::MetadataFileNotFound("primary"))?;
    let path = root.join(&resource.location);

    let got = ContentDigest::digest_path(resource.checksum.digest_type(), &path)?;
    if got != resource.checksum {
        return Err(RpmRepositoryError::DigestMismatch {
            path: format!("{}", path.display()),
            expected: resource.checksum.digest_hex(),
            got: got.digest_hex(),
        });
    }

    let fh = std::fs::File::open(&path).map_err(|e| RpmRepositoryError::io_path(&path, e))?;
    let reader = ContentValidatingReader::new(
        read_decompressed(std::io::BufReader::new(fh), Compression::from_path(&path)),
        resource.open_checksum.clone(),
    );

    Primary::from_reader(reader)
}

/// Inspect every package file under `dir`, skipping delta RPMs.
fn scan_packages(dir: &Path, inspector: &dyn PackageInspector) -> Result<Vec<PackageIdentity>> {
    let mut packages = vec![];

    for path in find_files_with_extension(dir, "rpm")? {
        if path.to_string_lossy().ends_with(".delta.rpm") {
            continue;
        }

        packages.push(inspector.inspect(&path)?);
    }

    Ok(packages)
}

/// A repository being assembled.
pub struct Repository {
    config: RepositoryConfig,
    index: RepoMd,
    primary: Primary,
    filelists: FileLists,
    other: Other,
    updateinfo: UpdateInfo,
    susedata: SuseData,
    suseinfo: SuseInfo,
    deltainfo: DeltaInfo,
}

impl Repository {
    /// Construct an instance, reading the existing index under [RepositoryConfig::dir].
    ///
    /// A missing index is not an error. A malformed one is.
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        let path = index_path(&config.dir);

        let index = if path.exists() {
            info!("reading existing index {}", path.display());
            RepoMd::from_path(&path)?
        } else {
            RepoMd::default()
        };

        let mut suseinfo = SuseInfo::default();
        suseinfo.expire = config.expire;
        for keyword in &config.repo_keywords {
            suseinfo.add_keyword(keyword);
        }
        for product in &config.repo_products {
            suseinfo.add_product(product);
        }

        let updateinfo = match &config.update_issuer {
            Some(issuer) => UpdateInfo::new(issuer),
            None => UpdateInfo::default(),
        };

        Ok(Self {
            config,
            index,
            primary: Primary::default(),
            filelists: FileLists::default(),
            other: Other::default(),
            updateinfo,
            susedata: SuseData::default(),
            suseinfo,
            deltainfo: DeltaInfo::default(),
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The index as read from disk plus any resources added since.
    pub fn index(&self) -> &RepoMd {
        &self.index
    }

    pub fn primary_mut(&mut self) -> &mut Primary {
        &mut self.primary
    }

    pub fn filelists_mut(&mut self) -> &mut FileLists {
        &mut self.filelists
    }

    pub fn other_mut(&mut self) -> &mut Other {
        &mut self.other
    }

    pub fn updateinfo_mut(&mut self) -> &mut UpdateInfo {
        &mut self.updateinfo
    }

    pub fn susedata_mut(&mut self) -> &mut SuseData {
        &mut self.susedata
    }

    pub fn suseinfo_mut(&mut self) -> &mut SuseInfo {
        &mut self.suseinfo
    }

    pub fn deltainfo_mut(&mut self) -> &mut DeltaInfo {
        &mut self.deltainfo
    }

    /// Populate documents from files on disk as requested by the configuration.
    ///
    /// Packages are added to `primary.xml` when [RepositoryConfig::primary] is set and
    /// delta RPMs are indexed when [RepositoryConfig::deltas] is set. EULAs and
    /// keyword files are attached when [RepositoryConfig::eulas] and
    /// [RepositoryConfig::keywords] are set. Update descriptors are loaded from
    /// [RepositoryConfig::updates_dir].
    pub fn scan(&mut self, inspector: &dyn PackageInspector) -> Result<()> {
        if self.config.primary || self.config.deltas {
            let packages = scan_packages(&self.config.dir, inspector)?;

            if self.config.primary {
                for package in &packages {
                    let href = relative_href(&self.config.dir, &package.path);
                    self.primary.add_package(Package::from_identity(package, href)?);
                }
                info!("added {} package(s) to primary", packages.len());
            }

            if self.config.deltas {
                let count = self.deltainfo.add_deltas(&self.config.dir, &packages)?;
                info!("indexed {} delta(s)", count);
            }
        }

        if self.config.keywords {
            let count = self.susedata.add_keyword_files(&self.config.dir, inspector)?;
            info!("tagged {} package(s) with keywords", count);
        }

        if self.config.eulas {
            let count = self.susedata.add_eulas(&self.config.dir, inspector)?;
            info!("attached {} eula(s)", count);
        }

        if let Some(dir) = &self.config.updates_dir {
            let count = self.updateinfo.add_updates(dir)?;
            info!("loaded {} update(s)", count);
        }

        Ok(())
    }

    /// Read `primary.xml` referenced by the index read at construction.
    ///
    /// The stored file is verified against the index checksum before parsing.
    pub fn read_primary(&self) -> Result<Primary> {
        read_primary_from(&self.config.dir, &self.index)
    }

    /// Write all documents and the index.
    ///
    /// Documents are written in a fixed order. The index is written last so every
    /// entry it contains refers to a file already on disk. Any failure aborts before
    /// the index is written.
    pub fn write(self) -> Result<PublishedRepository> {
        let Self {
            config,
            mut index,
            primary,
            filelists,
            other,
            updateinfo,
            susedata,
            suseinfo,
            deltainfo,
        } = self;

        let writer = DocumentWriter {
            output_dir: config.output_dir(),
            staging_dir: config.staging_dir.as_deref(),
            indent: config.indent,
            prune_empty_documents: config.prune_empty_documents,
        };

        let documents: [&dyn ExtensionDocument; 7] = [
            &primary,
            &filelists,
            &other,
            &updateinfo,
            &susedata,
            &suseinfo,
            &deltainfo,
        ];

        for document in documents {
            writer.write_document(&mut index, document)?;
        }

        if let Some(dir) = &config.split_updates {
            let paths = updateinfo.write_split(dir, writer.staging_dir, config.indent)?;
            info!("wrote {} update file(s) to {}", paths.len(), dir.display());
        }

        let path = index_path(writer.output_dir);
        let dir = writer.output_dir.join(REPODATA_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| RpmRepositoryError::io_path(&dir, e))?;

        info!("saving index {}", path.display());
        write_atomic(&path, writer.staging_dir, |w| index.write_to(w, config.indent))?;

        Ok(PublishedRepository {
            output_dir: writer.output_dir.to_path_buf(),
            index_path: path,
            index,
        })
    }
}

/// Writes extension documents under `<output_dir>/repodata/`.
struct DocumentWriter<'a> {
    output_dir: &'a Path,
    staging_dir: Option<&'a Path>,
    indent: usize,
    prune_empty_documents: bool,
}

impl<'a> DocumentWriter<'a> {
    fn write_document(&self, index: &mut RepoMd, document: &dyn ExtensionDocument) -> Result<()> {
        if document.is_empty() {
            return self.handle_empty(index, document.kind());
        }

        let file_name = format!("{}{}", document.file_name(), Compression::Gzip.extension());
        let location = format!("{}/{}", REPODATA_DIR, file_name);
        let dir = self.output_dir.join(REPODATA_DIR);
        let dest = dir.join(&file_name);

        std::fs::create_dir_all(&dir).map_err(|e| RpmRepositoryError::io_path(&dir, e))?;

        info!("saving {}", dest.display());
        write_atomic(&dest, self.staging_dir, |w| {
            let mut encoder = gzip_encoder(w);
            document.render_to(&mut encoder, self.indent)?;
            encoder
                .finish()
                .map_err(|e| RpmRepositoryError::io_path(&dest, e))?
                .flush()
                .map_err(|e| RpmRepositoryError::io_path(&dest, e))
        })?;

        info!("adding {} to index", location);
        index.add_file_resource(&location, &dest, Some(document.kind()))
    }

    /// Apply the stale entry policy to a document kind with nothing to write.
    fn handle_empty(&self, index: &mut RepoMd, kind: &str) -> Result<()> {
        let stale = index
            .resources()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.location.clone())
            .collect::<Vec<_>>();

        for location in stale {
            if !self.prune_empty_documents {
                warn!("{} is empty; keeping existing index entry {}", kind, location);
                continue;
            }

            index.remove_resource(&location);

            let path = self.output_dir.join(&location);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| RpmRepositoryError::io_path(&path, e))?;
            }
            info!("{} is empty; removed {}", kind, location);
        }

        Ok(())
    }
}

/// A repository whose documents and index are on disk.
#[derive(Clone, Debug)]
pub struct PublishedRepository {
    output_dir: PathBuf,
    index_path: PathBuf,
    index: RepoMd,
}

impl PublishedRepository {
    /// The index as written.
    pub fn index(&self) -> &RepoMd {
        &self.index
    }

    /// Path of the written `repomd.xml`.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Read back the written `primary.xml`.
    pub fn read_primary(&self) -> Result<Primary> {
        read_primary_from(&self.output_dir, &self.index)
    }

    /// Sign the index, producing `repomd.xml.asc` and `repomd.xml.key` next to it.
    pub fn sign(&self, key_id: &str, signer: &dyn IndexSigner) -> Result<IndexSignature> {
        sign_index(signer, key_id, &self.index_path)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            io::DigestFlavor, metadata::repomd::RepoMdResource, package::PackageHeader,
            signing::test::FakeSigner,
        },
        indoc::indoc,
        std::io::Write,
    };

    fn package(dir: &Path, name: &str) -> Result<PackageIdentity> {
        let path = dir.join(format!("{}-1.0-1.noarch.rpm", name));
        std::fs::write(&path, format!("{} package", name))
            .map_err(|e| RpmRepositoryError::io_path(&path, e))?;

        PackageIdentity::from_header(
            PackageHeader {
                name: name.to_string(),
                arch: "noarch".to_string(),
                version: "1.0".to_string(),
                epoch: 0,
                release: "1".to_string(),
            },
            &path,
        )
    }

    /// Derives headers from `name-1.0-1.noarch.rpm` file names.
    struct NoarchInspector;

    impl PackageInspector for NoarchInspector {
        fn inspect(&self, path: &Path) -> Result<PackageIdentity> {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();

            PackageIdentity::from_header(
                PackageHeader {
                    name: file_name.rsplitn(3, '-').nth(2).unwrap_or_default().to_string(),
                    arch: "noarch".to_string(),
                    version: "1.0".to_string(),
                    epoch: 0,
                    release: "1".to_string(),
                },
                path,
            )
        }
    }

    fn temp_dir() -> Result<tempfile::TempDir> {
        tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))
    }

    #[test]
    fn empty_repository_writes_only_index() -> Result<()> {
        let td = temp_dir()?;

        let published = Repository::new(RepositoryConfig::new(td.path()))?.write()?;

        assert!(published.index().is_empty());
        assert!(published.index_path().exists());

        let entries = std::fs::read_dir(td.path().join(REPODATA_DIR))
            .map_err(|e| RpmRepositoryError::io_path(td.path(), e))?
            .count();
        assert_eq!(entries, 1);

        Ok(())
    }

    #[test]
    fn write_registers_documents() -> Result<()> {
        let td = temp_dir()?;
        let foo = package(td.path(), "foo")?;

        let mut repo = Repository::new(RepositoryConfig::new(td.path()))?;
        repo.primary_mut()
            .add_package(Package::from_identity(&foo, foo.file_name())?);
        repo.susedata_mut().add_eula(&foo, "You agree.");
        repo.suseinfo_mut().add_keyword("testing");

        let published = repo.write()?;
        let index = published.index();

        assert_eq!(
            index
                .resources()
                .iter()
                .map(|r| r.location.as_str())
                .collect::<Vec<_>>(),
            vec![
                "repodata/primary.xml.gz",
                "repodata/susedata.xml.gz",
                "repodata/suseinfo.xml.gz"
            ]
        );

        for resource in index.resources() {
            let path = td.path().join(&resource.location);
            assert_eq!(
                ContentDigest::digest_path(DigestFlavor::Sha1, &path)?,
                resource.checksum
            );
            assert_eq!(
                ContentDigest::digest_path_decompressed(DigestFlavor::Sha1, &path, Compression::Gzip)?,
                resource.open_checksum
            );
            assert_ne!(resource.checksum, resource.open_checksum);
        }

        let reread = RepoMd::from_path(published.index_path())?;
        assert_eq!(reread.len(), 3);
        assert!(!td.path().join("repodata/filelists.xml.gz").exists());

        let primary = published.read_primary()?;
        assert_eq!(primary.packages[0].name, "foo");

        Ok(())
    }

    #[test]
    fn output_is_reproducible() -> Result<()> {
        let td = temp_dir()?;
        let foo = package(td.path(), "foo")?;

        let mut checksums = vec![];
        for _ in 0..2 {
            let mut repo = Repository::new(RepositoryConfig::new(td.path()))?;
            repo.susedata_mut().add_eula(&foo, "You agree.");
            let published = repo.write()?;

            checksums.push(published.index().resources()[0].clone().checksum);
        }

        assert_eq!(checksums[0], checksums[1]);

        Ok(())
    }

    fn write_stale_index(root: &Path) -> Result<PathBuf> {
        let repodata = root.join(REPODATA_DIR);
        std::fs::create_dir_all(&repodata).map_err(|e| RpmRepositoryError::io_path(&repodata, e))?;

        let stale = repodata.join("updateinfo.xml.gz");
        let fh = std::fs::File::create(&stale).map_err(|e| RpmRepositoryError::io_path(&stale, e))?;
        let mut encoder = gzip_encoder(fh);
        encoder
            .write_all(b"<updates/>")
            .map_err(|e| RpmRepositoryError::io_path(&stale, e))?;
        encoder
            .finish()
            .map_err(|e| RpmRepositoryError::io_path(&stale, e))?;

        let mut index = RepoMd::default();
        index.add_file_resource("repodata/updateinfo.xml.gz", &stale, None)?;
        index.add_resource(RepoMdResource {
            kind: "patterns".to_string(),
            location: "repodata/patterns.xml".to_string(),
            checksum: ContentDigest::sha1_hex("f572d396fae9206628714fb2ce00f72e94f2258f")?,
            timestamp: 1,
            open_checksum: ContentDigest::sha1_hex("f572d396fae9206628714fb2ce00f72e94f2258f")?,
        });

        let index_path = repodata.join(INDEX_FILE_NAME);
        std::fs::write(&index_path, index.to_xml(2)?)
            .map_err(|e| RpmRepositoryError::io_path(&index_path, e))?;

        Ok(stale)
    }

    #[test]
    fn stale_entries_kept_by_default() -> Result<()> {
        let td = temp_dir()?;
        let stale = write_stale_index(td.path())?;

        let repo = Repository::new(RepositoryConfig::new(td.path()))?;
        assert_eq!(repo.index().len(), 2);
        let before = repo
            .index()
            .resource_by_kind("updateinfo")
            .map(|r| r.checksum.clone());
        assert!(before.is_some());

        let published = repo.write()?;
        assert_eq!(published.index().len(), 2);
        assert!(published.index().resource("repodata/patterns.xml").is_some());
        assert_eq!(
            published
                .index()
                .resource_by_kind("updateinfo")
                .map(|r| r.checksum.clone()),
            before
        );
        assert!(stale.exists());

        Ok(())
    }

    #[test]
    fn stale_entries_pruned() -> Result<()> {
        let td = temp_dir()?;
        let stale = write_stale_index(td.path())?;

        let mut config = RepositoryConfig::new(td.path());
        config.prune_empty_documents = true;

        let published = Repository::new(config)?.write()?;
        assert_eq!(published.index().len(), 1);
        assert!(published.index().resource_by_kind("updateinfo").is_none());
        // Kinds this crate doesn't produce are never pruned.
        assert!(published.index().resource("repodata/patterns.xml").is_some());
        assert!(!stale.exists());

        Ok(())
    }

    #[test]
    fn malformed_index_rejected() -> Result<()> {
        let td = temp_dir()?;
        let repodata = td.path().join(REPODATA_DIR);
        std::fs::create_dir_all(&repodata).map_err(|e| RpmRepositoryError::io_path(&repodata, e))?;
        let path = repodata.join(INDEX_FILE_NAME);
        std::fs::write(
            &path,
            indoc! {r#"
                <?xml version="1.0" encoding="UTF-8"?>
                <repomd xmlns="http://linux.duke.edu/metadata/repo">
                  <data type="primary">
                    <location href="repodata/primary.xml.gz"/>
                    <size>42</size>
                  </data>
                </repomd>
            "#},
        )
        .map_err(|e| RpmRepositoryError::io_path(&path, e))?;

        assert!(matches!(
            Repository::new(RepositoryConfig::new(td.path())),
            Err(RpmRepositoryError::IndexUnknownField(_))
        ));

        Ok(())
    }

    #[test]
    fn read_primary_verifies() -> Result<()> {
        let td = temp_dir()?;

        let repo = Repository::new(RepositoryConfig::new(td.path()))?;
        assert!(matches!(
            repo.read_primary(),
            Err(RpmRepositoryError::MetadataFileNotFound("primary"))
        ));

        let foo = package(td.path(), "foo")?;
        let mut repo = Repository::new(RepositoryConfig::new(td.path()))?;
        repo.primary_mut()
            .add_package(Package::from_identity(&foo, foo.file_name())?);
        repo.write()?;

        let repo = Repository::new(RepositoryConfig::new(td.path()))?;
        assert_eq!(repo.read_primary()?.count, 1);

        let path = td.path().join("repodata/primary.xml.gz");
        std::fs::write(&path, b"tampered").map_err(|e| RpmRepositoryError::io_path(&path, e))?;
        assert!(matches!(
            repo.read_primary(),
            Err(RpmRepositoryError::DigestMismatch { .. })
        ));

        Ok(())
    }

    #[test]
    fn separate_output_dir() -> Result<()> {
        let source = temp_dir()?;
        let output = temp_dir()?;
        let foo = package(source.path(), "foo")?;

        let mut config = RepositoryConfig::new(source.path());
        config.output_dir = Some(output.path().to_path_buf());
        config.staging_dir = Some(output.path().to_path_buf());

        let mut repo = Repository::new(config)?;
        repo.susedata_mut().add_eula(&foo, "You agree.");
        let published = repo.write()?;

        assert_eq!(published.output_dir(), output.path());
        assert!(output.path().join("repodata/susedata.xml.gz").exists());
        assert!(!source.path().join(REPODATA_DIR).exists());

        Ok(())
    }

    #[test]
    fn sign_published() -> Result<()> {
        let td = temp_dir()?;
        let published = Repository::new(RepositoryConfig::new(td.path()))?.write()?;

        let signature = published.sign("ABCD1234", &FakeSigner::default())?;
        assert_eq!(
            signature.signature_path,
            td.path().join("repodata/repomd.xml.asc")
        );
        assert!(signature.public_key_path.exists());

        let failing = FakeSigner {
            skip_signature: true,
            ..Default::default()
        };
        assert!(matches!(
            published.sign("ABCD1234", &failing),
            Err(RpmRepositoryError::SignatureMissing(_))
        ));

        Ok(())
    }

    #[test]
    fn config_seeds_documents() -> Result<()> {
        let td = temp_dir()?;
        let mut config = RepositoryConfig::new(td.path());
        config.expire = Some(3600);
        config.repo_keywords = vec!["b".to_string(), "a".to_string()];

        let mut repo = Repository::new(config)?;
        assert_eq!(repo.suseinfo_mut().expire, Some(3600));
        assert_eq!(repo.suseinfo_mut().keywords().collect::<Vec<_>>(), vec!["a", "b"]);

        let published = repo.write()?;
        assert!(published.index().resource_by_kind("suseinfo").is_some());

        Ok(())
    }

    #[test]
    fn scan_populates_documents() -> Result<()> {
        let td = temp_dir()?;
        let root = td.path();
        let noarch = root.join("noarch");
        let updates = root.join("updates");
        for dir in [&noarch, &updates] {
            std::fs::create_dir_all(dir).map_err(|e| RpmRepositoryError::io_path(dir, e))?;
        }

        let foo = package(&noarch, "foo")?;
        package(&noarch, "bar")?;
        for (path, content) in [
            (noarch.join("foo-0.9_1.0-1_1.noarch.delta.rpm"), "delta"),
            (noarch.join("foo.keywords"), "support_l3\n"),
            (
                updates.join("fix.update"),
                "security-fix-42:\n  description: fixes CVE-2021-0001\n  packages:\n    - name: foo\n      arch: noarch\n",
            ),
        ] {
            std::fs::write(&path, content).map_err(|e| RpmRepositoryError::io_path(&path, e))?;
        }

        let mut config = RepositoryConfig::new(root);
        config.primary = true;
        config.deltas = true;
        config.keywords = true;
        config.updates_dir = Some(updates);
        config.split_updates = Some(root.join("split"));

        let mut repo = Repository::new(config)?;
        repo.scan(&NoarchInspector)?;

        assert_eq!(repo.primary_mut().count, 2);
        assert_eq!(
            repo.primary_mut()
                .packages
                .iter()
                .map(|p| p.location.href.as_str())
                .collect::<Vec<_>>(),
            vec!["noarch/bar-1.0-1.noarch.rpm", "noarch/foo-1.0-1.noarch.rpm"]
        );
        assert_eq!(repo.deltainfo_mut().deltas(&foo).map(|d| d.len()), Some(1));
        assert!(repo.susedata_mut().data().properties(&foo).is_some());
        assert_eq!(repo.updateinfo_mut().updates()[0].id(), "foo");

        let published = repo.write()?;
        for kind in ["primary", "updateinfo", "susedata", "deltainfo"] {
            assert!(published.index().resource_by_kind(kind).is_some());
        }
        assert!(root.join("split/update-foo-1.xml").is_file());

        Ok(())
    }
}
