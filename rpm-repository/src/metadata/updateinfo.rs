// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `updateinfo.xml` file format.

`updateinfo.xml` advertises maintenance updates (advisories). Each [Update] names the
packages it affects and links to external references such as bug reports and CVE
entries.

Updates can be read from YAML descriptor files (`*.update`). A descriptor is a mapping
of update keys to update fields:

```yaml
foo-fix:
  summary: Fix crash in foo
  type: recommended
  version: 2
  description: Fixes a crash on startup (bnc#654321).
  packages:
    - name: foo
      arch: x86_64
      version: "1.0"
      release: "2"
      filename: foo-1.0-2.x86_64.rpm
```
*/

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer, ExtensionDocument},
        error::{Result, RpmRepositoryError},
        io::write_atomic,
        metadata::susedata::find_files_with_extension,
        package::PackageIdentity,
    },
    log::info,
    once_cell::sync::Lazy,
    regex::Regex,
    serde::Deserialize,
    std::{
        fmt::{Display, Formatter},
        io::Write,
        path::{Path, PathBuf},
        time::{SystemTime, UNIX_EPOCH},
    },
    xml::writer::{EventWriter, XmlEvent},
};

static SECURITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"vulnerability|security|CVE|Secunia").expect("static regex should compile")
});

static RECOMMENDED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"fix|bnc#|bug|crash").expect("static regex should compile"));

static KDE3_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"kde(.+)3$").expect("static regex should compile"));

static KDE4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"kde(.+)4$").expect("static regex should compile"));

static CVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CVE-(\d{4}-\d+)").expect("static regex should compile"));

/// Bug tracker reference patterns.
///
/// Each entry is a pattern whose first participating capture group is the bug number,
/// the URL prefix the number is appended to and the title prefix.
static TRACKERS: Lazy<Vec<(Regex, &'static str, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)BNC:\s?(\d+)|bnc\s?#(\d+)|b\.n\.c (\d+)|n#(\d+)",
            "http://bugzilla.novell.com/",
            "bug number",
        ),
        (
            r"rh\s?#(\d+)|rhbz\s?#(\d+)",
            "http://bugzilla.redhat.com/",
            "Redhat's bug number",
        ),
        (
            r"bgo\s?#(\d+)|BGO\s?#(\d+)",
            "http://bugzilla.gnome.org/",
            "Gnome bug number",
        ),
        (
            r"kde\s?#(\d+)|KDE\s?#(\d+)",
            "http://bugs.kde.org/",
            "KDE bug number",
        ),
    ]
    .into_iter()
    .map(|(re, href, title)| {
        (
            Regex::new(re).expect("static regex should compile"),
            href,
            title,
        )
    })
    .collect()
});

/// Default issuer of updates: `$USER@$HOST`.
pub fn default_issuer() -> String {
    let user = std::env::var("USER").unwrap_or_default();
    let host = std::env::var("HOST")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_default();

    format!("{}@{}", user, host)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Classification of an update.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Security,
    Recommended,
    Optional,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
        }
    }

    /// Classify an update from its free-text description.
    pub fn from_description(description: &str) -> Self {
        if SECURITY_RE.is_match(description) {
            Self::Security
        } else if RECOMMENDED_RE.is_match(description) {
            Self::Recommended
        } else {
            Self::Optional
        }
    }
}

impl Display for UpdateType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to an external bug report, feature or issue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
    /// URL of the reference.
    pub href: String,
    /// Kind of reference, e.g. `bugzilla` or `cve`.
    pub reference_type: String,
    /// Identifier within the tracker. Together with the type it is globally unique.
    pub reference_id: String,
    /// Label displayed to users.
    pub title: String,
}

impl Default for Reference {
    fn default() -> Self {
        Self {
            href: "http://bugzilla.novell.com".to_string(),
            reference_type: "bugzilla".to_string(),
            reference_id: "none".to_string(),
            title: String::new(),
        }
    }
}

/// A package affected by an update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdatePackage {
    pub name: String,
    pub arch: String,
    pub version: String,
    pub release: String,
    /// Path of the package file.
    pub path: PathBuf,
}

impl From<&PackageIdentity> for UpdatePackage {
    fn from(package: &PackageIdentity) -> Self {
        Self {
            name: package.name.clone(),
            arch: package.arch.clone(),
            version: package.version.clone(),
            release: package.release.clone(),
            path: package.path.clone(),
        }
    }
}

/// A maintenance update.
#[derive(Clone, Debug)]
pub struct Update {
    /// Identifier. Derived from the affected packages when absent.
    pub update_id: Option<String>,
    pub status: String,
    /// Issuer of the update.
    pub from: String,
    /// Classification. Derived from the description when absent.
    pub update_type: Option<UpdateType>,
    pub version: String,
    pub release: String,
    /// Issue time in seconds since the UNIX epoch.
    pub issued: u64,
    pub references: Vec<Reference>,
    pub description: String,
    /// Title. Derived from type, version and packages when absent.
    pub title: Option<String>,
    pub packages: Vec<UpdatePackage>,
}

impl Default for Update {
    fn default() -> Self {
        Self::new(default_issuer())
    }
}

impl Update {
    /// Construct an update issued now by `from`.
    pub fn new(from: impl ToString) -> Self {
        Self {
            update_id: None,
            status: "stable".to_string(),
            from: from.to_string(),
            update_type: None,
            version: "1".to_string(),
            release: "no release".to_string(),
            issued: now(),
            references: vec![],
            description: String::new(),
            title: None,
            packages: vec![],
        }
    }

    /// Whether this update affects no packages.
    ///
    /// Such an update may still be worth publishing as an announcement.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The identifier as rendered.
    pub fn id(&self) -> &str {
        self.update_id.as_deref().unwrap_or("unknown")
    }

    /// The classification as rendered.
    pub fn kind(&self) -> UpdateType {
        self.update_type.unwrap_or(UpdateType::Optional)
    }

    /// The title as rendered.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled update")
    }

    /// A file name for this update: `update-<id>-<version>`.
    pub fn suggested_filename(&self) -> String {
        format!("update-{}-{}", self.id(), self.version)
    }

    /// Fill absent fields from the description and package list.
    ///
    /// The type is classified from vulnerability or bug markers in the description.
    /// The title and identifier are derived from the affected packages. Bug tracker
    /// and CVE identifiers in the description become references. Nothing matching
    /// leaves fields at their defaults.
    pub fn smart_fill_blank_fields(&mut self) {
        if self.update_type.is_none() {
            self.update_type = Some(UpdateType::from_description(&self.description));
        }

        let (suffix, derived_id) = self.describe_packages();

        if self.title.is_none() {
            let mut title = format!("{} update {}", self.kind(), self.version);
            if let Some(suffix) = suffix {
                title.push(' ');
                title.push_str(&suffix);
            }
            self.title = Some(title);
        }

        if self.update_id.is_none() {
            self.update_id = derived_id;
        }

        for reference in references_from_text(&self.description) {
            let known = self.references.iter().any(|r| {
                r.reference_type == reference.reference_type
                    && r.reference_id == reference.reference_id
            });

            if !known {
                self.references.push(reference);
            }
        }
    }

    /// Derive a title suffix and identifier from affected package names.
    fn describe_packages(&self) -> (Option<String>, Option<String>) {
        match self.packages.as_slice() {
            [] => (None, None),
            [package] => (
                Some(format!("for {}", package.name)),
                Some(package.name.clone()),
            ),
            packages => {
                let count = |f: &dyn Fn(&str) -> bool| {
                    packages.iter().filter(|p| f(&p.name)).count()
                };

                if count(&|name: &str| name.contains("kde")) > 1 {
                    let id = if count(&|name: &str| KDE4_RE.is_match(name)) > 1 {
                        Some("KDE4".to_string())
                    } else if count(&|name: &str| KDE3_RE.is_match(name)) > 1 {
                        Some("KDE3".to_string())
                    } else {
                        None
                    };

                    (Some("for KDE".to_string()), id)
                } else if count(&|name: &str| name.contains("kernel")) > 1 {
                    (
                        Some("for the Linux kernel".to_string()),
                        Some("kernel".to_string()),
                    )
                } else {
                    (None, None)
                }
            }
        }
    }

    fn write_xml<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        writer.write(
            XmlEvent::start_element("update")
                .attr("status", &self.status)
                .attr("from", &self.from)
                .attr("version", &self.version)
                .attr("type", self.kind().as_str()),
        )?;

        write_text_element(writer, "title", self.title())?;
        write_text_element(writer, "id", self.id())?;

        let issued = self.issued.to_string();
        writer.write(XmlEvent::start_element("issued").attr("date", &issued))?;
        writer.write(XmlEvent::end_element())?;

        write_text_element(writer, "release", &self.release)?;
        write_text_element(writer, "description", &self.description)?;

        writer.write(XmlEvent::start_element("references"))?;
        for reference in &self.references {
            writer.write(
                XmlEvent::start_element("reference")
                    .attr("href", &reference.href)
                    .attr("id", &reference.reference_id)
                    .attr("title", &reference.title)
                    .attr("type", &reference.reference_type),
            )?;
            writer.write(XmlEvent::end_element())?;
        }
        writer.write(XmlEvent::end_element())?;

        writer.write(XmlEvent::start_element("pkglist"))?;
        writer.write(XmlEvent::start_element("collection"))?;
        for package in &self.packages {
            writer.write(
                XmlEvent::start_element("package")
                    .attr("name", &package.name)
                    .attr("arch", &package.arch)
                    .attr("version", &package.version)
                    .attr("release", &package.release),
            )?;

            let filename = package
                .path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            write_text_element(writer, "filename", &filename)?;

            writer.write(XmlEvent::end_element())?;
        }
        writer.write(XmlEvent::end_element())?;
        writer.write(XmlEvent::end_element())?;

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

/// Extract bug tracker and CVE references from free text.
pub fn references_from_text(text: &str) -> Vec<Reference> {
    let mut references = vec![];

    for (re, href, title) in TRACKERS.iter() {
        for captures in re.captures_iter(text) {
            if let Some(id) = captures.iter().skip(1).flatten().next() {
                references.push(Reference {
                    href: format!("{}{}", href, id.as_str()),
                    reference_type: "bugzilla".to_string(),
                    reference_id: id.as_str().to_string(),
                    title: format!("{} {}", title, id.as_str()),
                });
            }
        }
    }

    for captures in CVE_RE.captures_iter(text) {
        if let Some(number) = captures.get(1) {
            let id = format!("CVE-{}", number.as_str());

            references.push(Reference {
                href: format!("http://cve.mitre.org/cgi-bin/cvename.cgi?name={}", id),
                reference_type: "cve".to_string(),
                title: format!("CVE number {}", id),
                reference_id: id,
            });
        }
    }

    references
}

/// A YAML scalar that may be written as a number, a boolean or a string.
///
/// Numbers keep their YAML spelling, so `version: 1.0` stays `1.0`.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
struct Scalar(String);

impl TryFrom<serde_yaml::Value> for Scalar {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> std::result::Result<Self, Self::Error> {
        match value {
            serde_yaml::Value::String(s) => Ok(Self(s)),
            serde_yaml::Value::Number(n) => Ok(Self(n.to_string())),
            serde_yaml::Value::Bool(b) => Ok(Self(b.to_string())),
            v => Err(format!("expected a scalar value, got {:?}", v)),
        }
    }
}

impl Scalar {
    fn into_string(self) -> String {
        self.0
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct ReferenceDescriptor {
    href: Option<String>,
    id: Option<Scalar>,
    title: Option<String>,
    #[serde(rename = "type")]
    reference_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct PackageDescriptor {
    name: String,
    arch: String,
    version: Option<Scalar>,
    release: Option<Scalar>,
    filename: Option<String>,
}

/// Fields of an update in a YAML descriptor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateDescriptor {
    id: Option<Scalar>,
    title: Option<String>,
    summary: Option<String>,
    status: Option<String>,
    from: Option<String>,
    #[serde(rename = "type")]
    update_type: Option<UpdateType>,
    version: Option<Scalar>,
    release: Option<Scalar>,
    issued: Option<u64>,
    description: Option<String>,
    references: Vec<ReferenceDescriptor>,
    packages: Vec<PackageDescriptor>,
}

impl UpdateDescriptor {
    fn into_update(self, issuer: &str) -> Update {
        let mut update = Update::new(self.from.unwrap_or_else(|| issuer.to_string()));

        update.update_id = self.id.map(Scalar::into_string);
        update.title = self.title.or(self.summary);
        update.update_type = self.update_type;
        if let Some(status) = self.status {
            update.status = status;
        }
        if let Some(version) = self.version {
            update.version = version.into_string();
        }
        if let Some(release) = self.release {
            update.release = release.into_string();
        }
        if let Some(issued) = self.issued {
            update.issued = issued;
        }
        update.description = self.description.unwrap_or_default();

        update.references = self
            .references
            .into_iter()
            .map(|r| {
                let default = Reference::default();
                Reference {
                    href: r.href.unwrap_or(default.href),
                    reference_type: r.reference_type.unwrap_or(default.reference_type),
                    reference_id: r
                        .id
                        .map(Scalar::into_string)
                        .unwrap_or(default.reference_id),
                    title: r.title.unwrap_or(default.title),
                }
            })
            .collect();

        update.packages = self
            .packages
            .into_iter()
            .map(|p| UpdatePackage {
                path: PathBuf::from(p.filename.unwrap_or_default()),
                name: p.name,
                arch: p.arch,
                version: p.version.map(Scalar::into_string).unwrap_or_default(),
                release: p.release.map(Scalar::into_string).unwrap_or_default(),
            })
            .collect();

        update
    }
}

/// Parse updates from a YAML update descriptor.
///
/// Blank fields are filled with [Update::smart_fill_blank_fields()]. Updates whose
/// identifier is neither given as `id` nor derived from their packages use their key
/// in the descriptor mapping. Updates without a `from` are attributed to `issuer`.
///
/// A document or entry that isn't a mapping is rejected with
/// [RpmRepositoryError::UpdateDescriptorShape].
pub fn updates_from_yaml(data: &str, issuer: &str) -> Result<Vec<Update>> {
    let mapping = match serde_yaml::from_str::<serde_yaml::Value>(data)? {
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(RpmRepositoryError::UpdateDescriptorShape("document".to_string())),
    };
    let mut updates = vec![];

    for (key, value) in mapping {
        let key = Scalar::try_from(key)
            .map(Scalar::into_string)
            .unwrap_or_default();

        if !matches!(value, serde_yaml::Value::Mapping(_)) {
            return Err(RpmRepositoryError::UpdateDescriptorShape(format!(
                "entry {}",
                key
            )));
        }

        let descriptor: UpdateDescriptor = serde_yaml::from_value(value)?;
        let mut update = descriptor.into_update(issuer);
        update.smart_fill_blank_fields();
        if update.update_id.is_none() && !key.is_empty() {
            update.update_id = Some(key);
        }

        updates.push(update);
    }

    Ok(updates)
}

/// The `updateinfo.xml` document.
#[derive(Clone, Debug)]
pub struct UpdateInfo {
    issuer: String,
    updates: Vec<Update>,
}

impl Default for UpdateInfo {
    fn default() -> Self {
        Self::new(default_issuer())
    }
}

impl UpdateInfo {
    /// Construct an empty instance attributing descriptor updates to `issuer` by default.
    pub fn new(issuer: impl ToString) -> Self {
        Self {
            issuer: issuer.to_string(),
            updates: vec![],
        }
    }

    pub fn add_update(&mut self, update: Update) {
        self.updates.push(update);
    }

    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    /// Load every `*.update` descriptor under `dir`.
    ///
    /// See [updates_from_yaml()] for how descriptors are interpreted. Returns the
    /// number of updates added.
    pub fn add_updates(&mut self, dir: &Path) -> Result<usize> {
        let mut count = 0;

        for path in find_files_with_extension(dir, "update")? {
            let data =
                std::fs::read_to_string(&path).map_err(|e| RpmRepositoryError::io_path(&path, e))?;

            let updates = updates_from_yaml(&data, &self.issuer).map_err(|e| match e {
                RpmRepositoryError::UpdateDescriptorShape(what) => {
                    RpmRepositoryError::UpdateDescriptorShape(format!(
                        "{} ({})",
                        path.display(),
                        what
                    ))
                }
                e => e,
            })?;

            info!("adding {} update(s) from {}", updates.len(), path.display());

            count += updates.len();
            self.updates.extend(updates);
        }

        Ok(count)
    }

    /// Write every update to its own `<dir>/<suggested filename>.xml` file.
    ///
    /// Each file holds a single `<update>` element. Returns the written paths.
    pub fn write_split(
        &self,
        dir: &Path,
        staging_dir: Option<&Path>,
        indent: usize,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| RpmRepositoryError::io_path(dir, e))?;
        let mut paths = vec![];

        for update in &self.updates {
            let path = dir.join(format!("{}.xml", update.suggested_filename()));
            info!("saving update {}", path.display());

            write_atomic(&path, staging_dir, |fh| {
                let mut writer = xml_writer(fh, indent);
                write_declaration(&mut writer)?;
                update.write_xml(&mut writer)
            })?;

            paths.push(path);
        }

        Ok(paths)
    }
}

impl ExtensionDocument for UpdateInfo {
    fn kind(&self) -> &'static str {
        "updateinfo"
    }

    fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);

        write_declaration(&mut writer)?;
        writer.write(XmlEvent::start_element("updates"))?;

        for update in &self.updates {
            update.write_xml(&mut writer)?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    fn package(name: &str) -> UpdatePackage {
        UpdatePackage {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            version: "1.0".to_string(),
            release: "1".to_string(),
            path: PathBuf::from(format!("x86_64/{}-1.0-1.x86_64.rpm", name)),
        }
    }

    #[test]
    fn classify_cve() {
        let mut update = Update::new("me@host");
        update.description = "fixes CVE-2020-12345".to_string();
        update.smart_fill_blank_fields();

        assert_eq!(update.update_type, Some(UpdateType::Security));
        assert_eq!(update.references.len(), 1);
        assert!(update.references[0].href.contains("CVE-2020-12345"));
        assert_eq!(update.references[0].reference_type, "cve");
        assert_eq!(update.title(), "security update 1");
        assert_eq!(update.id(), "unknown");
    }

    #[test]
    fn classify_bug() {
        let mut update = Update::new("me@host");
        update.description = "bnc#654321 crash on startup".to_string();
        update.smart_fill_blank_fields();

        assert_eq!(update.update_type, Some(UpdateType::Recommended));
        assert_eq!(update.references.len(), 1);
        assert_eq!(update.references[0].reference_id, "654321");
        assert_eq!(
            update.references[0].href,
            "http://bugzilla.novell.com/654321"
        );

        // Filling again doesn't duplicate references.
        update.smart_fill_blank_fields();
        assert_eq!(update.references.len(), 1);
    }

    #[test]
    fn no_match_keeps_defaults() {
        let mut update = Update::new("me@host");
        update.description = "A new feature".to_string();
        update.smart_fill_blank_fields();

        assert_eq!(update.update_type, Some(UpdateType::Optional));
        assert!(update.references.is_empty());
        assert!(update.is_empty());
    }

    #[test]
    fn explicit_fields_kept() {
        let mut update = Update::new("me@host");
        update.description = "security fix".to_string();
        update.update_type = Some(UpdateType::Optional);
        update.title = Some("Custom".to_string());
        update.packages.push(package("foo"));
        update.smart_fill_blank_fields();

        assert_eq!(update.kind(), UpdateType::Optional);
        assert_eq!(update.title(), "Custom");
        assert_eq!(update.id(), "foo");
    }

    #[test]
    fn single_package_title() {
        let mut update = Update::new("me@host");
        update.packages.push(package("foo"));
        update.smart_fill_blank_fields();

        assert!(update.title().contains("for foo"));
        assert_eq!(update.id(), "foo");
        assert_eq!(update.suggested_filename(), "update-foo-1");
        assert!(!update.is_empty());
    }

    #[test]
    fn multi_package_heuristics() {
        let mut kde = Update::new("me@host");
        kde.packages.push(package("kdelibs4"));
        kde.packages.push(package("kdebase4"));
        kde.smart_fill_blank_fields();
        assert!(kde.title().ends_with("for KDE"));
        assert_eq!(kde.id(), "KDE4");

        let mut kernel = Update::new("me@host");
        kernel.packages.push(package("kernel-default"));
        kernel.packages.push(package("kernel-source"));
        kernel.smart_fill_blank_fields();
        assert!(kernel.title().ends_with("for the Linux kernel"));
        assert_eq!(kernel.id(), "kernel");

        let mut mixed = Update::new("me@host");
        mixed.packages.push(package("foo"));
        mixed.packages.push(package("bar"));
        mixed.smart_fill_blank_fields();
        assert_eq!(mixed.title(), "optional update 1");
        assert_eq!(mixed.id(), "unknown");
    }

    #[test]
    fn tracker_references() {
        let references = references_from_text(
            "Fixes BNC: 1, rh#2, rhbz #3, bgo#4, kde #5 and CVE-2009-0001 plus CVE-2009-0002",
        );

        let ids = references
            .iter()
            .map(|r| r.reference_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["1", "2", "3", "4", "5", "CVE-2009-0001", "CVE-2009-0002"]
        );
        assert_eq!(references[1].href, "http://bugzilla.redhat.com/2");
        assert_eq!(references[3].title, "Gnome bug number 4");
        assert_eq!(references[4].href, "http://bugs.kde.org/5");
    }

    #[test]
    fn parse_descriptor() -> Result<()> {
        let updates = updates_from_yaml(
            indoc! {r#"
                foo-fix:
                  summary: Fix crash in foo
                  version: 2
                  issued: 1234567890
                  description: Fixes a crash on startup (bnc#654321).
                  references:
                    - href: http://example.com/1
                      id: 1
                      type: bugzilla
                  packages:
                    - name: foo
                      arch: x86_64
                      version: "1.0"
                      release: 2
                      filename: foo-1.0-2.x86_64.rpm
                bar-announce:
                  id: ANN-1
                  from: security@example.com
                  type: security
                42:
                  description: A new feature
            "#},
            "me@host",
        )?;

        assert_eq!(updates.len(), 3);

        let foo = &updates[0];
        assert_eq!(foo.id(), "foo");
        assert_eq!(foo.title(), "Fix crash in foo");
        assert_eq!(foo.version, "2");
        assert_eq!(foo.issued, 1234567890);
        assert_eq!(foo.from, "me@host");
        assert_eq!(foo.kind(), UpdateType::Recommended);
        assert_eq!(foo.references[0].reference_id, "1");
        assert_eq!(foo.packages[0].release, "2");

        let bar = &updates[1];
        assert_eq!(bar.id(), "ANN-1");
        assert_eq!(bar.from, "security@example.com");
        assert_eq!(bar.kind(), UpdateType::Security);
        assert!(bar.is_empty());

        let numbered = &updates[2];
        assert_eq!(numbered.id(), "42");
        assert_eq!(numbered.kind(), UpdateType::Optional);

        Ok(())
    }

    #[test]
    fn package_derived_id_wins_over_key() -> Result<()> {
        let updates = updates_from_yaml(
            indoc! {"
                security-fix-42:
                  description: fixes CVE-2021-0001
                  packages:
                    - name: foo
                      arch: noarch
                      version: 1
                      release: 1
                security-fix-43:
                  id: SUSE-2021-43
                  packages:
                    - name: foo
                      arch: noarch
            "},
            "me@host",
        )?;

        assert_eq!(updates[0].id(), "foo");
        assert_eq!(updates[0].suggested_filename(), "update-foo-1");
        assert_eq!(updates[1].id(), "SUSE-2021-43");

        Ok(())
    }

    #[test]
    fn float_versions_keep_spelling() -> Result<()> {
        let updates = updates_from_yaml(
            indoc! {"
                foo:
                  version: 1.0
                  release: 2.1
                  packages:
                    - name: foo
                      arch: noarch
                      version: 1.0
                      release: 2.1
            "},
            "me@host",
        )?;

        let update = &updates[0];
        assert_eq!(update.version, "1.0");
        assert_eq!(update.release, "2.1");
        assert_eq!(update.packages[0].version, "1.0");
        assert_eq!(update.packages[0].release, "2.1");

        Ok(())
    }

    #[test]
    fn descriptor_shape_errors() {
        assert!(matches!(
            updates_from_yaml("- not\n- a mapping\n", "me@host"),
            Err(RpmRepositoryError::UpdateDescriptorShape(_))
        ));
        assert!(matches!(
            updates_from_yaml("foo: 3\n", "me@host"),
            Err(RpmRepositoryError::UpdateDescriptorShape(_))
        ));

        // Malformed YAML and mistyped fields stay YAML errors.
        assert!(matches!(
            updates_from_yaml("foo: [unclosed\n", "me@host"),
            Err(RpmRepositoryError::Yaml(_))
        ));
        assert!(matches!(
            updates_from_yaml("foo:\n  issued: yesterday\n", "me@host"),
            Err(RpmRepositoryError::Yaml(_))
        ));
    }

    #[test]
    fn render() -> Result<()> {
        let mut info = UpdateInfo::new("me@host");
        assert!(info.is_empty());

        let mut update = Update::new("me@host");
        update.issued = 1000;
        update.description = "bnc#654321 crash on startup".to_string();
        update.packages.push(package("foo"));
        update.smart_fill_blank_fields();
        info.add_update(update);
        assert!(!info.is_empty());

        let mut buf = vec![];
        info.render_to(&mut buf, 2)?;
        let xml = String::from_utf8_lossy(&buf);

        assert!(xml.contains("<updates>"));
        assert!(xml.contains("type=\"recommended\""));
        assert!(xml.contains("<id>foo</id>"));
        assert!(xml.contains("<issued date=\"1000\""));
        assert!(xml.contains("id=\"654321\""));
        assert!(xml.contains("<filename>foo-1.0-1.x86_64.rpm</filename>"));

        Ok(())
    }

    #[test]
    fn split_updates_into_files() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let dir = td.path().join("split");

        let mut info = UpdateInfo::new("me@host");
        for name in ["foo", "bar"] {
            let mut update = Update::new("me@host");
            update.packages.push(package(name));
            update.smart_fill_blank_fields();
            info.add_update(update);
        }

        let paths = info.write_split(&dir, None, 2)?;
        assert_eq!(
            paths,
            vec![dir.join("update-foo-1.xml"), dir.join("update-bar-1.xml")]
        );

        let xml = std::fs::read_to_string(&paths[1])
            .map_err(|e| RpmRepositoryError::io_path(&paths[1], e))?;
        assert!(xml.contains("<update "));
        assert!(xml.contains("<id>bar</id>"));
        assert!(!xml.contains("<updates>"));
        assert!(!xml.contains("foo"));

        Ok(())
    }

    #[test]
    fn load_descriptor_directory() -> Result<()> {
        let td = tempfile::TempDir::new().map_err(|e| RpmRepositoryError::io_path("tempdir", e))?;
        let path = td.path().join("updates").join("foo.update");
        std::fs::create_dir_all(td.path().join("updates"))
            .map_err(|e| RpmRepositoryError::io_path(td.path(), e))?;
        std::fs::write(
            &path,
            indoc! {"
                foo:
                  description: fixes CVE-2020-12345
                  packages:
                    - name: foo
                      arch: noarch
                      version: 1
                      release: 1
            "},
        )
        .map_err(|e| RpmRepositoryError::io_path(&path, e))?;

        let mut info = UpdateInfo::new("me@host");
        assert_eq!(info.add_updates(td.path())?, 1);

        let update = &info.updates()[0];
        assert_eq!(update.kind(), UpdateType::Security);
        assert_eq!(update.id(), "foo");
        assert_eq!(update.title(), "security update 1 for foo");
        assert_eq!(update.references.len(), 1);

        Ok(())
    }
}
