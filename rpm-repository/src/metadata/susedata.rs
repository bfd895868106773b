// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `susedata.xml` file format.

SUSE specific per-package data, most notably license agreements (EULAs) that
package managers display before installing a package.
*/

use {
    crate::{
        document::ExtensionDocument,
        error::{Result, RpmRepositoryError},
        metadata::extra::ExtraPrimaryData,
        package::{PackageIdentity, PackageInspector},
    },
    log::info,
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
};

/// The `susedata.xml` document.
#[derive(Clone, Debug)]
pub struct SuseData {
    data: ExtraPrimaryData,
}

impl Default for SuseData {
    fn default() -> Self {
        Self {
            data: ExtraPrimaryData::new("susedata"),
        }
    }
}

impl SuseData {
    /// Set a property of a package.
    pub fn add_attribute(&mut self, package: &PackageIdentity, name: &str, value: impl ToString) {
        self.data.add_attribute(package, name, value);
    }

    /// Attach license agreement text to a package.
    pub fn add_eula(&mut self, package: &PackageIdentity, text: impl ToString) {
        self.data.add_attribute(package, "eula", text);
    }

    /// Tag a package with keywords.
    pub fn add_keywords<S: ToString>(&mut self, package: &PackageIdentity, keywords: impl IntoIterator<Item = S>) {
        for keyword in keywords {
            self.data.append_attribute(package, "keyword", keyword);
        }
    }

    /// Access the underlying property bag.
    pub fn data(&self) -> &ExtraPrimaryData {
        &self.data
    }

    /// Attach `*.eula` files found under `dir` to packages next to them.
    ///
    /// `<dir>/x/foo.eula` is attached to every `<dir>/x/foo*.rpm` whose package
    /// name is exactly `foo`. Returns the number of packages that received a EULA.
    pub fn add_eulas(&mut self, dir: &Path, inspector: &dyn PackageInspector) -> Result<usize> {
        let mut count = 0;

        for eula_path in find_files_with_extension(dir, "eula")? {
            let text = std::fs::read_to_string(&eula_path)
                .map_err(|e| RpmRepositoryError::io_path(&eula_path, e))?;

            for package in packages_next_to(&eula_path, dir, inspector)? {
                info!("adding eula {} to {}", eula_path.display(), package);
                self.add_eula(&package, &text);
                count += 1;
            }
        }

        Ok(count)
    }

    /// Tag packages with keywords from `*.keywords` files found under `dir`.
    ///
    /// Files are matched to packages like EULAs (see [Self::add_eulas()]). Every
    /// non-blank line is a keyword. Returns the number of packages tagged.
    pub fn add_keyword_files(
        &mut self,
        dir: &Path,
        inspector: &dyn PackageInspector,
    ) -> Result<usize> {
        let mut count = 0;

        for keywords_path in find_files_with_extension(dir, "keywords")? {
            let data = std::fs::read_to_string(&keywords_path)
                .map_err(|e| RpmRepositoryError::io_path(&keywords_path, e))?;
            let keywords = data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>();

            for package in packages_next_to(&keywords_path, dir, inspector)? {
                info!("adding keywords {} to {}", keywords_path.display(), package);
                self.add_keywords(&package, keywords.iter());
                count += 1;
            }
        }

        Ok(count)
    }
}

/// Packages in the directory of `path` whose name is the file stem of `path`.
fn packages_next_to(
    path: &Path,
    dir: &Path,
    inspector: &dyn PackageInspector,
) -> Result<Vec<PackageIdentity>> {
    let base = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return Ok(vec![]),
    };
    let parent = path.parent().unwrap_or(dir);
    let mut packages = vec![];

    for rpm_path in find_files_with_extension(parent, "rpm")? {
        let in_same_dir = rpm_path.parent() == Some(parent);
        let name_matches = rpm_path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.starts_with(&base) && !name.ends_with(".delta.rpm")
            })
            .unwrap_or(false);

        if !in_same_dir || !name_matches {
            continue;
        }

        let package = inspector.inspect(&rpm_path)?;
        if package.name == base {
            packages.push(package);
        }
    }

    Ok(packages)
}

impl ExtensionDocument for SuseData {
    fn kind(&self) -> &'static str {
        self.data.kind()
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        self.data.render_to(writer, indent)
    }
}

/// Location of `path` relative to `dir`, with `/` separators.
pub(crate) fn relative_href(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursively find files with an extension, sorted by path.
pub(crate) fn find_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];

    for entry in walkdir::WalkDir::new(dir).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            RpmRepositoryError::io_path(path, e.into())
        })?;

        if entry.file_type().is_file()
            && entry.path().extension().map(|ext| ext == extension) == Some(true)
        {
            paths.push(entry.into_path());
        }
    }

    Ok(paths)
}
