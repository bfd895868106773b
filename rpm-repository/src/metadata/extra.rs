// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Free-form per-package properties.

Some metadata extends `primary.xml` with data that isn't part of its schema, such as
license agreements or vendor flags. [ExtraPrimaryData] holds such properties for any
number of packages and renders them as

```xml
<name>
  <package pkgid="..." name="...">
    <version ver="..." rel="..." arch="..." epoch="..."/>
    <property>value</property>
  </package>
</name>
```
*/

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer, ExtensionDocument, PackageMap},
        error::Result,
        package::PackageIdentity,
    },
    std::io::Write,
    xml::writer::XmlEvent,
};

/// Named properties attached to packages.
#[derive(Clone, Debug)]
pub struct ExtraPrimaryData {
    name: &'static str,
    properties: PackageMap<Vec<(String, String)>>,
}

impl ExtraPrimaryData {
    /// Construct an empty instance whose root element is `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: PackageMap::default(),
        }
    }

    /// Set a property of a package.
    ///
    /// Setting an existing property replaces its value but keeps its position.
    pub fn add_attribute(&mut self, package: &PackageIdentity, name: impl ToString, value: impl ToString) {
        let name = name.to_string();
        let value = value.to_string();
        let properties = self.properties.get_or_insert_with(package, Vec::new);

        match properties.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = value,
            None => properties.push((name, value)),
        }
    }

    /// Add a property to a package that may occur more than once.
    ///
    /// An identical name and value pair is only recorded once.
    pub fn append_attribute(&mut self, package: &PackageIdentity, name: impl ToString, value: impl ToString) {
        let entry = (name.to_string(), value.to_string());
        let properties = self.properties.get_or_insert_with(package, Vec::new);

        if !properties.contains(&entry) {
            properties.push(entry);
        }
    }

    /// Properties of a package, in insertion order.
    pub fn properties(&self, package: &PackageIdentity) -> Option<&[(String, String)]> {
        self.properties.get(package).map(|p| p.as_slice())
    }

    /// Number of packages having properties.
    pub fn package_count(&self) -> usize {
        self.properties.len()
    }
}

impl ExtensionDocument for ExtraPrimaryData {
    fn kind(&self) -> &'static str {
        self.name
    }

    fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);

        write_declaration(&mut writer)?;
        writer.write(XmlEvent::start_element(self.name))?;

        for (package, properties) in self.properties.iter() {
            let pkgid = package.pkgid();
            let epoch = package.epoch.to_string();

            writer.write(
                XmlEvent::start_element("package")
                    .attr("pkgid", &pkgid)
                    .attr("name", &package.name),
            )?;
            writer.write(
                XmlEvent::start_element("version")
                    .attr("ver", &package.version)
                    .attr("rel", &package.release)
                    .attr("arch", &package.arch)
                    .attr("epoch", &epoch),
            )?;
            writer.write(XmlEvent::end_element())?;

            for (name, value) in properties {
                write_text_element(&mut writer, name, value)?;
            }

            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}
