// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `suseinfo.xml` file format. */

use {
    crate::{
        document::{write_declaration, write_text_element, xml_writer, ExtensionDocument},
        error::Result,
    },
    std::{collections::BTreeSet, io::Write},
    xml::writer::XmlEvent,
};

/// Repository-wide SUSE data not associated with any package.
#[derive(Clone, Debug, Default)]
pub struct SuseInfo {
    /// Seconds after which clients should consider the repository outdated.
    pub expire: Option<u64>,
    keywords: BTreeSet<String>,
    products: BTreeSet<String>,
}

impl SuseInfo {
    pub fn add_keyword(&mut self, keyword: impl ToString) {
        self.keywords.insert(keyword.to_string());
    }

    /// Declare that the repository provides content for a product.
    pub fn add_product(&mut self, product: impl ToString) {
        self.products.insert(product.to_string());
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.as_str())
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(|p| p.as_str())
    }
}

impl ExtensionDocument for SuseInfo {
    fn kind(&self) -> &'static str {
        "suseinfo"
    }

    fn is_empty(&self) -> bool {
        self.expire.is_none() && self.keywords.is_empty() && self.products.is_empty()
    }

    fn render_to(&self, writer: &mut dyn Write, indent: usize) -> Result<()> {
        let mut writer = xml_writer(writer, indent);

        write_declaration(&mut writer)?;
        writer.write(XmlEvent::start_element("suseinfo"))?;

        if let Some(expire) = self.expire {
            write_text_element(&mut writer, "expire", &expire.to_string())?;
        }

        if !self.keywords.is_empty() {
            writer.write(XmlEvent::start_element("keywords"))?;
            for keyword in &self.keywords {
                write_text_element(&mut writer, "k", keyword)?;
            }
            writer.write(XmlEvent::end_element())?;
        }

        if !self.products.is_empty() {
            writer.write(XmlEvent::start_element("products"))?;
            for product in &self.products {
                write_text_element(&mut writer, "id", product)?;
            }
            writer.write(XmlEvent::end_element())?;
        }

        writer.write(XmlEvent::end_element())?;

        Ok(())
    }
}
