// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository metadata XML definitions.

RPM repositories define metadata via a series of XML files under `repodata/`.
[repomd] is the index of those files. Every other module defines one
[crate::document::ExtensionDocument] kind.
*/

pub mod deltainfo;
pub mod extra;
pub mod filelists;
pub mod other;
pub mod primary;
pub mod repomd;
pub mod susedata;
pub mod suseinfo;
pub mod updateinfo;
