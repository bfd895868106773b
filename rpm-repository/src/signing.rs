// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Index signing.

A signed repository ships `repomd.xml.asc`, an ASCII armored detached signature
of `repomd.xml`, and `repomd.xml.key`, the ASCII armored public key that
verifies it. [IndexSigner] abstracts over the tool producing both.
*/

use {
    crate::error::{Result, RpmRepositoryError},
    log::{info, warn},
    std::{
        ffi::OsString,
        io::{BufRead, BufReader},
        path::{Path, PathBuf},
    },
};

/// Produces detached signatures and exports public keys.
pub trait IndexSigner {
    /// Write an ASCII armored detached signature of `input` to `output`.
    fn sign_detached(&self, key_id: &str, input: &Path, output: &Path) -> Result<()>;

    /// Write the ASCII armored public key of `key_id` to `output`.
    fn export_public_key(&self, key_id: &str, output: &Path) -> Result<()>;
}

/// An [IndexSigner] invoking GnuPG.
#[derive(Clone, Debug)]
pub struct GpgSigner {
    gpg_exe: PathBuf,
}

impl Default for GpgSigner {
    fn default() -> Self {
        Self {
            gpg_exe: PathBuf::from("gpg"),
        }
    }
}

impl GpgSigner {
    /// Construct an instance invoking the `gpg` executable at the given path.
    pub fn new(gpg_exe: impl AsRef<Path>) -> Self {
        Self {
            gpg_exe: gpg_exe.as_ref().to_path_buf(),
        }
    }

    fn run(&self, args: Vec<OsString>) -> Result<()> {
        let tool = format!("{}", self.gpg_exe.display());

        let command = duct::cmd(&self.gpg_exe, args)
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .map_err(|e| RpmRepositoryError::ExternalTool(tool.clone(), e))?;
        {
            let reader = BufReader::new(&command);
            for line in reader.lines() {
                let line = line.map_err(|e| RpmRepositoryError::ExternalTool(tool.clone(), e))?;
                warn!("{}", line);
            }
        }

        let output = command
            .try_wait()
            .map_err(|e| RpmRepositoryError::ExternalTool(tool.clone(), e))?
            .ok_or_else(|| {
                RpmRepositoryError::ExternalTool(
                    tool.clone(),
                    std::io::Error::new(std::io::ErrorKind::Other, "unable to wait on command"),
                )
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RpmRepositoryError::ExternalTool(
                tool,
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("exited with {}", output.status),
                ),
            ))
        }
    }
}

impl IndexSigner for GpgSigner {
    fn sign_detached(&self, key_id: &str, input: &Path, output: &Path) -> Result<()> {
        self.run(vec![
            "-sab".into(),
            "-u".into(),
            key_id.into(),
            "-o".into(),
            output.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ])
    }

    fn export_public_key(&self, key_id: &str, output: &Path) -> Result<()> {
        self.run(vec![
            "--export".into(),
            "-a".into(),
            "-o".into(),
            output.as_os_str().to_owned(),
            key_id.into(),
        ])
    }
}

/// Files produced by signing an index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexSignature {
    /// The detached signature, `repomd.xml.asc`.
    pub signature_path: PathBuf,
    /// The exported public key, `repomd.xml.key`.
    pub public_key_path: PathBuf,
}

fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Sign the index at `index_path` with `key_id`.
///
/// Stale signature files are removed first so a signer that silently produces
/// nothing is detected.
pub fn sign_index(signer: &dyn IndexSigner, key_id: &str, index_path: &Path) -> Result<IndexSignature> {
    let signature_path = with_suffix(index_path, ".asc");
    let public_key_path = with_suffix(index_path, ".key");

    for path in [&signature_path, &public_key_path] {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| RpmRepositoryError::io_path(path, e))?;
        }
    }

    signer.sign_detached(key_id, index_path, &signature_path)?;
    if !is_nonempty_file(&signature_path) {
        return Err(RpmRepositoryError::SignatureMissing(format!(
            "{}",
            signature_path.display()
        )));
    }
    info!("signature {} generated", signature_path.display());

    signer.export_public_key(key_id, &public_key_path)?;
    if !is_nonempty_file(&public_key_path) {
        return Err(RpmRepositoryError::PublicKeyMissing(format!(
            "{}",
            public_key_path.display()
        )));
    }
    info!("public key {} exported", public_key_path.display());

    Ok(IndexSignature {
        signature_path,
        public_key_path,
    })
}
