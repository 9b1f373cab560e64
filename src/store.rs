//! On-disk certificate storage.
//!
//! ```text
//! <data_dir>/
//! └── domains/
//!     └── example.com/
//!         ├── cert.pem      # certificate chain, end-entity first
//!         └── key.pem       # private key
//! ```
//!
//! A [`ProtocolClient`] implementation typically persists certificates here in
//! `fetch_certificate` and answers `get_certificate_meta` from [`FileStore::certificate_meta`].
//!
//! [`ProtocolClient`]: crate::ProtocolClient

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use eyre::WrapErr as _;
use zeroize::Zeroizing;

use crate::{cert::Certificate, client::CertificateMeta};

const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";

/// Certificates stored below a data directory, one directory per primary domain.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `data_dir`. Nothing is created on disk until the first save.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_path: data_dir.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn domain_path(&self, primary: &str) -> eyre::Result<PathBuf> {
        if primary.is_empty()
            || primary.starts_with('.')
            || primary.contains(['/', '\\'])
        {
            eyre::bail!("refusing to store certificate for {primary:?}");
        }

        Ok(self.base_path.join("domains").join(primary))
    }

    pub fn cert_path(&self, primary: &str) -> eyre::Result<PathBuf> {
        Ok(self.domain_path(primary)?.join(CERT_FILE))
    }

    pub fn key_path(&self, primary: &str) -> eyre::Result<PathBuf> {
        Ok(self.domain_path(primary)?.join(KEY_FILE))
    }

    /// Expiry metadata of the stored certificate for `primary`.
    ///
    /// A missing certificate is not an error; a certificate that cannot be read or parsed is.
    pub fn certificate_meta(&self, primary: &str) -> eyre::Result<CertificateMeta> {
        let path = self.cert_path(primary)?;

        let pem = match fs::read_to_string(&path) {
            Ok(pem) => pem,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CertificateMeta::absent());
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("read {}", path.display()));
            }
        };

        let not_after = crate::cert::not_after_from_pem(&pem)
            .wrap_err_with(|| format!("parse {}", path.display()))?;

        Ok(CertificateMeta::present(not_after, path))
    }

    /// Stores the certificate and key for `primary`, replacing what was there.
    pub fn save(&self, primary: &str, cert: &Certificate) -> eyre::Result<()> {
        let domain_path = self.domain_path(primary)?;
        fs::create_dir_all(&domain_path)
            .wrap_err_with(|| format!("create {}", domain_path.display()))?;

        let key_path = domain_path.join(KEY_FILE);
        fs::write(&key_path, cert.private_key())
            .wrap_err_with(|| format!("write {}", key_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
        }

        // written last, its presence marks a complete certificate
        let cert_path = domain_path.join(CERT_FILE);
        fs::write(&cert_path, cert.certificate())
            .wrap_err_with(|| format!("write {}", cert_path.display()))?;

        log::info!("stored certificate for {primary} in {}", domain_path.display());
        Ok(())
    }

    /// Loads the stored certificate for `primary`, `None` if there is none.
    pub fn load(&self, primary: &str) -> eyre::Result<Option<Certificate>> {
        let cert_path = self.cert_path(primary)?;

        let certificate = match fs::read_to_string(&cert_path) {
            Ok(pem) => pem,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("read {}", cert_path.display()));
            }
        };

        let key_path = self.key_path(primary)?;
        let private_key_pem = fs::read_to_string(&key_path)
            .wrap_err_with(|| format!("read {}", key_path.display()))?;

        Certificate::parse(Zeroizing::new(private_key_pem), certificate).map(Some)
    }
}
