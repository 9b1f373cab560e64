//! Certificate list configuration.
//!
//! The raw configuration is any JSON value. [`Config::validate`] checks its shape, applies
//! defaults and produces the [`Config`] the manager runs with.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/acme",
//!   "renew_time": 2592000,
//!   "certificates": [
//!     { "names": ["example.com", "www.example.com"], "provider": "dns:vultr" },
//!     { "names": ["static.example.org"], "provider": "http" }
//!   ],
//!   "providers": {
//!     "dns:vultr": { "api_key": "..." }
//!   }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{error::Error, providers::ProviderId};

/// Where certificates are stored when `data_dir` is not configured.
pub const DEFAULT_DATA_DIR: &str = ".acme";

/// Seconds before expiry at which renewal starts when `renew_time` is not configured (30 days).
pub const DEFAULT_RENEW_TIME: i64 = 30 * 24 * 60 * 60;

/// Marker for an expiry that is not known, either because the certificate was never issued or
/// because its metadata could not be read.
pub const EXPIRY_UNKNOWN: i64 = -1;

/// One desired certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSpec {
    names: Vec<String>,
    provider: ProviderId,

    /// Expiry of the stored certificate in epoch seconds, [`EXPIRY_UNKNOWN`] when absent.
    ///
    /// Refreshed on every scheduling pass.
    pub expires_at: i64,
}

impl CertificateSpec {
    /// Creates a certificate covering `names`, solved through `provider`.
    ///
    /// The first name is the primary domain. Duplicate names are dropped, keeping the first
    /// occurrence.
    pub fn new<I, S>(names: I, provider: ProviderId) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let names = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| seen.insert(name.clone()))
            .collect::<Vec<_>>();

        if names.is_empty() {
            return Err(Error::invalid_config("certificate must have at least one name"));
        }

        if let Some(name) = names.iter().find(|name| name.trim().is_empty()) {
            return Err(Error::invalid_config(format!(
                "certificate name {name:?} is empty"
            )));
        }

        Ok(Self {
            names,
            provider,
            expires_at: EXPIRY_UNKNOWN,
        })
    }

    /// Primary domain; used as the certificate subject and as the key of its order.
    pub fn primary(&self) -> &str {
        &self.names[0]
    }

    /// All names, primary first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.names.iter().any(|name| name == domain)
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub certificates: Vec<CertificateSpec>,

    /// Seconds before expiry at which a certificate is renewed.
    pub renew_time: i64,

    pub data_dir: PathBuf,

    /// Credentials per provider id, handed as-is to challenge back ends.
    pub providers: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,

    #[serde(default = "default_renew_time")]
    renew_time: u64,

    #[serde(default)]
    certificates: Vec<RawCertificate>,

    #[serde(default)]
    providers: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawCertificate {
    names: Vec<String>,
    provider: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_renew_time() -> u64 {
    DEFAULT_RENEW_TIME as u64
}

impl Config {
    /// Validates a raw configuration value and applies defaults.
    ///
    /// Never touches the network or the filesystem.
    pub fn validate(raw: &Value) -> Result<Config, Error> {
        if !raw.is_object() {
            return Err(Error::invalid_config("cfg must be a table"));
        }

        let raw = RawConfig::deserialize(raw).map_err(|err| Error::invalid_config(err.to_string()))?;

        let renew_time = i64::try_from(raw.renew_time)
            .map_err(|_| Error::invalid_config("renew_time is out of range"))?;

        let mut primaries = HashSet::new();
        let mut certificates = Vec::with_capacity(raw.certificates.len());

        for cert in raw.certificates {
            let spec = CertificateSpec::new(cert.names, ProviderId::new(cert.provider))?;

            if !primaries.insert(spec.primary().to_owned()) {
                return Err(Error::invalid_config(format!(
                    "duplicate certificate for primary domain {}",
                    spec.primary()
                )));
            }

            certificates.push(spec);
        }

        Ok(Config {
            certificates,
            renew_time,
            data_dir: raw.data_dir,
            providers: raw.providers,
        })
    }

    /// Parses JSON text and validates it.
    pub fn from_json(json: &str) -> Result<Config, Error> {
        let raw = serde_json::from_str::<Value>(json)
            .map_err(|err| Error::invalid_config(format!("cannot parse config: {err}")))?;
        Self::validate(&raw)
    }

    /// Reads a JSON config file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        log::debug!("loaded config from {}", path.display());
        Self::from_json(&json)
    }
}
