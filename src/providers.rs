//! Challenge provider lookup.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{CertificateSpec, Config};

/// Identifier of the back end that provisions challenges for a certificate, e.g. `http` or
/// `dns:vultr`.
///
/// Ids named `dns`, or prefixed with `dns:` or `dns-`, publish DNS records and need time to
/// propagate before the server is asked to validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this provider solves `dns-01` challenges.
    pub fn is_dns(&self) -> bool {
        self.0 == "dns" || self.0.starts_with("dns:") || self.0.starts_with("dns-")
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view mapping domains to the provider of the certificate that contains them.
#[derive(Debug, Clone, Copy)]
pub struct Providers<'a> {
    certificates: &'a [CertificateSpec],
    credentials: &'a BTreeMap<String, Map<String, Value>>,
}

impl<'a> Providers<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            certificates: &config.certificates,
            credentials: &config.providers,
        }
    }

    /// Provider configured for the certificate listing `domain`.
    ///
    /// If several certificates list the same name, the first one wins.
    pub fn provider_for_domain(&self, domain: &str) -> Option<&'a ProviderId> {
        self.certificates
            .iter()
            .find(|cert| cert.contains(domain))
            .map(CertificateSpec::provider)
    }

    /// Credentials table configured for `provider`.
    pub fn credentials(&self, provider: &ProviderId) -> Option<&'a Map<String, Value>> {
        self.credentials.get(provider.as_str())
    }
}
